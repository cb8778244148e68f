//! Broadcast reassembly sessions: rebuilds announced multi-frame messages
//! by aggregating data-transfer packets, tracked in a fixed slot pool.
use crate::protocol::tp::{session_key, SessionKey, MAX_TP_PAYLOAD, PACKET_PAYLOAD};

#[cfg(feature = "defmt")]
use crate::protocol::tp::session_label;

//==================================================================================Constants

/// Reassembly sessions handled in parallel (distinct announcing keys).
pub const MAX_CONCURRENT_SESSIONS: usize = 6;

/// Sequence numbers wrap after this many packets (4-bit field, 0 excluded).
pub const SEQUENCE_MODULUS: u16 = 15;

//==================================================================================Enums and Structs

/// Outcome of feeding one data packet into a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Packet integrated; more are expected.
    Accepted,
    /// Packet integrated and the announced count is met.
    Completed,
    /// Sequence number does not continue the session.
    OutOfSequence,
    /// Packet offset lies at or past the announced size.
    Overrun,
}

/// Possible states for a reassembly slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum SlotState {
    Inactive,
    InProgress,
}

/// One announced multi-frame message being reassembled.
#[derive(Debug, Clone, Copy)]
pub struct MultiFrameMessage {
    state: SlotState,
    buffer: [u8; MAX_TP_PAYLOAD],
    total_size: usize,
    total_packets: u16,
    pgn: u32,
    source_address: u8,
    session_number: u8,
    packets_received: u16,
    complete: bool,
    last_activity_ms: u64,
}

impl MultiFrameMessage {
    /// Create a slot in the inactive state.
    const fn vacant() -> Self {
        Self {
            state: SlotState::Inactive,
            buffer: [0; MAX_TP_PAYLOAD],
            total_size: 0,
            total_packets: 0,
            pgn: 0,
            source_address: 0,
            session_number: 0,
            packets_received: 0,
            complete: false,
            last_activity_ms: 0,
        }
    }

    /// Reset the slot and make it available again.
    fn reset(&mut self) {
        self.state = SlotState::Inactive;
        self.total_size = 0;
        self.total_packets = 0;
        self.packets_received = 0;
        self.complete = false;
        // No need to wipe the buffer; upcoming copies will overwrite it.
    }

    /// Arm the slot for a freshly announced message.
    fn begin(
        &mut self,
        pgn: u32,
        source_address: u8,
        session_number: u8,
        total_size: usize,
        total_packets: u16,
        now_ms: u64,
    ) {
        self.state = SlotState::InProgress;
        self.pgn = pgn;
        self.source_address = source_address;
        self.session_number = session_number;
        self.total_size = total_size;
        self.total_packets = total_packets;
        self.packets_received = 0;
        self.complete = false;
        self.last_activity_ms = now_ms;
    }

    /// Key identifying this session on the segment.
    pub fn key(&self) -> SessionKey {
        session_key(self.session_number, self.source_address)
    }

    /// Announced Parameter Group this session will deliver.
    pub fn pgn(&self) -> u32 {
        self.pgn
    }

    /// Source address of the announcing node.
    pub fn source_address(&self) -> u8 {
        self.source_address
    }

    /// Announced payload size in bytes.
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Number of data packets the session waits for.
    pub fn total_packets(&self) -> u16 {
        self.total_packets
    }

    /// Data packets accepted so far.
    pub fn packets_received(&self) -> u16 {
        self.packets_received
    }

    /// Timestamp of the latest announce or data packet (ms).
    pub fn last_activity_ms(&self) -> u64 {
        self.last_activity_ms
    }

    /// True once the announced packet count has been met.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Sequence number the next data packet must carry: wraps 15 → 1.
    pub fn expected_sequence(&self) -> u8 {
        ((self.packets_received % SEQUENCE_MODULUS) + 1) as u8
    }

    /// Payload bytes received so far, capped at the announced size.
    pub fn payload(&self) -> &[u8] {
        let received = (self.packets_received as usize * PACKET_PAYLOAD).min(self.total_size);
        &self.buffer[..received]
    }

    /// Record activity without consuming a packet.
    pub fn touch(&mut self, now_ms: u64) {
        self.last_activity_ms = now_ms;
    }

    /// Feed one data packet (the seven bytes after the sequence byte).
    ///
    /// The copy is capped at the announced size, so a short final packet and
    /// its `0xFF` padding never spill past the message.
    pub fn append(&mut self, sequence: u8, packet: &[u8], now_ms: u64) -> AppendOutcome {
        self.last_activity_ms = now_ms;

        if sequence != self.expected_sequence() {
            return AppendOutcome::OutOfSequence;
        }

        let offset = self.packets_received as usize * PACKET_PAYLOAD;
        if offset >= self.total_size {
            return AppendOutcome::Overrun;
        }

        let take = PACKET_PAYLOAD
            .min(self.total_size - offset)
            .min(packet.len());
        self.buffer[offset..offset + take].copy_from_slice(&packet[..take]);
        self.packets_received += 1;

        if self.packets_received >= self.total_packets {
            self.complete = true;
            AppendOutcome::Completed
        } else {
            AppendOutcome::Accepted
        }
    }
}

//==================================================================================Session table

/// Ordered mapping from session key to reassembly state, backed by a fixed
/// pool of reusable slots.
#[derive(Debug, Clone, Copy)]
pub struct SessionTable {
    sessions: [MultiFrameMessage; MAX_CONCURRENT_SESSIONS],
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTable {
    /// Instantiate the table with an inactive slot pool.
    pub const fn new() -> Self {
        Self {
            sessions: [MultiFrameMessage::vacant(); MAX_CONCURRENT_SESSIONS],
        }
    }

    fn position(&self, key: SessionKey) -> Option<usize> {
        self.sessions
            .iter()
            .position(|s| s.state == SlotState::InProgress && s.key() == key)
    }

    /// Borrow the session under `key`, if one is in progress.
    pub fn get(&self, key: SessionKey) -> Option<&MultiFrameMessage> {
        self.position(key).map(|index| &self.sessions[index])
    }

    /// Mutably borrow the session under `key`, if one is in progress.
    pub fn get_mut(&mut self, key: SessionKey) -> Option<&mut MultiFrameMessage> {
        self.position(key).map(move |index| &mut self.sessions[index])
    }

    /// True when a session is in progress under `key`.
    pub fn contains(&self, key: SessionKey) -> bool {
        self.position(key).is_some()
    }

    /// Number of sessions currently in progress.
    pub fn len(&self) -> usize {
        self.sessions
            .iter()
            .filter(|s| s.state == SlotState::InProgress)
            .count()
    }

    /// True when no session is in progress.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Open a session for a freshly announced message, replacing any entry
    /// already held under the same key.
    ///
    /// When the pool is exhausted the least-recently-active session is
    /// evicted to admit the new one; its key is returned so the caller can
    /// drop any bus-arbiter bookkeeping for it.
    pub fn insert(
        &mut self,
        pgn: u32,
        source_address: u8,
        session_number: u8,
        total_size: usize,
        total_packets: u16,
        now_ms: u64,
    ) -> Option<SessionKey> {
        let slot = self
            .position(session_key(session_number, source_address))
            .or_else(|| {
                self.sessions
                    .iter()
                    .position(|s| s.state == SlotState::Inactive)
            });

        let (index, evicted) = match slot {
            Some(index) => (index, None),
            None => {
                let index = self
                    .sessions
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, s)| s.last_activity_ms)
                    .map(|(index, _)| index)
                    .unwrap_or(0);
                let key = self.sessions[index].key();
                #[cfg(feature = "defmt")]
                defmt::warn!(
                    "Session pool full, evicting {} from source {=u8:x}",
                    session_label(self.sessions[index].session_number),
                    self.sessions[index].source_address
                );
                (index, Some(key))
            }
        };

        self.sessions[index].begin(
            pgn,
            source_address,
            session_number,
            total_size,
            total_packets,
            now_ms,
        );
        evicted
    }

    /// Iterate over every session in progress.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut MultiFrameMessage> {
        self.sessions
            .iter_mut()
            .filter(|s| s.state == SlotState::InProgress)
    }

    /// Erase the session under `key`. Returns whether one was present.
    pub fn remove(&mut self, key: SessionKey) -> bool {
        match self.position(key) {
            Some(index) => {
                self.sessions[index].reset();
                true
            }
            None => false,
        }
    }

    /// Evict every session whose last activity is older than `timeout_ms`,
    /// reporting each evicted key through `on_evict`.
    pub fn scavenge(
        &mut self,
        now_ms: u64,
        timeout_ms: u64,
        mut on_evict: impl FnMut(SessionKey),
    ) {
        for session in self.sessions.iter_mut() {
            if session.state == SlotState::InProgress
                && now_ms.saturating_sub(session.last_activity_ms) > timeout_ms
            {
                let key = session.key();
                #[cfg(feature = "defmt")]
                defmt::warn!(
                    "Removing stale session {} from source {=u8:x}",
                    session_label(session.session_number),
                    session.source_address
                );
                session.reset();
                on_evict(key);
            }
        }
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
