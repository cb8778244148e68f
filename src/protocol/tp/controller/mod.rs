//! J1939-21 data-link controller: classifies incoming frames, drives
//! broadcast reassembly through the session table, and paces outbound
//! transfers against the bus arbiter.
use crate::error::SendError;
use crate::protocol::tp::arbiter::BusArbiter;
use crate::protocol::tp::builder::BamBuilder;
use crate::protocol::tp::session::{AppendOutcome, MultiFrameMessage, SessionTable};
use crate::protocol::tp::{
    claim_deadline, packets_for, session_key, SessionKey, BAM_TO_DATA_DELAY_MS, CONTROL_ABORT,
    CONTROL_RTS_NIBBLE, DEFAULT_SOURCE_ADDRESS, FRAME_RETRY_DELAY_MS, FRAME_RETRY_LIMIT,
    INTER_PACKET_DELAY_MS, MAX_TP_PAYLOAD, MULTI_FRAME_BUS_POLL_DELAY_MS,
    MULTI_FRAME_BUS_POLL_LIMIT, PGN_REQUEST, PGN_TP_CM, PGN_TP_DT, SESSION_TIMEOUT_MS,
    SINGLE_FRAME_BUS_POLL_DELAY_MS, SINGLE_FRAME_BUS_POLL_LIMIT, TX_SESSION_ROTATION,
};
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::can_id::CanId;
use crate::protocol::transport::traits::{can_bus::CanBus, clock::Clock};
use crate::protocol::transport::RX_POLL_INTERVAL_MS;

#[cfg(feature = "defmt")]
use crate::protocol::tp::session_label;

//==================================================================================Published messages

/// A Parameter Group delivered to the application, either a single frame
/// passed through or a reassembled broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pgn: u32,
    source_address: u8,
    announced_size: Option<u16>,
    payload: [u8; MAX_TP_PAYLOAD],
    len: usize,
}

impl ReceivedMessage {
    pub(crate) fn single(pgn: u32, source_address: u8, data: &[u8]) -> Self {
        let mut payload = [0; MAX_TP_PAYLOAD];
        let len = data.len().min(8);
        payload[..len].copy_from_slice(&data[..len]);
        Self {
            pgn,
            source_address,
            announced_size: None,
            payload,
            len,
        }
    }

    pub(crate) fn assembled(message: &MultiFrameMessage) -> Self {
        let mut payload = [0; MAX_TP_PAYLOAD];
        let bytes = message.payload();
        payload[..bytes.len()].copy_from_slice(bytes);
        Self {
            pgn: message.pgn(),
            source_address: message.source_address(),
            announced_size: Some(message.total_size() as u16),
            payload,
            len: bytes.len(),
        }
    }

    /// Parameter Group Number the message belongs to.
    pub fn pgn(&self) -> u32 {
        self.pgn
    }

    /// Source address of the sending node.
    pub fn source_address(&self) -> u8 {
        self.source_address
    }

    /// Announced transfer size, `None` for single-frame pass-through.
    pub fn announced_size(&self) -> Option<u16> {
        self.announced_size
    }

    /// True when the message arrived in one frame.
    pub fn is_single_frame(&self) -> bool {
        self.announced_size.is_none()
    }

    /// Payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.len]
    }
}

/// Classification of one incoming frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessResult {
    /// Frame dropped or absorbed without completing a message (malformed,
    /// unknown session, abort, consumed Request, aborted session).
    Ignored,
    /// Transport frame integrated; the session is still in progress.
    FragmentConsumed,
    /// Ordinary frame passed through as a complete message.
    SingleFrame(ReceivedMessage),
    /// Final data packet arrived; the reassembled message is ready.
    MessageComplete(ReceivedMessage),
}

//==================================================================================Controller

/// Owns the session table, the bus arbiter, the driver, and the clock, and
/// exposes the data-link operations to the embedder.
pub struct Controller<C: CanBus, K: Clock> {
    bus: C,
    clock: K,
    source_address: u8,
    sessions: SessionTable,
    arbiter: BusArbiter,
    rotation_index: usize,
}

impl<C: CanBus, K: Clock> Controller<C, K>
where
    C::Error: core::fmt::Debug,
{
    /// Build a controller with the default source address (0x32).
    pub fn new(bus: C, clock: K) -> Self {
        Self::with_source_address(bus, clock, DEFAULT_SOURCE_ADDRESS)
    }

    /// Build a controller claiming `source_address` on the segment.
    pub fn with_source_address(bus: C, clock: K, source_address: u8) -> Self {
        Self {
            bus,
            clock,
            source_address,
            sessions: SessionTable::new(),
            arbiter: BusArbiter::new(),
            rotation_index: 0,
        }
    }

    /// Source address stamped on outbound frames.
    pub fn source_address(&self) -> u8 {
        self.source_address
    }

    /// Snapshot of the arbiter: true when no broadcast holds the bus.
    pub fn is_bus_available(&self) -> bool {
        self.arbiter.is_available(self.clock.now_ms())
    }

    //==================================================================================Reception

    /// Classify one incoming frame and advance the transport state.
    ///
    /// Non-extended frames are dropped. Connection-management and
    /// data-transfer PGNs feed the session table; the Request PGN is
    /// consumed without a handler; everything else passes through as a
    /// single-frame message.
    pub fn on_frame(&mut self, frame: &CanFrame) -> ProcessResult {
        if !frame.extended {
            return ProcessResult::Ignored;
        }

        let pgn = frame.id.pgn();
        let source_address = frame.id.source_address();

        match pgn {
            PGN_TP_CM => self.parse_tp_cm(&frame.data, source_address),
            PGN_TP_DT => self.parse_tp_dt(&frame.data, source_address),
            // Recognized but unanswered; a responder may hook in here.
            PGN_REQUEST => ProcessResult::Ignored,
            _ => ProcessResult::SingleFrame(ReceivedMessage::single(
                pgn,
                source_address,
                &frame.data[..frame.len],
            )),
        }
    }

    /// Evict sessions that stayed idle past the session timeout.
    pub fn tick(&mut self) {
        let now_ms = self.clock.now_ms();
        self.scavenge_stale(now_ms);
    }

    /// Acknowledge the driver's receive latch and pop the next frame.
    pub fn poll_frame(&mut self) -> Result<Option<CanFrame>, C::Error> {
        if self.bus.has_pending_rx() {
            self.bus.clear_rx_latch();
        }
        self.bus.try_recv()
    }

    /// Yield for one receive-poll interval.
    pub async fn idle(&mut self) {
        self.clock.delay_ms(RX_POLL_INTERVAL_MS).await;
    }

    fn scavenge_stale(&mut self, now_ms: u64) {
        let arbiter = &self.arbiter;
        self.sessions
            .scavenge(now_ms, SESSION_TIMEOUT_MS, |key| arbiter.release(key));
    }

    fn abort_session(&mut self, key: SessionKey) {
        self.sessions.remove(key);
        self.arbiter.release(key);
    }

    fn parse_tp_cm(&mut self, data: &[u8; 8], source_address: u8) -> ProcessResult {
        let control = data[0];
        let session_number = (control >> 4) & 0x0F;
        let key = session_key(session_number, source_address);
        let now_ms = self.clock.now_ms();

        self.scavenge_stale(now_ms);

        if control == CONTROL_ABORT {
            self.abort_session(key);
            return ProcessResult::Ignored;
        }

        match control & 0x0F {
            // Broadcast announce: open a session and latch the bus.
            0x00 => self.accept_announce(data, source_address, session_number, key, now_ms, true),
            // Peer-to-peer announce: tracked for compatibility, but no
            // clear-to-send is ever produced, so the bus is not latched.
            CONTROL_RTS_NIBBLE => {
                self.accept_announce(data, source_address, session_number, key, now_ms, false)
            }
            _ => ProcessResult::Ignored,
        }
    }

    fn accept_announce(
        &mut self,
        data: &[u8; 8],
        source_address: u8,
        session_number: u8,
        key: SessionKey,
        now_ms: u64,
        latch_bus: bool,
    ) -> ProcessResult {
        let total_size = u16::from_le_bytes([data[1], data[2]]) as usize;
        let advisory_packets = data[3];
        let pgn = u32::from_le_bytes([data[5], data[6], data[7], 0]);

        let derived_packets = packets_for(total_size);
        let total_packets = if advisory_packets == 0 || advisory_packets == 0xFF {
            derived_packets
        } else {
            advisory_packets as u16
        };

        if total_size == 0 || derived_packets == 0 || total_size > MAX_TP_PAYLOAD {
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "Invalid announce: size={} packets={}",
                total_size,
                derived_packets
            );
            return ProcessResult::Ignored;
        }

        // Anything still under this key survived the scavenge pass above,
        // so it is fresh; the duplicate announce loses.
        if self.sessions.contains(key) {
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "Busy session {} from source {=u8:x}, announce dropped",
                session_label(session_number),
                source_address
            );
            return ProcessResult::Ignored;
        }

        if latch_bus {
            self.arbiter.claim(key, claim_deadline(now_ms, total_packets));
        }

        if let Some(evicted) = self.sessions.insert(
            pgn,
            source_address,
            session_number,
            total_size,
            total_packets,
            now_ms,
        ) {
            self.arbiter.release(evicted);
        }

        ProcessResult::FragmentConsumed
    }

    fn parse_tp_dt(&mut self, data: &[u8; 8], source_address: u8) -> ProcessResult {
        let first = data[0];
        let sequence = first & 0x0F;
        let session_number = (first >> 4) & 0x0F;
        let key = session_key(session_number, source_address);
        let now_ms = self.clock.now_ms();

        if sequence == 0 {
            #[cfg(feature = "defmt")]
            defmt::warn!("Invalid sequence number: {}", sequence);
            return ProcessResult::Ignored;
        }

        let Some(message) = self.sessions.get_mut(key) else {
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "Data packet for unknown session {} from source {=u8:x}",
                session_label(session_number),
                source_address
            );
            return ProcessResult::Ignored;
        };

        match message.append(sequence, &data[1..8], now_ms) {
            AppendOutcome::Accepted => ProcessResult::FragmentConsumed,
            AppendOutcome::Completed => {
                let published = ReceivedMessage::assembled(message);
                self.abort_session(key);
                ProcessResult::MessageComplete(published)
            }
            AppendOutcome::OutOfSequence => {
                #[cfg(feature = "defmt")]
                defmt::warn!("Out of sequence packet: got {}", sequence);
                self.abort_session(key);
                ProcessResult::Ignored
            }
            AppendOutcome::Overrun => {
                #[cfg(feature = "defmt")]
                defmt::warn!("Data position exceeds announced size");
                self.abort_session(key);
                ProcessResult::Ignored
            }
        }
    }

    //==================================================================================Transmission

    /// Send a Parameter Group, fragmenting into a broadcast transfer when
    /// the payload exceeds one frame.
    pub async fn send(&mut self, pgn: u32, data: &[u8]) -> Result<(), SendError<C::Error>> {
        if data.len() <= 8 {
            self.send_single_frame(pgn, None, data).await
        } else {
            self.send_multi_frame(pgn, data).await
        }
    }

    /// Send a single-frame Parameter Group (eight bytes or fewer).
    ///
    /// Destination-specific PGNs go to `destination`, or to the global
    /// address when none is given; broadcast PGNs ignore it.
    pub async fn send_single_frame(
        &mut self,
        pgn: u32,
        destination: Option<u8>,
        data: &[u8],
    ) -> Result<(), SendError<C::Error>> {
        if !self
            .wait_for_bus(SINGLE_FRAME_BUS_POLL_LIMIT, SINGLE_FRAME_BUS_POLL_DELAY_MS)
            .await
        {
            #[cfg(feature = "defmt")]
            defmt::error!("Bus still busy after retry, aborting single frame send");
            return Err(SendError::BusBusy);
        }

        if data.len() > 8 {
            #[cfg(feature = "defmt")]
            defmt::error!("Single frame message cannot exceed 8 bytes");
            return Err(SendError::PayloadTooLarge { len: data.len() });
        }

        let mut id = CanId::builder(pgn, self.source_address);
        if let Some(destination) = destination {
            id = id.to_destination(destination);
        }

        let mut payload = [0xFF; 8];
        payload[..data.len()].copy_from_slice(data);
        let frame = CanFrame::new(id.build(), payload, data.len());

        self.bus.send(&frame).await.map_err(SendError::Driver)
    }

    /// Announce and send a broadcast transfer for a payload larger than one
    /// frame.
    ///
    /// The transfer claims the arbiter under its own session key for the
    /// duration and releases it on every exit path.
    pub async fn send_multi_frame(
        &mut self,
        pgn: u32,
        data: &[u8],
    ) -> Result<(), SendError<C::Error>> {
        if data.is_empty() {
            return Err(SendError::EmptyPayload);
        }
        if data.len() > MAX_TP_PAYLOAD {
            return Err(SendError::PayloadTooLarge { len: data.len() });
        }

        if !self
            .wait_for_bus(MULTI_FRAME_BUS_POLL_LIMIT, MULTI_FRAME_BUS_POLL_DELAY_MS)
            .await
        {
            #[cfg(feature = "defmt")]
            defmt::error!("Bus still busy after extended retry, aborting multi-frame send");
            return Err(SendError::BusBusy);
        }

        let session_number = TX_SESSION_ROTATION[self.rotation_index];
        self.rotation_index = (self.rotation_index + 1) % TX_SESSION_ROTATION.len();

        let builder = BamBuilder::new(pgn, self.source_address, session_number, data);
        let total_packets = builder.total_packets();
        let key = session_key(session_number, self.source_address);

        let deadline = claim_deadline(self.clock.now_ms(), total_packets);
        self.arbiter.claim(key, deadline);
        let result = self.emit_transfer(builder).await;
        self.arbiter.release(key);
        result
    }

    async fn emit_transfer(
        &mut self,
        builder: BamBuilder<'_>,
    ) -> Result<(), SendError<C::Error>> {
        for (index, frame) in builder.frames().enumerate() {
            self.submit_with_retry(&frame).await?;
            let pacing = if index == 0 {
                BAM_TO_DATA_DELAY_MS
            } else {
                INTER_PACKET_DELAY_MS
            };
            self.clock.delay_ms(pacing).await;
        }
        Ok(())
    }

    async fn submit_with_retry(&mut self, frame: &CanFrame) -> Result<(), SendError<C::Error>> {
        let mut attempt = 0;
        loop {
            match self.bus.send(frame).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    attempt += 1;
                    if attempt >= FRAME_RETRY_LIMIT {
                        #[cfg(feature = "defmt")]
                        defmt::error!("Failed to send frame after retries");
                        return Err(SendError::Driver(err));
                    }
                    #[cfg(feature = "defmt")]
                    defmt::warn!("Failed to send frame, retry {}", attempt);
                    self.clock.delay_ms(FRAME_RETRY_DELAY_MS).await;
                }
            }
        }
    }

    async fn wait_for_bus(&mut self, polls: u8, delay_ms: u32) -> bool {
        if self.is_bus_available() {
            return true;
        }
        #[cfg(feature = "defmt")]
        defmt::warn!("Bus busy with a broadcast session, delaying send");

        for _ in 0..polls {
            self.clock.delay_ms(delay_ms).await;
            if self.is_bus_available() {
                return true;
            }
        }
        false
    }
}
