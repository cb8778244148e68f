//! CAN frame generator for broadcast transfers: builds the announce frame
//! and the paced data-packet sequence from an application payload.
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::can_id::CanId;
use crate::protocol::transport::GLOBAL_ADDRESS;
use crate::protocol::tp::{
    packets_for, session::SEQUENCE_MODULUS, CONTROL_BAM, PACKET_PAYLOAD, PGN_TP_CM, PGN_TP_DT,
};

#[derive(Debug)]
/// Shared parameters for all frames composing one broadcast transfer.
pub struct BamBuilder<'a> {
    pgn: u32,
    source_address: u8,
    session_number: u8,
    payload: &'a [u8],
}

/// Lazy iterator returning frames one by one as they are encoded: the
/// announce first, then every data packet in sequence order.
pub struct FrameIterator<'a> {
    builder: BamBuilder<'a>,
    /// 0 encodes the announce; data packets are 1-indexed.
    next_index: u16,
}

impl<'a> BamBuilder<'a> {
    /// Create a broadcast encoder for a payload that spans multiple frames.
    ///
    /// Callers dispatch payloads of eight bytes or fewer to the
    /// single-frame path; this builder always announces.
    pub fn new(pgn: u32, source_address: u8, session_number: u8, payload: &'a [u8]) -> Self {
        Self {
            pgn,
            source_address,
            session_number,
            payload,
        }
    }

    /// Number of data packets the transfer will carry.
    pub fn total_packets(&self) -> u16 {
        packets_for(self.payload.len())
    }

    /// Start the iteration; each call to `next` yields the next frame.
    pub fn frames(self) -> FrameIterator<'a> {
        FrameIterator {
            builder: self,
            next_index: 0,
        }
    }

    fn announce_frame(&self) -> CanFrame {
        let size = self.payload.len();
        let total_packets = self.total_packets();

        let mut data = [0xFF; 8];
        // Byte 0: announce control with the session tag in the high nibble.
        data[0] = CONTROL_BAM | (self.session_number & 0x0F) << 4;
        // Bytes 1-2: announced size, little-endian.
        data[1] = (size & 0xFF) as u8;
        data[2] = ((size >> 8) & 0xFF) as u8;
        // Byte 3: advisory packet count, saturating at the field width.
        data[3] = if total_packets > 255 {
            0xFF
        } else {
            total_packets as u8
        };
        // Byte 4 stays 0xFF (no packet-burst limit for broadcasts).
        // Bytes 5-7: announced Parameter Group, little-endian 24 bits.
        data[5] = (self.pgn & 0xFF) as u8;
        data[6] = ((self.pgn >> 8) & 0xFF) as u8;
        data[7] = ((self.pgn >> 16) & 0xFF) as u8;

        let id = CanId::builder(PGN_TP_CM, self.source_address)
            .to_destination(GLOBAL_ADDRESS)
            .build();
        CanFrame::new(id, data, 8)
    }

    fn data_frame(&self, packet_index: u16) -> CanFrame {
        let sequence = (((packet_index - 1) % SEQUENCE_MODULUS) + 1) as u8;
        let offset = (packet_index as usize - 1) * PACKET_PAYLOAD;
        let take = PACKET_PAYLOAD.min(self.payload.len() - offset);

        let mut data = [0xFF; 8];
        data[0] = sequence | (self.session_number & 0x0F) << 4;
        data[1..1 + take].copy_from_slice(&self.payload[offset..offset + take]);

        let id = CanId::builder(PGN_TP_DT, self.source_address)
            .to_destination(GLOBAL_ADDRESS)
            .build();
        CanFrame::new(id, data, 8)
    }
}

impl<'a> Iterator for FrameIterator<'a> {
    type Item = CanFrame;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.next_index;
        if index > self.builder.total_packets() {
            return None;
        }
        self.next_index += 1;

        if index == 0 {
            Some(self.builder.announce_frame())
        } else {
            Some(self.builder.data_frame(index))
        }
    }
}
