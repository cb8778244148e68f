//! SAE J1939-21 broadcast transport protocol (TP.BAM): session bookkeeping,
//! bus arbitration, fragmentation, reassembly, and the host-facing service.
//!
//! ## Transport Timing Constants
//!
//! These constants define the pacing, retry, and timeout budgets for
//! standards-compatible broadcast transfers on a J1939 segment.

pub mod arbiter;
pub mod builder;
pub mod controller;
pub mod report;
pub mod session;
pub mod supervisor;

//==================================================================================Parameter Groups

/// Transport Protocol — Connection Management (TP.CM).
pub const PGN_TP_CM: u32 = 0xEC00;
/// Transport Protocol — Data Transfer (TP.DT).
pub const PGN_TP_DT: u32 = 0xEB00;
/// Request PGN. Recognized and consumed; no responder is wired in.
pub const PGN_REQUEST: u32 = 0xEA00;

//==================================================================================Control bytes

/// TP.CM control byte announcing a broadcast session (low nibble; the high
/// nibble carries the session tag).
pub const CONTROL_BAM: u8 = 0x20;
/// TP.CM control low nibble of a peer-to-peer Request To Send.
pub const CONTROL_RTS_NIBBLE: u8 = 0x01;
/// TP.CM control byte aborting a connection (full byte).
pub const CONTROL_ABORT: u8 = 0xFF;

//==================================================================================Geometry

/// Payload bytes carried by one TP.DT frame.
pub const PACKET_PAYLOAD: usize = 7;

/// Largest reassembled transport payload: 255 packets of 7 bytes.
pub const MAX_TP_PAYLOAD: usize = 1785;

/// Source address used when the embedder does not configure one.
pub const DEFAULT_SOURCE_ADDRESS: u8 = 0x32;

/// Session tags used for outbound broadcasts, in rotation order.
///
/// Empirically these six values avoid tag collisions with some deployed
/// ECUs; the transmitter cycles through them and never uses another tag.
/// Received frames may carry any 4-bit tag.
pub const TX_SESSION_ROTATION: [u8; 6] = [2, 3, 6, 7, 10, 11];

//==================================================================================Timing

/// Inactivity budget after which a reassembly session is scavenged (ms).
pub const SESSION_TIMEOUT_MS: u64 = 1000;

/// Gap between the BAM announce and the first data packet (ms).
pub const BAM_TO_DATA_DELAY_MS: u32 = 10;

/// Pacing between consecutive data packets of one broadcast (ms).
///
/// Generous spacing keeps slow listeners and three-deep controller TX
/// buffers from dropping packets mid-session.
pub const INTER_PACKET_DELAY_MS: u32 = 50;

/// Attempts per frame before a broadcast is abandoned.
pub const FRAME_RETRY_LIMIT: u8 = 3;
/// Delay between driver retries of one frame (ms).
pub const FRAME_RETRY_DELAY_MS: u32 = 10;

/// Availability polls before a single-frame send gives up.
pub const SINGLE_FRAME_BUS_POLL_LIMIT: u8 = 5;
/// Delay between single-frame availability polls (ms).
pub const SINGLE_FRAME_BUS_POLL_DELAY_MS: u32 = 100;

/// Availability polls before a multi-frame send gives up.
pub const MULTI_FRAME_BUS_POLL_LIMIT: u8 = 10;
/// Delay between multi-frame availability polls (ms).
pub const MULTI_FRAME_BUS_POLL_DELAY_MS: u32 = 200;

/// Per-packet share of a broadcast's bus-claim window (ms). Matches the
/// inter-packet pacing with headroom for retries.
pub const CLAIM_PACKET_BUDGET_MS: u64 = 200;
/// Fixed slack added to every bus-claim window (ms).
pub const CLAIM_SLACK_MS: u64 = 500;

//==================================================================================Keys and helpers

/// Identifies one reassembly in progress: `(session_number << 8) | source`.
pub type SessionKey = u16;

/// Compose the key of a transport session.
pub const fn session_key(session_number: u8, source_address: u8) -> SessionKey {
    ((session_number as u16) << 8) | source_address as u16
}

/// Number of data packets needed for `size` payload bytes.
pub const fn packets_for(size: usize) -> u16 {
    ((size + PACKET_PAYLOAD - 1) / PACKET_PAYLOAD) as u16
}

/// Absolute deadline of a bus claim opened at `now_ms` for a transfer of
/// `total_packets` packets.
pub const fn claim_deadline(now_ms: u64, total_packets: u16) -> u64 {
    now_ms + total_packets as u64 * CLAIM_PACKET_BUDGET_MS + CLAIM_SLACK_MS
}

/// Human-readable label of an outbound session tag, for diagnostics.
pub fn session_label(session_number: u8) -> &'static str {
    match session_number {
        2 => "A",
        3 => "B",
        6 => "C",
        7 => "D",
        10 => "E",
        11 => "F",
        _ => "?",
    }
}
