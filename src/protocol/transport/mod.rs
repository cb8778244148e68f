//! J1939 transport layer: CAN frame representation, 29-bit identifier
//! management, and the bus/clock abstraction traits.
//!
//! ## Bus-Level Constants
//!
//! These constants cover addressing and driver-polling concerns shared by
//! every protocol layer above the raw CAN driver.

pub mod can_frame;
pub mod can_id;
pub mod traits;

/// Global (broadcast) destination address.
///
/// PDU1 Parameter Groups carry an explicit destination in the PDU-specific
/// byte; `0xFF` addresses every node on the segment. Broadcast transport
/// sessions (TP.BAM / TP.DT) always use it.
pub const GLOBAL_ADDRESS: u8 = 0xFF;

/// Polling cadence of the receive loop (ms).
///
/// The CAN driver latches an interrupt when frames arrive; the receive loop
/// acknowledges the latch, drains the driver FIFO, then yields for this
/// interval. Ten milliseconds keeps worst-case reception latency well under
/// the 50 ms inter-packet spacing of a broadcast transfer, so a session
/// never times out merely because the loop slept.
pub const RX_POLL_INTERVAL_MS: u32 = 10;
