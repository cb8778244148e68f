//! Minimal abstraction for a CAN bus driver. Allows the library to plug
//! into various implementations (embedded HAL, desktop driver, etc.).
use crate::protocol::transport::can_frame::CanFrame;
use futures_util::Future;

/// Contract to send and receive CAN frames.
///
/// Transmission is asynchronous to accommodate non-blocking drivers.
/// Reception follows the interrupt-latch discipline of common standalone
/// controllers: the interrupt handler only latches a flag, and the receive
/// loop acknowledges the latch and drains the driver FIFO with `try_recv`.
pub trait CanBus {
    type Error: core::fmt::Debug;

    /// Emit a frame on the bus. Asynchronous to accommodate non-blocking drivers.
    fn send<'a>(
        &'a mut self,
        frame: &'a CanFrame,
    ) -> impl Future<Output = Result<(), Self::Error>> + 'a;

    /// Pop the next frame from the driver's receive FIFO, if any.
    fn try_recv(&mut self) -> Result<Option<CanFrame>, Self::Error>;

    /// True when the driver has latched a receive interrupt since the last
    /// acknowledgement.
    fn has_pending_rx(&self) -> bool;

    /// Acknowledge the receive latch so the next interrupt re-arms it.
    fn clear_rx_latch(&mut self);
}
