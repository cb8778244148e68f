//! Error definitions shared across library modules.
//! The receive path classifies frames instead of failing; errors here cover
//! the transmit path and the service loop, generic over the driver error.
use thiserror_no_std::Error;

#[derive(Error, Debug, PartialEq, Eq)]
/// Errors raised while sending a Parameter Group on the bus.
pub enum SendError<E: core::fmt::Debug> {
    /// Another broadcast holds the bus and it stayed busy through the
    /// availability polls.
    #[error("Bus busy with an active broadcast")]
    BusBusy,

    /// No payload bytes were supplied.
    #[error("Payload is empty: nothing to send")]
    EmptyPayload,

    /// Payload does not fit the selected transfer (8 bytes single-frame,
    /// 1785 bytes broadcast).
    #[error("Payload of {len} bytes exceeds the transfer maximum")]
    PayloadTooLarge { len: usize },

    /// CAN bus rejected the frame after the retry budget was exhausted.
    #[error("CAN bus send error: {0:?}")]
    Driver(E),
}

#[derive(Error, Debug)]
/// Errors that terminate the transport service loop.
pub enum ServiceError<E: core::fmt::Debug> {
    /// Unable to read frames from the bus driver.
    #[error("CAN bus receive error: {0:?}")]
    Receive(E),
}
