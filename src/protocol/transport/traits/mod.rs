//! Abstraction traits used by the transport layer (CAN bus and clock).
pub mod can_bus;
pub mod clock;
