//! High-level components of the J1939 data link: CAN transport primitives
//! and the J1939-21 broadcast transport-protocol engine.
pub mod tp;
pub mod transport;
