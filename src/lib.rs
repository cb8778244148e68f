//! `drover-j1939` library: the data-link layer of SAE J1939-21 for a
//! `no_std` environment. The crate exposes the CAN transport primitives
//! (frames, 29-bit identifiers, bus and clock abstractions) and the
//! transport-protocol engine (BAM reassembly and fragmentation, session
//! bookkeeping, bus arbitration, host-facing service loop).
#![no_std]
//==================================================================================
/// Transmit-path and service-layer errors.
pub mod error;
/// J1939 protocol implementation: CAN transport and the TP.BAM engine.
pub mod protocol;
//==================================================================================
