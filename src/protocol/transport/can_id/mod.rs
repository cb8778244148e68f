//! Creation and extraction of the 29-bit CAN identifiers defined by
//! SAE J1939.

// Define, build, and decompose a J1939 CAN identifier.

/// PDU-format values at or above this threshold are PDU2 (broadcast); the
/// PDU-specific byte then belongs to the PGN instead of naming a destination.
pub const PDU2_THRESHOLD: u8 = 240;

//==================================================================================CAN_ID
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Encapsulates an extended CAN identifier (29 bits) and exposes accessors
/// for priority, PGN, destination, and source.
pub struct CanId(pub u32);

impl CanId {
    // Builder entry point
    /// Creates a pre-configured `CanIdBuilder` for a PGN and source address.
    pub fn builder(pgn: u32, source_address: u8) -> CanIdBuilder {
        CanIdBuilder::new(pgn, source_address)
    }

    // Getters used to deconstruct the identifier
    /// Returns the priority (3 bits, value 0-7) encoded in the CAN ID.
    pub fn priority(&self) -> u8 {
        ((self.0 >> 26) & 0x07) as u8
    }

    /// PDU-format byte (bits 16-23).
    pub fn pdu_format(&self) -> u8 {
        ((self.0 >> 16) & 0xFF) as u8
    }

    /// PDU-specific byte (bits 8-15).
    pub fn pdu_specific(&self) -> u8 {
        ((self.0 >> 8) & 0xFF) as u8
    }

    /// Extracts the 18-bit PGN, handling the PDU1/PDU2 distinction.
    ///
    /// For PDU1 identifiers the PDU-specific byte carries a destination, not
    /// part of the group number, so it is masked out.
    pub fn pgn(&self) -> u32 {
        let pgn = (self.0 >> 8) & 0x3FFFF;
        if self.pdu_format() < PDU2_THRESHOLD {
            pgn & 0x3FF00
        } else {
            pgn
        }
    }

    /// Returns the destination address when the PGN is destination-specific
    /// (PDU1).
    pub fn destination(&self) -> Option<u8> {
        if self.pdu_format() < PDU2_THRESHOLD {
            Some(self.pdu_specific())
        } else {
            None
        }
    }

    /// Eight-bit source address (logical node identifier on the segment).
    pub fn source_address(&self) -> u8 {
        (self.0 & 0xFF) as u8
    }
}

//==================================================================================CAN_ID_BUILDER
#[derive(Debug)]
/// Fluent builder applying the PDU1/PDU2 composition rules.
pub struct CanIdBuilder {
    pub priority: u8,
    pub pgn: u32,
    pub source_address: u8,
    pub destination: Option<u8>,
}

impl CanIdBuilder {
    /// Initializes the builder for a given PGN and source address.
    pub fn new(pgn: u32, source_address: u8) -> Self {
        Self {
            priority: 6, // Default priority
            pgn,
            source_address,
            destination: None,
        }
    }

    /// Sets the priority (3 bits) to use during construction.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority & 0x07;
        self
    }

    /// Assigns a destination address. Only meaningful for PDU1 PGNs.
    pub fn to_destination(mut self, destination_address: u8) -> Self {
        self.destination = Some(destination_address);
        self
    }

    /// Builds the CAN identifier while applying the J1939 rules:
    /// - PF < 240 (PDU1): the PDU-specific byte is the destination,
    ///   `0xFF` (global) when none was supplied.
    /// - PF ≥ 240 (PDU2): the PDU-specific byte comes from the PGN's low
    ///   byte; any supplied destination is ignored.
    /// - EDP/DP/PF bits are copied from the provided PGN.
    pub fn build(self) -> CanId {
        let edp_from_pgn = (self.pgn >> 17) & 0x01;
        let dp_from_pgn = (self.pgn >> 16) & 0x01;
        let pf_from_pgn = ((self.pgn >> 8) & 0xFF) as u8;

        let ps = if pf_from_pgn < PDU2_THRESHOLD {
            self.destination.unwrap_or(0xFF)
        } else {
            (self.pgn & 0xFF) as u8
        };

        let id = ((self.priority as u32) << 26)
            | (edp_from_pgn << 25)
            | (dp_from_pgn << 24)
            | ((pf_from_pgn as u32) << 16)
            | ((ps as u32) << 8)
            | (self.source_address as u32);
        CanId(id)
    }
}
