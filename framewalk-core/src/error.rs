//! Error types for framewalk-core.

use thiserror::Error;

use crate::protocol::ProtocolId;

/// Main error type for framewalk-core operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Error while dissecting a header chain
    #[error("Dissect error: {0}")]
    Dissect(#[from] DissectError),

    /// Error while sequencing or assembling a PDU
    #[error("Reassembly error: {0}")]
    Reassembly(#[from] ReassemblyError),

    /// Buffer arena could not satisfy an allocation
    #[error("Arena error: {0}")]
    Arena(#[from] ArenaError),
}

/// Errors raised by the registry and the dissector.
///
/// The dissector never returns these to its caller; it records them as the
/// truncation reason of the header chain it was filling.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DissectError {
    /// Lookup of an id that was never registered
    #[error("unknown protocol id {0}")]
    UnknownProtocol(ProtocolId),

    /// Header length resolved to zero, failed to resolve, or ran past the buffer
    #[error("{protocol}: malformed header at offset {offset} (length {length:?}, {remaining} bytes remaining)")]
    MalformedHeader {
        protocol: &'static str,
        offset: usize,
        length: Option<usize>,
        remaining: usize,
    },

    /// Sub-header id does not fit the fixed-width bitmap
    #[error("sub-header id {id} exceeds map capacity of {capacity}")]
    SubHeaderLimit { id: usize, capacity: usize },

    /// Sub-header offset or length does not fit the map's 16-bit slots
    #[error("sub-header {id} out of range (offset {offset}, length {length})")]
    SubHeaderRange {
        id: usize,
        offset: usize,
        length: usize,
    },

    /// No root protocol configured for a capture link type
    #[error("unsupported link type: {0}")]
    UnsupportedLinkType(u16),

    /// Every protocol id is taken
    #[error("cannot register {name}: registry holds {registered} protocols")]
    RegistryFull {
        name: &'static str,
        registered: usize,
    },
}

/// Errors raised by the sequencer and the assembler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReassemblyError {
    /// Assembly refused because the fragments leave gaps
    #[error("incomplete sequence: {covered} of {expected} bytes present in {gaps} gap(s)")]
    IncompleteSequence {
        expected: u64,
        covered: u64,
        gaps: usize,
    },

    /// Fragment ends past the configured sequence length limit
    #[error("fragment at offset {offset} (+{len} bytes) exceeds sequence limit of {limit} bytes")]
    FragmentOutOfRange { offset: u64, len: usize, limit: u64 },
}

/// Errors raised by the buffer arena.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArenaError {
    /// Allocation would exceed the arena's byte budget
    #[error("arena exhausted: requested {requested} bytes with {in_use} of {limit} bytes reserved")]
    Exhausted {
        requested: usize,
        in_use: usize,
        limit: usize,
    },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
