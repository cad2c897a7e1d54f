//! # framewalk-core
//!
//! Header-chain dissection and PDU reassembly for captured network frames.
//!
//! This crate turns raw frames into an ordered chain of typed header
//! records and stitches multi-packet protocol data units (fragmented
//! datagrams, segmented streams, content-length delimited messages) back
//! into contiguous buffers. It performs no I/O: packets come in as
//! [`CapturedPacket`] tuples from whatever capture source the caller uses.
//!
//! ## Features
//!
//! - **Declarative protocols**: descriptors with a length rule and guarded
//!   bindings to the next header, resolved through a dense-id registry
//! - **Allocation-free dissection**: a caller-owned [`HeaderChain`] reused
//!   across packets, with a bitmap map for IP/TCP options
//! - **Direction-aware flow keys** with symmetric hashing
//! - **Sequencing**: out-of-order and overlapping fragments, timeouts,
//!   listener events, pluggable PDU boundary detection
//! - **Arena-backed results**: reassembled buffers are shared views into
//!   reference-counted blocks
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use framewalk_core::prelude::*;
//!
//! let registry = Arc::new(default_registry());
//! let mut analyzer = Analyzer::new(registry, AnalyzerConfig::default());
//! let mut chain = analyzer.dissector().new_chain();
//!
//! let packet = CapturedPacket::new(1, 0, link_type::ETHERNET, vec![0u8; 60]);
//! let results = analyzer.process(&packet, &mut chain).unwrap();
//! assert!(results.is_empty());
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                        framewalk-core                               |
//! +---------------------------------------------------------------------+
//! |  capture     - CapturedPacket, link type -> root protocol           |
//! |  protocol/   - ProtocolId, descriptors, bindings, registry          |
//! |  dissect/    - Dissector, HeaderChain, SubHeaderMap                 |
//! |  flow        - FlowKey, key fields, extractor                       |
//! |  reassembly/ - Fragment, Sequence, Sequencer, Assembler, detectors  |
//! |  arena/      - Block sub-allocator backing reassembled buffers      |
//! |  analyzer/   - Pipeline: dissect -> sequence -> assemble -> dissect |
//! |  error       - Error types                                          |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Supported Protocols
//!
//! | Layer | Protocols |
//! |-------|-----------|
//! | Link | Ethernet, Linux SLL, VLAN (802.1Q/802.1ad) |
//! | Network | IPv4, IPv6, ARP, ICMP, ICMPv6 |
//! | Transport | TCP, UDP |
//! | Application | HTTP/1.x headers |

pub mod analyzer;
pub mod arena;
pub mod capture;
pub mod dissect;
pub mod error;
pub mod flow;
pub mod prelude;
pub mod protocol;
pub mod reassembly;

// Re-export commonly used types at crate root for convenience
pub use analyzer::{Analyzer, AnalyzerConfig, AnalyzerStats};
pub use arena::{Arena, ArenaConfig, ArenaStats};
pub use capture::{link_type, CapturedPacket, LinkTypeMap, RootSelector};
pub use dissect::{DissectConfig, Dissector, HeaderChain, HeaderRecord, SubHeaderMap};
pub use error::{ArenaError, DissectError, Error, ReassemblyError, Result};
pub use flow::{match_keys, FlowKey, FlowKeyExtractor, KeyField, KeyMatch};
pub use protocol::{default_registry, Binding, ProtocolDescriptor, ProtocolId, ProtocolRegistry};
pub use reassembly::{
    Admission, Assembler, BoundaryDetector, ContentLengthDetector, Decision, DeadlinePolicy,
    Fragment, ReassemblyResult, Sequence, SequenceEvent, SequenceListener, SequenceOrigin,
    SequenceState, Sequencer, SequencerConfig, SequencerStats,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
