//! Convenient re-exports for common usage.
//!
//! # Example
//!
//! ```rust
//! use framewalk_core::prelude::*;
//!
//! let registry = std::sync::Arc::new(default_registry());
//! let dissector = Dissector::new(registry);
//! let chain = dissector.new_chain();
//! assert!(chain.is_empty());
//! ```

// Protocol types
pub use crate::protocol::{default_registry, Binding, ProtocolDescriptor, ProtocolId, ProtocolRegistry};

// Dissection
pub use crate::dissect::{DissectConfig, Dissector, HeaderChain, HeaderRecord};

// Flow keys
pub use crate::flow::{match_keys, FlowKey, FlowKeyExtractor, KeyMatch};

// Reassembly
pub use crate::reassembly::{
    Admission, Assembler, Fragment, ReassemblyResult, SequenceEvent, SequenceListener,
    SequenceState, Sequencer, SequencerConfig,
};

// Pipeline
pub use crate::analyzer::{Analyzer, AnalyzerConfig};
pub use crate::capture::{link_type, CapturedPacket};

// Error types
pub use crate::error::{Error, Result};
