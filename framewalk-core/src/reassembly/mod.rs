//! PDU reassembly.
//!
//! Packets that carry part of a larger unit are turned into [`Fragment`]s
//! and admitted to a [`Sequencer`] under their flow key. The sequencer keeps
//! one [`Sequence`] per key, reports progress to [`SequenceListener`]s, and
//! hands back the sequence once its length is known and fully covered.
//! The [`Assembler`] then copies it into one arena buffer.
//!
//! ```text
//! Fragment --admit--> Sequencer --Complete(Sequence)--> Assembler --> ReassemblyResult
//!                        |   ^
//!        BoundaryDetector+   +-- sweep(now) expires stale sequences
//! ```
//!
//! Overlapping fragments are all kept; when assembled, the fragment
//! admitted last wins.

mod assembler;
mod boundary;
mod event;
mod fragment;
mod sequence;
mod sequencer;

pub use assembler::{Assembler, ReassemblyResult};
pub use boundary::{BoundaryDetector, ContentLengthDetector, Decision};
pub use event::{SequenceEvent, SequenceListener};
pub use fragment::Fragment;
pub use sequence::{Sequence, SequenceOrigin, SequenceState};
pub use sequencer::{
    Admission, DeadlinePolicy, Sequencer, SequencerConfig, SequencerStats,
    DEFAULT_MAX_SEQUENCE_LEN, DEFAULT_SEQUENCE_TIMEOUT_US,
};
