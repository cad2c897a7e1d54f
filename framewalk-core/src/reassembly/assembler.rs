//! Materializes completed sequences into contiguous buffers.

use bytes::Bytes;
use tracing::trace;

use crate::arena::Arena;
use crate::error::{ReassemblyError, Result};
use crate::flow::FlowKey;
use crate::protocol::ProtocolId;

use super::Sequence;

/// One reassembled PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReassemblyResult {
    pub key: FlowKey,
    /// Shared view into an arena block.
    pub buffer: Bytes,
    /// Protocol to dissect the buffer from.
    pub entry: ProtocolId,
    pub fragments: usize,
    pub first_frame: u64,
    pub last_frame: u64,
    /// Timestamp of the latest contributing packet.
    pub timestamp_us: i64,
}

impl ReassemblyResult {
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Copies a sequence's fragments into one arena buffer.
#[derive(Debug, Default)]
pub struct Assembler {
    arena: Arena,
}

impl Assembler {
    pub fn new(arena: Arena) -> Self {
        Self { arena }
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut Arena {
        &mut self.arena
    }

    /// Build the contiguous buffer for `sequence`.
    ///
    /// The length is the sequence's known total, else its highest byte.
    /// Any gap refuses assembly with `IncompleteSequence` and leaves the
    /// sequence untouched; an exhausted arena is surfaced as is.
    pub fn assemble(&mut self, sequence: &Sequence) -> Result<ReassemblyResult> {
        let start = sequence.start();
        let total = sequence
            .total_len()
            .unwrap_or_else(|| sequence.highest_end() - start);
        let limit = start + total;

        let gaps = sequence.gaps(limit);
        if gaps > 0 {
            return Err(ReassemblyError::IncompleteSequence {
                expected: total,
                covered: sequence.covered(limit),
                gaps,
            }
            .into());
        }

        let mut buffer = self.arena.allocate(total as usize)?;
        sequence.copy_into(&mut buffer);

        let mut first_frame = u64::MAX;
        let mut last_frame = 0;
        let mut timestamp_us = i64::MIN;
        for fragment in sequence.fragments() {
            first_frame = first_frame.min(fragment.frame_number);
            last_frame = last_frame.max(fragment.frame_number);
            timestamp_us = timestamp_us.max(fragment.timestamp_us);
        }
        if sequence.fragment_count() == 0 {
            first_frame = 0;
            timestamp_us = 0;
        }

        let entry = sequence.entry().unwrap_or(ProtocolId::PAYLOAD);
        trace!(key = ?sequence.key(), total, %entry, "assembled");
        Ok(ReassemblyResult {
            key: sequence.key().clone(),
            buffer: buffer.freeze(),
            entry,
            fragments: sequence.fragment_count(),
            first_frame,
            last_frame,
            timestamp_us,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaConfig;
    use crate::error::{ArenaError, Error};
    use crate::reassembly::{Fragment, Sequencer};

    fn key() -> FlowKey {
        FlowKey::new().with_single(&[7])
    }

    #[test]
    fn test_assemble_complete() {
        let mut sequencer = Sequencer::default();
        sequencer
            .admit(key(), Fragment::new(4, &b"5678"[..]).with_frame(2, 20), 0)
            .unwrap();
        let seq = sequencer
            .admit(
                key(),
                Fragment::new(0, &b"1234"[..])
                    .with_frame(1, 10)
                    .with_entry(ProtocolId::new(3)),
                0,
            )
            .unwrap();
        assert!(!seq.is_complete());
        let seq = sequencer
            .admit(key(), Fragment::new(8, &b"9"[..]).with_frame(3, 30).with_last(true), 0)
            .unwrap()
            .into_complete()
            .unwrap();

        let mut assembler = Assembler::default();
        let result = assembler.assemble(&seq).unwrap();
        assert_eq!(&result.buffer[..], b"123456789");
        assert_eq!(result.entry, ProtocolId::new(3));
        assert_eq!(result.fragments, 3);
        assert_eq!((result.first_frame, result.last_frame), (1, 3));
        assert_eq!(result.timestamp_us, 30);
    }

    #[test]
    fn test_gap_is_incomplete() {
        let mut sequencer = Sequencer::default();
        sequencer.admit(key(), Fragment::new(0, vec![1u8; 10]), 0).unwrap();
        sequencer.admit(key(), Fragment::new(20, vec![3u8; 10]), 0).unwrap();
        sequencer.set_expected_length(&key(), 30).unwrap();

        let seq = sequencer.get(&key()).unwrap();
        let err = Assembler::default().assemble(seq).unwrap_err();
        assert_eq!(
            err,
            Error::Reassembly(ReassemblyError::IncompleteSequence {
                expected: 30,
                covered: 20,
                gaps: 1,
            })
        );
        assert_eq!(seq.fragment_count(), 2);
    }

    #[test]
    fn test_arena_exhaustion_surfaces() {
        let mut sequencer = Sequencer::default();
        let seq = sequencer
            .admit(key(), Fragment::new(0, vec![0u8; 64]).with_last(true), 0)
            .unwrap()
            .into_complete()
            .unwrap();

        let mut assembler = Assembler::new(Arena::new(ArenaConfig {
            block_size: 16,
            max_bytes: 32,
            ..Default::default()
        }));
        assert!(matches!(
            assembler.assemble(&seq),
            Err(Error::Arena(ArenaError::Exhausted { requested: 64, .. }))
        ));
    }

    #[test]
    fn test_missing_entry_defaults_to_payload() {
        let mut sequencer = Sequencer::default();
        let seq = sequencer
            .admit(key(), Fragment::new(0, vec![9u8; 3]).with_last(true), 0)
            .unwrap()
            .into_complete()
            .unwrap();
        let result = Assembler::default().assemble(&seq).unwrap();
        assert_eq!(result.entry, ProtocolId::PAYLOAD);
        assert_eq!(result.len(), 3);
    }
}
