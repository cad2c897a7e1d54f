//! framewalk - dissect captured frames and reassemble multi-packet PDUs.
//!
//! This crate is the outermost application layer around `framewalk-core`:
//! it reads pcap/pcapng files into [`framewalk_core::CapturedPacket`]s and
//! prints header chains and reassembled PDUs.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use framewalk::capture::CaptureReader;
//! use framewalk_core::{default_registry, Analyzer, AnalyzerConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut analyzer = Analyzer::new(Arc::new(default_registry()), AnalyzerConfig::default());
//!     let mut chain = analyzer.dissector().new_chain();
//!     for packet in CaptureReader::open("capture.pcap")? {
//!         for pdu in analyzer.process(&packet?, &mut chain)? {
//!             println!("{} bytes from frames {}..{}", pdu.len(), pdu.first_frame, pdu.last_frame);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod capture;
pub mod cli;
pub mod error;

pub use error::{CaptureError, Error, Result};
