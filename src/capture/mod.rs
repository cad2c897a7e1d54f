//! Capture file reading.
//!
//! Turns legacy pcap and pcapng files (optionally gzipped) into the
//! [`CapturedPacket`] records the engine consumes.

mod reader;

pub use framewalk_core::CapturedPacket;
pub use reader::{is_gzip_extension, CaptureReader};
