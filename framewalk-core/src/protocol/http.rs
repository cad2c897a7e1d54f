//! HTTP/1.x message headers.
//!
//! The HTTP record covers the start line and header block up to and
//! including the blank line. A body, if any, follows as payload. Messages
//! split over several segments are handled by stream reassembly; see
//! [`crate::reassembly::ContentLengthDetector`].

use super::ProtocolDescriptor;

pub const NAME: &str = "http";

/// Ports treated as HTTP by the TCP binding.
pub const PORTS: &[u16] = &[80, 8000, 8008, 8080, 8888];

const METHODS: &[&[u8]] = &[
    b"GET ",
    b"POST ",
    b"PUT ",
    b"DELETE ",
    b"HEAD ",
    b"OPTIONS ",
    b"PATCH ",
    b"CONNECT ",
    b"TRACE ",
];

pub fn descriptor() -> ProtocolDescriptor {
    ProtocolDescriptor::dynamic(NAME, |buf, offset| {
        let data = buf.get(offset..)?;
        Some(header_block_len(data).unwrap_or(data.len()))
    })
    .with_display_name("HTTP")
}

/// Whether `data` begins with a request line or a status line.
pub fn starts_message(data: &[u8]) -> bool {
    data.starts_with(b"HTTP/1.") || METHODS.iter().any(|m| data.starts_with(m))
}

/// Length of the start line plus headers, including the terminating blank
/// line, if the terminator is present.
pub fn header_block_len(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n").map(|pos| pos + 4)
}
