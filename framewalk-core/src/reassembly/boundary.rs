//! PDU boundary detection.
//!
//! A detector looks at the contiguous bytes a stream sequence holds and
//! decides where the current message ends. The sequencer runs it after
//! every admission.

use httparse::{Status, EMPTY_HEADER};

use super::Sequence;

/// Maximum number of headers parsed per message.
const MAX_HEADERS: usize = 64;

/// Outcome of a boundary check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The message is exactly this many bytes long and all are present.
    CompleteNow(usize),
    /// The message needs this many bytes beyond those available.
    NeedMoreBytes(usize),
    /// Not enough is known yet, e.g. the header block is still split.
    Indeterminate,
    /// The first this-many bytes cannot begin a message and are dropped.
    Skip(usize),
}

/// Protocol-specific message framing.
pub trait BoundaryDetector: Send {
    fn decide(&self, available: &[u8], sequence: &Sequence) -> Decision;
}

impl<F> BoundaryDetector for F
where
    F: Fn(&[u8], &Sequence) -> Decision + Send,
{
    fn decide(&self, available: &[u8], sequence: &Sequence) -> Decision {
        self(available, sequence)
    }
}

/// Framing for text protocols with a start line, a header block, and a
/// body sized by `Content-Length` (HTTP/1.x, SIP).
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentLengthDetector;

impl ContentLengthDetector {
    pub fn new() -> Self {
        Self
    }
}

impl BoundaryDetector for ContentLengthDetector {
    fn decide(&self, available: &[u8], _sequence: &Sequence) -> Decision {
        let Some(line_end) = find(available, b"\r\n") else {
            return Decision::Indeterminate;
        };
        let start_line = &available[..line_end];
        if !is_start_line(start_line) {
            // Mid-message bytes; resume at the next message head
            return resync(available, 0);
        }
        let body_start_search = line_end + 2;

        let mut headers = [EMPTY_HEADER; MAX_HEADERS];
        let (header_len, headers) =
            match httparse::parse_headers(&available[body_start_search..], &mut headers) {
                Ok(Status::Complete((consumed, headers))) => (body_start_search + consumed, headers),
                Ok(Status::Partial) => return Decision::Indeterminate,
                Err(_) => return resync(available, line_end),
            };

        let status = status_code(start_line);
        if matches!(status, Some(100..=199 | 204 | 304)) {
            return Decision::CompleteNow(header_len);
        }

        let body = &available[header_len..];
        let body_len = if is_chunked(headers) {
            match parse_chunked_body(body) {
                Some(len) => len,
                None => return Decision::Indeterminate,
            }
        } else if let Some(length) = content_length(headers) {
            length
        } else if status.is_some() {
            // Response delimited by connection close
            return Decision::Indeterminate;
        } else {
            0
        };

        let Some(total) = header_len.checked_add(body_len) else {
            return resync(available, line_end);
        };
        if available.len() >= total {
            Decision::CompleteNow(total)
        } else {
            Decision::NeedMoreBytes(total - available.len())
        }
    }
}

fn find(data: &[u8], needle: &[u8]) -> Option<usize> {
    data.windows(needle.len()).position(|w| w == needle)
}

/// Drop everything before the first complete start line that follows a
/// line break at or after `from`.
fn resync(available: &[u8], from: usize) -> Decision {
    let mut pos = from;
    while let Some(at) = find(&available[pos..], b"\r\n") {
        let line_start = pos + at + 2;
        let Some(len) = find(&available[line_start..], b"\r\n") else {
            break;
        };
        if is_start_line(&available[line_start..line_start + len]) {
            return Decision::Skip(line_start);
        }
        pos = line_start;
    }
    Decision::Indeterminate
}

/// Request line (`METHOD target VERSION`) or status line of HTTP or SIP.
fn is_start_line(line: &[u8]) -> bool {
    let is_version = |token: &[u8]| token.starts_with(b"HTTP/") || token.starts_with(b"SIP/");
    if is_version(line) {
        return true;
    }
    let mut tokens = line.split(|&b| b == b' ').filter(|t| !t.is_empty());
    let method_ok = tokens
        .next()
        .is_some_and(|m| m.iter().all(|b| b.is_ascii_uppercase() || *b == b'-'));
    method_ok
        && tokens.next().is_some()
        && tokens.next().is_some_and(is_version)
        && tokens.next().is_none()
}

/// Status code of an HTTP or SIP status line; `None` for request lines.
fn status_code(start_line: &[u8]) -> Option<u16> {
    if !(start_line.starts_with(b"HTTP/") || start_line.starts_with(b"SIP/")) {
        return None;
    }
    let mut parts = start_line.splitn(3, |&b| b == b' ');
    parts.next()?;
    let code = std::str::from_utf8(parts.next()?).ok()?;
    code.trim().parse().ok()
}

fn content_length(headers: &[httparse::Header]) -> Option<usize> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case("content-length") || h.name == "l")
        .and_then(|h| std::str::from_utf8(h.value).ok())
        .and_then(|v| v.trim().parse().ok())
}

fn is_chunked(headers: &[httparse::Header]) -> bool {
    headers
        .iter()
        .filter(|h| h.name.eq_ignore_ascii_case("transfer-encoding"))
        .filter_map(|h| std::str::from_utf8(h.value).ok())
        .any(|v| v.to_ascii_lowercase().contains("chunked"))
}

/// Length of a complete chunked body, trailers included, or `None` if more
/// data is needed or a chunk is malformed.
fn parse_chunked_body(data: &[u8]) -> Option<usize> {
    let mut pos = 0;

    loop {
        let line_end = find(&data[pos..], b"\r\n").map(|p| pos + p)?;

        let size_str = std::str::from_utf8(&data[pos..line_end]).ok()?;
        // Chunk extensions follow a semicolon
        let size_part = size_str.split(';').next().unwrap_or(size_str);
        let chunk_size = usize::from_str_radix(size_part.trim(), 16).ok()?;

        pos = line_end + 2;

        if chunk_size == 0 {
            if data.len() >= pos + 2 && &data[pos..pos + 2] == b"\r\n" {
                return Some(pos + 2);
            }
            // Trailer fields end with a blank line
            return find(&data[pos..], b"\r\n\r\n").map(|end| pos + end + 4);
        }

        let chunk_end = pos.checked_add(chunk_size)?.checked_add(2)?;
        if data.len() < chunk_end {
            return None;
        }
        if &data[chunk_end - 2..chunk_end] != b"\r\n" {
            return None;
        }
        pos = chunk_end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowKey;
    use crate::reassembly::SequenceOrigin;

    fn decide(data: &[u8]) -> Decision {
        let seq = Sequence::new(FlowKey::new(), SequenceOrigin::Lowest, 0, 0);
        ContentLengthDetector.decide(data, &seq)
    }

    #[test]
    fn test_request_with_body() {
        let msg = b"POST /x HTTP/1.1\r\nHost: a\r\nContent-Length: 5\r\n\r\nhello";
        assert_eq!(decide(msg), Decision::CompleteNow(msg.len()));
        assert_eq!(decide(&msg[..msg.len() - 2]), Decision::NeedMoreBytes(2));
    }

    #[test]
    fn test_request_without_length_has_no_body() {
        let msg = b"GET / HTTP/1.1\r\nHost: a\r\n\r\nGET /next";
        assert_eq!(decide(msg), Decision::CompleteNow(msg.len() - 9));
    }

    #[test]
    fn test_split_header_is_indeterminate() {
        assert_eq!(decide(b"GET / HTTP/1.1\r\nHost: a"), Decision::Indeterminate);
        assert_eq!(decide(b"GET / HTT"), Decision::Indeterminate);
    }

    #[test]
    fn test_mid_message_bytes_are_indeterminate() {
        let tail = b"ple\r\nContent-Length: 7\r\n\r\na=1&b=2";
        assert_eq!(decide(tail), Decision::Indeterminate);
        assert!(is_start_line(b"INVITE sip:bob@example.com SIP/2.0"));
        assert!(is_start_line(b"M-SEARCH * HTTP/1.1"));
        assert!(!is_start_line(b"Host: example.com"));
    }

    #[test]
    fn test_resync_at_next_start_line() {
        let msg = b"rest-of-previous-body\r\nGET / HTTP/1.1\r\nHost: a\r\n\r\n";
        assert_eq!(decide(msg), Decision::Skip(23));
        // The next head is not complete yet
        assert_eq!(decide(b"rest-of-previous-body\r\nGET / HT"), Decision::Indeterminate);
    }

    #[test]
    fn test_overflowing_content_length() {
        let msg = b"POST / HTTP/1.1\r\nContent-Length: 18446744073709551615\r\n\r\nab";
        assert_eq!(decide(msg), Decision::Indeterminate);

        let mut next = msg.to_vec();
        next.extend_from_slice(b"\r\nGET / HTTP/1.1\r\n\r\n");
        assert_eq!(decide(&next), Decision::Skip(msg.len() + 2));
    }

    #[test]
    fn test_malformed_headers_resync() {
        let msg = b"GET /a HTTP/1.1\r\nbad header\r\n\r\nGET /b HTTP/1.1\r\n\r\n";
        assert_eq!(decide(msg), Decision::Skip(31));
    }

    #[test]
    fn test_response_without_length() {
        let msg = b"HTTP/1.0 200 OK\r\nServer: x\r\n\r\nbody...";
        assert_eq!(decide(msg), Decision::Indeterminate);
    }

    #[test]
    fn test_no_body_status() {
        let msg = b"HTTP/1.1 304 Not Modified\r\nContent-Length: 100\r\n\r\n";
        assert_eq!(decide(msg), Decision::CompleteNow(msg.len()));
    }

    #[test]
    fn test_sip_compact_length() {
        let msg = b"SIP/2.0 200 OK\r\nv: SIP/2.0/TCP h\r\nl: 3\r\n\r\nabc";
        assert_eq!(decide(msg), Decision::CompleteNow(msg.len()));
    }

    #[test]
    fn test_chunked() {
        let head = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n";
        let body = b"4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n";
        let mut msg = head.to_vec();
        msg.extend_from_slice(body);
        assert_eq!(decide(&msg), Decision::CompleteNow(msg.len()));
        assert_eq!(decide(&msg[..msg.len() - 3]), Decision::Indeterminate);
    }

    #[test]
    fn test_parse_chunked_body() {
        assert_eq!(parse_chunked_body(b"0\r\n\r\n"), Some(5));
        assert_eq!(parse_chunked_body(b"3;ext=1\r\nabc\r\n0\r\n\r\n"), Some(19));
        assert_eq!(parse_chunked_body(b"3\r\nabcX\r\n"), None);
        assert_eq!(parse_chunked_body(b"zz\r\n"), None);
    }

    #[test]
    fn test_closure_detector() {
        let fixed = |available: &[u8], _: &Sequence| {
            if available.len() >= 4 {
                Decision::CompleteNow(4)
            } else {
                Decision::NeedMoreBytes(4 - available.len())
            }
        };
        let seq = Sequence::new(FlowKey::new(), SequenceOrigin::Zero, 0, 0);
        assert_eq!(fixed.decide(b"ab", &seq), Decision::NeedMoreBytes(2));
    }
}
