//! TCP.

use etherparse::TcpHeaderSlice;

use super::{http, link, Binding, ProtocolDescriptor, ProtocolRegistry};
use crate::dissect::SubHeaderMap;
use crate::flow::KeyField;

pub const NAME: &str = "tcp";

pub const MIN_HEADER_LEN: usize = 20;

/// TCP flag bits.
pub mod flags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;
    pub const URG: u8 = 0x20;
}

/// Option kinds, used as sub-header ids.
pub mod options {
    pub const END: u8 = 0;
    pub const NOP: u8 = 1;
    pub const MSS: u8 = 2;
    pub const WINDOW_SCALE: u8 = 3;
    pub const SACK_PERMITTED: u8 = 4;
    pub const SACK: u8 = 5;
    pub const TIMESTAMP: u8 = 8;
}

pub fn descriptor() -> ProtocolDescriptor {
    ProtocolDescriptor::dynamic(NAME, |buf, offset| {
        let tcp = TcpHeaderSlice::from_slice(buf.get(offset..)?).ok()?;
        Some(tcp.slice().len())
    })
    .with_display_name("TCP")
    .key_field(KeyField::source(0, 0, 2))
    .key_field(KeyField::destination(0, 2, 2))
    .sub_header_decoder(decode_options)
}

pub(super) fn bind(registry: &mut ProtocolRegistry) {
    link(registry, NAME, http::NAME, |id| {
        Binding::new(id, |buf, next, chain| {
            let Some(header) = chain.last().map(|r| r.bytes(buf)) else {
                return false;
            };
            let Some(segment) = TcpSegment::parse(header) else {
                return false;
            };
            [segment.src_port, segment.dst_port]
                .iter()
                .any(|p| http::PORTS.contains(p))
                && http::starts_message(buf.get(next..).unwrap_or(&[]))
        })
    });
}

/// Options are recorded by kind; kinds past the map's capacity are skipped.
fn decode_options(header: &[u8], map: &mut SubHeaderMap) {
    let mut i = MIN_HEADER_LEN;
    while i < header.len() {
        let kind = header[i];
        let len = match kind {
            options::END => break,
            options::NOP => 1,
            _ => match header.get(i + 1) {
                Some(&n) if n >= 2 && i + n as usize <= header.len() => n as usize,
                _ => break,
            },
        };
        let _ = map.insert(kind as usize, i, len);
        i += len;
    }
}

/// The TCP header fields stream reassembly needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpSegment {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub header_len: usize,
    pub flags: u8,
}

impl TcpSegment {
    pub fn parse(header: &[u8]) -> Option<Self> {
        let tcp = TcpHeaderSlice::from_slice(header).ok()?;
        let mut flags = 0;
        for (set, bit) in [
            (tcp.fin(), self::flags::FIN),
            (tcp.syn(), self::flags::SYN),
            (tcp.rst(), self::flags::RST),
            (tcp.psh(), self::flags::PSH),
            (tcp.ack(), self::flags::ACK),
            (tcp.urg(), self::flags::URG),
        ] {
            if set {
                flags |= bit;
            }
        }
        Some(Self {
            src_port: tcp.source_port(),
            dst_port: tcp.destination_port(),
            seq: tcp.sequence_number(),
            header_len: tcp.slice().len(),
            flags,
        })
    }

    #[inline]
    pub fn has(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }
}
