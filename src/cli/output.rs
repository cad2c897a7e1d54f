//! Plain-text output for header chains, reassembled PDUs, and events.
//!
//! Key values are rendered by width: 4 bytes as IPv4, 16 as IPv6, 6 as a
//! MAC address, 2 as a port number, anything else as hex.

use std::io::{self, Write};
use std::net::{Ipv4Addr, Ipv6Addr};

use framewalk_core::flow::KeyValue;
use framewalk_core::{
    CapturedPacket, FlowKey, HeaderChain, ProtocolRegistry, ReassemblyResult, SequenceEvent,
};

/// Writes one line per packet, PDU, or event.
pub struct OutputFormatter<'a> {
    registry: &'a ProtocolRegistry,
}

impl<'a> OutputFormatter<'a> {
    pub fn new(registry: &'a ProtocolRegistry) -> Self {
        Self { registry }
    }

    /// `#frame t=ts len=N  ethernet[0,14) ipv4[14,34) ...`
    pub fn write_packet<W: Write>(
        &self,
        packet: &CapturedPacket,
        chain: &HeaderChain,
        writer: &mut W,
    ) -> io::Result<()> {
        write!(
            writer,
            "#{} t={} len={}",
            packet.frame_number,
            packet.timestamp_us,
            packet.data.len()
        )?;
        if packet.is_truncated() {
            write!(writer, "/{}", packet.original_length)?;
        }
        write!(writer, " ")?;
        self.write_chain(chain, writer)?;
        writeln!(writer)
    }

    /// `  => pdu frames 2..3 len=57 key=...  http[0,52) payload[52,57)`
    pub fn write_result<W: Write>(
        &self,
        result: &ReassemblyResult,
        chain: &HeaderChain,
        writer: &mut W,
    ) -> io::Result<()> {
        write!(
            writer,
            "  => pdu frames {}..{} len={} key={} ",
            result.first_frame,
            result.last_frame,
            result.len(),
            format_key(&result.key)
        )?;
        self.write_chain(chain, writer)?;
        writeln!(writer)
    }

    /// `  ~ complete key=...: complete, 57 bytes in 2 fragment(s)`
    pub fn write_event<W: Write>(&self, event: &SequenceEvent, writer: &mut W) -> io::Result<()> {
        writeln!(
            writer,
            "  ~ {} key={}: {}",
            event.kind(),
            format_key(event.key()),
            event
        )
    }

    fn write_chain<W: Write>(&self, chain: &HeaderChain, writer: &mut W) -> io::Result<()> {
        for (i, record) in chain.iter().enumerate() {
            if i > 0 {
                write!(writer, " ")?;
            }
            write!(
                writer,
                "{}[{},{})",
                self.registry.name_of(record.id),
                record.offset,
                record.end()
            )?;
        }
        if let Some(reason) = chain.truncation() {
            write!(writer, " !{reason}")?;
        }
        Ok(())
    }
}

/// Render a flow key as space-separated values, pairs as `src>dst`.
pub fn format_key(key: &FlowKey) -> String {
    let parts: Vec<String> = key
        .values()
        .iter()
        .map(|value| match value {
            KeyValue::Single(bytes) => format_bytes(bytes),
            KeyValue::Pair { src, dst, .. } => {
                format!("{}>{}", format_bytes(src), format_bytes(dst))
            }
        })
        .collect();
    parts.join(" ")
}

/// Format a key value by its width.
pub fn format_bytes(bytes: &[u8]) -> String {
    match bytes.len() {
        2 => u16::from_be_bytes([bytes[0], bytes[1]]).to_string(),
        4 => Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]).to_string(),
        6 => bytes
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(":"),
        16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(bytes);
            Ipv6Addr::from(octets).to_string()
        }
        _ => bytes.iter().map(|b| format!("{b:02x}")).collect(),
    }
}
