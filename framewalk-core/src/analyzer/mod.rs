//! Single-threaded capture pipeline.
//!
//! The [`Analyzer`] wires the components together the way one capture
//! thread drives them: dissect each packet, feed IPv4 fragments and
//! message-carrying TCP segments to their sequencers, assemble what
//! completes, and re-enter dissection on reassembled datagrams.
//!
//! ```text
//! CapturedPacket --dissect--> HeaderChain
//!     | IPv4 fragment  -> datagram Sequencer -> Assembler -> dissect(entry) --+
//!     | TCP on a message port <-----------------------------------------------+
//!     +------------------> message Sequencer (ContentLengthDetector) -> Assembler
//! ```

mod ip;
mod tcp;

use std::slice;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::arena::{Arena, ArenaConfig, ArenaStats};
use crate::capture::{CapturedPacket, LinkTypeMap};
use crate::dissect::{DissectConfig, Dissector, HeaderChain, HeaderRecord};
use crate::error::Result;
use crate::flow::{FlowKey, FlowKeyExtractor};
use crate::protocol::ipv4::Ipv4Info;
use crate::protocol::tcp::TcpSegment;
use crate::protocol::{self, ProtocolId, ProtocolRegistry};
use crate::reassembly::{
    Admission, Assembler, DeadlinePolicy, ReassemblyResult, Sequence, SequenceListener,
    SequenceOrigin, Sequencer, SequencerConfig, SequencerStats,
};
use tcp::StreamTracker;

/// Default TCP ports whose payloads are framed as content-length messages.
pub const DEFAULT_MESSAGE_PORTS: &[u16] = &[80, 8000, 8080, 5060];

/// Configuration for an [`Analyzer`].
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub dissect: DissectConfig,
    pub arena: ArenaConfig,
    /// IPv4 datagram fragments.
    pub fragments: SequencerConfig,
    /// TCP-carried messages.
    pub messages: SequencerConfig,
    pub message_ports: Vec<u16>,
    /// Link type to root protocol; built from the registry when `None`.
    pub link_types: Option<LinkTypeMap>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            dissect: DissectConfig::default(),
            arena: ArenaConfig::default(),
            fragments: SequencerConfig {
                origin: SequenceOrigin::Zero,
                deadline: DeadlinePolicy::FixedFromCreation,
                ..Default::default()
            },
            messages: SequencerConfig {
                origin: SequenceOrigin::Lowest,
                deadline: DeadlinePolicy::RenewOnAdmit,
                ..Default::default()
            },
            message_ports: DEFAULT_MESSAGE_PORTS.to_vec(),
            link_types: None,
        }
    }
}

/// Pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalyzerStats {
    pub packets: u64,
    /// Chains cut short by an unknown or malformed header.
    pub truncated: u64,
    pub datagrams: u64,
    pub messages: u64,
    pub fragments: SequencerStats,
    pub streams: SequencerStats,
    pub arena: ArenaStats,
}

/// Ids of the built-ins the pipeline acts on.
#[derive(Debug, Clone, Copy, Default)]
struct Ids {
    ipv4: Option<ProtocolId>,
    ipv6: Option<ProtocolId>,
    tcp: Option<ProtocolId>,
    http: Option<ProtocolId>,
}

impl Ids {
    fn from_registry(registry: &ProtocolRegistry) -> Self {
        Self {
            ipv4: registry.id_of(protocol::ipv4::NAME),
            ipv6: registry.id_of(protocol::ipv6::NAME),
            tcp: registry.id_of(protocol::tcp::NAME),
            http: registry.id_of(protocol::http::NAME),
        }
    }
}

/// Dissection plus reassembly for one capture session.
pub struct Analyzer {
    dissector: Dissector,
    extractor: FlowKeyExtractor,
    link_types: LinkTypeMap,
    ids: Ids,
    fragments: Sequencer,
    streams: StreamTracker,
    assembler: Assembler,
    /// Scratch chain for reassembled datagrams.
    inner: HeaderChain,
    stats: AnalyzerStats,
}

impl Analyzer {
    pub fn new(registry: Arc<ProtocolRegistry>, config: AnalyzerConfig) -> Self {
        let link_types = config
            .link_types
            .unwrap_or_else(|| LinkTypeMap::for_registry(&registry));
        let dissector = Dissector::with_config(registry.clone(), config.dissect);
        let inner = dissector.new_chain();
        Self {
            ids: Ids::from_registry(&registry),
            extractor: FlowKeyExtractor::new(registry),
            dissector,
            link_types,
            fragments: Sequencer::new(config.fragments),
            streams: StreamTracker::new(config.messages, config.message_ports),
            assembler: Assembler::new(Arena::new(config.arena)),
            inner,
            stats: AnalyzerStats::default(),
        }
    }

    pub fn dissector(&self) -> &Dissector {
        &self.dissector
    }

    pub fn registry(&self) -> &Arc<ProtocolRegistry> {
        self.dissector.registry()
    }

    pub fn link_types(&self) -> &LinkTypeMap {
        &self.link_types
    }

    /// Subscribe to events from both sequencers.
    pub fn add_listener<L: SequenceListener + Clone + 'static>(&mut self, listener: L) {
        self.fragments.add_listener(listener.clone());
        self.streams.add_listener(listener);
    }

    /// Sequences still waiting for bytes.
    pub fn pending(&self) -> usize {
        self.fragments.len() + self.streams.sequencer().len()
    }

    pub fn stats(&self) -> AnalyzerStats {
        AnalyzerStats {
            fragments: self.fragments.stats(),
            streams: self.streams.sequencer().stats(),
            arena: self.assembler.arena().stats(),
            ..self.stats
        }
    }

    /// Dissect `packet` into `chain` and run it through reassembly.
    ///
    /// Returns the PDUs this packet completed. Dissection problems only
    /// truncate the chain; unsupported link types, out-of-range fragments,
    /// and arena exhaustion are returned as errors.
    pub fn process(
        &mut self,
        packet: &CapturedPacket,
        chain: &mut HeaderChain,
    ) -> Result<Vec<ReassemblyResult>> {
        let root = self.link_types.root_for(packet.link_type, &packet.data)?;
        self.dissector.dissect(&packet.data, root, chain);
        self.stats.packets += 1;
        if let Some(reason) = chain.truncation() {
            self.stats.truncated += 1;
            trace!(frame = packet.frame_number, %reason, "chain truncated");
        }

        let mut results = Vec::new();
        let records = chain.records();

        if let Some(pos) = self.ids.ipv4.and_then(|id| chain.position(id)) {
            let record = records[pos];
            if let Some(info) = Ipv4Info::parse(record.bytes(&packet.data)) {
                if info.is_fragment() {
                    self.datagram_fragment(packet, records, pos, &info, &mut results)?;
                    return Ok(results);
                }
            }
        }

        if let Some(pos) = self.ids.tcp.and_then(|id| chain.position(id)) {
            let net_key = self.extractor.extract_records(&packet.data, &records[..pos]);
            let end = ip::payload_end(&packet.data, &records[..pos], &self.ids);
            self.tcp_segment(
                net_key,
                &packet.data,
                records[pos],
                end,
                (packet.frame_number, packet.timestamp_us),
                &mut results,
            )?;
        }

        Ok(results)
    }

    /// Dissect a reassembled PDU from its entry protocol.
    pub fn dissect_result(&self, result: &ReassemblyResult, chain: &mut HeaderChain) -> usize {
        self.dissector.dissect(&result.buffer, result.entry, chain)
    }

    /// Expire sequences whose deadline is at or before `now_us` and
    /// recycle arena blocks no result refers to anymore.
    pub fn sweep(&mut self, now_us: i64) -> usize {
        let expired = self.fragments.sweep(now_us) + self.streams.sweep(now_us);
        self.assembler.arena_mut().collect();
        expired
    }

    /// End of capture: close every open message and assemble those that
    /// are gap-free. Fragmented datagrams cannot be finished early and are
    /// left to the sweep.
    pub fn finish(&mut self) -> Result<Vec<ReassemblyResult>> {
        let mut results = Vec::new();
        for sequence in self.streams.finish() {
            let message = self.message(&sequence)?;
            results.push(message);
        }
        Ok(results)
    }

    fn datagram_fragment(
        &mut self,
        packet: &CapturedPacket,
        records: &[HeaderRecord],
        pos: usize,
        info: &Ipv4Info,
        results: &mut Vec<ReassemblyResult>,
    ) -> Result<()> {
        let net_key = self.extractor.extract_records(&packet.data, &records[..=pos]);
        let key = net_key
            .clone()
            .with_single(&info.identification.to_be_bytes());
        let fragment = ip::fragment(packet, &records[pos], info, records.get(pos + 1));

        let admission = self.fragments.admit(key, fragment, packet.timestamp_us)?;
        let Admission::Complete(sequence) = admission else {
            return Ok(());
        };
        let datagram = self.assembler.assemble(&sequence)?;
        self.stats.datagrams += 1;
        debug!(
            id = info.identification,
            len = datagram.len(),
            fragments = datagram.fragments,
            "datagram reassembled"
        );

        if self.ids.tcp.is_some() && Some(datagram.entry) == self.ids.tcp {
            self.dissector
                .dissect(&datagram.buffer, datagram.entry, &mut self.inner);
            if let Some(tcp) = self.inner.records().first().copied() {
                let end = datagram.buffer.len();
                let buffer = datagram.buffer.clone();
                self.tcp_segment(
                    net_key,
                    &buffer,
                    tcp,
                    end,
                    (packet.frame_number, packet.timestamp_us),
                    results,
                )?;
            }
        }

        results.push(datagram);
        Ok(())
    }

    fn tcp_segment(
        &mut self,
        net_key: FlowKey,
        buf: &Bytes,
        record: HeaderRecord,
        end: usize,
        (frame_number, timestamp_us): (u64, i64),
        results: &mut Vec<ReassemblyResult>,
    ) -> Result<()> {
        let Some(segment) = TcpSegment::parse(record.bytes(buf)) else {
            return Ok(());
        };
        if !self.streams.watches(&segment) {
            return Ok(());
        }

        let mut key = net_key;
        self.extractor
            .extract_into(&mut key, buf, slice::from_ref(&record));
        let end = end.min(buf.len());
        let payload = buf.slice(record.end().min(end)..end);

        let completed = self
            .streams
            .segment(key, &segment, payload, frame_number, timestamp_us)?;
        for sequence in completed {
            let message = self.message(&sequence)?;
            results.push(message);
        }
        Ok(())
    }

    /// Assemble a message and pick its entry from its first bytes.
    fn message(&mut self, sequence: &Sequence) -> Result<ReassemblyResult> {
        let mut message = self.assembler.assemble(sequence)?;
        if let Some(http) = self.ids.http {
            if protocol::http::starts_message(&message.buffer) {
                message.entry = http;
            }
        }
        self.stats.messages += 1;
        debug!(len = message.len(), fragments = message.fragments, "message reassembled");
        Ok(message)
    }
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer")
            .field("link_types", &self.link_types)
            .field("fragments", &self.fragments)
            .field("pending", &self.pending())
            .field("stats", &self.stats)
            .finish()
    }
}
