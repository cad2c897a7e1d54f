//! IPv4 datagram fragments.

use bytes::Bytes;

use crate::capture::CapturedPacket;
use crate::dissect::HeaderRecord;
use crate::protocol::ipv4::Ipv4Info;
use crate::protocol::ipv6;
use crate::protocol::ProtocolId;
use crate::reassembly::Fragment;

use super::Ids;

/// Where the payload of the innermost IP header in `records` ends.
///
/// Bounded by the header's own length field so link-layer padding is not
/// taken for payload; `buf.len()` when no IP header is present.
pub(super) fn payload_end(buf: &[u8], records: &[HeaderRecord], ids: &Ids) -> usize {
    let ip = records
        .iter()
        .rev()
        .find(|r| Some(r.id) == ids.ipv4 || Some(r.id) == ids.ipv6);
    let Some(record) = ip else {
        return buf.len();
    };

    let declared = if Some(record.id) == ids.ipv4 {
        Ipv4Info::parse(record.bytes(buf)).map(|info| info.total_len)
    } else {
        record
            .bytes(buf)
            .get(4..6)
            .map(|len| ipv6::HEADER_LEN + u16::from_be_bytes([len[0], len[1]]) as usize)
    };
    declared.map_or(buf.len(), |len| (record.offset + len).min(buf.len()))
}

/// The fragment an IPv4 record contributes to its datagram.
///
/// `next` is the record dissected after the IPv4 header; on the first
/// fragment it names the protocol the reassembled datagram starts with.
pub(super) fn fragment(
    packet: &CapturedPacket,
    record: &HeaderRecord,
    info: &Ipv4Info,
    next: Option<&HeaderRecord>,
) -> Fragment {
    let end = (record.offset + info.total_len).min(packet.data.len());
    let start = record.end().min(end);
    let payload: Bytes = packet.data.slice(start..end);

    let fragment = Fragment::new(info.fragment_offset, payload)
        .with_frame(packet.frame_number, packet.timestamp_us)
        .with_last(!info.more_fragments);
    if info.fragment_offset == 0 {
        fragment.with_entry(next.map_or(ProtocolId::PAYLOAD, |r| r.id))
    } else {
        fragment
    }
}
