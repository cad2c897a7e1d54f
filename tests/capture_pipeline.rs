//! End-to-end tests: pcap file -> CaptureReader -> Analyzer.

use std::io::Write;
use std::sync::Arc;

use framewalk::capture::CaptureReader;
use framewalk::cli::format_key;
use framewalk_core::{default_registry, Analyzer, AnalyzerConfig, ReassemblyResult};
use tempfile::NamedTempFile;

const CLIENT: [u8; 4] = [192, 168, 1, 100];
const SERVER: [u8; 4] = [192, 168, 1, 200];

/// Ethernet/IPv4 frame around `l4`, with the given fragment fields.
fn ipv4_frame(id: u16, frag_word: u16, protocol: u8, l4: &[u8]) -> Vec<u8> {
    let mut packet = Vec::new();

    // Ethernet header
    packet.extend_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]); // dst MAC
    packet.extend_from_slice(&[0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb]); // src MAC
    packet.extend_from_slice(&[0x08, 0x00]); // ethertype: IPv4

    // IPv4 header
    packet.push(0x45);
    packet.push(0x00);
    packet.extend_from_slice(&((20 + l4.len()) as u16).to_be_bytes());
    packet.extend_from_slice(&id.to_be_bytes());
    packet.extend_from_slice(&frag_word.to_be_bytes());
    packet.push(0x40); // TTL
    packet.push(protocol);
    packet.extend_from_slice(&[0x00, 0x00]); // checksum
    packet.extend_from_slice(&CLIENT);
    packet.extend_from_slice(&SERVER);

    packet.extend_from_slice(l4);
    packet
}

/// TCP header plus payload.
fn tcp_segment(sport: u16, dport: u16, seq: u32, flags: u8, payload: &[u8]) -> Vec<u8> {
    let mut tcp = Vec::new();
    tcp.extend_from_slice(&sport.to_be_bytes());
    tcp.extend_from_slice(&dport.to_be_bytes());
    tcp.extend_from_slice(&seq.to_be_bytes());
    tcp.extend_from_slice(&[0, 0, 0, 0]); // ack
    tcp.push(0x50); // data offset 5
    tcp.push(flags);
    tcp.extend_from_slice(&[0xff, 0xff, 0x00, 0x00, 0x00, 0x00]); // window, checksum, urgent
    tcp.extend_from_slice(payload);
    tcp
}

/// Legacy little-endian pcap with Ethernet link type, one packet per
/// millisecond.
fn write_pcap(frames: &[Vec<u8>]) -> NamedTempFile {
    let mut data = Vec::new();
    data.extend_from_slice(&[0xd4, 0xc3, 0xb2, 0xa1]);
    data.extend_from_slice(&[0x02, 0x00, 0x04, 0x00]);
    data.extend_from_slice(&[0u8; 8]);
    data.extend_from_slice(&65535u32.to_le_bytes());
    data.extend_from_slice(&1u32.to_le_bytes());
    for (i, frame) in frames.iter().enumerate() {
        data.extend_from_slice(&100u32.to_le_bytes());
        data.extend_from_slice(&(i as u32 * 1_000).to_le_bytes());
        data.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        data.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        data.extend_from_slice(frame);
    }

    let mut temp = NamedTempFile::with_suffix(".pcap").unwrap();
    temp.write_all(&data).unwrap();
    temp.flush().unwrap();
    temp
}

fn run(frames: &[Vec<u8>]) -> (Analyzer, Vec<ReassemblyResult>) {
    let temp = write_pcap(frames);
    let mut analyzer = Analyzer::new(Arc::new(default_registry()), AnalyzerConfig::default());
    let mut chain = analyzer.dissector().new_chain();
    let mut results = Vec::new();
    for packet in CaptureReader::open(temp.path()).unwrap() {
        let packet = packet.unwrap();
        results.extend(analyzer.process(&packet, &mut chain).unwrap());
    }
    results.extend(analyzer.finish().unwrap());
    (analyzer, results)
}

#[test]
fn test_http_request_split_over_segments() {
    let body = b"a=1&b=2";
    let head = format!(
        "POST /form HTTP/1.1\r\nHost: example\r\nContent-Length: {}\r\n\r\n",
        body.len()
    );
    let mut message = head.into_bytes();
    message.extend_from_slice(body);
    let (first, second) = message.split_at(30);

    let frames = vec![
        ipv4_frame(1, 0x4000, 6, &tcp_segment(40000, 80, 1000, 0x02, b"")),
        // second half arrives before the first
        ipv4_frame(3, 0x4000, 6, &tcp_segment(40000, 80, 1031, 0x18, second)),
        ipv4_frame(2, 0x4000, 6, &tcp_segment(40000, 80, 1001, 0x18, first)),
    ];
    let (analyzer, results) = run(&frames);

    assert_eq!(results.len(), 1);
    assert_eq!(&results[0].buffer[..], &message[..]);
    assert_eq!((results[0].first_frame, results[0].last_frame), (2, 3));
    assert_eq!(
        format_key(&results[0].key),
        "192.168.1.100>192.168.1.200 06 40000>80"
    );

    let mut chain = analyzer.dissector().new_chain();
    analyzer.dissect_result(&results[0], &mut chain);
    let names: Vec<&str> = chain
        .iter()
        .map(|r| analyzer.registry().name_of(r.id))
        .collect();
    assert_eq!(names, vec!["http", "payload"]);
    assert_eq!(analyzer.stats().packets, 3);
}

#[test]
fn test_fragmented_udp_datagram() {
    let mut udp = Vec::new();
    udp.extend_from_slice(&5000u16.to_be_bytes());
    udp.extend_from_slice(&5001u16.to_be_bytes());
    udp.extend_from_slice(&40u16.to_be_bytes());
    udp.extend_from_slice(&[0, 0]);
    udp.extend_from_slice(&[0x42; 32]);

    // MF set on the first 16 bytes; second fragment at offset 2 * 8
    let frames = vec![
        ipv4_frame(0x77, 0x2000, 17, &udp[..16]),
        ipv4_frame(0x77, 0x0002, 17, &udp[16..]),
    ];
    let (analyzer, results) = run(&frames);

    assert_eq!(results.len(), 1);
    assert_eq!(&results[0].buffer[..], &udp[..]);
    assert_eq!(analyzer.registry().name_of(results[0].entry), "udp");
    assert_eq!(analyzer.stats().datagrams, 1);
    assert_eq!(analyzer.pending(), 0);
}
