//! pcap / pcapng file reader.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use bytes::Bytes;
use flate2::read::GzDecoder;
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, PcapBlockOwned, PcapError, PcapNGReader};
use tracing::debug;

use framewalk_core::{link_type, CapturedPacket};

use crate::error::{CaptureError, Error};

/// Buffer size for reading capture files (64KB).
const BUFFER_SIZE: usize = 65536;

/// Gzip magic bytes.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

type Source = BufReader<Box<dyn Read + Send>>;

enum ReaderInner {
    Legacy(LegacyPcapReader<Source>),
    Ng(PcapNGReader<Source>),
}

/// Reader for pcap and pcapng files, with optional gzip decompression.
///
/// Yields one [`CapturedPacket`] per frame with 1-based frame numbers and
/// microsecond timestamps.
pub struct CaptureReader {
    inner: ReaderInner,
    frame_number: u64,
    link_type: u16,
    /// Legacy pcap with nanosecond timestamps.
    nanos: bool,
}

impl CaptureReader {
    /// Open a capture file for reading.
    ///
    /// Gzipped files are detected by extension or magic bytes; the capture
    /// format is detected by its magic number.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let is_gzipped = is_gzip_file(path)?;

        let file = File::open(path).map_err(|_| CaptureError::FileNotFound {
            path: path.display().to_string(),
        })?;
        let reader: Box<dyn Read + Send> = if is_gzipped {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };
        let mut source = BufReader::with_capacity(BUFFER_SIZE, reader);

        // Peek without consuming; the pcap readers see the whole stream
        let buffered = source.fill_buf()?;
        let magic: [u8; 4] = buffered
            .get(..4)
            .and_then(|m| m.try_into().ok())
            .ok_or_else(|| CaptureError::InvalidFormat {
                reason: "File too short to read magic number".to_string(),
            })?;

        match magic {
            [0xd4, 0xc3, 0xb2, 0xa1] | [0xa1, 0xb2, 0xc3, 0xd4] => Self::open_legacy(source, false),
            [0x4d, 0x3c, 0xb2, 0xa1] | [0xa1, 0xb2, 0x3c, 0x4d] => Self::open_legacy(source, true),
            [0x0a, 0x0d, 0x0d, 0x0a] => Self::open_ng(source),
            _ => Err(CaptureError::InvalidFormat {
                reason: format!("Unknown magic number: {magic:02x?}"),
            }
            .into()),
        }
    }

    fn open_legacy(source: Source, nanos: bool) -> Result<Self, Error> {
        let reader = LegacyPcapReader::new(BUFFER_SIZE, source).map_err(|e| {
            CaptureError::InvalidFormat {
                reason: format!("Failed to parse pcap header: {e}"),
            }
        })?;
        Ok(Self {
            inner: ReaderInner::Legacy(reader),
            frame_number: 0,
            link_type: link_type::ETHERNET, // updated from the file header
            nanos,
        })
    }

    fn open_ng(source: Source) -> Result<Self, Error> {
        let reader = PcapNGReader::new(BUFFER_SIZE, source).map_err(|e| {
            CaptureError::InvalidFormat {
                reason: format!("Failed to parse pcapng header: {e}"),
            }
        })?;
        Ok(Self {
            inner: ReaderInner::Ng(reader),
            frame_number: 0,
            link_type: link_type::ETHERNET, // updated from the interface description
            nanos: false,
        })
    }

    /// Link type of the most recent file header or interface description.
    pub fn link_type(&self) -> u16 {
        self.link_type
    }

    /// Packets read so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_number
    }

    /// Read the next packet; `None` at end of file.
    pub fn next_packet(&mut self) -> Result<Option<CapturedPacket>, Error> {
        loop {
            let step = match &mut self.inner {
                ReaderInner::Legacy(reader) => next_block(reader)?,
                ReaderInner::Ng(reader) => next_block(reader)?,
            };
            let Some(block) = step else {
                return Ok(None);
            };
            if let Some(packet) = block.into_packet(self) {
                return Ok(Some(packet));
            }
        }
    }
}

/// What one block contributed.
enum Block {
    Header { link_type: u16 },
    Packet { timestamp: Timestamp, caplen: u32, origlen: u32, data: Bytes },
    Skip,
}

#[derive(Clone, Copy)]
enum Timestamp {
    /// Seconds and sub-second units of the file's precision.
    Legacy { sec: u32, frac: u32 },
    /// Interface time units, assumed microseconds.
    Ng(u64),
    Unknown,
}

impl Block {
    fn into_packet(self, reader: &mut CaptureReader) -> Option<CapturedPacket> {
        match self {
            Block::Header { link_type } => {
                debug!(link_type, "capture link type");
                reader.link_type = link_type;
                None
            }
            Block::Packet {
                timestamp,
                caplen,
                origlen,
                data,
            } => {
                reader.frame_number += 1;
                let timestamp_us = match timestamp {
                    Timestamp::Legacy { sec, frac } => {
                        let frac = if reader.nanos { frac / 1_000 } else { frac };
                        sec as i64 * 1_000_000 + frac as i64
                    }
                    Timestamp::Ng(units) => units as i64,
                    Timestamp::Unknown => 0,
                };
                let mut packet =
                    CapturedPacket::new(reader.frame_number, timestamp_us, reader.link_type, data);
                packet.captured_length = caplen;
                packet.original_length = origlen;
                Some(packet)
            }
            Block::Skip => None,
        }
    }
}

/// Pull one block off `reader`, refilling as needed.
fn next_block<R: PcapReaderIterator>(reader: &mut R) -> Result<Option<Block>, Error> {
    loop {
        match reader.next() {
            Ok((offset, block)) => {
                let block = convert(block);
                reader.consume(offset);
                return Ok(Some(block));
            }
            Err(PcapError::Eof) => return Ok(None),
            Err(PcapError::Incomplete(_)) => {
                reader.refill().map_err(|e| CaptureError::InvalidFormat {
                    reason: format!("Refill error: {e}"),
                })?;
            }
            Err(e) => {
                return Err(CaptureError::InvalidFormat {
                    reason: format!("Parse error: {e}"),
                }
                .into())
            }
        }
    }
}

fn convert(block: PcapBlockOwned<'_>) -> Block {
    use pcap_parser::pcapng::Block as NgBlock;

    match block {
        PcapBlockOwned::LegacyHeader(header) => Block::Header {
            link_type: header.network.0 as u16,
        },
        PcapBlockOwned::Legacy(packet) => Block::Packet {
            timestamp: Timestamp::Legacy {
                sec: packet.ts_sec,
                frac: packet.ts_usec,
            },
            caplen: packet.caplen,
            origlen: packet.origlen,
            data: Bytes::copy_from_slice(packet.data),
        },
        PcapBlockOwned::NG(NgBlock::InterfaceDescription(idb)) => Block::Header {
            link_type: idb.linktype.0 as u16,
        },
        PcapBlockOwned::NG(NgBlock::EnhancedPacket(epb)) => Block::Packet {
            timestamp: Timestamp::Ng(((epb.ts_high as u64) << 32) | epb.ts_low as u64),
            caplen: epb.caplen,
            origlen: epb.origlen,
            data: Bytes::copy_from_slice(epb.data),
        },
        PcapBlockOwned::NG(NgBlock::SimplePacket(spb)) => Block::Packet {
            timestamp: Timestamp::Unknown,
            caplen: spb.data.len() as u32,
            origlen: spb.origlen,
            data: Bytes::copy_from_slice(spb.data),
        },
        _ => Block::Skip,
    }
}

/// Check if a file is gzipped by extension or magic bytes.
fn is_gzip_file(path: &Path) -> Result<bool, Error> {
    if is_gzip_extension(path) {
        return Ok(true);
    }

    let mut file = File::open(path).map_err(|_| CaptureError::FileNotFound {
        path: path.display().to_string(),
    })?;
    let mut magic = [0u8; 2];
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(magic == GZIP_MAGIC),
        Err(_) => Ok(false),
    }
}

/// Whether a path has a `.gz` extension.
pub fn is_gzip_extension<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .file_name()
        .and_then(|f| f.to_str())
        .is_some_and(|name| name.to_lowercase().ends_with(".gz"))
}

impl Iterator for CaptureReader {
    type Item = Result<CapturedPacket, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_packet().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Legacy pcap, little endian, with the given packets.
    fn legacy_pcap(magic: [u8; 4], network: u32, packets: &[(u32, u32, &[u8])]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&magic);
        data.extend_from_slice(&2u16.to_le_bytes());
        data.extend_from_slice(&4u16.to_le_bytes());
        data.extend_from_slice(&[0u8; 8]); // thiszone, sigfigs
        data.extend_from_slice(&65535u32.to_le_bytes());
        data.extend_from_slice(&network.to_le_bytes());
        for (sec, frac, bytes) in packets {
            data.extend_from_slice(&sec.to_le_bytes());
            data.extend_from_slice(&frac.to_le_bytes());
            data.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            data.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            data.extend_from_slice(bytes);
        }
        data
    }

    fn write_temp(suffix: &str, data: &[u8]) -> NamedTempFile {
        let mut temp = NamedTempFile::with_suffix(suffix).unwrap();
        temp.write_all(data).unwrap();
        temp.flush().unwrap();
        temp
    }

    #[test]
    fn test_detect_gzip_by_extension() {
        assert!(is_gzip_extension("test.pcap.gz"));
        assert!(is_gzip_extension("TEST.PCAP.GZ"));
        assert!(!is_gzip_extension("test.pcapng"));
    }

    #[test]
    fn test_detect_gzip_by_magic_bytes() {
        let temp = write_temp(".bin", &[0x1f, 0x8b, 0x00, 0x00]);
        assert!(is_gzip_file(temp.path()).unwrap());

        let temp = write_temp(".bin", &[0xd4, 0xc3, 0xb2, 0xa1]);
        assert!(!is_gzip_file(temp.path()).unwrap());
    }

    #[test]
    fn test_read_legacy_packets() {
        let pcap = legacy_pcap(
            [0xd4, 0xc3, 0xb2, 0xa1],
            101,
            &[(1, 500, &[0x45; 20][..]), (2, 0, &[0x60; 40][..])],
        );
        let temp = write_temp(".pcap", &pcap);

        let packets: Vec<CapturedPacket> = CaptureReader::open(temp.path())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].frame_number, 1);
        assert_eq!(packets[0].timestamp_us, 1_000_500);
        assert_eq!(packets[0].link_type, link_type::RAW_IP);
        assert_eq!(packets[1].data.len(), 40);
    }

    #[test]
    fn test_nanosecond_timestamps() {
        let pcap = legacy_pcap([0x4d, 0x3c, 0xb2, 0xa1], 1, &[(3, 250_000, &[0u8; 14][..])]);
        let temp = write_temp(".pcap", &pcap);
        let mut reader = CaptureReader::open(temp.path()).unwrap();
        let packet = reader.next_packet().unwrap().unwrap();
        assert_eq!(packet.timestamp_us, 3_000_250);
        assert!(reader.next_packet().unwrap().is_none());
    }

    #[test]
    fn test_read_gzip_pcap() {
        let pcap = legacy_pcap([0xd4, 0xc3, 0xb2, 0xa1], 1, &[(0, 0, &[0u8; 60][..])]);
        let temp = NamedTempFile::with_suffix(".pcap.gz").unwrap();
        {
            let file = File::create(temp.path()).unwrap();
            let mut encoder = GzEncoder::new(file, Compression::default());
            encoder.write_all(&pcap).unwrap();
            encoder.finish().unwrap();
        }

        let mut reader = CaptureReader::open(temp.path()).unwrap();
        assert!(reader.next_packet().unwrap().is_some());
        assert_eq!(reader.frame_count(), 1);
    }

    #[test]
    fn test_unknown_magic() {
        let temp = write_temp(".pcap", b"not a capture file");
        assert!(matches!(
            CaptureReader::open(temp.path()),
            Err(Error::Capture(CaptureError::InvalidFormat { .. }))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            CaptureReader::open("/nonexistent/capture.pcap"),
            Err(Error::Capture(CaptureError::FileNotFound { .. }))
        ));
    }
}
