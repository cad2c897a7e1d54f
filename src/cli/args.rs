//! Command-line argument definitions.

use std::path::PathBuf;

use clap::Parser;

use framewalk_core::{AnalyzerConfig, ArenaConfig, DissectConfig};

/// Dissect captured frames into header chains and reassemble multi-packet PDUs.
#[derive(Parser, Debug)]
#[command(name = "framewalk")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Capture file (pcap or pcapng, optionally gzipped)
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Print sequence events (start, packet, overlap, complete, timeout)
    #[arg(short = 'e', long = "events")]
    pub events: bool,

    /// Only print reassembled PDUs, not every packet
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,

    /// Maximum records in one header chain
    #[arg(long = "max-headers", default_value = "64")]
    pub max_headers: usize,

    /// Reassembly timeout in seconds
    #[arg(long = "timeout", default_value = "60")]
    pub timeout_secs: u64,

    /// Arena block size in bytes
    #[arg(long = "block-size", default_value = "10240")]
    pub block_size: usize,

    /// Arena budget in MiB
    #[arg(long = "arena-mb", default_value = "256")]
    pub arena_mb: usize,

    /// TCP port carrying content-length framed messages (repeatable)
    #[arg(short = 'p', long = "port", value_name = "PORT")]
    pub ports: Vec<u16>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Tracing filter for the `-v` count.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }

    /// Pipeline configuration for these flags.
    pub fn analyzer_config(&self) -> AnalyzerConfig {
        let mut config = AnalyzerConfig {
            dissect: DissectConfig {
                max_headers: self.max_headers.max(1),
            },
            arena: ArenaConfig {
                block_size: self.block_size.max(1),
                max_bytes: self.arena_mb.saturating_mul(1024 * 1024),
                ..Default::default()
            },
            ..Default::default()
        };
        let timeout_us = i64::try_from(self.timeout_secs.saturating_mul(1_000_000)).unwrap_or(i64::MAX);
        config.fragments.timeout_us = timeout_us;
        config.messages.timeout_us = timeout_us;
        if !self.ports.is_empty() {
            config.message_ports = self.ports.clone();
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["framewalk", "capture.pcap"]);
        let config = args.analyzer_config();
        assert_eq!(config.dissect.max_headers, 64);
        assert_eq!(config.arena.max_bytes, 256 * 1024 * 1024);
        assert_eq!(config.fragments.timeout_us, 60_000_000);
        assert_eq!(config.message_ports, vec![80, 8000, 8080, 5060]);
        assert_eq!(args.log_filter(), "warn");
    }

    #[test]
    fn test_overrides() {
        let args = Args::parse_from([
            "framewalk", "-vv", "-e", "--timeout", "5", "-p", "8888", "-p", "5060", "x.pcapng",
        ]);
        let config = args.analyzer_config();
        assert!(args.events);
        assert_eq!(args.log_filter(), "debug");
        assert_eq!(config.messages.timeout_us, 5_000_000);
        assert_eq!(config.message_ports, vec![8888, 5060]);
    }
}
