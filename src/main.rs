//! framewalk CLI entry point.

use std::io::{self, BufWriter, Write};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use framewalk::capture::CaptureReader;
use framewalk::cli::{Args, OutputFormatter};
use framewalk_core::{default_registry, Analyzer, HeaderChain, ReassemblyResult, SequenceEvent};

/// Capture-time interval between timeout sweeps.
const SWEEP_INTERVAL_US: i64 = 1_000_000;

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| args.log_filter().into()),
        )
        .with_writer(io::stderr)
        .init();

    let registry = Arc::new(default_registry());
    let mut analyzer = Analyzer::new(registry.clone(), args.analyzer_config());
    let events = Arc::new(Mutex::new(Vec::new()));
    if args.events {
        let sink = events.clone();
        analyzer.add_listener(move |event: &SequenceEvent| {
            if let Ok(mut events) = sink.lock() {
                events.push(event.clone());
            }
        });
    }

    let reader = CaptureReader::open(&args.file)
        .with_context(|| format!("Failed to open capture file: {}", args.file.display()))?;

    let formatter = OutputFormatter::new(&registry);
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut chain = analyzer.dissector().new_chain();
    let mut pdu_chain = analyzer.dissector().new_chain();
    let mut last_sweep = None;
    let mut last_ts = 0;

    for packet in reader {
        let packet = packet.context("Failed to read packet")?;
        last_ts = packet.timestamp_us;

        let results = match analyzer.process(&packet, &mut chain) {
            Ok(results) => results,
            Err(err) => {
                warn!(frame = packet.frame_number, %err, "packet skipped");
                Vec::new()
            }
        };
        if !args.quiet {
            formatter.write_packet(&packet, &chain, &mut out)?;
        }
        write_results(&formatter, &analyzer, &results, &mut pdu_chain, &mut out)?;

        match last_sweep {
            Some(t) if packet.timestamp_us - t < SWEEP_INTERVAL_US => {}
            _ => {
                analyzer.sweep(packet.timestamp_us);
                last_sweep = Some(packet.timestamp_us);
            }
        }
        drain_events(&formatter, &events, &mut out)?;
    }

    let results = analyzer.finish().context("Failed to flush open messages")?;
    write_results(&formatter, &analyzer, &results, &mut pdu_chain, &mut out)?;
    let expired = analyzer.sweep(last_ts.saturating_add(analyzer_timeout(&args)));
    drain_events(&formatter, &events, &mut out)?;
    out.flush()?;

    let stats = analyzer.stats();
    info!(
        packets = stats.packets,
        truncated = stats.truncated,
        datagrams = stats.datagrams,
        messages = stats.messages,
        expired,
        "capture done"
    );
    eprintln!(
        "{} packets, {} datagrams and {} messages reassembled, {} sequences expired",
        stats.packets,
        stats.datagrams,
        stats.messages,
        stats.fragments.timed_out + stats.streams.timed_out
    );
    Ok(())
}

fn analyzer_timeout(args: &Args) -> i64 {
    let config = args.analyzer_config();
    config.fragments.timeout_us.max(config.messages.timeout_us)
}

fn write_results<W: Write>(
    formatter: &OutputFormatter<'_>,
    analyzer: &Analyzer,
    results: &[ReassemblyResult],
    chain: &mut HeaderChain,
    out: &mut W,
) -> io::Result<()> {
    for result in results {
        analyzer.dissect_result(result, chain);
        formatter.write_result(result, chain, out)?;
    }
    Ok(())
}

fn drain_events<W: Write>(
    formatter: &OutputFormatter<'_>,
    events: &Mutex<Vec<SequenceEvent>>,
    out: &mut W,
) -> io::Result<()> {
    let pending = match events.lock() {
        Ok(mut events) => std::mem::take(&mut *events),
        Err(_) => return Ok(()),
    };
    for event in &pending {
        formatter.write_event(event, out)?;
    }
    Ok(())
}
