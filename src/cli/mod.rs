//! Command-line interface module.
//!
//! This module handles:
//! - Argument parsing via clap
//! - Plain-text output of header chains, PDUs, and sequence events

mod args;
mod output;

pub use args::Args;
pub use output::{format_bytes, format_key, OutputFormatter};
