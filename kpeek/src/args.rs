//! Command-line argument types for kpeek
//!
//! This module contains the top-level `Args` struct, the `check` and `drain`
//! subcommands, and the conversion of drain arguments into a `DrainConfig`.

use crate::drain::DrainConfig;
use crate::kafka_client::FetchOptions;
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Topic drained when none is given on the command line
pub const DEFAULT_TOPIC: &str = "user-activity";

/// Command-line arguments shared by every subcommand
#[derive(Parser, Debug)]
#[command(name = "kpeek")]
#[command(about = "Kafka diagnostics: broker reachability and payload encoding analysis")]
pub struct Args {
    /// Kafka broker address
    #[arg(short, long, global = true, default_value = "localhost:9092")]
    pub broker: String,

    /// Quiet mode: only errors are logged and per-message lines are not printed
    #[arg(short, long, global = true, default_value = "false")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check that the broker is reachable and print cluster metadata
    Check(CheckArgs),
    /// Read every message of a topic from the beginning and analyze payload encodings
    Drain(DrainArgs),
}

#[derive(clap::Args, Debug)]
pub struct CheckArgs {
    /// Give up if the broker has not answered within this many seconds
    #[arg(long, default_value = "5")]
    pub timeout_secs: u64,

    /// Maximum number of topic names to print
    #[arg(long, default_value = "20")]
    pub max_topics: usize,
}

#[derive(clap::Args, Debug)]
pub struct DrainArgs {
    /// Topic to drain
    #[arg(default_value = DEFAULT_TOPIC)]
    pub topic: String,

    /// How long each fetch may wait for new data, in milliseconds
    #[arg(long, default_value = "2000")]
    pub poll_timeout_ms: u64,

    /// Stop after this many consecutive fetches return no messages
    #[arg(long, default_value = "5")]
    pub max_empty_polls: u32,

    /// Upper bound on record bytes fetched per partition per request
    #[arg(long, default_value = "1048576")]
    pub max_partition_bytes: i32,

    /// Verify the CRC32-C of every record batch before decoding it
    #[arg(long, default_value = "false")]
    pub verify_crc: bool,

    /// Where to write the JSON analysis (default: <topic>_messages_analyzed.json)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Skip writing the JSON analysis file
    #[arg(long, default_value = "false", conflicts_with = "output")]
    pub no_output: bool,

    /// Characters of a non-text value shown per message line
    #[arg(long, default_value = "100")]
    pub preview_chars: usize,

    /// Characters of the sample value shown per encoding type in the summary
    #[arg(long, default_value = "200")]
    pub sample_chars: usize,
}

impl DrainArgs {
    /// Resolved output path, or `None` when writing is disabled
    pub fn output_path(&self) -> Option<PathBuf> {
        if self.no_output {
            return None;
        }
        Some(
            self.output
                .clone()
                .unwrap_or_else(|| PathBuf::from(format!("{}_messages_analyzed.json", self.topic))),
        )
    }

    /// Validates the arguments and builds the drain loop configuration
    pub fn to_config(&self, quiet: bool) -> Result<DrainConfig> {
        if self.topic.trim().is_empty() {
            return Err(anyhow!("Topic name must not be empty"));
        }
        if self.max_empty_polls == 0 {
            return Err(anyhow!("Max empty polls must be at least 1"));
        }
        if self.max_partition_bytes <= 0 {
            return Err(anyhow!("Max partition bytes must be at least 1"));
        }
        let max_wait_ms = i32::try_from(self.poll_timeout_ms)
            .map_err(|_| anyhow!("Poll timeout too large: {}ms", self.poll_timeout_ms))?;

        Ok(DrainConfig {
            topic: self.topic.clone(),
            fetch: FetchOptions {
                max_wait_ms,
                max_partition_bytes: self.max_partition_bytes,
                verify_crc: self.verify_crc,
            },
            max_empty_polls: self.max_empty_polls,
            poll_timeout: Duration::from_millis(self.poll_timeout_ms),
            preview_chars: self.preview_chars,
            print_messages: !quiet,
        })
    }
}
