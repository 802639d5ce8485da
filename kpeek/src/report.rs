//! Drain results: per-message analysis, encoding statistics and the JSON report
//!
//! Everything a drain produces ends up in a [`DrainReport`], which is printed
//! as a human-readable summary and optionally written to disk as pretty JSON.

use crate::kafka_client::FetchedRecord;
use crate::utils::{format_bytes, truncate_chars};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use kpeek_sniff::{classify, decode_payload, ContentTag};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Message counts per content tag, in the order tags were first seen
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodingStats {
    counts: IndexMap<ContentTag, u64>,
}

impl EncodingStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one more message with `tag`
    pub fn record(&mut self, tag: ContentTag) {
        *self.counts.entry(tag).or_insert(0) += 1;
    }

    pub fn count(&self, tag: ContentTag) -> u64 {
        self.counts.get(&tag).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Tags with their counts, first-seen tag first
    pub fn iter(&self) -> impl Iterator<Item = (ContentTag, u64)> + '_ {
        self.counts.iter().map(|(tag, count)| (*tag, *count))
    }
}

impl Serialize for EncodingStats {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.counts.len()))?;
        for (tag, count) in &self.counts {
            map.serialize_entry(tag.as_str(), count)?;
        }
        map.end()
    }
}

/// One drained message as written to the report
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AnalyzedMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub encoding_type: ContentTag,
    pub key: Option<String>,
    pub value: Option<String>,
    /// Size of the undecoded value in bytes (0 when absent)
    pub raw_value_length: usize,
}

impl AnalyzedMessage {
    /// Classifies and decodes a fetched record
    ///
    /// The tag is computed from the raw value. For the decoded fields an
    /// empty key or value is reported as absent.
    pub fn from_record(topic: &str, partition: i32, record: &FetchedRecord) -> Self {
        let value = record.value.as_deref();
        Self {
            topic: topic.to_string(),
            partition,
            offset: record.offset,
            timestamp: record.timestamp,
            encoding_type: classify(value),
            key: decode_payload(non_empty(record.key.as_deref())),
            value: decode_payload(non_empty(value)),
            raw_value_length: value.map_or(0, <[u8]>::len),
        }
    }

    /// The per-message console line, `number` counting from 1
    ///
    /// Text-like values are shown in full, anything else is cut to
    /// `preview_chars` characters followed by `...`.
    pub fn display_line(&self, number: u64, preview_chars: usize) -> String {
        let value = self.value.as_deref().unwrap_or("null");
        if self.encoding_type.is_textual() {
            format!("Message {} ({}): {}", number, self.encoding_type, value)
        } else {
            format!(
                "Message {} ({}): {}...",
                number,
                self.encoding_type,
                truncate_chars(value, preview_chars)
            )
        }
    }
}

fn non_empty(payload: Option<&[u8]>) -> Option<&[u8]> {
    payload.filter(|bytes| !bytes.is_empty())
}

/// Full result of draining a topic
#[derive(Debug, Clone, serde::Serialize)]
pub struct DrainReport {
    pub messages: Vec<AnalyzedMessage>,
    pub encoding_stats: EncodingStats,
    pub total_count: u64,
    #[serde(serialize_with = "serialize_rfc3339")]
    pub generated_at: DateTime<Utc>,
}

fn serialize_rfc3339<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&at.to_rfc3339())
}

impl Default for DrainReport {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            encoding_stats: EncodingStats::new(),
            total_count: 0,
            generated_at: Utc::now(),
        }
    }
}

impl DrainReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a message and counts its tag
    pub fn push(&mut self, message: AnalyzedMessage) {
        self.encoding_stats.record(message.encoding_type);
        self.messages.push(message);
        self.total_count += 1;
    }

    /// First message carrying `tag`, if any
    pub fn sample(&self, tag: ContentTag) -> Option<&AnalyzedMessage> {
        self.messages.iter().find(|m| m.encoding_type == tag)
    }

    /// Stamps the report with the current time
    pub fn finish(&mut self) {
        self.generated_at = Utc::now();
    }

    /// Writes the report as pretty-printed JSON
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .map_err(|e| anyhow!("Failed to create {}: {}", path.display(), e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .map_err(|e| anyhow!("Failed to serialize report: {}", e))?;
        writer
            .flush()
            .map_err(|e| anyhow!("Failed to write {}: {}", path.display(), e))?;
        Ok(())
    }

    /// Prints the consumption summary and one sample per encoding type
    pub fn print_summary(&self, sample_chars: usize) {
        println!();
        println!("CONSUMPTION SUMMARY:");
        println!("Total messages: {}", self.total_count);
        println!("Encoding distribution:");
        for (tag, count) in self.encoding_stats.iter() {
            println!("  {}: {} messages", tag, count);
        }

        let total_bytes: u64 = self
            .messages
            .iter()
            .map(|m| m.raw_value_length as u64)
            .sum();
        println!("Total value bytes: {}", format_bytes(total_bytes));

        if self.encoding_stats.is_empty() {
            return;
        }
        println!();
        println!("SAMPLE MESSAGES BY TYPE:");
        for (tag, _) in self.encoding_stats.iter() {
            if let Some(sample) = self.sample(tag) {
                println!();
                println!("{}", sample_text(tag, sample, sample_chars));
            }
        }
    }
}

fn sample_text(tag: ContentTag, sample: &AnalyzedMessage, sample_chars: usize) -> String {
    let value = sample.value.as_deref().unwrap_or("null");
    format!(
        "{} example:\n  Value: {}...\n  Length: {} bytes",
        tag,
        truncate_chars(value, sample_chars),
        sample.raw_value_length
    )
}
