//! Utility functions for kpeek
//!
//! This module contains helper functions for byte formatting, char-safe
//! truncation of display strings, and record batch framing and CRC checks.

use anyhow::{anyhow, Result};
use tracing::debug;

/// Size of the record batch prefix that precedes the length-counted part:
/// baseOffset (8 bytes) + batchLength (4 bytes)
const BATCH_LENGTH_PREFIX: usize = 12;

/// Formats a byte count into a human-readable string (KB, MB, GB, etc.)
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Returns the first `max_chars` characters of `s`
///
/// Counts characters, not bytes, so multi-byte text is never split
/// mid-character.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Total size of the record batch at the start of `data`, if it is complete
///
/// Returns `None` when `data` is too short to hold the batch header or the
/// whole batch, which is how a fetch cut off by its size limit ends.
pub fn record_batch_len(data: &[u8]) -> Option<usize> {
    if data.len() < BATCH_LENGTH_PREFIX {
        return None;
    }
    let batch_length = i32::from_be_bytes([data[8], data[9], data[10], data[11]]);
    if batch_length < 0 {
        return None;
    }
    let total = BATCH_LENGTH_PREFIX + batch_length as usize;
    (data.len() >= total).then_some(total)
}

/// Verify CRC32-C of a Kafka record batch
///
/// Kafka record batch format (v2):
/// - baseOffset: int64 (8 bytes) - offset 0
/// - batchLength: int32 (4 bytes) - offset 8
/// - partitionLeaderEpoch: int32 (4 bytes) - offset 12
/// - magic: int8 (1 byte) - offset 16
/// - crc: int32 (4 bytes) - offset 17
/// - attributes onwards: covered by CRC - offset 21
///
/// Returns Ok(batch_length) if CRC matches, Err with details if not
pub fn verify_record_batch_crc(data: &[u8]) -> Result<usize> {
    if data.len() < 21 {
        return Err(anyhow!("Record batch too short: {} bytes", data.len()));
    }

    let total_batch_size = record_batch_len(data).ok_or_else(|| {
        anyhow!(
            "Incomplete record batch: got {} bytes, batch header declares more",
            data.len()
        )
    })?;

    let magic = data[16];
    if magic != 2 {
        // Only verify CRC for magic version 2 (modern format)
        debug!("Skipping CRC check for magic version {}", magic);
        return Ok(total_batch_size);
    }

    let stored_crc = u32::from_be_bytes([data[17], data[18], data[19], data[20]]);
    let computed_crc = crc32c::crc32c(&data[21..total_batch_size]);

    if stored_crc != computed_crc {
        return Err(anyhow!(
            "CRC mismatch: stored=0x{:08x}, computed=0x{:08x}",
            stored_crc,
            computed_crc
        ));
    }

    Ok(total_batch_size)
}
