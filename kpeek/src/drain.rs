//! Topic drain for kpeek
//!
//! This module provides the Drainer, which reads every partition of a topic
//! from the earliest offset until it stops receiving data, analyzing each
//! message's payload encoding along the way.

use crate::kafka_client::{
    error_code_name, FetchOptions, KafkaClient, PartitionFetch, EARLIEST_TIMESTAMP,
};
use crate::report::{AnalyzedMessage, DrainReport};
use anyhow::{anyhow, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Extra time granted to a fetch on top of the broker-side wait before giving up
const FETCH_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

/// Partition error meaning the requested offset is outside the log
const OFFSET_OUT_OF_RANGE: i16 = 1;

/// Settings for one drain run
#[derive(Debug, Clone)]
pub struct DrainConfig {
    pub topic: String,
    pub fetch: FetchOptions,
    /// Consecutive fetches without a single message after which the topic is considered drained
    pub max_empty_polls: u32,
    pub poll_timeout: Duration,
    /// Characters shown for non-text values on the per-message line
    pub preview_chars: usize,
    /// Print one line per message to stdout
    pub print_messages: bool,
}

/// Why the drain loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// `max_empty_polls` consecutive fetches came back empty
    Drained,
    /// The shutdown signal fired
    Interrupted,
    /// A fetch failed or a partition reported an error
    Failed(String),
}

/// Report plus the reason the loop stopped; messages read before a failure are kept
#[derive(Debug)]
pub struct DrainOutcome {
    pub report: DrainReport,
    pub stop: StopReason,
}

/// Read position of one partition
#[derive(Debug, Clone, PartialEq, Eq)]
struct PartitionCursor {
    partition: i32,
    /// Next offset to fetch
    offset: i64,
    /// Set once "reached end" has been logged, cleared when new data arrives
    at_end: bool,
}

/// What one fetch response contributed
#[derive(Debug, Default, PartialEq, Eq)]
struct FetchProgress {
    /// Messages added to the report
    received: usize,
    /// Partitions whose offset fell outside the log and must be re-sought
    out_of_range: Vec<i32>,
}

/// Reads a whole topic from the beginning without joining a consumer group
pub struct Drainer {
    client: Arc<KafkaClient>,
    config: DrainConfig,
}

impl Drainer {
    pub fn new(client: Arc<KafkaClient>, config: DrainConfig) -> Self {
        Self { client, config }
    }

    /// Drains the topic until it runs dry, `shutdown` completes, or an error occurs
    ///
    /// # Returns
    /// * `Ok(DrainOutcome)` - Whatever was read, with the reason the loop stopped
    /// * `Err(anyhow::Error)` - If the topic cannot be resolved before reading starts
    pub async fn run<F>(&self, shutdown: F) -> Result<DrainOutcome>
    where
        F: Future<Output = ()>,
    {
        let topic = self.config.topic.as_str();
        info!("Consuming all messages from topic: {}", topic);

        let mut cursors = self.resolve_partitions().await?;
        let start: Vec<(i32, i64)> = cursors.iter().map(|c| (c.partition, c.offset)).collect();
        info!("Reading (partition, offset) {:?}", start);

        let mut report = DrainReport::new();
        let mut consecutive_empty_polls = 0u32;
        let fetch_timeout = self.config.poll_timeout + FETCH_TIMEOUT_MARGIN;
        tokio::pin!(shutdown);

        let stop = loop {
            if consecutive_empty_polls >= self.config.max_empty_polls {
                break StopReason::Drained;
            }

            let positions: Vec<(i32, i64)> =
                cursors.iter().map(|c| (c.partition, c.offset)).collect();
            debug!("Fetching {} at {:?}", topic, positions);

            let fetched = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Interrupted by user");
                    break StopReason::Interrupted;
                }
                result = tokio::time::timeout(
                    fetch_timeout,
                    self.client.fetch(topic, &positions, &self.config.fetch),
                ) => result,
            };

            let partitions = match fetched {
                Ok(Ok(partitions)) => partitions,
                Ok(Err(e)) => {
                    error!("Fetch from {} failed: {}", topic, e);
                    break StopReason::Failed(e.to_string());
                }
                Err(_) => {
                    let reason = format!("Fetch timed out after {:?}", fetch_timeout);
                    error!("{}", reason);
                    break StopReason::Failed(reason);
                }
            };

            let progress = match self.process_fetch(&partitions, &mut cursors, &mut report) {
                Ok(progress) => progress,
                Err(e) => {
                    error!("{}", e);
                    break StopReason::Failed(e.to_string());
                }
            };

            if !progress.out_of_range.is_empty() {
                if let Err(e) = self.reseek(&progress.out_of_range, &mut cursors).await {
                    error!("{}", e);
                    break StopReason::Failed(e.to_string());
                }
            }

            if progress.received > 0 {
                consecutive_empty_polls = 0;
            } else if progress.out_of_range.is_empty() {
                consecutive_empty_polls += 1;
                info!(
                    "Empty poll {}/{}",
                    consecutive_empty_polls, self.config.max_empty_polls
                );
                log_partition_ends(&partitions, &mut cursors);
            }
        };

        report.finish();
        info!(
            "Drain of {} stopped ({:?}) after {} messages",
            topic, stop, report.total_count
        );
        Ok(DrainOutcome { report, stop })
    }

    /// Looks the topic up in cluster metadata and places every partition at its earliest offset
    async fn resolve_partitions(&self) -> Result<Vec<PartitionCursor>> {
        let topic = self.config.topic.as_str();
        let metadata = self.client.fetch_metadata(Some(&[topic][..])).await?;
        let info = metadata
            .topic(topic)
            .ok_or_else(|| anyhow!("Topic '{}' missing from metadata response", topic))?;

        if info.error_code != 0 {
            return Err(anyhow!(
                "Topic '{}' is not readable: {}",
                topic,
                error_code_name(info.error_code)
            ));
        }
        if info.partitions.is_empty() {
            return Err(anyhow!("Topic '{}' has no partitions", topic));
        }

        let earliest = self
            .client
            .list_offsets(topic, &info.partitions, EARLIEST_TIMESTAMP)
            .await?;

        Ok(info
            .partitions
            .iter()
            .map(|&partition| PartitionCursor {
                partition,
                offset: earliest
                    .iter()
                    .find(|(p, _)| *p == partition)
                    .map_or(0, |&(_, offset)| offset.max(0)),
                at_end: false,
            })
            .collect())
    }

    /// Moves out-of-range partitions to the earliest offset the broker still has
    ///
    /// Fails if a partition is already at that offset, since fetching again
    /// would be refused the same way.
    async fn reseek(&self, partitions: &[i32], cursors: &mut [PartitionCursor]) -> Result<()> {
        let earliest = self
            .client
            .list_offsets(&self.config.topic, partitions, EARLIEST_TIMESTAMP)
            .await?;

        for (partition, offset) in earliest {
            let Some(cursor) = cursors.iter_mut().find(|c| c.partition == partition) else {
                continue;
            };
            if cursor.offset == offset {
                return Err(anyhow!(
                    "Partition {} of {} is out of range at its earliest offset {}",
                    partition,
                    self.config.topic,
                    offset
                ));
            }
            info!(
                "Partition {}: offset {} out of range, restarting from earliest offset {}",
                partition, cursor.offset, offset
            );
            cursor.offset = offset;
            cursor.at_end = false;
        }
        Ok(())
    }

    /// Analyzes the records of one fetch response and advances the cursors
    ///
    /// Partitions answering `OFFSET_OUT_OF_RANGE` are listed for re-seeking.
    /// Any other partition error aborts processing; messages from partitions
    /// handled before it stay in the report.
    fn process_fetch(
        &self,
        partitions: &[PartitionFetch],
        cursors: &mut [PartitionCursor],
        report: &mut DrainReport,
    ) -> Result<FetchProgress> {
        let mut progress = FetchProgress::default();

        for fetch in partitions {
            if fetch.error_code == OFFSET_OUT_OF_RANGE {
                debug!("Partition {}: fetch offset out of range", fetch.partition);
                progress.out_of_range.push(fetch.partition);
                continue;
            }
            if fetch.error_code != 0 {
                return Err(anyhow!(
                    "Partition {} of {} returned {}",
                    fetch.partition,
                    self.config.topic,
                    error_code_name(fetch.error_code)
                ));
            }

            let Some(cursor) = cursors.iter_mut().find(|c| c.partition == fetch.partition) else {
                warn!("Ignoring unrequested partition {} in fetch response", fetch.partition);
                continue;
            };

            if cursor.offset < fetch.log_start_offset {
                debug!(
                    "Partition {}: offset {} was deleted, jumping to log start {}",
                    cursor.partition, cursor.offset, fetch.log_start_offset
                );
                cursor.offset = fetch.log_start_offset;
            }

            for record in &fetch.records {
                // a batch is returned whole even when the requested offset lies inside it
                if record.offset < cursor.offset {
                    continue;
                }
                let message = AnalyzedMessage::from_record(&self.config.topic, fetch.partition, record);
                if self.config.print_messages {
                    let number = report.total_count + 1;
                    println!("{}", message.display_line(number, self.config.preview_chars));
                }
                report.push(message);
                cursor.offset = record.offset + 1;
                cursor.at_end = false;
                progress.received += 1;
            }

            if let Some(next_offset) = fetch.next_offset {
                cursor.offset = cursor.offset.max(next_offset);
            }
        }

        Ok(progress)
    }
}

/// Logs each partition that has caught up with its high watermark, once per catch-up
fn log_partition_ends(partitions: &[PartitionFetch], cursors: &mut [PartitionCursor]) {
    for fetch in partitions {
        if let Some(cursor) = cursors.iter_mut().find(|c| c.partition == fetch.partition) {
            if !cursor.at_end && cursor.offset >= fetch.high_watermark {
                info!("Reached end of partition {}", cursor.partition);
                cursor.at_end = true;
            }
        }
    }
}
