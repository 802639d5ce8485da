//! Broker reachability check
//!
//! Connects, asks for cluster metadata and summarizes what the broker
//! advertises.

use crate::kafka_client::{ClusterMetadata, KafkaClient};
use anyhow::{anyhow, Result};
use std::time::Duration;
use tracing::debug;

/// Cluster summary produced by a successful check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub broker: String,
    /// Brokers as `id:host:port`
    pub brokers: Vec<String>,
    /// Topic names in metadata order, at most `max_topics` of them
    pub topics: Vec<String>,
    pub max_topics: usize,
}

impl CheckReport {
    fn from_metadata(broker: &str, metadata: &ClusterMetadata, max_topics: usize) -> Self {
        Self {
            broker: broker.to_string(),
            brokers: metadata.brokers.iter().map(|b| b.to_string()).collect(),
            topics: metadata
                .topics
                .iter()
                .take(max_topics)
                .map(|t| t.name.clone())
                .collect(),
            max_topics,
        }
    }

    pub fn lines(&self) -> Vec<String> {
        vec![
            format!("Connected to Kafka broker {}", self.broker),
            format!("Brokers in cluster: [{}]", self.brokers.join(", ")),
            format!(
                "Sample topics (up to {}): [{}]",
                self.max_topics,
                self.topics.join(", ")
            ),
        ]
    }
}

/// Console lines for a finished check, success or failure
pub fn check_lines(broker: &str, result: &Result<CheckReport>) -> Vec<String> {
    match result {
        Ok(report) => report.lines(),
        Err(e) => vec![format!("Cannot connect to {}: {}", broker, e)],
    }
}

/// Connects to `broker` and lists its brokers and topics
///
/// The whole exchange, connection included, must finish within `timeout`.
pub async fn check_broker(broker: &str, timeout: Duration, max_topics: usize) -> Result<CheckReport> {
    let exchange = async {
        let client = KafkaClient::connect(broker, 1).await?;
        client.fetch_metadata(None).await
    };

    let metadata = tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| anyhow!("no answer within {}s", timeout.as_secs_f64()))??;

    debug!(
        "{} answered with {} brokers and {} topics",
        broker,
        metadata.brokers.len(),
        metadata.topics.len()
    );
    Ok(CheckReport::from_metadata(broker, &metadata, max_topics))
}
