//! Kafka Client Implementation
//!
//! This module provides a low-level Kafka client that communicates directly with Kafka brokers
//! using the Kafka protocol. It handles connection management, API version negotiation,
//! and the two read-only operations kpeek needs: cluster metadata and partition fetches.

use crate::utils::{record_batch_len, verify_record_batch_crc};
use anyhow::{anyhow, Result};
use bytes::Bytes;
use kafka_protocol::{
    messages::{
        api_versions_request::ApiVersionsRequest,
        api_versions_response::ApiVersionsResponse,
        fetch_request::{FetchPartition, FetchRequest, FetchTopic},
        fetch_response::FetchResponse,
        list_offsets_request::{ListOffsetsPartition, ListOffsetsRequest, ListOffsetsTopic},
        list_offsets_response::ListOffsetsResponse,
        metadata_request::{MetadataRequest, MetadataRequestTopic},
        metadata_response::MetadataResponse,
        ApiKey, BrokerId, RequestHeader, ResponseHeader, TopicName,
    },
    protocol::{Decodable, Encodable, StrBytes},
    records::RecordBatchDecoder,
};
use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    sync::Mutex,
    time::{sleep, Duration},
};
use tracing::{debug, info, warn};

/// Client id sent in every request header
const CLIENT_ID: &str = "kpeek";

/// Upper bound on a single response frame
const MAX_RESPONSE_SIZE: usize = 100 * 1024 * 1024;

/// Preferred Metadata version: v1 is the first where a null topic list means "all topics"
const METADATA_VERSION: i16 = 1;

/// Preferred Fetch version: v5 is the first that reports the partition's log start offset
const FETCH_VERSION: i16 = 5;

/// Preferred ListOffsets version: v1 answers with a single offset per partition
const LIST_OFFSETS_VERSION: i16 = 1;

/// ListOffsets timestamp sentinel for the earliest offset still in the log
pub const EARLIEST_TIMESTAMP: i64 = -2;

/// ListOffsets timestamp sentinel for the offset after the last message
pub const LATEST_TIMESTAMP: i64 = -1;

/// Maps a Kafka error code to its protocol name
pub fn error_code_name(code: i16) -> String {
    match code {
        0 => "NONE".to_string(),
        1 => "OFFSET_OUT_OF_RANGE".to_string(),
        2 => "CORRUPT_MESSAGE".to_string(),
        3 => "UNKNOWN_TOPIC_OR_PARTITION".to_string(),
        5 => "LEADER_NOT_AVAILABLE".to_string(),
        6 => "NOT_LEADER_OR_FOLLOWER".to_string(),
        7 => "REQUEST_TIMED_OUT".to_string(),
        16 => "NETWORK_EXCEPTION".to_string(),
        17 => "INVALID_TOPIC_EXCEPTION".to_string(),
        29 => "TOPIC_AUTHORIZATION_FAILED".to_string(),
        35 => "UNSUPPORTED_VERSION".to_string(),
        74 => "FENCED_LEADER_EPOCH".to_string(),
        75 => "UNKNOWN_LEADER_EPOCH".to_string(),
        _ => format!("UNKNOWN_ERROR_CODE({})", code),
    }
}

/// A broker as advertised in cluster metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerInfo {
    pub id: i32,
    pub host: String,
    pub port: i32,
}

impl fmt::Display for BrokerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.id, self.host, self.port)
    }
}

/// A topic as advertised in cluster metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicInfo {
    pub name: String,
    /// Topic-level error code (0 when the topic is healthy)
    pub error_code: i16,
    /// Partition indexes, sorted ascending
    pub partitions: Vec<i32>,
}

/// Brokers and topics returned by a Metadata request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterMetadata {
    pub brokers: Vec<BrokerInfo>,
    pub topics: Vec<TopicInfo>,
}

impl ClusterMetadata {
    /// Looks up a topic by name
    pub fn topic(&self, name: &str) -> Option<&TopicInfo> {
        self.topics.iter().find(|t| t.name == name)
    }
}

/// A single record pulled out of a fetched record batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedRecord {
    pub offset: i64,
    /// Milliseconds since the Unix epoch, as stamped by the producer or broker
    pub timestamp: i64,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
}

/// Fetch outcome for one partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionFetch {
    pub partition: i32,
    pub error_code: i16,
    pub high_watermark: i64,
    /// -1 when the negotiated Fetch version does not report it
    pub log_start_offset: i64,
    /// Data records in offset order; transaction control records are dropped
    pub records: Vec<FetchedRecord>,
    /// Offset to request next: one past the last record seen, control records included
    pub next_offset: Option<i64>,
}

/// Tuning knobs for a Fetch request
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    /// How long the broker may wait for data before answering
    pub max_wait_ms: i32,
    /// Upper bound on record bytes returned per partition
    pub max_partition_bytes: i32,
    /// Verify CRC32-C of each record batch before decoding it
    pub verify_crc: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_wait_ms: 2000,
            max_partition_bytes: 1024 * 1024,
            verify_crc: false,
        }
    }
}

/// Low-level Kafka client for direct broker communication
///
/// This client maintains a persistent TCP connection to a Kafka broker and handles:
/// - Protocol message encoding/decoding
/// - API version negotiation and compatibility
/// - Request correlation and response matching
pub struct KafkaClient {
    /// TCP stream shared across tasks; the mutex keeps request/response pairs together
    stream: Arc<Mutex<TcpStream>>,

    /// Monotonically increasing correlation ID for request/response matching
    correlation_id: AtomicU64,

    /// Supported API versions discovered from the broker
    /// Maps API key (i16) to (min_version, max_version) tuple
    pub api_versions: HashMap<i16, (i16, i16)>,
}

impl KafkaClient {
    /// Establishes a connection to a Kafka broker and discovers supported API versions
    ///
    /// # Arguments
    /// * `broker` - Broker address in "host:port" format (e.g., "localhost:9092")
    /// * `max_attempts` - TCP connection attempts before giving up, one second apart
    ///
    /// # Returns
    /// * `Ok(KafkaClient)` - Fully initialized client ready for operations
    /// * `Err(anyhow::Error)` - If connection or version discovery fails
    pub async fn connect(broker: &str, max_attempts: u32) -> Result<Self> {
        info!("Connecting to Kafka broker at {}", broker);

        let stream = Self::connect_with_retry(broker, max_attempts.max(1)).await?;

        debug!("TCP connection to {} established", broker);

        let mut client = KafkaClient {
            stream: Arc::new(Mutex::new(stream)),
            correlation_id: AtomicU64::new(1),
            api_versions: HashMap::new(),
        };

        client.discover_api_versions().await?;

        Ok(client)
    }

    /// Attempts to establish TCP connection, retrying every second
    async fn connect_with_retry(broker: &str, max_attempts: u32) -> Result<TcpStream> {
        let retry_interval = Duration::from_secs(1);
        let mut attempt = 1;

        loop {
            match TcpStream::connect(broker).await {
                Ok(stream) => {
                    if attempt > 1 {
                        info!(
                            "Successfully connected to Kafka broker on attempt {}",
                            attempt
                        );
                    }
                    return Ok(stream);
                }
                Err(e) if attempt >= max_attempts => {
                    return Err(anyhow!(
                        "Failed to connect to Kafka broker at {} after {} attempts: {}",
                        broker,
                        max_attempts,
                        e
                    ));
                }
                Err(e) => {
                    warn!(
                        "Connection attempt {} failed, retrying in 1 second: {}",
                        attempt, e
                    );
                    sleep(retry_interval).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Sends a Kafka protocol request and returns the raw response bytes
    ///
    /// Handles the complete request/response cycle: correlation ID, header and body
    /// encoding, 4-byte length framing, and reading the framed response back.
    ///
    /// # Arguments
    /// * `api_key` - Kafka API identifier (e.g., Metadata, Fetch)
    /// * `request` - The request object to send
    /// * `version` - Protocol version to use for encoding
    pub async fn send_request<T: Encodable + std::fmt::Debug>(
        &self,
        api_key: ApiKey,
        request: &T,
        version: i16,
    ) -> Result<Bytes> {
        let correlation_id = self.correlation_id.fetch_add(1, Ordering::SeqCst) as i32;

        debug!(
            "Sending {:?} request (correlation_id: {}, version: {})",
            api_key, correlation_id, version
        );

        let mut header = RequestHeader::default();
        header.request_api_key = api_key as i16;
        header.request_api_version = version;
        header.correlation_id = correlation_id;
        header.client_id = Some(StrBytes::from_static_str(CLIENT_ID));

        let header_version = api_key.request_header_version(version);

        let mut buf = Vec::new();
        header
            .encode(&mut buf, header_version)
            .map_err(|e| anyhow!("Failed to encode request header: {}", e))?;
        request
            .encode(&mut buf, version)
            .map_err(|e| anyhow!("Failed to encode request body: {}", e))?;

        // Kafka protocol uses 4-byte big-endian length prefix
        let message_size = buf.len() as i32;
        let mut message = Vec::with_capacity(4 + buf.len());
        message.extend_from_slice(&message_size.to_be_bytes());
        message.extend_from_slice(&buf);

        let mut stream = self.stream.lock().await;
        stream
            .write_all(&message)
            .await
            .map_err(|e| anyhow!("Failed to write request to stream: {}", e))?;

        let mut size_buf = [0u8; 4];
        stream.read_exact(&mut size_buf).await
            .map_err(|e| anyhow!("Failed to read response size: {} (this could indicate the broker closed the connection)", e))?;

        let response_size = i32::from_be_bytes(size_buf);
        if response_size < 0 || response_size as usize > MAX_RESPONSE_SIZE {
            return Err(anyhow!("Invalid response size: {} bytes", response_size));
        }
        debug!("Reading response body of {} bytes", response_size);

        let mut response_buf = vec![0u8; response_size as usize];
        stream
            .read_exact(&mut response_buf)
            .await
            .map_err(|e| anyhow!("Failed to read response body: {}", e))?;

        Ok(Bytes::from(response_buf))
    }

    /// Discovers and caches the broker's supported API versions
    async fn discover_api_versions(&mut self) -> Result<()> {
        debug!("Discovering supported API versions...");

        // Version 0 is universally supported
        let request = ApiVersionsRequest::default();
        let response_bytes = self.send_request(ApiKey::ApiVersions, &request, 0).await?;

        let mut cursor = std::io::Cursor::new(response_bytes.as_ref());

        let _response_header = ResponseHeader::decode(&mut cursor, 0)
            .map_err(|e| anyhow!("Failed to decode response header: {}", e))?;

        let response = ApiVersionsResponse::decode(&mut cursor, 0)
            .map_err(|e| anyhow!("Failed to decode ApiVersions response: {}", e))?;

        if response.error_code != 0 {
            return Err(anyhow!(
                "ApiVersions request rejected: {}",
                error_code_name(response.error_code)
            ));
        }

        for api_version in response.api_keys {
            self.api_versions.insert(
                api_version.api_key,
                (api_version.min_version, api_version.max_version),
            );

            if let Ok(api_key) = ApiKey::try_from(api_version.api_key) {
                debug!(
                    "API {:?}: versions {}-{}",
                    api_key, api_version.min_version, api_version.max_version
                );
            }
        }

        debug!("Discovered {} supported APIs", self.api_versions.len());
        Ok(())
    }

    /// Selects a compatible protocol version for the given API
    ///
    /// 1. If preferred version is within broker's supported range, use it
    /// 2. Otherwise use the broker's maximum supported version
    /// 3. If the API wasn't discovered, fall back to preferred version (best effort)
    pub fn get_supported_version(&self, api_key: ApiKey, preferred_version: i16) -> i16 {
        if let Some((min_version, max_version)) = self.api_versions.get(&(api_key as i16)) {
            if preferred_version >= *min_version && preferred_version <= *max_version {
                preferred_version
            } else {
                debug!(
                    "Preferred version {} for {:?} not supported (range: {}-{}), using {}",
                    preferred_version, api_key, min_version, max_version, max_version
                );
                *max_version
            }
        } else {
            warn!(
                "API {:?} not found in version discovery, using version {}",
                api_key, preferred_version
            );
            preferred_version
        }
    }

    /// Requests cluster metadata
    ///
    /// # Arguments
    /// * `topics` - `None` for every topic in the cluster, or the topics of interest
    pub async fn fetch_metadata(&self, topics: Option<&[&str]>) -> Result<ClusterMetadata> {
        let request = metadata_request(topics);
        let version = self.get_supported_version(ApiKey::Metadata, METADATA_VERSION);
        let response_bytes = self
            .send_request(ApiKey::Metadata, &request, version)
            .await
            .map_err(|e| anyhow!("Metadata request failed: {}", e))?;

        let mut cursor = std::io::Cursor::new(response_bytes.as_ref());
        let header_version = ApiKey::Metadata.response_header_version(version);
        let _response_header = ResponseHeader::decode(&mut cursor, header_version)
            .map_err(|e| anyhow!("Failed to decode response header: {}", e))?;
        let response = MetadataResponse::decode(&mut cursor, version)
            .map_err(|e| anyhow!("Failed to decode Metadata response: {}", e))?;

        let brokers = response
            .brokers
            .iter()
            .map(|broker| BrokerInfo {
                id: broker.node_id.0,
                host: broker.host.as_str().to_string(),
                port: broker.port,
            })
            .collect();

        let topics = response
            .topics
            .iter()
            .filter_map(|topic| {
                let name = topic.name.as_ref()?.0.as_str().to_string();
                let mut partitions: Vec<i32> =
                    topic.partitions.iter().map(|p| p.partition_index).collect();
                partitions.sort_unstable();
                Some(TopicInfo {
                    name,
                    error_code: topic.error_code,
                    partitions,
                })
            })
            .collect();

        let metadata = ClusterMetadata { brokers, topics };
        debug!(
            "Metadata: {} brokers, {} topics",
            metadata.brokers.len(),
            metadata.topics.len()
        );
        Ok(metadata)
    }

    /// Looks up one offset per partition by timestamp
    ///
    /// # Arguments
    /// * `topic` - Topic the partitions belong to
    /// * `partitions` - Partition indexes to look up
    /// * `timestamp` - Milliseconds since the epoch, or [`EARLIEST_TIMESTAMP`] / [`LATEST_TIMESTAMP`]
    ///
    /// # Returns
    /// * `Ok(Vec<(i32, i64)>)` - `(partition, offset)` pairs in response order
    /// * `Err(anyhow::Error)` - If the request fails or any partition reports an error
    pub async fn list_offsets(
        &self,
        topic: &str,
        partitions: &[i32],
        timestamp: i64,
    ) -> Result<Vec<(i32, i64)>> {
        let mut list_topic = ListOffsetsTopic::default();
        list_topic.name = TopicName(StrBytes::from_string(topic.to_string()));
        list_topic.partitions = partitions
            .iter()
            .map(|&partition| {
                let mut list_partition = ListOffsetsPartition::default();
                list_partition.partition_index = partition;
                list_partition.timestamp = timestamp;
                list_partition
            })
            .collect();

        let mut request = ListOffsetsRequest::default();
        request.replica_id = BrokerId(-1);
        request.topics.push(list_topic);

        let version = self.get_supported_version(ApiKey::ListOffsets, LIST_OFFSETS_VERSION);
        let response_bytes = self
            .send_request(ApiKey::ListOffsets, &request, version)
            .await
            .map_err(|e| anyhow!("ListOffsets request failed: {}", e))?;

        let mut cursor = std::io::Cursor::new(response_bytes.as_ref());
        let header_version = ApiKey::ListOffsets.response_header_version(version);
        let _response_header = ResponseHeader::decode(&mut cursor, header_version)
            .map_err(|e| anyhow!("Failed to decode response header: {}", e))?;
        let response = ListOffsetsResponse::decode(&mut cursor, version)
            .map_err(|e| anyhow!("Failed to decode ListOffsets response: {}", e))?;

        let mut offsets = Vec::new();
        for topic_response in &response.topics {
            for partition in &topic_response.partitions {
                if partition.error_code != 0 {
                    return Err(anyhow!(
                        "ListOffsets for partition {} of {} failed: {}",
                        partition.partition_index,
                        topic,
                        error_code_name(partition.error_code)
                    ));
                }
                // v0 answers with a list of offsets instead of a single one
                let offset = if version == 0 {
                    partition.old_style_offsets.first().copied().unwrap_or(-1)
                } else {
                    partition.offset
                };
                debug!(
                    "Partition {} of {}: offset {} for timestamp {}",
                    partition.partition_index, topic, offset, timestamp
                );
                offsets.push((partition.partition_index, offset));
            }
        }

        Ok(offsets)
    }

    /// Fetches records from explicit partition offsets of one topic
    ///
    /// # Arguments
    /// * `topic` - Topic to read from
    /// * `positions` - `(partition, offset)` pairs to fetch from
    /// * `options` - Wait time, size limits and CRC verification
    ///
    /// # Returns
    /// * `Ok(Vec<PartitionFetch>)` - One entry per partition present in the response
    /// * `Err(anyhow::Error)` - If the request fails or a batch fails CRC verification
    pub async fn fetch(
        &self,
        topic: &str,
        positions: &[(i32, i64)],
        options: &FetchOptions,
    ) -> Result<Vec<PartitionFetch>> {
        let fetch_partitions = positions
            .iter()
            .map(|&(partition, offset)| {
                let mut fetch_partition = FetchPartition::default();
                fetch_partition.partition = partition;
                fetch_partition.current_leader_epoch = -1;
                fetch_partition.fetch_offset = offset;
                fetch_partition.log_start_offset = -1;
                fetch_partition.partition_max_bytes = options.max_partition_bytes;
                fetch_partition
            })
            .collect();

        let mut fetch_topic = FetchTopic::default();
        fetch_topic.topic = TopicName(StrBytes::from_string(topic.to_string()));
        fetch_topic.partitions = fetch_partitions;

        let mut request = FetchRequest::default();
        request.max_wait_ms = options.max_wait_ms;
        request.min_bytes = 1;
        request.max_bytes = 50 * 1024 * 1024;
        request.isolation_level = 0;
        request.session_id = 0;
        request.session_epoch = -1;
        request.topics.push(fetch_topic);
        request.rack_id = StrBytes::from_static_str("");

        let version = self.get_supported_version(ApiKey::Fetch, FETCH_VERSION);
        let response_bytes = self
            .send_request(ApiKey::Fetch, &request, version)
            .await
            .map_err(|e| anyhow!("Fetch request failed: {}", e))?;

        let mut cursor = std::io::Cursor::new(response_bytes.as_ref());
        let header_version = ApiKey::Fetch.response_header_version(version);
        let _response_header = ResponseHeader::decode(&mut cursor, header_version)
            .map_err(|e| anyhow!("Failed to decode response header: {}", e))?;
        let response = FetchResponse::decode(&mut cursor, version)
            .map_err(|e| anyhow!("Failed to decode Fetch response: {}", e))?;

        if response.error_code != 0 {
            return Err(anyhow!(
                "Fetch request rejected: {}",
                error_code_name(response.error_code)
            ));
        }

        let mut results = Vec::new();
        for topic_response in &response.responses {
            for partition_response in &topic_response.partitions {
                let (records, next_offset) = match &partition_response.records {
                    Some(data) if partition_response.error_code == 0 => {
                        decode_records(partition_response.partition_index, data, options.verify_crc)?
                    }
                    _ => (Vec::new(), None),
                };

                debug!(
                    "Partition {}: error_code={}, records={}, high_watermark={}, log_start_offset={}",
                    partition_response.partition_index,
                    partition_response.error_code,
                    records.len(),
                    partition_response.high_watermark,
                    partition_response.log_start_offset
                );

                results.push(PartitionFetch {
                    partition: partition_response.partition_index,
                    error_code: partition_response.error_code,
                    high_watermark: partition_response.high_watermark,
                    log_start_offset: partition_response.log_start_offset,
                    records,
                    next_offset,
                });
            }
        }

        Ok(results)
    }
}

/// Builds a Metadata request; `None` asks for every topic in the cluster
fn metadata_request(topics: Option<&[&str]>) -> MetadataRequest {
    let mut request = MetadataRequest::default();
    request.topics = topics.map(|names| {
        names
            .iter()
            .map(|name| {
                let mut topic = MetadataRequestTopic::default();
                topic.name = Some(TopicName(StrBytes::from_string(name.to_string())));
                topic
            })
            .collect()
    });
    request
}

/// Decodes every complete record batch in a partition's record set
///
/// A trailing batch cut short by the fetch size limit is ignored; it will be
/// fetched whole on the next request.
fn decode_records(
    partition: i32,
    data: &Bytes,
    verify_crc: bool,
) -> Result<(Vec<FetchedRecord>, Option<i64>)> {
    let mut records = Vec::new();
    let mut next_offset = None;
    let mut cursor = std::io::Cursor::new(data.as_ref());

    while (cursor.position() as usize) < data.len() {
        let remaining = &data.as_ref()[cursor.position() as usize..];
        if record_batch_len(remaining).is_none() {
            debug!(
                "Partition {}: ignoring {} trailing bytes of a partial batch",
                partition,
                remaining.len()
            );
            break;
        }

        if verify_crc {
            verify_record_batch_crc(remaining)
                .map_err(|e| anyhow!("CRC verification failed for partition {}: {}", partition, e))?;
        }

        match RecordBatchDecoder::decode(&mut cursor) {
            Ok(record_set) => {
                for record in record_set.records {
                    next_offset = Some(next_offset.map_or(record.offset + 1, |n: i64| {
                        n.max(record.offset + 1)
                    }));
                    if record.control {
                        continue;
                    }
                    records.push(FetchedRecord {
                        offset: record.offset,
                        timestamp: record.timestamp,
                        key: record.key,
                        value: record.value,
                    });
                }
            }
            Err(e) => {
                warn!("Partition {}: failed to decode record batch: {}", partition, e);
                break;
            }
        }
    }

    Ok((records, next_offset))
}
