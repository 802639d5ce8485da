//! In-process stand-in for a Kafka broker, used by the async tests
//!
//! The fake answers ApiVersions, Metadata and Fetch over a real TCP socket
//! with `kafka-protocol` encoded responses, serving a single topic whose
//! partitions hold a fixed list of records.

use anyhow::{anyhow, bail, Result};
use bytes::{Bytes, BytesMut};
use kafka_protocol::messages::api_versions_response::{ApiVersion, ApiVersionsResponse};
use kafka_protocol::messages::fetch_request::FetchRequest;
use kafka_protocol::messages::fetch_response::{
    FetchResponse, FetchableTopicResponse, PartitionData,
};
use kafka_protocol::messages::list_offsets_request::ListOffsetsRequest;
use kafka_protocol::messages::list_offsets_response::{
    ListOffsetsPartitionResponse, ListOffsetsResponse, ListOffsetsTopicResponse,
};
use kafka_protocol::messages::metadata_request::MetadataRequest;
use kafka_protocol::messages::metadata_response::{
    MetadataResponse, MetadataResponseBroker, MetadataResponsePartition, MetadataResponseTopic,
};
use kafka_protocol::messages::{ApiKey, BrokerId, RequestHeader, ResponseHeader, TopicName};
use kafka_protocol::protocol::{Decodable, Encodable, StrBytes};
use kafka_protocol::records::{
    Compression, Record, RecordBatchEncoder, RecordEncodeOptions, TimestampType,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Timestamp stamped on the first record of every fake batch
pub const BASE_TIMESTAMP: i64 = 1_700_000_000_000;

/// API version ranges the fake advertises
const SUPPORTED_APIS: [(ApiKey, i16, i16); 4] = [
    (ApiKey::ApiVersions, 0, 3),
    (ApiKey::Metadata, 0, 1),
    (ApiKey::Fetch, 0, 5),
    (ApiKey::ListOffsets, 0, 1),
];

/// ListOffsets sentinel for the earliest offset
const EARLIEST_TIMESTAMP: i64 = -2;

type Payload<'a> = (Option<&'a [u8]>, Option<&'a [u8]>);

/// Encodes `records` as uncompressed v2 batches, the first record at `base_offset`
///
/// The encoder may split the records over several batches.
pub fn encode_batch(base_offset: i64, records: &[Payload<'_>]) -> Bytes {
    let records: Vec<Record> = records
        .iter()
        .enumerate()
        .map(|(i, (key, value))| Record {
            transactional: false,
            control: false,
            partition_leader_epoch: -1,
            producer_id: -1,
            producer_epoch: -1,
            timestamp_type: TimestampType::Creation,
            offset: base_offset + i as i64,
            sequence: -1,
            timestamp: BASE_TIMESTAMP + i as i64,
            key: key.map(Bytes::copy_from_slice),
            value: value.map(Bytes::copy_from_slice),
            headers: Default::default(),
        })
        .collect();

    let mut buf = BytesMut::new();
    RecordBatchEncoder::encode(
        &mut buf,
        records.iter(),
        &RecordEncodeOptions {
            version: 2,
            compression: Compression::None,
        },
    )
    .expect("record batch should encode");
    buf.freeze()
}

/// One partition of the fake topic; record `i` sits at offset `i`
#[derive(Debug, Clone, Default)]
pub struct FakePartition {
    index: i32,
    error_code: i16,
    /// Offsets below this have been deleted by retention
    log_start: i64,
    records: Vec<(Option<Vec<u8>>, Option<Vec<u8>>)>,
}

impl FakePartition {
    pub fn new(index: i32) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    pub fn with_records(mut self, records: Vec<Payload<'_>>) -> Self {
        self.records = records
            .into_iter()
            .map(|(k, v)| (k.map(<[u8]>::to_vec), v.map(<[u8]>::to_vec)))
            .collect();
        self
    }

    /// Every fetch of this partition answers with `code`
    pub fn with_error(mut self, code: i16) -> Self {
        self.error_code = code;
        self
    }

    /// Treats every record below `offset` as deleted
    pub fn with_log_start(mut self, offset: i64) -> Self {
        self.log_start = offset;
        self
    }

    fn high_watermark(&self) -> i64 {
        self.records.len() as i64
    }
}

struct FakeState {
    topic: String,
    partitions: Vec<FakePartition>,
    fetches: AtomicUsize,
}

impl FakeState {
    fn partition(&self, topic: &str, index: i32) -> Option<&FakePartition> {
        if topic != self.topic {
            return None;
        }
        self.partitions.iter().find(|p| p.index == index)
    }
}

/// A fake broker listening on an ephemeral localhost port
pub struct FakeBroker {
    addr: SocketAddr,
    state: Arc<FakeState>,
    accept_task: JoinHandle<()>,
}

impl FakeBroker {
    pub async fn start(topic: &str, partitions: Vec<FakePartition>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake broker");
        let addr = listener.local_addr().expect("fake broker address");
        let state = Arc::new(FakeState {
            topic: topic.to_string(),
            partitions,
            fetches: AtomicUsize::new(0),
        });

        let accept_state = state.clone();
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = accept_state.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, state).await;
                });
            }
        });

        Self {
            addr,
            state,
            accept_task,
        }
    }

    pub fn addr(&self) -> String {
        self.addr.to_string()
    }

    /// Number of Fetch requests served so far
    pub fn fetch_count(&self) -> usize {
        self.state.fetches.load(Ordering::SeqCst)
    }
}

impl Drop for FakeBroker {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn serve(mut stream: TcpStream, state: Arc<FakeState>) -> Result<()> {
    loop {
        let mut size_buf = [0u8; 4];
        if stream.read_exact(&mut size_buf).await.is_err() {
            return Ok(());
        }
        let mut frame = vec![0u8; i32::from_be_bytes(size_buf) as usize];
        stream.read_exact(&mut frame).await?;
        if frame.len() < 4 {
            bail!("request frame too short");
        }

        let api_key = i16::from_be_bytes([frame[0], frame[1]]);
        let version = i16::from_be_bytes([frame[2], frame[3]]);
        let api_key =
            ApiKey::try_from(api_key).map_err(|_| anyhow!("unknown api key {}", api_key))?;

        let mut buf = Bytes::from(frame);
        let header = RequestHeader::decode(&mut buf, api_key.request_header_version(version))
            .map_err(|e| anyhow!("bad request header: {}", e))?;

        let mut body = Vec::new();
        match api_key {
            ApiKey::ApiVersions => api_versions_response()
                .encode(&mut body, version)
                .map_err(|e| anyhow!("{}", e))?,
            ApiKey::Metadata => {
                let request = MetadataRequest::decode(&mut buf, version)
                    .map_err(|e| anyhow!("bad metadata request: {}", e))?;
                metadata_response(&state, &request)
                    .encode(&mut body, version)
                    .map_err(|e| anyhow!("{}", e))?
            }
            ApiKey::Fetch => {
                let request = FetchRequest::decode(&mut buf, version)
                    .map_err(|e| anyhow!("bad fetch request: {}", e))?;
                state.fetches.fetch_add(1, Ordering::SeqCst);
                fetch_response(&state, &request, version)
                    .encode(&mut body, version)
                    .map_err(|e| anyhow!("{}", e))?
            }
            ApiKey::ListOffsets => {
                let request = ListOffsetsRequest::decode(&mut buf, version)
                    .map_err(|e| anyhow!("bad list offsets request: {}", e))?;
                list_offsets_response(&state, &request, version)
                    .encode(&mut body, version)
                    .map_err(|e| anyhow!("{}", e))?
            }
            other => bail!("fake broker does not handle {:?}", other),
        }

        let mut response_header = ResponseHeader::default();
        response_header.correlation_id = header.correlation_id;
        let mut out = Vec::new();
        response_header
            .encode(&mut out, api_key.response_header_version(version))
            .map_err(|e| anyhow!("{}", e))?;
        out.extend_from_slice(&body);

        stream.write_all(&(out.len() as i32).to_be_bytes()).await?;
        stream.write_all(&out).await?;
    }
}

fn api_versions_response() -> ApiVersionsResponse {
    let mut response = ApiVersionsResponse::default();
    for (api_key, min_version, max_version) in SUPPORTED_APIS {
        let mut api_version = ApiVersion::default();
        api_version.api_key = api_key as i16;
        api_version.min_version = min_version;
        api_version.max_version = max_version;
        response.api_keys.push(api_version);
    }
    response
}

fn metadata_response(state: &FakeState, request: &MetadataRequest) -> MetadataResponse {
    let mut broker = MetadataResponseBroker::default();
    broker.node_id = BrokerId(1);
    broker.host = StrBytes::from_static_str("127.0.0.1");
    broker.port = 9092;

    let requested: Vec<String> = match &request.topics {
        None => vec![state.topic.clone()],
        Some(topics) => topics
            .iter()
            .filter_map(|t| t.name.as_ref().map(|n| n.0.as_str().to_string()))
            .collect(),
    };

    let mut response = MetadataResponse::default();
    response.brokers.push(broker);
    response.controller_id = BrokerId(1);
    for name in requested {
        let mut topic = MetadataResponseTopic::default();
        topic.name = Some(TopicName(StrBytes::from_string(name.clone())));
        if name == state.topic {
            for fake in &state.partitions {
                let mut partition = MetadataResponsePartition::default();
                partition.partition_index = fake.index;
                partition.leader_id = BrokerId(1);
                partition.replica_nodes = vec![BrokerId(1)];
                partition.isr_nodes = vec![BrokerId(1)];
                topic.partitions.push(partition);
            }
        } else {
            topic.error_code = 3;
        }
        response.topics.push(topic);
    }
    response
}

fn list_offsets_response(
    state: &FakeState,
    request: &ListOffsetsRequest,
    version: i16,
) -> ListOffsetsResponse {
    let mut response = ListOffsetsResponse::default();
    for list_topic in &request.topics {
        let mut topic_response = ListOffsetsTopicResponse::default();
        topic_response.name = list_topic.name.clone();

        for requested in &list_topic.partitions {
            let mut data = ListOffsetsPartitionResponse::default();
            data.partition_index = requested.partition_index;
            match state.partition(list_topic.name.0.as_str(), requested.partition_index) {
                None => data.error_code = 3,
                Some(fake) => {
                    let offset = if requested.timestamp == EARLIEST_TIMESTAMP {
                        fake.log_start
                    } else {
                        fake.high_watermark()
                    };
                    // fields that do not exist in the negotiated version must stay at their defaults
                    if version == 0 {
                        data.old_style_offsets = vec![offset];
                    } else {
                        data.offset = offset;
                    }
                }
            }
            topic_response.partitions.push(data);
        }
        response.topics.push(topic_response);
    }
    response
}

fn fetch_response(state: &FakeState, request: &FetchRequest, version: i16) -> FetchResponse {
    let mut response = FetchResponse::default();
    for fetch_topic in &request.topics {
        let mut topic_response = FetchableTopicResponse::default();
        topic_response.topic = fetch_topic.topic.clone();

        for fetch_partition in &fetch_topic.partitions {
            let mut data = PartitionData::default();
            data.partition_index = fetch_partition.partition;

            let fake = state.partition(fetch_topic.topic.0.as_str(), fetch_partition.partition);

            match fake {
                None => data.error_code = 3,
                Some(fake) if fake.error_code != 0 => data.error_code = fake.error_code,
                Some(fake) if fetch_partition.fetch_offset < fake.log_start => {
                    data.error_code = 1;
                    data.high_watermark = fake.high_watermark();
                }
                Some(fake) => {
                    data.high_watermark = fake.high_watermark();
                    data.last_stable_offset = fake.high_watermark();
                    if version >= 5 {
                        data.log_start_offset = fake.log_start;
                    }
                    let start = fetch_partition.fetch_offset as usize;
                    let pending: Vec<Payload<'_>> = fake
                        .records
                        .iter()
                        .skip(start)
                        .map(|(k, v)| (k.as_deref(), v.as_deref()))
                        .collect();
                    data.records = Some(if pending.is_empty() {
                        Bytes::new()
                    } else {
                        encode_batch(start as i64, &pending)
                    });
                }
            }
            topic_response.partitions.push(data);
        }
        response.responses.push(topic_response);
    }
    response
}
