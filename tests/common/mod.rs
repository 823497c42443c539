#![allow(dead_code)]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use alloy::{
    json_abi::{Event, EventParam},
    primitives::{Address, B256, Bytes, LogData},
    providers::{RootProvider, mock::Asserter},
    rpc::{client::RpcClient, types::Log},
};
use async_trait::async_trait;
use event_streams::{
    EventSink, EventStream, LogDecoder, MemoryCheckpointStore, NodeClient, NodeClientBuilder,
    RawLogDecoder, StreamError, StreamEvent, StreamManager, StreamSpec, SubscriptionRequest,
};

pub const STREAM_ID: &str = "main";

pub fn count_increased_event() -> Event {
    Event {
        name: "CountIncreased".into(),
        inputs: vec![EventParam {
            ty: "uint256".into(),
            name: "newCount".into(),
            indexed: false,
            components: vec![],
            internal_type: None,
        }],
        anonymous: false,
    }
}

pub fn log_at_block(event: &Event, block_number: u64) -> Log {
    Log {
        inner: alloy::primitives::Log {
            address: Address::repeat_byte(0x11),
            data: LogData::new_unchecked(vec![event.selector()], Bytes::from(vec![0u8; 32])),
        },
        block_number: Some(block_number),
        block_hash: Some(B256::repeat_byte(0x33)),
        log_index: Some(0),
        ..Default::default()
    }
}

pub fn mocked_node(asserter: &Asserter) -> NodeClient {
    let provider = RootProvider::new(RpcClient::mocked(asserter.clone()));
    NodeClientBuilder::fragile(provider).call_timeout(Duration::from_secs(2)).build()
}

/// Sink that records every delivered event, optionally failing for entries
/// from one specific block.
#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<StreamEvent>>,
    fail_on_block: Option<u64>,
}

impl CollectingSink {
    pub fn failing_on_block(block_number: u64) -> Self {
        Self { events: Mutex::new(Vec::new()), fail_on_block: Some(block_number) }
    }

    pub fn events(&self) -> Vec<StreamEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn delivered_blocks(&self) -> Vec<u64> {
        self.events().iter().filter_map(|event| event.log.block_number).collect()
    }
}

#[async_trait]
impl EventSink for CollectingSink {
    async fn deliver(&self, event: StreamEvent) -> Result<(), StreamError> {
        if self.fail_on_block.is_some() && event.log.block_number == self.fail_on_block {
            return Err(StreamError::Delivery("sink rejected entry".into()));
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// Decoder that refuses entries from one specific block.
pub struct FailingDecoder {
    pub fail_on_block: u64,
}

impl LogDecoder for FailingDecoder {
    fn decode(&self, event: &Event, entry: &Log) -> Result<serde_json::Value, StreamError> {
        if entry.block_number == Some(self.fail_on_block) {
            return Err(StreamError::Decode("undecodable entry".into()));
        }
        RawLogDecoder.decode(event, entry)
    }
}

pub struct EngineSetup {
    pub asserter: Asserter,
    pub manager: Arc<StreamManager>,
    pub store: Arc<MemoryCheckpointStore>,
    pub sink: Arc<CollectingSink>,
}

pub async fn setup_engine(spec: StreamSpec, sink: Arc<CollectingSink>) -> EngineSetup {
    setup_engine_with_decoder(spec, sink, Box::new(RawLogDecoder)).await
}

pub async fn setup_engine_with_decoder(
    spec: StreamSpec,
    sink: Arc<CollectingSink>,
    decoder: Box<dyn LogDecoder>,
) -> EngineSetup {
    let asserter = Asserter::new();
    let store = Arc::new(MemoryCheckpointStore::new());
    let checkpoints: Arc<dyn event_streams::CheckpointStore> = store.clone();
    let manager = Arc::new(StreamManager::new(mocked_node(&asserter), checkpoints));

    manager
        .add_stream(EventStream::new(spec, Box::new(Arc::clone(&sink)), decoder))
        .await
        .expect("stream registration");

    EngineSetup { asserter, manager, store, sink }
}

pub fn request(id: &str, from_block: &str) -> SubscriptionRequest {
    SubscriptionRequest {
        id: id.into(),
        name: None,
        address: Some(Address::repeat_byte(0x11)),
        event: count_increased_event(),
        stream: STREAM_ID.into(),
        from_block: Some(from_block.into()),
    }
}
