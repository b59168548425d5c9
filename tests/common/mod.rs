#![allow(dead_code)]

pub use flowdag_test_utils::builders;
pub use flowdag_test_utils::fakes;
pub use flowdag_test_utils::{init_tracing, with_timeout};

use std::sync::Arc;

use serde_json::Value;

use flowdag::config::FlowConfig;
use flowdag::engine::FlowOperations;
use flowdag::store::MemoryStore;
use flowdag::types::Context;

use fakes::{FakeDispatcher, ManualClock, RecordingCallback};

/// Engine wired to in-memory fakes, inline executor, clock at t = 1000s.
pub struct Harness {
    pub ops: FlowOperations,
    pub store: Arc<MemoryStore>,
    pub dispatcher: Arc<FakeDispatcher>,
    pub callback: Arc<RecordingCallback>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(FlowConfig::default())
    }

    pub fn with_config(config: FlowConfig) -> Self {
        init_tracing();
        let store = Arc::new(MemoryStore::new());
        let dispatcher = Arc::new(FakeDispatcher::new());
        let callback = Arc::new(RecordingCallback::new());
        let clock = Arc::new(ManualClock::new(1_000_000));
        let ops = FlowOperations::builder(config)
            .memory_store(store.clone())
            .dispatcher(dispatcher.clone())
            .callback(callback.clone())
            .clock(clock.clone())
            .build();
        Self {
            ops,
            store,
            dispatcher,
            callback,
            clock,
        }
    }

    /// Advance the clock and deliver whatever became due.
    pub async fn tick(&self, seconds: i64) -> usize {
        self.clock.advance_secs(seconds);
        self.ops
            .checker()
            .check_once(&self.ops)
            .await
            .expect("check cycle failed")
    }
}

/// `json!({...})` → `Context`.
pub fn obj(value: Value) -> Context {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}
