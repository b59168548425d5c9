use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use flowdag::callback::{CallbackEvent, DagCallback};
use flowdag::clock::Clock;
use flowdag::dag::{DagEvent, TaskCategory};
use flowdag::dispatch::{DispatchInfo, DispatchResponse, Dispatcher};
use flowdag::errors::{FlowError, Result};
use flowdag::types::{BoxFuture, Context};

/// Scripted answer of [`FakeDispatcher`] for one attempt.
#[derive(Debug, Clone)]
pub enum Scripted {
    Complete(Context),
    Accept,
    Fail(String),
}

/// A fake dispatcher that:
/// - records every dispatch it receives
/// - answers from a per-task script, falling back to echoing the input.
#[derive(Default)]
pub struct FakeDispatcher {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<DispatchInfo>>,
}

impl FakeDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue answers for the next attempts of `task`.
    pub fn script(&self, task: &str, answers: Vec<Scripted>) -> &Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(task.to_string())
            .or_default()
            .extend(answers);
        self
    }

    pub fn calls(&self) -> Vec<DispatchInfo> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, task: &str) -> Vec<DispatchInfo> {
        self.calls()
            .into_iter()
            .filter(|c| c.task_name == task)
            .collect()
    }
}

impl Dispatcher for FakeDispatcher {
    fn dispatch(
        &self,
        _category: TaskCategory,
        info: DispatchInfo,
    ) -> BoxFuture<'_, Result<DispatchResponse>> {
        let answer = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&info.task_name)
            .and_then(VecDeque::pop_front);
        self.calls.lock().unwrap().push(info.clone());

        Box::pin(async move {
            match answer {
                Some(Scripted::Complete(output)) => Ok(DispatchResponse::Completed { output }),
                Some(Scripted::Accept) => Ok(DispatchResponse::Accepted),
                Some(Scripted::Fail(msg)) => Err(FlowError::Dispatch(msg)),
                None => Ok(DispatchResponse::Completed { output: info.input }),
            }
        })
    }
}

/// Callback that keeps every event for later assertions.
#[derive(Default)]
pub struct RecordingCallback {
    events: Mutex<Vec<CallbackEvent>>,
}

impl RecordingCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CallbackEvent> {
        self.events.lock().unwrap().clone()
    }

    /// `(event, task name)` pairs in emission order.
    pub fn signals(&self) -> Vec<(DagEvent, Option<String>)> {
        self.events()
            .into_iter()
            .map(|e| (e.event, e.task.map(|t| t.name)))
            .collect()
    }

    pub fn count(&self, event: DagEvent) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event == event)
            .count()
    }
}

impl DagCallback for RecordingCallback {
    fn on_event(&self, event: &CallbackEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(start_ms),
        }
    }

    pub fn advance_secs(&self, seconds: i64) {
        self.now_ms.fetch_add(seconds * 1000, Ordering::SeqCst);
    }

    pub fn set_ms(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}
