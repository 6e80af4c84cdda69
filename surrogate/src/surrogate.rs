//! Surrogate (C6): the client-facing RPC front. Owns the pending-tasks
//! coordinator that blocks calling tasks on a per-request wait object until
//! a callback (or a timeout) releases them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use surrogate_shared::{ExecId, OutboundStatus, SurrogateError, SurrogateResult, TaskInput};

use crate::config::SurrogateConfig;
use crate::datastore::{InMemoryDataStore, RemoteDataHandle, RemoteDataStore};
use crate::jailor::{Jailor, JailorHandle, OutboundCallback};
use crate::kernel::TaskKernel;
use crate::metrics::{MetricsSnapshot, RuntimeMetrics};
use crate::registry::TaskRegistry;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const MAINT_POLL: Duration = Duration::from_secs(1);

/// Safety-net bound on waiting for a core-worker callback, independent of
/// the request's own `timeout`. A core worker that crashes outright (its
/// monitor task dies without ever emitting a callback, unlike the ordinary
/// kill-escalation path in `core_worker.rs`) would otherwise wedge the
/// caller for as long as the request's own timeout allows — this caps the
/// wait regardless of what the caller asked for.
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(180);

/// A pending-tasks cell: either still waiting, or holding the callback's
/// result pair (the wait object slot is reused for the result, never both
/// at once).
enum PendingCell {
    Waiting(Arc<Notify>),
    Completed(OutboundStatus, Value),
}

struct PendingState {
    cells: HashMap<ExecId, PendingCell>,
    activity: i64,
}

/// Outcome of [`Surrogate::perform_task`]: the payload alone, or paired
/// with a profiling complexity figure when `profile` was requested.
#[derive(Debug, Clone, PartialEq)]
pub enum PerformOutcome {
    Value(Value),
    Profiled { payload: Value, complexity: f64 },
}

pub struct Surrogate {
    jailor: JailorHandle,
    pending: Mutex<PendingState>,
    datastore: Arc<dyn RemoteDataStore>,
    config: SurrogateConfig,
    metrics: RuntimeMetrics,
    reader: JoinHandle<()>,
    maintenance: JoinHandle<()>,
}

impl Surrogate {
    /// Bring up the Jailor (and its core-worker pool), the outbound
    /// callback reader, and the maintenance loop.
    pub fn start(registry: Arc<TaskRegistry>, kernel: Arc<TaskKernel>, config: SurrogateConfig) -> Arc<Self> {
        Self::start_with_datastore(registry, kernel, config, Arc::new(InMemoryDataStore::new()))
    }

    pub fn start_with_datastore(
        registry: Arc<TaskRegistry>,
        kernel: Arc<TaskKernel>,
        config: SurrogateConfig,
        datastore: Arc<dyn RemoteDataStore>,
    ) -> Arc<Self> {
        let cores = config.cpu.cores;
        let (jailor, outbound_rx) = Jailor::spawn(registry, cores, kernel);

        let pending = Mutex::new(PendingState {
            cells: HashMap::new(),
            activity: 0,
        });

        let surrogate = Arc::new_cyclic(|weak: &std::sync::Weak<Self>| {
            let reader_weak = weak.clone();
            let reader = tokio::spawn(callback_reader(reader_weak, outbound_rx));

            let maint_weak = weak.clone();
            let maintenance = tokio::spawn(maintenance_loop(maint_weak));

            Self {
                jailor,
                pending,
                datastore,
                config,
                metrics: RuntimeMetrics::new(),
                reader,
                maintenance,
            }
        });

        surrogate
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn ping(&self, value: Value) -> Value {
        value
    }

    pub async fn install_task(&self, name: &str, code: &str) -> SurrogateResult<()> {
        self.jailor.install_task(name.to_string(), code.to_string()).await
    }

    pub async fn has_task(&self, name: &str) -> SurrogateResult<bool> {
        self.jailor.task_exists(name.to_string()).await
    }

    /// Adjusts the activity counter: `+1` on intent to call, `-1` when a
    /// caller reports the call never actually happened. Each attempt must
    /// be paired by the caller — mismatched pairs are not deduplicated.
    pub async fn perform_task_intent(&self, failure: bool) {
        let mut state = self.pending.lock().await;
        if failure {
            state.activity -= 1;
        } else {
            state.activity += 1;
        }
    }

    pub async fn resolve_data_handle(&self, handle: RemoteDataHandle) -> SurrogateResult<Value> {
        self.datastore.resolve(handle)
    }

    pub async fn retain_data_handle(&self, handle: RemoteDataHandle) -> SurrogateResult<()> {
        self.datastore.retain(handle)
    }

    pub async fn expire_data_handle(&self, handle: RemoteDataHandle) -> SurrogateResult<()> {
        self.datastore.expire(handle)
    }

    pub async fn store_data(&self, payload: Value) -> SurrogateResult<RemoteDataHandle> {
        self.datastore.store(payload)
    }

    /// The key algorithm: resolve handles in the input, dispatch under the
    /// pending-tasks lock, wait with a timeout, then translate the result.
    pub async fn perform_task(
        &self,
        name: &str,
        input: TaskInput,
        timeout: Option<Duration>,
        store: bool,
        profile: bool,
    ) -> SurrogateResult<PerformOutcome> {
        let input = self.resolve_input(input)?;
        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);

        let notify = Arc::new(Notify::new());

        // Holds the pending-tasks lock across the dispatch `.await` itself,
        // matching the original: the wait object is registered before the
        // lock is released, so a callback racing in before we start waiting
        // can never be missed. `pending` is a `tokio::sync::Mutex` precisely
        // so this doesn't block the executor thread while held.
        let mut state = self.pending.lock().await;
        let start_activity = state.activity;
        let execid = self
            .jailor
            .perform_task(name.to_string(), input)
            .await
            .map_err(|e| {
                SurrogateError::Internal(format!(
                    "Error registering task with execution environment: {}",
                    e
                ))
            })?;
        state.cells.insert(execid, PendingCell::Waiting(notify.clone()));
        let start_time = profile.then(Instant::now);
        drop(state);

        let wait_bound = timeout.min(CALLBACK_TIMEOUT);
        let _ = tokio::time::timeout(wait_bound, notify.notified()).await;

        let stop_activity = if profile { Some(self.pending.lock().await.activity) } else { None };
        let stop_time = profile.then(Instant::now);

        // Decrement activity, then pop the cell: collapses the original's two
        // separate lock acquisitions into one, which only narrows the race
        // window between them.
        let cell = {
            let mut state = self.pending.lock().await;
            state.activity -= 1;
            state.cells.remove(&execid)
        };

        let (status, output) = match cell {
            Some(PendingCell::Completed(status, value)) => (status, value),
            Some(PendingCell::Waiting(_)) | None => {
                self.metrics.record_timeout();
                return Err(SurrogateError::Timeout);
            }
        };

        match status {
            OutboundStatus::Result => {
                self.metrics.record_success();
                let payload = if store { self.store_output(output)? } else { output };
                match (start_time, stop_time, stop_activity) {
                    (Some(start_time), Some(stop_time), Some(stop_activity)) => {
                        let complexity =
                            self.complexity(start_activity, stop_activity, start_time, stop_time);
                        Ok(PerformOutcome::Profiled { payload, complexity })
                    }
                    _ => Ok(PerformOutcome::Value(payload)),
                }
            }
            OutboundStatus::Error => {
                let message = output.as_str().map(|s| s.to_string()).unwrap_or_else(|| output.to_string());
                if message == "task was killed." {
                    self.metrics.record_killed();
                    Err(SurrogateError::Killed)
                } else {
                    self.metrics.record_error();
                    Err(SurrogateError::Task(message))
                }
            }
            OutboundStatus::Status => Err(SurrogateError::UnknownStatus("STATUS".to_string())),
        }
    }

    fn complexity(&self, start_activity: i64, stop_activity: i64, start: Instant, stop: Instant) -> f64 {
        let cores = self.config.cpu.cores.max(1) as f64;
        let activity_level = ((start_activity as f64 / cores) + (stop_activity as f64 / cores)) / 2.0;
        let activity_level = activity_level.max(1.0);
        stop.duration_since(start).as_secs_f64() * self.config.cpu.strength / activity_level
    }

    fn store_output(&self, output: Value) -> SurrogateResult<Value> {
        match output {
            Value::Array(items) => {
                let mut handles = Vec::with_capacity(items.len());
                for item in items {
                    handles.push(Value::String(self.datastore.store(item)?.to_string()));
                }
                Ok(Value::Array(handles))
            }
            other => Ok(Value::String(self.datastore.store(other)?.to_string())),
        }
    }

    fn resolve_input(&self, input: TaskInput) -> SurrogateResult<TaskInput> {
        match input {
            TaskInput::Kwargs(map) => {
                let mut resolved = std::collections::BTreeMap::new();
                for (key, value) in map {
                    resolved.insert(key, self.resolve_value(value)?);
                }
                Ok(TaskInput::Kwargs(resolved))
            }
            TaskInput::Args(args) => {
                let mut resolved = Vec::with_capacity(args.len());
                for value in args {
                    resolved.push(self.resolve_value(value)?);
                }
                Ok(TaskInput::Args(resolved))
            }
            TaskInput::One(value) => Ok(TaskInput::One(self.resolve_value(value)?)),
        }
    }

    fn resolve_value(&self, value: Value) -> SurrogateResult<Value> {
        match data_handle_ref(&value) {
            Some(handle) => self.datastore.resolve(handle),
            None => Ok(value),
        }
    }
}

impl Drop for Surrogate {
    fn drop(&mut self) {
        self.reader.abort();
        self.maintenance.abort();
    }
}

/// Remote data handles travel over the wire tagged as `{"$data_handle":
/// "<uuid>"}` rather than bare strings, so an ordinary string payload is
/// never mistaken for one.
fn data_handle_ref(value: &Value) -> Option<RemoteDataHandle> {
    value
        .as_object()
        .filter(|obj| obj.len() == 1)
        .and_then(|obj| obj.get("$data_handle"))
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
}

async fn callback_reader(surrogate: std::sync::Weak<Surrogate>, mut outbound_rx: tokio::sync::mpsc::UnboundedReceiver<OutboundCallback>) {
    while let Some(callback) = outbound_rx.recv().await {
        let Some(surrogate) = surrogate.upgrade() else { break };
        let mut state = surrogate.pending.lock().await;
        match state.cells.remove(&callback.execid) {
            Some(PendingCell::Waiting(notify)) => {
                state
                    .cells
                    .insert(callback.execid, PendingCell::Completed(callback.status, callback.value));
                notify.notify_one();
            }
            Some(completed @ PendingCell::Completed(..)) => {
                tracing::warn!(execid = callback.execid, "duplicate callback for already-completed execid");
                state.cells.insert(callback.execid, completed);
            }
            None => {
                // The waiter already timed out and popped the cell; drop silently.
            }
        }
    }
}

async fn maintenance_loop(surrogate: std::sync::Weak<Surrogate>) {
    let mut tick: u64 = 0;
    let mut interval = tokio::time::interval(MAINT_POLL);
    loop {
        interval.tick().await;
        let Some(surrogate) = surrogate.upgrade() else { break };
        if tick % 10 == 0 {
            surrogate.datastore.cleanup();
        }
        tick = tick.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn start() -> Arc<Surrogate> {
        let dir = tempdir().unwrap().into_path();
        let registry = Arc::new(TaskRegistry::open(dir).unwrap());
        let kernel = Arc::new(TaskKernel::with_demo_fixtures());
        Surrogate::start(registry, kernel, SurrogateConfig::default())
    }

    #[tokio::test]
    async fn ping_echoes() {
        let surrogate = start();
        assert_eq!(surrogate.ping(serde_json::json!(42)), serde_json::json!(42));
    }

    #[tokio::test]
    async fn perform_task_returns_result() {
        let surrogate = start();
        surrogate
            .install_task("demo.math.add", "def perform(a, b):\n    return a + b\n")
            .await
            .unwrap();

        let mut kwargs = BTreeMap::new();
        kwargs.insert("a".to_string(), serde_json::json!(2));
        kwargs.insert("b".to_string(), serde_json::json!(3));

        let outcome = surrogate
            .perform_task("demo.math.add", TaskInput::Kwargs(kwargs), None, false, false)
            .await
            .unwrap();
        assert_eq!(outcome, PerformOutcome::Value(serde_json::json!(5.0)));
    }

    #[tokio::test]
    async fn perform_task_propagates_task_error() {
        let surrogate = start();
        surrogate.install_task("demo.fail.bang", "pass\n").await.unwrap();

        let err = surrogate
            .perform_task("demo.fail.bang", TaskInput::Args(vec![]), None, false, false)
            .await
            .unwrap_err();
        match err {
            SurrogateError::Task(msg) => assert_eq!(msg, "boom"),
            other => panic!("expected Task error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn perform_task_times_out() {
        let surrogate = start();
        surrogate.install_task("demo.loop.spin", "pass\n").await.unwrap();

        let err = surrogate
            .perform_task(
                "demo.loop.spin",
                TaskInput::Args(vec![]),
                Some(Duration::from_millis(50)),
                false,
                false,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SurrogateError::Timeout));
    }

    #[tokio::test]
    async fn perform_task_with_store_returns_handle() {
        let surrogate = start();
        surrogate
            .install_task("demo.math.add", "def perform(a, b):\n    return a + b\n")
            .await
            .unwrap();

        let mut kwargs = BTreeMap::new();
        kwargs.insert("a".to_string(), serde_json::json!(2));
        kwargs.insert("b".to_string(), serde_json::json!(3));

        let outcome = surrogate
            .perform_task("demo.math.add", TaskInput::Kwargs(kwargs), None, true, false)
            .await
            .unwrap();
        let PerformOutcome::Value(Value::String(handle_str)) = outcome else {
            panic!("expected a stored handle");
        };
        let handle: RemoteDataHandle = handle_str.parse().unwrap();
        assert_eq!(surrogate.resolve_data_handle(handle).await.unwrap(), serde_json::json!(5.0));
    }

    #[tokio::test]
    async fn perform_task_intent_adjusts_activity() {
        let surrogate = start();
        surrogate.perform_task_intent(false).await;
        surrogate.perform_task_intent(false).await;
        surrogate.perform_task_intent(true).await;
        assert_eq!(surrogate.pending.lock().await.activity, 1);
    }

    #[tokio::test]
    async fn concurrent_perform_task_calls_do_not_cross_deliver() {
        let surrogate = start();
        surrogate
            .install_task("demo.math.add", "def perform(a, b):\n    return a + b\n")
            .await
            .unwrap();

        let mut kwargs_a = BTreeMap::new();
        kwargs_a.insert("a".to_string(), serde_json::json!(10));
        kwargs_a.insert("b".to_string(), serde_json::json!(1));

        let mut kwargs_b = BTreeMap::new();
        kwargs_b.insert("a".to_string(), serde_json::json!(100));
        kwargs_b.insert("b".to_string(), serde_json::json!(2));

        let call_a = surrogate.perform_task("demo.math.add", TaskInput::Kwargs(kwargs_a), None, false, false);
        let call_b = surrogate.perform_task("demo.math.add", TaskInput::Kwargs(kwargs_b), None, false, false);
        let (result_a, result_b) = tokio::join!(call_a, call_b);

        assert_eq!(result_a.unwrap(), PerformOutcome::Value(serde_json::json!(11.0)));
        assert_eq!(result_b.unwrap(), PerformOutcome::Value(serde_json::json!(102.0)));
    }
}
