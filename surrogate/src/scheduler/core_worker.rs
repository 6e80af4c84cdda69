//! Core Micro-Scheduler (C3): one monitor loop per core, running untrusted
//! task bodies with bounded-CPU fairness and kill escalation.
//!
//! A literal stackless-tasklet scheduler counting interpreter instructions
//! has no equivalent in safe Rust. Each scheduled task body instead runs on
//! its own `tokio::task::spawn_blocking` slot (standing in for a dedicated
//! OS thread), and while any task is running the monitor polls completion
//! once per `SLICE_TICK`. A task still running at the next poll has used up
//! one whole slice — exactly the event the original instruction-counting
//! scheduler used to preempt a tasklet — so one `SLICE_TICK` plays the role
//! of `STEP_SIZE`. When nothing is running the monitor instead sleeps the
//! longer `SLEEP_TIME`, matching the original's idle branch. Escalation sets
//! a cooperative-cancellation flag; a task that ignores it through one
//! further slice is abandoned (its `JoinHandle` is dropped, not joined) and
//! reported killed, mirroring how the original handles a tasklet that
//! swallows its termination exception.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use surrogate_shared::{CallbackStatus, ExecId, TaskInput};

use crate::kernel::{TaskContext, TaskKernel};

pub const STEP_SIZE: u64 = 1_000_000;
pub const SLEEP_TIME: Duration = Duration::from_millis(10);
pub const MAX_SINS: i64 = 1000;

/// Wall-clock stand-in for one `STEP_SIZE`-instruction slice: the cadence at
/// which the monitor re-polls in-flight task handles while any are running.
/// Chosen far shorter than `SLEEP_TIME`, which governs the idle case instead.
pub const SLICE_TICK: Duration = Duration::from_millis(1);

/// One item draining off a core's input queue.
pub struct CoreJob {
    pub execid: ExecId,
    pub task_name: String,
    pub input: TaskInput,
}

/// A callback emitted by a core worker, destined for the Jailor by way of
/// the dispatch scheduler.
#[derive(Debug, Clone)]
pub struct CoreCallback {
    pub execid: ExecId,
    pub status: CallbackStatus,
    pub value: serde_json::Value,
}

struct RunningTask {
    execid: ExecId,
    task_name: String,
    handle: JoinHandle<Result<serde_json::Value, String>>,
    cancel: Arc<AtomicBool>,
}

/// Handle to a spawned core worker: an input queue and the join handle of
/// its monitor loop.
pub struct CoreWorker {
    index: usize,
    input_tx: mpsc::UnboundedSender<CoreJob>,
    monitor: JoinHandle<()>,
}

impl CoreWorker {
    /// Spawn a core worker's monitor loop, backed by `kernel` for task
    /// dispatch and emitting callbacks onto `callback_tx`.
    pub fn spawn(index: usize, kernel: Arc<TaskKernel>, callback_tx: mpsc::UnboundedSender<CoreCallback>) -> Self {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let monitor = tokio::spawn(monitor_loop(index, kernel, input_rx, callback_tx));
        Self {
            index,
            input_tx,
            monitor,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Enqueue a job for this core. Non-blocking; the per-core queue is
    /// unbounded.
    pub fn enqueue(&self, job: CoreJob) -> Result<(), CoreJob> {
        self.input_tx.send(job).map_err(|e| e.0)
    }

    /// Terminate the monitor loop. Forceful: in-flight work is discarded,
    /// not drained.
    pub fn stop(&self) {
        self.monitor.abort();
    }
}

async fn monitor_loop(
    index: usize,
    kernel: Arc<TaskKernel>,
    mut input_rx: mpsc::UnboundedReceiver<CoreJob>,
    callback_tx: mpsc::UnboundedSender<CoreCallback>,
) {
    let mut running: Vec<RunningTask> = Vec::new();
    let mut sinners: HashMap<ExecId, i64> = HashMap::new();

    loop {
        // Drain input queue (non-blocking): spawn a micro-task per item.
        while let Ok(job) = input_rx.try_recv() {
            spawn_job(&kernel, job, &mut running, &callback_tx);
        }

        if running.is_empty() {
            tokio::time::sleep(SLEEP_TIME).await;
        } else {
            tokio::time::sleep(SLICE_TICK).await;
        }

        let mut still_running = Vec::with_capacity(running.len());
        for task in running {
            if task.handle.is_finished() {
                sinners.remove(&task.execid);
                let execid = task.execid;
                let task_name = task.task_name.clone();
                match task.handle.await {
                    Ok(Ok(output)) => emit(&callback_tx, execid, CallbackStatus::Done, output),
                    Ok(Err(message)) => {
                        // Both a cooperative-kill exception and any other raised
                        // exception land here as ERROR; the message text alone
                        // distinguishes "task was killed." for callers.
                        emit(&callback_tx, execid, CallbackStatus::Error, serde_json::Value::String(message));
                    }
                    Err(join_err) => emit(
                        &callback_tx,
                        execid,
                        CallbackStatus::Error,
                        serde_json::Value::String(format!(
                            "task {} on core {} panicked: {}",
                            task_name, index, join_err
                        )),
                    ),
                }
                continue;
            }

            match apply_preemption_policy(task.execid, &mut sinners) {
                Preemption::ReEnqueue => still_running.push(task),
                Preemption::RequestKill => {
                    task.cancel.store(true, Ordering::Relaxed);
                    still_running.push(task);
                }
                Preemption::Abandon => {
                    tracing::warn!(execid = task.execid, core = index, "abandoning unresponsive task");
                    emit(
                        &callback_tx,
                        task.execid,
                        CallbackStatus::Error,
                        serde_json::Value::String("task was killed.".to_string()),
                    );
                    // Drop the handle without joining: the task is abandoned, not awaited.
                }
            }
        }
        running = still_running;
    }
}

enum Preemption {
    ReEnqueue,
    RequestKill,
    Abandon,
}

fn apply_preemption_policy(execid: ExecId, sinners: &mut HashMap<ExecId, i64>) -> Preemption {
    match sinners.get(&execid).copied() {
        None => {
            sinners.insert(execid, 1);
            Preemption::ReEnqueue
        }
        Some(count) if count >= 0 && count < MAX_SINS => {
            sinners.insert(execid, count + 1);
            Preemption::ReEnqueue
        }
        Some(count) if count == MAX_SINS => {
            sinners.insert(execid, -1);
            Preemption::RequestKill
        }
        _ => {
            sinners.remove(&execid);
            Preemption::Abandon
        }
    }
}

fn spawn_job(
    kernel: &Arc<TaskKernel>,
    job: CoreJob,
    running: &mut Vec<RunningTask>,
    callback_tx: &mpsc::UnboundedSender<CoreCallback>,
) {
    let handler = match kernel.get(&job.task_name) {
        Some(handler) => handler,
        None => {
            emit(
                callback_tx,
                job.execid,
                CallbackStatus::Error,
                serde_json::Value::String(format!(
                    "no native handler registered for task {}",
                    job.task_name
                )),
            );
            return;
        }
    };

    let cancel = Arc::new(AtomicBool::new(false));
    let ctx = TaskContext::new(cancel.clone());
    let input = job.input;
    let handle = tokio::task::spawn_blocking(move || handler(input, &ctx));

    running.push(RunningTask {
        execid: job.execid,
        task_name: job.task_name,
        handle,
        cancel,
    });
}

fn emit(tx: &mpsc::UnboundedSender<CoreCallback>, execid: ExecId, status: CallbackStatus, value: serde_json::Value) {
    let _ = tx.send(CoreCallback { execid, status, value });
}
