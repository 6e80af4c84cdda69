//! Dispatch Scheduler (C4): round-robin routing of execution ids to core
//! workers, and the callback demultiplexer that forwards each core's
//! callbacks on to the Jailor.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use surrogate_shared::{ExecId, SurrogateError, SurrogateResult, TaskInput};

use crate::kernel::TaskKernel;
use crate::scheduler::core_worker::{CoreCallback, CoreJob, CoreWorker};

/// Owns the fixed pool of core workers and the execid allocator.
pub struct DispatchScheduler {
    cores: Vec<CoreWorker>,
    next_core: AtomicUsize,
    next_execid: AtomicU64,
    forwarder: JoinHandle<()>,
}

impl DispatchScheduler {
    /// Spawn `core_count` core workers sharing `kernel`, forwarding every
    /// callback they emit onto `jailor_callback_tx` verbatim.
    pub fn new(core_count: usize, kernel: Arc<TaskKernel>, jailor_callback_tx: mpsc::UnboundedSender<CoreCallback>) -> Self {
        let (callback_tx, mut callback_rx) = mpsc::unbounded_channel();

        let cores = (0..core_count)
            .map(|index| CoreWorker::spawn(index, kernel.clone(), callback_tx.clone()))
            .collect();

        let forwarder = tokio::spawn(async move {
            while let Some(callback) = callback_rx.recv().await {
                if jailor_callback_tx.send(callback).is_err() {
                    break;
                }
            }
        });

        Self {
            cores,
            next_core: AtomicUsize::new(0),
            next_execid: AtomicU64::new(0),
            forwarder,
        }
    }

    /// Allocate the next sequential execid, pick a core round-robin, and
    /// enqueue the job. No backpressure; per-core queues are unbounded.
    pub fn schedule(&self, task_name: String, input: TaskInput) -> SurrogateResult<ExecId> {
        if self.cores.is_empty() {
            return Err(SurrogateError::Dispatch("no core workers configured".to_string()));
        }
        let execid = self.next_execid.fetch_add(1, Ordering::SeqCst);
        let idx = self.next_core.fetch_add(1, Ordering::SeqCst) % self.cores.len();

        self.cores[idx]
            .enqueue(CoreJob {
                execid,
                task_name,
                input,
            })
            .map_err(|_| SurrogateError::Dispatch(format!("core {} queue is gone", idx)))?;

        Ok(execid)
    }

    pub fn core_count(&self) -> usize {
        self.cores.len()
    }

    /// Terminate every core worker and the callback forwarder. Forceful:
    /// in-flight work is discarded.
    pub fn stop(&self) {
        for core in &self.cores {
            core.stop();
        }
        self.forwarder.abort();
    }
}
