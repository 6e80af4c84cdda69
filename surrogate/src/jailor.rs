//! Jailor (C5): the execution environment's boundary. Installs and serves
//! task code through the registry and validator, forwards invocations to
//! the dispatch scheduler, and translates core-worker callbacks into the
//! outbound shape the surrogate-facing front expects.

use std::sync::Arc;

use tokio::sync::mpsc;

use surrogate_shared::{CallbackStatus, ExecId, OutboundStatus, SurrogateError, SurrogateResult, TaskInput};

use crate::ipc::{self, CallTx};
use crate::kernel::TaskKernel;
use crate::monkey;
use crate::registry::TaskRegistry;
use crate::scheduler::core_worker::CoreCallback;
use crate::scheduler::DispatchScheduler;
use crate::validator;

/// A callback translated for surrogate consumption: `DONE` becomes
/// `RESULT` once it crosses this boundary.
#[derive(Debug, Clone)]
pub struct OutboundCallback {
    pub execid: ExecId,
    pub status: OutboundStatus,
    pub value: serde_json::Value,
}

enum JailorRequest {
    InstallTask { name: String, code: String },
    TaskExists { name: String },
    PerformTask { name: String, input: TaskInput },
    FetchTaskCode { name: String },
}

enum JailorResponse {
    Installed(SurrogateResult<()>),
    Exists(bool),
    Scheduled(SurrogateResult<ExecId>),
    Code(SurrogateResult<String>),
}

/// Client handle to a running Jailor actor.
#[derive(Clone)]
pub struct JailorHandle {
    request_tx: CallTx<JailorRequest, JailorResponse>,
}

impl JailorHandle {
    pub async fn install_task(&self, name: String, code: String) -> SurrogateResult<()> {
        match ipc::call(&self.request_tx, JailorRequest::InstallTask { name, code }).await? {
            JailorResponse::Installed(result) => result,
            _ => unreachable!("install_task always replies Installed"),
        }
    }

    pub async fn task_exists(&self, name: String) -> SurrogateResult<bool> {
        match ipc::call(&self.request_tx, JailorRequest::TaskExists { name }).await? {
            JailorResponse::Exists(exists) => Ok(exists),
            _ => unreachable!("task_exists always replies Exists"),
        }
    }

    pub async fn perform_task(&self, name: String, input: TaskInput) -> SurrogateResult<ExecId> {
        match ipc::call(&self.request_tx, JailorRequest::PerformTask { name, input }).await? {
            JailorResponse::Scheduled(result) => result,
            _ => unreachable!("perform_task always replies Scheduled"),
        }
    }

    pub async fn fetch_task_code(&self, name: String) -> SurrogateResult<String> {
        match ipc::call(&self.request_tx, JailorRequest::FetchTaskCode { name }).await? {
            JailorResponse::Code(result) => result,
            _ => unreachable!("fetch_task_code always replies Code"),
        }
    }
}

/// The Jailor's background state: not exposed directly, only through a
/// [`JailorHandle`] and an outbound callback receiver.
pub struct Jailor {
    registry: Arc<TaskRegistry>,
    dispatch: Arc<DispatchScheduler>,
}

impl Jailor {
    /// Spawn the Jailor actor and its core-worker pool, returning a handle
    /// for issuing requests and the receiver for outbound callbacks bound
    /// for the surrogate.
    pub fn spawn(
        registry: Arc<TaskRegistry>,
        core_count: usize,
        kernel: Arc<TaskKernel>,
    ) -> (JailorHandle, mpsc::UnboundedReceiver<OutboundCallback>) {
        let (core_callback_tx, mut core_callback_rx) = mpsc::unbounded_channel();
        let dispatch = Arc::new(DispatchScheduler::new(core_count, kernel, core_callback_tx));

        let jailor = Arc::new(Jailor { registry, dispatch });

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(callback) = core_callback_rx.recv().await {
                let outbound = translate(callback);
                if outbound_tx.send(outbound).is_err() {
                    break;
                }
            }
        });

        let (request_tx, mut request_rx) = ipc::call_channel::<JailorRequest, JailorResponse>();
        let actor = jailor.clone();
        tokio::spawn(async move {
            while let Some(call) = request_rx.recv().await {
                let response = actor.handle(call.payload).await;
                let _ = call.reply.send(response);
            }
        });

        (JailorHandle { request_tx }, outbound_rx)
    }

    async fn handle(&self, request: JailorRequest) -> JailorResponse {
        match request {
            JailorRequest::InstallTask { name, code } => {
                JailorResponse::Installed(self.install_task(&name, &code))
            }
            JailorRequest::TaskExists { name } => JailorResponse::Exists(self.registry.has_task(&name)),
            JailorRequest::PerformTask { name, input } => {
                JailorResponse::Scheduled(self.perform_task(&name, input))
            }
            JailorRequest::FetchTaskCode { name } => {
                JailorResponse::Code(self.fetch_task_code(&name))
            }
        }
    }

    fn install_task(&self, name: &str, code: &str) -> SurrogateResult<()> {
        if !crate::registry::valid_task_name(name) {
            return Err(SurrogateError::Naming(format!("invalid task name: {}", name)));
        }
        if self.registry.has_task(name) {
            return Err(SurrogateError::AlreadyInstalled(name.to_string()));
        }
        if crate::registry::ends_with_reserved_leaf(name) {
            return Err(SurrogateError::Naming(format!(
                "task name may not end with the reserved __init__ leaf: {}",
                name
            )));
        }
        validator::validate(code)?;

        let wrapped = monkey::wrap(code);
        self.registry.install_task(name, &wrapped)?;
        tracing::info!(task = name, "installed task");
        Ok(())
    }

    fn perform_task(&self, name: &str, input: TaskInput) -> SurrogateResult<ExecId> {
        if !self.registry.has_task(name) {
            return Err(SurrogateError::NotInstalled(name.to_string()));
        }
        self.dispatch.schedule(name.to_string(), input)
    }

    fn fetch_task_code(&self, name: &str) -> SurrogateResult<String> {
        if !self.registry.has_task(name) {
            return Err(SurrogateError::NotInstalled(name.to_string()));
        }
        self.registry.fetch_task_code(name)
    }
}

impl Drop for Jailor {
    fn drop(&mut self) {
        self.dispatch.stop();
    }
}

/// Rust's exhaustive match over [`CallbackStatus`] rules out the "unknown
/// status, log an internal error" branch the dynamically-typed original
/// needed: there is no fourth variant to mismatch.
fn translate(callback: CoreCallback) -> OutboundCallback {
    let status = match callback.status {
        CallbackStatus::Done => OutboundStatus::Result,
        CallbackStatus::Error => OutboundStatus::Error,
        CallbackStatus::Status => OutboundStatus::Status,
    };
    OutboundCallback {
        execid: callback.execid,
        status,
        value: callback.value,
    }
}
