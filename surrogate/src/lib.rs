//! The task execution engine: registry, validator, scheduler, Jailor and
//! Surrogate fronts.

use std::path::Path;
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

pub mod config;
pub mod datastore;
pub mod ipc;
pub mod jailor;
pub mod kernel;
pub mod metrics;
pub mod monkey;
pub mod registry;
pub mod scheduler;
pub mod surrogate;
pub mod validator;

pub use config::SurrogateConfig;
pub use datastore::{InMemoryDataStore, RemoteDataHandle, RemoteDataStore};
pub use jailor::{Jailor, JailorHandle};
pub use kernel::{TaskContext, TaskKernel};
pub use metrics::{MetricsSnapshot, RuntimeMetrics};
pub use registry::TaskRegistry;
pub use surrogate::{PerformOutcome, Surrogate};

use surrogate_shared::SurrogateResult;

/// Initialize tracing for the daemon, writing daily-rotating logs under
/// `<home>/logs/surrogate.log`. Honors `RUST_LOG` (default `info`).
/// Idempotent: subsequent calls return immediately once initialized.
pub fn init_logging(home: &Path) -> SurrogateResult<()> {
    let logs_dir = home.join("logs");
    std::fs::create_dir_all(&logs_dir)?;

    let _ = LOG_GUARD.get_or_init(|| {
        let file_appender = tracing_appender::rolling::daily(&logs_dir, "surrogate.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let env_filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new("info"))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        // If a global subscriber is already set (e.g. by a test harness), this
        // fails silently rather than panicking.
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
            .try_init();

        guard
    });

    Ok(())
}
