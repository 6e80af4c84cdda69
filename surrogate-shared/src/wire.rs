//! Wire-level types shared between the surrogate, the Jailor, and core workers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Execution id: monotonically increasing, unique within the lifetime of one
/// dispatch scheduler.
pub type ExecId = u64;

/// Polymorphic task input: a task may be invoked with keyword arguments, a
/// positional sequence, or a single bare value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskInput {
    /// Keyword-mapping input, dispatched as keyword arguments.
    Kwargs(BTreeMap<String, serde_json::Value>),
    /// Positional-sequence input, dispatched as positional arguments.
    Args(Vec<serde_json::Value>),
    /// A single value, dispatched as a single positional argument.
    One(serde_json::Value),
}

impl TaskInput {
    pub fn is_empty_args(&self) -> bool {
        matches!(self, TaskInput::Args(v) if v.is_empty())
    }
}

/// The status carried on a task callback from a core worker back to the
/// Jailor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CallbackStatus {
    Done,
    Error,
    Status,
}

impl std::fmt::Display for CallbackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CallbackStatus::Done => "DONE",
            CallbackStatus::Error => "ERROR",
            CallbackStatus::Status => "STATUS",
        };
        write!(f, "{}", s)
    }
}

/// Outbound status on the surrogate-facing callback, distinct from
/// [`CallbackStatus`] because `RESULT` replaces `DONE` once it crosses the
/// Jailor boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutboundStatus {
    Result,
    Error,
    Status,
}
