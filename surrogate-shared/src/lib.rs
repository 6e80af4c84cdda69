//! Types shared across the surrogate task execution engine's crates.

mod errors;
mod wire;

pub use errors::{SurrogateError, SurrogateResult};
pub use wire::{CallbackStatus, ExecId, OutboundStatus, TaskInput};
