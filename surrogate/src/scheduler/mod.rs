//! The two-tier scheduler: per-core micro-schedulers (C3) under a
//! round-robin dispatch front (C4).

pub mod core_worker;
pub mod dispatch;

pub use core_worker::{CoreCallback, CoreJob};
pub use dispatch::DispatchScheduler;
