//! Native task handler registry (`TaskKernel`).
//!
//! Installed task source is persisted and round-tripped through the
//! registry for audit purposes, but execution dispatches to a native
//! handler registered under the same name — there is no embedded
//! interpreter to load the stored module into. Tasks without a registered
//! handler fail at invocation time rather than at install time.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use surrogate_shared::TaskInput;

/// Context handed to a running task handler.
///
/// `cancelled` is the cooperative-kill flag a well-behaved long-running
/// handler should poll; once set, the handler should return promptly
/// rather than complete its work.
#[derive(Clone)]
pub struct TaskContext {
    cancelled: Arc<AtomicBool>,
}

impl TaskContext {
    pub(crate) fn new(cancelled: Arc<AtomicBool>) -> Self {
        Self { cancelled }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

pub type TaskHandler = dyn Fn(TaskInput, &TaskContext) -> Result<Value, String> + Send + Sync;

/// Registry of native task handlers, keyed by task name.
pub struct TaskKernel {
    handlers: HashMap<String, Arc<TaskHandler>>,
}

impl TaskKernel {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// A kernel pre-populated with the demo fixtures used by end-to-end
    /// scenario tests: `demo.math.add`, `demo.fail.bang`, `demo.loop.spin`.
    pub fn with_demo_fixtures() -> Self {
        let mut kernel = Self::new();
        kernel.register("demo.math.add", demo_math_add);
        kernel.register("demo.fail.bang", demo_fail_bang);
        kernel.register("demo.loop.spin", demo_loop_spin);
        kernel
    }

    pub fn register<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(TaskInput, &TaskContext) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler));
    }

    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<TaskHandler>> {
        self.handlers.get(name).cloned()
    }
}

impl Default for TaskKernel {
    fn default() -> Self {
        Self::new()
    }
}

fn require_number(value: &Value, field: &str) -> Result<f64, String> {
    value
        .as_f64()
        .ok_or_else(|| format!("expected a numeric value for {}", field))
}

/// `demo.math.add`: returns `a + b`. Accepts keyword args `{a, b}` or a
/// two-element positional sequence.
fn demo_math_add(input: TaskInput, _ctx: &TaskContext) -> Result<Value, String> {
    let (a, b) = match input {
        TaskInput::Kwargs(map) => {
            let a = map.get("a").ok_or("missing argument: a")?;
            let b = map.get("b").ok_or("missing argument: b")?;
            (require_number(a, "a")?, require_number(b, "b")?)
        }
        TaskInput::Args(args) => {
            if args.len() != 2 {
                return Err(format!("expected 2 positional arguments, got {}", args.len()));
            }
            (require_number(&args[0], "a")?, require_number(&args[1], "b")?)
        }
        TaskInput::One(_) => return Err("demo.math.add requires two arguments".to_string()),
    };
    Ok(Value::from(a + b))
}

/// `demo.fail.bang`: always raises, exercising the error-propagation path.
fn demo_fail_bang(_input: TaskInput, _ctx: &TaskContext) -> Result<Value, String> {
    Err("boom".to_string())
}

/// `demo.loop.spin`: busy-loops until cancelled, exercising the timeout and
/// kill-escalation paths. Polls the cancellation flag roughly every
/// millisecond so an abandoned handle actually observes the flag in tests
/// that set it.
fn demo_loop_spin(_input: TaskInput, ctx: &TaskContext) -> Result<Value, String> {
    let start = Instant::now();
    loop {
        if ctx.is_cancelled() {
            return Err("task was killed.".to_string());
        }
        if start.elapsed() > Duration::from_secs(3600) {
            return Ok(Value::Null);
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn ctx() -> TaskContext {
        TaskContext::new(Arc::new(AtomicBool::new(false)))
    }

    #[test]
    fn demo_add_via_kwargs() {
        let mut kwargs = BTreeMap::new();
        kwargs.insert("a".to_string(), json!(2));
        kwargs.insert("b".to_string(), json!(3));
        let result = demo_math_add(TaskInput::Kwargs(kwargs), &ctx()).unwrap();
        assert_eq!(result, json!(5.0));
    }

    #[test]
    fn demo_add_via_args() {
        let result = demo_math_add(TaskInput::Args(vec![json!(2), json!(3)]), &ctx()).unwrap();
        assert_eq!(result, json!(5.0));
    }

    #[test]
    fn demo_fail_always_errors() {
        let err = demo_fail_bang(TaskInput::Args(vec![]), &ctx()).unwrap_err();
        assert_eq!(err, "boom");
    }

    #[test]
    fn demo_spin_respects_cancellation() {
        let flag = Arc::new(AtomicBool::new(false));
        let context = TaskContext::new(flag.clone());
        flag.store(true, Ordering::Relaxed);
        let err = demo_loop_spin(TaskInput::Args(vec![]), &context).unwrap_err();
        assert_eq!(err, "task was killed.");
    }

    #[test]
    fn kernel_with_demo_fixtures_has_all_three() {
        let kernel = TaskKernel::with_demo_fixtures();
        assert!(kernel.has_handler("demo.math.add"));
        assert!(kernel.has_handler("demo.fail.bang"));
        assert!(kernel.has_handler("demo.loop.spin"));
        assert!(!kernel.has_handler("nope.nope.nope"));
    }
}
