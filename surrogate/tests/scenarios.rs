//! End-to-end scenario tests against the public `Surrogate` API.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use surrogate::{RemoteDataHandle, Surrogate, SurrogateConfig, TaskKernel, TaskRegistry};
use surrogate_shared::{SurrogateError, TaskInput};
use tempfile::TempDir;

struct TestContext {
    surrogate: Arc<Surrogate>,
    _home: TempDir,
}

impl TestContext {
    fn new() -> Self {
        let home = TempDir::new().expect("failed to create temp dir");
        let registry = Arc::new(TaskRegistry::open(home.path()).expect("failed to open registry"));
        let kernel = Arc::new(TaskKernel::with_demo_fixtures());
        let surrogate = Surrogate::start(registry, kernel, SurrogateConfig::default());
        Self {
            surrogate,
            _home: home,
        }
    }
}

fn kwargs(pairs: &[(&str, serde_json::Value)]) -> TaskInput {
    let mut map = BTreeMap::new();
    for (k, v) in pairs {
        map.insert(k.to_string(), v.clone());
    }
    TaskInput::Kwargs(map)
}

#[tokio::test]
async fn s1_add_returns_sum() {
    let ctx = TestContext::new();
    ctx.surrogate
        .install_task("demo.math.add", "def perform(a, b):\n    return a + b\n")
        .await
        .unwrap();

    let outcome = ctx
        .surrogate
        .perform_task("demo.math.add", kwargs(&[("a", json!(2)), ("b", json!(3))]), None, false, false)
        .await
        .unwrap();

    assert_eq!(outcome, surrogate::PerformOutcome::Value(json!(5.0)));
}

#[tokio::test]
async fn s2_raising_task_reports_exception_message() {
    let ctx = TestContext::new();
    ctx.surrogate.install_task("demo.fail.bang", "pass\n").await.unwrap();

    let err = ctx
        .surrogate
        .perform_task("demo.fail.bang", TaskInput::Args(vec![]), None, false, false)
        .await
        .unwrap_err();

    match err {
        SurrogateError::Task(message) => assert_eq!(message, "boom"),
        other => panic!("expected a Task error, got {:?}", other),
    }
}

#[tokio::test]
async fn s3_spinning_task_times_out_and_is_eventually_killed() {
    let ctx = TestContext::new();
    ctx.surrogate.install_task("demo.loop.spin", "pass\n").await.unwrap();

    let err = ctx
        .surrogate
        .perform_task(
            "demo.loop.spin",
            TaskInput::Args(vec![]),
            Some(Duration::from_millis(100)),
            false,
            false,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SurrogateError::Timeout));
}

#[tokio::test]
async fn s4_install_rejects_non_allowlisted_import() {
    let ctx = TestContext::new();
    let err = ctx
        .surrogate
        .install_task("bad.one.x", "import os")
        .await
        .unwrap_err();

    match err {
        SurrogateError::Validation(message) => assert!(message.contains("os")),
        other => panic!("expected a Validation error, got {:?}", other),
    }
    assert!(!ctx.surrogate.has_task("bad.one.x").await.unwrap());
}

#[tokio::test]
async fn s5_install_rejects_forbidden_token() {
    let ctx = TestContext::new();
    let err = ctx
        .surrogate
        .install_task("bad.two.y", "f.__class__")
        .await
        .unwrap_err();

    match err {
        SurrogateError::Validation(message) => assert!(message.contains("__class__")),
        other => panic!("expected a Validation error, got {:?}", other),
    }
}

#[tokio::test]
async fn s6_store_true_returns_resolvable_handle() {
    let ctx = TestContext::new();
    ctx.surrogate
        .install_task("demo.math.add", "def perform(a, b):\n    return a + b\n")
        .await
        .unwrap();

    let outcome = ctx
        .surrogate
        .perform_task("demo.math.add", kwargs(&[("a", json!(2)), ("b", json!(3))]), None, true, false)
        .await
        .unwrap();

    let surrogate::PerformOutcome::Value(serde_json::Value::String(handle_str)) = outcome else {
        panic!("expected a stored handle");
    };
    let handle: RemoteDataHandle = handle_str.parse().unwrap();
    assert_eq!(ctx.surrogate.resolve_data_handle(handle).await.unwrap(), json!(5.0));
}

#[tokio::test]
async fn ping_round_trips_any_value() {
    let ctx = TestContext::new();
    assert_eq!(ctx.surrogate.ping(json!({"a": 1, "b": [1, 2, 3]})), json!({"a": 1, "b": [1, 2, 3]}));
}

#[tokio::test]
async fn profile_returns_complexity_alongside_payload() {
    let ctx = TestContext::new();
    ctx.surrogate
        .install_task("demo.math.add", "def perform(a, b):\n    return a + b\n")
        .await
        .unwrap();

    let outcome = ctx
        .surrogate
        .perform_task("demo.math.add", kwargs(&[("a", json!(1)), ("b", json!(1))]), None, false, true)
        .await
        .unwrap();

    match outcome {
        surrogate::PerformOutcome::Profiled { payload, complexity } => {
            assert_eq!(payload, json!(2.0));
            assert!(complexity >= 0.0);
        }
        other => panic!("expected a profiled outcome, got {:?}", other),
    }
}
