// tests/error_handling_tests.rs
mod common;
use common::*;
use sagaflow::{input, CancellationToken, Failure, Flow, FlowError, Outcome, Reason, ReasonKind, StepStatus};
use serial_test::serial;
use std::future::Ready;
use std::sync::atomic::Ordering;
use std::time::Duration;

#[tokio::test]
#[serial]
async fn test_failure_short_circuits_later_steps() {
  setup_tracing();
  let calls = counter();
  let mut flow = Flow::start_with("seed", 1i32);

  flow
    .then("fails", (input::<i32>("seed"),), |(_x,), _cancel| async move {
      Err::<i32, _>(Failure::msg("E1"))
    })
    .await
    .unwrap();

  let later_calls = calls.clone();
  flow
    .then("never_runs", (input::<i32>("fails"),), move |(x,), _cancel| {
      later_calls.fetch_add(1, Ordering::SeqCst);
      async move { Ok(x) }
    })
    .await
    .unwrap();

  let independent_calls = calls.clone();
  flow
    .then("also_never_runs", (), move |(), _cancel| {
      independent_calls.fetch_add(1, Ordering::SeqCst);
      async move { Ok(0i32) }
    })
    .await
    .unwrap();

  assert_eq!(count(&calls), 0);
  assert!(flow.has_failed());
  // The failure is reported exactly once.
  assert_eq!(flow.get_result().await.unwrap(), Err(Failure::msg("E1")));
  let keys: Vec<&str> = flow.steps().iter().map(|s| s.key()).collect();
  assert_eq!(keys, vec!["seed", "fails"]);
  assert!(!flow.store().contains::<i32>("never_runs"));
  assert!(!flow.store().contains::<i32>("also_never_runs"));
}

#[tokio::test]
#[serial]
async fn test_failed_seed_blocks_everything() {
  setup_tracing();
  let calls = counter();
  let mut flow = Flow::start_with_outcome::<i32>("seed", Err(Failure::msg("bad seed")));
  assert!(flow.has_failed());

  let step_calls = calls.clone();
  flow
    .then("step", (), move |(), _cancel| {
      step_calls.fetch_add(1, Ordering::SeqCst);
      async { Ok(1i32) }
    })
    .await
    .unwrap();
  flow.add_keyed_variable("ignored", 5i32);

  assert_eq!(count(&calls), 0);
  assert!(!flow.store().contains::<i32>("ignored"));
  assert_eq!(flow.get_result().await.unwrap(), Err(Failure::msg("bad seed")));
}

#[tokio::test]
#[serial]
async fn test_in_flight_failure_is_seen_after_finish_all() {
  setup_tracing();
  let calls = counter();
  let mut flow = Flow::start_with("seed", 1i32);

  flow
    .then("slow_failure", (), |(), _cancel| async {
      tokio::time::sleep(Duration::from_millis(20)).await;
      Err::<(), _>(Failure::msg("late"))
    })
    .await
    .unwrap();
  assert!(!flow.has_failed(), "failure must not be visible before it settles");

  flow.finish_all().await.unwrap();
  assert!(flow.has_failed());

  let step_calls = calls.clone();
  flow
    .then("after", (), move |(), _cancel| {
      step_calls.fetch_add(1, Ordering::SeqCst);
      async { Ok(()) }
    })
    .await
    .unwrap();
  assert_eq!(count(&calls), 0);
}

#[tokio::test]
#[serial]
async fn test_failures_are_aggregated_in_ledger_order() {
  setup_tracing();
  let mut flow = Flow::start_with("seed", 1i32);

  // Neither step depends on the other, so both run before any failure settles.
  flow
    .then("first", (), |(), _cancel| async {
      tokio::time::sleep(Duration::from_millis(20)).await;
      Err::<i32, _>(Failure::msg("first failed"))
    })
    .await
    .unwrap()
    .then("second", (), |(), _cancel| async {
      Err::<i32, _>(Failure::from(vec![Reason::new("second a"), Reason::new("second b")]))
    })
    .await
    .unwrap();

  let failure = flow.get_result().await.unwrap().unwrap_err();
  let messages: Vec<&str> = failure.reasons().iter().map(|r| r.message()).collect();
  assert_eq!(messages, vec!["first failed", "second a", "second b"]);
}

#[tokio::test]
#[serial]
async fn test_failed_keyed_variable_fails_dependent_step() {
  setup_tracing();
  let calls = counter();
  let mut flow = Flow::start_with("seed", 1i32);
  flow.add_keyed_outcome::<String>("config", Err(Failure::msg("config unavailable")));

  let step_calls = calls.clone();
  flow
    .then("configure", (input::<String>("config"),), move |(c,), _cancel| {
      step_calls.fetch_add(1, Ordering::SeqCst);
      async move { Ok(c) }
    })
    .await
    .unwrap();

  assert_eq!(count(&calls), 0);
  assert!(flow.has_failed());

  let failure = flow.get_result().await.unwrap().unwrap_err();
  assert_eq!(failure.reasons().len(), 1);
  let reason = &failure.reasons()[0];
  assert_eq!(reason.kind(), ReasonKind::Dependency);
  assert_eq!(reason.metadata().get("input").map(String::as_str), Some("config"));
  assert_eq!(reason.causes()[0].message(), "config unavailable");
  assert_eq!(
    flow.steps()[1].status(),
    StepStatus::Failed(failure.clone()),
    "the dependent step carries the dependency failure"
  );
}

#[tokio::test]
#[serial]
async fn test_dependency_on_failed_step_is_reported_once() {
  setup_tracing();
  let mut flow = Flow::start_with("seed", 1i32);

  // "lookup" fails while "enrich" is already waiting on it.
  flow
    .then("lookup", (), |(), _cancel| async {
      tokio::time::sleep(Duration::from_millis(10)).await;
      Err::<String, _>(Failure::msg("not found"))
    })
    .await
    .unwrap()
    .then("enrich", (input::<String>("lookup"),), |(s,), _cancel| async move { Ok(s.len()) })
    .await
    .unwrap();

  assert_eq!(flow.get_result().await.unwrap(), Err(Failure::msg("not found")));
  let keys: Vec<&str> = flow.steps().iter().map(|s| s.key()).collect();
  assert_eq!(keys, vec!["seed", "lookup"]);
}

#[tokio::test]
#[serial]
async fn test_short_circuited_dependent_gets_a_terminal_hook_event() {
  setup_tracing();
  let hooks = RecordingHooks::new();
  let mut flow = Flow::start_with("seed", 1i32).with_hooks(hooks.clone());

  // "enrich" has started and is waiting on "lookup" when it fails.
  flow
    .then("lookup", (), |(), _cancel| async {
      tokio::time::sleep(Duration::from_millis(10)).await;
      Err::<String, _>(Failure::msg("not found"))
    })
    .await
    .unwrap()
    .then("enrich", (input::<String>("lookup"),), |(s,), _cancel| async move { Ok(s.len()) })
    .await
    .unwrap();
  flow.finish_all().await.unwrap();

  assert_eq!(
    hooks.events(),
    vec![
      "start:lookup".to_string(),
      "start:enrich".to_string(),
      "failure:lookup:not found".to_string(),
      "short_circuited:enrich".to_string(),
    ]
  );
  assert!(!flow.store().contains::<usize>("enrich"));
}

fn explode_on_call((): (), _cancel: CancellationToken) -> Ready<Outcome<i32>> {
  panic!("exploded while starting")
}

#[tokio::test]
#[serial]
async fn test_panic_while_invoking_step_is_fatal_and_reported() {
  setup_tracing();
  let hooks = RecordingHooks::new();
  let mut flow = Flow::start_with("seed", 1i32).with_hooks(hooks.clone());

  let err = flow.then("explode", (), explode_on_call).await.unwrap_err();

  match err {
    FlowError::StepPanicked { key, message } => {
      assert_eq!(key, "explode");
      assert_eq!(message, "exploded while starting");
    }
    other => panic!("Expected StepPanicked, got {:?}", other),
  }
  assert_eq!(flow.steps().len(), 1, "ledger is untouched");
  assert_eq!(hooks.events(), vec!["start:explode".to_string(), "exception:explode".to_string()]);
}

#[tokio::test]
#[serial]
async fn test_panic_inside_step_body_faults_entry() {
  setup_tracing();
  let hooks = RecordingHooks::new();
  let mut flow = Flow::start_with("seed", 1i32).with_hooks(hooks.clone());

  flow
    .then("crash", (), |(), _cancel| async {
      if true {
        panic!("crashed mid-flight");
      }
      Ok(1i32)
    })
    .await
    .unwrap();

  let err = flow.finish_all().await.unwrap_err();
  assert!(matches!(err, FlowError::StepPanicked { ref key, .. } if key == "crash"));
  assert!(matches!(flow.steps()[1].status(), StepStatus::Faulted(ref m) if m.contains("crashed mid-flight")));
  assert!(hooks.events().contains(&"exception:crash".to_string()));

  // A dependent step surfaces the same fatal error.
  let err = flow
    .then("after_crash", (input::<i32>("crash"),), |(x,), _cancel| async move { Ok(x) })
    .await
    .unwrap_err();
  assert!(matches!(err, FlowError::StepPanicked { .. }));
}

#[tokio::test]
#[serial]
async fn test_on_failure_runs_only_when_failed() {
  setup_tracing();
  let log = journal();

  let mut ok_flow = Flow::start_with("seed", 1i32);
  let ok_log = log.clone();
  ok_flow
    .on_failure(|_store| async move { ok_log.lock().push("ok flow handler".to_string()) })
    .await;

  let mut failed_flow = Flow::start_with("seed", 7i32);
  failed_flow
    .then("boom", (), |(), _cancel| async { Err::<(), _>(Failure::msg("boom")) })
    .await
    .unwrap();
  failed_flow.finish_all().await.unwrap();

  let failed_log = log.clone();
  failed_flow
    .on_failure(|store| async move {
      let seed = store.peek_value::<i32>("seed").unwrap_or_default();
      failed_log.lock().push(format!("handled failure, seed={}", seed));
    })
    .await;

  assert_eq!(*log.lock(), vec!["handled failure, seed=7".to_string()]);
}

#[tokio::test]
#[serial]
async fn test_get_result_of_returns_failure_when_flow_failed() {
  setup_tracing();
  let mut flow = Flow::start_with("seed", 1i32);
  flow
    .then("ok_step", (), |(), _cancel| async { Ok(5i32) })
    .await
    .unwrap()
    .then("bad_step", (), |(), _cancel| async { Err::<i32, _>(Failure::msg("bad")) })
    .await
    .unwrap();

  assert_eq!(flow.get_result_of::<i32>("ok_step").await.unwrap(), Err(Failure::msg("bad")));
}
