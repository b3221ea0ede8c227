// tests/group_tests.rs
mod common;
use common::*;
use sagaflow::{input, EntryKind, Failure, Flow, FlowError, Reason};
use serial_test::serial;
use std::sync::atomic::Ordering;

#[tokio::test]
#[serial]
async fn test_group_failure_stays_inside_the_group() {
  setup_tracing();
  let mut flow = Flow::start_with("order_id", 7u32);

  flow
    .group("notifications", |mut child| async move {
      child
        .then("email", (input::<u32>("order_id"),), |(_id,), _cancel| async move {
          Err::<(), _>(Failure::msg("smtp unreachable"))
        })
        .await?;
      Ok::<_, FlowError>(child)
    })
    .await
    .unwrap();

  assert!(!flow.has_failed());
  assert_eq!(flow.get_result().await.unwrap(), Ok(()));

  let email = flow.steps().iter().find(|s| s.key() == "email").unwrap();
  assert_eq!(email.group(), Some("notifications"));
  assert_eq!(email.errors(), Some(Failure::msg("smtp unreachable")));

  // The parent keeps going.
  flow
    .then("confirm", (input::<u32>("order_id"),), |(id,), _cancel| async move { Ok(format!("confirmed {}", id)) })
    .await
    .unwrap();
  assert_eq!(
    flow.get_result_of::<String>("confirm").await.unwrap(),
    Ok("confirmed 7".to_string())
  );
}

#[tokio::test]
#[serial]
async fn test_group_shares_the_parent_store() {
  setup_tracing();
  let mut flow = Flow::start_with("base", 10i32);

  flow
    .group("pricing", |mut child| async move {
      child
        .then("with_tax", (input::<i32>("base"),), |(b,), _cancel| async move { Ok(b + 2) })
        .await?
        .then("with_fee", (input::<i32>("with_tax"),), |(t,), _cancel| async move { Ok(t + 1) })
        .await?;
      Ok::<_, FlowError>(child)
    })
    .await
    .unwrap();

  // Entries written by the group are readable by the parent.
  flow
    .then("total", (input::<i32>("with_fee"),), |(f,), _cancel| async move { Ok(f * 2) })
    .await
    .unwrap();
  assert_eq!(flow.get_result_of::<i32>("total").await.unwrap(), Ok(26));

  let tagged: Vec<&str> = flow
    .steps()
    .iter()
    .filter(|s| s.group() == Some("pricing"))
    .map(|s| s.key())
    .collect();
  assert_eq!(tagged, vec!["with_tax", "with_fee"]);
}

#[tokio::test]
#[serial]
async fn test_group_failure_handler_receives_child_and_can_escalate() {
  setup_tracing();
  let log = journal();
  let mut flow = Flow::start_with("payment_id", "P-1".to_string());

  let handler_log = log.clone();
  flow
    .group_on_failure(
      "settlement",
      |mut child| async move {
        child
          .then("capture", (input::<String>("payment_id"),), |(_id,), _cancel| async move {
            Err::<(), _>(Failure::msg("capture declined"))
          })
          .await?;
        Ok::<_, FlowError>(child)
      },
      |child| async move {
        let failure = match child.get_result().await {
          Ok(Err(failure)) => failure,
          other => panic!("expected a failed group, got {:?}", other),
        };
        handler_log.lock().push(format!("group failed: {}", failure));
        Err(Failure::from(Reason::new("settlement aborted").caused_by_all(failure.into_reasons())))
      },
    )
    .await
    .unwrap();

  assert_eq!(*log.lock(), vec!["group failed: capture declined".to_string()]);
  assert!(flow.has_failed());

  let escalated = flow.steps().last().unwrap();
  assert_eq!(escalated.key(), "settlement");
  assert_eq!(escalated.kind(), EntryKind::Group);
  assert_eq!(escalated.group(), None);

  let failure = flow.get_result().await.unwrap().unwrap_err();
  assert_eq!(failure.reasons().len(), 1);
  assert_eq!(failure.reasons()[0].message(), "settlement aborted");
  assert_eq!(failure.reasons()[0].causes()[0].message(), "capture declined");
}

#[tokio::test]
#[serial]
async fn test_group_failure_handler_can_absorb_failure() {
  setup_tracing();
  let calls = counter();
  let mut flow = Flow::start_with("seed", 1i32);

  let handler_calls = calls.clone();
  flow
    .group_on_failure(
      "optional_work",
      |mut child| async move {
        child
          .then("flaky", (), |(), _cancel| async { Err::<i32, _>(Failure::msg("flaky failed")) })
          .await?;
        Ok::<_, FlowError>(child)
      },
      move |_child| async move {
        handler_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
      },
    )
    .await
    .unwrap();

  assert_eq!(count(&calls), 1);
  assert!(!flow.has_failed());
  assert_eq!(flow.get_result().await.unwrap(), Ok(()));
}

#[tokio::test]
#[serial]
async fn test_group_failure_handler_not_called_on_success() {
  setup_tracing();
  let calls = counter();
  let mut flow = Flow::start_with("seed", 1i32);

  let handler_calls = calls.clone();
  flow
    .group_on_failure(
      "healthy",
      |mut child| async move {
        child.then("fine", (), |(), _cancel| async { Ok(1i32) }).await?;
        Ok::<_, FlowError>(child)
      },
      move |_child| async move {
        handler_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
      },
    )
    .await
    .unwrap();

  assert_eq!(count(&calls), 0);
  assert!(flow.steps().iter().any(|s| s.key() == "fine" && s.is_success()));
}

#[tokio::test]
#[serial]
async fn test_group_is_skipped_when_parent_failed() {
  setup_tracing();
  let calls = counter();
  let mut flow = Flow::start_with_outcome::<i32>("seed", Err(Failure::msg("seed failed")));

  let sub_calls = calls.clone();
  flow
    .group("never", move |child| async move {
      sub_calls.fetch_add(1, Ordering::SeqCst);
      Ok::<_, FlowError>(child)
    })
    .await
    .unwrap();

  assert_eq!(count(&calls), 0);
  assert_eq!(flow.steps().len(), 1);
}

#[tokio::test]
#[serial]
async fn test_fatal_error_inside_group_propagates() {
  setup_tracing();
  let mut flow = Flow::start_with("seed", 1i32);

  let err = flow
    .group("broken", |mut child| async move {
      child
        .then("needs_missing", (input::<String>("missing"),), |(s,), _cancel| async move { Ok(s) })
        .await?;
      Ok::<_, FlowError>(child)
    })
    .await
    .unwrap_err();

  assert!(matches!(err, FlowError::SlotNotFound { .. }));
}

#[tokio::test]
#[serial]
async fn test_group_entries_are_compensated() {
  setup_tracing();
  let log = journal();
  let mut flow = Flow::start_with("seed", 1i32);

  let step_log = log.clone();
  let undo_log = log.clone();
  flow
    .group("inventory", |mut child| async move {
      child
        .then_with_compensation(
          "reserve_stock",
          (),
          move |(), _cancel| {
            step_log.lock().push("reserve_stock".to_string());
            async { Ok(3u32) }
          },
          "release_stock",
          move |_store| {
            undo_log.lock().push("release_stock".to_string());
            async { Ok(()) }
          },
        )
        .await?;
      Ok::<_, FlowError>(child)
    })
    .await
    .unwrap();

  flow.compensate_all().await;
  assert_eq!(
    *log.lock(),
    vec!["reserve_stock".to_string(), "release_stock".to_string()]
  );
}
