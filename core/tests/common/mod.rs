// tests/common/mod.rs
#![allow(dead_code)] // Allow unused code in this common test module

use async_trait::async_trait;
use parking_lot::Mutex;
use sagaflow::{AnyValue, Attempt, EventHooks, Failure, FlowError, Outcome, ResiliencePolicy, Validator, Violation};
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use tracing::Level;

// --- Helper for Tracing Setup (call once per test run if needed) ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer() // Important for tests to capture output
    .try_init()
    .ok(); // Allow multiple initializations in tests (ok if fails)
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

// --- Hooks that record every transition as a string ---
#[derive(Default)]
pub struct RecordingHooks {
  events: Mutex<Vec<String>>,
}

impl RecordingHooks {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn events(&self) -> Vec<String> {
    self.events.lock().clone()
  }

  /// Events starting with `prefix`, e.g. "compensation_start".
  pub fn events_of(&self, prefix: &str) -> Vec<String> {
    self
      .events()
      .into_iter()
      .filter(|e| e.starts_with(prefix))
      .collect()
  }

  fn push(&self, event: String) {
    self.events.lock().push(event);
  }
}

impl EventHooks for RecordingHooks {
  fn on_step_start(&self, key: &str) {
    self.push(format!("start:{}", key));
  }

  fn on_step_success(&self, key: &str) {
    self.push(format!("success:{}", key));
  }

  fn on_step_failure(&self, key: &str, failure: &Failure) {
    self.push(format!("failure:{}:{}", key, failure));
  }

  fn on_step_short_circuited(&self, key: &str) {
    self.push(format!("short_circuited:{}", key));
  }

  fn on_exception(&self, key: &str, _error: &FlowError) {
    self.push(format!("exception:{}", key));
  }

  fn on_compensation_start(&self, step_key: &str, compensation_key: &str) {
    self.push(format!("compensation_start:{}:{}", step_key, compensation_key));
  }

  fn on_compensation_success(&self, step_key: &str, compensation_key: &str) {
    self.push(format!("compensation_success:{}:{}", step_key, compensation_key));
  }

  fn on_compensation_failure(&self, step_key: &str, compensation_key: &str, _failure: &Failure) {
    self.push(format!("compensation_failure:{}:{}", step_key, compensation_key));
  }
}

// --- Retry policy counting how often it ran an attempt ---
pub struct RetryPolicy {
  pub max_attempts: usize,
  pub executions: AtomicUsize,
}

impl RetryPolicy {
  pub fn new(max_attempts: usize) -> Arc<Self> {
    Arc::new(RetryPolicy {
      max_attempts,
      executions: AtomicUsize::new(0),
    })
  }

  pub fn executions(&self) -> usize {
    self.executions.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl ResiliencePolicy for RetryPolicy {
  async fn execute(&self, step_key: &str, attempt: Attempt) -> Outcome<AnyValue> {
    let mut last_failure = None;
    for attempt_no in 1..=self.max_attempts {
      self.executions.fetch_add(1, Ordering::SeqCst);
      match attempt.run().await {
        Ok(value) => return Ok(value),
        Err(failure) => {
          tracing::debug!(target: "test_policy", %step_key, attempt_no, "attempt failed: {}", failure);
          last_failure = Some(failure);
        }
      }
    }
    Err(last_failure.unwrap_or_else(|| Failure::msg("policy made no attempts")))
  }
}

// --- Validator rejecting non-positive integers ---
pub struct PositiveValidator;

#[async_trait]
impl Validator<i32> for PositiveValidator {
  async fn validate(&self, value: &i32) -> Vec<Violation> {
    if *value > 0 {
      Vec::new()
    } else {
      vec![Violation::new(format!("must be positive, got {}", value)).at("value")]
    }
  }
}

// --- Execution counters ---
pub fn counter() -> Arc<AtomicUsize> {
  Arc::new(AtomicUsize::new(0))
}

pub fn count(counter: &AtomicUsize) -> usize {
  counter.load(Ordering::SeqCst)
}

/// Shared, ordered log that steps and compensations append to.
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
  Arc::new(Mutex::new(Vec::new()))
}
