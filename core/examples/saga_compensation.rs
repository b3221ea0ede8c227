// sagaflow/examples/saga_compensation.rs

use std::sync::Arc;

use sagaflow::{input, EventHooks, Failure, Flow, FlowError, FlowResult, Outcome};
use tracing::{info, warn};

// 1. Hooks that log compensation progress
struct SagaLogger;

impl EventHooks for SagaLogger {
  fn on_step_failure(&self, key: &str, failure: &Failure) {
    warn!(step = key, error = %failure, "Step failed");
  }

  fn on_compensation_start(&self, step_key: &str, compensation_key: &str) {
    info!(step = step_key, compensation = compensation_key, "Compensating");
  }

  fn on_compensation_failure(&self, step_key: &str, compensation_key: &str, failure: &Failure) {
    warn!(step = step_key, compensation = compensation_key, error = %failure, "Compensation failed");
  }
}

async fn release_seat(_store: sagaflow::ContextStore) -> Outcome<()> {
  info!("Seat released");
  Ok(())
}

async fn cancel_hotel(store: sagaflow::ContextStore) -> Outcome<()> {
  let booking = store.peek_value::<String>("book_hotel").unwrap_or_default();
  info!(booking = %booking, "Hotel booking cancelled");
  Ok(())
}

#[tokio::main]
async fn main() -> FlowResult<()> {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();
  info!("--- Saga Compensation Example ---");

  let mut flow = Flow::start_with("traveller", "Ada".to_string()).with_hooks(Arc::new(SagaLogger));

  // 2. Book a trip: each successful step registers how to undo itself
  flow
    .then_with_compensation(
      "reserve_seat",
      (input::<String>("traveller"),),
      |(name,), _cancel| async move { Ok(format!("seat 12A for {}", name)) },
      "release_seat",
      release_seat,
    )
    .await?
    .then_with_compensation(
      "book_hotel",
      (input::<String>("traveller"),),
      |(name,), _cancel| async move { Ok(format!("hotel room for {}", name)) },
      "cancel_hotel",
      cancel_hotel,
    )
    .await?
    .then(
      "charge_card",
      (input::<String>("reserve_seat"), input::<String>("book_hotel")),
      |(_seat, _hotel), _cancel| async move { Err::<u64, _>(Failure::msg("card declined")) },
    )
    .await?;

  // 3. Side work in a group: its failures do not fail the booking
  flow
    .group_on_failure(
      "notifications",
      |mut child| async move {
        child
          .then_do("send_sms", (), |(), _cancel| async { Err(Failure::msg("sms gateway timeout")) })
          .await?;
        Ok::<_, FlowError>(child)
      },
      |_child| async {
        info!("Notifications failed; continuing without them");
        Ok(())
      },
    )
    .await?;

  flow.finish_all().await?;

  // 4. Roll back if anything in the main flow failed
  flow
    .on_failure(|store| async move {
      let who = store.peek_value::<String>("traveller").unwrap_or_default();
      warn!(traveller = %who, "Booking failed, rolling back");
    })
    .await;

  if flow.has_failed() {
    flow.compensate_all().await;
  }

  match flow.get_result().await? {
    Ok(()) => info!("Trip booked"),
    Err(failure) => info!("Trip not booked: {}", failure),
  }

  info!("--- Saga Compensation Example Finished ---");
  Ok(())
}
