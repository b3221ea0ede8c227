// sagaflow/examples/basic_chain.rs

use sagaflow::{input, Failure, Flow, FlowResult, Violation};
use tracing::info;

// 1. Domain types flowing between steps
#[derive(Clone, Debug)]
struct Order {
  id: String,
  quantity: u32,
  unit_price_cents: u64,
}

#[derive(Clone, Debug)]
struct Quote {
  subtotal_cents: u64,
  tax_cents: u64,
}

// 2. A validator applied to every resolved `Order` input
struct OrderValidator;

#[async_trait::async_trait]
impl sagaflow::Validator<Order> for OrderValidator {
  async fn validate(&self, order: &Order) -> Vec<Violation> {
    let mut violations = Vec::new();
    if order.quantity == 0 {
      violations.push(Violation::new("quantity must be at least 1").at("quantity"));
    }
    if order.id.is_empty() {
      violations.push(Violation::new("id is required").at("id"));
    }
    violations
  }
}

#[tokio::main]
async fn main() -> FlowResult<()> {
  // Initialize tracing (optional, for demonstration)
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

  info!("--- Basic Chain Example ---");

  let order = Order {
    id: "ORD-1001".to_string(),
    quantity: 3,
    unit_price_cents: 1_250,
  };

  // 3. Seed the flow and chain steps; each declares the slots it reads
  let mut flow = Flow::start_with("order", order).with_validator::<Order, _>(OrderValidator);
  flow.add_keyed_variable("tax_rate_percent", 8u64);

  flow
    .then("quote", (input::<Order>("order"), input::<u64>("tax_rate_percent")), |(order, rate), _cancel| async move {
      let subtotal_cents = order.unit_price_cents * u64::from(order.quantity);
      info!(order_id = %order.id, subtotal_cents, "Quoted order");
      Ok(Quote {
        subtotal_cents,
        tax_cents: subtotal_cents * rate / 100,
      })
    })
    .await?
    .then("inventory_check", (input::<Order>("order"),), |(order,), _cancel| async move {
      // Runs concurrently with "quote": it does not depend on it.
      if order.quantity > 100 {
        return Err(Failure::msg(format!("only 100 units of {} in stock", order.id)));
      }
      Ok(true)
    })
    .await?
    .then(
      "total",
      (input::<Quote>("quote"), input::<bool>("inventory_check")),
      |(quote, _in_stock), _cancel| async move { Ok(quote.subtotal_cents + quote.tax_cents) },
    )
    .await?;

  // 4. Derive a display value without a full step
  flow.map("total", |cents: u64| format!("${}.{:02}", cents / 100, cents % 100), Some("total_display"))?;

  match flow.get_result_of::<String>("total_display").await? {
    Ok(display_value) => info!("Order total: {}", display_value),
    Err(failure) => info!("Order failed: {}", failure),
  }

  for step in flow.steps() {
    info!(key = step.key(), kind = ?step.kind(), status = ?step.status(), "Ledger entry");
  }

  // 5. The same chain with an invalid order never reaches the pricing step
  let invalid = Order {
    id: String::new(),
    quantity: 0,
    unit_price_cents: 999,
  };
  let mut rejected = Flow::start_with("order", invalid).with_validator::<Order, _>(OrderValidator);
  rejected
    .then("quote", (input::<Order>("order"),), |(order,), _cancel| async move {
      Ok(order.unit_price_cents * u64::from(order.quantity))
    })
    .await?;

  if let Err(failure) = rejected.get_result().await? {
    info!("Invalid order rejected: {}", failure);
  }

  info!("--- Basic Chain Example Finished ---");
  Ok(())
}
