//! Walks one order through its whole lifecycle against in-memory
//! stores and provider fakes, including a rejected duplicate payment.
//! Coordinator tracing is emitted at `info`; set `RUST_LOG=debug` to
//! watch the transaction scopes and retries underneath.
//!
//! Run: cargo run -p coordinator --example full_lifecycle

use coordinator::{
    CoordinatorConfig, InMemoryKitchenClient, InMemoryPaymentClient, OrderCoordinator,
};
use domain::{CustomerId, ItemSize, Money, OrderItem};
use order_store::{InMemoryIdempotencyStore, InMemoryOrderStore};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Wire the coordinator over in-memory collaborators
    let payment = InMemoryPaymentClient::new();
    let kitchen = InMemoryKitchenClient::new();
    let coordinator = OrderCoordinator::new(
        InMemoryOrderStore::new(),
        InMemoryIdempotencyStore::new(),
        payment.clone(),
        kitchen.clone(),
        CoordinatorConfig::default(),
    );

    println!("=== Order Lifecycle Walkthrough ===\n");

    // 3. Place an order
    let items = vec![
        OrderItem::new("flat white", ItemSize::Medium, 2, Money::from_cents(450)),
        OrderItem::new("cortado", ItemSize::Small, 1, Money::from_cents(400)),
    ];
    let order = coordinator.create_order(CustomerId::new(), items).await?;
    let order_id = order.id();
    println!(
        "placed order {order_id} for {} ({})",
        order.total_amount(),
        order.status()
    );

    // 4. Charge the customer
    let order = coordinator.pay_order(order_id).await?;
    if let Some(payment_ref) = order.payment_ref() {
        println!(
            "charged {} via {payment_ref} ({}, version {})",
            order.total_amount(),
            order.status(),
            order.version()
        );
    }

    // 5. A duplicate payment request is rejected without a second charge
    if let Err(err) = coordinator.pay_order(order_id).await {
        println!(
            "duplicate payment rejected: {err} (charges issued: {})",
            payment.charge_count()
        );
    }

    // 6. Kitchen, courier, doorstep
    let order = coordinator.schedule_order(order_id).await?;
    if let Some(kitchen_ref) = order.kitchen_ref() {
        println!(
            "kitchen accepted the order as {kitchen_ref} ({} preparing)",
            kitchen.schedule_count()
        );
    }

    let order = coordinator.dispatch_order(order_id).await?;
    println!("courier picked the order up ({})", order.status());

    let order = coordinator.deliver_order(order_id).await?;
    println!(
        "order delivered ({}, version {})",
        order.status(),
        order.version()
    );

    Ok(())
}
