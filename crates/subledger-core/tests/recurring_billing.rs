//! Gateway-strategy billing runs: the gateway's own recurring billing
//! creates the transactions and the engine reconciles them.

mod common;

use chrono::{Duration, TimeZone, Utc};
use common::{context, today};
use subledger_core::{BillingConfig, BillingStrategy, GatewayPayment};
use subledger_db::TransactionRepository;
use subledger_types::Money;

fn recurring_config() -> BillingConfig {
    BillingConfig::new().with_strategy(BillingStrategy::Gateway)
}

fn payment(billing_key: &str, cents: i64, success: bool, at_hour: u32) -> GatewayPayment {
    GatewayPayment {
        billing_key: billing_key.to_string(),
        amount: Money::from_cents(cents),
        success,
        message: None,
        created_at: Utc.with_ymd_and_hms(2026, 3, 15, at_hour, 0, 0).unwrap(),
    }
}

#[tokio::test]
async fn gateway_payment_credits_the_subscription() {
    let ctx = context(recurring_config());
    let plan = ctx.create_plan("premium", 3041).await;
    let sub = ctx.subscribe(&plan, today()).await;
    let key = sub.billing_key.clone().unwrap();
    ctx.gateway.queue_payment(payment(&key, 3041, true, 8));

    let transactions = ctx.processor.run_billing(today()).await.unwrap();
    assert_eq!(transactions.len(), 1);
    assert!(transactions[0].success);

    let sub = ctx.subscription(sub.id).await;
    assert_eq!(sub.paid_through, Some(today() + chrono::Months::new(1)));
    assert_eq!(
        sub.last_transaction_at,
        Some(Utc.with_ymd_and_hms(2026, 3, 15, 8, 0, 0).unwrap())
    );
}

#[tokio::test]
async fn watermark_is_the_newest_applied_transaction() {
    let ctx = context(recurring_config());
    let plan = ctx.create_plan("premium", 3041).await;
    let sub = ctx.subscribe(&plan, today()).await;
    let key = sub.billing_key.clone().unwrap();

    // first pull starts from nothing
    ctx.processor.run_billing(today()).await.unwrap();
    assert_eq!(ctx.gateway.last_transactions_since(), Some(None));

    ctx.gateway.queue_payment(payment(&key, 3041, true, 8));
    ctx.processor.run_billing(today()).await.unwrap();

    // the next pull resumes from the applied transaction
    ctx.processor.run_billing(today()).await.unwrap();
    assert_eq!(
        ctx.gateway.last_transactions_since(),
        Some(Some(Utc.with_ymd_and_hms(2026, 3, 15, 8, 0, 0).unwrap()))
    );
}

#[tokio::test]
async fn replayed_transactions_are_rejected_per_subscription() {
    let ctx = context(recurring_config());
    let plan = ctx.create_plan("premium", 3041).await;
    let sub = ctx.subscribe(&plan, today()).await;
    let key = sub.billing_key.clone().unwrap();

    ctx.gateway.queue_payment(payment(&key, 3041, true, 8));
    ctx.processor.run_billing(today()).await.unwrap();

    // the gateway replays the same transaction and an older one
    ctx.gateway.queue_payment(payment(&key, 3041, true, 8));
    ctx.gateway.queue_payment(payment(&key, 3041, true, 6));
    let transactions = ctx.processor.run_billing(today()).await.unwrap();
    assert!(transactions.is_empty());

    // exactly one credit ever applied
    let sub = ctx.subscription(sub.id).await;
    assert_eq!(sub.paid_through, Some(today() + chrono::Months::new(1)));
    let persisted = ctx
        .store
        .transactions
        .for_subscription(sub.id)
        .await
        .unwrap();
    assert_eq!(persisted.len(), 1);
}

#[tokio::test]
async fn failed_gateway_payment_starts_the_grace_period() {
    let ctx = context(recurring_config().with_days_grace(3));
    let plan = ctx.create_plan("premium", 3041).await;
    let sub = ctx.subscribe(&plan, today()).await;
    let key = sub.billing_key.clone().unwrap();
    ctx.gateway.queue_payment(payment(&key, 3041, false, 8));

    let transactions = ctx.processor.run_billing(today()).await.unwrap();
    assert_eq!(transactions.len(), 1);
    assert!(!transactions[0].success);

    let sub = ctx.subscription(sub.id).await;
    assert_eq!(sub.expire_on, Some(today() + Duration::days(3)));
    // the failed transaction still advances the watermark
    assert!(sub.last_transaction_at.is_some());
}

#[tokio::test]
async fn silently_skipped_subscriptions_get_their_grace_period() {
    let ctx = context(recurring_config().with_days_grace(3));
    let plan = ctx.create_plan("premium", 3041).await;
    let mut sub = ctx.subscribe(&plan, today()).await;
    // the gateway stopped billing this subscriber days ago
    sub.paid_through = Some(today() - Duration::days(5));
    ctx.put_subscription(&sub).await;

    ctx.processor.run_billing(today()).await.unwrap();
    let sub = ctx.subscription(sub.id).await;
    assert_eq!(sub.expire_on, Some(today() + Duration::days(3)));
    assert_eq!(ctx.notifier.warning_count(), 1);
}

#[tokio::test]
async fn unknown_billing_keys_are_ignored() {
    let ctx = context(recurring_config());
    let plan = ctx.create_plan("premium", 3041).await;
    ctx.subscribe(&plan, today()).await;
    ctx.gateway
        .queue_payment(payment("no-such-subscriber", 3041, true, 8));

    let transactions = ctx.processor.run_billing(today()).await.unwrap();
    assert!(transactions.is_empty());
}
