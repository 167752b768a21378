//! Coupons end to end: redemptions change what billing actually charges.

mod common;

use common::{context, today};
use subledger_core::{BillingConfig, ValidationError};
use subledger_db::CouponRepository;
use subledger_types::{Coupon, Money};

#[tokio::test]
async fn billing_charges_the_discounted_rate() {
    let ctx = context(BillingConfig::new());
    let plan = ctx.create_plan("premium", 3041).await;
    let sub = ctx.subscribe(&plan, today()).await;
    ctx.manager
        .coupons()
        .create_coupon(Coupon::new("30% off", 30).with_key("30off"))
        .await
        .unwrap();
    ctx.manager
        .coupons()
        .redeem(&sub, &plan, "30off", today())
        .await
        .unwrap();

    let transactions = ctx.processor.run_billing(today()).await.unwrap();
    assert_eq!(transactions.len(), 1);
    // 3041 at 30% off, truncated
    assert_eq!(transactions[0].amount, Money::from_cents(2128));

    // a whole discounted month was credited
    let sub = ctx.subscription(sub.id).await;
    assert_eq!(sub.paid_through, Some(today() + chrono::Months::new(1)));
}

#[tokio::test]
async fn deepest_discount_wins_when_redemptions_overlap() {
    let ctx = context(BillingConfig::new());
    let plan = ctx.create_plan("premium", 3041).await;
    let sub = ctx.subscribe(&plan, today()).await;
    let ledger = ctx.manager.coupons();
    ledger
        .create_coupon(Coupon::new("15% off", 15).with_key("15off"))
        .await
        .unwrap();
    ledger
        .create_coupon(Coupon::new("30% off", 30).with_key("30off"))
        .await
        .unwrap();
    ledger.redeem(&sub, &plan, "15off", today()).await.unwrap();
    ledger.redeem(&sub, &plan, "30off", today()).await.unwrap();

    let transactions = ctx.processor.run_billing(today()).await.unwrap();
    assert_eq!(transactions[0].amount, Money::from_cents(2128));
}

#[tokio::test]
async fn full_discount_makes_the_subscription_unpaid() {
    let ctx = context(BillingConfig::new());
    let plan = ctx.create_plan("premium", 3041).await;
    let sub = ctx.subscribe(&plan, today()).await;
    ctx.manager
        .coupons()
        .create_coupon(Coupon::new("Complimentary", 100).with_key("comp"))
        .await
        .unwrap();
    ctx.manager
        .coupons()
        .redeem(&sub, &plan, "comp", today())
        .await
        .unwrap();

    // never charged, never pushed into grace
    let transactions = ctx.processor.run_billing(today()).await.unwrap();
    assert!(transactions.is_empty());
    let sub = ctx.subscription(sub.id).await;
    assert!(sub.expire_on.is_none());
}

#[tokio::test]
async fn destroying_a_coupon_reverts_the_rate() {
    let ctx = context(BillingConfig::new());
    let plan = ctx.create_plan("premium", 3041).await;
    let sub = ctx.subscribe(&plan, today()).await;
    let ledger = ctx.manager.coupons();
    let coupon = ledger
        .create_coupon(Coupon::new("30% off", 30).with_key("30off"))
        .await
        .unwrap();
    ledger.redeem(&sub, &plan, "30off", today()).await.unwrap();
    assert_eq!(
        ledger.effective_rate(&sub, &plan, today()).await.unwrap(),
        Money::from_cents(2128)
    );

    // deleting the coupon cascades to its redemptions
    ctx.store.coupons.delete(coupon.id).await.unwrap();
    assert_eq!(
        ledger.effective_rate(&sub, &plan, today()).await.unwrap(),
        Money::from_cents(3041)
    );
}

#[tokio::test]
async fn a_second_redemption_of_the_same_coupon_is_rejected() {
    let ctx = context(BillingConfig::new());
    let plan = ctx.create_plan("premium", 3041).await;
    let sub = ctx.subscribe(&plan, today()).await;
    ctx.manager
        .coupons()
        .create_coupon(Coupon::new("30% off", 30).with_key("30off"))
        .await
        .unwrap();
    ctx.manager
        .coupons()
        .redeem(&sub, &plan, "30off", today())
        .await
        .unwrap();

    let err = ctx
        .manager
        .coupons()
        .redeem(&sub, &plan, "30OFF", today())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        subledger_core::BillingError::Validation(ValidationError::DuplicateRedemption)
    ));
}
