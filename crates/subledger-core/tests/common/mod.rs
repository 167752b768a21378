//! Shared fixtures: an in-memory store wired to a scriptable gateway and a
//! recording notifier, with the manager and processor built on top.

#![allow(dead_code)]

use chrono::NaiveDate;
use std::sync::Arc;
use uuid::Uuid;

use subledger_core::{
    BillingConfig, BillingCycleManager, PaymentProcessor, RecordingNotifier, TestGateway,
};
use subledger_db::{MemoryStore, PlanRepository, SubscriptionRepository};
use subledger_types::{CardDetails, Money, OwnerRef, Plan, Subscription, SubscriptionId};

/// Fixed reference date so every scenario is deterministic
pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 15).unwrap()
}

pub struct TestContext {
    pub store: MemoryStore,
    pub gateway: Arc<TestGateway>,
    pub notifier: Arc<RecordingNotifier>,
    pub manager: BillingCycleManager,
    pub processor: PaymentProcessor,
}

pub fn context(config: BillingConfig) -> TestContext {
    let store = MemoryStore::new();
    let gateway = Arc::new(TestGateway::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let manager = BillingCycleManager::new(
        Arc::new(store.plans.clone()),
        Arc::new(store.subscriptions.clone()),
        Arc::new(store.coupons.clone()),
        Arc::new(store.changes.clone()),
        gateway.clone(),
        notifier.clone(),
        config,
    );
    let processor = PaymentProcessor::new(
        manager.clone(),
        Arc::new(store.plans.clone()),
        Arc::new(store.subscriptions.clone()),
        Arc::new(store.transactions.clone()),
        gateway.clone(),
        notifier.clone(),
    );
    TestContext {
        store,
        gateway,
        notifier,
        manager,
        processor,
    }
}

impl TestContext {
    pub async fn create_plan(&self, name: &str, rate_cents: i64) -> Plan {
        self.store
            .plans
            .create(Plan::new(name, Money::from_cents(rate_cents), "full"))
            .await
            .unwrap()
    }

    /// Subscribe a fresh owner with the sample card
    pub async fn subscribe(&self, plan: &Plan, date: NaiveDate) -> Subscription {
        self.manager
            .subscribe(
                OwnerRef::user(Uuid::new_v4()),
                plan.id,
                Some(&CardDetails::sample()),
                None,
                date,
            )
            .await
            .unwrap()
    }

    /// Reload a subscription from the store
    pub async fn subscription(&self, id: SubscriptionId) -> Subscription {
        self.store
            .subscriptions
            .find_by_id(id)
            .await
            .unwrap()
            .unwrap()
    }

    /// Overwrite lifecycle fields directly, bypassing the manager
    pub async fn put_subscription(&self, sub: &Subscription) {
        self.store.subscriptions.update(sub).await.unwrap();
    }
}
