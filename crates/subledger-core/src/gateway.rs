//! Payment gateway abstraction
//!
//! The real wire protocol lives outside this crate; the engine only
//! depends on this trait. A scriptable [`TestGateway`] ships for tests and
//! local development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use subledger_types::{Address, CardDetails, Money};

use crate::error::BillingError;

/// A settlement reported by the gateway, keyed by billing key; the
/// processor resolves it to a subscription and persists it as a
/// [`subledger_types::Transaction`]
#[derive(Debug, Clone)]
pub struct GatewayPayment {
    /// Gateway subscriber the charge ran against
    pub billing_key: String,
    /// Amount charged or attempted
    pub amount: Money,
    /// Whether the charge succeeded
    pub success: bool,
    /// Gateway outcome note
    pub message: Option<String>,
    /// When the gateway created the transaction
    pub created_at: DateTime<Utc>,
}

/// Outcome of storing or updating a card offsite
#[derive(Debug, Clone)]
pub struct StoreResponse {
    /// Whether the gateway accepted the card
    pub success: bool,
    /// Gateway subscriber id to bill against from now on
    pub billing_key: Option<String>,
    /// Gateway outcome note
    pub message: Option<String>,
}

/// Payment gateway trait
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Charge a stored subscriber; a decline is a successful call with
    /// `success=false`
    async fn charge(&self, billing_key: &str, amount: Money)
        -> Result<GatewayPayment, BillingError>;

    /// Store a new card offsite
    async fn store(
        &self,
        card: &CardDetails,
        address: Option<&Address>,
    ) -> Result<StoreResponse, BillingError>;

    /// Replace the card behind an existing billing key
    async fn update(
        &self,
        billing_key: &str,
        card: &CardDetails,
        address: Option<&Address>,
    ) -> Result<StoreResponse, BillingError>;

    /// Cancel a remote subscriber, releasing the billing key
    async fn cancel(&self, billing_key: &str) -> Result<(), BillingError>;

    /// Transactions the gateway created after `after`; used by the
    /// recurring strategy
    async fn transactions_since(
        &self,
        after: Option<DateTime<Utc>>,
    ) -> Result<Vec<GatewayPayment>, BillingError>;
}

/// Scriptable in-memory gateway
///
/// Charges succeed unless the billing key has been marked declining;
/// stores succeed unless failure is scripted. Everything it does is
/// observable for assertions.
#[derive(Default)]
pub struct TestGateway {
    declining: DashSet<String>,
    fail_store_message: Mutex<Option<String>>,
    canceled: DashSet<String>,
    queued_payments: Mutex<Vec<GatewayPayment>>,
    last_since: Mutex<Option<Option<DateTime<Utc>>>>,
    stored_cards: DashMap<String, String>,
    refuse_transport: AtomicBool,
}

impl TestGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future charge against this billing key decline
    pub fn decline(&self, billing_key: impl Into<String>) {
        self.declining.insert(billing_key.into());
    }

    /// Make the next `store`/`update` come back unsuccessful
    pub fn fail_store(&self, message: impl Into<String>) {
        *self.fail_store_message.lock().unwrap() = Some(message.into());
    }

    /// Make every call fail at the transport level
    pub fn refuse_transport(&self) {
        self.refuse_transport.store(true, Ordering::SeqCst);
    }

    /// Queue a payment for the next `transactions_since` pull
    pub fn queue_payment(&self, payment: GatewayPayment) {
        self.queued_payments.lock().unwrap().push(payment);
    }

    /// Billing keys canceled so far
    pub fn canceled_keys(&self) -> Vec<String> {
        self.canceled.iter().map(|k| k.clone()).collect()
    }

    /// Whether a billing key has been canceled
    pub fn was_canceled(&self, billing_key: &str) -> bool {
        self.canceled.contains(billing_key)
    }

    /// The `after` argument of the most recent `transactions_since` call
    pub fn last_transactions_since(&self) -> Option<Option<DateTime<Utc>>> {
        *self.last_since.lock().unwrap()
    }

    fn check_transport(&self) -> Result<(), BillingError> {
        if self.refuse_transport.load(Ordering::SeqCst) {
            return Err(BillingError::Gateway("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Gateway for TestGateway {
    async fn charge(
        &self,
        billing_key: &str,
        amount: Money,
    ) -> Result<GatewayPayment, BillingError> {
        self.check_transport()?;
        let success = !self.declining.contains(billing_key);
        Ok(GatewayPayment {
            billing_key: billing_key.to_string(),
            amount,
            success,
            message: Some(if success { "approved" } else { "declined" }.to_string()),
            created_at: Utc::now(),
        })
    }

    async fn store(
        &self,
        card: &CardDetails,
        _address: Option<&Address>,
    ) -> Result<StoreResponse, BillingError> {
        self.check_transport()?;
        if let Some(message) = self.fail_store_message.lock().unwrap().take() {
            return Ok(StoreResponse {
                success: false,
                billing_key: None,
                message: Some(message),
            });
        }
        let billing_key = Uuid::new_v4().to_string();
        self.stored_cards
            .insert(billing_key.clone(), card.masked());
        Ok(StoreResponse {
            success: true,
            billing_key: Some(billing_key),
            message: None,
        })
    }

    async fn update(
        &self,
        billing_key: &str,
        card: &CardDetails,
        _address: Option<&Address>,
    ) -> Result<StoreResponse, BillingError> {
        self.check_transport()?;
        if let Some(message) = self.fail_store_message.lock().unwrap().take() {
            return Ok(StoreResponse {
                success: false,
                billing_key: None,
                message: Some(message),
            });
        }
        self.stored_cards
            .insert(billing_key.to_string(), card.masked());
        Ok(StoreResponse {
            success: true,
            billing_key: Some(billing_key.to_string()),
            message: None,
        })
    }

    async fn cancel(&self, billing_key: &str) -> Result<(), BillingError> {
        self.check_transport()?;
        self.stored_cards.remove(billing_key);
        self.canceled.insert(billing_key.to_string());
        Ok(())
    }

    async fn transactions_since(
        &self,
        after: Option<DateTime<Utc>>,
    ) -> Result<Vec<GatewayPayment>, BillingError> {
        self.check_transport()?;
        *self.last_since.lock().unwrap() = Some(after);
        let queued = std::mem::take(&mut *self.queued_payments.lock().unwrap());
        Ok(match after {
            Some(after) => queued.into_iter().filter(|p| p.created_at > after).collect(),
            None => queued,
        })
    }
}
