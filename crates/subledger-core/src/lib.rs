//! Subledger Core - subscription billing engine
//!
//! Computes effective prices from plans and coupons, advances and retracts
//! the paid-through date as payments arrive, manages the grace period
//! before service loss, and keeps an audit trail of plan changes. Payment
//! outcomes come from a gateway collaborator, either by charging due
//! subscriptions directly (manual strategy) or by reconciling transactions
//! the gateway created on its own (recurring strategy).
//!
//! # Example
//!
//! ```rust,ignore
//! use subledger_core::{BillingConfig, BillingCycleManager, PaymentProcessor};
//!
//! let config = BillingConfig::new()
//!     .with_days_grace(3)
//!     .with_days_free_trial(30);
//!
//! let manager = BillingCycleManager::new(
//!     plans, subscriptions, coupons, changes, gateway.clone(), notifier.clone(), config,
//! );
//! let sub = manager
//!     .subscribe(owner, plan.id, Some(&card), None, today)
//!     .await?;
//!
//! let processor = PaymentProcessor::new(
//!     manager, plans, subscriptions, transactions, gateway, notifier,
//! );
//! let report = processor.run_billing(today).await?;
//! ```

pub mod audit;
pub mod config;
pub mod coupons;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod notifier;
pub mod processor;
pub mod rates;

pub use audit::ChangeAuditor;
pub use config::{BillingConfig, BillingStrategy};
pub use coupons::CouponLedger;
pub use error::{BillingError, ValidationError};
pub use gateway::{Gateway, GatewayPayment, StoreResponse, TestGateway};
pub use lifecycle::BillingCycleManager;
pub use notifier::{Notifier, NotifierEvent, NotifyError, NullNotifier, RecordingNotifier};
pub use processor::PaymentProcessor;
