//! Outbound notification abstraction
//!
//! Rendering and delivery live outside this crate. Delivery failures are
//! caught by callers and recorded as messages, never propagated as fatal.

use async_trait::async_trait;
use std::sync::Mutex;
use thiserror::Error;

use subledger_types::{Money, OwnerRef, Subscription, Transaction};

/// Notification delivery failure; always non-fatal to billing
#[derive(Error, Debug, Clone)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Notifier trait
#[async_trait]
pub trait Notifier: Send + Sync {
    /// After-the-fact invoice for a received payment
    async fn send_invoice(
        &self,
        owner: &OwnerRef,
        subscription: &Subscription,
        amount: Money,
    ) -> Result<(), NotifyError>;

    /// Warning that service will lapse at the end of the grace period
    async fn send_expiration_warning(
        &self,
        owner: &OwnerRef,
        subscription: &Subscription,
    ) -> Result<(), NotifyError>;

    /// Notice that service has lapsed
    async fn send_expiration_notice(
        &self,
        owner: &OwnerRef,
        subscription: &Subscription,
    ) -> Result<(), NotifyError>;

    /// Aggregate activity report for a billing run
    async fn send_admin_report(&self, transactions: &[Transaction]) -> Result<(), NotifyError>;
}

/// Notifier that drops everything
#[derive(Debug, Default, Clone)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn send_invoice(
        &self,
        _owner: &OwnerRef,
        _subscription: &Subscription,
        _amount: Money,
    ) -> Result<(), NotifyError> {
        Ok(())
    }

    async fn send_expiration_warning(
        &self,
        _owner: &OwnerRef,
        _subscription: &Subscription,
    ) -> Result<(), NotifyError> {
        Ok(())
    }

    async fn send_expiration_notice(
        &self,
        _owner: &OwnerRef,
        _subscription: &Subscription,
    ) -> Result<(), NotifyError> {
        Ok(())
    }

    async fn send_admin_report(&self, _transactions: &[Transaction]) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// What a [`RecordingNotifier`] saw
#[derive(Debug, Clone)]
pub enum NotifierEvent {
    Invoice {
        owner: OwnerRef,
        amount: Money,
    },
    ExpirationWarning {
        owner: OwnerRef,
    },
    ExpirationNotice {
        owner: OwnerRef,
    },
    AdminReport {
        transaction_count: usize,
    },
}

/// Notifier that records every delivery for assertions; can be scripted
/// to fail
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<NotifierEvent>>,
    fail_next: Mutex<Option<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next delivery fail with the given message
    pub fn fail_next(&self, message: impl Into<String>) {
        *self.fail_next.lock().unwrap() = Some(message.into());
    }

    /// Everything delivered so far
    pub fn events(&self) -> Vec<NotifierEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Number of invoices delivered
    pub fn invoice_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, NotifierEvent::Invoice { .. }))
            .count()
    }

    /// Number of expiration warnings delivered
    pub fn warning_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, NotifierEvent::ExpirationWarning { .. }))
            .count()
    }

    /// Number of expiration notices delivered
    pub fn notice_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, NotifierEvent::ExpirationNotice { .. }))
            .count()
    }

    /// Number of admin reports delivered
    pub fn report_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, NotifierEvent::AdminReport { .. }))
            .count()
    }

    fn deliver(&self, event: NotifierEvent) -> Result<(), NotifyError> {
        if let Some(message) = self.fail_next.lock().unwrap().take() {
            return Err(NotifyError(message));
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_invoice(
        &self,
        owner: &OwnerRef,
        _subscription: &Subscription,
        amount: Money,
    ) -> Result<(), NotifyError> {
        self.deliver(NotifierEvent::Invoice {
            owner: owner.clone(),
            amount,
        })
    }

    async fn send_expiration_warning(
        &self,
        owner: &OwnerRef,
        _subscription: &Subscription,
    ) -> Result<(), NotifyError> {
        self.deliver(NotifierEvent::ExpirationWarning {
            owner: owner.clone(),
        })
    }

    async fn send_expiration_notice(
        &self,
        owner: &OwnerRef,
        _subscription: &Subscription,
    ) -> Result<(), NotifyError> {
        self.deliver(NotifierEvent::ExpirationNotice {
            owner: owner.clone(),
        })
    }

    async fn send_admin_report(&self, transactions: &[Transaction]) -> Result<(), NotifyError> {
        self.deliver(NotifierEvent::AdminReport {
            transaction_count: transactions.len(),
        })
    }
}
