//! Billing runs
//!
//! One processor drives a complete billing cycle for the configured
//! strategy. Transactions are persisted before their outcome is
//! interpreted, and no single subscription's failure aborts the batch: the
//! failure is appended to the transaction's message and the run moves on.

use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use subledger_db::{PlanRepository, SubscriptionRepository, TransactionRepository};
use subledger_types::{Subscription, Transaction};

use crate::config::BillingStrategy;
use crate::error::BillingError;
use crate::gateway::{Gateway, GatewayPayment};
use crate::lifecycle::BillingCycleManager;
use crate::notifier::Notifier;

/// Executes billing runs against the configured strategy
#[derive(Clone)]
pub struct PaymentProcessor {
    manager: BillingCycleManager,
    plans: Arc<dyn PlanRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    transactions: Arc<dyn TransactionRepository>,
    gateway: Arc<dyn Gateway>,
    notifier: Arc<dyn Notifier>,
}

impl PaymentProcessor {
    pub fn new(
        manager: BillingCycleManager,
        plans: Arc<dyn PlanRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        transactions: Arc<dyn TransactionRepository>,
        gateway: Arc<dyn Gateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            manager,
            plans,
            subscriptions,
            transactions,
            gateway,
            notifier,
        }
    }

    /// Run one complete billing cycle for `date`
    ///
    /// Collects payments per the configured strategy, retires every
    /// subscription whose grace deadline has arrived, and sends the admin
    /// activity report. Returns the transactions the run produced.
    #[instrument(skip(self), fields(date = %date))]
    pub async fn run_billing(&self, date: NaiveDate) -> Result<Vec<Transaction>, BillingError> {
        let transactions = match self.manager.config().strategy {
            BillingStrategy::Manual => self.charge_due_subscriptions(date).await?,
            BillingStrategy::Gateway => self.reconcile_gateway_transactions(date).await?,
        };
        self.expire_lapsed(date).await?;
        self.send_admin_report(&transactions).await;
        info!(transactions = transactions.len(), "billing run complete");
        Ok(transactions)
    }

    /// Manual strategy: charge every due, effectively-paid subscription
    async fn charge_due_subscriptions(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<Transaction>, BillingError> {
        let due = self.subscriptions.find_due(date).await?;
        info!(count = due.len(), "charging due subscriptions");

        let mut transactions = Vec::new();
        for sub in due {
            match self.charge_one(&sub, date).await {
                Ok(Some(transaction)) => transactions.push(transaction),
                Ok(None) => {}
                Err(err) => {
                    warn!(subscription_id = %sub.id, error = %err, "charge attempt failed")
                }
            }
        }
        Ok(transactions)
    }

    async fn charge_one(
        &self,
        sub: &Subscription,
        date: NaiveDate,
    ) -> Result<Option<Transaction>, BillingError> {
        let Some(plan) = self.plans.find_by_id(sub.plan_id).await? else {
            warn!(subscription_id = %sub.id, "subscription references a missing plan");
            return Ok(None);
        };
        // the plan rate alone can't be trusted; a full discount makes the
        // subscription unpaid
        let rate = self.manager.coupons().effective_rate(sub, &plan, date).await?;
        if !rate.is_positive() {
            return Ok(None);
        }
        let Some(billing_key) = sub.billing_key.clone() else {
            warn!(subscription_id = %sub.id, "due paid subscription has no billing key");
            return Ok(None);
        };

        let payment = self.gateway.charge(&billing_key, rate).await?;
        let mut transaction = Transaction::new(
            sub.id,
            payment.amount,
            payment.success,
            billing_key,
            payment.created_at,
        );
        if let Some(message) = payment.message {
            transaction = transaction.with_message(message);
        }
        // persist first; the money moved even if what follows fails
        let transaction = self.transactions.create(transaction).await?;
        Ok(Some(self.settle(transaction, sub, date).await))
    }

    /// Recurring strategy: pull the gateway's own transactions since the
    /// watermark and apply them
    async fn reconcile_gateway_transactions(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<Transaction>, BillingError> {
        let watermark = self.subscriptions.max_last_transaction_at().await?;
        let payments = self.gateway.transactions_since(watermark).await?;
        info!(
            count = payments.len(),
            watermark = ?watermark,
            "reconciling gateway transactions"
        );

        let mut transactions = Vec::new();
        for payment in payments {
            match self.apply_gateway_payment(payment, date).await {
                Ok(Some(transaction)) => transactions.push(transaction),
                Ok(None) => {}
                Err(err) => warn!(error = %err, "gateway transaction not applied"),
            }
        }
        self.schedule_grace_for_past_due(date).await?;
        Ok(transactions)
    }

    async fn apply_gateway_payment(
        &self,
        payment: GatewayPayment,
        date: NaiveDate,
    ) -> Result<Option<Transaction>, BillingError> {
        let Some(sub) = self
            .subscriptions
            .find_by_billing_key(&payment.billing_key)
            .await?
        else {
            warn!(billing_key = %payment.billing_key, "gateway transaction for unknown billing key");
            return Ok(None);
        };
        // the global watermark can race a slow gateway; each subscription's
        // own watermark is the final word
        if matches!(sub.last_transaction_at, Some(last) if payment.created_at <= last) {
            warn!(
                subscription_id = %sub.id,
                created_at = %payment.created_at,
                "duplicate gateway transaction rejected"
            );
            return Ok(None);
        }

        let mut transaction = Transaction::new(
            sub.id,
            payment.amount,
            payment.success,
            payment.billing_key.clone(),
            payment.created_at,
        );
        if let Some(message) = payment.message {
            transaction = transaction.with_message(message);
        }
        let transaction = self.transactions.create(transaction).await?;
        let transaction = self.settle(transaction, &sub, date).await;

        // advance the watermark either way; the transaction is on record
        if let Some(mut fresh) = self.subscriptions.find_by_id(sub.id).await? {
            fresh.last_transaction_at = Some(payment.created_at);
            self.subscriptions.update(&fresh).await?;
        }
        Ok(Some(transaction))
    }

    /// Credit a successful payment or start the grace period after a
    /// failed one; settlement and invoice-delivery failures are appended
    /// to the transaction's message and never abort the batch
    async fn settle(
        &self,
        mut transaction: Transaction,
        sub: &Subscription,
        date: NaiveDate,
    ) -> Transaction {
        let outcome = if transaction.success {
            match self
                .manager
                .credit_and_invoice(sub.id, transaction.amount, date)
                .await
            {
                Ok((_, Some(notify_err))) => {
                    warn!(subscription_id = %sub.id, error = %notify_err, "invoice delivery failed");
                    self.append_note(
                        &mut transaction,
                        &format!("invoice delivery failed: {notify_err}"),
                    )
                    .await;
                    Ok(())
                }
                Ok((_, None)) => Ok(()),
                Err(err) => Err(err),
            }
        } else {
            self.manager
                .expire_after_grace(sub, date)
                .await
                .map(|_| ())
        };

        if let Err(err) = outcome {
            warn!(subscription_id = %sub.id, error = %err, "settlement failed after charge");
            self.append_note(&mut transaction, &format!("settlement failed: {err}"))
                .await;
        }
        transaction
    }

    /// Append an outcome note to the persisted transaction and mirror it
    /// on the in-flight copy
    async fn append_note(&self, transaction: &mut Transaction, note: &str) {
        if let Err(db_err) = self.transactions.append_message(transaction.id, note).await {
            error!(error = %db_err, "could not record transaction note");
        }
        transaction.message = Some(match transaction.message.take() {
            Some(existing) => format!("{existing}; {note}"),
            None => note.to_string(),
        });
    }

    /// Start the grace period for effectively-paid subscriptions the
    /// gateway has stopped billing
    async fn schedule_grace_for_past_due(&self, date: NaiveDate) -> Result<(), BillingError> {
        let past_due = self.subscriptions.find_past_due_without_expiry(date).await?;
        for sub in past_due {
            let Some(plan) = self.plans.find_by_id(sub.plan_id).await? else {
                continue;
            };
            let rate = self.manager.coupons().effective_rate(&sub, &plan, date).await?;
            if !rate.is_positive() {
                continue;
            }
            if let Err(err) = self.manager.expire_after_grace(&sub, date).await {
                warn!(subscription_id = %sub.id, error = %err, "could not schedule grace");
            }
        }
        Ok(())
    }

    /// Retire everything whose grace deadline has arrived
    async fn expire_lapsed(&self, date: NaiveDate) -> Result<(), BillingError> {
        let expired = self.subscriptions.find_expired(date).await?;
        for sub in expired {
            if let Err(err) = self.manager.expire(&sub, date).await {
                warn!(subscription_id = %sub.id, error = %err, "expiration failed");
            }
        }
        Ok(())
    }

    async fn send_admin_report(&self, transactions: &[Transaction]) {
        if self.manager.config().admin_report_recipients.is_empty() || transactions.is_empty() {
            return;
        }
        if let Err(err) = self.notifier.send_admin_report(transactions).await {
            warn!(error = %err, "admin report delivery failed");
        }
    }
}
