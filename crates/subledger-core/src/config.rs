//! Billing configuration
//!
//! A single immutable value threaded explicitly into every service
//! constructor; nothing in the engine reads global state.

use subledger_types::PlanId;

/// Which side drives the billing process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BillingStrategy {
    /// The engine charges every due subscription each cycle
    #[default]
    Manual,
    /// The gateway's own recurring billing creates transactions; the engine
    /// reconciles them via the per-subscription watermark
    Gateway,
}

/// Billing engine configuration
#[derive(Debug, Clone)]
pub struct BillingConfig {
    /// Days an account stays active after a failed payment
    pub days_grace: u32,
    /// Length of the initial free trial on paid plans
    pub days_free_trial: u32,
    /// Plan assigned to subscriptions that expire; `None` leaves the plan
    /// unchanged on expiration
    pub expired_plan: Option<PlanId>,
    /// Who initiates charges
    pub strategy: BillingStrategy,
    /// Recipients of the per-run activity report; empty disables it
    pub admin_report_recipients: Vec<String>,
}

impl BillingConfig {
    /// Create a config with defaults: three days grace, no trial, manual
    /// billing, no fallback plan
    pub fn new() -> Self {
        Self {
            days_grace: 3,
            days_free_trial: 0,
            expired_plan: None,
            strategy: BillingStrategy::Manual,
            admin_report_recipients: Vec::new(),
        }
    }

    /// Set the grace period length
    pub fn with_days_grace(mut self, days: u32) -> Self {
        self.days_grace = days;
        self
    }

    /// Set the free trial length
    pub fn with_days_free_trial(mut self, days: u32) -> Self {
        self.days_free_trial = days;
        self
    }

    /// Set the plan expired subscriptions fall back to
    pub fn with_expired_plan(mut self, plan_id: PlanId) -> Self {
        self.expired_plan = Some(plan_id);
        self
    }

    /// Select the billing strategy
    pub fn with_strategy(mut self, strategy: BillingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Add an admin report recipient
    pub fn with_admin_report_recipient(mut self, email: impl Into<String>) -> Self {
        self.admin_report_recipients.push(email.into());
        self
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self::new()
    }
}
