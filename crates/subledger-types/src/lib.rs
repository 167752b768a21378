//! Subledger Types - Shared domain types
//!
//! This crate contains the domain types used across the subledger billing
//! engine:
//! - Integer-cent monetary values
//! - Plans, feature sets, and coupons
//! - Subscriptions and their derived lifecycle state
//! - Payment transactions and the plan-change audit record

pub mod card;
pub mod change;
pub mod coupon;
pub mod money;
pub mod owner;
pub mod plan;
pub mod subscription;
pub mod transaction;

pub use card::*;
pub use change::*;
pub use coupon::*;
pub use money::*;
pub use owner::*;
pub use plan::*;
pub use subscription::*;
pub use transaction::*;
