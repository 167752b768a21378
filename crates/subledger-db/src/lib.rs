//! Subledger DB - persistence interfaces
//!
//! Defines the async repository traits the billing engine issues its
//! declarative queries through, plus a complete in-memory implementation.
//! The engine never depends on a specific storage engine; any backend that
//! implements these traits will do.

pub mod error;
pub mod memory;
pub mod repo;

pub use error::{DbError, DbResult};
pub use memory::{
    MemoryChangeLog, MemoryCouponRepository, MemoryPlanRepository, MemoryStore,
    MemorySubscriptionRepository, MemoryTransactionRepository,
};
pub use repo::{
    ChangeLogRepository, CouponRepository, PlanRepository, SubscriptionRepository,
    TransactionRepository,
};
