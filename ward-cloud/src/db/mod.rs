//! Database access layer
//!
//! PostgreSQL implementations of the engine's storage traits, plus the
//! service-only tables (audit log, runtime settings, payment events).

pub mod accounts;
pub mod audit;
pub mod mfa;
pub mod payments;
pub mod plans;
pub mod settings;
pub mod usage;

pub use accounts::PgAccountStore;
pub use audit::PgAuditSink;
pub use mfa::PgMfaStore;
pub use plans::PgPlanStore;
pub use usage::PgUsageStore;
