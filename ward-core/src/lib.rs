//! Ward core: plan entitlements, quota enforcement and MFA step-up
//!
//! Components, leaves first:
//!
//! - [`plan::PlanCatalog`]: normalized plan definitions with a TTL cache
//! - [`window`]: quota window boundaries (daily, monthly, yearly)
//! - [`ledger::QuotaLedger`]: per-subject counters with lazy rollover
//! - [`entitlement::EntitlementChecker`]: allow/deny decisions, plan changes
//! - [`mfa::MfaGate`]: OTP/TOTP enrollment and verification
//! - [`session::SessionIssuer`]: signed tokens bound to the security stamp
//!
//! Storage and delivery are traits with in-memory implementations here; the
//! service crate provides the database and transport implementations.

pub mod account;
pub mod audit;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod entitlement;
pub mod error;
pub mod ledger;
pub mod mfa;
pub mod plan;
pub mod resource;
pub mod session;
pub mod window;

pub use config::{ConfigHandle, EngineConfig};
pub use error::{BoxError, EngineError};
