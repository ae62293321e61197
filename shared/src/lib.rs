//! Shared types for Ward
//!
//! Common types used across the engine and the cloud service: the unified
//! error system, plan definition wire DTOs and entitlement decision DTOs.

pub mod entitlement;
pub mod error;
pub mod plan;
pub mod util;

// Re-exports
pub use http;
pub use serde::{Deserialize, Serialize};
