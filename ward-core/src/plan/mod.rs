//! Plans: hierarchy, normalized limits, partial updates and the catalog

mod catalog;
mod limits;
mod merge;
mod tier;

pub use catalog::{MemoryPlanStore, PlanCatalog, PlanStore};
pub use limits::{Allowance, Limit, Plan, PlanLimits, ProviderLimit};
pub use merge::{LimitsPatch, PlanPatch, merge};
pub use tier::{ModelCategory, PlanTier};
