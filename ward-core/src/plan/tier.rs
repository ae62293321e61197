//! Plan hierarchy
//!
//! The order of plans is an explicit rank table, never an index into a list.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Standard,
    Pro,
    Enterprise,
}

impl PlanTier {
    pub const ALL: [PlanTier; 4] = [Self::Free, Self::Standard, Self::Pro, Self::Enterprise];

    /// Position in the hierarchy `free < standard < pro < enterprise`
    pub const fn rank(&self) -> u8 {
        match self {
            Self::Free => 0,
            Self::Standard => 1,
            Self::Pro => 2,
            Self::Enterprise => 3,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Standard => "standard",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }

    /// Strictly higher rank; moving to the same plan is not an upgrade
    pub fn is_upgrade_to(&self, target: PlanTier) -> bool {
        target.rank() > self.rank()
    }

    /// AI model categories the plan unlocks
    pub fn allows_model(&self, category: ModelCategory) -> bool {
        category.required_tier().rank() <= self.rank()
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "standard" => Ok(Self::Standard),
            "pro" => Ok(Self::Pro),
            "enterprise" => Ok(Self::Enterprise),
            _ => Err(EngineError::PlanNotFound(s.to_string())),
        }
    }
}

/// AI model category offered by the chat/scan assistant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelCategory {
    Basic,
    Standard,
    Advanced,
    Enterprise,
}

impl ModelCategory {
    const fn required_tier(&self) -> PlanTier {
        match self {
            Self::Basic => PlanTier::Free,
            Self::Standard => PlanTier::Standard,
            Self::Advanced => PlanTier::Pro,
            Self::Enterprise => PlanTier::Enterprise,
        }
    }
}
