//! Metered resource keys

use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

const THREAT_INTEL_PREFIX: &str = "threat_intel:";

/// A resource whose consumption is counted against a plan
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resource {
    Scans,
    Documentation,
    Repositories,
    ChatMessages,
    /// Calls to one threat-intelligence provider (lowercase name)
    ThreatIntel(String),
}

impl Resource {
    pub fn threat_intel(provider: &str) -> Self {
        Self::ThreatIntel(provider.trim().to_ascii_lowercase())
    }

    /// Counter key used by the ledger
    pub fn key(&self) -> String {
        match self {
            Self::Scans => "scans".to_string(),
            Self::Documentation => "documentation".to_string(),
            Self::Repositories => "repositories".to_string(),
            Self::ChatMessages => "chat_messages".to_string(),
            Self::ThreatIntel(provider) => format!("{THREAT_INTEL_PREFIX}{provider}"),
        }
    }

    pub fn is_threat_intel(&self) -> bool {
        matches!(self, Self::ThreatIntel(_))
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for Resource {
    type Err = EngineError;

    /// Accepts both the ledger key and the camelCase plan field name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scans" => Ok(Self::Scans),
            "documentation" => Ok(Self::Documentation),
            "repositories" => Ok(Self::Repositories),
            "chat_messages" | "chatMessages" => Ok(Self::ChatMessages),
            other => match other.strip_prefix(THREAT_INTEL_PREFIX) {
                Some(provider) if !provider.trim().is_empty() => Ok(Self::threat_intel(provider)),
                _ => Err(EngineError::UnknownResource(other.to_string())),
            },
        }
    }
}
