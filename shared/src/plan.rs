//! Plan definition wire format
//!
//! These types mirror the JSON stored in the plan backing store and accepted
//! by the admin API. They keep the legacy shapes intact; the engine
//! normalizes them once at load time and never branches on them afterwards.
//!
//! ```json
//! {
//!   "planId": "standard",
//!   "price": 9.99,
//!   "period": "monthly",
//!   "limits": {
//!     "scans": 10,
//!     "documentation": "unlimited",
//!     "repositories": 3,
//!     "chatMessages": -1,
//!     "threatIntelligence": {
//!       "abuseipdb": true,
//!       "virustotal": { "enabled": true, "limit": 25 }
//!     }
//!   }
//! }
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Billing period of a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingPeriod {
    Monthly,
    Yearly,
}

impl BillingPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }
}

/// A scalar limit as it appears on the wire: a count, `-1`, or `"unlimited"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireLimit {
    Count(i64),
    Keyword(String),
}

impl WireLimit {
    /// Canonical wire spelling of the Unlimited sentinel
    pub fn unlimited() -> Self {
        Self::Keyword("unlimited".to_string())
    }
}

/// A threat-intelligence provider entry in one of its legacy shapes
///
/// - bare boolean: free/unmetered provider switched on or off
/// - bare number: metered provider with a daily count (`-1` = unlimited)
/// - object: `{ "enabled": bool, "limit": int | -1 | "unlimited" }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireProviderLimit {
    Flag(bool),
    Count(i64),
    Object {
        enabled: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<WireLimit>,
    },
}

/// Resource limits of a plan as stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePlanLimits {
    pub scans: WireLimit,
    pub documentation: WireLimit,
    pub repositories: WireLimit,
    pub chat_messages: WireLimit,
    #[serde(default)]
    pub threat_intelligence: BTreeMap<String, WireProviderLimit>,
}

/// A full plan row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanDefinition {
    pub plan_id: String,
    pub price: Decimal,
    pub period: BillingPeriod,
    pub limits: WirePlanLimits,
}

/// Partial update of a plan's limits
///
/// Absent fields are left untouched. A provider mapped to `null` is removed
/// (and therefore disabled).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireLimitsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scans: Option<WireLimit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<WireLimit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repositories: Option<WireLimit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_messages: Option<WireLimit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threat_intelligence: Option<BTreeMap<String, Option<WireProviderLimit>>>,
}

/// Partial update of a plan (admin pricing/limits edit)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanPatchRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<BillingPeriod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<WireLimitsPatch>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_legacy_provider_shapes() {
        let json = r#"{
            "planId": "standard",
            "price": 9.99,
            "period": "monthly",
            "limits": {
                "scans": 10,
                "documentation": "unlimited",
                "repositories": 3,
                "chatMessages": -1,
                "threatIntelligence": {
                    "abuseipdb": true,
                    "shodan": 5,
                    "virustotal": { "enabled": true, "limit": -1 },
                    "greynoise": { "enabled": false }
                }
            }
        }"#;
        let plan: PlanDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(plan.plan_id, "standard");
        assert_eq!(plan.period, BillingPeriod::Monthly);
        assert_eq!(plan.limits.scans, WireLimit::Count(10));
        assert_eq!(plan.limits.documentation, WireLimit::unlimited());
        assert_eq!(plan.limits.chat_messages, WireLimit::Count(-1));

        let ti = &plan.limits.threat_intelligence;
        assert_eq!(ti["abuseipdb"], WireProviderLimit::Flag(true));
        assert_eq!(ti["shodan"], WireProviderLimit::Count(5));
        assert_eq!(
            ti["virustotal"],
            WireProviderLimit::Object {
                enabled: true,
                limit: Some(WireLimit::Count(-1)),
            }
        );
        assert_eq!(
            ti["greynoise"],
            WireProviderLimit::Object {
                enabled: false,
                limit: None,
            }
        );
    }

    #[test]
    fn test_missing_threat_intelligence_defaults_to_empty() {
        let json = r#"{
            "planId": "free", "price": 0, "period": "monthly",
            "limits": { "scans": 1, "documentation": 0, "repositories": 1, "chatMessages": 5 }
        }"#;
        let plan: PlanDefinition = serde_json::from_str(json).unwrap();
        assert!(plan.limits.threat_intelligence.is_empty());
    }

    #[test]
    fn test_patch_distinguishes_removed_provider() {
        let json = r#"{ "limits": { "threatIntelligence": { "shodan": null, "otx": true } } }"#;
        let patch: PlanPatchRequest = serde_json::from_str(json).unwrap();
        let ti = patch.limits.unwrap().threat_intelligence.unwrap();
        assert_eq!(ti["shodan"], None);
        assert_eq!(ti["otx"], Some(WireProviderLimit::Flag(true)));
        assert!(patch.price.is_none());
    }
}
