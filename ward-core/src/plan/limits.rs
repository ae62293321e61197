//! Normalized plan limits
//!
//! Wire rows are converted here exactly once; everything downstream works on
//! the closed [`Limit`] / [`ProviderLimit`] variants.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::plan::{BillingPeriod, PlanDefinition, WireLimit, WirePlanLimits, WireProviderLimit};

use super::PlanTier;
use crate::error::EngineError;
use crate::resource::Resource;

/// Scalar resource limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Limit {
    Unlimited,
    Limited(u64),
}

impl Limit {
    /// Cap to enforce, `None` when unlimited
    pub fn cap(&self) -> Option<u64> {
        match self {
            Self::Unlimited => None,
            Self::Limited(n) => Some(*n),
        }
    }
}

/// Threat-intelligence provider limit (daily)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderLimit {
    Disabled,
    Unlimited,
    Limited(u64),
}

/// What a plan grants for one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allowance {
    /// Hard gate: never reaches the ledger
    Disabled,
    Metered(Limit),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlanLimits {
    pub scans: Limit,
    pub documentation: Limit,
    pub repositories: Limit,
    pub chat_messages: Limit,
    /// Keyed by lowercase provider name; an absent provider is disabled
    #[serde(default)]
    pub threat_intelligence: BTreeMap<String, ProviderLimit>,
}

impl Default for Limit {
    fn default() -> Self {
        Self::Limited(0)
    }
}

impl PlanLimits {
    pub fn allowance(&self, resource: &Resource) -> Allowance {
        match resource {
            Resource::Scans => Allowance::Metered(self.scans),
            Resource::Documentation => Allowance::Metered(self.documentation),
            Resource::Repositories => Allowance::Metered(self.repositories),
            Resource::ChatMessages => Allowance::Metered(self.chat_messages),
            Resource::ThreatIntel(provider) => match self.threat_intelligence.get(provider) {
                None | Some(ProviderLimit::Disabled) => Allowance::Disabled,
                Some(ProviderLimit::Unlimited) => Allowance::Metered(Limit::Unlimited),
                Some(ProviderLimit::Limited(n)) => Allowance::Metered(Limit::Limited(*n)),
            },
        }
    }

    pub fn from_wire(wire: &WirePlanLimits) -> Result<Self, EngineError> {
        let mut threat_intelligence = BTreeMap::new();
        for (raw, entry) in &wire.threat_intelligence {
            let name = provider_name(raw)?;
            let limit = normalize_provider(&name, entry)?;
            if threat_intelligence.insert(name, limit).is_some() {
                return Err(duplicate_provider(raw));
            }
        }

        Ok(Self {
            scans: normalize_limit("scans", &wire.scans)?,
            documentation: normalize_limit("documentation", &wire.documentation)?,
            repositories: normalize_limit("repositories", &wire.repositories)?,
            chat_messages: normalize_limit("chatMessages", &wire.chat_messages)?,
            threat_intelligence,
        })
    }

    /// Canonical wire form; providers are always written as objects
    pub fn to_wire(&self) -> WirePlanLimits {
        WirePlanLimits {
            scans: limit_to_wire(self.scans),
            documentation: limit_to_wire(self.documentation),
            repositories: limit_to_wire(self.repositories),
            chat_messages: limit_to_wire(self.chat_messages),
            threat_intelligence: self
                .threat_intelligence
                .iter()
                .map(|(name, limit)| (name.clone(), provider_to_wire(*limit)))
                .collect(),
        }
    }
}

/// A fully normalized plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub tier: PlanTier,
    pub price: Decimal,
    pub period: BillingPeriod,
    pub limits: PlanLimits,
}

impl Plan {
    pub fn from_definition(def: &PlanDefinition) -> Result<Self, EngineError> {
        let tier = def.plan_id.parse::<PlanTier>().map_err(|_| {
            EngineError::InvalidPlanDefinition(format!("unknown plan id '{}'", def.plan_id))
        })?;
        if def.price.is_sign_negative() {
            return Err(EngineError::InvalidPlanDefinition(
                "price must not be negative".into(),
            ));
        }
        Ok(Self {
            tier,
            price: def.price,
            period: def.period,
            limits: PlanLimits::from_wire(&def.limits)?,
        })
    }

    pub fn to_definition(&self) -> PlanDefinition {
        PlanDefinition {
            plan_id: self.tier.as_str().to_string(),
            price: self.price,
            period: self.period,
            limits: self.limits.to_wire(),
        }
    }
}

pub(crate) fn provider_name(raw: &str) -> Result<String, EngineError> {
    let name = raw.trim().to_ascii_lowercase();
    if name.is_empty() {
        return Err(EngineError::InvalidPlanDefinition(
            "empty threat-intelligence provider name".into(),
        ));
    }
    Ok(name)
}

/// Provider names are case-insensitive; two spellings of one name are ambiguous
pub(crate) fn duplicate_provider(raw: &str) -> EngineError {
    EngineError::InvalidPlanDefinition(format!(
        "threat-intelligence provider {raw:?} is listed more than once"
    ))
}

pub(crate) fn normalize_limit(field: &str, wire: &WireLimit) -> Result<Limit, EngineError> {
    match wire {
        WireLimit::Count(-1) => Ok(Limit::Unlimited),
        WireLimit::Count(n) if *n >= 0 => Ok(Limit::Limited(*n as u64)),
        WireLimit::Count(n) => Err(EngineError::InvalidPlanDefinition(format!(
            "{field}: negative limit {n}"
        ))),
        WireLimit::Keyword(k) if k.trim().eq_ignore_ascii_case("unlimited") => Ok(Limit::Unlimited),
        WireLimit::Keyword(k) => Err(EngineError::InvalidPlanDefinition(format!(
            "{field}: unrecognized limit '{k}'"
        ))),
    }
}

pub(crate) fn normalize_provider(
    name: &str,
    wire: &WireProviderLimit,
) -> Result<ProviderLimit, EngineError> {
    let field = format!("threatIntelligence.{name}");
    let limit = match wire {
        WireProviderLimit::Flag(false) => return Ok(ProviderLimit::Disabled),
        WireProviderLimit::Flag(true) => Limit::Unlimited,
        WireProviderLimit::Count(n) => normalize_limit(&field, &WireLimit::Count(*n))?,
        WireProviderLimit::Object { enabled: false, .. } => return Ok(ProviderLimit::Disabled),
        WireProviderLimit::Object {
            enabled: true,
            limit: None,
        } => Limit::Unlimited,
        WireProviderLimit::Object {
            enabled: true,
            limit: Some(limit),
        } => normalize_limit(&field, limit)?,
    };
    Ok(match limit {
        Limit::Unlimited => ProviderLimit::Unlimited,
        Limit::Limited(n) => ProviderLimit::Limited(n),
    })
}

fn limit_to_wire(limit: Limit) -> WireLimit {
    match limit {
        Limit::Unlimited => WireLimit::unlimited(),
        Limit::Limited(n) => WireLimit::Count(n.min(i64::MAX as u64) as i64),
    }
}

fn provider_to_wire(limit: ProviderLimit) -> WireProviderLimit {
    match limit {
        ProviderLimit::Disabled => WireProviderLimit::Object {
            enabled: false,
            limit: None,
        },
        ProviderLimit::Unlimited => WireProviderLimit::Object {
            enabled: true,
            limit: Some(WireLimit::unlimited()),
        },
        ProviderLimit::Limited(n) => WireProviderLimit::Object {
            enabled: true,
            limit: Some(limit_to_wire(Limit::Limited(n))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(json: &str) -> PlanDefinition {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_sentinels_are_equivalent() {
        assert_eq!(
            normalize_limit("scans", &WireLimit::Count(-1)).unwrap(),
            Limit::Unlimited
        );
        assert_eq!(
            normalize_limit("scans", &WireLimit::Keyword("Unlimited".into())).unwrap(),
            Limit::Unlimited
        );
        assert_eq!(
            normalize_limit("scans", &WireLimit::Count(0)).unwrap(),
            Limit::Limited(0)
        );
        assert!(normalize_limit("scans", &WireLimit::Count(-2)).is_err());
        assert!(normalize_limit("scans", &WireLimit::Keyword("lots".into())).is_err());
    }

    #[test]
    fn test_normalizes_legacy_provider_shapes() {
        let plan = Plan::from_definition(&definition(
            r#"{
                "planId": "pro", "price": 29, "period": "monthly",
                "limits": {
                    "scans": 100, "documentation": -1, "repositories": 10, "chatMessages": "unlimited",
                    "threatIntelligence": {
                        "AbuseIPDB": true,
                        "otx": false,
                        "shodan": 5,
                        "virustotal": { "enabled": true, "limit": -1 },
                        "greynoise": { "enabled": true, "limit": 20 },
                        "censys": { "enabled": false, "limit": 50 },
                        "urlscan": { "enabled": true }
                    }
                }
            }"#,
        ))
        .unwrap();

        let ti = &plan.limits.threat_intelligence;
        assert_eq!(ti["abuseipdb"], ProviderLimit::Unlimited);
        assert_eq!(ti["otx"], ProviderLimit::Disabled);
        assert_eq!(ti["shodan"], ProviderLimit::Limited(5));
        assert_eq!(ti["virustotal"], ProviderLimit::Unlimited);
        assert_eq!(ti["greynoise"], ProviderLimit::Limited(20));
        assert_eq!(ti["censys"], ProviderLimit::Disabled);
        assert_eq!(ti["urlscan"], ProviderLimit::Unlimited);
        assert_eq!(plan.limits.documentation, Limit::Unlimited);
        assert_eq!(plan.limits.chat_messages, Limit::Unlimited);
    }

    #[test]
    fn test_provider_spelled_twice_is_rejected() {
        let err = Plan::from_definition(&definition(
            r#"{
                "planId": "pro", "price": 29, "period": "monthly",
                "limits": {
                    "scans": 100, "documentation": 5, "repositories": 10, "chatMessages": 50,
                    "threatIntelligence": { "Shodan": 5, "shodan": false }
                }
            }"#,
        ))
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidPlanDefinition(ref msg) if msg.contains("more than once")));
    }

    #[test]
    fn test_absent_provider_is_disabled() {
        let limits = PlanLimits {
            scans: Limit::Limited(10),
            ..Default::default()
        };
        assert_eq!(
            limits.allowance(&Resource::threat_intel("shodan")),
            Allowance::Disabled
        );
        assert_eq!(
            limits.allowance(&Resource::Scans),
            Allowance::Metered(Limit::Limited(10))
        );
    }

    #[test]
    fn test_rejects_unknown_plan_id() {
        let err = Plan::from_definition(&definition(
            r#"{ "planId": "gold", "price": 1, "period": "yearly",
                 "limits": { "scans": 1, "documentation": 1, "repositories": 1, "chatMessages": 1 } }"#,
        ))
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidPlanDefinition(_)));
    }

    #[test]
    fn test_wire_form_normalizes_to_same_plan() {
        let plan = Plan::from_definition(&definition(
            r#"{ "planId": "standard", "price": 9.99, "period": "monthly",
                 "limits": { "scans": 10, "documentation": 5, "repositories": "unlimited", "chatMessages": 100,
                             "threatIntelligence": { "shodan": true, "otx": 3 } } }"#,
        ))
        .unwrap();
        let again = Plan::from_definition(&plan.to_definition()).unwrap();
        assert_eq!(plan, again);
    }
}
