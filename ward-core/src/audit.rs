//! Audit events
//!
//! Recording is fire-and-forget: sinks must not block and never fail the
//! operation that produced the event.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::mfa::MfaMethod;
use crate::plan::PlanTier;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    MfaEnabled {
        subject_id: String,
        method: MfaMethod,
    },
    MfaDisabled {
        subject_id: String,
        previous: Option<MfaMethod>,
    },
    QuotaDenied {
        subject_id: String,
        resource: String,
        limit: u64,
        reset_at: DateTime<Utc>,
    },
    ProviderDisabled {
        subject_id: String,
        resource: String,
    },
    PlanChanged {
        subject_id: String,
        from: PlanTier,
        to: PlanTier,
        actor: String,
    },
}

impl AuditEvent {
    pub fn action(&self) -> &'static str {
        match self {
            Self::MfaEnabled { .. } => "mfa_enabled",
            Self::MfaDisabled { .. } => "mfa_disabled",
            Self::QuotaDenied { .. } => "quota_denied",
            Self::ProviderDisabled { .. } => "provider_disabled",
            Self::PlanChanged { .. } => "plan_changed",
        }
    }

    pub fn subject_id(&self) -> &str {
        match self {
            Self::MfaEnabled { subject_id, .. }
            | Self::MfaDisabled { subject_id, .. }
            | Self::QuotaDenied { subject_id, .. }
            | Self::ProviderDisabled { subject_id, .. }
            | Self::PlanChanged { subject_id, .. } => subject_id,
        }
    }

    /// Event payload without the tag, for the `detail` column
    pub fn detail(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let Some(map) = value.as_object_mut() {
            map.remove("event");
            map.remove("subject_id");
        }
        value
    }
}

pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Writes events to the `audit` tracing target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        tracing::info!(
            target: "audit",
            action = event.action(),
            subject = %event.subject_id(),
            detail = %event.detail(),
            "Audit event"
        );
    }
}

/// Keeps events in memory (tests, local runs)
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_strips_tag_and_subject() {
        let event = AuditEvent::PlanChanged {
            subject_id: "u1".into(),
            from: PlanTier::Free,
            to: PlanTier::Pro,
            actor: "payment_gateway".into(),
        };
        assert_eq!(event.action(), "plan_changed");
        assert_eq!(
            event.detail(),
            serde_json::json!({ "from": "free", "to": "pro", "actor": "payment_gateway" })
        );
    }
}
