//! Subject accounts: plan assignment, contact details, security stamp

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::BoxError;
use crate::plan::PlanTier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    pub plan: PlanTier,
    /// Subscription start; aligns monthly/yearly quota windows
    pub plan_anchor: DateTime<Utc>,
    /// Bumped on password change and MFA toggle
    pub security_stamp: i64,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn load(&self, subject_id: &str) -> Result<Option<Account>, BoxError>;

    /// Switch plan if the stored plan is still `expected`
    async fn set_plan(
        &self,
        subject_id: &str,
        expected: PlanTier,
        plan: PlanTier,
        anchor: DateTime<Utc>,
    ) -> Result<bool, BoxError>;

    async fn set_phone(&self, subject_id: &str, phone: Option<&str>) -> Result<bool, BoxError>;

    async fn security_stamp(&self, subject_id: &str) -> Result<Option<i64>, BoxError>;

    /// Returns the new stamp, `None` if the subject does not exist
    async fn bump_security_stamp(&self, subject_id: &str) -> Result<Option<i64>, BoxError>;
}

/// In-memory account store
#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: DashMap<String, Account>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, account: Account) {
        self.accounts.insert(account.id.clone(), account);
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn load(&self, subject_id: &str) -> Result<Option<Account>, BoxError> {
        Ok(self.accounts.get(subject_id).map(|a| a.clone()))
    }

    async fn set_plan(
        &self,
        subject_id: &str,
        expected: PlanTier,
        plan: PlanTier,
        anchor: DateTime<Utc>,
    ) -> Result<bool, BoxError> {
        let Some(mut account) = self.accounts.get_mut(subject_id) else {
            return Ok(false);
        };
        if account.plan != expected {
            return Ok(false);
        }
        account.plan = plan;
        account.plan_anchor = anchor;
        Ok(true)
    }

    async fn set_phone(&self, subject_id: &str, phone: Option<&str>) -> Result<bool, BoxError> {
        let Some(mut account) = self.accounts.get_mut(subject_id) else {
            return Ok(false);
        };
        account.phone = phone.map(str::to_string);
        Ok(true)
    }

    async fn security_stamp(&self, subject_id: &str) -> Result<Option<i64>, BoxError> {
        Ok(self.accounts.get(subject_id).map(|a| a.security_stamp))
    }

    async fn bump_security_stamp(&self, subject_id: &str) -> Result<Option<i64>, BoxError> {
        Ok(self.accounts.get_mut(subject_id).map(|mut a| {
            a.security_stamp += 1;
            a.security_stamp
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn account() -> Account {
        Account {
            id: "u1".into(),
            email: "ana@example.com".into(),
            phone: None,
            role: Role::User,
            plan: PlanTier::Free,
            plan_anchor: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            security_stamp: 1,
        }
    }

    #[tokio::test]
    async fn test_set_plan_is_conditional() {
        let store = MemoryAccountStore::new();
        store.insert(account());
        let anchor = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();

        assert!(store.set_plan("u1", PlanTier::Free, PlanTier::Pro, anchor).await.unwrap());
        assert!(!store.set_plan("u1", PlanTier::Free, PlanTier::Standard, anchor).await.unwrap());
        let stored = store.load("u1").await.unwrap().unwrap();
        assert_eq!(stored.plan, PlanTier::Pro);
        assert_eq!(stored.plan_anchor, anchor);
    }

    #[tokio::test]
    async fn test_bump_stamp() {
        let store = MemoryAccountStore::new();
        store.insert(account());
        assert_eq!(store.bump_security_stamp("u1").await.unwrap(), Some(2));
        assert_eq!(store.security_stamp("u1").await.unwrap(), Some(2));
        assert_eq!(store.bump_security_stamp("nobody").await.unwrap(), None);
    }
}
