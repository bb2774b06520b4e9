//! Role snapshot fixtures
//!
//! Timestamps are expressed as "days ago" relative to a fixed `now` so tests
//! read like the scenarios they check.

use crate::aws::TEST_ACCOUNT_ID;
use chrono::{DateTime, Duration, Utc};
use rolesweep_common::finding::{AccountId, LastUsed, RoleRecord};
use std::collections::BTreeMap;

/// Builder for [`RoleRecord`] test values
#[derive(Debug, Clone)]
pub struct RoleRecordBuilder {
    name: String,
    path: String,
    account_id: String,
    now: DateTime<Utc>,
    age_days: i64,
    last_used: Option<(i64, Option<String>)>,
    tags: BTreeMap<String, String>,
}

impl RoleRecordBuilder {
    /// A 90-day-old role at `/` that was never used
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: "/".to_string(),
            account_id: TEST_ACCOUNT_ID.to_string(),
            now: Utc::now(),
            age_days: 90,
            last_used: None,
            tags: BTreeMap::new(),
        }
    }

    /// Anchor the relative timestamps to `now`
    pub fn now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn path(mut self, path: &str) -> Self {
        self.path = path.to_string();
        self
    }

    pub fn account(mut self, account_id: &str) -> Self {
        self.account_id = account_id.to_string();
        self
    }

    pub fn age_days(mut self, days: i64) -> Self {
        self.age_days = days;
        self
    }

    pub fn last_used_days_ago(mut self, days: i64, region: &str) -> Self {
        self.last_used = Some((days, Some(region.to_string())));
        self
    }

    pub fn never_used(mut self) -> Self {
        self.last_used = None;
        self
    }

    pub fn tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> RoleRecord {
        let account_id =
            AccountId::parse(self.account_id.clone()).expect("test account id must be 12 digits");
        RoleRecord {
            arn: format!(
                "arn:aws:iam::{}:role{}{}",
                self.account_id, self.path, self.name
            ),
            name: self.name,
            path: self.path,
            account_id,
            created_at: self.now - Duration::days(self.age_days),
            last_used: self.last_used.map(|(days, region)| LastUsed {
                at: self.now - Duration::days(days),
                region,
            }),
            tags: self.tags,
        }
    }
}
