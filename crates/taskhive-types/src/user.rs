use crate::amount::{Credits, UsdAmount};
use crate::task::{TaskId, TaskInstance};
use crate::tier::Tier;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;

/// Bound on per-user ledger history; oldest entries are evicted past this.
pub const HISTORY_CAP: usize = 50;

pub const DEFAULT_DAILY_QUOTA: u32 = 5;
pub const SIGNUP_CREDITS: Credits = Credits::new(50);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Blocked,
}

/// Payout details required before a withdrawal is permitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutProfile {
    pub holder_name: String,
    pub bank_name: String,
    pub account_number: String,
}

impl PayoutProfile {
    /// A profile only unlocks withdrawal once the payment method is populated.
    pub fn is_complete(&self) -> bool {
        !self.bank_name.trim().is_empty() && !self.account_number.trim().is_empty()
    }
}

/// One balance-affecting event. Amount is signed cents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub description: String,
    pub amount_cents: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub status: AccountStatus,
    pub balance: UsdAmount,
    pub credits: Credits,
    /// Cumulative credits ever granted/purchased; drives the tier.
    pub credits_purchased: u64,
    pub tier: Tier,
    pub tasks_completed_today: u32,
    pub tasks_assigned_today: u32,
    pub daily_task_quota: u32,
    pub last_activity_date: NaiveDate,
    pub payout_profile: Option<PayoutProfile>,
    pub tasks: BTreeMap<TaskId, TaskInstance>,
    /// Most-recent-first, capped at [`HISTORY_CAP`].
    pub history: VecDeque<LedgerEntry>,
    /// Optimistic-concurrency token; bumped by the store on each write.
    pub version: u64,
}

impl UserRecord {
    /// Fresh registrant with the standard signup grants.
    pub fn new_registrant(
        id: UserId,
        name: impl Into<String>,
        email: impl Into<String>,
        today: NaiveDate,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            email: email.into(),
            role: Role::User,
            status: AccountStatus::Active,
            balance: UsdAmount::ZERO,
            credits: SIGNUP_CREDITS,
            credits_purchased: 0,
            tier: Tier::Basic,
            tasks_completed_today: 0,
            tasks_assigned_today: 0,
            daily_task_quota: DEFAULT_DAILY_QUOTA,
            last_activity_date: today,
            payout_profile: None,
            tasks: BTreeMap::new(),
            history: VecDeque::new(),
            version: 0,
        }
    }

    pub fn new_admin(
        id: UserId,
        name: impl Into<String>,
        email: impl Into<String>,
        today: NaiveDate,
    ) -> Self {
        let mut record = Self::new_registrant(id, name, email, today);
        record.role = Role::Admin;
        record.credits = Credits::ZERO;
        record
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Append a ledger entry at the front and evict past the cap.
    pub fn record_history(
        &mut self,
        description: impl Into<String>,
        amount_cents: i64,
        timestamp: DateTime<Utc>,
    ) {
        self.history.push_front(LedgerEntry {
            description: description.into(),
            amount_cents,
            timestamp,
        });
        self.history.truncate(HISTORY_CAP);
    }

    /// Keep `tier` consistent with `credits_purchased`. Called after every
    /// mutation of the cumulative counter.
    pub fn recompute_tier(&mut self) {
        self.tier = Tier::for_credits_purchased(self.credits_purchased);
    }

    pub fn can_withdraw(&self) -> bool {
        self.payout_profile
            .as_ref()
            .map(PayoutProfile::is_complete)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record() -> UserRecord {
        UserRecord::new_registrant(
            UserId::from_string("u-1"),
            "JaneDoe",
            "jane@example.com",
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        )
    }

    #[test]
    fn test_registrant_defaults() {
        let r = record();
        assert_eq!(r.role, Role::User);
        assert_eq!(r.status, AccountStatus::Active);
        assert_eq!(r.balance, UsdAmount::ZERO);
        assert_eq!(r.credits, Credits::new(50));
        assert_eq!(r.daily_task_quota, DEFAULT_DAILY_QUOTA);
        assert_eq!(r.tier, Tier::Basic);
        assert!(r.tasks.is_empty());
        assert!(r.history.is_empty());
        assert!(!r.can_withdraw());
    }

    #[test]
    fn test_history_cap_evicts_oldest() {
        let mut r = record();
        for i in 0..60 {
            let ts = Utc.timestamp_opt(1_700_000_000 + i, 0).unwrap();
            r.record_history(format!("entry {}", i), i, ts);
        }
        assert_eq!(r.history.len(), HISTORY_CAP);
        // Most-recent-first: entry 59 at the front, entry 10 at the tail
        assert_eq!(r.history.front().unwrap().description, "entry 59");
        assert_eq!(r.history.back().unwrap().description, "entry 10");
    }

    #[test]
    fn test_tier_follows_purchases() {
        let mut r = record();
        r.credits_purchased = 500;
        r.recompute_tier();
        assert_eq!(r.tier, Tier::Platinum);

        // Recompute always wins over whatever was stored
        r.tier = Tier::Diamond;
        r.recompute_tier();
        assert_eq!(r.tier, Tier::Platinum);
    }

    #[test]
    fn test_incomplete_payout_profile() {
        let mut r = record();
        r.payout_profile = Some(PayoutProfile {
            holder_name: "Jane Doe".to_string(),
            bank_name: "First National".to_string(),
            account_number: "  ".to_string(),
        });
        assert!(!r.can_withdraw());

        r.payout_profile.as_mut().unwrap().account_number = "12345678".to_string();
        assert!(r.can_withdraw());
    }
}
