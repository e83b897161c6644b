use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
#[cfg(feature = "ts")]
use ts_rs::TS;

use super::CachedEntity;
use crate::store::{Partition, StorageSlot};

/// Fixed key of the single membership slot.
pub const MEMBERSHIP_KEY: &str = "current";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    Active,
    Pending,
    Expired,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for MembershipStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MembershipStatus::Active => write!(f, "Active"),
            MembershipStatus::Pending => write!(f, "Pending"),
            MembershipStatus::Expired => write!(f, "Expired"),
            MembershipStatus::Cancelled => write!(f, "Cancelled"),
            MembershipStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// The most recent membership of the current user. Stored in a single slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct MembershipSnapshot {
    pub id: String,
    pub plan_type: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: MembershipStatus,
    #[serde(default)]
    pub payment_method: Option<String>,
}

impl MembershipSnapshot {
    pub fn is_active(&self, today: NaiveDate) -> bool {
        self.status == MembershipStatus::Active && today >= self.start_date && today <= self.end_date
    }

    /// Days left until `end_date`, zero once it has passed.
    pub fn days_remaining(&self, today: NaiveDate) -> i64 {
        (self.end_date - today).num_days().max(0)
    }
}

impl CachedEntity for MembershipSnapshot {
    const PARTITION: Partition = Partition::Membership;
    const SLOT: StorageSlot = StorageSlot::Singleton(MEMBERSHIP_KEY);
    const LABEL: &'static str = "membership";

    fn cache_key(&self) -> String {
        MEMBERSHIP_KEY.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn snapshot(status: MembershipStatus) -> MembershipSnapshot {
        MembershipSnapshot {
            id: "m1".to_string(),
            plan_type: "monthly".to_string(),
            start_date: date("2026-10-01"),
            end_date: date("2026-10-31"),
            status,
            payment_method: Some("card".to_string()),
        }
    }

    #[test]
    fn test_active_window() {
        let active = snapshot(MembershipStatus::Active);
        assert!(active.is_active(date("2026-10-19")));
        assert!(!active.is_active(date("2026-11-01")));
        assert!(!snapshot(MembershipStatus::Cancelled).is_active(date("2026-10-19")));
    }

    #[test]
    fn test_days_remaining_never_negative() {
        let m = snapshot(MembershipStatus::Active);
        assert_eq!(m.days_remaining(date("2026-10-19")), 12);
        assert_eq!(m.days_remaining(date("2026-12-01")), 0);
    }

    #[test]
    fn test_unknown_status_decodes() {
        let json = r#"{"id":"m1","plan_type":"annual","start_date":"2026-01-01",
            "end_date":"2026-12-31","status":"frozen"}"#;
        let m: MembershipSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(m.status, MembershipStatus::Unknown);
        assert!(m.payment_method.is_none());
    }
}
