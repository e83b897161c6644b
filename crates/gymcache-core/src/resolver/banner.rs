use chrono::{DateTime, Duration, Utc};

use crate::format::age_display;
use crate::models::SyncMetadata;

/// Default age after which cached data is flagged as stale.
pub const DEFAULT_STALE_AFTER_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerKind {
    Offline,
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    pub kind: BannerKind,
    pub text: String,
    /// Set when the cached data is older than the staleness threshold.
    pub stale: bool,
}

/// Builds the persistent status banner shown above member views.
#[derive(Debug, Clone, Copy)]
pub struct StatusBanner {
    stale_after: Duration,
}

impl Default for StatusBanner {
    fn default() -> Self {
        Self::new(Duration::hours(DEFAULT_STALE_AFTER_HOURS))
    }
}

impl StatusBanner {
    pub fn new(stale_after: Duration) -> Self {
        Self { stale_after }
    }

    pub fn is_stale(&self, metadata: Option<&SyncMetadata>, now: DateTime<Utc>) -> bool {
        match metadata.and_then(|m| m.last_sync) {
            Some(at) => now - at > self.stale_after,
            None => true,
        }
    }

    /// `None` when online with fresh data.
    pub fn compose(
        &self,
        online: bool,
        metadata: Option<&SyncMetadata>,
        now: DateTime<Utc>,
    ) -> Option<Banner> {
        let last_sync = metadata.and_then(|m| m.last_sync);
        let stale = self.is_stale(metadata, now);

        if !online {
            let text = match last_sync {
                Some(at) if stale => format!(
                    "You're offline. Showing data from {}, it may be out of date.",
                    age_display(at, now)
                ),
                Some(at) => format!("You're offline. Showing data from {}.", age_display(at, now)),
                None => "You're offline. Nothing has been downloaded yet.".to_string(),
            };
            return Some(Banner {
                kind: BannerKind::Offline,
                text,
                stale,
            });
        }

        match last_sync {
            Some(at) if stale => Some(Banner {
                kind: BannerKind::Stale,
                text: format!("Cached data was last refreshed {}.", age_display(at, now)),
                stale,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_banner_includes_last_sync_age() {
        let now = Utc::now();
        let meta = SyncMetadata::synced_at(now - Duration::minutes(5));
        let banner = StatusBanner::default().compose(false, Some(&meta), now).unwrap();
        assert_eq!(banner.kind, BannerKind::Offline);
        assert_eq!(banner.text, "You're offline. Showing data from 5m ago.");
        assert!(!banner.stale);
    }

    #[test]
    fn test_offline_without_sync() {
        let banner = StatusBanner::default().compose(false, None, Utc::now()).unwrap();
        assert!(banner.text.contains("Nothing has been downloaded"));
        assert!(banner.stale);
    }

    #[test]
    fn test_online_banner_only_when_stale() {
        let now = Utc::now();
        let banner = StatusBanner::new(Duration::hours(1));

        let fresh = SyncMetadata::synced_at(now - Duration::minutes(10));
        assert!(banner.compose(true, Some(&fresh), now).is_none());

        let old = SyncMetadata::synced_at(now - Duration::hours(3));
        let shown = banner.compose(true, Some(&old), now).unwrap();
        assert_eq!(shown.kind, BannerKind::Stale);
        assert_eq!(shown.text, "Cached data was last refreshed 3h ago.");
    }
}
