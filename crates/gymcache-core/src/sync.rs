//! Sync orchestrator: pulls a full snapshot from the backend into the store.
//!
//! The three backend reads run concurrently and are independent. Whatever
//! succeeds is written; a failure is logged and leaves the previous cache
//! for that partition untouched. The sync timestamp is stamped only after
//! the routines were written.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::BackendSource;
use crate::connectivity::ConnectivitySignal;
use crate::models::membership::MEMBERSHIP_KEY;
use crate::models::{CachedEntity, CachedExercise, CachedRoutine, MembershipSnapshot, UserId};
use crate::store::{Partition, PersistentStore, StorageSlot};

/// What happened to one partition during a sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionSync {
    Written(usize),
    FetchFailed(String),
    WriteFailed(String),
}

impl PartitionSync {
    pub fn is_written(&self) -> bool {
        matches!(self, PartitionSync::Written(_))
    }

    fn error(&self) -> Option<&str> {
        match self {
            PartitionSync::Written(_) => None,
            PartitionSync::FetchFailed(e) | PartitionSync::WriteFailed(e) => Some(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub routines: PartitionSync,
    pub exercises: PartitionSync,
    pub membership: PartitionSync,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Synced {
        timestamp: DateTime<Utc>,
        report: SyncReport,
    },
    Failed {
        error: String,
        report: SyncReport,
    },
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Synced { .. })
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            SyncOutcome::Synced { timestamp, .. } => Some(*timestamp),
            SyncOutcome::Failed { .. } => None,
        }
    }

    pub fn report(&self) -> &SyncReport {
        match self {
            SyncOutcome::Synced { report, .. } | SyncOutcome::Failed { report, .. } => report,
        }
    }
}

/// The sync a view starts when it mounts.
#[derive(Debug)]
pub enum MountSync {
    /// Ran before the view resolved, or `None` when the session guard
    /// skipped it.
    Finished(Option<SyncOutcome>),
    /// Offline at mount. The task syncs once connectivity returns.
    Pending(JoinHandle<Option<SyncOutcome>>),
}

pub struct SyncOrchestrator {
    source: Arc<dyn BackendSource>,
    store: Arc<PersistentStore>,
    // Session scoped, never persisted
    synced_this_session: AtomicBool,
}

impl SyncOrchestrator {
    pub fn new(source: Arc<dyn BackendSource>, store: Arc<PersistentStore>) -> Self {
        Self {
            source,
            store,
            synced_this_session: AtomicBool::new(false),
        }
    }

    pub fn has_synced(&self) -> bool {
        self.synced_this_session.load(Ordering::SeqCst)
    }

    /// Pull routines, exercises and the latest membership, write what arrived.
    pub async fn sync_all(&self, user_id: &UserId) -> SyncOutcome {
        info!(user = %user_id, "Sync started");

        let (routines, exercises, membership) = tokio::join!(
            self.source.fetch_routines(),
            self.source.fetch_exercises(),
            self.source.fetch_latest_membership(user_id),
        );

        let routines = match routines {
            Ok(items) => self.write_keyed::<CachedRoutine>(&items).await,
            Err(e) => {
                warn!(error = %e, offline = e.is_offline(), "Routines fetch failed");
                PartitionSync::FetchFailed(e.to_string())
            }
        };

        let exercises = match exercises {
            Ok(items) => self.write_keyed::<CachedExercise>(&items).await,
            Err(e) => {
                warn!(error = %e, offline = e.is_offline(), "Exercises fetch failed");
                PartitionSync::FetchFailed(e.to_string())
            }
        };

        let membership = match membership {
            Ok(snapshot) => self.write_membership(snapshot).await,
            Err(e) => {
                warn!(error = %e, offline = e.is_offline(), "Membership fetch failed");
                PartitionSync::FetchFailed(e.to_string())
            }
        };

        let report = SyncReport {
            routines,
            exercises,
            membership,
        };

        if let Some(error) = report.routines.error() {
            return SyncOutcome::Failed {
                error: error.to_string(),
                report,
            };
        }

        let timestamp = Utc::now();
        match self.store.record_sync(timestamp).await {
            Ok(()) => {
                info!(%timestamp, "Sync complete");
                SyncOutcome::Synced { timestamp, report }
            }
            Err(e) => {
                warn!(error = %e, "Failed to stamp sync metadata");
                SyncOutcome::Failed {
                    error: e.to_string(),
                    report,
                }
            }
        }
    }

    /// Run `sync_all` once per session, only while online.
    ///
    /// Returns `None` when the sync was skipped. A failed attempt releases
    /// the guard so a later call may retry.
    pub async fn sync_on_load(&self, user_id: &UserId, online: bool) -> Option<SyncOutcome> {
        if !online {
            debug!("Offline, skipping sync");
            return None;
        }
        if self
            .synced_this_session
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Already synced this session");
            return None;
        }

        let outcome = self.sync_all(user_id).await;
        if !outcome.is_success() {
            self.synced_this_session.store(false, Ordering::SeqCst);
        }
        Some(outcome)
    }

    /// Wait until the connectivity signal reports online, then run the
    /// guarded sync. Returns `None` if the signal is dropped first.
    pub async fn sync_when_online(
        &self,
        user_id: &UserId,
        mut connectivity: watch::Receiver<bool>,
    ) -> Option<SyncOutcome> {
        loop {
            if *connectivity.borrow_and_update() {
                return self.sync_on_load(user_id, true).await;
            }
            if connectivity.changed().await.is_err() {
                return None;
            }
        }
    }

    /// Page-mount entry point. Online, the guarded sync runs before this
    /// returns so the view resolves against fresh data. Offline, it is
    /// deferred to the next reconnect.
    pub async fn on_mount(self: &Arc<Self>, user_id: UserId, connectivity: &ConnectivitySignal) -> MountSync {
        if connectivity.is_online() {
            return MountSync::Finished(self.sync_on_load(&user_id, true).await);
        }
        debug!("Offline at mount, sync deferred until reconnect");
        let sync = Arc::clone(self);
        let updates = connectivity.subscribe();
        MountSync::Pending(tokio::spawn(async move {
            sync.sync_when_online(&user_id, updates).await
        }))
    }

    async fn write_keyed<T: CachedEntity>(&self, items: &[T]) -> PartitionSync {
        debug_assert_eq!(T::SLOT, StorageSlot::Keyed);
        match self.store.replace_all(T::PARTITION, items).await {
            Ok(()) => PartitionSync::Written(items.len()),
            Err(e) => {
                warn!(partition = %T::PARTITION, error = %e, "Failed to write synced data");
                PartitionSync::WriteFailed(e.to_string())
            }
        }
    }

    async fn write_membership(&self, snapshot: Option<MembershipSnapshot>) -> PartitionSync {
        let result = match snapshot {
            Some(ref snapshot) => self.store.persist(std::slice::from_ref(snapshot)).await,
            None => self.store.remove_singleton(Partition::Membership, MEMBERSHIP_KEY).await,
        };
        match result {
            Ok(()) => PartitionSync::Written(usize::from(snapshot.is_some())),
            Err(e) => {
                warn!(error = %e, "Failed to write membership");
                PartitionSync::WriteFailed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::models::MembershipStatus;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::atomic::AtomicUsize;

    struct FakeBackend {
        routines_fail: bool,
        exercises_fail: bool,
        calls: AtomicUsize,
    }

    impl FakeBackend {
        fn new() -> Self {
            Self {
                routines_fail: false,
                exercises_fail: false,
                calls: AtomicUsize::new(0),
            }
        }
    }

    fn routine(id: &str) -> CachedRoutine {
        CachedRoutine {
            id: id.to_string(),
            name: format!("Routine {}", id),
            description: None,
            category: "strength".to_string(),
            days: vec![],
        }
    }

    #[async_trait]
    impl BackendSource for FakeBackend {
        async fn fetch_routines(&self) -> Result<Vec<CachedRoutine>, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.routines_fail {
                return Err(ApiError::ServerError("boom".to_string()));
            }
            Ok(vec![routine("r1"), routine("r2")])
        }

        async fn fetch_exercises(&self) -> Result<Vec<CachedExercise>, ApiError> {
            if self.exercises_fail {
                return Err(ApiError::Unauthorized);
            }
            Ok(vec![CachedExercise {
                id: "e1".to_string(),
                name: "Deadlift".to_string(),
                muscle_group: "back".to_string(),
                description: None,
                instructions: None,
                images: vec![],
            }])
        }

        async fn fetch_latest_membership(
            &self,
            _user_id: &UserId,
        ) -> Result<Option<MembershipSnapshot>, ApiError> {
            Ok(Some(MembershipSnapshot {
                id: "m1".to_string(),
                plan_type: "annual".to_string(),
                start_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2026, 12, 31).unwrap(),
                status: MembershipStatus::Active,
                payment_method: None,
            }))
        }
    }

    fn orchestrator(backend: FakeBackend) -> (SyncOrchestrator, Arc<PersistentStore>) {
        let store = Arc::new(PersistentStore::in_memory());
        (SyncOrchestrator::new(Arc::new(backend), store.clone()), store)
    }

    #[tokio::test]
    async fn test_sync_all_writes_every_partition() {
        let (sync, store) = orchestrator(FakeBackend::new());
        let outcome = sync.sync_all(&UserId::from("u1")).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.report().routines, PartitionSync::Written(2));
        assert_eq!(outcome.report().membership, PartitionSync::Written(1));
        assert_eq!(store.load::<CachedRoutine>().await.unwrap().len(), 2);
        let meta = store.sync_metadata().await.unwrap().unwrap();
        assert_eq!(meta.last_sync, outcome.timestamp());
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_other_partitions() {
        let mut backend = FakeBackend::new();
        backend.exercises_fail = true;
        let (sync, store) = orchestrator(backend);

        let outcome = sync.sync_all(&UserId::from("u1")).await;
        assert!(outcome.is_success());
        assert!(matches!(outcome.report().exercises, PartitionSync::FetchFailed(_)));
        assert!(store.load::<CachedExercise>().await.unwrap().is_empty());
        assert_eq!(store.load::<MembershipSnapshot>().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_routines_failure_does_not_stamp_metadata() {
        let mut backend = FakeBackend::new();
        backend.routines_fail = true;
        let (sync, store) = orchestrator(backend);

        let outcome = sync.sync_all(&UserId::from("u1")).await;
        assert!(!outcome.is_success());
        assert!(outcome.report().exercises.is_written());
        assert!(store.sync_metadata().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sync_on_load_runs_once_per_session() {
        let (sync, _store) = orchestrator(FakeBackend::new());
        let user = UserId::from("u1");

        assert!(sync.sync_on_load(&user, false).await.is_none());
        assert!(sync.sync_on_load(&user, true).await.unwrap().is_success());
        assert!(sync.sync_on_load(&user, true).await.is_none());
        assert!(sync.has_synced());
    }

    #[tokio::test]
    async fn test_failed_sync_releases_guard() {
        let mut backend = FakeBackend::new();
        backend.routines_fail = true;
        let (sync, _store) = orchestrator(backend);
        let user = UserId::from("u1");

        assert!(!sync.sync_on_load(&user, true).await.unwrap().is_success());
        assert!(!sync.has_synced());
        assert!(sync.sync_on_load(&user, true).await.is_some());
    }

    #[tokio::test]
    async fn test_sync_when_online_waits_for_connectivity() {
        let (sync, store) = orchestrator(FakeBackend::new());
        let sync = Arc::new(sync);
        let signal = ConnectivitySignal::new(false);

        let task = {
            let sync = sync.clone();
            let rx = signal.subscribe();
            tokio::spawn(async move { sync.sync_when_online(&UserId::from("u1"), rx).await })
        };

        tokio::task::yield_now().await;
        assert!(store.sync_metadata().await.unwrap().is_none());

        signal.went_online();
        let outcome = task.await.unwrap().unwrap();
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_mount_online_syncs_before_view() {
        let (sync, store) = orchestrator(FakeBackend::new());
        let sync = Arc::new(sync);
        let signal = ConnectivitySignal::new(true);

        match sync.on_mount(UserId::from("u1"), &signal).await {
            MountSync::Finished(Some(outcome)) => assert!(outcome.is_success()),
            other => panic!("expected a finished sync, got {:?}", other),
        }
        assert_eq!(store.load::<CachedRoutine>().await.unwrap().len(), 2);

        assert!(matches!(
            sync.on_mount(UserId::from("u1"), &signal).await,
            MountSync::Finished(None)
        ));
    }

    #[tokio::test]
    async fn test_mount_offline_defers_until_reconnect() {
        let (sync, store) = orchestrator(FakeBackend::new());
        let sync = Arc::new(sync);
        let signal = ConnectivitySignal::new(false);

        let MountSync::Pending(task) = sync.on_mount(UserId::from("u1"), &signal).await else {
            panic!("expected a deferred sync");
        };
        tokio::task::yield_now().await;
        assert!(store.load::<CachedRoutine>().await.unwrap().is_empty());

        signal.went_online();
        assert!(task.await.unwrap().unwrap().is_success());
        assert_eq!(store.load::<CachedRoutine>().await.unwrap().len(), 2);
    }
}
