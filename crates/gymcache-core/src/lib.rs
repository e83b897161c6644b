//! gymcache core - offline-resilient data layer for the gym member portal.
//!
//! - `store`: partitioned persistent store for routines, exercises,
//!   membership and sync metadata
//! - `sync`: pulls a full snapshot from the backend when online
//! - `connectivity`: reactive online/offline signal
//! - `resolver`: decides what a data-dependent view renders
//! - `proxy`: request-intercepting worker that keeps the app shell loadable
//! - `lifecycle`: purge, version promotion and install affordance

pub mod api;
pub mod config;
pub mod connectivity;
pub mod credentials;
pub mod format;
pub mod lifecycle;
pub mod models;
pub mod proxy;
pub mod resolver;
pub mod store;
pub mod sync;

pub use api::{ApiError, BackendSource, RestBackend};
pub use config::Config;
pub use connectivity::{ConnectivityEvent, ConnectivitySignal};
pub use credentials::CredentialStore;
pub use lifecycle::{ControlPlane, InstallAffordance, PageReload, UpdateOutcome};
pub use models::{CachedEntity, CachedExercise, CachedRoutine, MembershipSnapshot, SyncMetadata, UserId};
pub use proxy::{CacheVersionTag, ProxyConfig, ProxyRegistration, ProxyRequest, ProxyResponse};
pub use resolver::{ReadPathResolver, StatusBanner, ViewState};
pub use store::{PersistentStore, StoreError};
pub use sync::{MountSync, SyncOrchestrator, SyncOutcome, SyncReport};
