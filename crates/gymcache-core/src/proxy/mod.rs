//! Network-interception proxy.
//!
//! The proxy is an independent worker task sitting between the host and
//! the network. The host never touches proxy state directly; it talks to
//! workers through `ProxyRegistration` and `WorkerHandle`, which only send
//! messages (`mpsc` in, `oneshot` replies, `watch` for lifecycle state).
//!
//! Lifecycle: `Installing → Waiting → Activating → Activated`. Install
//! pre-caches the shell routes; a new version waits behind an active one
//! until it receives `SKIP_WAITING`; activation deletes the caches of every
//! other build.

pub mod cache_storage;
pub mod error;
pub mod network;
pub mod policy;
pub mod registration;
pub mod request;
pub mod version;
pub mod worker;

pub use cache_storage::CacheStorage;
pub use error::ProxyError;
pub use network::{HttpNetwork, Network, NetworkError};
pub use policy::{ProxyConfig, Strategy};
pub use registration::ProxyRegistration;
pub use request::{Destination, ProxyRequest, ProxyResponse, ResponseKind, ResponseSource};
pub use version::CacheVersionTag;
pub use worker::{ControlCommand, ControlReply, ProxyState, WorkerHandle};
