//! Read-path policy for data-dependent views.
//!
//! Server-rendered data always wins when present and is written back into
//! the store in the background. Without it the view reads the store; an
//! empty or unavailable store yields an empty state whose message depends
//! on connectivity. The resolver never goes to the network itself.

pub mod banner;

use std::marker::PhantomData;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::models::CachedEntity;
use crate::store::{PersistentStore, StorageSlot};

pub use banner::{Banner, BannerKind, StatusBanner};

#[derive(Debug, Clone, PartialEq)]
pub enum ViewState<T> {
    Loading,
    Data(Vec<T>),
    Empty(EmptyState),
}

impl<T> ViewState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, ViewState::Loading)
    }

    pub fn data(&self) -> Option<&[T]> {
        match self {
            ViewState::Data(items) => Some(items),
            _ => None,
        }
    }
}

/// Message shown when a view has nothing to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmptyState {
    pub offline: bool,
    pub title: String,
    pub message: String,
}

impl EmptyState {
    pub fn for_label(label: &str, online: bool) -> Self {
        if online {
            Self {
                offline: false,
                title: format!("No {} yet", label),
                message: format!("Ask an administrator to create {}.", label),
            }
        } else {
            Self {
                offline: true,
                title: format!("No cached {}", label),
                message: format!("Reconnect to the internet to download {}.", label),
            }
        }
    }
}

/// Result of one resolution: the state to render plus the pending
/// write-back of server data, if one was started.
#[derive(Debug)]
pub struct Resolution<T> {
    pub state: ViewState<T>,
    pub write_back: Option<JoinHandle<()>>,
}

pub struct ReadPathResolver<T> {
    store: Arc<PersistentStore>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: CachedEntity> ReadPathResolver<T> {
    pub fn new(store: Arc<PersistentStore>) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }

    /// State to render before `resolve` completes.
    pub fn initial_state(&self) -> ViewState<T> {
        ViewState::Loading
    }

    pub async fn resolve(&self, initial_data: Option<Vec<T>>, online: bool) -> Resolution<T> {
        match initial_data {
            Some(items) => {
                let write_back = self.write_through(items.clone());
                let state = if items.is_empty() {
                    // The server says there is nothing, so reconnecting would not help
                    ViewState::Empty(EmptyState::for_label(T::LABEL, true))
                } else {
                    ViewState::Data(items)
                };
                Resolution { state, write_back }
            }
            None => {
                let cached = self.store.load_or_empty::<T>().await;
                debug!(partition = %T::PARTITION, count = cached.len(), online, "Resolved from cache");
                let state = if cached.is_empty() {
                    ViewState::Empty(EmptyState::for_label(T::LABEL, online))
                } else {
                    ViewState::Data(cached)
                };
                Resolution {
                    state,
                    write_back: None,
                }
            }
        }
    }

    /// Keyed partitions merge, so an empty answer writes nothing. An empty
    /// answer for a singleton removes the cached record.
    fn write_through(&self, items: Vec<T>) -> Option<JoinHandle<()>> {
        let store = Arc::clone(&self.store);
        match (items.is_empty(), T::SLOT) {
            (true, StorageSlot::Keyed) => None,
            (true, StorageSlot::Singleton(key)) => Some(tokio::spawn(async move {
                if let Err(e) = store.remove_singleton(T::PARTITION, key).await {
                    warn!(partition = %T::PARTITION, error = %e, "Failed to drop cached record");
                }
            })),
            (false, _) => Some(tokio::spawn(async move {
                if let Err(e) = store.persist(&items).await {
                    warn!(partition = %T::PARTITION, error = %e, "Failed to cache server data");
                }
            })),
        }
    }
}
