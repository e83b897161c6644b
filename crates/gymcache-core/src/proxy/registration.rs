use std::sync::{Arc, Weak};

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use super::worker::{self, LifecycleEvent};
use super::{
    CacheStorage, CacheVersionTag, ControlCommand, ControlReply, Network, ProxyConfig, ProxyError,
    ProxyRequest, ProxyResponse, WorkerHandle,
};

#[derive(Default)]
struct Slots {
    active: Option<WorkerHandle>,
    waiting: Option<WorkerHandle>,
}

/// The host's view of the proxy for one origin.
///
/// Tracks which worker version controls requests and which one is waiting
/// to take over. Workers share the origin's cache storage; the host only
/// ever reaches it through worker messages.
pub struct ProxyRegistration {
    slots: Arc<Mutex<Slots>>,
    caches: CacheStorage,
    network: Arc<dyn Network>,
    events: mpsc::UnboundedSender<LifecycleEvent>,
}

impl ProxyRegistration {
    /// Must be called inside a tokio runtime.
    pub fn new(network: Arc<dyn Network>) -> Self {
        Self::with_storage(network, CacheStorage::new())
    }

    pub fn with_storage(network: Arc<dyn Network>, caches: CacheStorage) -> Self {
        let slots = Arc::new(Mutex::new(Slots::default()));
        let (events, rx) = mpsc::unbounded_channel();
        tokio::spawn(coordinate(Arc::downgrade(&slots), rx));

        Self {
            slots,
            caches,
            network,
            events,
        }
    }

    /// Install a worker for `config`. It activates immediately when nothing
    /// is active yet (or it was told to skip waiting during install);
    /// otherwise it waits behind the active worker.
    pub async fn register(&self, config: ProxyConfig) -> Result<WorkerHandle, ProxyError> {
        let version = config.version.clone();
        let worker = worker::spawn(
            config,
            self.caches.clone(),
            Arc::clone(&self.network),
            self.events.clone(),
        );

        let skip_waiting = match worker.install().await {
            Ok(skip) => skip,
            Err(e) => {
                warn!(version = %version, error = %e, "Proxy install failed");
                return Err(e);
            }
        };

        let mut slots = self.slots.lock().await;
        if slots
            .active
            .as_ref()
            .is_some_and(|active| active.version() == &version)
        {
            debug!(version = %version, "Version already active");
            worker.retire();
            return slots
                .active
                .clone()
                .ok_or_else(|| ProxyError::WorkerGone(version.to_string()));
        }

        if let Some(superseded) = slots.waiting.take() {
            info!(version = %superseded.version(), "Discarding superseded waiting worker");
            superseded.retire();
        }

        if slots.active.is_none() || skip_waiting {
            promote(&mut slots, worker.clone()).await?;
        } else {
            info!(version = %version, "New proxy version waiting");
            slots.waiting = Some(worker.clone());
            worker.wait()?;
        }
        Ok(worker)
    }

    /// Worker currently handling requests.
    pub async fn controller(&self) -> Option<WorkerHandle> {
        self.slots.lock().await.active.clone()
    }

    pub async fn waiting(&self) -> Option<WorkerHandle> {
        self.slots.lock().await.waiting.clone()
    }

    /// Route a request through the controlling worker, or straight to the
    /// network when nothing is active.
    pub async fn fetch(&self, request: ProxyRequest) -> Result<ProxyResponse, ProxyError> {
        match self.controller().await {
            Some(worker) => worker.fetch(request).await,
            None => Ok(self.network.fetch(&request).await?),
        }
    }

    /// Names of the origin's cache partitions, as reported by a worker.
    pub async fn cache_names(&self) -> Result<Vec<String>, ProxyError> {
        let worker = match self.controller().await {
            Some(worker) => Some(worker),
            None => self.waiting().await,
        };
        let Some(worker) = worker else {
            return Ok(Vec::new());
        };
        match worker.post_message_with_reply(ControlCommand::CacheNames).await? {
            ControlReply::CacheNames(names) => Ok(names),
            ControlReply::CacheCleared => Ok(Vec::new()),
        }
    }
}

/// Retire the active worker and activate `next` in its place.
async fn promote(slots: &mut Slots, next: WorkerHandle) -> Result<(), ProxyError> {
    if let Some(previous) = slots.active.take() {
        info!(from = %previous.version(), to = %next.version(), "Replacing active proxy");
        previous.retire();
    }
    next.activate().await?;
    slots.active = Some(next);
    Ok(())
}

/// Applies worker lifecycle events. Holds the slots weakly so dropping the
/// registration stops everything.
async fn coordinate(slots: Weak<Mutex<Slots>>, mut events: mpsc::UnboundedReceiver<LifecycleEvent>) {
    while let Some(event) = events.recv().await {
        let Some(slots) = slots.upgrade() else {
            break;
        };
        match event {
            LifecycleEvent::SkipWaiting(version) => promote_waiting(&slots, &version).await,
        }
    }
}

async fn promote_waiting(slots: &Mutex<Slots>, version: &CacheVersionTag) {
    let mut slots = slots.lock().await;
    let matches = slots
        .waiting
        .as_ref()
        .is_some_and(|waiting| waiting.version() == version);
    if !matches {
        debug!(version = %version, "Skip-waiting for a worker that is not waiting");
        return;
    }
    if let Some(next) = slots.waiting.take() {
        if let Err(e) = promote(&mut slots, next).await {
            warn!(version = %version, error = %e, "Failed to promote waiting proxy");
        }
    }
}
