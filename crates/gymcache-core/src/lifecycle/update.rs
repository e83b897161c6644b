use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{info, warn};

use super::{LifecycleError, PageReload};
use crate::proxy::{
    CacheVersionTag, ControlCommand, ControlReply, ProxyError, ProxyRegistration, ProxyState,
};
use crate::store::PersistentStore;

/// How long to wait for the proxy to acknowledge a command before giving up
/// and reloading anyway.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Caches were purged; `promoted` names the version that took over, if
    /// one was waiting.
    Refreshed { promoted: Option<CacheVersionTag> },
    /// No proxy, or it did not cooperate. The page was reloaded as-is.
    PlainReload,
}

/// Purge and promote, driven from the host side.
pub struct ControlPlane {
    store: Arc<PersistentStore>,
    registration: Option<Arc<ProxyRegistration>>,
    reloader: Arc<dyn PageReload>,
}

impl ControlPlane {
    pub fn new(
        store: Arc<PersistentStore>,
        registration: Option<Arc<ProxyRegistration>>,
        reloader: Arc<dyn PageReload>,
    ) -> Self {
        Self {
            store,
            registration,
            reloader,
        }
    }

    /// Clear the persistent store and every proxy cache, promote a waiting
    /// proxy version, then reload. Any proxy failure still ends in a reload.
    pub async fn update(&self) -> UpdateOutcome {
        if let Err(e) = self.clear_store().await {
            warn!(error = %e, "Failed to clear persistent store during update");
        }

        let outcome = match &self.registration {
            Some(registration) => match self.refresh(registration).await {
                Ok(promoted) => UpdateOutcome::Refreshed { promoted },
                Err(e) => {
                    warn!(error = %e, "Proxy update failed, falling back to plain reload");
                    UpdateOutcome::PlainReload
                }
            },
            None => UpdateOutcome::PlainReload,
        };

        self.reloader.reload().await;
        outcome
    }

    /// Clear the persistent store and every proxy cache without reloading.
    pub async fn purge(&self) -> Result<(), LifecycleError> {
        self.clear_store().await?;
        if let Some(registration) = &self.registration {
            self.clear_proxy_caches(registration).await?;
        }
        Ok(())
    }

    async fn clear_store(&self) -> Result<(), LifecycleError> {
        match self.store.clear_all().await {
            Ok(()) => Ok(()),
            // Nothing was ever persisted
            Err(e) if e.is_unavailable() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn refresh(
        &self,
        registration: &ProxyRegistration,
    ) -> Result<Option<CacheVersionTag>, ProxyError> {
        self.clear_proxy_caches(registration).await?;

        let Some(waiting) = registration.waiting().await else {
            return Ok(None);
        };
        waiting.post_message(ControlCommand::SkipWaiting)?;
        let state = timeout(
            COMMAND_TIMEOUT,
            waiting.wait_for_state(&[ProxyState::Activated, ProxyState::Redundant]),
        )
        .await
        .map_err(|_| ProxyError::Timeout("promotion"))??;

        if state == ProxyState::Activated {
            info!(version = %waiting.version(), "Promoted waiting proxy version");
            Ok(Some(waiting.version().clone()))
        } else {
            Ok(None)
        }
    }

    /// Send `CLEAR_CACHE` through whichever worker is reachable and wait for
    /// `CACHE_CLEARED`.
    async fn clear_proxy_caches(&self, registration: &ProxyRegistration) -> Result<(), ProxyError> {
        let worker = match registration.controller().await {
            Some(worker) => worker,
            None => match registration.waiting().await {
                Some(worker) => worker,
                None => return Ok(()),
            },
        };

        let reply = timeout(
            COMMAND_TIMEOUT,
            worker.post_message_with_reply(ControlCommand::ClearCache),
        )
        .await
        .map_err(|_| ProxyError::Timeout("CACHE_CLEARED"))??;

        if reply != ControlReply::CacheCleared {
            warn!(reply = %reply.as_message(), "Unexpected reply to CLEAR_CACHE");
        }
        Ok(())
    }
}
