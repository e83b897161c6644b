use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use super::{
    CacheStorage, CacheVersionTag, Network, NetworkError, ProxyConfig, ProxyError, ProxyRequest,
    ProxyResponse, ResponseSource, Strategy,
};

/// Lifecycle of one proxy worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
    Installing,
    Waiting,
    Activating,
    Activated,
    /// Superseded by a newer version, or failed to install.
    Redundant,
}

impl fmt::Display for ProxyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProxyState::Installing => "installing",
            ProxyState::Waiting => "waiting",
            ProxyState::Activating => "activating",
            ProxyState::Activated => "activated",
            ProxyState::Redundant => "redundant",
        };
        f.write_str(s)
    }
}

/// Commands the host can post to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Promote a waiting worker now.
    SkipWaiting,
    /// Delete every cache partition. Replies `CacheCleared`.
    ClearCache,
    /// List cache partition names. Replies `CacheNames`.
    CacheNames,
}

impl ControlCommand {
    pub fn as_message(&self) -> &'static str {
        match self {
            ControlCommand::SkipWaiting => "SKIP_WAITING",
            ControlCommand::ClearCache => "CLEAR_CACHE",
            ControlCommand::CacheNames => "CACHE_NAMES",
        }
    }

    pub fn parse(message: &str) -> Option<Self> {
        match message {
            "SKIP_WAITING" => Some(ControlCommand::SkipWaiting),
            "CLEAR_CACHE" => Some(ControlCommand::ClearCache),
            "CACHE_NAMES" => Some(ControlCommand::CacheNames),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlReply {
    CacheCleared,
    CacheNames(Vec<String>),
}

impl ControlReply {
    pub fn as_message(&self) -> String {
        match self {
            ControlReply::CacheCleared => "CACHE_CLEARED".to_string(),
            ControlReply::CacheNames(names) => names.join(","),
        }
    }
}

/// Notifications from workers to their registration.
#[derive(Debug)]
pub(crate) enum LifecycleEvent {
    SkipWaiting(CacheVersionTag),
}

type FetchReply = oneshot::Sender<Result<ProxyResponse, NetworkError>>;

enum WorkerMessage {
    Install(oneshot::Sender<Result<bool, ProxyError>>),
    Wait,
    Activate(oneshot::Sender<()>),
    Fetch {
        request: ProxyRequest,
        reply: FetchReply,
    },
    Control {
        command: ControlCommand,
        reply: Option<oneshot::Sender<ControlReply>>,
    },
    Retire,
}

/// Host-side handle to a running worker. Sends messages, nothing else.
#[derive(Clone)]
pub struct WorkerHandle {
    version: CacheVersionTag,
    tx: mpsc::UnboundedSender<WorkerMessage>,
    state: watch::Receiver<ProxyState>,
    retired: Arc<AtomicBool>,
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("version", &self.version)
            .field("state", &self.state())
            .finish()
    }
}

impl WorkerHandle {
    pub fn version(&self) -> &CacheVersionTag {
        &self.version
    }

    pub fn state(&self) -> ProxyState {
        *self.state.borrow()
    }

    /// Wait until the worker reaches one of `targets`.
    pub async fn wait_for_state(&self, targets: &[ProxyState]) -> Result<ProxyState, ProxyError> {
        let mut rx = self.state.clone();
        let state = rx
            .wait_for(|state| targets.contains(state))
            .await
            .map_err(|_| self.gone())?;
        Ok(*state)
    }

    /// Hand an intercepted request to the worker.
    pub async fn fetch(&self, request: ProxyRequest) -> Result<ProxyResponse, ProxyError> {
        let (reply, rx) = oneshot::channel();
        self.send(WorkerMessage::Fetch { request, reply })?;
        let response = rx.await.map_err(|_| self.gone())??;
        Ok(response)
    }

    /// Fire-and-forget control message.
    pub fn post_message(&self, command: ControlCommand) -> Result<(), ProxyError> {
        self.send(WorkerMessage::Control {
            command,
            reply: None,
        })
    }

    /// Control message with a reply port.
    pub async fn post_message_with_reply(
        &self,
        command: ControlCommand,
    ) -> Result<ControlReply, ProxyError> {
        if command == ControlCommand::SkipWaiting {
            return Err(ProxyError::NoReply(command.as_message()));
        }
        let (reply, rx) = oneshot::channel();
        self.send(WorkerMessage::Control {
            command,
            reply: Some(reply),
        })?;
        rx.await.map_err(|_| self.gone())
    }

    /// Returns whether a skip-waiting request arrived during install.
    pub(crate) async fn install(&self) -> Result<bool, ProxyError> {
        let (reply, rx) = oneshot::channel();
        self.send(WorkerMessage::Install(reply))?;
        rx.await.map_err(|_| self.gone())?
    }

    pub(crate) fn wait(&self) -> Result<(), ProxyError> {
        self.send(WorkerMessage::Wait)
    }

    pub(crate) async fn activate(&self) -> Result<(), ProxyError> {
        let (reply, rx) = oneshot::channel();
        self.send(WorkerMessage::Activate(reply))?;
        rx.await.map_err(|_| self.gone())
    }

    /// Takes effect for cache writes immediately, before the worker loop
    /// sees the message.
    pub(crate) fn retire(&self) {
        self.retired.store(true, Ordering::SeqCst);
        let _ = self.tx.send(WorkerMessage::Retire);
    }

    fn send(&self, message: WorkerMessage) -> Result<(), ProxyError> {
        self.tx.send(message).map_err(|_| self.gone())
    }

    fn gone(&self) -> ProxyError {
        ProxyError::WorkerGone(self.version.to_string())
    }
}

/// Start a worker task for `config`. The worker begins in `Installing` and
/// does nothing until told to install.
pub(crate) fn spawn(
    config: ProxyConfig,
    caches: CacheStorage,
    network: Arc<dyn Network>,
    events: mpsc::UnboundedSender<LifecycleEvent>,
) -> WorkerHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(ProxyState::Installing);
    let version = config.version.clone();
    let retired = Arc::new(AtomicBool::new(false));

    let worker = Worker {
        ctx: FetchContext {
            config: Arc::new(config),
            caches,
            network,
            retired: Arc::clone(&retired),
        },
        state: state_tx,
        events,
        skip_waiting: false,
    };
    tokio::spawn(worker.run(rx));

    WorkerHandle {
        version,
        tx,
        state: state_rx,
        retired,
    }
}

struct Worker {
    ctx: FetchContext,
    state: watch::Sender<ProxyState>,
    events: mpsc::UnboundedSender<LifecycleEvent>,
    skip_waiting: bool,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<WorkerMessage>) {
        while let Some(message) = rx.recv().await {
            match message {
                WorkerMessage::Install(reply) => {
                    let result = self.install().await;
                    let failed = result.is_err();
                    let _ = reply.send(result);
                    if failed {
                        self.set_state(ProxyState::Redundant);
                        return;
                    }
                }
                WorkerMessage::Wait => {
                    self.set_state(ProxyState::Waiting);
                    if self.skip_waiting {
                        self.request_promotion();
                    }
                }
                WorkerMessage::Activate(reply) => {
                    self.activate().await;
                    let _ = reply.send(());
                }
                WorkerMessage::Fetch { request, reply } => {
                    let ctx = self.ctx.clone();
                    tokio::spawn(async move {
                        let _ = reply.send(ctx.respond(request).await);
                    });
                }
                WorkerMessage::Control { command, reply } => {
                    self.control(command, reply).await;
                }
                WorkerMessage::Retire => {
                    self.ctx.retired.store(true, Ordering::SeqCst);
                    self.set_state(ProxyState::Redundant);
                    break;
                }
            }
        }
        debug!(version = %self.ctx.config.version, "Proxy worker stopped");
    }

    fn set_state(&self, state: ProxyState) {
        self.state.send_replace(state);
        debug!(version = %self.ctx.config.version, %state, "Proxy state changed");
    }

    /// Fetch the whole shell manifest and store it only if every route
    /// answered 200.
    async fn install(&self) -> Result<bool, ProxyError> {
        let config = &self.ctx.config;
        let network = &self.ctx.network;
        info!(version = %config.version, routes = config.shell_routes.len(), "Installing proxy");

        let fetches = config.shell_urls().into_iter().map(|url| async move {
            let result = network.fetch(&ProxyRequest::get(url.clone())).await;
            (url, result)
        });
        let results = join_all(fetches).await;

        let mut entries = Vec::with_capacity(results.len());
        for (url, result) in results {
            let response = result.map_err(|e| ProxyError::InstallFailed(format!("{}: {}", url, e)))?;
            if response.status != 200 {
                return Err(ProxyError::InstallFailed(format!(
                    "{} returned HTTP {}",
                    url, response.status
                )));
            }
            entries.push((url, response));
        }

        self.ctx
            .caches
            .put_all(&config.version.static_cache(), entries)
            .await;
        Ok(self.skip_waiting)
    }

    async fn activate(&mut self) {
        self.set_state(ProxyState::Activating);
        let version = &self.ctx.config.version;

        for name in self.ctx.caches.keys().await {
            if !version.owns(&name) {
                info!(cache = %name, "Deleting cache from previous build");
                self.ctx.caches.delete(&name).await;
            }
        }
        self.ctx.caches.open(&version.static_cache()).await;
        self.ctx.caches.open(&version.dynamic_cache()).await;

        self.set_state(ProxyState::Activated);
        info!(version = %version, "Proxy activated");
    }

    async fn control(&mut self, command: ControlCommand, reply: Option<oneshot::Sender<ControlReply>>) {
        debug!(command = command.as_message(), "Control message");
        match command {
            ControlCommand::SkipWaiting => {
                self.skip_waiting = true;
                if *self.state.borrow() == ProxyState::Waiting {
                    self.request_promotion();
                }
            }
            ControlCommand::ClearCache => {
                let removed = self.ctx.caches.clear().await;
                info!(removed, "Cleared all proxy caches");
                if let Some(reply) = reply {
                    let _ = reply.send(ControlReply::CacheCleared);
                }
            }
            ControlCommand::CacheNames => {
                let names = self.ctx.caches.keys().await;
                if let Some(reply) = reply {
                    let _ = reply.send(ControlReply::CacheNames(names));
                }
            }
        }
    }

    fn request_promotion(&self) {
        let event = LifecycleEvent::SkipWaiting(self.ctx.config.version.clone());
        if self.events.send(event).is_err() {
            warn!(version = %self.ctx.config.version, "Registration gone, cannot promote");
        }
    }
}

/// Everything a fetch needs, cloned into a task per request so a slow
/// network call never blocks the worker loop.
#[derive(Clone)]
struct FetchContext {
    config: Arc<ProxyConfig>,
    caches: CacheStorage,
    network: Arc<dyn Network>,
    retired: Arc<AtomicBool>,
}

impl FetchContext {
    async fn respond(&self, request: ProxyRequest) -> Result<ProxyResponse, NetworkError> {
        let epoch = self.caches.epoch().await;
        match self.config.classify(&request) {
            Strategy::PassThrough => self.network.fetch(&request).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(epoch, request).await,
            Strategy::CacheFirst => self.cache_first(epoch, &request).await,
            Strategy::NetworkFirst => self.network_first(epoch, &request).await,
        }
    }

    async fn stale_while_revalidate(
        &self,
        epoch: u64,
        request: ProxyRequest,
    ) -> Result<ProxyResponse, NetworkError> {
        if let Some(cached) = self.caches.match_any(&request.url).await {
            let ctx = self.clone();
            tokio::spawn(async move {
                match ctx.network.fetch(&request).await {
                    Ok(response) => ctx.store(epoch, &request, &response).await,
                    Err(e) => debug!(url = %request.url, error = %e, "Revalidation failed, keeping cached copy"),
                }
            });
            return Ok(cached);
        }

        match self.network.fetch(&request).await {
            Ok(response) => {
                self.store(epoch, &request, &response).await;
                Ok(response)
            }
            Err(e) => self.offline_fallback(&request, e).await,
        }
    }

    async fn cache_first(&self, epoch: u64, request: &ProxyRequest) -> Result<ProxyResponse, NetworkError> {
        if let Some(cached) = self.caches.match_any(&request.url).await {
            return Ok(cached);
        }
        match self.network.fetch(request).await {
            Ok(response) => {
                self.store(epoch, request, &response).await;
                Ok(response)
            }
            Err(e) => self.offline_fallback(request, e).await,
        }
    }

    async fn network_first(&self, epoch: u64, request: &ProxyRequest) -> Result<ProxyResponse, NetworkError> {
        match self.network.fetch(request).await {
            Ok(response) => {
                self.store(epoch, request, &response).await;
                Ok(response)
            }
            Err(e) => match self.caches.match_any(&request.url).await {
                Some(cached) => Ok(cached),
                None => self.offline_fallback(request, e).await,
            },
        }
    }

    /// Writes from a retired worker, or from a fetch that began before a
    /// cache was deleted, are dropped so reclaimed partitions stay gone.
    async fn store(&self, epoch: u64, request: &ProxyRequest, response: &ProxyResponse) {
        if !response.is_cacheable() || self.retired.load(Ordering::SeqCst) {
            return;
        }
        self.caches
            .put_since(epoch, &self.config.version.dynamic_cache(), &request.url, response.clone())
            .await;
    }

    /// Navigations get the cached dashboard shell, or a synthetic offline
    /// page. Everything else sees the network error.
    async fn offline_fallback(
        &self,
        request: &ProxyRequest,
        error: NetworkError,
    ) -> Result<ProxyResponse, NetworkError> {
        if !request.is_navigation() {
            return Err(error);
        }
        warn!(url = %request.url, error = %error, "Navigation failed, serving offline fallback");

        if let Some(shell_url) = self.config.fallback_url() {
            if let Some(shell) = self.caches.match_any(&shell_url).await {
                return Ok(shell.from_source(ResponseSource::Shell));
            }
        }
        Ok(ProxyResponse::offline_page())
    }
}
