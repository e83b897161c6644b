//! gymcache - command-line host for the offline gym data layer.
//!
//! Plays the part of the page: syncs the backend into the persistent store,
//! renders views through the read path, and drives the request proxy and
//! its lifecycle commands.

use std::io;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use url::Url;

use gymcache_core::connectivity::ConnectivitySignal;
use gymcache_core::format::format_timestamp;
use gymcache_core::lifecycle::{install_affordance, InstallAffordance, InstallContext};
use gymcache_core::models::UserId;
use gymcache_core::proxy::{
    HttpNetwork, Network, NetworkError, ProxyRequest, ProxyResponse,
};
use gymcache_core::resolver::ViewState;
use gymcache_core::store::Partition;
use gymcache_core::{
    CachedEntity, CachedExercise, CachedRoutine, Config, ControlPlane, CredentialStore,
    MembershipSnapshot, MountSync, PageReload, PersistentStore, ProxyRegistration, ReadPathResolver,
    RestBackend, StatusBanner, SyncOrchestrator, UpdateOutcome,
};

const USAGE: &str = "\
Usage: gymcache [--offline] <command>

Commands:
  sync                     Pull routines, exercises and membership into the cache
  status                   Sync when online, then show cache contents
  routines | exercises     Render a view, syncing first when online
  membership               Show the cached membership
  fetch <url> [--navigate] Send a request through the offline proxy
  update                   Purge caches, promote a waiting proxy, reload
  purge                    Delete every cached record and proxy cache
  install [--standalone] [--native] [--user-agent <ua>]
                           Show how to install the app
  token set <token> | token clear
                           Manage the backend token in the OS keychain";

/// Initialize the tracing subscriber for logging
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "gymcache.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let mut config = Config::load()?;
    config.apply_env();

    let _log_guard = init_tracing(config.log_dir.as_deref());
    info!("gymcache starting");

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let forced_offline = take_flag(&mut args, "--offline");
    let Some(command) = args.first().cloned() else {
        println!("{}", USAGE);
        return Ok(());
    };
    let rest = &args[1..];

    match command.as_str() {
        "sync" => sync(&config, forced_offline).await,
        "status" => status(&config, forced_offline).await,
        "routines" => render_view::<CachedRoutine>(&config, forced_offline).await,
        "exercises" => render_view::<CachedExercise>(&config, forced_offline).await,
        "membership" => render_membership(&config, forced_offline).await,
        "fetch" => fetch(&config, rest, forced_offline).await,
        "update" => update(&config).await,
        "purge" => purge(&config).await,
        "install" => install(rest),
        "token" => token(&config, rest),
        "-h" | "--help" | "help" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => anyhow::bail!("Unknown command: {}\n\n{}", other, USAGE),
    }
}

fn take_flag(args: &mut Vec<String>, flag: &str) -> bool {
    let before = args.len();
    args.retain(|a| a != flag);
    args.len() != before
}

fn open_store(config: &Config) -> Result<Arc<PersistentStore>> {
    Ok(Arc::new(PersistentStore::on_disk(config.store_dir()?)))
}

fn user_id(config: &Config) -> Result<UserId> {
    config
        .user_id
        .as_deref()
        .map(UserId::from)
        .context("No user configured. Set user_id in the config file or GYMCACHE_USER_ID.")
}

fn backend(config: &Config) -> Result<RestBackend> {
    let url = config
        .backend_url
        .as_deref()
        .context("No backend configured. Set backend_url or GYMCACHE_BACKEND_URL.")?;
    let mut backend = RestBackend::with_timeout(url, config.request_timeout())?;
    if let Some(ref key) = config.api_key {
        backend = backend.with_api_key(key.as_str());
    }
    if let Some(ref user) = config.user_id {
        if let Some(token) = CredentialStore::get_token(user)? {
            backend = backend.with_token(token);
        }
    }
    Ok(backend)
}

/// Reachability at startup, standing in for the browser's initial online flag.
async fn is_online(config: &Config, forced_offline: bool) -> bool {
    if forced_offline {
        return false;
    }
    match backend(config) {
        Ok(backend) => backend.is_reachable().await,
        Err(_) => false,
    }
}

// ============================================================================
// Data commands
// ============================================================================

async fn sync(config: &Config, forced_offline: bool) -> Result<()> {
    let user = user_id(config)?;
    let online = is_online(config, forced_offline).await;
    let orchestrator = SyncOrchestrator::new(Arc::new(backend(config)?), open_store(config)?);

    match orchestrator.sync_on_load(&user, online).await {
        None => println!("Offline, nothing synced. Cached data is still available."),
        Some(outcome) => {
            let report = outcome.report();
            println!("routines:   {:?}", report.routines);
            println!("exercises:  {:?}", report.exercises);
            println!("membership: {:?}", report.membership);
            match outcome.timestamp() {
                Some(at) => println!("Synced at {}", format_timestamp(at)),
                None => anyhow::bail!("Sync failed, previous cache kept"),
            }
        }
    }
    Ok(())
}

/// A mounted view: the store it reads from and the reachability seen at mount.
struct Page {
    store: Arc<PersistentStore>,
    online: bool,
}

/// Mount a view. While online, the once-per-session sync runs before the
/// view resolves. Offline, the view renders straight from the cache.
async fn load_page(config: &Config, forced_offline: bool) -> Result<Page> {
    let store = open_store(config)?;
    let online = is_online(config, forced_offline).await;
    let connectivity = ConnectivitySignal::new(online);

    let (user, source) = match (user_id(config), backend(config)) {
        (Ok(user), Ok(source)) => (user, source),
        _ => {
            debug!("No backend or user configured, rendering from cache");
            return Ok(Page { store, online });
        }
    };

    let orchestrator = Arc::new(SyncOrchestrator::new(Arc::new(source), Arc::clone(&store)));
    match orchestrator.on_mount(user, &connectivity).await {
        MountSync::Finished(Some(outcome)) if !outcome.is_success() => {
            warn!(report = ?outcome.report(), "Sync on load failed, showing cached data")
        }
        MountSync::Finished(_) => {}
        // The host exits after rendering
        MountSync::Pending(task) => task.abort(),
    }
    Ok(Page { store, online })
}

async fn status(config: &Config, forced_offline: bool) -> Result<()> {
    let Page { store, online } = load_page(config, forced_offline).await?;
    let metadata = store.sync_metadata().await.unwrap_or(None);

    let banner = StatusBanner::new(config.stale_after()).compose(online, metadata.as_ref(), Utc::now());
    if let Some(banner) = banner {
        println!("[{}]", banner.text);
    }
    match metadata.and_then(|m| m.last_sync) {
        Some(at) => println!("Last sync: {}", format_timestamp(at)),
        None => println!("Last sync: never"),
    }
    for partition in Partition::ALL {
        let count = store
            .get_all::<serde_json::Value>(partition)
            .await
            .map(|records| records.len())
            .unwrap_or(0);
        println!("{:<12} {}", partition.name(), count);
    }
    Ok(())
}

async fn render_view<T>(config: &Config, forced_offline: bool) -> Result<()>
where
    T: CachedEntity + Summary,
{
    let Page { store, online } = load_page(config, forced_offline).await?;
    let resolver = ReadPathResolver::<T>::new(store);

    match resolver.resolve(None, online).await.state {
        ViewState::Data(items) => {
            for item in &items {
                println!("{}", item.summary());
            }
        }
        ViewState::Empty(empty) => {
            println!("{}", empty.title);
            println!("{}", empty.message);
        }
        ViewState::Loading => {}
    }
    Ok(())
}

async fn render_membership(config: &Config, forced_offline: bool) -> Result<()> {
    let Page { store, .. } = load_page(config, forced_offline).await?;
    let today = Utc::now().date_naive();
    match store.load_or_empty::<MembershipSnapshot>().await.first() {
        Some(m) => {
            println!("{} plan, {}", m.plan_type, m.status);
            println!("{} to {}", m.start_date, m.end_date);
            if m.is_active(today) {
                println!("{} days remaining", m.days_remaining(today));
            }
        }
        None => println!("No cached membership"),
    }
    Ok(())
}

/// One-line rendering of a cached entity.
trait Summary {
    fn summary(&self) -> String;
}

impl Summary for CachedRoutine {
    fn summary(&self) -> String {
        format!(
            "{} [{}] - {} days, {} exercises",
            self.name,
            self.display_category(),
            self.days.len(),
            self.exercise_count()
        )
    }
}

impl Summary for CachedExercise {
    fn summary(&self) -> String {
        let mut line = format!("{} ({})", self.name, self.muscle_group);
        let steps = self.instruction_steps().len();
        if steps > 0 {
            line.push_str(&format!(" - {} steps", steps));
        }
        if let Some(image) = self.sorted_images().first() {
            line.push_str(&format!(" [{}]", image.url));
        }
        line
    }
}

// ============================================================================
// Proxy commands
// ============================================================================

/// Real network gated by the connectivity signal, so `--offline` can cut
/// the proxy off after it has installed.
struct GatedNetwork {
    inner: HttpNetwork,
    connectivity: ConnectivitySignal,
}

#[async_trait]
impl Network for GatedNetwork {
    async fn fetch(&self, request: &ProxyRequest) -> Result<ProxyResponse, NetworkError> {
        if !self.connectivity.is_online() {
            return Err(NetworkError::Unreachable("offline".into()));
        }
        self.inner.fetch(request).await
    }
}

async fn start_proxy(config: &Config, connectivity: ConnectivitySignal) -> Result<Arc<ProxyRegistration>> {
    let proxy_config = config.proxy_config()?;
    let network = HttpNetwork::new(&proxy_config.app_origin, config.request_timeout())?;
    let registration = Arc::new(ProxyRegistration::new(Arc::new(GatedNetwork {
        inner: network,
        connectivity,
    })));
    registration
        .register(proxy_config)
        .await
        .context("Failed to install the offline proxy")?;
    Ok(registration)
}

async fn fetch(config: &Config, args: &[String], forced_offline: bool) -> Result<()> {
    let mut args = args.to_vec();
    let navigate = take_flag(&mut args, "--navigate");
    let target = args.first().context("Usage: gymcache fetch <url> [--navigate]")?;
    let url = Url::parse(target).with_context(|| format!("Invalid URL: {}", target))?;

    let connectivity = ConnectivitySignal::new(true);
    let registration = start_proxy(config, connectivity.clone()).await?;
    if forced_offline {
        connectivity.went_offline();
    }

    let request = if navigate {
        ProxyRequest::navigate(url)
    } else {
        ProxyRequest::get(url)
    };
    let response = registration.fetch(request).await?;
    println!(
        "HTTP {} from {:?}, {} bytes{}",
        response.status,
        response.source,
        response.body.len(),
        response
            .content_type
            .as_deref()
            .map(|ct| format!(" ({})", ct))
            .unwrap_or_default()
    );
    Ok(())
}

struct CliReload;

#[async_trait]
impl PageReload for CliReload {
    async fn reload(&self) {
        println!("Reload requested. Restart views to pick up fresh data.");
    }
}

async fn update(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let registration = match start_proxy(config, ConnectivitySignal::new(true)).await {
        Ok(registration) => Some(registration),
        Err(e) => {
            warn!(error = %e, "Proxy unavailable, update will only reload");
            None
        }
    };

    let plane = ControlPlane::new(store, registration, Arc::new(CliReload));
    match plane.update().await {
        UpdateOutcome::Refreshed { promoted: Some(v) } => println!("Caches cleared, now running {}", v),
        UpdateOutcome::Refreshed { promoted: None } => println!("Caches cleared"),
        UpdateOutcome::PlainReload => println!("Reloaded without clearing proxy caches"),
    }
    Ok(())
}

async fn purge(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let registration = start_proxy(config, ConnectivitySignal::new(true)).await.ok();
    ControlPlane::new(store, registration, Arc::new(CliReload))
        .purge()
        .await?;
    println!("All cached data removed");
    Ok(())
}

// ============================================================================
// Install and credentials
// ============================================================================

fn install(args: &[String]) -> Result<()> {
    let mut args = args.to_vec();
    let standalone = take_flag(&mut args, "--standalone");
    let native = take_flag(&mut args, "--native");
    let user_agent = match args.iter().position(|a| a == "--user-agent") {
        Some(i) => args.get(i + 1).cloned().context("--user-agent needs a value")?,
        None => std::env::var("GYMCACHE_USER_AGENT").unwrap_or_default(),
    };

    let context = InstallContext {
        user_agent,
        standalone,
        native_prompt_available: native,
    };
    match install_affordance(&context) {
        InstallAffordance::AlreadyInstalled => println!("Already installed"),
        InstallAffordance::Native => println!("Use the browser's install prompt"),
        InstallAffordance::Manual(instructions) => {
            println!("{}", instructions.title);
            for (i, step) in instructions.steps.iter().enumerate() {
                println!("  {}. {}", i + 1, step);
            }
        }
    }
    Ok(())
}

fn token(config: &Config, args: &[String]) -> Result<()> {
    let user = user_id(config)?;
    match (args.first().map(String::as_str), args.get(1)) {
        (Some("set"), Some(token)) => {
            CredentialStore::store_token(user.as_str(), token)?;
            println!("Token saved for {}", user);
        }
        (Some("clear"), _) => {
            CredentialStore::delete_token(user.as_str())?;
            println!("Token removed for {}", user);
        }
        _ => anyhow::bail!("Usage: gymcache token set <token> | token clear"),
    }
    Ok(())
}
