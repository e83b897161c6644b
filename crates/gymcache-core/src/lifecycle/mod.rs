//! User-triggered lifecycle actions: refreshing to the latest build and
//! offering installation.

pub mod install;
pub mod update;

use async_trait::async_trait;
use thiserror::Error;

use crate::proxy::ProxyError;
use crate::store::StoreError;

pub use install::{
    detect_platform, install_affordance, InstallAffordance, InstallContext, InstallInstructions,
    Platform,
};
pub use update::{ControlPlane, UpdateOutcome};

/// Host hook invoked once an update has finished.
#[async_trait]
pub trait PageReload: Send + Sync {
    async fn reload(&self);
}

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Proxy error: {0}")]
    Proxy(#[from] ProxyError),
}
