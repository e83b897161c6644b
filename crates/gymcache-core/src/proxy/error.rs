use thiserror::Error;

use super::NetworkError;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Proxy worker {0} is no longer running")]
    WorkerGone(String),

    #[error("Install failed: {0}")]
    InstallFailed(String),

    #[error("{0} does not send a reply")]
    NoReply(&'static str),

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
}
