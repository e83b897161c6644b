use std::fmt;

use serde::{Deserialize, Serialize};

const STATIC_PREFIX: &str = "gym-static-";
const DYNAMIC_PREFIX: &str = "gym-dynamic-";

/// Build identifier namespacing the proxy's cache partitions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheVersionTag(String);

impl CacheVersionTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Tag derived from the crate version, used when no build tag is configured.
    pub fn from_build() -> Self {
        Self(format!("v{}", env!("CARGO_PKG_VERSION")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Partition holding the pre-cached shell routes.
    pub fn static_cache(&self) -> String {
        format!("{}{}", STATIC_PREFIX, self.0)
    }

    /// Partition filled at runtime by the request policies.
    pub fn dynamic_cache(&self) -> String {
        format!("{}{}", DYNAMIC_PREFIX, self.0)
    }

    /// Whether `cache_name` is one of this build's two partitions.
    pub fn owns(&self, cache_name: &str) -> bool {
        cache_name == self.static_cache() || cache_name == self.dynamic_cache()
    }
}

impl fmt::Display for CacheVersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
