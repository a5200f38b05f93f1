//! Cache configuration.
//!
//! Read from environment variables by [`CacheConfig::from_env`]:
//! - `STRATA_CACHE_EVICTION`: `superseded` (default) or `retain`
//! - `STRATA_VERIFY_LAYERS`: `1`/`true` to check every build (default: off)

use serde::{Deserialize, Serialize};

/// What happens to the previous snapshot of a (genus, n) entry once a build
/// to a larger edge count succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Drop the smaller snapshot from the cache. Callers holding it keep
    /// their copy alive.
    #[default]
    Superseded,
    /// Keep smaller snapshots until `evict_superseded` is called.
    Retain,
}

impl EvictionPolicy {
    /// Parses `superseded` or `retain`, ignoring case.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "superseded" => Some(EvictionPolicy::Superseded),
            "retain" => Some(EvictionPolicy::Retain),
            _ => None,
        }
    }
}

/// Configuration of a [`DegenerationCache`](crate::cache::DegenerationCache).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Replacement policy for superseded snapshots.
    pub eviction: EvictionPolicy,
    /// Run `check_consistency` after every successful build.
    pub verify_layers: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            eviction: EvictionPolicy::Superseded,
            verify_layers: false,
        }
    }
}

impl CacheConfig {
    /// Reads the configuration from `STRATA_*` environment variables,
    /// falling back to the defaults for unset or unreadable values.
    pub fn from_env() -> Self {
        Self::from_values(
            std::env::var("STRATA_CACHE_EVICTION").ok().as_deref(),
            std::env::var("STRATA_VERIFY_LAYERS").ok().as_deref(),
        )
    }

    fn from_values(eviction: Option<&str>, verify: Option<&str>) -> Self {
        let defaults = CacheConfig::default();
        let eviction = match eviction {
            None => defaults.eviction,
            Some(value) => EvictionPolicy::parse(value).unwrap_or_else(|| {
                tracing::warn!(value, "unknown STRATA_CACHE_EVICTION, using default");
                defaults.eviction
            }),
        };
        let verify_layers = verify
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(defaults.verify_layers);
        CacheConfig {
            eviction,
            verify_layers,
        }
    }
}
