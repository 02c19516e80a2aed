//! Configuration consumed when a [`TileView`](crate::core::map::TileView) is built.
//!
//! Every section has defaults matching a plain OpenStreetMap viewer, so a JSON
//! file only needs the keys it wants to change.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::constants::{
    DEFAULT_MAX_ZOOM, DEFAULT_MIN_ZOOM, MAX_SUPPORTED_ZOOM, TILE_SIZE, USER_AGENT,
};
use crate::core::geo::LatLng;
use crate::tiles::source::TileProvider;
use crate::{MapError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileViewConfig {
    /// Directory holding one cache subtree per provider
    pub cache_root: PathBuf,
    /// Edge length of a tile in pixels
    pub tile_size: u32,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub initial_center: LatLng,
    pub initial_zoom: u8,
    pub viewport: ViewportSize,
    /// Selectable tile servers; the first one is active at startup
    pub providers: Vec<TileProvider>,
    pub fetch: FetchConfig,
}

impl Default for TileViewConfig {
    fn default() -> Self {
        Self {
            cache_root: PathBuf::from("cache"),
            tile_size: TILE_SIZE,
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
            initial_center: LatLng::new(61.5, 23.5),
            initial_zoom: 7,
            viewport: ViewportSize::default(),
            providers: vec![TileProvider::openstreetmap()],
            fetch: FetchConfig::default(),
        }
    }
}

impl TileViewConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn with_cache_root(mut self, cache_root: impl Into<PathBuf>) -> Self {
        self.cache_root = cache_root.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.providers.is_empty() {
            return Err(MapError::InvalidConfig(
                "at least one tile provider is required".into(),
            ));
        }
        if self.tile_size == 0 {
            return Err(MapError::InvalidConfig("tile_size must be positive".into()));
        }
        if self.min_zoom > self.max_zoom || self.max_zoom > MAX_SUPPORTED_ZOOM {
            return Err(MapError::InvalidConfig(format!(
                "zoom bounds {}..={} must be ordered and at most {}",
                self.min_zoom, self.max_zoom, MAX_SUPPORTED_ZOOM
            )));
        }
        if !(self.min_zoom..=self.max_zoom).contains(&self.initial_zoom) {
            return Err(MapError::InvalidZoom {
                zoom: self.initial_zoom as i32,
                min: self.min_zoom,
                max: self.max_zoom,
            });
        }
        if !self.initial_center.is_projectable() {
            return Err(MapError::OutOfRangeCoordinate(self.initial_center.lat));
        }
        for provider in &self.providers {
            provider.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewportSize {
    pub width: u32,
    pub height: u32,
}

impl Default for ViewportSize {
    fn default() -> Self {
        Self {
            width: 384,
            height: 384,
        }
    }
}

/// What happens to a queued tile whose fetch or persist failed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Drop the entry and remember the failure so the viewport stops asking for it
    #[default]
    Drop,
    /// Move the entry to the back of the queue, waiting `backoff_ms * 2^(attempt-1)`
    /// before each retry, and drop it after `max_retries` retries
    Bounded { max_retries: u32, backoff_ms: u64 },
}

impl RetryPolicy {
    /// Delay before the given attempt (zero for the first)
    pub fn backoff(&self, attempt: u32) -> Duration {
        match *self {
            Self::Bounded { backoff_ms, .. } if attempt > 0 => {
                let factor = 1u64 << (attempt - 1).min(16);
                Duration::from_millis(backoff_ms.saturating_mul(factor))
            }
            _ => Duration::ZERO,
        }
    }

    /// Whether an entry that has failed `failures` times gets another go
    pub fn allows_retry(&self, failures: u32) -> bool {
        match *self {
            Self::Drop => false,
            Self::Bounded { max_retries, .. } => failures <= max_retries,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Upper bound on one request; a stalled fetch becomes a failure after this
    pub timeout_ms: u64,
    pub retry: RetryPolicy,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            retry: RetryPolicy::Drop,
            user_agent: USER_AGENT.to_string(),
        }
    }
}

/// Presets for common network conditions
impl FetchConfig {
    pub fn for_testing() -> Self {
        Self {
            timeout_ms: 200,
            retry: RetryPolicy::Drop,
            ..Self::default()
        }
    }

    pub fn patient() -> Self {
        Self {
            timeout_ms: 30_000,
            retry: RetryPolicy::Bounded {
                max_retries: 3,
                backoff_ms: 500,
            },
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TileViewConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tile_size, 256);
        assert_eq!((config.min_zoom, config.max_zoom), (0, 18));
        assert_eq!(config.providers[0].name, "osm");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = TileViewConfig::from_json_str(
            r#"{
                "cache_root": "/tmp/tiles",
                "initial_zoom": 3,
                "fetch": { "retry": { "kind": "bounded", "max_retries": 2, "backoff_ms": 100 } }
            }"#,
        )
        .unwrap();
        assert_eq!(config.cache_root, PathBuf::from("/tmp/tiles"));
        assert_eq!(config.initial_zoom, 3);
        assert_eq!(config.viewport, ViewportSize::default());
        assert_eq!(
            config.fetch.retry,
            RetryPolicy::Bounded {
                max_retries: 2,
                backoff_ms: 100
            }
        );
        assert_eq!(config.fetch.timeout_ms, 10_000);
    }

    #[test]
    fn test_rejects_initial_zoom_outside_bounds() {
        let err = TileViewConfig::from_json_str(
            r#"{ "min_zoom": 2, "max_zoom": 5, "initial_zoom": 7 }"#,
        )
        .unwrap_err();
        assert!(matches!(err, MapError::InvalidZoom { zoom: 7, min: 2, max: 5 }));
    }

    #[test]
    fn test_rejects_empty_providers() {
        let err = TileViewConfig::from_json_str(r#"{ "providers": [] }"#).unwrap_err();
        assert!(matches!(err, MapError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_malformed_json() {
        let err = TileViewConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, MapError::Serialization(_)));
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::Bounded {
            max_retries: 3,
            backoff_ms: 100,
        };
        assert_eq!(policy.backoff(0), Duration::ZERO);
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert!(policy.allows_retry(3));
        assert!(!policy.allows_retry(4));
        assert!(!RetryPolicy::Drop.allows_retry(1));
        assert_eq!(RetryPolicy::Drop.backoff(2), Duration::ZERO);
    }
}
