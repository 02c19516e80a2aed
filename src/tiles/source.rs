use serde::{Deserialize, Serialize};

use crate::core::geo::TileCoord;
use crate::{MapError, Result};

/// Trait representing anything that can produce tile URLs for a given coordinate.
pub trait TileSource: Send + Sync {
    /// Build a URL for the requested `coord`. The column is already wrapped.
    fn url(&self, coord: TileCoord) -> String;
}

/// A tile server addressed through a URL template.
///
/// The template understands `{z}`, `{x}`, `{y}` and `{format}`. `name` doubles
/// as the provider's directory under the cache root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileProvider {
    pub name: String,
    pub url_template: String,
    /// File extension of the tiles, without the dot
    pub format: String,
}

impl TileProvider {
    pub fn new(
        name: impl Into<String>,
        url_template: impl Into<String>,
        format: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            url_template: url_template.into(),
            format: format.into(),
        }
    }

    /// The default OpenStreetMap tile server
    pub fn openstreetmap() -> Self {
        Self::new(
            "osm",
            "http://tile.openstreetmap.org/{z}/{x}/{y}.{format}",
            "png",
        )
    }

    pub fn validate(&self) -> Result<()> {
        let safe_name = !self.name.is_empty()
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !safe_name {
            return Err(MapError::InvalidConfig(format!(
                "provider name {:?} must be a non-empty [A-Za-z0-9_-] directory name",
                self.name
            )));
        }
        if self.format.is_empty() || self.format.contains(|c| matches!(c, '.' | '/' | '\\')) {
            return Err(MapError::InvalidConfig(format!(
                "provider {} has invalid tile format {:?}",
                self.name, self.format
            )));
        }
        for placeholder in ["{z}", "{x}", "{y}"] {
            if !self.url_template.contains(placeholder) {
                return Err(MapError::InvalidConfig(format!(
                    "provider {} url template lacks {placeholder}",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

impl TileSource for TileProvider {
    fn url(&self, coord: TileCoord) -> String {
        self.url_template
            .replace("{z}", &coord.z.to_string())
            .replace("{x}", &coord.x.to_string())
            .replace("{y}", &coord.y.to_string())
            .replace("{format}", &self.format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openstreetmap_url() {
        let osm = TileProvider::openstreetmap();
        assert_eq!(
            osm.url(TileCoord::new(7, 72, 35)),
            "http://tile.openstreetmap.org/7/72/35.png"
        );
    }

    #[test]
    fn test_url_uses_wrapped_column() {
        let osm = TileProvider::openstreetmap();
        let coord = TileCoord::wrapped(3, -1, 2).unwrap();
        assert_eq!(osm.url(coord), "http://tile.openstreetmap.org/3/7/2.png");
    }

    #[test]
    fn test_validate() {
        assert!(TileProvider::openstreetmap().validate().is_ok());
        assert!(TileProvider::new("../up", "http://h/{z}/{x}/{y}.png", "png")
            .validate()
            .is_err());
        assert!(TileProvider::new("sat", "http://h/{z}/{y}.png", "png")
            .validate()
            .is_err());
        assert!(TileProvider::new("sat", "http://h/{z}/{x}/{y}", ".png")
            .validate()
            .is_err());
    }
}
