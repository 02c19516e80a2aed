use async_trait::async_trait;

use crate::core::config::FetchConfig;
use crate::{MapError, Result};

/// The network seam of the fetcher: turns a tile URL into bytes.
#[async_trait]
pub trait TileLoader: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Fetches tiles over HTTP with a shared connection pool
#[derive(Debug, Clone)]
pub struct HttpTileLoader {
    client: reqwest::Client,
}

impl HttpTileLoader {
    /// Builds the client once. Tile servers reject requests without a user
    /// agent, so one is always sent.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout())
            .tcp_keepalive(std::time::Duration::from_secs(30))
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl TileLoader for HttpTileLoader {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(MapError::Network(format!(
                "HTTP {} for {}",
                response.status(),
                url
            )));
        }

        let data = response.bytes().await?.to_vec();
        if data.is_empty() {
            return Err(MapError::Network(format!("empty body for {}", url)));
        }
        Ok(data)
    }
}
