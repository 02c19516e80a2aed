use anyhow::Context;
use tileview::{FetchEvent, TileFetch, TileView, TileViewConfig};

/// Usage: `tileview-app [config.json] [--drain]`
///
/// Evaluates one frame of the configured view against the disk cache. With
/// `--drain` every missing tile is downloaded before the cache statistics are
/// printed.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut config_path = None;
    let mut drain = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--drain" => drain = true,
            "-h" | "--help" => {
                println!("usage: tileview-app [config.json] [--drain]");
                return Ok(());
            }
            _ => config_path = Some(arg),
        }
    }

    let config = match &config_path {
        Some(path) => TileViewConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path))?,
        None => TileViewConfig::default(),
    };

    let mut view = TileView::with_http(config).context("failed to build tile view")?;
    log::info!(
        "servers: {}; cache at {}",
        view.server_names().join(", "),
        view.cache_root().display()
    );

    let tiles = view.frame()?;
    let hits = tiles.iter().filter(|t| t.fetch.is_hit()).count();
    for tile in tiles.iter().filter(|t| t.fetch == TileFetch::Pending) {
        log::debug!("pending {} at ({}, {})", tile.coord, tile.x, tile.y);
    }
    log::info!("frame: {} tiles, {} cached", tiles.len(), hits);

    if drain {
        let events = view.drain().await;
        let stored = events
            .iter()
            .filter(|e| matches!(e, FetchEvent::Stored { .. }))
            .count();
        log::info!("downloaded {} of {} requested tiles", stored, events.len());
    }

    println!("{}", serde_json::to_string_pretty(&view.cache_stats())?);
    Ok(())
}
