//! Tile Canvas - render slippy-map tiles to a PNG.
//!
//! This binary fetches the tiles covering a view, drives the frame loop while
//! they load, and writes the final frame to disk.

use std::collections::HashSet;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::{broadcast, oneshot};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tile_canvas::{
    config::Config, GridTileSource, HeadlessBackend, HttpImageFetcher, LoadEvent, LoadState,
    TileRenderer, TileSource,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    // Initialize logging
    init_logging(config.verbose);

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    run(config).await
}

async fn run(config: Config) -> ExitCode {
    info!("Configuration:");
    info!("  Tiles: {}", config.tile_url);
    info!("  View: zoom {} at {}, {}", config.zoom, config.lat, config.lon);
    info!("  Surface: {}x{}", config.width, config.height);
    info!("  Cache: {} textures", config.cache_textures);

    let backend = Arc::new(HeadlessBackend::new(config.width, config.height));

    let fetcher = match HttpImageFetcher::with_settings(&config.user_agent, config.timeout()) {
        Ok(fetcher) => Arc::new(fetcher),
        Err(e) => {
            error!("Failed to create HTTP client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let renderer = match TileRenderer::new(
        backend.clone(),
        fetcher,
        tokio::runtime::Handle::current(),
        config.renderer_options(),
    ) {
        Ok(renderer) => Arc::new(renderer),
        Err(e) => {
            error!("Failed to create renderer: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let source = GridTileSource::from_lat_lon(
        config.tile_url.as_str(),
        config.zoom,
        config.lat,
        config.lon,
        config.tile_size,
    );
    let tiles = source.visible_tiles(renderer.viewport());
    if tiles.is_empty() {
        warn!("No tiles cover the requested view");
    }

    // Subscribe before the first fetch can complete
    let mut events = renderer.subscribe();
    let summary = renderer.render_tiles(source.zoom(), &tiles);
    info!(
        "Requested {} tile(s) at level {} (scale {:.3})",
        summary.fetched,
        source.zoom(),
        source.scale()
    );

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let frame_loop = {
        let renderer = renderer.clone();
        let refresh = config.refresh_interval();
        tokio::spawn(async move {
            renderer
                .run(refresh, async move {
                    let _ = stop_rx.await;
                })
                .await;
        })
    };

    // Only tiles that made it into the draw list will report an outcome;
    // evicted or unallocated ones never load
    let expected: HashSet<String> = renderer
        .draw_list()
        .iter()
        .map(|item| item.url().to_string())
        .collect();
    if expected.len() < tiles.len() {
        warn!(
            "Drawing {} of {} visible tile(s); raise --cache-textures to draw them all",
            expected.len(),
            tiles.len()
        );
    }

    let outcome = tokio::time::timeout(
        config.timeout(),
        wait_for_tiles(&mut events, expected.clone()),
    )
    .await;
    let (loaded, failed) = match outcome {
        Ok(counts) => counts,
        Err(_) => {
            warn!("Timed out after {}s waiting for tiles", config.timeout_secs);
            let loaded = expected
                .iter()
                .filter(|url| renderer.texture_state(url) == Some(LoadState::Loaded))
                .count();
            (loaded, expected.len().saturating_sub(loaded))
        }
    };

    let _ = stop_tx.send(());
    if let Err(e) = frame_loop.await {
        error!("Frame loop panicked: {}", e);
        return ExitCode::FAILURE;
    }

    // Draw whatever has arrived, even if no load requested a frame since the
    // loop stopped
    renderer.scheduler().request_frame();
    if let Some(stats) = renderer.render_frame() {
        info!("Drew {} tile(s), {} skipped", stats.drawn, stats.skipped);
    }

    if let Err(e) = backend.save_png(&config.output) {
        error!("Failed to write {}: {}", config.output.display(), e);
        return ExitCode::FAILURE;
    }
    info!(
        "Wrote {} ({} loaded, {} failed)",
        config.output.display(),
        loaded,
        failed
    );

    renderer.clear();

    if loaded == 0 && !expected.is_empty() {
        error!("No tiles could be loaded");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// Wait until every expected URL has loaded or failed.
///
/// Returns the number of loaded and failed tiles.
async fn wait_for_tiles(
    events: &mut broadcast::Receiver<LoadEvent>,
    mut expected: HashSet<String>,
) -> (usize, usize) {
    let (mut loaded, mut failed) = (0, 0);
    while !expected.is_empty() {
        match events.recv().await {
            Ok(event) => {
                if !expected.remove(event.url()) {
                    continue;
                }
                match event {
                    LoadEvent::Loaded { .. } => loaded += 1,
                    LoadEvent::Failed { url, error } => {
                        warn!("  {} failed: {}", url, error);
                        failed += 1;
                    }
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Missed {} load event(s)", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    (loaded, failed)
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tile_canvas=debug"
    } else {
        "tile_canvas=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
