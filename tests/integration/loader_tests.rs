//! Texture loading and cache integration tests.
//!
//! Tests verify:
//! - Tiles that leave the view mid-load are cancelled and fetched afresh later
//! - Concurrent updates never create two textures for one URL
//! - The cache stays bounded and releases the textures it evicts
//! - Failed loads are reported and can be retried

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tile_canvas::error::{FetchError, LoadError};
use tile_canvas::tile::tile_set;
use tile_canvas::{LoadEvent, LoadState, RendererOptions, Tile, TileSet};

use super::test_utils::{
    headless_renderer, next_events, solid_image, wait_for_fetches, wait_for_state, MockFetcher,
    GREEN, RED,
};

fn tiles(urls: &[&str]) -> TileSet {
    tile_set(urls.iter().map(|url| Tile::new(*url, 1, 0.0, 0.0)))
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stale_tile_is_cancelled_and_refetched() {
    let fetcher = Arc::new(MockFetcher::gated().with_image("a", solid_image(8, 8, RED)));
    let (backend, renderer) =
        headless_renderer(64, 64, fetcher.clone(), RendererOptions::default());

    renderer.render_tiles(1, &tiles(&["a"]));
    wait_for_fetches(&fetcher, 1).await;

    // "a" scrolls out of view while its fetch is blocked
    let summary = renderer.render_tiles(1, &tiles(&["b"]));
    assert_eq!(summary.cancelled, 1);
    assert_eq!(renderer.texture_state("a"), None);
    assert_eq!(renderer.cached_textures(), 1);
    assert_eq!(backend.live_textures(), 1);

    // Coming back starts a second fetch instead of reviving the cancelled one
    let summary = renderer.render_tiles(1, &tiles(&["a"]));
    assert_eq!(summary.fetched, 1);
    assert_eq!(renderer.texture_state("a"), Some(LoadState::Pending));
    wait_for_fetches(&fetcher, 3).await;
    assert_eq!(fetcher.fetch_count("a"), 2);

    fetcher.open("a");
    wait_for_state(&renderer, "a", LoadState::Loaded).await;
}

#[tokio::test]
async fn test_loaded_stale_tile_is_kept() {
    let fetcher = Arc::new(MockFetcher::new().with_image("a", solid_image(8, 8, RED)));
    let (_backend, renderer) =
        headless_renderer(64, 64, fetcher.clone(), RendererOptions::default());

    renderer.render_tiles(1, &tiles(&["a"]));
    wait_for_state(&renderer, "a", LoadState::Loaded).await;

    let summary = renderer.render_tiles(1, &tiles(&["b"]));
    assert_eq!(summary.cancelled, 0);
    assert_eq!(renderer.texture_state("a"), Some(LoadState::Loaded));

    // Returning to a loaded tile is a cache hit
    let summary = renderer.render_tiles(1, &tiles(&["a"]));
    assert_eq!(summary.fetched, 0);
    assert_eq!(fetcher.fetch_count("a"), 1);
}

// =============================================================================
// At Most One Texture per URL
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_updates_share_one_texture() {
    let fetcher = Arc::new(MockFetcher::gated());
    let (backend, renderer) =
        headless_renderer(64, 64, fetcher.clone(), RendererOptions::default());
    let visible = tiles(&["shared"]);

    let fetched: usize = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| renderer.render_tiles(1, &visible).fetched))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).sum()
    });

    assert_eq!(fetched, 1);
    assert_eq!(renderer.cached_textures(), 1);
    assert_eq!(backend.live_textures(), 1);

    wait_for_fetches(&fetcher, 1).await;
    assert_eq!(fetcher.fetch_count("shared"), 1);

    let draw_list = renderer.draw_list();
    assert_eq!(draw_list.len(), 1);
    assert_eq!(draw_list[0].url(), "shared");
}

// =============================================================================
// Cache Bounds
// =============================================================================

#[tokio::test]
async fn test_cache_evicts_least_recently_used() {
    let fetcher = Arc::new(
        MockFetcher::new()
            .with_image("a", solid_image(4, 4, RED))
            .with_image("b", solid_image(4, 4, RED))
            .with_image("c", solid_image(4, 4, GREEN)),
    );
    let options = RendererOptions::default().with_cache_capacity(2);
    let (backend, renderer) = headless_renderer(64, 64, fetcher, options);

    renderer.render_tiles(1, &tiles(&["a", "b"]));
    wait_for_state(&renderer, "a", LoadState::Loaded).await;
    wait_for_state(&renderer, "b", LoadState::Loaded).await;

    // Touch "a" so "b" becomes the eviction victim
    renderer.render_tiles(1, &tiles(&["a"]));
    let summary = renderer.render_tiles(1, &tiles(&["a", "c"]));

    assert_eq!(summary.evicted, 1);
    assert_eq!(renderer.cached_textures(), 2);
    assert_eq!(renderer.texture_state("b"), None);
    assert!(renderer.texture_state("a").is_some());
    assert!(renderer.texture_state("c").is_some());
    assert_eq!(backend.live_textures(), 2);
}

#[tokio::test]
async fn test_cache_never_exceeds_capacity() {
    let fetcher = Arc::new(MockFetcher::gated());
    let options = RendererOptions::default().with_cache_capacity(4);
    let (backend, renderer) = headless_renderer(64, 64, fetcher, options);

    for batch in 0..5 {
        let urls: Vec<String> = (0..3).map(|i| format!("b{batch}/t{i}")).collect();
        let visible = tile_set(urls.iter().map(|url| Tile::new(url.as_str(), 1, 0.0, 0.0)));
        renderer.render_tiles(1, &visible);

        assert!(renderer.cached_textures() <= 4);
        assert_eq!(backend.live_textures(), renderer.cached_textures());
    }
}

#[tokio::test]
async fn test_more_visible_tiles_than_capacity() {
    let fetcher = Arc::new(MockFetcher::gated());
    let options = RendererOptions::default().with_cache_capacity(3);
    let (backend, renderer) = headless_renderer(64, 64, fetcher, options);

    let urls: Vec<String> = (0..5).map(|i| format!("t{i}")).collect();
    let visible = tile_set(urls.iter().map(|url| Tile::new(url.as_str(), 1, 0.0, 0.0)));
    let summary = renderer.render_tiles(1, &visible);

    assert_eq!(summary.fetched, 5);
    assert_eq!(summary.evicted, 2);
    assert_eq!(summary.drawn, 3);
    assert_eq!(backend.live_textures(), 3);

    // Nothing in the draw list points at a released texture
    let stats = renderer.render_frame().unwrap();
    assert_eq!(stats.drawn, 3);
    assert_eq!(stats.skipped, 0);
}

#[tokio::test]
async fn test_only_drawn_tiles_report_outcomes() {
    let fetcher = Arc::new(
        MockFetcher::new()
            .with_image("t0", solid_image(4, 4, RED))
            .with_image("t1", solid_image(4, 4, RED))
            .with_image("t2", solid_image(4, 4, RED)),
    );
    let options = RendererOptions::default().with_cache_capacity(2);
    let (_backend, renderer) = headless_renderer(64, 64, fetcher, options);
    let mut events = renderer.subscribe();

    renderer.render_tiles(1, &tiles(&["t0", "t1", "t2"]));
    let drawn: HashSet<String> = renderer
        .draw_list()
        .iter()
        .map(|item| item.url().to_string())
        .collect();
    assert_eq!(drawn.len(), 2);

    // The evicted tile was cancelled and never reports
    let reported: HashSet<String> = next_events(&mut events, 2)
        .await
        .iter()
        .map(|event| event.url().to_string())
        .collect();
    assert_eq!(reported, drawn);
    assert!(
        tokio::time::timeout(Duration::from_millis(100), events.recv())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_clear_and_drop_release_textures() {
    let fetcher = Arc::new(MockFetcher::gated());
    let (backend, renderer) = headless_renderer(64, 64, fetcher, RendererOptions::default());

    renderer.render_tiles(1, &tiles(&["a", "b", "c"]));
    assert_eq!(backend.live_textures(), 3);

    renderer.clear();
    assert_eq!(renderer.cached_textures(), 0);
    assert!(renderer.draw_list().is_empty());
    assert_eq!(backend.live_textures(), 0);

    renderer.render_tiles(1, &tiles(&["d"]));
    assert_eq!(backend.live_textures(), 1);
    drop(renderer);
    assert_eq!(backend.live_textures(), 0);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_failed_load_is_reported_and_retried() {
    let fetcher = Arc::new(MockFetcher::new().with_error(
        "bad",
        FetchError::Http {
            status: 500,
            url: "bad".to_string(),
        },
    ));
    let (_backend, renderer) =
        headless_renderer(64, 64, fetcher.clone(), RendererOptions::default());
    let mut events = renderer.subscribe();

    renderer.render_tiles(1, &tiles(&["bad"]));
    match next_events(&mut events, 1).await.remove(0) {
        LoadEvent::Failed { url, error } => {
            assert_eq!(&*url, "bad");
            assert!(matches!(
                error,
                LoadError::Fetch(FetchError::Http { status: 500, .. })
            ));
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(renderer.texture_state("bad"), Some(LoadState::Failed));
    assert!(renderer.load_failure("bad").is_some());

    // A failed texture stays cached until retried
    let summary = renderer.render_tiles(1, &tiles(&["bad"]));
    assert_eq!(summary.fetched, 0);

    fetcher.set_image("bad", solid_image(4, 4, RED));
    assert_eq!(renderer.retry_failed(), 1);
    assert_eq!(renderer.texture_state("bad"), None);

    let summary = renderer.render_tiles(1, &tiles(&["bad"]));
    assert_eq!(summary.fetched, 1);
    wait_for_state(&renderer, "bad", LoadState::Loaded).await;
    assert_eq!(fetcher.fetch_count("bad"), 2);
    assert!(renderer.load_failure("bad").is_none());
}

#[tokio::test]
async fn test_retry_without_failures_is_noop() {
    let fetcher = Arc::new(MockFetcher::gated());
    let (_backend, renderer) = headless_renderer(64, 64, fetcher, RendererOptions::default());

    renderer.render_tiles(1, &tiles(&["a"]));
    assert_eq!(renderer.retry_failed(), 0);
    assert_eq!(renderer.cached_textures(), 1);
}
