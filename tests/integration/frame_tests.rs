//! Frame scheduling integration tests.
//!
//! Tests verify:
//! - Many tile updates between refreshes produce a single draw pass
//! - The pass draws the most recent draw list
//! - Completed loads request a frame, and bursts of them coalesce
//! - The frame loop serves requests and stops on shutdown

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use tile_canvas::tile::tile_set;
use tile_canvas::{RendererOptions, Tile};

use super::test_utils::{headless_renderer, next_events, solid_image, MockFetcher, GREEN, RED};

// =============================================================================
// Coalescing
// =============================================================================

#[tokio::test]
async fn test_updates_coalesce_into_one_pass() {
    let fetcher = Arc::new(MockFetcher::gated());
    let (backend, renderer) = headless_renderer(64, 64, fetcher, RendererOptions::default());

    for url in ["a", "b", "c"] {
        renderer.render_tiles(1, &tile_set([Tile::new(url, 1, 0.0, 0.0)]));
    }
    assert_eq!(renderer.scheduler().frames_requested(), 1);

    let stats = renderer.render_frame().expect("one frame should be pending");
    assert_eq!(stats.drawn, 1);
    assert!(renderer.render_frame().is_none());
    assert_eq!(backend.clear_count(), 1);

    // The pass drew the last list, not the first
    let calls = backend.draw_calls();
    assert_eq!(calls.len(), 1);
    let latest = renderer.draw_list();
    assert_eq!(latest[0].url(), "c");
    assert_eq!(calls[0].texture, Some(latest[0].texture.texture()));
}

#[tokio::test]
async fn test_update_after_frame_schedules_another() {
    let fetcher = Arc::new(MockFetcher::gated());
    let (backend, renderer) = headless_renderer(64, 64, fetcher, RendererOptions::default());
    let visible = tile_set([Tile::new("a", 1, 0.0, 0.0)]);

    renderer.render_tiles(1, &visible);
    renderer.render_frame().unwrap();
    renderer.render_tiles(1, &visible);
    renderer.render_frame().unwrap();

    assert_eq!(renderer.scheduler().frames_requested(), 2);
    assert_eq!(renderer.scheduler().frames_fired(), 2);
    assert_eq!(backend.clear_count(), 2);

    // The backend only keeps the latest pass
    assert_eq!(backend.draw_calls().len(), 1);
}

#[tokio::test]
async fn test_load_completions_request_one_frame() {
    let fetcher = Arc::new(
        MockFetcher::gated()
            .with_image("a", solid_image(4, 4, RED))
            .with_image("b", solid_image(4, 4, GREEN))
            .with_image("c", solid_image(4, 4, RED)),
    );
    let (_backend, renderer) =
        headless_renderer(64, 64, fetcher.clone(), RendererOptions::default());
    let mut events = renderer.subscribe();

    renderer.render_tiles(
        1,
        &tile_set(["a", "b", "c"].map(|url| Tile::new(url, 1, 0.0, 0.0))),
    );
    renderer.render_frame().unwrap();
    assert!(!renderer.scheduler().is_frame_pending());

    for url in ["a", "b", "c"] {
        fetcher.open(url);
    }
    next_events(&mut events, 3).await;

    // Three loads, one pending frame
    assert!(renderer.scheduler().is_frame_pending());
    assert_eq!(renderer.scheduler().frames_requested(), 2);
    let stats = renderer.render_frame().unwrap();
    assert_eq!(stats.drawn, 3);
}

#[tokio::test]
async fn test_failed_load_does_not_request_frame() {
    let fetcher = Arc::new(MockFetcher::new());
    let (_backend, renderer) = headless_renderer(64, 64, fetcher, RendererOptions::default());
    let mut events = renderer.subscribe();

    renderer.render_tiles(1, &tile_set([Tile::new("missing", 1, 0.0, 0.0)]));
    renderer.render_frame().unwrap();

    next_events(&mut events, 1).await;
    assert!(!renderer.scheduler().is_frame_pending());
}

// =============================================================================
// Frame Loop
// =============================================================================

#[tokio::test]
async fn test_frame_loop_draws_coalesced_requests() {
    let fetcher = Arc::new(MockFetcher::gated());
    let (backend, renderer) = headless_renderer(64, 64, fetcher, RendererOptions::default());
    let renderer = Arc::new(renderer);

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let frame_loop = {
        let renderer = renderer.clone();
        tokio::spawn(async move {
            renderer
                .run(Duration::from_millis(10), async move {
                    let _ = stop_rx.await;
                })
                .await;
        })
    };

    // A burst with no yield in between
    for i in 0..10 {
        renderer.render_tiles(1, &tile_set([Tile::new(format!("t{i}"), 1, 0.0, 0.0)]));
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(renderer.scheduler().frames_fired(), 1);
    assert_eq!(backend.clear_count(), 1);
    assert_eq!(backend.draw_calls().len(), 1);
    assert_eq!(
        backend.draw_calls()[0].texture,
        Some(renderer.draw_list()[0].texture.texture())
    );

    renderer.render_tiles(1, &tile_set([Tile::new("t9", 1, 0.0, 0.0)]));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(renderer.scheduler().frames_fired(), 2);

    stop_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(1), frame_loop)
        .await
        .expect("frame loop should stop")
        .unwrap();
}
