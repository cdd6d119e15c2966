//! The tile renderer facade.
//!
//! `TileRenderer` wires the pieces together:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        TileRenderer                          │
//! │                                                              │
//! │  render_tiles() ──► DrawListBuilder ──► RenderScheduler      │
//! │                     │        │               ▲               │
//! │                     ▼        ▼               │ load done     │
//! │              TextureCache  AsyncLoader ──────┘               │
//! │                                                              │
//! │  run() / render_frame() ──► snapshot ──► Renderer ──► GPU    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Hosts either call [`TileRenderer::render_frame`] from their own display
//! callback or let [`TileRenderer::run`] drive frames at a fixed refresh
//! interval.
//!
//! Frames run under their own lock, separate from the draw list. A
//! reconciliation that lands while a frame is drawing only retires the
//! textures it drops; they are deleted after that frame finishes.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::error::{ConfigError, LoadError};
use crate::fetch::ImageFetcher;
use crate::gfx::GraphicsBackend;
use crate::texture::{
    AsyncLoader, LoadEvent, LoadState, Placeholder, TextureCache, DEFAULT_TEXTURE_CACHE_CAPACITY,
    DEFAULT_TILE_HEIGHT, DEFAULT_TILE_WIDTH,
};
use crate::tile::TileSet;

use super::draw_list::{DrawItem, DrawListBuilder, Reconciliation};
use super::renderer::{FrameStats, Renderer};
use super::scheduler::RenderScheduler;

/// Capacity of the load event broadcast channel.
const LOAD_EVENT_CAPACITY: usize = 256;

/// Default display refresh interval (60 Hz).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_micros(16_667);

// =============================================================================
// Options
// =============================================================================

/// Construction parameters for [`TileRenderer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RendererOptions {
    /// Maximum number of cached textures
    pub cache_capacity: usize,

    /// Placeholder tile width in pixels
    pub tile_width: u32,

    /// Placeholder tile height in pixels
    pub tile_height: u32,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_TEXTURE_CACHE_CAPACITY,
            tile_width: DEFAULT_TILE_WIDTH,
            tile_height: DEFAULT_TILE_HEIGHT,
        }
    }
}

impl RendererOptions {
    /// Set the cache capacity.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Set the placeholder tile size.
    pub fn with_tile_size(mut self, width: u32, height: u32) -> Self {
        self.tile_width = width;
        self.tile_height = height;
        self
    }
}

// =============================================================================
// TileRenderer
// =============================================================================

/// Renders map tiles with an asynchronously loaded texture cache.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use tile_canvas::{HeadlessBackend, HttpImageFetcher, RendererOptions, Tile, TileRenderer};
///
/// let renderer = TileRenderer::new(
///     Arc::new(HeadlessBackend::new(800, 600)),
///     Arc::new(HttpImageFetcher::new()?),
///     tokio::runtime::Handle::current(),
///     RendererOptions::default(),
/// )?;
///
/// let tiles = tile_canvas::tile::tile_set([Tile::new("https://tiles.example/1/0/0.png", 1, 0.0, 0.0)]);
/// renderer.render_tiles(1, &tiles);
///
/// // Fire the pending frame from a display callback
/// renderer.render_frame();
/// ```
pub struct TileRenderer {
    renderer: Renderer,
    loader: AsyncLoader,
    scheduler: Arc<RenderScheduler>,
    state: Mutex<DrawListBuilder>,
    frame: Mutex<()>,
    events: broadcast::Sender<LoadEvent>,
}

impl TileRenderer {
    /// Create a renderer.
    ///
    /// Fetch tasks are spawned on `runtime`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache capacity or tile size is zero, or if the
    /// backend cannot build the draw pipeline.
    pub fn new(
        backend: Arc<dyn GraphicsBackend>,
        fetcher: Arc<dyn ImageFetcher>,
        runtime: Handle,
        options: RendererOptions,
    ) -> Result<Self, ConfigError> {
        let cache = TextureCache::with_capacity(options.cache_capacity)?;
        let placeholder = Placeholder::new(options.tile_width, options.tile_height)?;
        let renderer = Renderer::new(backend.clone())?;

        let scheduler = Arc::new(RenderScheduler::new());
        let (events, _) = broadcast::channel(LOAD_EVENT_CAPACITY);
        let loader = AsyncLoader::new(
            backend,
            fetcher,
            runtime,
            placeholder,
            scheduler.clone(),
            events.clone(),
        );

        Ok(Self {
            renderer,
            loader,
            scheduler,
            state: Mutex::new(DrawListBuilder::new(cache)),
            frame: Mutex::new(()),
            events,
        })
    }

    fn state(&self) -> MutexGuard<'_, DrawListBuilder> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Delete retired textures unless a frame is drawing; that frame deletes
    /// them when it finishes.
    fn delete_retired(&self) {
        let _frame = match self.frame.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
            Err(TryLockError::WouldBlock) => return,
        };
        self.loader.delete_retired();
    }

    /// Make `tiles` the visible set and schedule a redraw at `zoom`.
    ///
    /// Only tiles whose zoom equals `zoom` are drawn; the others are still
    /// loaded so a zoom change finds them cached.
    pub fn render_tiles(&self, zoom: u32, tiles: &TileSet) -> Reconciliation {
        let summary = self.state().reconcile(zoom, tiles, &self.loader);
        debug!(
            zoom,
            visible = tiles.len(),
            drawn = summary.drawn,
            fetched = summary.fetched,
            cancelled = summary.cancelled,
            evicted = summary.evicted,
            "reconciled tiles"
        );
        self.delete_retired();
        self.scheduler.request_frame();
        summary
    }

    /// Current drawable width and height.
    pub fn viewport(&self) -> (f64, f64) {
        self.renderer.viewport()
    }

    /// Fire the pending frame, if any.
    ///
    /// The draw list is snapshotted now, so the most recent reconciliation
    /// wins regardless of when the frame was requested. Returns `None` when
    /// no frame was pending.
    ///
    /// Textures dropped by a reconciliation during the draw stay alive until
    /// the draw returns.
    pub fn render_frame(&self) -> Option<FrameStats> {
        let _frame = self.frame.lock().unwrap_or_else(PoisonError::into_inner);
        self.loader.delete_retired();
        if !self.scheduler.take_frame() {
            return None;
        }
        let snapshot = self.state().snapshot();
        let stats = self.renderer.draw(&snapshot);
        self.loader.delete_retired();
        Some(stats)
    }

    /// Drive frames until `shutdown` completes.
    ///
    /// Each request is served on the next tick of a `refresh_interval`
    /// clock, standing in for the display refresh.
    pub async fn run<F>(&self, refresh_interval: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut refresh = tokio::time::interval(refresh_interval);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = self.scheduler.wait_for_request() => {
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = refresh.tick() => {}
                    }
                    if let Some(stats) = self.render_frame() {
                        debug!(drawn = stats.drawn, skipped = stats.skipped, "frame drawn");
                    }
                }
            }
        }
    }

    /// The frame scheduler.
    pub fn scheduler(&self) -> &Arc<RenderScheduler> {
        &self.scheduler
    }

    /// Subscribe to load outcomes.
    pub fn subscribe(&self) -> broadcast::Receiver<LoadEvent> {
        self.events.subscribe()
    }

    /// Load state of the cached texture for `url`.
    pub fn texture_state(&self, url: &str) -> Option<LoadState> {
        self.state().cache().peek(url).map(|resource| resource.state())
    }

    /// Why the cached texture for `url` failed, if it did.
    pub fn load_failure(&self, url: &str) -> Option<LoadError> {
        self.state()
            .cache()
            .peek(url)
            .and_then(|resource| resource.failure())
    }

    /// Number of cached textures.
    pub fn cached_textures(&self) -> usize {
        self.state().cache().len()
    }

    /// Copy of the current draw list.
    pub fn draw_list(&self) -> Vec<DrawItem> {
        self.state().snapshot()
    }

    /// Drop failed textures so the next `render_tiles` fetches them again.
    ///
    /// Returns the number of textures dropped.
    pub fn retry_failed(&self) -> usize {
        let dropped = self.state().retry_failed(&self.loader);
        self.delete_retired();
        if dropped > 0 {
            debug!(dropped, "dropped failed textures for retry");
        }
        dropped
    }

    /// Cancel every load and release every texture.
    pub fn clear(&self) {
        let released = self.state().clear(&self.loader);
        self.delete_retired();
        debug!(released, "cleared texture cache");
        self.scheduler.request_frame();
    }
}

impl Drop for TileRenderer {
    fn drop(&mut self) {
        let state = self
            .state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        state.clear(&self.loader);
        self.loader.delete_retired();
    }
}
