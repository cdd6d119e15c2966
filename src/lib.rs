//! # Tile Canvas
//!
//! A map tile renderer with an asynchronously loaded, bounded texture cache.
//!
//! Hosts tell the renderer which tiles are visible; it reconciles that set
//! against what is cached, fetches missing imagery in the background, cancels
//! loads that scrolled out of view, and coalesces every redraw request into a
//! single draw pass per display frame.
//!
//! ## Features
//!
//! - **Bounded texture cache**: at most one GPU texture per tile URL, LRU eviction
//! - **Race-free loading**: each texture's load state is guarded by its own lock,
//!   so completions racing cancellations resolve to exactly one outcome
//! - **Frame coalescing**: any number of updates between refreshes draw once
//! - **Headless backend**: a software rasterizer for tests and PNG output
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`texture`] - Texture resources, the LRU cache and the async loader
//! - [`render`] - Draw list reconciliation, frame scheduling and drawing
//! - [`gfx`] - Graphics backend trait and the headless implementation
//! - [`fetch`] - Image fetcher trait and the HTTP implementation
//! - [`tile`] - Tile descriptions and the slippy-map tile source
//! - [`config`] - CLI configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tile_canvas::{
//!     GridTileSource, HeadlessBackend, HttpImageFetcher, RendererOptions, TileRenderer,
//!     TileSource,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = Arc::new(HeadlessBackend::new(800, 600));
//!     let renderer = TileRenderer::new(
//!         backend.clone(),
//!         Arc::new(HttpImageFetcher::new()?),
//!         tokio::runtime::Handle::current(),
//!         RendererOptions::default(),
//!     )?;
//!
//!     let source = GridTileSource::from_lat_lon(
//!         "https://tile.openstreetmap.org/{z}/{x}/{y}.png",
//!         3.0,
//!         51.5,
//!         -0.12,
//!         256,
//!     );
//!     renderer.render_tiles(source.zoom(), &source.visible_tiles(renderer.viewport()));
//!     renderer.render_frame();
//!
//!     backend.save_png("map.png")?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod fetch;
pub mod gfx;
pub mod render;
pub mod texture;
pub mod tile;

// Re-export commonly used types
pub use config::Config;
pub use error::{BackendError, ConfigError, FetchError, LoadError};
pub use fetch::{DecodedImage, HttpImageFetcher, ImageFetcher};
pub use gfx::{GraphicsBackend, HeadlessBackend, TextureHandle};
pub use render::{
    DrawItem, FrameStats, Reconciliation, RenderScheduler, RendererOptions, TileRenderer,
    DEFAULT_REFRESH_INTERVAL,
};
pub use texture::{
    LoadEvent, LoadState, TextureCache, TextureResource, DEFAULT_TEXTURE_CACHE_CAPACITY,
};
pub use tile::{GridTileSource, Tile, TileSet, TileSource};
