//! Configuration for the `tile-canvas` command-line renderer.
//!
//! Options come from command-line arguments via clap, fall back to
//! environment variables with the `TILE_CANVAS_` prefix, and otherwise use
//! the defaults below.
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use tile_canvas::config::Config;
//!
//! let config = Config::parse();
//! config.validate()?;
//! println!("Rendering zoom {} at {},{}", config.zoom, config.lat, config.lon);
//! ```
//!
//! # Environment Variables
//!
//! - `TILE_CANVAS_URL` - Tile URL template with `{z}`, `{x}` and `{y}`
//! - `TILE_CANVAS_ZOOM` - Zoom level, fractional allowed (default: 2)
//! - `TILE_CANVAS_LAT` / `TILE_CANVAS_LON` - Centre of the view (default: 0,0)
//! - `TILE_CANVAS_WIDTH` / `TILE_CANVAS_HEIGHT` - Surface size (default: 800x600)
//! - `TILE_CANVAS_CACHE_TEXTURES` - Max cached textures (default: 150)
//! - `TILE_CANVAS_TILE_SIZE` - Tile size in pixels (default: 256)
//! - `TILE_CANVAS_REFRESH_HZ` - Frame loop refresh rate (default: 60)
//! - `TILE_CANVAS_TIMEOUT` - Seconds to wait for tiles (default: 30)
//! - `TILE_CANVAS_OUTPUT` - PNG file to write (default: map.png)
//! - `TILE_CANVAS_USER_AGENT` - User-Agent sent to the tile server

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::fetch::DEFAULT_USER_AGENT;
use crate::render::RendererOptions;
use crate::texture::{DEFAULT_TEXTURE_CACHE_CAPACITY, DEFAULT_TILE_WIDTH};
use crate::tile::MAX_ZOOM;

// =============================================================================
// Default Values
// =============================================================================

/// Default tile URL template (OpenStreetMap standard tiles).
pub const DEFAULT_TILE_URL: &str = "https://tile.openstreetmap.org/{z}/{x}/{y}.png";

/// Default zoom level.
pub const DEFAULT_ZOOM: f64 = 2.0;

/// Default surface width in pixels.
pub const DEFAULT_WIDTH: u32 = 800;

/// Default surface height in pixels.
pub const DEFAULT_HEIGHT: u32 = 600;

/// Default frame loop refresh rate in Hz.
pub const DEFAULT_REFRESH_HZ: u32 = 60;

/// Default time to wait for tiles, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default output path.
pub const DEFAULT_OUTPUT: &str = "map.png";

/// Largest accepted surface dimension.
pub const MAX_SURFACE_SIZE: u32 = 8192;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Tile Canvas - render slippy-map tiles to a PNG.
///
/// Fetches the tiles covering the requested view, uploads them as textures
/// and draws them through the headless backend.
#[derive(Parser, Debug, Clone)]
#[command(name = "tile-canvas")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // View Configuration
    // =========================================================================
    /// Tile URL template containing `{z}`, `{x}` and `{y}`.
    #[arg(long = "url", default_value = DEFAULT_TILE_URL, env = "TILE_CANVAS_URL")]
    pub tile_url: String,

    /// Zoom level. Fractional values scale the tiles of the level below.
    #[arg(short, long, default_value_t = DEFAULT_ZOOM, env = "TILE_CANVAS_ZOOM")]
    pub zoom: f64,

    /// Latitude of the view centre.
    #[arg(long, default_value_t = 0.0, env = "TILE_CANVAS_LAT", allow_negative_numbers = true)]
    pub lat: f64,

    /// Longitude of the view centre.
    #[arg(long, default_value_t = 0.0, env = "TILE_CANVAS_LON", allow_negative_numbers = true)]
    pub lon: f64,

    // =========================================================================
    // Surface Configuration
    // =========================================================================
    /// Surface width in pixels.
    #[arg(long, default_value_t = DEFAULT_WIDTH, env = "TILE_CANVAS_WIDTH")]
    pub width: u32,

    /// Surface height in pixels.
    #[arg(long, default_value_t = DEFAULT_HEIGHT, env = "TILE_CANVAS_HEIGHT")]
    pub height: u32,

    /// PNG file the final frame is written to.
    #[arg(short, long, default_value = DEFAULT_OUTPUT, env = "TILE_CANVAS_OUTPUT")]
    pub output: PathBuf,

    // =========================================================================
    // Renderer Configuration
    // =========================================================================
    /// Maximum number of textures to keep cached.
    #[arg(long, default_value_t = DEFAULT_TEXTURE_CACHE_CAPACITY, env = "TILE_CANVAS_CACHE_TEXTURES")]
    pub cache_textures: usize,

    /// Tile size in pixels, also the placeholder size.
    #[arg(long, default_value_t = DEFAULT_TILE_WIDTH, env = "TILE_CANVAS_TILE_SIZE")]
    pub tile_size: u32,

    /// Frame loop refresh rate in Hz.
    #[arg(long, default_value_t = DEFAULT_REFRESH_HZ, env = "TILE_CANVAS_REFRESH_HZ")]
    pub refresh_hz: u32,

    // =========================================================================
    // Fetch Configuration
    // =========================================================================
    /// Seconds to wait for all tiles before writing what has loaded.
    #[arg(long = "timeout", default_value_t = DEFAULT_TIMEOUT_SECS, env = "TILE_CANVAS_TIMEOUT")]
    pub timeout_secs: u64,

    /// User-Agent header sent to the tile server.
    #[arg(long, default_value = DEFAULT_USER_AGENT, env = "TILE_CANVAS_USER_AGENT")]
    pub user_agent: String,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        for placeholder in ["{z}", "{x}", "{y}"] {
            if !self.tile_url.contains(placeholder) {
                return Err(format!(
                    "Tile URL template must contain {placeholder}. Set --url or TILE_CANVAS_URL"
                ));
            }
        }

        if !self.zoom.is_finite() || self.zoom < 0.0 || self.zoom > MAX_ZOOM as f64 {
            return Err(format!("zoom must be between 0 and {MAX_ZOOM}"));
        }

        if !(-90.0..=90.0).contains(&self.lat) {
            return Err("lat must be between -90 and 90".to_string());
        }
        if !(-180.0..=180.0).contains(&self.lon) {
            return Err("lon must be between -180 and 180".to_string());
        }

        if self.width == 0 || self.height == 0 {
            return Err("width and height must be greater than 0".to_string());
        }
        if self.width > MAX_SURFACE_SIZE || self.height > MAX_SURFACE_SIZE {
            return Err(format!("width and height must be at most {MAX_SURFACE_SIZE}"));
        }

        if self.cache_textures == 0 {
            return Err("cache_textures must be greater than 0".to_string());
        }
        if self.tile_size == 0 {
            return Err("tile_size must be greater than 0".to_string());
        }
        if self.refresh_hz == 0 {
            return Err("refresh_hz must be greater than 0".to_string());
        }
        if self.timeout_secs == 0 {
            return Err("timeout must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Renderer options derived from the cache and tile settings.
    pub fn renderer_options(&self) -> RendererOptions {
        RendererOptions::default()
            .with_cache_capacity(self.cache_textures)
            .with_tile_size(self.tile_size, self.tile_size)
    }

    /// Interval between frame loop refreshes.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.refresh_hz.max(1) as f64)
    }

    /// How long to wait for tiles.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// =============================================================================
// Tests
// =============================================================================
