//! Tiles and tile sources.
//!
//! A [`TileSource`] decides which tiles should be visible and where they sit
//! relative to the viewport centre. The renderer only consumes its output, a
//! [`TileSet`] keyed by tile URL.
//!
//! [`GridTileSource`] is a ready-made source for XYZ ("slippy map") tile
//! servers in the Web Mercator projection.

mod grid;

use std::collections::HashMap;

pub use grid::{lat_lon_to_tile, GridTileSource, MAX_ZOOM};

/// A tile to display.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    /// Image URL, also the tile's identity
    pub url: String,

    /// Zoom level the tile belongs to
    pub zoom: u32,

    /// Horizontal offset from the viewport centre to the tile's top-left
    /// corner, subtracted from the centre when drawing
    pub dx: f64,

    /// Vertical offset, same convention as `dx`
    pub dy: f64,

    /// Scale applied to the texture's size when drawing
    pub scale: f64,
}

impl Tile {
    /// Create a tile at scale 1.
    pub fn new(url: impl Into<String>, zoom: u32, dx: f64, dy: f64) -> Self {
        Self {
            url: url.into(),
            zoom,
            dx,
            dy,
            scale: 1.0,
        }
    }

    /// Set the draw scale.
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }
}

/// The tiles that should be visible, keyed by URL.
pub type TileSet = HashMap<String, Tile>;

/// Build a [`TileSet`] from tiles, keyed by their URLs.
pub fn tile_set(tiles: impl IntoIterator<Item = Tile>) -> TileSet {
    tiles
        .into_iter()
        .map(|tile| (tile.url.clone(), tile))
        .collect()
}

/// Supplies the tiles that should be visible for a viewport.
pub trait TileSource {
    /// Tiles covering a viewport of `(width, height)` pixels.
    fn visible_tiles(&self, viewport: (f64, f64)) -> TileSet;
}
