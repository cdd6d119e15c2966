use std::f64::consts::PI;

use super::{Tile, TileSet, TileSource};

/// Highest zoom level accepted by [`GridTileSource`].
pub const MAX_ZOOM: u32 = 22;

/// Convert a WGS84 coordinate to fractional tile coordinates at `zoom`.
///
/// Latitude is clamped to the Web Mercator limit (about ±85.0511°).
pub fn lat_lon_to_tile(lat: f64, lon: f64, zoom: u32) -> (f64, f64) {
    let n = f64::from(1u32 << zoom.min(MAX_ZOOM));
    let lat = lat.clamp(-85.051_128_78, 85.051_128_78).to_radians();
    let x = (lon + 180.0) / 360.0 * n;
    let y = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / PI) / 2.0 * n;
    (x, y)
}

/// XYZ tile grid centred on a Web Mercator position.
///
/// A fractional zoom renders the tiles of `floor(zoom)` scaled up by
/// `2^(zoom - floor(zoom))`, which is how intermediate zoom levels are shown
/// between discrete tile levels.
///
/// # Example
///
/// ```
/// use tile_canvas::tile::{GridTileSource, TileSource};
///
/// let source = GridTileSource::from_lat_lon(
///     "https://tile.openstreetmap.org/{z}/{x}/{y}.png",
///     2.0,
///     0.0,
///     0.0,
///     256,
/// );
///
/// let tiles = source.visible_tiles((512.0, 512.0));
/// assert!(tiles.contains_key("https://tile.openstreetmap.org/2/1/1.png"));
/// ```
#[derive(Debug, Clone)]
pub struct GridTileSource {
    template: String,
    level: u32,
    scale: f64,
    center_x: f64,
    center_y: f64,
    tile_size: u32,
}

impl GridTileSource {
    /// Create a source centred on fractional tile coordinates.
    ///
    /// `center_x` and `center_y` are expressed in tiles at level
    /// `floor(zoom)`.
    pub fn new(
        template: impl Into<String>,
        zoom: f64,
        center_x: f64,
        center_y: f64,
        tile_size: u32,
    ) -> Self {
        let zoom = zoom.clamp(0.0, MAX_ZOOM as f64);
        let level = zoom.floor() as u32;
        Self {
            template: template.into(),
            level,
            scale: 2f64.powf(zoom - level as f64),
            center_x,
            center_y,
            tile_size,
        }
    }

    /// Create a source centred on a latitude/longitude.
    pub fn from_lat_lon(
        template: impl Into<String>,
        zoom: f64,
        lat: f64,
        lon: f64,
        tile_size: u32,
    ) -> Self {
        let level = zoom.clamp(0.0, MAX_ZOOM as f64).floor() as u32;
        let (x, y) = lat_lon_to_tile(lat, lon, level);
        Self::new(template, zoom, x, y, tile_size)
    }

    /// Tile level the source produces.
    pub fn zoom(&self) -> u32 {
        self.level
    }

    /// Draw scale applied to every tile.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Expand the URL template for a tile.
    pub fn tile_url(&self, z: u32, x: u32, y: u32) -> String {
        self.template
            .replace("{z}", &z.to_string())
            .replace("{x}", &x.to_string())
            .replace("{y}", &y.to_string())
    }
}

impl TileSource for GridTileSource {
    fn visible_tiles(&self, viewport: (f64, f64)) -> TileSet {
        let mut tiles = TileSet::new();
        let span = self.tile_size as f64 * self.scale;
        if span <= 0.0 {
            return tiles;
        }

        let n = 1i64 << self.level;
        let half_w = viewport.0 / 2.0 / span;
        let half_h = viewport.1 / 2.0 / span;

        let x0 = (self.center_x - half_w).floor() as i64;
        let x1 = (self.center_x + half_w).ceil() as i64;
        let y0 = ((self.center_y - half_h).floor() as i64).max(0);
        let y1 = ((self.center_y + half_h).ceil() as i64).min(n);

        for ty in y0..y1 {
            for tx in x0..x1 {
                // Wrap around the antimeridian; offsets use the unwrapped column
                let wrapped = tx.rem_euclid(n) as u32;
                let url = self.tile_url(self.level, wrapped, ty as u32);
                if tiles.contains_key(&url) {
                    continue;
                }
                let tile = Tile {
                    url: url.clone(),
                    zoom: self.level,
                    dx: (self.center_x - tx as f64) * span,
                    dy: (self.center_y - ty as f64) * span,
                    scale: self.scale,
                };
                tiles.insert(url, tile);
            }
        }
        tiles
    }
}
