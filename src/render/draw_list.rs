//! Draw list reconciliation.
//!
//! Each `render_tiles` call hands the builder the complete set of visible
//! tiles. The builder compares it with the previous draw list and the cache:
//!
//! 1. Tiles that dropped out of view are cancelled if still pending, and a
//!    successful cancel frees their cache slot right away.
//! 2. Every visible tile is resolved to a texture. Cache hits are touched
//!    first, then misses are loaded.
//! 3. Tiles at the active zoom become draw items; the rest are only loaded.
//!
//! Tiles whose texture is still pending are drawn anyway, showing the
//! placeholder until the pixels arrive.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::texture::{AsyncLoader, LoadState, TextureCache, TextureResource};
use crate::tile::TileSet;

// =============================================================================
// Draw Item
// =============================================================================

/// One textured quad to draw this frame.
#[derive(Debug, Clone)]
pub struct DrawItem {
    /// Texture to draw
    pub texture: Arc<TextureResource>,

    /// Offset of the quad's corner from the viewport centre
    pub dx: f64,

    /// Vertical offset, same convention as `dx`
    pub dy: f64,

    /// Multiplier applied to the texture's size
    pub scale: f64,
}

impl DrawItem {
    /// URL of the tile being drawn.
    pub fn url(&self) -> &str {
        self.texture.url()
    }
}

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Stale loads cancelled and removed from the cache
    pub cancelled: usize,

    /// New loads started
    pub fetched: usize,

    /// Entries pushed out of the cache by capacity pressure
    pub evicted: usize,

    /// Items in the new draw list
    pub drawn: usize,
}

// =============================================================================
// DrawListBuilder
// =============================================================================

/// Owns the texture cache and the current draw list.
pub struct DrawListBuilder {
    cache: TextureCache,
    draw_list: Vec<DrawItem>,
}

impl DrawListBuilder {
    pub fn new(cache: TextureCache) -> Self {
        Self {
            cache,
            draw_list: Vec::new(),
        }
    }

    /// The texture cache.
    pub fn cache(&self) -> &TextureCache {
        &self.cache
    }

    /// The current draw list.
    pub fn draw_list(&self) -> &[DrawItem] {
        &self.draw_list
    }

    /// Copy of the current draw list, taken when a frame fires.
    pub fn snapshot(&self) -> Vec<DrawItem> {
        self.draw_list.clone()
    }

    /// Reconcile the visible tiles against the cache and rebuild the draw
    /// list for `zoom`.
    pub fn reconcile(&mut self, zoom: u32, tiles: &TileSet, loader: &AsyncLoader) -> Reconciliation {
        let mut summary = Reconciliation::default();

        // Cancel loads that are no longer necessary
        for item in std::mem::take(&mut self.draw_list) {
            if tiles.contains_key(item.url()) {
                continue;
            }
            if loader.cancel(&item.texture) {
                if let Some(removed) = self.cache.remove(item.url()) {
                    loader.release(&removed);
                }
                summary.cancelled += 1;
            }
        }

        // Touch every cached visible texture before loading any miss, so a
        // miss never evicts a texture that is visible in this pass
        let mut resolved = Vec::with_capacity(tiles.len());
        let mut misses = Vec::new();
        for (url, tile) in tiles {
            match self.cache.get(url) {
                Some(texture) => resolved.push((tile, texture)),
                None => misses.push((url, tile)),
            }
        }

        let mut evicted = Vec::new();
        for (url, tile) in misses {
            let texture = match loader.load(url) {
                Ok(texture) => texture,
                Err(e) => {
                    warn!(url = %url, error = %e, "failed to allocate texture, skipping tile");
                    continue;
                }
            };
            summary.fetched += 1;
            if let Some((evicted_url, displaced)) = self.cache.put(url.clone(), texture.clone()) {
                debug!(url = %evicted_url, "evicting texture");
                loader.cancel(&displaced);
                evicted.push(displaced);
            }
            resolved.push((tile, texture));
        }

        for (tile, texture) in resolved {
            if tile.zoom == zoom {
                self.draw_list.push(DrawItem {
                    texture,
                    dx: tile.dx,
                    dy: tile.dy,
                    scale: tile.scale,
                });
            }
        }

        if !evicted.is_empty() {
            summary.evicted = evicted.len();

            // More tiles are visible than the cache holds; drop items whose
            // texture was pushed out during this pass.
            let before = self.draw_list.len();
            let cache = &self.cache;
            self.draw_list.retain(|item| cache.holds(&item.texture));
            if self.draw_list.len() != before {
                warn!(
                    visible = tiles.len(),
                    capacity = cache.capacity(),
                    dropped = before - self.draw_list.len(),
                    "visible tiles exceed texture cache capacity"
                );
            }

            for resource in &evicted {
                loader.release(resource);
            }
        }

        summary.drawn = self.draw_list.len();
        summary
    }

    /// Forget every failed texture so the next reconciliation fetches it again.
    ///
    /// Returns the number of textures dropped.
    pub fn retry_failed(&mut self, loader: &AsyncLoader) -> usize {
        let failed: Vec<String> = self
            .cache
            .resources()
            .filter(|resource| resource.state() == LoadState::Failed)
            .map(|resource| resource.url().to_string())
            .collect();

        for url in &failed {
            if let Some(resource) = self.cache.remove(url) {
                loader.release(&resource);
            }
        }
        let cache = &self.cache;
        self.draw_list.retain(|item| cache.holds(&item.texture));
        failed.len()
    }

    /// Cancel and release every cached texture and empty the draw list.
    pub fn clear(&mut self, loader: &AsyncLoader) -> usize {
        self.draw_list.clear();
        let drained = self.cache.drain();
        for resource in &drained {
            loader.cancel(resource);
            loader.release(resource);
        }
        drained.len()
    }
}

// =============================================================================
// Tests
// =============================================================================
