//! GPU texture lifecycle.
//!
//! This module owns everything about a tile's texture from allocation to
//! release:
//!
//! - [`TextureResource`]: a texture handle plus its Pending → Loaded |
//!   Cancelled | Failed state machine, guarded by a per-resource lock
//! - [`TextureCache`]: bounded LRU map from tile URL to resource
//! - [`AsyncLoader`]: allocates placeholder textures, runs fetches on tokio
//!   tasks and delivers their results to the state machine
//!
//! # Example
//!
//! ```ignore
//! use tile_canvas::texture::{AsyncLoader, TextureCache};
//!
//! let mut cache = TextureCache::with_capacity(150)?;
//!
//! let resource = match cache.get(url) {
//!     Some(resource) => resource,
//!     None => {
//!         let resource = loader.load(url)?;
//!         if let Some((_, evicted)) = cache.put(url.to_string(), resource.clone()) {
//!             loader.cancel(&evicted);
//!             loader.release(&evicted);
//!         }
//!         resource
//!     }
//! };
//! ```

mod cache;
mod loader;
mod resource;

pub use cache::{TextureCache, DEFAULT_TEXTURE_CACHE_CAPACITY};
pub use loader::{AsyncLoader, LoadEvent, Placeholder, DEFAULT_TILE_HEIGHT, DEFAULT_TILE_WIDTH};
pub use resource::{Completion, DrawSource, LoadState, TextureResource};
