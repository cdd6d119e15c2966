//! Texture cache keyed by tile URL.
//!
//! This module provides an LRU cache of [`TextureResource`]s, bounding how
//! many GPU textures a renderer keeps alive at once.
//!
//! # Eviction
//!
//! The cache never cancels or releases what it evicts. [`TextureCache::put`]
//! hands the displaced entry back to the caller, which knows whether the
//! resource is still referenced elsewhere and is responsible for cancelling
//! a pending fetch and releasing the GPU handle.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;

use crate::error::ConfigError;

use super::resource::TextureResource;

/// Default number of cached textures.
pub const DEFAULT_TEXTURE_CACHE_CAPACITY: usize = 150;

/// LRU cache of textures with at most one instance per URL.
///
/// # Example
///
/// ```ignore
/// use tile_canvas::texture::TextureCache;
///
/// let mut cache = TextureCache::with_capacity(2)?;
///
/// cache.put("a".into(), resource_a);
/// cache.put("b".into(), resource_b);
///
/// // Touch "a" so "b" becomes least recently used
/// cache.get("a");
///
/// // Inserting a third entry displaces "b"
/// let (url, evicted) = cache.put("c".into(), resource_c).unwrap();
/// assert_eq!(url, "b");
/// ```
pub struct TextureCache {
    cache: LruCache<String, Arc<TextureResource>>,
}

impl TextureCache {
    /// Create a cache with the default capacity (150 textures).
    pub fn new() -> Self {
        Self {
            cache: LruCache::new(
                NonZeroUsize::new(DEFAULT_TEXTURE_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            ),
        }
    }

    /// Create a cache holding at most `capacity` textures.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidCacheCapacity`] if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Result<Self, ConfigError> {
        let capacity =
            NonZeroUsize::new(capacity).ok_or(ConfigError::InvalidCacheCapacity(capacity))?;
        Ok(Self {
            cache: LruCache::new(capacity),
        })
    }

    /// Get a texture, marking it as recently used.
    pub fn get(&mut self, url: &str) -> Option<Arc<TextureResource>> {
        self.cache.get(url).cloned()
    }

    /// Get a texture without updating LRU order.
    pub fn peek(&self, url: &str) -> Option<&Arc<TextureResource>> {
        self.cache.peek(url)
    }

    /// Check if a URL is cached without updating LRU order.
    pub fn contains(&self, url: &str) -> bool {
        self.cache.contains(url)
    }

    /// Whether `resource` is the instance cached under its URL.
    pub fn holds(&self, resource: &Arc<TextureResource>) -> bool {
        self.cache
            .peek(resource.url())
            .is_some_and(|cached| Arc::ptr_eq(cached, resource))
    }

    /// Store a texture under `url`.
    ///
    /// Returns the entry pushed out by this insertion: either the least
    /// recently used entry when the cache was full, or a different instance
    /// previously stored under the same URL. Re-inserting the instance that
    /// is already cached only refreshes its recency and returns `None`.
    pub fn put(
        &mut self,
        url: String,
        resource: Arc<TextureResource>,
    ) -> Option<(String, Arc<TextureResource>)> {
        if let Some(existing) = self.cache.get(&url) {
            if Arc::ptr_eq(existing, &resource) {
                return None;
            }
        }
        self.cache.push(url, resource)
    }

    /// Remove a texture, returning it if it was cached.
    pub fn remove(&mut self, url: &str) -> Option<Arc<TextureResource>> {
        self.cache.pop(url)
    }

    /// Remove every entry, returning the textures from least to most
    /// recently used.
    pub fn drain(&mut self) -> Vec<Arc<TextureResource>> {
        let mut drained = Vec::with_capacity(self.cache.len());
        while let Some((_, resource)) = self.cache.pop_lru() {
            drained.push(resource);
        }
        drained
    }

    /// Cached textures, most recently used first.
    pub fn resources(&self) -> impl Iterator<Item = &Arc<TextureResource>> {
        self.cache.iter().map(|(_, resource)| resource)
    }

    /// Number of cached textures.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Maximum number of cached textures.
    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }
}

impl Default for TextureCache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
