//! Asynchronous texture loading.
//!
//! The loader allocates a texture synchronously, fills it with a transparent
//! placeholder so it can be drawn immediately, and fetches the real imagery
//! on a tokio task. The task delivers its result to the resource's state
//! machine under the resource lock; whoever loses a race against a cancel
//! simply finds the resource no longer pending.
//!
//! # Notifications
//!
//! A successful load requests a frame from the [`RenderScheduler`], so new
//! pixels show up without waiting for the next tile update. Every terminal
//! outcome is also broadcast as a [`LoadEvent`] for hosts that want to track
//! progress or retry failures.
//!
//! # Releasing textures
//!
//! [`AsyncLoader::release`] only retires a resource. The backend texture is
//! queued and deleted by [`AsyncLoader::delete_retired`], which the caller
//! runs when no frame is drawing, so a frame that already read a handle never
//! binds a deleted texture.

use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::{BackendError, ConfigError, FetchError, LoadError};
use crate::fetch::{DecodedImage, ImageFetcher};
use crate::gfx::{GraphicsBackend, TextureHandle};
use crate::render::RenderScheduler;

use super::resource::{Completion, TextureResource};

/// Default placeholder tile width in pixels.
pub const DEFAULT_TILE_WIDTH: u32 = 256;

/// Default placeholder tile height in pixels.
pub const DEFAULT_TILE_HEIGHT: u32 = 256;

// =============================================================================
// Placeholder
// =============================================================================

/// A fully transparent RGBA image at the standard tile size.
///
/// Built once and shared read-only by every texture allocation.
#[derive(Debug, Clone)]
pub struct Placeholder {
    width: u32,
    height: u32,
    pixels: Bytes,
}

impl Placeholder {
    /// Build a transparent placeholder of `width` x `height` pixels.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidTileSize`] if either dimension is zero.
    pub fn new(width: u32, height: u32) -> Result<Self, ConfigError> {
        if width == 0 || height == 0 {
            return Err(ConfigError::InvalidTileSize { width, height });
        }
        Ok(Self {
            width,
            height,
            pixels: Bytes::from(vec![0u8; width as usize * height as usize * 4]),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &Bytes {
        &self.pixels
    }
}

// =============================================================================
// Load Events
// =============================================================================

/// Terminal outcome of a fetch, broadcast to subscribers.
#[derive(Debug, Clone)]
pub enum LoadEvent {
    /// Real pixels are in the texture
    Loaded {
        url: Arc<str>,
        width: u32,
        height: u32,
    },

    /// The fetch or upload failed; the placeholder remains
    Failed { url: Arc<str>, error: LoadError },
}

impl LoadEvent {
    /// URL the event refers to.
    pub fn url(&self) -> &str {
        match self {
            LoadEvent::Loaded { url, .. } | LoadEvent::Failed { url, .. } => url,
        }
    }
}

// =============================================================================
// AsyncLoader
// =============================================================================

/// Starts fetches and reconciles their completion against cancellation.
pub struct AsyncLoader {
    backend: Arc<dyn GraphicsBackend>,
    fetcher: Arc<dyn ImageFetcher>,
    runtime: Handle,
    placeholder: Placeholder,
    scheduler: Arc<RenderScheduler>,
    events: broadcast::Sender<LoadEvent>,
    retired: Mutex<Vec<TextureHandle>>,
}

impl AsyncLoader {
    /// Create a loader.
    ///
    /// # Arguments
    ///
    /// * `backend` - Backend owning the textures
    /// * `fetcher` - Source of decoded imagery
    /// * `runtime` - Runtime the fetch tasks are spawned on
    /// * `placeholder` - Image every new texture starts with
    /// * `scheduler` - Receives a frame request after each successful load
    /// * `events` - Broadcast channel for load outcomes
    pub fn new(
        backend: Arc<dyn GraphicsBackend>,
        fetcher: Arc<dyn ImageFetcher>,
        runtime: Handle,
        placeholder: Placeholder,
        scheduler: Arc<RenderScheduler>,
        events: broadcast::Sender<LoadEvent>,
    ) -> Self {
        Self {
            backend,
            fetcher,
            runtime,
            placeholder,
            scheduler,
            events,
            retired: Mutex::new(Vec::new()),
        }
    }

    /// The placeholder used for new textures.
    pub fn placeholder(&self) -> &Placeholder {
        &self.placeholder
    }

    /// The backend owning the textures.
    pub fn backend(&self) -> &Arc<dyn GraphicsBackend> {
        &self.backend
    }

    /// Allocate a placeholder texture for `url` and start fetching it.
    ///
    /// The returned resource is `Pending` and safe to draw right away.
    ///
    /// # Errors
    ///
    /// Returns an error if the placeholder cannot be uploaded; the texture is
    /// released before returning.
    pub fn load(&self, url: &str) -> Result<Arc<TextureResource>, BackendError> {
        let texture = self.backend.create_texture();
        if let Err(e) = self.backend.upload_texture(
            texture,
            self.placeholder.width,
            self.placeholder.height,
            &self.placeholder.pixels,
        ) {
            self.backend.delete_texture(texture);
            return Err(e);
        }

        let resource = Arc::new(TextureResource::new(
            url,
            texture,
            self.placeholder.width,
            self.placeholder.height,
        ));

        let task = {
            let resource = resource.clone();
            let backend = self.backend.clone();
            let fetcher = self.fetcher.clone();
            let scheduler = self.scheduler.clone();
            let events = self.events.clone();
            self.runtime.spawn(async move {
                let result = fetcher.fetch(resource.url()).await;
                finish_load(&resource, result, backend.as_ref(), &scheduler, &events);
            })
        };
        resource.attach_fetch(task.abort_handle());

        debug!(url, texture = texture.0, "started texture load");
        Ok(resource)
    }

    /// Cancel a pending load.
    ///
    /// Returns `true` if the resource moved to `Cancelled`; `false` if it was
    /// already loaded, failed or cancelled, in which case nothing changes.
    pub fn cancel(&self, resource: &TextureResource) -> bool {
        let cancelled = resource.cancel();
        if cancelled {
            debug!(url = resource.url(), "cancelled texture load");
        }
        cancelled
    }

    /// Retire a resource and queue its texture for deletion.
    pub fn release(&self, resource: &TextureResource) {
        if resource.retire() {
            self.retired
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(resource.texture());
            debug!(url = resource.url(), "released texture");
        }
    }

    /// Number of retired textures not yet deleted.
    pub fn retired_textures(&self) -> usize {
        self.retired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Delete every retired texture from the backend.
    ///
    /// Must not run while a frame may still bind one of them.
    pub fn delete_retired(&self) -> usize {
        let retired = std::mem::take(&mut *self.retired.lock().unwrap_or_else(PoisonError::into_inner));
        for &texture in &retired {
            self.backend.delete_texture(texture);
        }
        if !retired.is_empty() {
            debug!(deleted = retired.len(), "deleted retired textures");
        }
        retired.len()
    }
}

/// Deliver a fetch result to the resource and notify the host.
fn finish_load(
    resource: &TextureResource,
    result: Result<DecodedImage, FetchError>,
    backend: &dyn GraphicsBackend,
    scheduler: &RenderScheduler,
    events: &broadcast::Sender<LoadEvent>,
) {
    let url = resource.shared_url();
    match result {
        Ok(image) => match resource.complete(&image, backend) {
            Completion::Loaded { width, height } => {
                debug!(url = %url, width, height, "texture loaded");
                scheduler.request_frame();
                // No subscribers is fine
                let _ = events.send(LoadEvent::Loaded { url, width, height });
            }
            Completion::Discarded(state) => {
                debug!(url = %url, %state, "discarding fetched image");
            }
            Completion::Failed => {
                if let Some(error) = resource.failure() {
                    warn!(url = %url, error = %error, "texture upload failed");
                    let _ = events.send(LoadEvent::Failed { url, error });
                }
            }
        },
        Err(e) => {
            let error = LoadError::Fetch(e);
            if resource.fail(error.clone()) {
                warn!(url = %url, error = %error, "texture fetch failed");
                let _ = events.send(LoadEvent::Failed { url, error });
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
