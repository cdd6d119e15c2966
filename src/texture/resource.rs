//! A GPU texture and its load state machine.
//!
//! ```text
//!              ┌──────────► Loaded     (pixels uploaded)
//!              │
//!   Pending ───┼──────────► Cancelled  (fetch aborted)
//!              │
//!              └──────────► Failed     (fetch or upload error)
//! ```
//!
//! All transitions leave `Pending`; terminal states never change again. The
//! transition, the dimension update and the pixel upload happen under one
//! mutex, so a fetch completion racing a cancel is linearized: whichever
//! takes the lock first wins and the other becomes a no-op.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::AbortHandle;

use crate::error::LoadError;
use crate::fetch::DecodedImage;
use crate::gfx::{GraphicsBackend, TextureHandle};

// =============================================================================
// Load State
// =============================================================================

/// Lifecycle state of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadState {
    /// Fetch in flight; the texture holds the placeholder
    Pending,

    /// Real pixels have been uploaded
    Loaded,

    /// The fetch was aborted before it completed
    Cancelled,

    /// The fetch or the upload failed; the placeholder stays
    Failed,
}

impl LoadState {
    /// Whether the state can no longer change.
    pub fn is_terminal(self) -> bool {
        !matches!(self, LoadState::Pending)
    }
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoadState::Pending => "pending",
            LoadState::Loaded => "loaded",
            LoadState::Cancelled => "cancelled",
            LoadState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of delivering fetched pixels to a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The resource moved to `Loaded` with the given dimensions
    Loaded { width: u32, height: u32 },

    /// The resource was no longer pending; the pixels were dropped
    Discarded(LoadState),

    /// The upload failed and the resource moved to `Failed`
    Failed,
}

/// What a draw needs from a resource, read under its lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawSource {
    pub texture: TextureHandle,
    pub width: u32,
    pub height: u32,
}

// =============================================================================
// TextureResource
// =============================================================================

struct Inner {
    state: LoadState,
    width: u32,
    height: u32,
    fetch: Option<AbortHandle>,
    failure: Option<LoadError>,
    released: bool,
}

/// One GPU texture for one tile URL.
///
/// Created by the loader in the `Pending` state, sized to the placeholder
/// until real pixels arrive. The texture cache owns it; draw lists and the
/// fetch task hold shared references.
pub struct TextureResource {
    url: Arc<str>,
    texture: TextureHandle,
    inner: Mutex<Inner>,
}

impl TextureResource {
    /// Create a pending resource around an allocated texture.
    pub(crate) fn new(url: impl Into<Arc<str>>, texture: TextureHandle, width: u32, height: u32) -> Self {
        Self {
            url: url.into(),
            texture,
            inner: Mutex::new(Inner {
                state: LoadState::Pending,
                width,
                height,
                fetch: None,
                failure: None,
                released: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Source URL, also the cache key.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Shared copy of the source URL.
    pub fn shared_url(&self) -> Arc<str> {
        self.url.clone()
    }

    /// The backend texture handle.
    pub fn texture(&self) -> TextureHandle {
        self.texture
    }

    /// Current load state.
    pub fn state(&self) -> LoadState {
        self.lock().state
    }

    /// Current dimensions: the placeholder size until loaded.
    pub fn dimensions(&self) -> (u32, u32) {
        let inner = self.lock();
        (inner.width, inner.height)
    }

    /// Why the resource failed, if it did.
    pub fn failure(&self) -> Option<LoadError> {
        self.lock().failure.clone()
    }

    /// Whether the texture has been retired. A retired texture is never
    /// drawn again; the backend deletes it once no frame is in flight.
    pub fn is_released(&self) -> bool {
        self.lock().released
    }

    /// Texture and size to draw with, or `None` once released.
    pub fn draw_source(&self) -> Option<DrawSource> {
        let inner = self.lock();
        if inner.released {
            return None;
        }
        Some(DrawSource {
            texture: self.texture,
            width: inner.width,
            height: inner.height,
        })
    }

    /// Remember the task fetching this resource so a cancel can abort it.
    ///
    /// If the resource already left `Pending` (cancelled before the task was
    /// attached), the task is aborted right away.
    pub(crate) fn attach_fetch(&self, handle: AbortHandle) {
        let mut inner = self.lock();
        match inner.state {
            LoadState::Pending => inner.fetch = Some(handle),
            LoadState::Cancelled => handle.abort(),
            LoadState::Loaded | LoadState::Failed => {}
        }
    }

    /// Pending → Cancelled, aborting the in-flight fetch.
    ///
    /// Returns `false` without side effects when the resource is already
    /// terminal: loaded pixels are never thrown away by a late cancel, and a
    /// cancelled resource is never cancelled twice.
    pub fn cancel(&self) -> bool {
        let mut inner = self.lock();
        if inner.state != LoadState::Pending {
            return false;
        }
        inner.state = LoadState::Cancelled;
        if let Some(fetch) = inner.fetch.take() {
            fetch.abort();
        }
        true
    }

    /// Pending → Loaded: upload `image` into the texture.
    ///
    /// If the resource is no longer pending the image is discarded. An upload
    /// error moves the resource to `Failed`.
    pub(crate) fn complete(&self, image: &DecodedImage, backend: &dyn GraphicsBackend) -> Completion {
        let mut inner = self.lock();
        if inner.state != LoadState::Pending || inner.released {
            return Completion::Discarded(inner.state);
        }
        inner.fetch = None;

        match backend.upload_texture(self.texture, image.width, image.height, &image.pixels) {
            Ok(()) => {
                inner.state = LoadState::Loaded;
                inner.width = image.width;
                inner.height = image.height;
                Completion::Loaded {
                    width: image.width,
                    height: image.height,
                }
            }
            Err(e) => {
                inner.state = LoadState::Failed;
                inner.failure = Some(LoadError::Upload(e));
                Completion::Failed
            }
        }
    }

    /// Pending → Failed. Returns `false` if the resource was already terminal.
    pub(crate) fn fail(&self, error: LoadError) -> bool {
        let mut inner = self.lock();
        if inner.state != LoadState::Pending {
            return false;
        }
        inner.state = LoadState::Failed;
        inner.fetch = None;
        inner.failure = Some(error);
        true
    }

    /// Stop drawing this texture. Only the first call returns `true`.
    ///
    /// The backend texture itself is left alive; the caller queues it for
    /// deletion once the current frame, if any, has finished with it.
    pub(crate) fn retire(&self) -> bool {
        let mut inner = self.lock();
        if inner.released {
            return false;
        }
        inner.released = true;
        true
    }
}

impl fmt::Debug for TextureResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("TextureResource")
            .field("url", &self.url)
            .field("texture", &self.texture)
            .field("state", &inner.state)
            .field("width", &inner.width)
            .field("height", &inner.height)
            .field("released", &inner.released)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
