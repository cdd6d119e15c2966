//! Drawing integration tests.
//!
//! Tests verify:
//! - Tiles land at the viewport centre minus their offset, at texture size
//! - Pending tiles draw their transparent placeholder
//! - Only tiles at the active zoom are drawn
//! - Viewport queries follow the backend's drawable size
//! - A reconciliation during a draw never deletes a texture the frame binds

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use glam::Mat4;
use tokio::runtime::Handle;

use tile_canvas::error::{BackendError, FetchError};
use tile_canvas::gfx::{
    AttribLocation, BufferHandle, GraphicsBackend, ProgramHandle, TextureHandle, UniformLocation,
};
use tile_canvas::render::quad_transform;
use tile_canvas::tile::tile_set;
use tile_canvas::{HeadlessBackend, LoadEvent, LoadState, RendererOptions, Tile, TileRenderer, TileSet};

use super::test_utils::{
    headless_renderer, next_events, solid_image, wait_for_fetches, wait_for_state, MockFetcher,
    BLUE, RED, TRANSPARENT,
};

// =============================================================================
// Placement
// =============================================================================

#[tokio::test]
async fn test_loaded_tile_drawn_at_viewport_centre() {
    let fetcher = Arc::new(MockFetcher::new().with_image("tile/a", solid_image(256, 256, RED)));
    let (backend, renderer) = headless_renderer(800, 600, fetcher, RendererOptions::default());

    renderer.render_tiles(1, &tile_set([Tile::new("tile/a", 1, 0.0, 0.0)]));
    wait_for_state(&renderer, "tile/a", LoadState::Loaded).await;

    let stats = renderer.render_frame().expect("a frame should be pending");
    assert_eq!(stats.drawn, 1);
    assert_eq!(stats.skipped, 0);

    // Top-left corner at (400, 300), extending 256 pixels right and down
    assert_eq!(backend.pixel(400, 300), Some(RED));
    assert_eq!(backend.pixel(655, 555), Some(RED));
    assert_eq!(backend.pixel(399, 300), Some(TRANSPARENT));
    assert_eq!(backend.pixel(400, 299), Some(TRANSPARENT));
    assert_eq!(backend.pixel(656, 556), Some(TRANSPARENT));

    let calls = backend.draw_calls();
    let last = calls.last().unwrap();
    assert_eq!(last.vertex_count, 6);
    assert_eq!(
        last.matrix,
        quad_transform((800.0, 600.0), (0.0, 0.0), (256.0, 256.0), 1.0)
    );
}

#[tokio::test]
async fn test_offset_and_scale_position_the_quad() {
    let fetcher = Arc::new(MockFetcher::new().with_image("tile/a", solid_image(256, 256, BLUE)));
    let (backend, renderer) = headless_renderer(800, 600, fetcher, RendererOptions::default());

    let tile = Tile::new("tile/a", 3, 100.0, -50.0).with_scale(0.5);
    renderer.render_tiles(3, &tile_set([tile]));
    wait_for_state(&renderer, "tile/a", LoadState::Loaded).await;
    renderer.render_frame().unwrap();

    // Corner at (400 - 100, 300 + 50), 128 pixels on a side
    assert_eq!(backend.pixel(300, 350), Some(BLUE));
    assert_eq!(backend.pixel(427, 477), Some(BLUE));
    assert_eq!(backend.pixel(299, 350), Some(TRANSPARENT));
    assert_eq!(backend.pixel(428, 478), Some(TRANSPARENT));
}

#[tokio::test]
async fn test_quad_uses_real_texture_size_once_loaded() {
    let fetcher = Arc::new(MockFetcher::new().with_image("tile/a", solid_image(64, 32, RED)));
    let (backend, renderer) = headless_renderer(200, 200, fetcher, RendererOptions::default());

    renderer.render_tiles(0, &tile_set([Tile::new("tile/a", 0, 0.0, 0.0)]));
    wait_for_state(&renderer, "tile/a", LoadState::Loaded).await;
    renderer.render_frame().unwrap();

    assert_eq!(backend.pixel(163, 131), Some(RED));
    assert_eq!(backend.pixel(164, 131), Some(TRANSPARENT));
    assert_eq!(backend.pixel(163, 132), Some(TRANSPARENT));
}

// =============================================================================
// Placeholders
// =============================================================================

#[tokio::test]
async fn test_pending_tile_draws_placeholder() {
    let fetcher = Arc::new(MockFetcher::gated().with_image("tile/a", solid_image(256, 256, RED)));
    let (backend, renderer) =
        headless_renderer(800, 600, fetcher.clone(), RendererOptions::default());

    let mut events = renderer.subscribe();
    renderer.render_tiles(1, &tile_set([Tile::new("tile/a", 1, 0.0, 0.0)]));
    assert_eq!(renderer.texture_state("tile/a"), Some(LoadState::Pending));

    let stats = renderer.render_frame().unwrap();
    assert_eq!(stats.drawn, 1);

    // The placeholder is the default tile size and fully transparent
    let call = backend.draw_calls().pop().unwrap();
    assert_eq!(
        call.matrix,
        quad_transform((800.0, 600.0), (0.0, 0.0), (256.0, 256.0), 1.0)
    );
    assert_eq!(backend.pixel(400, 300), Some(TRANSPARENT));

    // Real pixels replace it after the load completes
    fetcher.open("tile/a");
    let events = next_events(&mut events, 1).await;
    assert!(matches!(events[0], LoadEvent::Loaded { .. }));
    renderer.render_frame().expect("load should request a frame");
    assert_eq!(backend.pixel(400, 300), Some(RED));
}

#[tokio::test]
async fn test_failed_tile_keeps_drawing_placeholder() {
    let fetcher = Arc::new(MockFetcher::new().with_error(
        "tile/a",
        FetchError::Http {
            status: 503,
            url: "tile/a".to_string(),
        },
    ));
    let (backend, renderer) = headless_renderer(800, 600, fetcher, RendererOptions::default());

    renderer.render_tiles(1, &tile_set([Tile::new("tile/a", 1, 0.0, 0.0)]));
    wait_for_state(&renderer, "tile/a", LoadState::Failed).await;

    let stats = renderer.render_frame().unwrap();
    assert_eq!(stats.drawn, 1);
    assert_eq!(backend.pixel(400, 300), Some(TRANSPARENT));
}

#[tokio::test]
async fn test_custom_placeholder_size() {
    let fetcher = Arc::new(MockFetcher::gated());
    let options = RendererOptions::default().with_tile_size(512, 512);
    let (backend, renderer) = headless_renderer(800, 600, fetcher, options);

    renderer.render_tiles(1, &tile_set([Tile::new("tile/a", 1, 0.0, 0.0)]));
    renderer.render_frame().unwrap();

    let call = backend.draw_calls().pop().unwrap();
    assert_eq!(
        call.matrix,
        quad_transform((800.0, 600.0), (0.0, 0.0), (512.0, 512.0), 1.0)
    );
}

// =============================================================================
// Zoom Filter
// =============================================================================

#[tokio::test]
async fn test_only_active_zoom_is_drawn() {
    let fetcher = Arc::new(MockFetcher::gated());
    let (backend, renderer) =
        headless_renderer(800, 600, fetcher.clone(), RendererOptions::default());

    let tiles = tile_set([
        Tile::new("z1/a", 1, 0.0, 0.0),
        Tile::new("z1/b", 1, 256.0, 0.0),
        Tile::new("z2/a", 2, 0.0, 0.0),
    ]);
    let summary = renderer.render_tiles(1, &tiles);
    assert_eq!(summary.fetched, 3);
    assert_eq!(summary.drawn, 2);

    let mut drawn: Vec<String> = renderer
        .draw_list()
        .iter()
        .map(|item| item.url().to_string())
        .collect();
    drawn.sort();
    assert_eq!(drawn, ["z1/a", "z1/b"]);

    // Off-zoom tiles are still fetched and cached
    wait_for_fetches(&fetcher, 3).await;
    assert_eq!(fetcher.fetch_count("z2/a"), 1);
    assert_eq!(renderer.texture_state("z2/a"), Some(LoadState::Pending));

    renderer.render_frame().unwrap();
    assert_eq!(backend.draw_calls().len(), 2);

    // Switching zoom draws the cached tile without a new fetch
    let summary = renderer.render_tiles(2, &tiles);
    assert_eq!(summary.fetched, 0);
    assert_eq!(summary.drawn, 1);
    assert_eq!(renderer.draw_list()[0].url(), "z2/a");
}

// =============================================================================
// Viewport
// =============================================================================

#[tokio::test]
async fn test_viewport_follows_drawable_size() {
    let (backend, renderer) = headless_renderer(
        800,
        600,
        Arc::new(MockFetcher::new()),
        RendererOptions::default(),
    );
    assert_eq!(renderer.viewport(), (800.0, 600.0));

    backend.resize(1024, 768);
    assert_eq!(renderer.viewport(), (1024.0, 768.0));
}

// =============================================================================
// Updates During a Draw
// =============================================================================

/// Headless backend that empties the visible set from inside the first
/// texture bind, the way a host thread updating tiles mid-frame would.
struct ReconcileOnBind {
    inner: Arc<HeadlessBackend>,
    renderer: OnceLock<Weak<TileRenderer>>,
    fired: AtomicBool,
    bound_alive: Mutex<Option<bool>>,
}

impl ReconcileOnBind {
    fn new(inner: Arc<HeadlessBackend>) -> Self {
        Self {
            inner,
            renderer: OnceLock::new(),
            fired: AtomicBool::new(false),
            bound_alive: Mutex::new(None),
        }
    }

    fn attach(&self, renderer: &Arc<TileRenderer>) {
        let _ = self.renderer.set(Arc::downgrade(renderer));
    }

    /// Whether the bound texture still existed after the update ran.
    fn bound_alive(&self) -> Option<bool> {
        *self.bound_alive.lock().unwrap()
    }
}

impl GraphicsBackend for ReconcileOnBind {
    fn drawable_size(&self) -> (u32, u32) {
        self.inner.drawable_size()
    }

    fn set_viewport(&self, x: i32, y: i32, width: u32, height: u32) {
        self.inner.set_viewport(x, y, width, height);
    }

    fn clear(&self, color: [f32; 4]) {
        self.inner.clear(color);
    }

    fn create_texture(&self) -> TextureHandle {
        self.inner.create_texture()
    }

    fn upload_texture(
        &self,
        texture: TextureHandle,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<(), BackendError> {
        self.inner.upload_texture(texture, width, height, pixels)
    }

    fn delete_texture(&self, texture: TextureHandle) {
        self.inner.delete_texture(texture);
    }

    fn bind_texture(&self, texture: TextureHandle) {
        if !self.fired.swap(true, Ordering::SeqCst) {
            if let Some(renderer) = self.renderer.get().and_then(Weak::upgrade) {
                renderer.render_tiles(1, &TileSet::new());
            }
            *self.bound_alive.lock().unwrap() = Some(self.inner.has_texture(texture));
        }
        self.inner.bind_texture(texture);
    }

    fn compile_program(&self, vertex: &str, fragment: &str) -> Result<ProgramHandle, BackendError> {
        self.inner.compile_program(vertex, fragment)
    }

    fn use_program(&self, program: ProgramHandle) {
        self.inner.use_program(program);
    }

    fn attrib_location(&self, program: ProgramHandle, name: &str) -> Option<AttribLocation> {
        self.inner.attrib_location(program, name)
    }

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        self.inner.uniform_location(program, name)
    }

    fn create_buffer(&self, data: &[f32]) -> BufferHandle {
        self.inner.create_buffer(data)
    }

    fn bind_vertex_attrib(&self, location: AttribLocation, buffer: BufferHandle, components: u32) {
        self.inner.bind_vertex_attrib(location, buffer, components);
    }

    fn set_uniform_matrix4(&self, location: UniformLocation, matrix: &Mat4) {
        self.inner.set_uniform_matrix4(location, matrix);
    }

    fn set_uniform_sampler(&self, location: UniformLocation, unit: i32) {
        self.inner.set_uniform_sampler(location, unit);
    }

    fn draw_triangles(&self, first: u32, count: u32) {
        self.inner.draw_triangles(first, count);
    }
}

#[tokio::test]
async fn test_update_during_draw_defers_texture_deletion() {
    let surface = Arc::new(HeadlessBackend::new(800, 600));
    let backend = Arc::new(ReconcileOnBind::new(surface.clone()));
    let renderer = Arc::new(
        TileRenderer::new(
            backend.clone(),
            Arc::new(MockFetcher::gated()),
            Handle::current(),
            RendererOptions::default(),
        )
        .expect("renderer should build"),
    );
    backend.attach(&renderer);

    renderer.render_tiles(1, &tile_set([Tile::new("tile/a", 1, 0.0, 0.0)]));
    let texture = renderer.draw_list()[0].texture.texture();

    let stats = renderer.render_frame().unwrap();
    assert_eq!(stats.drawn, 1);

    // The update dropped the tile mid-frame, yet the quad sampled a live
    // texture: the transparent placeholder, not a deleted handle
    assert_eq!(backend.bound_alive(), Some(true));
    assert_eq!(renderer.texture_state("tile/a"), None);
    assert_eq!(surface.draw_calls()[0].texture, Some(texture));
    assert_eq!(surface.pixel(400, 300), Some(TRANSPARENT));

    // Deleted as soon as the frame finished
    assert!(!surface.has_texture(texture));
    assert_eq!(surface.live_textures(), 0);

    // The next frame draws the emptied list
    let stats = renderer.render_frame().expect("the update requested a frame");
    assert_eq!(stats.drawn, 0);
}
