//! Software implementation of [`GraphicsBackend`].
//!
//! `HeadlessBackend` keeps textures as RGBA images in memory and rasterizes
//! triangle lists into an RGBA framebuffer with nearest-neighbour sampling.
//! It understands just enough GLSL to discover the attribute and uniform
//! declarations of a program, which is all the textured-quad pipeline uses.
//!
//! The draw calls of the current pass are recorded (each `clear` starts a new
//! log), so the backend doubles as an inspection point
//! for tests and for the command-line renderer, which saves the framebuffer
//! as a PNG.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use glam::{Mat4, Vec2, Vec4};
use image::{Rgba, RgbaImage};

use crate::error::BackendError;

use super::{
    AttribLocation, BufferHandle, GraphicsBackend, ProgramHandle, TextureHandle, UniformLocation,
};

// =============================================================================
// Draw Call Record
// =============================================================================

/// A recorded `draw_triangles` invocation.
///
/// The backend keeps the calls made since the last `clear`, so a long-lived
/// frame loop holds one pass worth of records.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    /// Texture bound to unit 0 at draw time
    pub texture: Option<TextureHandle>,

    /// Value of the program's matrix uniform at draw time
    pub matrix: Mat4,

    /// Number of vertices drawn
    pub vertex_count: u32,
}

// =============================================================================
// Internal State
// =============================================================================

/// Declarations discovered in a program's sources, as (type, name) pairs.
#[derive(Debug, Default)]
struct ProgramInfo {
    attributes: Vec<(String, String)>,
    uniforms: Vec<(String, String)>,
}

impl ProgramInfo {
    fn attribute_named(&self, fragment: &str) -> Option<u32> {
        self.attributes
            .iter()
            .position(|(_, name)| name.contains(fragment))
            .map(|idx| idx as u32)
    }

    fn uniform_of_type(&self, ty: &str) -> Option<u32> {
        self.uniforms
            .iter()
            .position(|(t, _)| t == ty)
            .map(|idx| idx as u32)
    }
}

#[derive(Debug, Clone, Copy)]
enum UniformValue {
    Matrix(Mat4),
    Sampler(i32),
}

struct State {
    next_id: u32,
    size: (u32, u32),
    viewport: (i32, i32, u32, u32),
    framebuffer: RgbaImage,
    textures: HashMap<u32, RgbaImage>,
    programs: HashMap<u32, ProgramInfo>,
    buffers: HashMap<u32, Vec<f32>>,
    current_program: Option<u32>,
    bound_texture: Option<u32>,
    attribs: HashMap<u32, (u32, u32)>,
    uniforms: HashMap<u32, UniformValue>,
    draw_calls: Vec<DrawCall>,
    clear_count: usize,
}

impl State {
    fn allocate_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    /// Fetch vertex `index` of an attribute, padded the way GL pads vec4.
    fn vertex(&self, location: u32, index: u32) -> Option<Vec4> {
        let (buffer, components) = *self.attribs.get(&location)?;
        let data = self.buffers.get(&buffer)?;
        let start = (index * components) as usize;
        let slice = data.get(start..start + components as usize)?;
        let mut v = [0.0, 0.0, 0.0, 1.0];
        v[..slice.len()].copy_from_slice(slice);
        Some(Vec4::from_array(v))
    }
}

// =============================================================================
// HeadlessBackend
// =============================================================================

/// In-memory software backend.
///
/// # Example
///
/// ```
/// use tile_canvas::gfx::{GraphicsBackend, HeadlessBackend};
///
/// let backend = HeadlessBackend::new(800, 600);
/// assert_eq!(backend.drawable_size(), (800, 600));
///
/// let texture = backend.create_texture();
/// backend.upload_texture(texture, 1, 1, &[255, 0, 0, 255]).unwrap();
/// assert_eq!(backend.texture_size(texture), Some((1, 1)));
/// ```
pub struct HeadlessBackend {
    state: Mutex<State>,
}

impl HeadlessBackend {
    /// Create a backend with a drawable surface of `width` x `height` pixels.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 0,
                size: (width, height),
                viewport: (0, 0, width, height),
                framebuffer: RgbaImage::new(width, height),
                textures: HashMap::new(),
                programs: HashMap::new(),
                buffers: HashMap::new(),
                current_program: None,
                bound_texture: None,
                attribs: HashMap::new(),
                uniforms: HashMap::new(),
                draw_calls: Vec::new(),
                clear_count: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resize the drawable surface. The framebuffer contents are discarded.
    pub fn resize(&self, width: u32, height: u32) {
        let mut state = self.state();
        state.size = (width, height);
        state.framebuffer = RgbaImage::new(width, height);
    }

    /// Draw calls recorded since the last clear.
    pub fn draw_calls(&self) -> Vec<DrawCall> {
        self.state().draw_calls.clone()
    }

    /// Return and forget the recorded draw calls.
    pub fn take_draw_calls(&self) -> Vec<DrawCall> {
        std::mem::take(&mut self.state().draw_calls)
    }

    /// Number of times the surface has been cleared (one per draw pass).
    pub fn clear_count(&self) -> usize {
        self.state().clear_count
    }

    /// Number of textures that have been created and not deleted.
    pub fn live_textures(&self) -> usize {
        self.state().textures.len()
    }

    /// Whether a texture handle refers to a live texture.
    pub fn has_texture(&self, texture: TextureHandle) -> bool {
        self.state().textures.contains_key(&texture.0)
    }

    /// Dimensions of a live texture.
    pub fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)> {
        self.state()
            .textures
            .get(&texture.0)
            .map(|img| img.dimensions())
    }

    /// Copy of a live texture's pixels.
    pub fn texture_pixels(&self, texture: TextureHandle) -> Option<RgbaImage> {
        self.state().textures.get(&texture.0).cloned()
    }

    /// A single framebuffer pixel, `None` outside the surface.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let state = self.state();
        if x < state.framebuffer.width() && y < state.framebuffer.height() {
            Some(state.framebuffer.get_pixel(x, y).0)
        } else {
            None
        }
    }

    /// Copy of the framebuffer.
    pub fn framebuffer(&self) -> RgbaImage {
        self.state().framebuffer.clone()
    }

    /// Write the framebuffer to a PNG file.
    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<(), image::ImageError> {
        self.framebuffer()
            .save_with_format(path, image::ImageFormat::Png)
    }
}

/// Collect `attribute` and `uniform` declarations from GLSL source.
fn parse_declarations(source: &str, info: &mut ProgramInfo) {
    for line in source.lines() {
        let line = line.trim().trim_end_matches(';');
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 3 {
            continue;
        }
        let decl = (tokens[1].to_string(), tokens[2].to_string());
        match tokens[0] {
            "attribute" => {
                if !info.attributes.contains(&decl) {
                    info.attributes.push(decl);
                }
            }
            "uniform" => {
                if !info.uniforms.contains(&decl) {
                    info.uniforms.push(decl);
                }
            }
            _ => {}
        }
    }
}

fn check_stage(stage: &'static str, source: &str) -> Result<(), BackendError> {
    if source.contains("void main") {
        Ok(())
    } else {
        Err(BackendError::ShaderCompile {
            stage,
            message: "no main function".to_string(),
        })
    }
}

/// Twice the signed area of triangle (a, b, p).
#[inline]
fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

fn sample_nearest(texture: &RgbaImage, uv: Vec2) -> Rgba<u8> {
    let (w, h) = texture.dimensions();
    let x = ((uv.x * w as f32).floor() as i64).clamp(0, w as i64 - 1) as u32;
    let y = ((uv.y * h as f32).floor() as i64).clamp(0, h as i64 - 1) as u32;
    *texture.get_pixel(x, y)
}

fn rasterize(
    framebuffer: &mut RgbaImage,
    texture: Option<&RgbaImage>,
    screen: [Vec2; 3],
    uvs: [Vec2; 3],
) {
    let area = edge(screen[0], screen[1], screen[2]);
    if area.abs() <= f32::EPSILON {
        return;
    }

    let (fb_w, fb_h) = framebuffer.dimensions();
    let min = screen[0].min(screen[1]).min(screen[2]);
    let max = screen[0].max(screen[1]).max(screen[2]);
    let x0 = min.x.floor().max(0.0) as u32;
    let y0 = min.y.floor().max(0.0) as u32;
    let x1 = (max.x.ceil().max(0.0) as u32).min(fb_w);
    let y1 = (max.y.ceil().max(0.0) as u32).min(fb_h);

    for y in y0..y1 {
        for x in x0..x1 {
            let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
            let w0 = edge(screen[1], screen[2], p) / area;
            let w1 = edge(screen[2], screen[0], p) / area;
            let w2 = edge(screen[0], screen[1], p) / area;
            if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                continue;
            }
            let color = match texture {
                Some(tex) => sample_nearest(tex, uvs[0] * w0 + uvs[1] * w1 + uvs[2] * w2),
                // Unbound texture unit samples as opaque black.
                None => Rgba([0, 0, 0, 255]),
            };
            framebuffer.put_pixel(x, y, color);
        }
    }
}

impl GraphicsBackend for HeadlessBackend {
    fn drawable_size(&self) -> (u32, u32) {
        self.state().size
    }

    fn set_viewport(&self, x: i32, y: i32, width: u32, height: u32) {
        self.state().viewport = (x, y, width, height);
    }

    fn clear(&self, color: [f32; 4]) {
        let px = Rgba(color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8));
        let mut state = self.state();
        for pixel in state.framebuffer.pixels_mut() {
            *pixel = px;
        }
        state.draw_calls.clear();
        state.clear_count += 1;
    }

    fn create_texture(&self) -> TextureHandle {
        let mut state = self.state();
        let id = state.allocate_id();
        state.textures.insert(id, RgbaImage::new(0, 0));
        TextureHandle(id)
    }

    fn upload_texture(
        &self,
        texture: TextureHandle,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<(), BackendError> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(BackendError::PixelSizeMismatch {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }

        let mut state = self.state();
        let slot = state
            .textures
            .get_mut(&texture.0)
            .ok_or(BackendError::UnknownTexture(texture.0))?;
        *slot = RgbaImage::from_raw(width, height, pixels.to_vec()).ok_or(
            BackendError::PixelSizeMismatch {
                width,
                height,
                expected,
                actual: pixels.len(),
            },
        )?;
        Ok(())
    }

    fn delete_texture(&self, texture: TextureHandle) {
        let mut state = self.state();
        state.textures.remove(&texture.0);
        if state.bound_texture == Some(texture.0) {
            state.bound_texture = None;
        }
    }

    fn bind_texture(&self, texture: TextureHandle) {
        self.state().bound_texture = Some(texture.0);
    }

    fn compile_program(
        &self,
        vertex: &str,
        fragment: &str,
    ) -> Result<ProgramHandle, BackendError> {
        check_stage("vertex", vertex)?;
        check_stage("fragment", fragment)?;

        let mut info = ProgramInfo::default();
        parse_declarations(vertex, &mut info);
        parse_declarations(fragment, &mut info);

        let mut state = self.state();
        let id = state.allocate_id();
        state.programs.insert(id, info);
        Ok(ProgramHandle(id))
    }

    fn use_program(&self, program: ProgramHandle) {
        self.state().current_program = Some(program.0);
    }

    fn attrib_location(&self, program: ProgramHandle, name: &str) -> Option<AttribLocation> {
        let state = self.state();
        let info = state.programs.get(&program.0)?;
        info.attributes
            .iter()
            .position(|(_, n)| n == name)
            .map(|idx| AttribLocation(idx as u32))
    }

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        let state = self.state();
        let info = state.programs.get(&program.0)?;
        info.uniforms
            .iter()
            .position(|(_, n)| n == name)
            .map(|idx| UniformLocation(idx as u32))
    }

    fn create_buffer(&self, data: &[f32]) -> BufferHandle {
        let mut state = self.state();
        let id = state.allocate_id();
        state.buffers.insert(id, data.to_vec());
        BufferHandle(id)
    }

    fn bind_vertex_attrib(&self, location: AttribLocation, buffer: BufferHandle, components: u32) {
        self.state()
            .attribs
            .insert(location.0, (buffer.0, components.clamp(1, 4)));
    }

    fn set_uniform_matrix4(&self, location: UniformLocation, matrix: &Mat4) {
        self.state()
            .uniforms
            .insert(location.0, UniformValue::Matrix(*matrix));
    }

    fn set_uniform_sampler(&self, location: UniformLocation, unit: i32) {
        self.state()
            .uniforms
            .insert(location.0, UniformValue::Sampler(unit));
    }

    fn draw_triangles(&self, first: u32, count: u32) {
        let mut guard = self.state();
        let state = &mut *guard;

        let Some(info) = state.current_program.and_then(|p| state.programs.get(&p)) else {
            return;
        };
        let position = info.attribute_named("position");
        let texcoord = info.attribute_named("texcoord");
        let matrix = info
            .uniform_of_type("mat4")
            .and_then(|loc| match state.uniforms.get(&loc) {
                Some(UniformValue::Matrix(m)) => Some(*m),
                _ => None,
            })
            .unwrap_or(Mat4::IDENTITY);

        state.draw_calls.push(DrawCall {
            texture: state.bound_texture.map(TextureHandle),
            matrix,
            vertex_count: count,
        });

        let Some(position) = position else {
            return;
        };

        let (vx, vy, vw, vh) = state.viewport;
        let fb_h = state.framebuffer.height() as f32;
        let to_window = |clip: Vec4| -> Vec2 {
            let ndc = clip / clip.w;
            let x = vx as f32 + (ndc.x + 1.0) * 0.5 * vw as f32;
            let y_up = vy as f32 + (ndc.y + 1.0) * 0.5 * vh as f32;
            Vec2::new(x, fb_h - y_up)
        };

        let mut triangles = Vec::new();
        for tri in 0..count / 3 {
            let mut screen = [Vec2::ZERO; 3];
            let mut uvs = [Vec2::ZERO; 3];
            let mut complete = true;
            for corner in 0..3 {
                let index = first + tri * 3 + corner as u32;
                match state.vertex(position, index) {
                    Some(pos) => screen[corner] = to_window(matrix * pos),
                    None => complete = false,
                }
                if let Some(uv) = texcoord.and_then(|loc| state.vertex(loc, index)) {
                    uvs[corner] = Vec2::new(uv.x, uv.y);
                }
            }
            if complete {
                triangles.push((screen, uvs));
            }
        }

        let texture = state
            .bound_texture
            .and_then(|id| state.textures.get(&id))
            .filter(|img| img.width() > 0 && img.height() > 0);
        for (screen, uvs) in triangles {
            rasterize(&mut state.framebuffer, texture, screen, uvs);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
