//! Graphics backend abstraction.
//!
//! The renderer never talks to a graphics API directly. Everything it needs
//! (textures, a textured-quad program, vertex buffers, uniforms and a draw
//! primitive) goes through the [`GraphicsBackend`] trait, so the same draw
//! pipeline runs on a real GPU binding or on the bundled [`HeadlessBackend`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Renderer / AsyncLoader           │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │         GraphicsBackend Trait           │
//! └────────────────────┬────────────────────┘
//!                      │
//!          ┌───────────┴───────────┐
//!          ▼                       ▼
//! ┌─────────────────┐    ┌─────────────────────┐
//! │ HeadlessBackend │    │  GPU binding (host) │
//! │ (software)      │    │                     │
//! └─────────────────┘    └─────────────────────┘
//! ```

mod headless;

use glam::Mat4;

use crate::error::BackendError;

pub use headless::{DrawCall, HeadlessBackend};

// =============================================================================
// Handles
// =============================================================================

/// Opaque handle to a texture owned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

/// Opaque handle to a linked shader program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u32);

/// Opaque handle to a vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u32);

/// Location of a vertex attribute within a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttribLocation(pub u32);

/// Location of a uniform within a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

// =============================================================================
// Textured-quad Program
// =============================================================================

/// Vertex shader for the textured unit quad.
pub const QUAD_VERTEX_SHADER: &str = r#"
attribute vec4 a_position;
attribute vec2 a_texcoord;

uniform mat4 u_matrix;

varying vec2 v_texcoord;

void main() {
   gl_Position = u_matrix * a_position;
   v_texcoord = a_texcoord;
}
"#;

/// Fragment shader for the textured unit quad.
pub const QUAD_FRAGMENT_SHADER: &str = r#"
precision mediump float;

varying vec2 v_texcoord;

uniform sampler2D u_texture;

void main() {
   gl_FragColor = texture2D(u_texture, v_texcoord);
}
"#;

/// Two triangles covering the unit square, as (x, y) pairs.
///
/// Used for both positions and texture coordinates.
pub const UNIT_QUAD: [f32; 12] = [
    0.0, 0.0, //
    0.0, 1.0, //
    1.0, 0.0, //
    1.0, 0.0, //
    0.0, 1.0, //
    1.0, 1.0, //
];

/// Number of vertices in [`UNIT_QUAD`].
pub const UNIT_QUAD_VERTICES: u32 = 6;

// =============================================================================
// GraphicsBackend Trait
// =============================================================================

/// Capability interface over a GPU binding.
///
/// Implementations must be thread-safe: textures are created and drawn from
/// the control thread while fetch completions upload pixels from tokio tasks.
/// Methods mirror the small subset of a GL-style API the tile pipeline needs.
pub trait GraphicsBackend: Send + Sync {
    /// Current drawable size of the surface in pixels.
    fn drawable_size(&self) -> (u32, u32);

    /// Set the viewport rectangle used by subsequent draws.
    fn set_viewport(&self, x: i32, y: i32, width: u32, height: u32);

    /// Clear the surface to the given RGBA colour.
    fn clear(&self, color: [f32; 4]);

    /// Allocate a new, empty texture.
    fn create_texture(&self) -> TextureHandle;

    /// Replace the contents of a texture with tightly packed RGBA8 pixels.
    fn upload_texture(
        &self,
        texture: TextureHandle,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<(), BackendError>;

    /// Release a texture. Deleting an unknown handle is a no-op.
    fn delete_texture(&self, texture: TextureHandle);

    /// Bind a texture to texture unit 0.
    fn bind_texture(&self, texture: TextureHandle);

    /// Compile and link a program from vertex and fragment sources.
    fn compile_program(&self, vertex: &str, fragment: &str)
        -> Result<ProgramHandle, BackendError>;

    /// Make a program current.
    fn use_program(&self, program: ProgramHandle);

    /// Look up a vertex attribute by name.
    fn attrib_location(&self, program: ProgramHandle, name: &str) -> Option<AttribLocation>;

    /// Look up a uniform by name.
    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation>;

    /// Create a static vertex buffer holding `data`.
    fn create_buffer(&self, data: &[f32]) -> BufferHandle;

    /// Source an attribute from a buffer with `components` floats per vertex.
    fn bind_vertex_attrib(&self, location: AttribLocation, buffer: BufferHandle, components: u32);

    /// Set a 4x4 matrix uniform (column-major).
    fn set_uniform_matrix4(&self, location: UniformLocation, matrix: &Mat4);

    /// Set a sampler uniform to a texture unit.
    fn set_uniform_sampler(&self, location: UniformLocation, unit: i32);

    /// Draw `count` vertices as a triangle list starting at `first`.
    fn draw_triangles(&self, first: u32, count: u32);
}
