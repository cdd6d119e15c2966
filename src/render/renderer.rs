//! Textured-quad renderer.
//!
//! Draws a draw list through a [`GraphicsBackend`]: one unit quad per item,
//! positioned relative to the viewport centre and scaled to the texture size.

use std::sync::Arc;

use glam::{Mat4, Vec3};

use crate::error::BackendError;
use crate::gfx::{
    AttribLocation, BufferHandle, GraphicsBackend, ProgramHandle, UniformLocation,
    QUAD_FRAGMENT_SHADER, QUAD_VERTEX_SHADER, UNIT_QUAD, UNIT_QUAD_VERTICES,
};

use super::draw_list::DrawItem;

/// Statistics for one draw pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Quads drawn
    pub drawn: usize,

    /// Items skipped because their texture was already released
    pub skipped: usize,
}

/// Transform placing a texture of `texture_size` pixels for `item`.
///
/// Device-orthographic projection over `[0, w] x [h, 0]`, then a translation
/// to `(w/2 - dx, h/2 - dy)`, then a scale to the texture size times the
/// item's scale.
pub fn quad_transform(viewport: (f32, f32), offset: (f32, f32), texture_size: (f32, f32), scale: f32) -> Mat4 {
    let (width, height) = viewport;
    Mat4::orthographic_rh_gl(0.0, width, height, 0.0, -1.0, 1.0)
        * Mat4::from_translation(Vec3::new(width / 2.0 - offset.0, height / 2.0 - offset.1, 0.0))
        * Mat4::from_scale(Vec3::new(texture_size.0 * scale, texture_size.1 * scale, 1.0))
}

/// Owns the textured-quad program and its buffers.
pub struct Renderer {
    backend: Arc<dyn GraphicsBackend>,
    program: ProgramHandle,
    position: AttribLocation,
    position_buffer: BufferHandle,
    texcoord: AttribLocation,
    texcoord_buffer: BufferHandle,
    matrix: UniformLocation,
    sampler: UniformLocation,
}

impl Renderer {
    /// Compile the program and upload the unit-quad buffers.
    ///
    /// # Errors
    ///
    /// Returns an error if the program does not compile or lacks one of the
    /// attributes or uniforms the pipeline binds.
    pub fn new(backend: Arc<dyn GraphicsBackend>) -> Result<Self, BackendError> {
        let program = backend.compile_program(QUAD_VERTEX_SHADER, QUAD_FRAGMENT_SHADER)?;

        let attrib = |name: &str| {
            backend
                .attrib_location(program, name)
                .ok_or_else(|| BackendError::MissingAttribute(name.to_string()))
        };
        let uniform = |name: &str| {
            backend
                .uniform_location(program, name)
                .ok_or_else(|| BackendError::MissingUniform(name.to_string()))
        };

        let position = attrib("a_position")?;
        let texcoord = attrib("a_texcoord")?;
        let matrix = uniform("u_matrix")?;
        let sampler = uniform("u_texture")?;

        let position_buffer = backend.create_buffer(&UNIT_QUAD);
        let texcoord_buffer = backend.create_buffer(&UNIT_QUAD);

        Ok(Self {
            backend,
            program,
            position,
            position_buffer,
            texcoord,
            texcoord_buffer,
            matrix,
            sampler,
        })
    }

    /// Current drawable width and height.
    pub fn viewport(&self) -> (f64, f64) {
        let (width, height) = self.backend.drawable_size();
        (width as f64, height as f64)
    }

    /// Clear the surface and draw `items` in order.
    ///
    /// Later items overwrite earlier ones where they overlap.
    pub fn draw(&self, items: &[DrawItem]) -> FrameStats {
        let (width, height) = self.backend.drawable_size();
        self.backend.set_viewport(0, 0, width, height);
        self.backend.clear([0.0, 0.0, 0.0, 0.0]);

        let viewport = (width as f32, height as f32);
        let mut stats = FrameStats::default();
        for item in items {
            let Some(source) = item.texture.draw_source() else {
                stats.skipped += 1;
                continue;
            };

            self.backend.bind_texture(source.texture);
            self.backend.use_program(self.program);
            self.backend
                .bind_vertex_attrib(self.position, self.position_buffer, 2);
            self.backend
                .bind_vertex_attrib(self.texcoord, self.texcoord_buffer, 2);

            let matrix = quad_transform(
                viewport,
                (item.dx as f32, item.dy as f32),
                (source.width as f32, source.height as f32),
                item.scale as f32,
            );
            self.backend.set_uniform_matrix4(self.matrix, &matrix);
            self.backend.set_uniform_sampler(self.sampler, 0);
            self.backend.draw_triangles(0, UNIT_QUAD_VERTICES);
            stats.drawn += 1;
        }
        stats
    }
}
