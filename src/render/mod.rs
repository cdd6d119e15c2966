//! Draw list reconciliation, frame scheduling and drawing.
//!
//! - [`DrawListBuilder`] turns the visible tile set into a draw list
//! - [`RenderScheduler`] coalesces redraw requests into one pending frame
//! - [`Renderer`] draws a draw list as textured quads
//! - [`TileRenderer`] ties them to the texture cache and loader

mod draw_list;
mod renderer;
mod scheduler;
mod tile_renderer;

pub use draw_list::{DrawItem, DrawListBuilder, Reconciliation};
pub use renderer::{quad_transform, FrameStats, Renderer};
pub use scheduler::RenderScheduler;
pub use tile_renderer::{RendererOptions, TileRenderer, DEFAULT_REFRESH_INTERVAL};
