//! Abstraction over the graphics context that owns the identity framebuffer.
//!
//! A GPU backend implements this on top of its framebuffer objects; the
//! [`SoftwareContext`](super::software::SoftwareContext) rasterizes on the CPU.

use egui::{Color32, Pos2};

use crate::error::Result;

/// Opaque handle to an off-screen identity render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(pub u32);

/// Operations the picking subsystem needs from a rendering context.
///
/// Window coordinates have their origin at the top-left corner; backends with
/// a bottom-left origin (OpenGL) flip `y` when reading back.
pub trait RenderContext {
    /// `true` while the owning view and its graphics context exist.
    fn is_alive(&self) -> bool;

    /// Current drawable size in pixels.
    fn viewport_size(&self) -> [u32; 2];

    /// Allocates a color (id) + depth target of the given size.
    fn create_target(&mut self, size: [u32; 2]) -> Result<TargetId>;

    /// Clears the target to id 0 and the far depth plane.
    fn begin_pass(&mut self, target: TargetId) -> Result<()>;

    /// Draws a flat disc of `radius_px` at `center` with depth testing.
    fn draw_point(&mut self, target: TargetId, center: Pos2, depth: f32, radius_px: f32, color: Color32) -> Result<()>;

    /// Reads the color and depth under `pos`; `None` outside the target.
    fn read_pixel(&mut self, target: TargetId, pos: Pos2) -> Result<Option<(Color32, f32)>>;

    fn delete_target(&mut self, target: TargetId) -> Result<()>;
}
