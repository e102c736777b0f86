//! Color-coded identity picking.
//!
//! Every pick renders the visible markers into an off-screen identity buffer,
//! each marker's color encoding its integer id (0 means "no marker"), then
//! reads back the pixel under the cursor. The subsystem owns the buffer and
//! follows the lifecycle of the rendering context:
//!
//! ```text
//! Uninitialized ──alloc──▶ Ready ──loss / release──▶ Released
//!                            ▲                          │
//!                            └──────── new context ─────┘
//! ```
//!
//! Release is idempotent and never fails: once the context is gone, handles
//! are dropped without any further graphics calls.

pub mod camera;
pub mod context;
pub mod software;

use std::collections::HashMap;

use egui::{Color32, Pos2};
use nalgebra::Point3;

use crate::error::{Result, StudioError};
pub use camera::Camera;
pub use context::{RenderContext, TargetId};
pub use software::SoftwareContext;

/// Largest id representable in the 24 color bits.
pub const MAX_PICK_ID: u32 = 0x00ff_ffff;

pub fn encode_id(id: u32) -> Color32 {
    Color32::from_rgb((id >> 16) as u8, (id >> 8) as u8, id as u8)
}

pub fn decode_id(c: Color32) -> u32 {
    (c.r() as u32) << 16 | (c.g() as u32) << 8 | c.b() as u32
}

/// Bidirectional id ↔ marker mapping for one render pass.
#[derive(Debug, Default, Clone)]
pub struct IdMap {
    markers: Vec<String>,
    ids: HashMap<String, u32>,
}

impl IdMap {
    /// Assigns ids `1..=n` to `names` in order.
    pub fn rebuild<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) -> Result<()> {
        self.markers.clear();
        self.ids.clear();
        for name in names {
            if self.ids.contains_key(name) {
                continue;
            }
            let id = self.markers.len() as u32 + 1;
            if id > MAX_PICK_ID {
                return Err(StudioError::invalid(format!("more than {MAX_PICK_ID} pickable markers")));
            }
            self.markers.push(name.to_string());
            self.ids.insert(name.to_string(), id);
        }
        Ok(())
    }

    pub fn id_of(&self, marker: &str) -> Option<u32> {
        self.ids.get(marker).copied()
    }

    pub fn marker(&self, id: u32) -> Option<&str> {
        if id == 0 {
            return None;
        }
        self.markers.get(id as usize - 1).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickingState {
    Uninitialized,
    Ready,
    Released,
}

#[derive(Debug)]
struct IdentityFramebuffer {
    target: TargetId,
    size: [u32; 2],
}

#[derive(Debug)]
enum Lifecycle {
    Uninitialized,
    Ready(IdentityFramebuffer),
    Released,
}

/// What to draw into the identity buffer.
#[derive(Debug, Clone, Copy)]
pub struct PickScene<'a> {
    /// Visible markers with their positions at the current frame.
    pub markers: &'a [(&'a str, Point3<f64>)],
    /// Non-marker geometry that hides markers behind it.
    pub occluders: &'a [Point3<f64>],
}

#[derive(Debug)]
pub struct PickingSubsystem {
    lifecycle: Lifecycle,
    ids: IdMap,
    marker_radius_px: f32,
}

impl PickingSubsystem {
    pub fn new(marker_radius_px: f32) -> Self {
        Self { lifecycle: Lifecycle::Uninitialized, ids: IdMap::default(), marker_radius_px }
    }

    pub fn state(&self) -> PickingState {
        match self.lifecycle {
            Lifecycle::Uninitialized => PickingState::Uninitialized,
            Lifecycle::Ready(_) => PickingState::Ready,
            Lifecycle::Released => PickingState::Released,
        }
    }

    /// Mapping used by the most recent pass.
    pub fn id_map(&self) -> &IdMap {
        &self.ids
    }

    /// Allocates the identity buffer if needed. Also recreates it when the
    /// viewport size changed, and drops it if the context died.
    pub fn ensure_ready(&mut self, ctx: &mut dyn RenderContext) -> Result<()> {
        if !ctx.is_alive() {
            self.context_lost();
            return Err(StudioError::ResourceUnavailable("rendering context is not live".into()));
        }
        let size = ctx.viewport_size();
        if size[0] == 0 || size[1] == 0 {
            return Err(StudioError::ResourceUnavailable(format!("viewport is {}x{}", size[0], size[1])));
        }
        if let Lifecycle::Ready(fb) = &self.lifecycle {
            if fb.size == size {
                return Ok(());
            }
            let old = fb.target;
            self.lifecycle = Lifecycle::Released;
            if let Err(e) = ctx.delete_target(old) {
                tracing::debug!(error = %e, "failed to delete resized identity target");
            }
        }
        let from = self.state();
        let target = ctx.create_target(size)?;
        self.lifecycle = Lifecycle::Ready(IdentityFramebuffer { target, size });
        tracing::debug!(?from, width = size[0], height = size[1], "identity buffer ready");
        Ok(())
    }

    /// Renders `scene` and returns the marker under `cursor`, or `None` for
    /// background and occluded pixels.
    pub fn pick(&mut self, ctx: &mut dyn RenderContext, camera: &Camera, scene: PickScene<'_>, cursor: Pos2) -> Result<Option<String>> {
        self.ensure_ready(ctx)?;
        let Lifecycle::Ready(fb) = &self.lifecycle else {
            return Err(StudioError::ResourceUnavailable("identity buffer not allocated".into()));
        };
        let target = fb.target;

        self.ids.rebuild(scene.markers.iter().map(|(name, _)| *name))?;
        ctx.begin_pass(target)?;
        for p in scene.occluders {
            if let Some((pos, depth)) = camera.project(p) {
                ctx.draw_point(target, pos, depth, self.marker_radius_px, encode_id(0))?;
            }
        }
        for (name, p) in scene.markers {
            let (Some(id), Some((pos, depth))) = (self.ids.id_of(name), camera.project(p)) else { continue };
            ctx.draw_point(target, pos, depth, self.marker_radius_px, encode_id(id))?;
        }

        let Some((color, depth)) = ctx.read_pixel(target, cursor)? else { return Ok(None) };
        #[cfg(feature = "picking_debug")]
        tracing::trace!(x = cursor.x, y = cursor.y, ?color, depth, "identity readback");
        if depth >= 1.0 {
            return Ok(None);
        }
        let id = decode_id(color);
        match self.ids.marker(id) {
            Some(name) => Ok(Some(name.to_string())),
            None => {
                if id != 0 {
                    tracing::debug!(id, "pixel decodes to an unknown id");
                }
                Ok(None)
            }
        }
    }

    /// Marks the context as gone: handles are forgotten without graphics calls.
    pub fn context_lost(&mut self) {
        if let Lifecycle::Ready(fb) = &self.lifecycle {
            tracing::debug!(target_id = fb.target.0, "context lost; dropping identity buffer");
        }
        if !matches!(self.lifecycle, Lifecycle::Uninitialized) {
            self.lifecycle = Lifecycle::Released;
        }
    }

    /// Frees the identity buffer. Safe to call any number of times, on a live
    /// or dead context; failures are logged and suppressed.
    pub fn release(&mut self, ctx: &mut dyn RenderContext) {
        match std::mem::replace(&mut self.lifecycle, Lifecycle::Released) {
            Lifecycle::Ready(fb) => {
                if ctx.is_alive() {
                    if let Err(e) = ctx.delete_target(fb.target) {
                        tracing::debug!(error = %e, "suppressed failure while releasing identity buffer");
                    }
                } else {
                    tracing::debug!(target_id = fb.target.0, "context already gone; dropping identity buffer");
                }
            }
            Lifecycle::Uninitialized | Lifecycle::Released => {}
        }
        self.ids = IdMap::default();
    }
}
