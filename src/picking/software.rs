//! CPU identity framebuffer built on `tiny-skia`.
//!
//! Markers are rasterized as aliased discs into a color pixmap, with a
//! separate `f32` depth buffer providing the depth test. Used headless and by
//! the test suite.

use std::collections::HashMap;

use egui::{Color32, Pos2};
use tiny_skia::{FillRule, Mask, PathBuilder, Pixmap, PremultipliedColorU8, Transform};

use super::context::{RenderContext, TargetId};
use crate::error::{Result, StudioError};

struct SoftTarget {
    color: Pixmap,
    depth: Vec<f32>,
}

/// Software [`RenderContext`]. Its liveness can be toggled to emulate a view
/// being destroyed and recreated.
pub struct SoftwareContext {
    alive: bool,
    size: [u32; 2],
    targets: HashMap<u32, SoftTarget>,
    next_id: u32,
    fail_deletes: bool,
    calls_while_dead: usize,
}

impl SoftwareContext {
    pub fn new(width: u32, height: u32) -> Self {
        Self { alive: true, size: [width, height], targets: HashMap::new(), next_id: 1, fail_deletes: false, calls_while_dead: 0 }
    }

    /// Emulates the view going away. All targets die with it.
    pub fn lose(&mut self) {
        self.alive = false;
        self.targets.clear();
    }

    /// Emulates the view being recreated.
    pub fn restore(&mut self) {
        self.alive = true;
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.size = [width, height];
    }

    /// Makes `delete_target` fail, for exercising teardown error paths.
    pub fn set_fail_deletes(&mut self, fail: bool) {
        self.fail_deletes = fail;
    }

    pub fn live_targets(&self) -> usize {
        self.targets.len()
    }

    /// Graphics calls issued after the context was lost.
    pub fn calls_while_dead(&self) -> usize {
        self.calls_while_dead
    }

    fn check_alive(&mut self) -> Result<()> {
        if self.alive {
            Ok(())
        } else {
            self.calls_while_dead += 1;
            Err(StudioError::ResourceUnavailable("software context lost".into()))
        }
    }

    fn target(&mut self, id: TargetId) -> Result<&mut SoftTarget> {
        self.check_alive()?;
        self.targets.get_mut(&id.0).ok_or_else(|| StudioError::ResourceUnavailable(format!("no render target {}", id.0)))
    }
}

impl RenderContext for SoftwareContext {
    fn is_alive(&self) -> bool {
        self.alive
    }

    fn viewport_size(&self) -> [u32; 2] {
        self.size
    }

    fn create_target(&mut self, size: [u32; 2]) -> Result<TargetId> {
        self.check_alive()?;
        let [w, h] = size;
        let color =
            Pixmap::new(w, h).ok_or_else(|| StudioError::ResourceUnavailable(format!("cannot allocate {w}x{h} target")))?;
        let id = self.next_id;
        self.next_id += 1;
        self.targets.insert(id, SoftTarget { color, depth: vec![1.0; w as usize * h as usize] });
        Ok(TargetId(id))
    }

    fn begin_pass(&mut self, target: TargetId) -> Result<()> {
        let t = self.target(target)?;
        t.color.fill(tiny_skia::Color::BLACK);
        t.depth.fill(1.0);
        Ok(())
    }

    fn draw_point(&mut self, target: TargetId, center: Pos2, depth: f32, radius_px: f32, color: Color32) -> Result<()> {
        let t = self.target(target)?;
        let (w, h) = (t.color.width() as i64, t.color.height() as i64);
        let x0 = ((center.x - radius_px).floor() as i64).clamp(0, w);
        let y0 = ((center.y - radius_px).floor() as i64).clamp(0, h);
        let x1 = ((center.x + radius_px).ceil() as i64).clamp(0, w);
        let y1 = ((center.y + radius_px).ceil() as i64).clamp(0, h);
        if x1 <= x0 || y1 <= y0 {
            return Ok(());
        }
        let (bw, bh) = ((x1 - x0) as u32, (y1 - y0) as u32);
        let (Some(path), Some(mut mask)) = (PathBuilder::from_circle(center.x, center.y, radius_px), Mask::new(bw, bh)) else {
            return Ok(());
        };
        mask.fill_path(&path, FillRule::Winding, false, Transform::from_translate(-(x0 as f32), -(y0 as f32)));
        let Some(px) = PremultipliedColorU8::from_rgba(color.r(), color.g(), color.b(), 255) else {
            return Ok(());
        };
        let coverage = mask.data();
        let pixels = t.color.pixels_mut();
        for my in 0..bh as usize {
            for mx in 0..bw as usize {
                if coverage[my * bw as usize + mx] == 0 {
                    continue;
                }
                let idx = (y0 as usize + my) * w as usize + x0 as usize + mx;
                if depth < t.depth[idx] {
                    t.depth[idx] = depth;
                    pixels[idx] = px;
                }
            }
        }
        Ok(())
    }

    fn read_pixel(&mut self, target: TargetId, pos: Pos2) -> Result<Option<(Color32, f32)>> {
        let t = self.target(target)?;
        if !(pos.x >= 0.0 && pos.y >= 0.0) {
            return Ok(None);
        }
        let (x, y) = (pos.x.floor() as u32, pos.y.floor() as u32);
        // `Pixmap::pixel` only checks the flat index, so a column past the
        // right edge would read the next row.
        if x >= t.color.width() || y >= t.color.height() {
            return Ok(None);
        }
        let Some(p) = t.color.pixel(x, y) else { return Ok(None) };
        let depth = t.depth[y as usize * t.color.width() as usize + x as usize];
        Ok(Some((Color32::from_rgb(p.red(), p.green(), p.blue()), depth)))
    }

    fn delete_target(&mut self, target: TargetId) -> Result<()> {
        self.check_alive()?;
        if self.fail_deletes {
            return Err(StudioError::ResourceUnavailable(format!("driver refused to delete target {}", target.0)));
        }
        self.targets.remove(&target.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearer_disc_wins_depth_test() {
        let mut ctx = SoftwareContext::new(64, 64);
        let t = ctx.create_target([64, 64]).unwrap();
        ctx.begin_pass(t).unwrap();
        let red = Color32::from_rgb(0, 0, 1);
        let blue = Color32::from_rgb(0, 0, 2);
        ctx.draw_point(t, Pos2::new(32.0, 32.0), 0.3, 6.0, red).unwrap();
        ctx.draw_point(t, Pos2::new(34.0, 32.0), 0.6, 6.0, blue).unwrap();
        let (c, d) = ctx.read_pixel(t, Pos2::new(33.0, 32.0)).unwrap().unwrap();
        assert_eq!(c, red);
        assert!((d - 0.3).abs() < 1e-6);
        let (bg, far) = ctx.read_pixel(t, Pos2::new(2.0, 2.0)).unwrap().unwrap();
        assert_eq!(bg, Color32::from_rgb(0, 0, 0));
        assert_eq!(far, 1.0);
    }

    #[test]
    fn lost_context_refuses_calls() {
        let mut ctx = SoftwareContext::new(8, 8);
        let t = ctx.create_target([8, 8]).unwrap();
        ctx.lose();
        assert!(ctx.begin_pass(t).is_err());
        assert_eq!(ctx.calls_while_dead(), 1);
        assert_eq!(ctx.live_targets(), 0);
    }

    #[test]
    fn reads_outside_target_are_empty() {
        let mut ctx = SoftwareContext::new(8, 8);
        let t = ctx.create_target([8, 8]).unwrap();
        assert!(ctx.read_pixel(t, Pos2::new(-1.0, 3.0)).unwrap().is_none());
        assert!(ctx.read_pixel(t, Pos2::new(8.0, 3.0)).unwrap().is_none());
        assert!(ctx.read_pixel(t, Pos2::new(3.0, 8.0)).unwrap().is_none());
    }

    #[test]
    fn columns_past_the_right_edge_do_not_wrap() {
        let mut ctx = SoftwareContext::new(8, 8);
        let t = ctx.create_target([8, 8]).unwrap();
        ctx.begin_pass(t).unwrap();
        ctx.draw_point(t, Pos2::new(1.5, 4.5), 0.2, 1.5, Color32::from_rgb(0, 0, 7)).unwrap();
        assert!(ctx.read_pixel(t, Pos2::new(1.5, 4.5)).unwrap().is_some_and(|(c, _)| c.b() == 7));
        // (9, 3) would alias (1, 4) if the row stride were ignored.
        assert!(ctx.read_pixel(t, Pos2::new(9.5, 3.5)).unwrap().is_none());
    }
}
