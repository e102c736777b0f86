//! Per-frame marker samples and their provenance tags.

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Where a sample's value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quality {
    /// Value as loaded from the source file.
    Original,
    /// Filled by the interpolation engine.
    Interpolated,
    /// Produced by one of the filters.
    Filtered,
    /// Flagged as suspect by the outlier detector (position untouched).
    Outlier,
    /// No position at this frame.
    Missing,
}

/// One frame of one marker. `position == None` exactly when `quality == Missing`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    position: Option<Point3<f64>>,
    quality: Quality,
}

impl Sample {
    pub fn original(p: Point3<f64>) -> Self {
        Self { position: Some(p), quality: Quality::Original }
    }

    pub fn missing() -> Self {
        Self { position: None, quality: Quality::Missing }
    }

    /// Build a sample with a present position and an explicit tag.
    /// A `Missing` tag on a present position is coerced to `Original`.
    pub fn with_quality(p: Point3<f64>, quality: Quality) -> Self {
        let quality = if quality == Quality::Missing { Quality::Original } else { quality };
        Self { position: Some(p), quality }
    }

    pub fn filtered(p: Point3<f64>) -> Self {
        Self::with_quality(p, Quality::Filtered)
    }

    pub fn interpolated(p: Point3<f64>) -> Self {
        Self::with_quality(p, Quality::Interpolated)
    }

    /// Builds a sample from raw coordinates; any non-finite component makes it a gap.
    pub fn from_xyz(xyz: Option<[f64; 3]>) -> Self {
        match xyz {
            Some([x, y, z]) if x.is_finite() && y.is_finite() && z.is_finite() => {
                Self::original(Point3::new(x, y, z))
            }
            _ => Self::missing(),
        }
    }

    pub fn position(&self) -> Option<Point3<f64>> {
        self.position
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    pub fn is_missing(&self) -> bool {
        self.position.is_none()
    }

    pub fn xyz(&self) -> Option<[f64; 3]> {
        self.position.map(|p| [p.x, p.y, p.z])
    }

    /// Same position, new tag. Missing samples stay missing.
    pub fn retagged(self, quality: Quality) -> Self {
        match self.position {
            Some(p) => Self::with_quality(p, quality),
            None => self,
        }
    }
}
