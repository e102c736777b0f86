//! Error taxonomy shared by every engine in the crate.
//!
//! All variants describe local, recoverable conditions. Callers decide how to
//! surface them; nothing in this crate aborts the process on these paths.

use crate::data::series::FrameRange;

/// Errors returned by trajectory editing, measurement and picking operations.
#[derive(Debug, thiserror::Error)]
pub enum StudioError {
    /// Unknown marker name or picking id.
    #[error("marker not found: {0}")]
    NotFound(String),

    /// Frame range outside the dataset bounds, or inverted.
    #[error("frame range {range} is invalid for a dataset of {frame_count} frames")]
    Range { range: FrameRange, frame_count: usize },

    /// Filter/interpolation parameters violate a numeric precondition.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Interpolation requested for a gap that touches the start or end of the series.
    #[error("gap {gap} of marker '{marker}' touches a series boundary and cannot be interpolated")]
    UnboundedGap { marker: String, gap: FrameRange },

    /// Measurement requested while a referenced marker has no data at the frame.
    #[error("marker '{marker}' has no data at frame {frame}")]
    IncompleteSelection { marker: String, frame: usize },

    /// Picking requested without a live rendering context.
    #[error("rendering resources unavailable: {0}")]
    ResourceUnavailable(String),

    /// Raw trajectory data could not be turned into a dataset.
    #[error("file format error: {0}")]
    FileFormat(String),

    /// Configuration could not be parsed or failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StudioError>;

impl StudioError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        StudioError::InvalidParameter(msg.into())
    }
}
