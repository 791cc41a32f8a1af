//! Error kinds for the calibration pipeline

use std::path::PathBuf;

use crate::topology::DisplayId;

pub type WarpBlendResult<T> = Result<T, WarpBlendError>;

#[derive(Debug, thiserror::Error)]
pub enum WarpBlendError {
    /// Topology file missing, truncated or internally inconsistent
    #[error("invalid topology {path:?} (line {line}): {message}")]
    ConfigParse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// A per-display warp or blend file could not be opened
    #[error("display {display}: cannot open {path:?}: {source}")]
    ResourceNotFound {
        display: DisplayId,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A per-display grid file opened but its contents are unusable
    #[error("display {display}: malformed grid {path:?} (line {line}): {message}")]
    GridParse {
        display: DisplayId,
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error(
        "display {display}: blend grid declares {grid_width}x{grid_height} \
         but display resolution is {display_width}x{display_height}"
    )]
    DimensionMismatch {
        display: DisplayId,
        grid_width: u32,
        grid_height: u32,
        display_width: u32,
        display_height: u32,
    },

    #[error("display {display}: {operation} dispatch failed with status {status}")]
    DispatchFailure {
        display: DisplayId,
        operation: &'static str,
        status: i32,
    },
}

impl WarpBlendError {
    /// Warnings are reported but do not count as a failed output
    pub fn is_warning(&self) -> bool {
        matches!(self, WarpBlendError::DimensionMismatch { .. })
    }
}
