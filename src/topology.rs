//! Display wall topology: resolution, control grid size and GPU outputs
//!
//! File layout (whitespace separated):
//!
//! ```text
//! width height
//! gridCols gridRows
//! gpuCount
//! gpuId0 gpuId1 ...
//! outputCount displayId ...      (once per GPU, in GPU order)
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{WarpBlendError, WarpBlendResult};
use crate::tokens::{TokenError, TokenReader};

pub type GpuId = u32;
pub type DisplayId = u32;

/// One GPU and the display outputs it drives, in file order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GpuEntry {
    pub gpu_id: GpuId,
    pub display_ids: Vec<DisplayId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Topology {
    pub display_width: u32,
    pub display_height: u32,
    pub grid_cols: usize,
    pub grid_rows: usize,
    pub gpus: Vec<GpuEntry>,
}

impl Topology {
    /// Read and parse a topology file
    pub fn load(path: &Path) -> WarpBlendResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| WarpBlendError::ConfigParse {
            path: path.to_path_buf(),
            line: 0,
            message: format!("cannot read file: {}", e),
        })?;

        let topology = Self::parse(&content).map_err(|e| WarpBlendError::ConfigParse {
            path: path.to_path_buf(),
            line: e.line,
            message: e.message,
        })?;

        info!(
            "Loaded topology from {:?}: {}x{} display, {}x{} grid, {} GPU(s), {} output(s)",
            path,
            topology.display_width,
            topology.display_height,
            topology.grid_cols,
            topology.grid_rows,
            topology.gpus.len(),
            topology.output_count()
        );
        Ok(topology)
    }

    pub fn parse(content: &str) -> Result<Self, TokenError> {
        let mut reader = TokenReader::new(content);

        let resolution_line = reader.line();
        let display_width: u32 = reader.parse("display width")?;
        let display_height: u32 = reader.parse("display height")?;
        if display_width == 0 || display_height == 0 {
            return Err(TokenError {
                line: resolution_line,
                message: format!(
                    "display resolution must be non-zero, got {}x{}",
                    display_width, display_height
                ),
            });
        }

        let grid_line = reader.line();
        let grid_cols: usize = reader.parse("grid column count")?;
        let grid_rows: usize = reader.parse("grid row count")?;
        if grid_cols < 2 || grid_rows < 2 {
            return Err(TokenError {
                line: grid_line,
                message: format!(
                    "control grid needs at least 2x2 points, got {}x{}",
                    grid_cols, grid_rows
                ),
            });
        }

        let count_line = reader.line();
        let gpu_count: usize = reader.parse("GPU count")?;
        if gpu_count == 0 {
            return Err(TokenError {
                line: count_line,
                message: "GPU count must be at least 1".to_string(),
            });
        }

        // Declared counts are never trusted for allocation; the loops below
        // stop at the first missing token
        let mut gpu_ids = Vec::with_capacity(gpu_count.min(reader.remaining()));
        for idx in 0..gpu_count {
            gpu_ids.push(reader.parse::<GpuId>(&format!("GPU id {} of {}", idx + 1, gpu_count))?);
        }

        let mut seen = HashSet::new();
        let mut gpus = Vec::with_capacity(gpu_ids.len());
        for gpu_id in gpu_ids {
            let output_count: usize =
                reader.parse(&format!("output count for GPU {}", gpu_id))?;
            debug!("GPU {}: {} output(s)", gpu_id, output_count);

            let mut display_ids = Vec::with_capacity(output_count.min(reader.remaining()));
            for idx in 0..output_count {
                let line = reader.line();
                let display_id: DisplayId = reader.parse(&format!(
                    "display id {} of {} for GPU {}",
                    idx + 1,
                    output_count,
                    gpu_id
                ))?;
                if !seen.insert(display_id) {
                    return Err(TokenError {
                        line,
                        message: format!(
                            "display {} is assigned to more than one output",
                            display_id
                        ),
                    });
                }
                display_ids.push(display_id);
            }

            gpus.push(GpuEntry { gpu_id, display_ids });
        }

        reader.expect_end()?;

        Ok(Self {
            display_width,
            display_height,
            grid_cols,
            grid_rows,
            gpus,
        })
    }

    /// Total number of display outputs across all GPUs
    pub fn output_count(&self) -> usize {
        self.gpus.iter().map(|g| g.display_ids.len()).sum()
    }

    /// All (GPU, display) pairs in processing order
    pub fn outputs(&self) -> impl Iterator<Item = (GpuId, DisplayId)> + '_ {
        self.gpus
            .iter()
            .flat_map(|g| g.display_ids.iter().map(move |&d| (g.gpu_id, d)))
    }

    /// Bytes in one RGBA blend buffer at the display resolution
    pub fn blend_buffer_len(&self) -> usize {
        self.display_width as usize * self.display_height as usize * 4
    }
}
