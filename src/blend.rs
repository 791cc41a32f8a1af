//! Blend intensity grids and dense RGBA blend buffers
//!
//! A blend file starts with a `width height` header followed by
//! `width * height` intensities (0-255) in row-major order, first row at
//! the top of the file. The device expects the mask with the opposite row
//! order, so the buffer is the file contents flipped vertically exactly
//! once, see [`flip_row`].

use std::path::Path;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{WarpBlendError, WarpBlendResult};
use crate::tokens::{TokenError, TokenReader};
use crate::topology::DisplayId;

pub const CHANNELS: usize = 4;

/// Intensity grid in file order
#[derive(Debug, Clone, PartialEq)]
pub struct BlendGrid {
    width: u32,
    height: u32,
    values: Vec<u8>,
}

impl BlendGrid {
    #[cfg(test)]
    pub fn from_values(width: u32, height: u32, values: Vec<u8>) -> Option<Self> {
        if values.len() != width as usize * height as usize {
            return None;
        }
        Some(Self { width, height, values })
    }

    /// Load the blend grid for one display output
    pub fn load(display_id: DisplayId, path: &Path) -> WarpBlendResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|source| WarpBlendError::ResourceNotFound {
                display: display_id,
                path: path.to_path_buf(),
                source,
            })?;

        let grid = Self::parse(&content).map_err(|e| WarpBlendError::GridParse {
            display: display_id,
            path: path.to_path_buf(),
            line: e.line,
            message: e.message,
        })?;

        info!(
            "Display {}: blend grid {:?} declares {}x{}",
            display_id, path, grid.width, grid.height
        );
        Ok(grid)
    }

    pub fn parse(content: &str) -> Result<Self, TokenError> {
        let mut reader = TokenReader::new(content);

        let header_line = reader.line();
        let width: u32 = reader.parse("blend grid width")?;
        let height: u32 = reader.parse("blend grid height")?;
        if width == 0 || height == 0 {
            return Err(TokenError {
                line: header_line,
                message: format!("blend grid must be non-empty, got {}x{}", width, height),
            });
        }

        // The header is untrusted; never size an allocation past the tokens present
        let count = (width as usize)
            .checked_mul(height as usize)
            .filter(|&n| n <= reader.remaining())
            .ok_or_else(|| TokenError {
                line: header_line,
                message: format!(
                    "blend grid declares {}x{} values but the file holds only {}",
                    width,
                    height,
                    reader.remaining()
                ),
            })?;

        let mut values = Vec::with_capacity(count);
        for row in 0..height {
            for col in 0..width {
                // u8 parsing rejects anything outside 0..=255
                values.push(reader.parse::<u8>(&format!(
                    "intensity 0-255 at row {}, column {}",
                    row, col
                ))?);
            }
        }

        if reader.remaining() > 0 {
            warn!(
                "Blend grid has {} unread token(s) after {}x{} values",
                reader.remaining(),
                width,
                height
            );
        }

        Ok(Self { width, height, values })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Intensity at file row `row`, column `col`
    pub fn get(&self, col: u32, row: u32) -> Option<u8> {
        if col < self.width && row < self.height {
            self.values
                .get(row as usize * self.width as usize + col as usize)
                .copied()
        } else {
            None
        }
    }

    /// Report a header that disagrees with the display resolution
    pub fn check_dimensions(
        &self,
        display: DisplayId,
        display_width: u32,
        display_height: u32,
    ) -> Option<WarpBlendError> {
        if self.width == display_width && self.height == display_height {
            return None;
        }
        Some(WarpBlendError::DimensionMismatch {
            display,
            grid_width: self.width,
            grid_height: self.height,
            display_width,
            display_height,
        })
    }
}

/// The vertical flip between file rows and buffer rows.
///
/// Buffer row `y` of a `height`-row display is sourced from file row
/// `height - 1 - y`. This is the only place the flip happens.
#[inline]
pub fn flip_row(y: u32, height: u32) -> u32 {
    height - 1 - y
}

/// Dense RGBA blend mask at display resolution
#[derive(Debug, Clone, PartialEq)]
pub struct BlendBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl BlendBuffer {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Interleaved RGBA bytes, row-major from the top row
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * CHANNELS;
        let px = self.data.get(offset..offset + CHANNELS)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}

/// Expands intensity grids to display-sized blend buffers
#[derive(Debug, Clone)]
pub struct BlendBufferBuilder {
    width: u32,
    height: u32,
    /// Intensity for pixels the grid does not cover
    fill: u8,
}

impl BlendBufferBuilder {
    pub fn new(width: u32, height: u32, fill: u8) -> Self {
        Self { width, height, fill }
    }

    /// Build the buffer; always `width * height * 4` bytes regardless of
    /// the grid's own dimensions. No resampling is done.
    pub fn build(&self, grid: &BlendGrid) -> BlendBuffer {
        let row_bytes = self.width as usize * CHANNELS;
        let mut data = vec![0u8; row_bytes * self.height as usize];

        data.par_chunks_mut(row_bytes.max(1))
            .enumerate()
            .for_each(|(y, row)| {
                let src_row = flip_row(y as u32, self.height);
                for (x, px) in row.chunks_exact_mut(CHANNELS).enumerate() {
                    let value = grid.get(x as u32, src_row).unwrap_or(self.fill);
                    px.fill(value);
                }
            });

        debug!(
            "Expanded {}x{} blend grid into {}x{} buffer ({} bytes)",
            grid.width(),
            grid.height(),
            self.width,
            self.height,
            data.len()
        );

        BlendBuffer {
            width: self.width,
            height: self.height,
            data,
        }
    }
}
