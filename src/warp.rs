//! Warp control-point grids
//!
//! Each display output has a file with `gridRows x gridCols` records of
//! `posX posY texU texV`, row-major. Positions are raw calibration values
//! (roughly -1..1), textures are 0..1.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{WarpBlendError, WarpBlendResult};
use crate::tokens::{TokenError, TokenReader};
use crate::topology::DisplayId;

/// `posX posY texU texV`
const FIELDS_PER_POINT: usize = 4;

/// A 2D coordinate pair
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// One control point, exactly as read from file
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControlPoint {
    pub position: Point,
    pub texture: Point,
}

/// Row-major grid of control points
#[derive(Debug, Clone, PartialEq)]
pub struct WarpGrid {
    rows: usize,
    cols: usize,
    points: Vec<ControlPoint>,
}

impl WarpGrid {
    /// Build a grid from row-major points; `None` if the count is wrong
    #[cfg(test)]
    pub fn from_points(rows: usize, cols: usize, points: Vec<ControlPoint>) -> Option<Self> {
        if rows < 2 || cols < 2 || points.len() != rows * cols {
            return None;
        }
        Some(Self { rows, cols, points })
    }

    /// Load the warp grid for one display output
    pub fn load(
        display_id: DisplayId,
        path: &Path,
        rows: usize,
        cols: usize,
    ) -> WarpBlendResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|source| WarpBlendError::ResourceNotFound {
                display: display_id,
                path: path.to_path_buf(),
                source,
            })?;

        let grid = Self::parse(&content, rows, cols).map_err(|e| WarpBlendError::GridParse {
            display: display_id,
            path: path.to_path_buf(),
            line: e.line,
            message: e.message,
        })?;

        debug!(
            "Display {}: read {}x{} warp grid from {:?}",
            display_id, cols, rows, path
        );
        Ok(grid)
    }

    pub fn parse(content: &str, rows: usize, cols: usize) -> Result<Self, TokenError> {
        let mut reader = TokenReader::new(content);

        // Grid size comes from the topology file; check it against the
        // tokens actually present before allocating
        let count = rows
            .checked_mul(cols)
            .filter(|&n| {
                n.checked_mul(FIELDS_PER_POINT)
                    .map_or(false, |values| values <= reader.remaining())
            })
            .ok_or_else(|| TokenError {
                line: reader.line(),
                message: format!(
                    "warp grid needs {}x{} points of {} values but the file holds only {} value(s)",
                    cols,
                    rows,
                    FIELDS_PER_POINT,
                    reader.remaining()
                ),
            })?;
        let mut points = Vec::with_capacity(count);

        for row in 0..rows {
            for col in 0..cols {
                let line = reader.line();
                let mut field = |name: &str| -> Result<f32, TokenError> {
                    let value: f32 = reader.parse(&format!("{} of point ({}, {})", name, row, col))?;
                    if !value.is_finite() {
                        return Err(TokenError {
                            line,
                            message: format!("{} of point ({}, {}) is not finite", name, row, col),
                        });
                    }
                    Ok(value)
                };

                let position = Point::new(field("position x")?, field("position y")?);
                let texture = Point::new(field("texture u")?, field("texture v")?);
                points.push(ControlPoint { position, texture });
            }
        }

        if reader.remaining() > 0 {
            warn!(
                "Warp grid has {} unread token(s) after {}x{} points (line {})",
                reader.remaining(),
                cols,
                rows,
                reader.line()
            );
        }

        Ok(Self { rows, cols, points })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Bounds-checked access
    pub fn get(&self, row: usize, col: usize) -> Option<&ControlPoint> {
        if row < self.rows && col < self.cols {
            self.points.get(row * self.cols + col)
        } else {
            None
        }
    }

    pub fn points(&self) -> &[ControlPoint] {
        &self.points
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_row_major() {
        let content = "-1\t-1\t0\t0\n-1\t1\t0\t1\n1\t-1\t1\t0\n1\t1\t1\t1\n";
        let grid = WarpGrid::parse(content, 2, 2).unwrap();
        assert_eq!(grid.points().len(), 4);
        let p = grid.get(0, 1).unwrap();
        assert_eq!(p.position, Point::new(-1.0, 1.0));
        assert_eq!(p.texture, Point::new(0.0, 1.0));
        let p = grid.get(1, 0).unwrap();
        assert_eq!(p.position, Point::new(1.0, -1.0));
        assert!(grid.get(2, 0).is_none());
        assert!(grid.get(0, 2).is_none());
    }

    #[test]
    fn test_truncated_grid() {
        let err = WarpGrid::parse("0 0 0 0\n0 0 0", 1, 2).unwrap_err();
        assert!(err.message.contains("holds only 7 value(s)"), "{}", err);
    }

    #[test]
    fn test_oversized_grid_rejected() {
        // rows * cols overflows
        let err = WarpGrid::parse("0 0 0 0\n", usize::MAX, 2).unwrap_err();
        assert_eq!(err.line, 1);
        // rows * cols fits but is far beyond the file contents
        let err = WarpGrid::parse("0 0 0 0\n", 100_000, 100_000).unwrap_err();
        assert!(err.message.contains("100000x100000"), "{}", err);
    }

    #[test]
    fn test_short_point_list_does_not_panic() {
        let grid = WarpGrid {
            rows: 3,
            cols: 3,
            points: vec![ControlPoint::default(); 5],
        };
        assert!(grid.get(1, 1).is_some());
        assert!(grid.get(1, 2).is_none());
        // only the first cell has all four corners
        let mesh = crate::mesh::MeshBuilder::default().build(&grid);
        assert_eq!(mesh.vertex_count(), 6);
    }

    #[test]
    fn test_non_finite_rejected() {
        let err = WarpGrid::parse("0 NaN 0 0", 1, 1).unwrap_err();
        assert!(err.message.contains("not finite"));
    }

    #[test]
    fn test_from_points_checks_count() {
        assert!(WarpGrid::from_points(2, 2, vec![ControlPoint::default(); 3]).is_none());
        assert!(WarpGrid::from_points(1, 4, vec![ControlPoint::default(); 4]).is_none());
        assert!(WarpGrid::from_points(2, 2, vec![ControlPoint::default(); 4]).is_some());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = WarpGrid::load(5, &dir.path().join("WarpMap-DPY-5.txt"), 2, 2).unwrap_err();
        assert!(matches!(err, WarpBlendError::ResourceNotFound { display: 5, .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("WarpMap-DPY-9.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "0.5\t0.5\t0.25\t0.75").unwrap();
        writeln!(file, "0.5\t0.5\t0.25\t0.75").unwrap();
        writeln!(file, "0.5\t0.5\t0.25\t0.75").unwrap();
        writeln!(file, "0.5\t0.5\t0.25\t0.75").unwrap();
        drop(file);

        let grid = WarpGrid::load(9, &path, 2, 2).unwrap();
        assert_eq!(grid.rows(), 2);
        assert_eq!(grid.cols(), 2);
        assert!(grid
            .points()
            .iter()
            .all(|p| p.texture == Point::new(0.25, 0.75)));
    }
}
