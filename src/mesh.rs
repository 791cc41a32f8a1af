//! Warp mesh construction
//!
//! Turns a control-point grid into an unindexed triangle list in the layout
//! the scanout warping engine consumes: per vertex `x y u v r q`, two
//! triangles per grid cell, cells in row-major order.
//!
//! Coordinates are converted from the calibration convention to the device
//! convention before triangulation:
//! - positions map from -1..1 to 0..1, then Y is flipped
//! - texture V is flipped, U is left alone

use serde::Serialize;

use crate::warp::{ControlPoint, Point, WarpGrid};

/// Device marker for "triangle list, XY + UV + perspective" vertex data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WarpDataType {
    MeshTrianglesXyuvrq,
}

impl WarpDataType {
    /// Value the device interface expects for this layout
    pub fn code(&self) -> i32 {
        match self {
            WarpDataType::MeshTrianglesXyuvrq => 1,
        }
    }

    pub fn floats_per_vertex(&self) -> usize {
        match self {
            WarpDataType::MeshTrianglesXyuvrq => 6,
        }
    }
}

/// Homogeneous coordinate pair carried alongside texture coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Perspective {
    pub p: f32,
    pub q: f32,
}

impl Default for Perspective {
    /// The control-point files carry no perspective data, so every vertex
    /// gets the orthographic pair (0, 1)
    fn default() -> Self {
        Self { p: 0.0, q: 1.0 }
    }
}

impl From<[f32; 2]> for Perspective {
    fn from([p, q]: [f32; 2]) -> Self {
        Self { p, q }
    }
}

/// A mesh vertex in device convention
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Vertex {
    pub position: Point,
    pub texture: Point,
    pub perspective: Perspective,
}

impl Vertex {
    fn to_floats(self) -> [f32; 6] {
        [
            self.position.x,
            self.position.y,
            self.texture.x,
            self.texture.y,
            self.perspective.p,
            self.perspective.q,
        ]
    }
}

/// Triangle list ready for dispatch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mesh {
    data_type: WarpDataType,
    vertices: Vec<Vertex>,
}

impl Mesh {
    pub fn data_type(&self) -> WarpDataType {
        self.data_type
    }

    #[cfg(test)]
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangles(&self) -> impl Iterator<Item = &[Vertex]> {
        self.vertices.chunks_exact(3)
    }

    /// Flat `x y u v r q` array as handed to the device
    pub fn to_floats(&self) -> Vec<f32> {
        let mut floats = Vec::with_capacity(self.vertices.len() * self.data_type.floats_per_vertex());
        floats.extend(self.vertices.iter().flat_map(|v| v.to_floats()));
        floats
    }
}

/// Calibration position (-1..1) to device position (0..1, Y down)
#[inline]
pub fn normalize_position(position: Point) -> Point {
    let x = (1.0 + position.x) * 0.5;
    let y = (1.0 + position.y) * 0.5;
    Point::new(x, 1.0 - y)
}

/// Flip texture V; U is unchanged
#[inline]
pub fn normalize_texture(texture: Point) -> Point {
    Point::new(texture.x, 1.0 - texture.y)
}

/// Number of vertices a grid of the given size triangulates into
pub fn vertex_count_for(rows: usize, cols: usize) -> usize {
    6 * rows.saturating_sub(1) * cols.saturating_sub(1)
}

#[derive(Debug, Clone, Default)]
pub struct MeshBuilder {
    perspective: Perspective,
}

impl MeshBuilder {
    pub fn new(perspective: Perspective) -> Self {
        Self { perspective }
    }

    pub fn build(&self, grid: &WarpGrid) -> Mesh {
        let rows = grid.rows();
        let cols = grid.cols();
        let corner = |row: usize, col: usize| grid.get(row, col).map(|cp| self.vertex(cp));

        let cells_x = cols.saturating_sub(1);
        let cells_y = rows.saturating_sub(1);
        let mut vertices = Vec::with_capacity(vertex_count_for(rows, cols));

        for cell in 0..cells_x * cells_y {
            let row = cell / cells_x;
            let col = cell % cells_x;

            let (Some(top_left), Some(bottom_left), Some(top_right), Some(bottom_right)) = (
                corner(row, col),
                corner(row + 1, col),
                corner(row, col + 1),
                corner(row + 1, col + 1),
            ) else {
                continue;
            };

            // Triangle A
            vertices.extend_from_slice(&[top_left, bottom_left, top_right]);
            // Triangle B
            vertices.extend_from_slice(&[bottom_left, bottom_right, top_right]);
        }

        Mesh {
            data_type: WarpDataType::MeshTrianglesXyuvrq,
            vertices,
        }
    }

    fn vertex(&self, cp: &ControlPoint) -> Vertex {
        Vertex {
            position: normalize_position(cp.position),
            texture: normalize_texture(cp.texture),
            perspective: self.perspective,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cp(px: f32, py: f32, u: f32, v: f32) -> ControlPoint {
        ControlPoint {
            position: Point::new(px, py),
            texture: Point::new(u, v),
        }
    }

    /// Single cell with row-major (0,0),(0,1),(1,0),(1,1)
    fn unit_grid() -> WarpGrid {
        WarpGrid::from_points(
            2,
            2,
            vec![
                cp(-1.0, -1.0, 0.0, 0.0),
                cp(-1.0, 1.0, 0.0, 1.0),
                cp(1.0, -1.0, 1.0, 0.0),
                cp(1.0, 1.0, 1.0, 1.0),
            ],
        )
        .unwrap()
    }

    /// Grid whose texture u encodes the row and v the column
    fn indexed_grid(rows: usize, cols: usize) -> WarpGrid {
        let mut points = Vec::new();
        for r in 0..rows {
            for c in 0..cols {
                points.push(cp(0.0, 0.0, r as f32, 1.0 - c as f32));
            }
        }
        WarpGrid::from_points(rows, cols, points).unwrap()
    }

    fn corner(v: &Vertex) -> (usize, usize) {
        (v.texture.x as usize, v.texture.y as usize)
    }

    #[test]
    fn test_position_normalization() {
        assert_eq!(normalize_position(Point::new(-1.0, -1.0)), Point::new(0.0, 1.0));
        assert_eq!(normalize_position(Point::new(1.0, 1.0)), Point::new(1.0, 0.0));
        assert_eq!(normalize_position(Point::new(0.0, 0.0)), Point::new(0.5, 0.5));
        assert_eq!(normalize_position(Point::new(0.5, -0.5)), Point::new(0.75, 0.75));
    }

    #[test]
    fn test_texture_flips_v_only() {
        assert_eq!(normalize_texture(Point::new(0.25, 0.25)), Point::new(0.25, 0.75));
        assert_eq!(normalize_texture(Point::new(1.0, 0.0)), Point::new(1.0, 1.0));
    }

    #[test]
    fn test_single_cell() {
        let mesh = MeshBuilder::default().build(&unit_grid());
        assert_eq!(mesh.vertex_count(), 6);
        assert_eq!(mesh.data_type(), WarpDataType::MeshTrianglesXyuvrq);

        let v = mesh.vertices();
        assert_eq!(v[0].position, Point::new(0.0, 1.0));
        assert_eq!(v[0].texture, Point::new(0.0, 1.0));
        // (1,0) is raw (1,-1)
        assert_eq!(v[1].position, Point::new(1.0, 1.0));
        // (0,1) is raw (-1,1)
        assert_eq!(v[2].position, Point::new(0.0, 0.0));
        assert_eq!(v[3], v[1]);
        assert_eq!(v[4].position, Point::new(1.0, 0.0));
        assert_eq!(v[5], v[2]);
    }

    #[test]
    fn test_vertex_count() {
        for (rows, cols) in [(2, 2), (3, 5), (7, 4)] {
            let mesh = MeshBuilder::default().build(&indexed_grid(rows, cols));
            assert_eq!(mesh.vertex_count(), 6 * (rows - 1) * (cols - 1));
            assert_eq!(mesh.vertex_count(), vertex_count_for(rows, cols));
            assert_eq!(mesh.triangles().count(), 2 * (rows - 1) * (cols - 1));
        }
    }

    #[test]
    fn test_cell_and_triangle_order() {
        let rows = 3;
        let cols = 4;
        let mesh = MeshBuilder::default().build(&indexed_grid(rows, cols));
        let cells_x = cols - 1;

        for (cell, chunk) in mesh.vertices().chunks_exact(6).enumerate() {
            let (r, c) = (cell / cells_x, cell % cells_x);
            let got: Vec<_> = chunk.iter().map(corner).collect();
            assert_eq!(
                got,
                vec![(r, c), (r + 1, c), (r, c + 1), (r + 1, c), (r + 1, c + 1), (r, c + 1)],
                "cell {}",
                cell
            );
        }
    }

    #[test]
    fn test_perspective_constant() {
        let mesh = MeshBuilder::default().build(&indexed_grid(3, 3));
        assert!(mesh
            .vertices()
            .iter()
            .all(|v| v.perspective == Perspective { p: 0.0, q: 1.0 }));

        let mesh = MeshBuilder::new([0.5, 2.0].into()).build(&unit_grid());
        assert!(mesh.vertices().iter().all(|v| v.perspective.q == 2.0));
    }

    #[test]
    fn test_flat_layout() {
        let mesh = MeshBuilder::default().build(&unit_grid());
        let floats = mesh.to_floats();
        assert_eq!(floats.len(), mesh.vertex_count() * mesh.data_type().floats_per_vertex());
        assert_eq!(&floats[..6], &[0.0, 1.0, 0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_rebuild_is_identical() {
        let grid = indexed_grid(4, 4);
        let builder = MeshBuilder::default();
        assert_eq!(builder.build(&grid).to_floats(), builder.build(&grid).to_floats());
    }
}
