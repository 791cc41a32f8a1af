//! Handing warp meshes and blend buffers to the display-control interface
//!
//! The hardware backend lives outside this crate. It plugs in through
//! [`OutputDispatcher`]; [`ExportDispatcher`] is the built-in backend which
//! writes the artifacts to disk (or only logs them) so a calibration set can
//! be checked without a display wall attached.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::blend::BlendBuffer;
use crate::mesh::{Mesh, WarpDataType};
use crate::topology::DisplayId;

/// Result of one device-programming call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    Applied,
    Failed(i32),
}

impl DispatchStatus {
    pub fn is_applied(&self) -> bool {
        matches!(self, DispatchStatus::Applied)
    }
}

pub trait OutputDispatcher {
    /// Program the geometric correction mesh for one display output
    fn apply_warp(&mut self, display_id: DisplayId, mesh: &Mesh) -> DispatchStatus;

    /// Program the photometric blend mask for one display output
    fn apply_blend(&mut self, display_id: DisplayId, blend: &BlendBuffer) -> DispatchStatus;

    /// Block until the last call for `display_id` has been consumed by the
    /// device, or `timeout` elapses. Returns false on timeout.
    ///
    /// Backends without a completion signal wait out the full timeout.
    fn wait_for_completion(&mut self, display_id: DisplayId, timeout: Duration) -> bool {
        debug!("Display {}: settling for {:?}", display_id, timeout);
        std::thread::sleep(timeout);
        true
    }
}

/// On-disk form of a warp mesh
#[derive(Serialize)]
struct MeshExport {
    display: DisplayId,
    data_type: WarpDataType,
    data_type_code: i32,
    vertex_count: usize,
    floats: Vec<f32>,
}

/// Writes artifacts into `export_dir`, or just logs them when unset
pub struct ExportDispatcher {
    export_dir: Option<PathBuf>,
    warp_count: u64,
    blend_count: u64,
}

impl ExportDispatcher {
    pub fn new(export_dir: Option<PathBuf>) -> Self {
        match &export_dir {
            Some(dir) => info!("Exporting warp and blend artifacts to {:?}", dir),
            None => info!("No export directory configured, artifacts will only be logged"),
        }

        Self {
            export_dir,
            warp_count: 0,
            blend_count: 0,
        }
    }

    pub fn mesh_path(&self, display_id: DisplayId) -> Option<PathBuf> {
        self.export_dir
            .as_ref()
            .map(|dir| dir.join(format!("mesh-DPY-{}.json", display_id)))
    }

    pub fn blend_path(&self, display_id: DisplayId) -> Option<PathBuf> {
        self.export_dir
            .as_ref()
            .map(|dir| dir.join(format!("blend-DPY-{}.rgba", display_id)))
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, bytes)
    }

    pub fn info(&self) -> String {
        format!(
            "{} (warps: {}, blends: {})",
            self.export_dir
                .as_ref()
                .map(|d| d.display().to_string())
                .unwrap_or_else(|| "log only".to_string()),
            self.warp_count,
            self.blend_count
        )
    }
}

/// Map an IO failure to a device-style status code
fn status_from_io(err: &io::Error) -> DispatchStatus {
    DispatchStatus::Failed(err.raw_os_error().unwrap_or(-1))
}

impl OutputDispatcher for ExportDispatcher {
    fn apply_warp(&mut self, display_id: DisplayId, mesh: &Mesh) -> DispatchStatus {
        info!(
            "Display {}: warp mesh {:?}, {} vertices ({} triangles)",
            display_id,
            mesh.data_type(),
            mesh.vertex_count(),
            mesh.triangles().count()
        );

        if let Some(path) = self.mesh_path(display_id) {
            let export = MeshExport {
                display: display_id,
                data_type: mesh.data_type(),
                data_type_code: mesh.data_type().code(),
                vertex_count: mesh.vertex_count(),
                floats: mesh.to_floats(),
            };
            let json = match serde_json::to_vec_pretty(&export) {
                Ok(json) => json,
                Err(e) => {
                    warn!("Display {}: failed to serialize mesh: {}", display_id, e);
                    return DispatchStatus::Failed(-1);
                }
            };
            if let Err(e) = self.write(&path, &json) {
                warn!("Display {}: failed to write {:?}: {}", display_id, path, e);
                return status_from_io(&e);
            }
            debug!("Display {}: wrote {:?}", display_id, path);
        }

        self.warp_count += 1;
        DispatchStatus::Applied
    }

    fn apply_blend(&mut self, display_id: DisplayId, blend: &BlendBuffer) -> DispatchStatus {
        info!(
            "Display {}: blend buffer {}x{}, {} bytes",
            display_id,
            blend.width(),
            blend.height(),
            blend.len()
        );

        if let Some(path) = self.blend_path(display_id) {
            if let Err(e) = self.write(&path, blend.as_bytes()) {
                warn!("Display {}: failed to write {:?}: {}", display_id, path, e);
                return status_from_io(&e);
            }
            debug!("Display {}: wrote {:?}", display_id, path);
        }

        self.blend_count += 1;
        DispatchStatus::Applied
    }

    /// File writes are complete when the call returns
    fn wait_for_completion(&mut self, _display_id: DisplayId, _timeout: Duration) -> bool {
        true
    }
}

impl Drop for ExportDispatcher {
    fn drop(&mut self) {
        debug!("Export dispatcher closed: {}", self.info());
    }
}
