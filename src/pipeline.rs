//! Per-output calibration pipeline
//!
//! For every (GPU, display) pair, in topology order:
//! warp grid -> mesh -> dispatch -> settle, then
//! blend grid -> buffer -> debug dump -> dispatch -> settle.
//!
//! Nothing is carried from one output to the next. A failure on one output
//! is recorded in its report and the run moves on.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::blend::{BlendBufferBuilder, BlendGrid};
use crate::config::Config;
use crate::debug_image;
use crate::dispatch::{DispatchStatus, OutputDispatcher};
use crate::error::{WarpBlendError, WarpBlendResult};
use crate::mesh::MeshBuilder;
use crate::topology::{DisplayId, GpuId, Topology};
use crate::warp::WarpGrid;

/// Outcome for one display output
#[derive(Debug)]
pub struct OutputReport {
    pub gpu: GpuId,
    pub display: DisplayId,
    pub warp_status: Option<DispatchStatus>,
    pub blend_status: Option<DispatchStatus>,
    /// Errors and warnings raised while processing this output
    pub issues: Vec<WarpBlendError>,
}

impl OutputReport {
    fn new(gpu: GpuId, display: DisplayId) -> Self {
        Self {
            gpu,
            display,
            warp_status: None,
            blend_status: None,
            issues: Vec::new(),
        }
    }

    pub fn failed(&self) -> bool {
        self.issues.iter().any(|e| !e.is_warning())
    }

    pub fn warning_count(&self) -> usize {
        self.issues.iter().filter(|e| e.is_warning()).count()
    }

    /// One-line description of what reached the device
    pub fn outcome(&self) -> String {
        let applied = |status: Option<DispatchStatus>| status.map_or(false, |s| s.is_applied());
        let mut outcome = match (applied(self.warp_status), applied(self.blend_status)) {
            (true, true) => "warp and blend applied".to_string(),
            (true, false) => "warp applied, blend not applied".to_string(),
            (false, true) => "blend applied, warp not applied".to_string(),
            (false, false) => "nothing applied".to_string(),
        };
        if self.warning_count() > 0 {
            outcome.push_str(&format!(", {} warning(s)", self.warning_count()));
        }
        outcome
    }
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub outputs: Vec<OutputReport>,
}

impl RunSummary {
    pub fn processed(&self) -> usize {
        self.outputs.len()
    }

    pub fn failed(&self) -> usize {
        self.outputs.iter().filter(|r| r.failed()).count()
    }

    pub fn warnings(&self) -> usize {
        self.outputs.iter().map(|r| r.warning_count()).sum()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }
}

pub struct Pipeline<'a> {
    topology: &'a Topology,
    config: &'a Config,
    mesh_builder: MeshBuilder,
    blend_builder: BlendBufferBuilder,
}

impl<'a> Pipeline<'a> {
    pub fn new(topology: &'a Topology, config: &'a Config) -> Self {
        Self {
            topology,
            config,
            mesh_builder: MeshBuilder::new(config.mesh.perspective.into()),
            blend_builder: BlendBufferBuilder::new(
                topology.display_width,
                topology.display_height,
                config.blend.out_of_grid_intensity,
            ),
        }
    }

    /// Process every display output in topology order
    pub fn run(&self, dispatcher: &mut dyn OutputDispatcher) -> RunSummary {
        info!("=== warpblend calibration run ===");
        info!(
            "{} output(s), settle timeout {:?}",
            self.topology.output_count(),
            self.config.dispatch.settle_timeout()
        );

        let mut summary = RunSummary::default();
        for (gpu, display_id) in self.topology.outputs() {
            let report = self.process_output(gpu, display_id, dispatcher);
            for issue in &report.issues {
                if issue.is_warning() {
                    warn!("GPU {} {}", report.gpu, issue);
                } else {
                    error!("GPU {} {}", report.gpu, issue);
                }
            }
            info!(
                "GPU {} display {}: {}",
                report.gpu,
                report.display,
                report.outcome()
            );
            summary.outputs.push(report);
        }

        info!(
            "Done: {} output(s) processed, {} failed, {} warning(s)",
            summary.processed(),
            summary.failed(),
            summary.warnings()
        );
        summary
    }

    fn process_output(
        &self,
        gpu: GpuId,
        display_id: DisplayId,
        dispatcher: &mut dyn OutputDispatcher,
    ) -> OutputReport {
        info!("GPU {}: processing display {}", gpu, display_id);
        let mut report = OutputReport::new(gpu, display_id);

        // Unreadable input files skip the rest of this output
        if let Err(e) = self.warp_stage(display_id, dispatcher, &mut report) {
            report.issues.push(e);
            return report;
        }
        if let Err(e) = self.blend_stage(display_id, dispatcher, &mut report) {
            report.issues.push(e);
        }

        report
    }

    fn warp_stage(
        &self,
        display_id: DisplayId,
        dispatcher: &mut dyn OutputDispatcher,
        report: &mut OutputReport,
    ) -> WarpBlendResult<()> {
        let path = self.config.paths.warp_path(display_id);
        info!("Display {}: reading warp grid {:?}", display_id, path);
        let grid = WarpGrid::load(
            display_id,
            &path,
            self.topology.grid_rows,
            self.topology.grid_cols,
        )?;

        let mesh = self.mesh_builder.build(&grid);
        let status = dispatcher.apply_warp(display_id, &mesh);
        info!("Display {}: warp returned {:?}", display_id, status);
        self.settle(display_id, dispatcher);

        report.warp_status = Some(status);
        if let DispatchStatus::Failed(code) = status {
            report.issues.push(WarpBlendError::DispatchFailure {
                display: display_id,
                operation: "warp",
                status: code,
            });
        }
        Ok(())
    }

    fn blend_stage(
        &self,
        display_id: DisplayId,
        dispatcher: &mut dyn OutputDispatcher,
        report: &mut OutputReport,
    ) -> WarpBlendResult<()> {
        let path = self.config.paths.blend_path(display_id);
        info!("Display {}: reading blend grid {:?}", display_id, path);
        let grid = BlendGrid::load(display_id, &path)?;

        if let Some(mismatch) = grid.check_dimensions(
            display_id,
            self.topology.display_width,
            self.topology.display_height,
        ) {
            report.issues.push(mismatch);
        }

        let buffer = self.blend_builder.build(&grid);
        debug_assert_eq!(buffer.len(), self.topology.blend_buffer_len());

        if self.config.debug.dump_blend_image {
            let debug_path = self.config.paths.debug_image_path(display_id);
            match debug_image::dump_blend_ppm(&buffer, &debug_path) {
                Ok(()) => info!("Display {}: wrote debug image {:?}", display_id, debug_path),
                Err(e) => warn!("Display {}: debug image skipped: {:#}", display_id, e),
            }
        }

        let status = dispatcher.apply_blend(display_id, &buffer);
        info!("Display {}: blend returned {:?}", display_id, status);
        self.settle(display_id, dispatcher);

        report.blend_status = Some(status);
        if let DispatchStatus::Failed(code) = status {
            report.issues.push(WarpBlendError::DispatchFailure {
                display: display_id,
                operation: "blend",
                status: code,
            });
        }
        Ok(())
    }

    fn settle(&self, display_id: DisplayId, dispatcher: &mut dyn OutputDispatcher) {
        let timeout: Duration = self.config.dispatch.settle_timeout();
        if !dispatcher.wait_for_completion(display_id, timeout) {
            warn!(
                "Display {}: device did not acknowledge within {:?}",
                display_id, timeout
            );
        }
    }
}
