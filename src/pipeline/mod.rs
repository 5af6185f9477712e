//! Timed execution pipeline orchestrating one frame end to end.
//!
//! The [`AnytimePipeline`] owns the scheduler context and drives the model
//! stages through an [`InferenceBackend`]:
//!
//! ```no_run
//! use anytime_detector::prelude::*;
//! use anytime_detector::backend::{CpuBackend, SystemClock};
//! use anytime_detector::synthetic::SyntheticModel;
//!
//! # fn example(frames: Vec<FrameInput>) -> anytime_detector::Result<()> {
//! let config = PipelineConfig::default();
//! let model = SyntheticModel::new(&config, Default::default())?;
//! let mut pipeline = AnytimePipeline::new(config, CpuBackend::new(SystemClock), model)?;
//! pipeline.load_predictor()?;
//! for frame in &frames {
//!     let out = pipeline.process(frame)?;
//!     println!("{} detections, missed={}", out.detections.len(), out.diagnostics.deadline_missed);
//! }
//! # Ok(())
//! # }
//! ```

// Stages
// - Scene check: a new scene token resets history and the round-robin pointer.
// - Voxelize: pillarize raw points.
// - Partition + schedule1: tile occupancy, rotated candidates, largest fitting prefix.
// - Filtering: drop voxels outside the chosen tiles.
// - bb3d on the primary stream, projection of history on the projection stream.
// - schedule2: shrink the tile set using the time left after bb3d.
// - bb2d, head-pre, schedule3 (report only), head-post.
// - Fusion: per-head NMS of fresh and projected detections.
// - Record fresh detections into history.

mod context;
mod model;

pub use context::{FrameContext, SchedulerContext};
pub use model::PerceptionModel;

use crate::backend::{InferenceBackend, Stage, Stream};
use crate::calibration::{
    sweep_windows, CalibrationData, CalibrationRecorder, SweepTiming, TimePredictor,
};
use crate::config::PipelineConfig;
use crate::diagnostics::{FrameDiagnostics, TimingBreakdown};
use crate::error::{AnytimeError, Result};
use crate::projection::nms::nms;
use crate::projection::{split_by_head, ProjectionEngine};
use crate::scheduler::{remaining_time_ms, RoundRobinScheduler};
use crate::tiles::{TileId, TileLayout, TilePartition};
use crate::types::{DetectionSet, FrameInput};
use crate::voxelize::{PillarGrid, VoxelSet};
use log::{debug, info, warn};

/// Final detections of a frame and its diagnostics.
#[derive(Clone, Debug)]
pub struct FrameOutput {
    pub detections: DetectionSet,
    pub diagnostics: FrameDiagnostics,
}

pub struct AnytimePipeline<B: InferenceBackend, M: PerceptionModel> {
    config: PipelineConfig,
    grid: PillarGrid,
    layout: TileLayout,
    backend: B,
    model: M,
    ctx: SchedulerContext,
    frame_index: usize,
}

impl<B: InferenceBackend, M: PerceptionModel> AnytimePipeline<B, M> {
    /// Validate the configuration and build a pipeline without a predictor.
    /// Install one with [`with_predictor`](Self::with_predictor) or
    /// [`load_predictor`](Self::load_predictor) before calling `process`.
    pub fn new(config: PipelineConfig, backend: B, model: M) -> Result<Self> {
        config.validate()?;
        if model.num_det_heads() != config.num_det_heads {
            return Err(AnytimeError::config(format!(
                "model has {} detection heads, configuration {}",
                model.num_det_heads(),
                config.num_det_heads
            )));
        }
        let grid = config.pillar_grid()?;
        let layout = config.tile_layout()?;
        let scheduler = RoundRobinScheduler::new(config.tile_count);
        let projection = ProjectionEngine::new(
            config.score_threshold,
            config.projection.horizon_us,
            config.projection.decay_offset,
        );
        Ok(Self {
            grid,
            layout,
            backend,
            model,
            ctx: SchedulerContext::new(scheduler, projection),
            frame_index: 0,
            config,
        })
    }

    pub fn with_predictor(mut self, predictor: TimePredictor) -> Result<Self> {
        self.install_predictor(predictor)?;
        Ok(self)
    }

    /// Load the predictor from the configured calibration paths.
    ///
    /// Returns [`AnytimeError::MissingCalibrationData`] when the data file is
    /// absent; run [`collect_calibration`](Self::collect_calibration) then.
    pub fn load_predictor(&mut self) -> Result<()> {
        let paths = &self.config.calibration;
        let predictor = TimePredictor::load(&paths.data_path, &paths.checkpoint_path)?;
        self.install_predictor(predictor)
    }

    fn install_predictor(&mut self, predictor: TimePredictor) -> Result<()> {
        let tables = predictor.tables();
        if tables.num_tiles() != self.config.tile_count
            || tables.num_det_heads() != self.config.num_det_heads
        {
            return Err(AnytimeError::config(format!(
                "predictor calibrated for T={} heads={}, pipeline runs T={} heads={}",
                tables.num_tiles(),
                tables.num_det_heads(),
                self.config.tile_count,
                self.config.num_det_heads
            )));
        }
        self.ctx.predictor = Some(predictor);
        Ok(())
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn context(&self) -> &SchedulerContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut SchedulerContext {
        &mut self.ctx
    }

    /// Run one frame under its deadline.
    pub fn process(&mut self, frame: &FrameInput) -> Result<FrameOutput> {
        if self.ctx.predictor.is_none() {
            return Err(AnytimeError::config(
                "no time predictor installed; run the calibration sweep first",
            ));
        }
        let start_sec = self.backend.now_sec();
        let mut fc = FrameContext {
            diagnostics: FrameDiagnostics {
                frame_index: self.frame_index,
                scene_token: frame.scene_token.clone(),
                timestamp_us: frame.timestamp_us,
                deadline_sec: frame.deadline_sec,
                ..Default::default()
            },
            ..Default::default()
        };
        self.frame_index += 1;
        fc.diagnostics.scene_reset = self.ctx.enter_scene(&frame.scene_token);

        self.voxelize(frame, &mut fc)?;
        self.schedule1(&mut fc)?;

        let detections = if fc.decision.is_empty() {
            debug!("frame {}: empty input, stages skipped", fc.diagnostics.frame_index);
            fc.diagnostics.empty_input = true;
            DetectionSet::new()
        } else {
            self.filter_voxels(&mut fc)?;
            let features = self.backbone_3d_with_projection(frame, &mut fc)?;
            self.schedule2(&mut fc)?;
            self.heads(features, &mut fc)?;
            self.fuse(&mut fc)
        };

        let finished_sec = self.backend.now_sec();
        let diag = &mut fc.diagnostics;
        diag.finished_sec = finished_sec;
        diag.lateness_ms = (finished_sec - frame.deadline_sec) * 1000.0;
        diag.deadline_missed = finished_sec > frame.deadline_sec;
        diag.output_detections = detections.len();
        diag.timing.total_ms = (finished_sec - start_sec) * 1000.0;
        if diag.deadline_missed {
            warn!(
                "frame {}: deadline missed by {:.3} ms ({} of {} tiles)",
                diag.frame_index,
                diag.lateness_ms,
                diag.chosen_tiles_2.len(),
                diag.nonempty_tiles.len()
            );
        }

        if self.config.projection.enabled {
            self.ctx
                .projection
                .record(&detections, &frame.pose, frame.timestamp_us);
        }

        Ok(FrameOutput {
            detections,
            diagnostics: fc.diagnostics,
        })
    }

    fn voxelize(&self, frame: &FrameInput, fc: &mut FrameContext) -> Result<()> {
        let grid = &self.grid;
        let (voxels, span) = self
            .backend
            .enqueue(Stage::Voxelize, Stream::Primary, || Ok(grid.pillarize(&frame.points)))?;
        fc.partition = self.layout.partition(&voxels.coords)?;
        fc.voxels = voxels;
        fc.diagnostics
            .timing
            .push(Stage::Voxelize.label(), self.backend.span_ms(&span)?);
        fc.diagnostics.num_voxels = fc.voxels.len();
        fc.diagnostics.nonempty_tiles = fc.partition.nonempty.tiles().to_vec();
        fc.diagnostics.occupancy = fc.partition.occupancy.0.clone();
        Ok(())
    }

    fn schedule1(&mut self, fc: &mut FrameContext) -> Result<()> {
        let Some(predictor) = self.ctx.predictor.as_ref() else {
            return Err(AnytimeError::config("no time predictor installed"));
        };
        let sched_start = self.backend.now_sec();
        let remaining_ms = remaining_time_ms(fc.diagnostics.deadline_sec, sched_start);
        fc.decision = self
            .ctx
            .scheduler
            .schedule1(&fc.partition.nonempty, predictor, remaining_ms)?;
        let diag = &mut fc.diagnostics;
        diag.remaining_ms_at_schedule1 = remaining_ms;
        diag.chosen_tiles_1 = fc.decision.chosen_tile_coords.clone();
        diag.filtered = fc.decision.filtered;
        diag.predicted_bb3d_ms = fc.decision.predicted_bb3d_ms;
        diag.predicted_total_ms = fc
            .decision
            .chosen_tile_coords
            .len()
            .checked_sub(1)
            .and_then(|i| fc.decision.predicted_stage_times.get(i).copied());
        diag.timing.push(
            Stage::Schedule.label(),
            (self.backend.now_sec() - sched_start) * 1000.0,
        );
        Ok(())
    }

    fn filter_voxels(&self, fc: &mut FrameContext) -> Result<()> {
        if !fc.decision.filtered {
            fc.diagnostics.timing.push(Stage::Filtering.label(), 0.0);
            return Ok(());
        }
        let voxels = std::mem::take(&mut fc.voxels);
        let tiles = &fc.partition.voxel_tiles;
        let chosen = &fc.decision.chosen_tile_coords;
        let (kept, span) = self
            .backend
            .enqueue(Stage::Filtering, Stream::Primary, || voxels.retain_tiles(tiles, chosen))?;
        // Timing capture point before bb3d.
        self.backend.synchronize(Stream::Primary)?;
        fc.diagnostics
            .timing
            .push(Stage::Filtering.label(), self.backend.span_ms(&span)?);
        fc.voxels = kept;
        Ok(())
    }

    /// bb3d on the primary stream while history is projected on the
    /// projection stream from a second host thread.
    fn backbone_3d_with_projection(
        &mut self,
        frame: &FrameInput,
        fc: &mut FrameContext,
    ) -> Result<M::Features> {
        let backend = &self.backend;
        let model = &self.model;
        let projection = &mut self.ctx.projection;
        let enabled = self.config.projection.enabled;
        let voxels = &fc.voxels;

        let (bb3d, projected) = std::thread::scope(|s| {
            let proj_handle = enabled.then(|| {
                s.spawn(move || {
                    backend.enqueue(Stage::Projection, Stream::Projection, || {
                        projection.project(&frame.pose, frame.timestamp_us)
                    })
                })
            });
            let bb3d = backend.enqueue(Stage::Backbone3d, Stream::Primary, || {
                model.backbone_3d(voxels)
            });
            let projected = proj_handle.map(|h| {
                h.join()
                    .unwrap_or_else(|_| Err(AnytimeError::stage("projection", "worker panicked")))
            });
            (bb3d, projected)
        });

        let (features, bb3d_span) = bb3d?;
        // Measured bb3d time is needed by schedule2.
        self.backend.synchronize(Stream::Primary)?;
        let bb3d_ms = self.backend.span_ms(&bb3d_span)?;
        fc.diagnostics.measured_bb3d_ms = bb3d_ms;
        match fc.decision.predicted_bb3d_ms {
            Some(pred) => fc
                .diagnostics
                .timing
                .push_predicted(Stage::Backbone3d.label(), bb3d_ms, pred),
            None => fc.diagnostics.timing.push(Stage::Backbone3d.label(), bb3d_ms),
        }

        if let Some(result) = projected {
            let (dets, span) = result?;
            self.backend.synchronize(Stream::Projection)?;
            fc.diagnostics
                .timing
                .push(Stage::Projection.label(), self.backend.span_ms(&span)?);
            fc.diagnostics.projected_detections = dets.len();
            fc.projections = Some(split_by_head(
                &dets,
                &self.config.class_to_head,
                self.config.num_det_heads,
            ));
        }
        Ok(features)
    }

    fn schedule2(&mut self, fc: &mut FrameContext) -> Result<()> {
        let remaining_ms = remaining_time_ms(fc.diagnostics.deadline_sec, self.backend.now_sec());
        self.ctx.scheduler.schedule2(&mut fc.decision, remaining_ms);
        fc.diagnostics.remaining_ms_at_schedule2 = remaining_ms;
        fc.diagnostics.chosen_tiles_2 = fc.decision.chosen_tile_coords.clone();
        fc.diagnostics.filtered = fc.decision.filtered;
        Ok(())
    }

    fn heads(&mut self, features: M::Features, fc: &mut FrameContext) -> Result<()> {
        let chosen = fc.decision.chosen_tile_coords.clone();
        let model = &self.model;
        let backend = &self.backend;

        let (bev, span) = backend.enqueue(Stage::Backbone2d, Stream::Primary, || {
            model.backbone_2d(features, &chosen)
        })?;
        let bb2d_span = span;
        let (maps, head_pre_span) = backend.enqueue(Stage::HeadPre, Stream::Primary, || {
            model.head_pre(bev, &chosen)
        })?;
        // Active heads are a host-side decision.
        backend.synchronize(Stream::Primary)?;
        let heads = model.active_heads(&maps);

        if let Some(predictor) = self.ctx.predictor.as_ref() {
            let remaining_ms = remaining_time_ms(fc.diagnostics.deadline_sec, backend.now_sec());
            fc.diagnostics.schedule3 =
                Some(self.ctx.scheduler.schedule3(predictor, &heads, remaining_ms)?);
        }

        let (per_head, head_post_span) = backend.enqueue(Stage::HeadPost, Stream::Primary, || {
            model.head_post(maps, &heads)
        })?;
        backend.synchronize(Stream::Primary)?;

        let timing = &mut fc.diagnostics.timing;
        timing.push(Stage::Backbone2d.label(), backend.span_ms(&bb2d_span)?);
        timing.push(Stage::HeadPre.label(), backend.span_ms(&head_pre_span)?);
        timing.push(Stage::HeadPost.label(), backend.span_ms(&head_post_span)?);
        fc.diagnostics.active_heads = heads;
        fc.diagnostics.fresh_detections = per_head.iter().map(|d| d.len()).sum();
        fc.head_detections = per_head;
        Ok(())
    }

    /// Merge fresh and projected detections per head.
    fn fuse(&self, fc: &mut FrameContext) -> DetectionSet {
        let fresh = std::mem::take(&mut fc.head_detections);
        let Some(projections) = fc.projections.take() else {
            return fresh.into_iter().flatten().collect();
        };
        let start = self.backend.now_sec();
        let params = self.config.nms.params();
        let mut out = DetectionSet::new();
        let mut fresh = fresh.into_iter();
        for proj in projections {
            let mut merged = fresh.next().unwrap_or_default();
            if proj.is_empty() {
                out.extend(merged);
                continue;
            }
            merged.extend(proj);
            out.extend(nms(merged, &params));
        }
        // Heads beyond the configured count pass through.
        for rest in fresh {
            out.extend(rest);
        }
        fc.diagnostics
            .timing
            .push(Stage::Fusion.label(), (self.backend.now_sec() - start) * 1000.0);
        out
    }

    /// Data-collection mode: run every rotation window of every frame with a
    /// forced tile subset and record the measured stage times.
    pub fn collect_calibration(&mut self, frames: &[FrameInput]) -> Result<CalibrationData> {
        let mut recorder =
            CalibrationRecorder::new(self.config.tile_count, self.config.num_det_heads);
        info!("calibration sweep over {} frames", frames.len());

        // Warm-up run, not recorded.
        if let Some(first) = frames.first() {
            let voxels = self.grid.pillarize(&first.points);
            let partition = self.layout.partition(&voxels.coords)?;
            if !partition.nonempty.is_empty() {
                self.run_forced(&voxels, &partition, partition.nonempty.tiles())?;
            }
        }

        for (i, frame) in frames.iter().enumerate() {
            recorder.begin_sample(&frame.scene_token);
            let voxels = self.grid.pillarize(&frame.points);
            let partition = self.layout.partition(&voxels.coords)?;
            let windows = sweep_windows(&partition.nonempty);
            for window in &windows {
                let (timing, heads) = self.run_forced(&voxels, &partition, window)?;
                recorder.record(window, &partition.nonempty, &heads, timing)?;
            }
            debug!("calibration sample {i}: {} subsets", windows.len());
        }
        Ok(recorder.finish())
    }

    /// Run the timed stages on a forced tile subset.
    pub fn run_forced(
        &self,
        voxels: &VoxelSet,
        partition: &TilePartition,
        chosen: &[TileId],
    ) -> Result<(SweepTiming, Vec<usize>)> {
        let backend = &self.backend;
        let model = &self.model;
        let (kept, filter_span) = backend.enqueue(Stage::Filtering, Stream::Primary, || {
            voxels.retain_tiles(&partition.voxel_tiles, chosen)
        })?;
        let (features, bb3d_span) = backend.enqueue(Stage::Backbone3d, Stream::Primary, || {
            model.backbone_3d(&kept)
        })?;
        let (bev, bb2d_span) = backend.enqueue(Stage::Backbone2d, Stream::Primary, || {
            model.backbone_2d(features, chosen)
        })?;
        let (maps, head_pre_span) = backend.enqueue(Stage::HeadPre, Stream::Primary, || {
            model.head_pre(bev, chosen)
        })?;
        backend.synchronize(Stream::Primary)?;
        let heads = model.active_heads(&maps);
        let (_, head_post_span) = backend.enqueue(Stage::HeadPost, Stream::Primary, || {
            model.head_post(maps, &heads)
        })?;
        backend.synchronize(Stream::Primary)?;
        let timing = SweepTiming {
            filtering_ms: backend.span_ms(&filter_span)?,
            bb3d_ms: backend.span_ms(&bb3d_span)?,
            bb2d_ms: backend.span_ms(&bb2d_span)?,
            head_pre_ms: backend.span_ms(&head_pre_span)?,
            head_post_ms: backend.span_ms(&head_post_span)?,
        };
        Ok((timing, heads))
    }
}
