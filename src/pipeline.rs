// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! The three-stage acquisition → filtering → classification pipeline.
//!
//! ```text
//! ┌─────────────┐  slot A   ┌───────────┐  slot B   ┌────────────────┐
//! │ acquisition │ ────────► │ filtering │ ────────► │ classification │ ──► sink
//! │  (periodic) │ (1 frame) │   (ROI)   │ (1 frame) │  (driveable)   │
//! └─────────────┘           └───────────┘           └────────────────┘
//!        ▲                        ▲                         ▲
//!        └──────────── CancelToken::cancel() wakes all ─────┘
//! ```
//!
//! Each stage runs on its own named thread and owns the frame it is working
//! on. Stages never hold more than one buffer lock at a time.
//!
//! A stage ends when its input or output reports [`SlotError::Cancelled`]
//! (shutdown, in-flight frames are discarded) or [`SlotError::Disconnected`]
//! (the neighbouring stage finished, e.g. a finite source was exhausted, after
//! every pending frame has been delivered).

use crate::{
    buffer::{SlotConsumer, SlotError, SlotProducer, slot_buffer},
    cancel::CancelToken,
    common::{RealtimeConfig, SetupPolicy, apply_realtime},
    geometry::FrameTransform,
    jitter::JitterAccumulator,
    lidar::{Error, Frame, timestamp},
    schedule::Schedule,
    sink::FrameSink,
    source::FrameSource,
};
use std::{
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use tracing::{debug, info, info_span, trace, warn};

/// Pipeline timing and thread configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    /// Acquisition period, 100 ms for 10 Hz.
    pub period: Duration,
    /// Stop acquiring after this many frames and let the pipeline drain.
    pub frame_limit: Option<u64>,
    pub acquisition: RealtimeConfig,
    pub filtering: RealtimeConfig,
    pub classification: RealtimeConfig,
    pub setup_policy: SetupPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(100),
            frame_limit: None,
            acquisition: RealtimeConfig::default(),
            filtering: RealtimeConfig::default(),
            classification: RealtimeConfig::default(),
            setup_policy: SetupPolicy::default(),
        }
    }
}

/// The collaborators plugged into the pipeline, fixed for its lifetime.
pub struct Stages {
    pub source: Box<dyn FrameSource>,
    pub filter: Box<dyn FrameTransform>,
    pub classifier: Box<dyn FrameTransform>,
    pub sink: Box<dyn FrameSink>,
}

/// Summary returned once every stage has exited.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PipelineReport {
    /// Frames pushed into the first buffer.
    pub acquired: u64,
    /// Frames pushed into the second buffer.
    pub filtered: u64,
    /// Frames handed to the sink.
    pub classified: u64,
    /// Cycles that started after their deadline had already passed.
    pub overruns: u64,
    /// Wake lateness in seconds.
    pub jitter: JitterAccumulator,
}

#[derive(Debug, Default)]
struct AcquisitionStats {
    frames: u64,
    overruns: u64,
    jitter: JitterAccumulator,
}

/// A running pipeline.
///
/// Dropping it without calling [`Pipeline::join`] cancels the pipeline and
/// waits for the stages to exit.
pub struct Pipeline {
    cancel: CancelToken,
    initial_time: Instant,
    acquisition: Option<JoinHandle<Result<AcquisitionStats, Error>>>,
    filtering: Option<JoinHandle<Result<u64, Error>>>,
    classification: Option<JoinHandle<Result<u64, Error>>>,
}

impl Pipeline {
    /// Create both buffers and start the three stage threads.
    ///
    /// The first acquisition happens one period after this call. `cancel`
    /// may be shared with a termination handler installed beforehand.
    pub fn spawn(config: PipelineConfig, stages: Stages, cancel: CancelToken) -> Result<Self, Error> {
        if config.period.is_zero() {
            return Err(Error::Config("acquisition period must be non-zero".to_string()));
        }

        let (loaded_tx, loaded_rx) = slot_buffer::<Frame>(&cancel);
        let (preprocessed_tx, preprocessed_rx) = slot_buffer::<Frame>(&cancel);
        let initial_time = Instant::now() + config.period;

        let Stages {
            source,
            filter,
            classifier,
            sink,
        } = stages;

        let period = config.period;

        let classification = {
            let config = config.clone();
            spawn_stage("classification", cancel.clone(), move || {
                apply_realtime("classification", &config.classification, config.setup_policy)?;
                Ok(classification_stage(preprocessed_rx, classifier, sink))
            })?
        };

        let filtering = {
            let config = config.clone();
            spawn_stage("filtering", cancel.clone(), move || {
                apply_realtime("filtering", &config.filtering, config.setup_policy)?;
                Ok(filtering_stage(loaded_rx, preprocessed_tx, filter))
            })?
        };

        let acquisition = {
            let token = cancel.clone();
            spawn_stage("acquisition", cancel.clone(), move || {
                apply_realtime("acquisition", &config.acquisition, config.setup_policy)?;
                let schedule = Schedule::starting_at(initial_time, config.period);
                acquisition_stage(source, loaded_tx, schedule, &token, config.frame_limit)
            })?
        };

        info!(?period, "pipeline started");

        Ok(Self {
            cancel,
            initial_time,
            acquisition: Some(acquisition),
            filtering: Some(filtering),
            classification: Some(classification),
        })
    }

    /// Deadline of the first acquisition cycle.
    pub fn initial_time(&self) -> Instant {
        self.initial_time
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Request shutdown. Idempotent.
    pub fn shutdown(&self) {
        if self.cancel.cancel() {
            info!("pipeline shutdown requested");
        }
    }

    /// Wait for all three stages to exit.
    ///
    /// Returns the first stage error, in pipeline order, if any stage failed.
    pub fn join(mut self) -> Result<PipelineReport, Error> {
        let acquisition = join_stage("acquisition", self.acquisition.take());
        let filtering = join_stage("filtering", self.filtering.take());
        let classification = join_stage("classification", self.classification.take());

        let stats = acquisition?;
        let report = PipelineReport {
            acquired: stats.frames,
            filtered: filtering?,
            classified: classification?,
            overruns: stats.overruns,
            jitter: stats.jitter,
        };

        info!(
            acquired = report.acquired,
            filtered = report.filtered,
            classified = report.classified,
            overruns = report.overruns,
            "pipeline finished"
        );
        Ok(report)
    }
}

/// Spawn a named stage thread that cancels the pipeline if it fails.
fn spawn_stage<T, F>(
    name: &'static str,
    cancel: CancelToken,
    body: F,
) -> Result<JoinHandle<Result<T, Error>>, Error>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, Error> + Send + 'static,
{
    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let result = body();
            if let Err(e) = &result {
                warn!("{} stage failed: {}", name, e);
                cancel.cancel();
            }
            result
        })?;
    Ok(handle)
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.acquisition.is_none() {
            return;
        }
        self.shutdown();
        if let Some(handle) = self.acquisition.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.filtering.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.classification.take() {
            let _ = handle.join();
        }
    }
}

fn join_stage<T>(
    name: &'static str,
    handle: Option<JoinHandle<Result<T, Error>>>,
) -> Result<T, Error> {
    let handle = handle.ok_or(Error::WorkerPanicked(name))?;
    handle.join().map_err(|_| Error::WorkerPanicked(name))?
}

/// Periodic producer for the first buffer.
fn acquisition_stage(
    mut source: Box<dyn FrameSource>,
    mut output: SlotProducer<Frame>,
    mut schedule: Schedule,
    cancel: &CancelToken,
    frame_limit: Option<u64>,
) -> Result<AcquisitionStats, Error> {
    let mut stats = AcquisitionStats::default();

    loop {
        if frame_limit.is_some_and(|limit| stats.frames >= limit) {
            info!(frames = stats.frames, "frame limit reached");
            break;
        }

        let Some(tick) = schedule.wait(cancel) else {
            debug!("acquisition cancelled while sleeping");
            break;
        };
        if tick.overrun {
            stats.overruns += 1;
            warn!(
                cycle = tick.cycle,
                late_ms = tick.lateness.as_secs_f64() * 1e3,
                "acquisition cycle exceeded the configured period"
            );
        }
        stats.jitter.add_duration(tick.lateness);

        let Some(mut frame) = info_span!("acquire", cycle = tick.cycle).in_scope(|| source.produce())
        else {
            info!(frames = stats.frames, "frame source exhausted");
            break;
        };
        frame.seq = stats.frames;
        frame.timestamp = timestamp()?;

        match output.put(frame) {
            Ok(()) => trace!(seq = stats.frames, "frame loaded"),
            Err(SlotError::Cancelled) => {
                debug!("acquisition cancelled, discarding frame");
                break;
            }
            Err(SlotError::Disconnected) => {
                warn!("filtering stage is gone, stopping acquisition");
                break;
            }
        }

        stats.frames += 1;
        schedule.advance();
    }

    if stats.jitter.count() > 0 {
        info!(
            cycles = stats.jitter.count(),
            mean_us = stats.jitter.mean() * 1e6,
            stddev_us = stats.jitter.std_dev() * 1e6,
            overruns = stats.overruns,
            "acquisition timing"
        );
    }

    Ok(stats)
}

/// Region-of-interest stage between the two buffers.
fn filtering_stage(
    mut input: SlotConsumer<Frame>,
    mut output: SlotProducer<Frame>,
    mut filter: Box<dyn FrameTransform>,
) -> u64 {
    let mut frames = 0;

    loop {
        let frame = match input.take() {
            Ok(frame) => frame,
            Err(e) => {
                debug!("filtering stage exiting: {}", e);
                break;
            }
        };

        let reduced = info_span!("roi_filter", seq = frame.seq).in_scope(|| filter.apply(frame));

        if let Err(e) = output.put(reduced) {
            debug!("filtering stage exiting: {}", e);
            break;
        }
        frames += 1;
    }

    frames
}

/// Driveable-surface stage feeding the sink.
fn classification_stage(
    mut input: SlotConsumer<Frame>,
    mut classifier: Box<dyn FrameTransform>,
    mut sink: Box<dyn FrameSink>,
) -> u64 {
    let mut frames = 0;

    loop {
        let frame = match input.take() {
            Ok(frame) => frame,
            Err(e) => {
                debug!("classification stage exiting: {}", e);
                break;
            }
        };

        let seq = frame.seq;
        let driveable = info_span!("classify", seq).in_scope(|| classifier.apply(frame));
        info_span!("publish", seq).in_scope(|| sink.consume(driveable));
        frames += 1;
    }

    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lidar::Point3D;

    fn identity() -> Box<dyn FrameTransform> {
        Box::new(|frame: Frame| frame)
    }

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            period: Duration::from_millis(2),
            ..Default::default()
        }
    }

    #[test]
    fn test_zero_period_rejected() {
        let config = PipelineConfig {
            period: Duration::ZERO,
            ..Default::default()
        };
        let stages = Stages {
            source: Box::new(|| Some(Frame::default())),
            filter: identity(),
            classifier: identity(),
            sink: Box::new(|_: Frame| {}),
        };
        assert!(matches!(
            Pipeline::spawn(config, stages, CancelToken::new()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_frame_limit_drains_everything() {
        let (tx, rx) = kanal::unbounded();
        let config = PipelineConfig {
            frame_limit: Some(8),
            ..fast_config()
        };
        let stages = Stages {
            source: Box::new(|| Some(Frame::from_points(vec![Point3D::new(1.0, 0.0, 0.0)]))),
            filter: identity(),
            classifier: identity(),
            sink: Box::new(move |frame: Frame| {
                tx.send(frame.seq).unwrap();
            }),
        };

        let pipeline = Pipeline::spawn(config, stages, CancelToken::new()).unwrap();
        let report = pipeline.join().unwrap();

        assert_eq!(report.acquired, 8);
        assert_eq!(report.filtered, 8);
        assert_eq!(report.classified, 8);
        assert_eq!(report.jitter.count(), 8);

        let seqs: Vec<u64> = std::iter::from_fn(|| rx.try_recv().ok().flatten()).collect();
        assert_eq!(seqs, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_exhausted_source_ends_pipeline() {
        let mut remaining = 3;
        let stages = Stages {
            source: Box::new(move || {
                if remaining == 0 {
                    return None;
                }
                remaining -= 1;
                Some(Frame::default())
            }),
            filter: identity(),
            classifier: identity(),
            sink: Box::new(|_: Frame| {}),
        };

        let report = Pipeline::spawn(fast_config(), stages, CancelToken::new())
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(
            (report.acquired, report.filtered, report.classified),
            (3, 3, 3)
        );
    }

    #[test]
    fn test_strict_setup_failure_stops_pipeline() {
        let config = PipelineConfig {
            filtering: RealtimeConfig {
                priority: Some(1_000),
                cpu: None,
            },
            setup_policy: SetupPolicy::Strict,
            ..fast_config()
        };
        let stages = Stages {
            source: Box::new(|| Some(Frame::default())),
            filter: identity(),
            classifier: identity(),
            sink: Box::new(|_: Frame| {}),
        };

        let cancel = CancelToken::new();
        let pipeline = Pipeline::spawn(config, stages, cancel.clone()).unwrap();
        assert!(matches!(pipeline.join(), Err(Error::Setup(_))));
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn test_panicking_stage_is_reported() {
        let stages = Stages {
            source: Box::new(|| Some(Frame::default())),
            filter: Box::new(|_: Frame| -> Frame { panic!("filter bug") }),
            classifier: identity(),
            sink: Box::new(|_: Frame| {}),
        };

        let pipeline = Pipeline::spawn(fast_config(), stages, CancelToken::new()).unwrap();
        // The panic drops the filter's handles, which disconnects both
        // neighbours so the remaining stages exit on their own.
        assert!(matches!(
            pipeline.join(),
            Err(Error::WorkerPanicked("filtering"))
        ));
    }
}
