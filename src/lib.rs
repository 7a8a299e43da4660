// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! EdgeFirst LiDAR Pipeline Library
//!
//! A periodic three-stage point cloud pipeline: acquisition, region of
//! interest filtering and driveable surface classification.
//!
//! # Architecture
//!
//! Stages are connected by single-slot buffers, so at most one frame is
//! pending between any two stages and a slow stage holds back the one before
//! it:
//!
//! ```text
//! ┌───────────────┐     ┌────────┐     ┌────────────┐     ┌────────┐     ┌──────────────────┐
//! │  FrameSource  │ ──► │ slot A │ ──► │ RoiFilter  │ ──► │ slot B │ ──► │ Driveable        │ ──► FrameSink
//! │  (periodic)   │     │  (1)   │     │            │     │  (1)   │     │ Classifier       │
//! └───────────────┘     └────────┘     └────────────┘     └────────┘     └──────────────────┘
//! ```
//!
//! Acquisition deadlines are computed as `initial_time + n * period`, never
//! from the wake time of the previous cycle, so the schedule does not drift.
//! A single [`CancelToken`] stops every stage, including stages blocked on a
//! buffer or sleeping until their next deadline.
//!
//! # Modules
//!
//! - [`buffer`]: Single-slot handoff buffer with cancellation
//! - [`cancel`]: Shared shutdown token
//! - [`common`]: Per-thread real-time scheduling and CPU affinity
//! - [`geometry`]: Region of interest filter and driveable surface classifier
//! - [`jitter`]: Running mean and variance of wake lateness
//! - [`lidar`]: Points, frames and error handling
//! - [`pipeline`]: Stage threads and lifecycle
//! - [`schedule`]: Drift-free periodic deadlines
//! - [`sink`]: Frame consumers
//! - [`source`]: Frame producers and the text frame format
//!
//! # Example
//!
//! ```no_run
//! use edgefirst_lidarpipe::{
//!     CancelToken, DriveableClassifier, Pipeline, PipelineConfig, RoiFilter, Stages,
//!     sink::ConsoleSink, source::SyntheticSource,
//! };
//!
//! let stages = Stages {
//!     source: Box::new(SyntheticSource::new()),
//!     filter: Box::new(RoiFilter::default()),
//!     classifier: Box::new(DriveableClassifier::default()),
//!     sink: Box::new(ConsoleSink::new()),
//! };
//!
//! let cancel = CancelToken::new();
//! let pipeline = Pipeline::spawn(PipelineConfig::default(), stages, cancel)?;
//! pipeline.shutdown();
//! let report = pipeline.join()?;
//! println!("classified {} frames", report.classified);
//! # Ok::<(), edgefirst_lidarpipe::Error>(())
//! ```

pub mod buffer;
pub mod cancel;
pub mod common;
pub mod geometry;
pub mod jitter;
pub mod lidar;
pub mod pipeline;
pub mod schedule;
pub mod sink;
pub mod source;

// Re-exports for convenience
pub use buffer::{SlotConsumer, SlotError, SlotProducer, slot_buffer};
pub use cancel::CancelToken;
pub use common::{RealtimeConfig, SetupPolicy};
pub use geometry::{DriveableClassifier, FrameTransform, RoiFilter};
pub use jitter::JitterAccumulator;
pub use lidar::{Error, Frame, Point3D};
pub use pipeline::{Pipeline, PipelineConfig, PipelineReport, Stages};
pub use schedule::{Schedule, Tick};
pub use sink::FrameSink;
pub use source::FrameSource;
