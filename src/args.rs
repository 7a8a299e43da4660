// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use edgefirst_lidarpipe::{
    DriveableClassifier, PipelineConfig, RealtimeConfig, RoiFilter, SetupPolicy,
};
use std::{path::PathBuf, time::Duration};
use tracing::level_filters::LevelFilter;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Point cloud files to replay in order, one `x y z` point per line.
    /// The list repeats until shutdown.  Without files a synthetic street
    /// scene is generated instead.
    #[arg(env = "FRAME_FILES", value_delimiter = ' ')]
    pub files: Vec<PathBuf>,

    /// Acquisition period in milliseconds
    #[arg(long, env, default_value = "100")]
    pub period_ms: u64,

    /// Stop after acquiring this many frames, once they have been processed
    #[arg(long, env)]
    pub frames: Option<u64>,

    /// Region of interest distance ahead of the vehicle, in metres
    #[arg(long, env, default_value = "30.0")]
    pub roi_forward: f32,

    /// Region of interest lateral half-width, in metres
    #[arg(long, env, default_value = "15.0")]
    pub roi_side: f32,

    /// Region of interest height limit, in metres
    #[arg(long, env, default_value = "2.0")]
    pub roi_top: f32,

    /// Driveable grid distance ahead of the vehicle, in metres
    #[arg(long, env, default_value = "30.0")]
    pub drive_forward: f32,

    /// Driveable grid lateral half-width, in metres
    #[arg(long, env, default_value = "15.0")]
    pub drive_side: f32,

    /// Maximum height spread inside one grid cell, in metres
    #[arg(long, env, default_value = "0.5")]
    pub max_diff: f32,

    /// Maximum ground slope between neighbouring cells (rise over run)
    #[arg(long, env, default_value = "0.15")]
    pub max_incline: f32,

    /// SCHED_FIFO priority for the acquisition thread
    #[arg(long, env)]
    pub acquisition_priority: Option<i32>,

    /// CPU for the acquisition thread
    #[arg(long, env)]
    pub acquisition_cpu: Option<usize>,

    /// SCHED_FIFO priority for the filtering thread
    #[arg(long, env)]
    pub filtering_priority: Option<i32>,

    /// CPU for the filtering thread
    #[arg(long, env)]
    pub filtering_cpu: Option<usize>,

    /// SCHED_FIFO priority for the classification thread
    #[arg(long, env)]
    pub classification_priority: Option<i32>,

    /// CPU for the classification thread
    #[arg(long, env)]
    pub classification_cpu: Option<usize>,

    /// Whether real-time setup failures are fatal
    #[arg(long, env, default_value = "best-effort")]
    pub realtime_setup: SetupPolicy,

    /// Write every classified frame to this directory
    #[arg(long, env)]
    pub output_dir: Option<PathBuf>,

    /// Application log level
    #[arg(long, env, default_value = "info")]
    pub rust_log: LevelFilter,
}

impl From<&Args> for PipelineConfig {
    fn from(args: &Args) -> Self {
        PipelineConfig {
            period: Duration::from_millis(args.period_ms),
            frame_limit: args.frames,
            acquisition: RealtimeConfig {
                priority: args.acquisition_priority,
                cpu: args.acquisition_cpu,
            },
            filtering: RealtimeConfig {
                priority: args.filtering_priority,
                cpu: args.filtering_cpu,
            },
            classification: RealtimeConfig {
                priority: args.classification_priority,
                cpu: args.classification_cpu,
            },
            setup_policy: args.realtime_setup,
        }
    }
}

impl From<&Args> for RoiFilter {
    fn from(args: &Args) -> Self {
        RoiFilter {
            forward: args.roi_forward,
            side: args.roi_side,
            top: args.roi_top,
        }
    }
}

impl From<&Args> for DriveableClassifier {
    fn from(args: &Args) -> Self {
        DriveableClassifier::new(
            args.drive_forward,
            args.drive_side,
            args.max_diff,
            args.max_incline,
        )
    }
}
