// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod args;

use args::Args;
use clap::Parser as _;
use edgefirst_lidarpipe::{
    CancelToken, DriveableClassifier, Frame, FrameSink, FrameSource, Pipeline, PipelineConfig,
    RoiFilter, Stages,
    sink::{ConsoleSink, DirectorySink},
    source::{FileSource, SyntheticSource},
};
use tracing::info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.rust_log)
        .with_thread_names(true)
        .init();

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            info!("received termination signal, shutting down");
            cancel.cancel();
        })?;
    }

    let source: Box<dyn FrameSource> = if args.files.is_empty() {
        info!("no frame files given, using synthetic scene");
        Box::new(SyntheticSource::new())
    } else {
        let source = FileSource::open(&args.files)?;
        info!(files = source.len(), "replaying frame files");
        Box::new(source)
    };

    let mut console = ConsoleSink::new();
    let mut directory = args.output_dir.as_ref().map(DirectorySink::create).transpose()?;
    let sink = move |frame: Frame| {
        if let Some(directory) = directory.as_mut() {
            directory.write(&frame);
        }
        console.consume(frame);
    };

    let stages = Stages {
        source,
        filter: Box::new(RoiFilter::from(&args)),
        classifier: Box::new(DriveableClassifier::from(&args)),
        sink: Box::new(sink),
    };

    let pipeline = Pipeline::spawn(PipelineConfig::from(&args), stages, cancel)?;
    let report = pipeline.join()?;

    info!(
        acquired = report.acquired,
        classified = report.classified,
        overruns = report.overruns,
        jitter_mean_us = report.jitter.mean() * 1e6,
        jitter_stddev_us = report.jitter.std_dev() * 1e6,
        "done"
    );

    Ok(())
}
