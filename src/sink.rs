// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Consumers of classified frames.
//!
//! The classification stage calls [`FrameSink::consume`] once per completed
//! frame and waits for it to return, so a slow sink directly limits the
//! pipeline's consumption rate.

use crate::{
    cancel::CancelToken,
    lidar::{Error, Frame, timestamp},
    source::save_frame,
};
use kanal::Sender;
use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};
use tracing::{debug, error, info};

pub trait FrameSink: Send {
    fn consume(&mut self, frame: Frame);
}

impl<F> FrameSink for F
where
    F: FnMut(Frame) + Send,
{
    fn consume(&mut self, frame: Frame) {
        self(frame)
    }
}

/// Logs the size and end-to-end latency of every frame.
#[derive(Debug, Default)]
pub struct ConsoleSink {
    frames: u64,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn report(&mut self, frame: &Frame) {
        self.frames += 1;
        let now = timestamp().unwrap_or(0);
        let latency_ms = now.saturating_sub(frame.timestamp) as f64 / 1e6;
        info!(
            seq = frame.seq,
            points = frame.len(),
            latency_ms,
            "final data size: {}",
            frame.len()
        );
    }
}

impl FrameSink for ConsoleSink {
    fn consume(&mut self, frame: Frame) {
        self.report(&frame);
    }
}

/// Writes each frame to `<dir>/frame_<seq>.txt`.
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// Create the output directory if needed.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self, Error> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, seq: u64) -> PathBuf {
        self.dir.join(format!("frame_{:06}.txt", seq))
    }

    /// Write `frame`; failures are logged and otherwise ignored.
    pub fn write(&mut self, frame: &Frame) {
        let path = self.path_for(frame.seq);
        match save_frame(&path, frame) {
            Ok(()) => debug!(path = %path.display(), "wrote frame"),
            Err(e) => error!(path = %path.display(), "could not write frame: {}", e),
        }
    }
}

impl FrameSink for DirectorySink {
    fn consume(&mut self, frame: Frame) {
        self.write(&frame);
    }
}

/// Forwards frames to another thread over a kanal channel.
///
/// A bounded channel makes the classification stage wait for the receiver,
/// the same back-pressure the slot buffers apply upstream. The wait ends when
/// the pipeline is cancelled, and the frame is dropped.
pub struct ChannelSink {
    tx: Sender<Frame>,
    cancel: CancelToken,
}

impl ChannelSink {
    /// Interval between attempts while the channel is full.
    const RETRY: Duration = Duration::from_millis(1);

    pub fn new(tx: Sender<Frame>, cancel: &CancelToken) -> Self {
        Self {
            tx,
            cancel: cancel.clone(),
        }
    }
}

impl FrameSink for ChannelSink {
    fn consume(&mut self, frame: Frame) {
        let seq = frame.seq;
        let mut pending = Some(frame);

        loop {
            match self.tx.try_send_option(&mut pending) {
                Ok(true) => return,
                Ok(false) => {}
                Err(_) => {
                    debug!(seq, "frame receiver closed, dropping frame");
                    return;
                }
            }
            if !self.cancel.sleep_until(Instant::now() + Self::RETRY) {
                debug!(seq, "cancelled while the receiver was full, dropping frame");
                return;
            }
        }
    }
}
