// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Common point cloud types and error handling.
//!
//! A [`Frame`] is the unit of work moved through the pipeline. It is owned by
//! exactly one stage at a time and is moved, never shared, at every handoff.

use crate::buffer::SlotError;
use std::{fmt, path::PathBuf};

/// A single LiDAR return in the vehicle frame (x forward, y left, z up).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point3D {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3D {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// One complete set of points captured and processed together.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Frame {
    /// Sequence number assigned by the acquisition stage.
    pub seq: u64,
    /// Acquisition timestamp in nanoseconds, see [`timestamp`].
    pub timestamp: u64,
    /// Point data, order is not significant.
    pub points: Vec<Point3D>,
}

impl Frame {
    /// Create an empty frame with room for `capacity` points.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            seq: 0,
            timestamp: 0,
            points: Vec::with_capacity(capacity),
        }
    }

    pub fn from_points(points: Vec<Point3D>) -> Self {
        Self {
            seq: 0,
            timestamp: 0,
            points,
        }
    }

    /// Build a frame carrying the same metadata as `self` with new points.
    pub fn derive(&self, points: Vec<Point3D>) -> Self {
        Self {
            seq: self.seq,
            timestamp: self.timestamp,
            points,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Common error type for pipeline operations.
#[derive(Debug)]
pub enum Error {
    /// I/O error (frame files, thread spawning)
    Io(std::io::Error),
    /// Malformed line in a frame file
    Parse {
        path: PathBuf,
        line: usize,
        msg: String,
    },
    /// Real-time setup (priority, affinity) failed under a strict policy
    Setup(String),
    /// Configuration error
    Config(String),
    /// A slot buffer operation did not complete
    Slot(SlotError),
    /// A worker thread panicked
    WorkerPanicked(&'static str),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Parse { path, line, msg } => {
                write!(f, "{}:{}: invalid point: {}", path.display(), line, msg)
            }
            Error::Setup(msg) => write!(f, "real-time setup failed: {}", msg),
            Error::Config(msg) => write!(f, "configuration error: {}", msg),
            Error::Slot(err) => write!(f, "slot buffer: {}", err),
            Error::WorkerPanicked(name) => write!(f, "{} worker panicked", name),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<SlotError> for Error {
    fn from(err: SlotError) -> Self {
        Error::Slot(err)
    }
}

/// Get current timestamp in nanoseconds.
///
/// On Linux, uses `CLOCK_MONOTONIC_RAW` for best accuracy.
/// On other platforms, falls back to `SystemTime`.
#[cfg(target_os = "linux")]
pub fn timestamp() -> Result<u64, Error> {
    let mut tp = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    let err = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC_RAW, &mut tp) };
    if err != 0 {
        return Err(std::io::Error::last_os_error().into());
    }

    Ok(tp.tv_sec as u64 * 1_000_000_000 + tp.tv_nsec as u64)
}

#[cfg(not(target_os = "linux"))]
pub fn timestamp() -> Result<u64, Error> {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| Error::Config(e.to_string()))?;
    Ok(duration.as_nanos() as u64)
}
