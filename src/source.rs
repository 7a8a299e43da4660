// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Frame source abstraction for the acquisition stage.
//!
//! This module provides a [`FrameSource`] trait that abstracts where frames
//! come from, enabling:
//!
//! - **File replay**: cycling through recorded point cloud files
//! - **Synthetic scenes**: deterministic generated frames without a sensor
//! - **Testing**: any `FnMut() -> Option<Frame>` closure
//!
//! Frame files are plain text with one point per line, `x y z` separated by
//! whitespace. Blank lines and lines starting with `#` are ignored.

use crate::lidar::{Error, Frame, Point3D};
use std::{
    fs::File,
    io::{BufRead as _, BufReader, BufWriter, Write as _},
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

/// Trait for frame sources.
///
/// Called once per acquisition cycle from the acquisition thread. The call
/// may block; its latency is taken out of the cycle's slack.
pub trait FrameSource: Send {
    /// Produce the next frame, or `None` when the source is exhausted.
    fn produce(&mut self) -> Option<Frame>;
}

impl<F> FrameSource for F
where
    F: FnMut() -> Option<Frame> + Send,
{
    fn produce(&mut self) -> Option<Frame> {
        self()
    }
}

/// Read a frame file.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn load_frame(path: impl AsRef<Path>) -> Result<Frame, Error> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let mut frame = Frame::default();

    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parse_error = |msg: String| Error::Parse {
            path: path.to_path_buf(),
            line: n + 1,
            msg,
        };

        let mut values = [0.0f32; 3];
        let mut fields = line.split_whitespace();
        for value in values.iter_mut() {
            let field = fields
                .next()
                .ok_or_else(|| parse_error("expected 3 values".to_string()))?;
            *value = field
                .parse()
                .map_err(|e| parse_error(format!("{:?}: {}", field, e)))?;
        }
        if fields.next().is_some() {
            return Err(parse_error("expected 3 values".to_string()));
        }

        frame.points.push(Point3D::new(values[0], values[1], values[2]));
    }

    debug!(points = frame.len(), "loaded frame");
    Ok(frame)
}

/// Write a frame file readable by [`load_frame`].
pub fn save_frame(path: impl AsRef<Path>, frame: &Frame) -> Result<(), Error> {
    let mut writer = BufWriter::new(File::create(path)?);
    for p in &frame.points {
        writeln!(writer, "{} {} {}", p.x, p.y, p.z)?;
    }
    writer.flush()?;
    Ok(())
}

/// Cycles through a fixed list of frame files.
///
/// All files are parsed up front so that a bad file fails at start-up rather
/// than mid-run, and so that each `produce` call is only a copy.
pub struct FileSource {
    paths: Vec<PathBuf>,
    frames: Vec<Frame>,
    next: usize,
}

impl FileSource {
    pub fn open<P: AsRef<Path>>(paths: &[P]) -> Result<Self, Error> {
        if paths.is_empty() {
            return Err(Error::Config("no frame files given".to_string()));
        }

        let paths: Vec<PathBuf> = paths.iter().map(|p| p.as_ref().to_path_buf()).collect();
        let frames = paths.iter().map(load_frame).collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            paths,
            frames,
            next: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Path of the file the next frame will be read from.
    pub fn next_path(&self) -> &Path {
        &self.paths[self.next]
    }
}

impl FrameSource for FileSource {
    fn produce(&mut self) -> Option<Frame> {
        let frame = self.frames[self.next].clone();
        self.next = (self.next + 1) % self.frames.len();
        Some(frame)
    }
}

/// Generates a deterministic street scene.
///
/// The scene has a flat road ahead of and behind the vehicle, a low
/// overhanging sign above the height limit, a wall across part of the road
/// and a steep embankment to one side. A small deterministic ripple varies
/// with the frame counter.
pub struct SyntheticSource {
    spacing: f32,
    frame: u64,
}

impl SyntheticSource {
    /// Road surface height relative to the sensor.
    const GROUND_Z: f32 = -1.5;

    pub fn new() -> Self {
        Self::with_spacing(0.5)
    }

    /// Use a different sample spacing (metres).
    pub fn with_spacing(spacing: f32) -> Self {
        Self {
            spacing: spacing.max(0.05),
            frame: 0,
        }
    }

    fn generate(&self) -> Frame {
        let s = self.spacing;
        let ripple = (self.frame % 5) as f32 * 0.002;

        // Road from 10 m behind to 40 m ahead, 20 m either side.
        let nx = (50.0 / s) as usize;
        let ny = (40.0 / s) as usize;
        let nw = (6.0 / s) as usize;
        let nh = (2.5 / s) as usize;
        let mut frame = Frame::with_capacity(nx * ny + nw * nh + nw);
        let points = &mut frame.points;

        for i in 0..nx {
            for j in 0..ny {
                let x = -10.0 + s * (i as f32 + 0.5);
                let y = -20.0 + s * (j as f32 + 0.5);
                let z = if y > 8.0 {
                    // Embankment rising at 60%.
                    Self::GROUND_Z + 0.6 * (y - 8.0)
                } else {
                    Self::GROUND_Z + ripple * ((i + j) % 3) as f32
                };
                points.push(Point3D::new(x, y, z));
            }
        }

        // Wall 20 m ahead spanning y in [-3, 3].
        for j in 0..nw {
            for k in 0..nh {
                let y = -3.0 + s * (j as f32 + 0.5);
                let z = Self::GROUND_Z + s * k as f32;
                points.push(Point3D::new(20.0 + s * 0.5, y, z));
            }
        }

        // Overhead sign at 3 m, above the region of interest.
        for j in 0..nw {
            points.push(Point3D::new(12.0, -3.0 + s * j as f32, 3.0));
        }

        frame
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for SyntheticSource {
    fn produce(&mut self) -> Option<Frame> {
        let frame = self.generate();
        self.frame += 1;
        Some(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{DriveableClassifier, FrameTransform as _, RoiFilter};
    use std::io::Write as _;

    #[test]
    fn test_load_frame_parses_points() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# x y z").unwrap();
        writeln!(file, "1 2 3").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "  -0.5\t4.25  -1e-1 ").unwrap();

        let frame = load_frame(file.path()).unwrap();
        assert_eq!(
            frame.points,
            vec![Point3D::new(1.0, 2.0, 3.0), Point3D::new(-0.5, 4.25, -0.1)]
        );
    }

    #[test]
    fn test_load_frame_reports_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1 2 3").unwrap();
        writeln!(file, "1 2").unwrap();

        match load_frame(file.path()) {
            Err(Error::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected parse error, got {:?}", other),
        }

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1 2 three").unwrap();
        assert!(matches!(
            load_frame(file.path()),
            Err(Error::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.txt");
        let frame = Frame::from_points(vec![
            Point3D::new(0.1, -2.5, 3.75),
            Point3D::new(29.0, 14.5, -1.5),
        ]);

        save_frame(&path, &frame).unwrap();
        assert_eq!(load_frame(&path).unwrap().points, frame.points);
    }

    #[test]
    fn test_file_source_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<PathBuf> = (0..3)
            .map(|i| {
                let path = dir.path().join(format!("point_cloud{}.txt", i + 1));
                let points = vec![Point3D::new(i as f32, 0.0, 0.0); i + 1];
                save_frame(&path, &Frame::from_points(points)).unwrap();
                path
            })
            .collect();

        let mut source = FileSource::open(&paths).unwrap();
        assert!(!source.is_empty());
        assert_eq!(source.len(), 3);
        let sizes: Vec<usize> = (0..7).map(|_| source.produce().unwrap().len()).collect();
        assert_eq!(sizes, vec![1, 2, 3, 1, 2, 3, 1]);
        assert_eq!(source.next_path(), paths[1].as_path());
    }

    #[test]
    fn test_file_source_errors() {
        let empty: [PathBuf; 0] = [];
        assert!(matches!(FileSource::open(&empty), Err(Error::Config(_))));
        assert!(matches!(
            FileSource::open(&["/nonexistent/cloud.txt"]),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_synthetic_frame_size() {
        let frame = SyntheticSource::with_spacing(1.0).produce().unwrap();
        // 50 x 40 road, 6 x 2 wall, 6 sign points.
        assert_eq!(frame.len(), 2_000 + 12 + 6);
    }

    #[test]
    fn test_synthetic_scene_classification() {
        let mut source = SyntheticSource::new();
        let frame = source.produce().unwrap();
        let total = frame.len();

        let mut roi = RoiFilter::default();
        let reduced = roi.apply(frame);
        assert!(reduced.len() < total);
        assert!(reduced.points.iter().all(|p| p.x >= 0.0 && p.z <= 2.0));

        let mut classifier = DriveableClassifier::default();
        let driveable = classifier.apply(reduced.clone());
        assert!(!driveable.is_empty());
        assert!(driveable.len() < reduced.len());
        // Nothing on the embankment or in the wall survives.
        assert!(driveable.points.iter().all(|p| p.z < -1.4));
    }
}
