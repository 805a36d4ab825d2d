//! Offline frame and landmark sources for replaying sessions without a camera.
//!
//! A landmark recording is a JSON Lines file, one object per frame:
//!
//! ```text
//! {"timestamp_ms": 0, "width": 640, "height": 480, "faces": [[{"x": 0.5, "y": 0.4, "z": 0.0}, ...]]}
//! ```
//!
//! `faces` holds zero or one landmark set. A line with `"not_ready": true`
//! replays as a frame that was not yet available.

use crate::{
    frame::{Frame, FramePoll, FrameSource},
    landmarks::{LandmarkDetector, LandmarkSet},
    utils::image_conversion::load_frame,
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, VecDeque},
    fs,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// One line of a landmark recording
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedFrame {
    pub timestamp_ms: u64,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub faces: Vec<LandmarkSet>,
    #[serde(default)]
    pub not_ready: bool,
}

/// Parsed landmark recording
#[derive(Debug, Clone, Default)]
pub struct LandmarkRecording {
    frames: Vec<RecordedFrame>,
}

impl LandmarkRecording {
    #[must_use]
    pub const fn new(frames: Vec<RecordedFrame>) -> Self {
        Self { frames }
    }

    /// Read a JSON Lines recording; blank lines are skipped
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a line is not a valid frame
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(fs::File::open(path)?);
        let mut frames = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let frame: RecordedFrame = serde_json::from_str(&line).map_err(|e| {
                Error::InvalidInput(format!("{}:{}: {e}", path.display(), line_no + 1))
            })?;
            frames.push(frame);
        }
        log::info!("Loaded {} recorded frames from {}", frames.len(), path.display());
        Ok(Self { frames })
    }

    /// Write the recording as JSON Lines
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut out = String::new();
        for frame in &self.frames {
            out.push_str(&serde_json::to_string(frame)?);
            out.push('\n');
        }
        fs::write(path, out)?;
        Ok(())
    }

    #[must_use]
    pub fn frames(&self) -> &[RecordedFrame] {
        &self.frames
    }

    /// Split into a frame source and the matching landmark detector
    #[must_use]
    pub fn into_sources(self) -> (RecordedFrames, RecordedLandmarks) {
        let mut faces = HashMap::new();
        let mut slots = VecDeque::with_capacity(self.frames.len());
        for frame in self.frames {
            slots.push_back(FrameSlot {
                timestamp_ms: frame.timestamp_ms,
                width: frame.width,
                height: frame.height,
                not_ready: frame.not_ready,
            });
            if !frame.not_ready {
                faces.insert(frame.timestamp_ms, frame.faces);
            }
        }
        (RecordedFrames { slots }, RecordedLandmarks { faces })
    }
}

#[derive(Debug, Clone, Copy)]
struct FrameSlot {
    timestamp_ms: u64,
    width: u32,
    height: u32,
    not_ready: bool,
}

/// Blank frames timed like the recording
#[derive(Debug, Clone)]
pub struct RecordedFrames {
    slots: VecDeque<FrameSlot>,
}

impl FrameSource for RecordedFrames {
    fn poll_frame(&mut self) -> Result<FramePoll> {
        let Some(slot) = self.slots.pop_front() else {
            return Ok(FramePoll::Ended);
        };
        if slot.not_ready {
            return Ok(FramePoll::NotReady);
        }
        Ok(FramePoll::Ready(Frame::filled(
            slot.width,
            slot.height,
            [0, 0, 0, 255],
            slot.timestamp_ms,
        )?))
    }
}

/// Landmark detector answering from a recording, keyed by frame timestamp
#[derive(Debug, Clone, Default)]
pub struct RecordedLandmarks {
    faces: HashMap<u64, Vec<LandmarkSet>>,
}

impl LandmarkDetector for RecordedLandmarks {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<LandmarkSet>> {
        Ok(self.faces.remove(&frame.timestamp_ms()).unwrap_or_default())
    }
}

/// Frames held in memory, mostly for tests
#[derive(Debug, Default)]
pub struct FrameQueue {
    polls: VecDeque<FramePoll>,
}

impl FrameQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_frames(frames: impl IntoIterator<Item = Frame>) -> Self {
        Self {
            polls: frames.into_iter().map(FramePoll::Ready).collect(),
        }
    }

    pub fn push(&mut self, frame: Frame) {
        self.polls.push_back(FramePoll::Ready(frame));
    }

    pub fn push_not_ready(&mut self) {
        self.polls.push_back(FramePoll::NotReady);
    }
}

impl FrameSource for FrameQueue {
    fn poll_frame(&mut self) -> Result<FramePoll> {
        Ok(self.polls.pop_front().unwrap_or(FramePoll::Ended))
    }
}

/// Image files from a directory, in file-name order, stamped at a fixed rate
#[derive(Debug, Clone)]
pub struct ImageSequenceSource {
    paths: VecDeque<PathBuf>,
    frame_interval_ms: f64,
    index: u64,
}

impl ImageSequenceSource {
    /// Collect the images in `dir`
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read, holds no images, or `fps` is not positive
    pub fn from_dir<P: AsRef<Path>>(dir: P, fps: f64) -> Result<Self> {
        if !(fps > 0.0) {
            return Err(Error::InvalidInput(format!("Frame rate must be positive, got {fps}")));
        }
        let dir = dir.as_ref();
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            })
            .collect();
        if paths.is_empty() {
            return Err(Error::InvalidInput(format!("No images found in {}", dir.display())));
        }
        paths.sort();
        log::info!("Replaying {} images from {} at {fps} fps", paths.len(), dir.display());
        Ok(Self {
            paths: paths.into(),
            frame_interval_ms: 1000.0 / fps,
            index: 0,
        })
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.paths.len()
    }
}

impl FrameSource for ImageSequenceSource {
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn poll_frame(&mut self) -> Result<FramePoll> {
        let Some(path) = self.paths.pop_front() else {
            return Ok(FramePoll::Ended);
        };
        let timestamp_ms = (self.index as f64 * self.frame_interval_ms).round() as u64;
        self.index += 1;
        Ok(FramePoll::Ready(load_frame(&path, timestamp_ms)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::Landmark;
    use std::io::Write;

    fn face() -> LandmarkSet {
        LandmarkSet::new(vec![Landmark::new(0.5, 0.5, 0.0); 478]).unwrap()
    }

    #[test]
    fn test_recording_file_roundtrip() {
        let recording = LandmarkRecording::new(vec![
            RecordedFrame {
                timestamp_ms: 0,
                width: 8,
                height: 6,
                faces: vec![face()],
                not_ready: false,
            },
            RecordedFrame {
                timestamp_ms: 33,
                width: 8,
                height: 6,
                faces: Vec::new(),
                not_ready: true,
            },
        ]);
        let file = tempfile::NamedTempFile::new().unwrap();
        recording.to_file(file.path()).unwrap();

        let loaded = LandmarkRecording::from_file(file.path()).unwrap();
        assert_eq!(loaded.frames().len(), 2);
        assert_eq!(loaded.frames()[0].faces.len(), 1);
        assert!(loaded.frames()[1].not_ready);
    }

    #[test]
    fn test_sources_replay_in_order() {
        let recording = LandmarkRecording::new(vec![
            RecordedFrame {
                timestamp_ms: 10,
                width: 4,
                height: 4,
                faces: vec![face()],
                not_ready: false,
            },
            RecordedFrame {
                timestamp_ms: 20,
                width: 4,
                height: 4,
                faces: Vec::new(),
                not_ready: true,
            },
        ]);
        let (mut frames, mut landmarks) = recording.into_sources();

        let FramePoll::Ready(frame) = frames.poll_frame().unwrap() else {
            panic!("expected a frame");
        };
        assert_eq!(frame.timestamp_ms(), 10);
        assert_eq!(landmarks.detect(&frame).unwrap().len(), 1);
        assert!(matches!(frames.poll_frame().unwrap(), FramePoll::NotReady));
        assert!(matches!(frames.poll_frame().unwrap(), FramePoll::Ended));
    }

    #[test]
    fn test_invalid_line_reports_position() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{\"timestamp_ms\": 0, \"width\": 4, \"height\": 4}}").unwrap();
        writeln!(file, "not json").unwrap();
        let err = LandmarkRecording::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains(":2:"));
    }

    #[test]
    fn test_image_directory_source() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.png"] {
            image::RgbaImage::from_pixel(3, 2, image::Rgba([1, 2, 3, 255]))
                .save(dir.path().join(name))
                .unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "skip me").unwrap();

        let mut source = ImageSequenceSource::from_dir(dir.path(), 10.0).unwrap();
        assert_eq!(source.remaining(), 2);
        let FramePoll::Ready(first) = source.poll_frame().unwrap() else {
            panic!("expected a frame");
        };
        let FramePoll::Ready(second) = source.poll_frame().unwrap() else {
            panic!("expected a frame");
        };
        assert_eq!((first.width(), first.height()), (3, 2));
        assert_eq!(second.timestamp_ms(), 100);
        assert!(matches!(source.poll_frame().unwrap(), FramePoll::Ended));
    }

    #[test]
    fn test_empty_directory_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ImageSequenceSource::from_dir(dir.path(), 30.0).is_err());
        assert!(ImageSequenceSource::from_dir(dir.path(), 0.0).is_err());
    }
}
