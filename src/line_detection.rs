//! Axis-aligned line detection on a background-subtracted foreground mask.
//!
//! Per frame: grayscale, foreground mask, standard polar Hough transform,
//! raw-count guard, axis-alignment filter, then greedy clustering of the
//! surviving `(rho, theta)` observations.

use crate::{
    background::BackgroundModel,
    buffers::FrameBuffers,
    constants::{
        DEFAULT_AXIS_TOLERANCE_DEG, DEFAULT_BACKGROUND_HISTORY, DEFAULT_HOUGH_THRESHOLD, DEFAULT_MAX_RAW_LINES,
        DEFAULT_RHO_TOLERANCE_PX, DEFAULT_THETA_TOLERANCE_DEG, DEFAULT_VAR_THRESHOLD, HOUGH_THETA_BINS, MASK_BACKGROUND,
    },
    frame::Frame,
    utils::{
        image_conversion::rgba_to_gray,
        safe_cast::{f64_to_i64_clamp, i64_to_index},
    },
    Error, Result,
};
use nalgebra::Point2;
use ndarray::Array2;
use serde::Serialize;
use std::f64::consts::{FRAC_PI_2, PI};

/// Polar line parameters: `x cos(theta) + y sin(theta) = rho`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LineObservation {
    pub rho: f64,
    /// Radians in `[0, pi)`
    pub theta: f64,
}

impl LineObservation {
    #[must_use]
    pub const fn new(rho: f64, theta: f64) -> Self {
        Self { rho, theta }
    }

    /// Whether `other` lies within the given rho/theta tolerances of this line
    #[must_use]
    pub fn is_near(&self, other: &Self, rho_tolerance: f64, theta_tolerance: f64) -> bool {
        (self.rho - other.rho).abs() < rho_tolerance && (self.theta - other.theta).abs() < theta_tolerance
    }
}

/// Running sum of the observations merged into one physical edge
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LineCluster {
    pub theta_sum: f64,
    pub rho_sum: f64,
    pub count: usize,
}

impl LineCluster {
    #[must_use]
    pub const fn from_observation(line: LineObservation) -> Self {
        Self {
            theta_sum: line.theta,
            rho_sum: line.rho,
            count: 1,
        }
    }

    pub fn add(&mut self, line: LineObservation) {
        self.theta_sum += line.theta;
        self.rho_sum += line.rho;
        self.count += 1;
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)] // cluster sizes are tiny
    pub fn average(&self) -> LineObservation {
        let n = self.count.max(1) as f64;
        LineObservation {
            rho: self.rho_sum / n,
            theta: self.theta_sum / n,
        }
    }

    /// Endpoints of a segment of `half_length` either side of the foot of the perpendicular
    #[must_use]
    pub fn segment(&self, half_length: f64) -> (Point2<f64>, Point2<f64>) {
        let line = self.average();
        let (b, a) = line.theta.sin_cos();
        let x0 = a * line.rho;
        let y0 = b * line.rho;
        (
            Point2::new(x0 - half_length * b, y0 + half_length * a),
            Point2::new(x0 + half_length * b, y0 - half_length * a),
        )
    }
}

/// True when `theta` is within `tolerance` radians of 0, pi/2 or pi
#[must_use]
pub fn is_approximately_vertical_or_horizontal(theta: f64, tolerance: f64) -> bool {
    [0.0, FRAC_PI_2, PI]
        .iter()
        .any(|axis| (theta - axis).abs() <= tolerance)
}

/// Greedy clustering: each line joins the first cluster whose running average is within tolerance
#[must_use]
pub fn cluster_lines(lines: &[LineObservation], rho_tolerance: f64, theta_tolerance: f64) -> Vec<LineCluster> {
    let mut clusters: Vec<LineCluster> = Vec::new();
    for &line in lines {
        match clusters
            .iter_mut()
            .find(|c| c.average().is_near(&line, rho_tolerance, theta_tolerance))
        {
            Some(cluster) => cluster.add(line),
            None => clusters.push(LineCluster::from_observation(line)),
        }
    }
    clusters
}

/// Number of rho bins needed for a `width x height` image at 1 px resolution
#[must_use]
pub fn hough_rho_bins(width: usize, height: usize) -> usize {
    diagonal(width, height) * 2 + 1
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn diagonal(width: usize, height: usize) -> usize {
    ((width * width + height * height) as f64).sqrt().ceil() as usize
}

/// Standard Hough transform over the non-zero pixels of `mask`
///
/// Returns lines with more than `threshold` votes that are local maxima
/// in the accumulator, strongest first. `accumulator` must be zeroed and
/// shaped `hough_rho_bins(w, h) x 180`.
///
/// # Errors
///
/// Returns an error if the accumulator has the wrong shape
#[allow(clippy::cast_precision_loss)]
pub fn hough_lines(mask: &Array2<u8>, accumulator: &mut Array2<u32>, threshold: u32) -> Result<Vec<LineObservation>> {
    let (height, width) = mask.dim();
    let rho_bins = hough_rho_bins(width, height);
    if accumulator.dim() != (rho_bins, HOUGH_THETA_BINS) {
        return Err(Error::DimensionMismatch {
            operation: "hough_lines",
            left: accumulator.dim(),
            right: (rho_bins, HOUGH_THETA_BINS),
        });
    }

    let offset = diagonal(width, height) as i64;
    let max_index = rho_bins as i64 - 1;
    let trig: Vec<(f64, f64)> = (0..HOUGH_THETA_BINS)
        .map(|t| (t as f64 * PI / HOUGH_THETA_BINS as f64).sin_cos())
        .collect();

    for ((y, x), &value) in mask.indexed_iter() {
        if value == MASK_BACKGROUND {
            continue;
        }
        let (xf, yf) = (x as f64, y as f64);
        for (t, &(sin, cos)) in trig.iter().enumerate() {
            let rho = f64_to_i64_clamp(xf * cos + yf * sin, -offset, offset);
            if let Some(r) = i64_to_index(rho + offset, rho_bins) {
                accumulator[(r, t)] += 1;
            }
        }
    }

    let at = |r: i64, t: i64| -> u32 {
        if r < 0 || r > max_index || t < 0 || t >= HOUGH_THETA_BINS as i64 {
            0
        } else {
            accumulator[(r as usize, t as usize)]
        }
    };

    let mut peaks: Vec<(u32, usize, usize)> = Vec::new();
    for ((r, t), &votes) in accumulator.indexed_iter() {
        if votes <= threshold {
            continue;
        }
        let (ri, ti) = (r as i64, t as i64);
        if votes > at(ri - 1, ti) && votes >= at(ri + 1, ti) && votes > at(ri, ti - 1) && votes >= at(ri, ti + 1) {
            peaks.push((votes, r, t));
        }
    }
    peaks.sort_by(|a, b| b.0.cmp(&a.0));

    Ok(peaks
        .into_iter()
        .map(|(_, r, t)| LineObservation {
            rho: r as f64 - offset as f64,
            theta: trig_angle(t),
        })
        .collect())
}

#[allow(clippy::cast_precision_loss)]
fn trig_angle(bin: usize) -> f64 {
    bin as f64 * PI / HOUGH_THETA_BINS as f64
}

/// Tunable line detection parameters (angles in radians)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineParams {
    pub background_history: usize,
    pub var_threshold: f32,
    pub hough_threshold: u32,
    pub max_raw_lines: usize,
    pub axis_tolerance: f64,
    pub rho_tolerance: f64,
    pub theta_tolerance: f64,
}

impl Default for LineParams {
    fn default() -> Self {
        Self {
            background_history: DEFAULT_BACKGROUND_HISTORY,
            var_threshold: DEFAULT_VAR_THRESHOLD,
            hough_threshold: DEFAULT_HOUGH_THRESHOLD,
            max_raw_lines: DEFAULT_MAX_RAW_LINES,
            axis_tolerance: DEFAULT_AXIS_TOLERANCE_DEG.to_radians(),
            rho_tolerance: DEFAULT_RHO_TOLERANCE_PX,
            theta_tolerance: DEFAULT_THETA_TOLERANCE_DEG.to_radians(),
        }
    }
}

/// Per-frame detection result
#[derive(Debug, Clone, Default)]
pub struct LineDetection {
    /// Lines found by the Hough transform before any filtering
    pub raw_count: usize,
    /// True when the frame exceeded the raw line limit and was skipped
    pub discarded: bool,
    /// Axis-aligned lines that survived filtering
    pub observations: Vec<LineObservation>,
    pub clusters: Vec<LineCluster>,
}

/// Session-scoped detector owning the background model and scratch buffers
#[derive(Debug)]
pub struct LineDetector {
    params: LineParams,
    background: BackgroundModel,
    buffers: FrameBuffers,
}

impl LineDetector {
    /// Create a detector with a fresh background model
    ///
    /// # Errors
    ///
    /// Returns an error if the background parameters are invalid
    pub fn new(params: LineParams) -> Result<Self> {
        Ok(Self {
            background: BackgroundModel::new(params.background_history, params.var_threshold)?,
            buffers: FrameBuffers::new(),
            params,
        })
    }

    #[must_use]
    pub const fn params(&self) -> &LineParams {
        &self.params
    }

    /// Most recent foreground mask
    #[must_use]
    pub const fn mask(&self) -> &Array2<u8> {
        &self.buffers.mask
    }

    #[must_use]
    pub const fn buffers(&self) -> &FrameBuffers {
        &self.buffers
    }

    /// Run the full per-frame pipeline
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be converted or the mask shape is inconsistent
    pub fn process(&mut self, frame: &Frame) -> Result<LineDetection> {
        self.buffers.ensure_size(frame.width(), frame.height());
        rgba_to_gray(frame, &mut self.buffers.gray)?;
        self.background.apply(&self.buffers.gray, &mut self.buffers.mask)?;

        let (height, width) = self.buffers.mask.dim();
        self.buffers
            .reset_accumulator(hough_rho_bins(width, height), HOUGH_THETA_BINS);
        let raw = hough_lines(&self.buffers.mask, &mut self.buffers.accumulator, self.params.hough_threshold)?;

        Ok(self.filter_and_cluster(&raw))
    }

    /// Apply the raw-count guard, axis filter and clustering to Hough output
    #[must_use]
    pub fn filter_and_cluster(&self, raw: &[LineObservation]) -> LineDetection {
        if raw.len() > self.params.max_raw_lines {
            log::debug!(
                "Discarding noisy frame: {} raw lines exceeds limit {}",
                raw.len(),
                self.params.max_raw_lines
            );
            return LineDetection {
                raw_count: raw.len(),
                discarded: true,
                ..LineDetection::default()
            };
        }

        let observations: Vec<LineObservation> = raw
            .iter()
            .copied()
            .filter(|l| is_approximately_vertical_or_horizontal(l.theta, self.params.axis_tolerance))
            .collect();
        let clusters = cluster_lines(&observations, self.params.rho_tolerance, self.params.theta_tolerance);

        LineDetection {
            raw_count: raw.len(),
            discarded: false,
            observations,
            clusters,
        }
    }
}
