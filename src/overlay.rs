//! Display surface abstraction and the overlays drawn onto it.

use crate::{
    attention::AttentionVote,
    frame::{Frame, RGBA_CHANNELS},
    gaze::GazeEstimate,
    line_detection::LineCluster,
    utils::safe_cast::{f64_to_i64_clamp, i64_to_index},
    verification::{DetectionEvent, Validity},
    Error, Result,
};
use nalgebra::Point2;

/// Drawing coordinates beyond this are clamped before rasterizing
const MAX_COORDINATE: i64 = 1 << 16;

/// RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLUE: Self = Self::rgb(0, 0, 255);
    pub const GREEN: Self = Self::rgb(0, 255, 0);
    pub const RED: Self = Self::rgb(255, 0, 0);
    pub const YELLOW: Self = Self::rgb(255, 255, 0);
    pub const WHITE: Self = Self::rgb(255, 255, 255);

    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    const fn bytes(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// Write-only drawing target
pub trait DisplaySurface {
    /// Replace the surface contents with an RGBA image
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer does not match the dimensions
    fn blit_rgba(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<()>;

    fn draw_line(&mut self, from: Point2<f64>, to: Point2<f64>, color: Color, thickness: u32);

    fn draw_text(&mut self, text: &str, at: Point2<f64>, color: Color);
}

/// Surface that discards everything, for headless runs
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSurface;

impl DisplaySurface for NullSurface {
    fn blit_rgba(&mut self, _pixels: &[u8], _width: u32, _height: u32) -> Result<()> {
        Ok(())
    }

    fn draw_line(&mut self, _from: Point2<f64>, _to: Point2<f64>, _color: Color, _thickness: u32) {}

    fn draw_text(&mut self, _text: &str, _at: Point2<f64>, _color: Color) {}
}

/// Text placed on a canvas
#[derive(Debug, Clone, PartialEq)]
pub struct TextAnnotation {
    pub text: String,
    pub at: Point2<f64>,
    pub color: Color,
}

/// In-memory RGBA raster; text is kept as annotations rather than rendered
#[derive(Debug, Clone)]
pub struct RgbaCanvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    texts: Vec<TextAnnotation>,
}

impl RgbaCanvas {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * RGBA_CHANNELS],
            texts: Vec::new(),
        }
    }

    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    #[must_use]
    pub fn texts(&self) -> &[TextAnnotation] {
        &self.texts
    }

    /// Color at `(x, y)`, if inside the canvas
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * RGBA_CHANNELS;
        Some([self.pixels[i], self.pixels[i + 1], self.pixels[i + 2], self.pixels[i + 3]])
    }

    /// Snapshot the raster as a frame
    ///
    /// # Errors
    ///
    /// Returns an error if the canvas has no pixels
    pub fn to_frame(&self, timestamp_ms: u64) -> Result<Frame> {
        Frame::new(self.pixels.clone(), self.width, self.height, timestamp_ms)
    }

    fn put(&mut self, x: i64, y: i64, color: Color) {
        let (Some(x), Some(y)) = (
            i64_to_index(x, self.width as usize),
            i64_to_index(y, self.height as usize),
        ) else {
            return;
        };
        let i = (y * self.width as usize + x) * RGBA_CHANNELS;
        self.pixels[i..i + RGBA_CHANNELS].copy_from_slice(&color.bytes());
    }

    fn brush(&mut self, x: i64, y: i64, color: Color, thickness: u32) {
        let t = i64::from(thickness.max(1));
        let lo = -(t - 1) / 2;
        for dy in lo..lo + t {
            for dx in lo..lo + t {
                self.put(x + dx, y + dy, color);
            }
        }
    }
}

impl DisplaySurface for RgbaCanvas {
    fn blit_rgba(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<()> {
        let expected = width as usize * height as usize * RGBA_CHANNELS;
        if pixels.len() != expected {
            return Err(Error::InvalidInput(format!(
                "Expected {expected} bytes for {width}x{height}, got {}",
                pixels.len()
            )));
        }
        self.width = width;
        self.height = height;
        self.pixels.clear();
        self.pixels.extend_from_slice(pixels);
        self.texts.clear();
        Ok(())
    }

    fn draw_line(&mut self, from: Point2<f64>, to: Point2<f64>, color: Color, thickness: u32) {
        let clamp = |v: f64| f64_to_i64_clamp(v, -MAX_COORDINATE, MAX_COORDINATE);
        let (mut x0, mut y0) = (clamp(from.x), clamp(from.y));
        let (x1, y1) = (clamp(to.x), clamp(to.y));

        // Bresenham
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        loop {
            self.brush(x0, y0, color, thickness);
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    fn draw_text(&mut self, text: &str, at: Point2<f64>, color: Color) {
        self.texts.push(TextAnnotation {
            text: text.to_string(),
            at,
            color,
        });
    }
}

/// Gaze lines from each pupil to its endpoint
pub fn draw_gaze<S: DisplaySurface + ?Sized>(surface: &mut S, estimate: &GazeEstimate) {
    for sample in [&estimate.left, &estimate.right] {
        surface.draw_line(sample.pupil, sample.endpoint, Color::BLUE, 2);
    }
}

/// Looking status text and, while tracking, the elapsed seconds
pub fn draw_attention<S: DisplaySurface + ?Sized>(
    surface: &mut S,
    vote: Option<AttentionVote>,
    elapsed_secs: Option<u64>,
    frame_width: u32,
) {
    let x = f64::from(frame_width) - 390.0;
    if let Some(vote) = vote {
        let (label, color) = if vote.looking {
            ("Looking: true", Color::GREEN)
        } else {
            ("Looking: false", Color::RED)
        };
        surface.draw_text(label, Point2::new(x, 30.0), color);
    }
    if let Some(secs) = elapsed_secs {
        surface.draw_text(&format!("Tracking: {secs}s"), Point2::new(x, 60.0), Color::WHITE);
    }
}

/// Representative segment for each merged line
pub fn draw_clusters<S: DisplaySurface + ?Sized>(surface: &mut S, clusters: &[LineCluster], half_length: f64) {
    for cluster in clusters {
        let (a, b) = cluster.segment(half_length);
        surface.draw_line(a, b, Color::RED, 2);
    }
}

/// One status line per recent detection event
pub fn draw_events<S: DisplaySurface + ?Sized>(surface: &mut S, events: &[DetectionEvent]) {
    for (row, event) in events.iter().enumerate() {
        let (status, color) = match event.validity {
            Validity::Pending => ("pending".to_string(), Color::YELLOW),
            Validity::Valid => (
                event.extracted_content.clone().unwrap_or_default(),
                Color::GREEN,
            ),
            Validity::Invalid => (event.detail.clone().unwrap_or_else(|| "invalid".to_string()), Color::RED),
        };
        #[allow(clippy::cast_precision_loss)] // a handful of rows
        let y = 30.0 + 30.0 * row as f64;
        surface.draw_text(&format!("{} @ {} ms: {status}", event.message, event.timestamp_ms), Point2::new(10.0, y), color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line_detection::LineObservation;

    #[test]
    fn test_horizontal_line_pixels() {
        let mut canvas = RgbaCanvas::new(20, 10);
        canvas.draw_line(Point2::new(2.0, 5.0), Point2::new(8.0, 5.0), Color::BLUE, 1);
        for x in 2..=8 {
            assert_eq!(canvas.pixel(x, 5), Some([0, 0, 255, 255]));
        }
        assert_eq!(canvas.pixel(9, 5), Some([0, 0, 0, 0]));
        assert_eq!(canvas.pixel(5, 4), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_thick_line_covers_neighbors() {
        let mut canvas = RgbaCanvas::new(20, 10);
        canvas.draw_line(Point2::new(2.0, 5.0), Point2::new(8.0, 5.0), Color::RED, 2);
        assert_eq!(canvas.pixel(4, 6), Some([255, 0, 0, 255]));
    }

    #[test]
    fn test_offscreen_line_is_clipped() {
        let mut canvas = RgbaCanvas::new(20, 10);
        let cluster = LineCluster::from_observation(LineObservation::new(3.0, std::f64::consts::FRAC_PI_2));
        draw_clusters(&mut canvas, &[cluster], 1000.0);
        for x in 0..20 {
            assert_eq!(canvas.pixel(x, 3).map(|p| p[0]), Some(255));
        }
    }

    #[test]
    fn test_blit_validates_size() {
        let mut canvas = RgbaCanvas::new(2, 2);
        assert!(canvas.blit_rgba(&[0; 15], 2, 2).is_err());
        canvas.draw_text("x", Point2::new(0.0, 0.0), Color::WHITE);
        canvas.blit_rgba(&[7; 16], 2, 2).unwrap();
        assert!(canvas.texts().is_empty());
        assert_eq!(canvas.pixel(1, 1), Some([7, 7, 7, 7]));
    }

    #[test]
    fn test_attention_text() {
        let mut canvas = RgbaCanvas::new(640, 480);
        let vote = AttentionVote {
            magnitude: 10.0,
            looking: true,
        };
        draw_attention(&mut canvas, Some(vote), Some(3), 640);
        assert_eq!(canvas.texts()[0].text, "Looking: true");
        assert_eq!(canvas.texts()[1].text, "Tracking: 3s");
    }
}
