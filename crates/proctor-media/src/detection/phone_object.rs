//! Phone-like object heuristic.
//!
//! Classical shape analysis on OpenCV, no model:
//! 1. grayscale and Gaussian blur
//! 2. Canny edges, closed with a small kernel so broken outlines join up
//! 3. outer contours that do not touch the frame border
//! 4. candidate filters on area, aspect ratio, rectangularity and position,
//!    all measured on the object's outline
//!
//! Confidence is a weighted blend of size, aspect and rectangularity scores,
//! capped so the heuristic never claims certainty.

use opencv::core::{Mat, Point, Size, Vector};
use opencv::imgproc;
use opencv::prelude::MatTraitConst;
use proctor_models::{DetectionResult, SignalType};
use tracing::debug;

use super::cv::{cv_err, frame_to_gray};
use super::{BoundingBox, SignalDetector};
use crate::error::MediaResult;
use crate::sampling::Frame;

/// Tunables for the phone heuristic.
#[derive(Debug, Clone, PartialEq)]
pub struct PhoneObjectConfig {
    /// Odd Gaussian kernel size
    pub blur_kernel: i32,
    pub blur_sigma: f64,
    pub canny_low: f64,
    pub canny_high: f64,
    /// Square kernel for closing gaps in the edge map
    pub close_kernel: i32,
    pub min_area_fraction: f64,
    pub max_area_fraction: f64,
    pub min_aspect: f64,
    pub max_aspect: f64,
    pub min_rectangularity: f64,
    /// Candidates whose centre is above this fraction of the height must be
    /// horizontally centred
    pub upper_band: f64,
    /// Horizontal distance from the centre line, as a fraction of width
    pub center_tolerance: f64,
    pub max_confidence: f64,
}

impl Default for PhoneObjectConfig {
    fn default() -> Self {
        Self {
            blur_kernel: 5,
            blur_sigma: 1.0,
            canny_low: 50.0,
            canny_high: 150.0,
            close_kernel: 3,
            min_area_fraction: 0.03,
            max_area_fraction: 0.30,
            min_aspect: 1.2,
            max_aspect: 4.5,
            min_rectangularity: 0.5,
            upper_band: 0.3,
            center_tolerance: 0.15,
            max_confidence: 0.85,
        }
    }
}

/// Outline of one object, in pixels.
#[derive(Debug, Clone, PartialEq)]
struct Outline {
    bbox: BoundingBox,
    /// Pixels covered by the outline and everything inside it
    area: f64,
}

#[derive(Debug, Clone)]
struct Candidate {
    bbox: BoundingBox,
    aspect: f64,
    area_fraction: f64,
    rectangularity: f64,
    confidence: f64,
}

/// Heuristic phone-like object detector.
#[derive(Debug, Clone, Default)]
pub struct PhoneObjectDetector {
    config: PhoneObjectConfig,
}

impl PhoneObjectDetector {
    pub fn new(config: PhoneObjectConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PhoneObjectConfig {
        &self.config
    }

    fn edge_map(&self, frame: &Frame) -> MediaResult<Mat> {
        let c = &self.config;
        let gray = frame_to_gray(frame)?;

        let mut blurred = Mat::default();
        imgproc::gaussian_blur_def(&gray, &mut blurred, Size::new(c.blur_kernel, c.blur_kernel), c.blur_sigma)
            .map_err(cv_err("phone blur"))?;

        let mut edges = Mat::default();
        imgproc::canny_def(&blurred, &mut edges, c.canny_low, c.canny_high).map_err(cv_err("phone canny"))?;

        let kernel = imgproc::get_structuring_element_def(
            imgproc::MORPH_RECT,
            Size::new(c.close_kernel, c.close_kernel),
        )
        .map_err(cv_err("phone kernel"))?;
        let mut closed = Mat::default();
        imgproc::morphology_ex_def(&edges, &mut closed, imgproc::MORPH_CLOSE, &kernel)
            .map_err(cv_err("phone close"))?;
        Ok(closed)
    }

    /// Outer contours of the edge map, skipping anything cut by the border.
    fn outlines(&self, edges: &Mat) -> MediaResult<Vec<Outline>> {
        let (width, height) = (edges.cols(), edges.rows());

        let mut contours: Vector<Vector<Point>> = Vector::new();
        imgproc::find_contours_def(edges, &mut contours, imgproc::RETR_EXTERNAL, imgproc::CHAIN_APPROX_SIMPLE)
            .map_err(cv_err("phone contours"))?;

        let mut outlines = Vec::with_capacity(contours.len());
        for contour in contours.iter() {
            let rect = imgproc::bounding_rect(&contour).map_err(cv_err("phone bounding rect"))?;
            if rect.x <= 0 || rect.y <= 0 || rect.x + rect.width >= width || rect.y + rect.height >= height {
                continue;
            }

            // The polygon runs through boundary pixel centres; add the half
            // pixel it cuts off all round to get the covered pixel count.
            let polygon = imgproc::contour_area_def(&contour).map_err(cv_err("phone contour area"))?;
            let perimeter = imgproc::arc_length(&contour, true).map_err(cv_err("phone arc length"))?;

            outlines.push(Outline {
                bbox: BoundingBox::new(rect.x as f64, rect.y as f64, rect.width as f64, rect.height as f64),
                area: polygon + perimeter / 2.0 + 1.0,
            });
        }
        Ok(outlines)
    }

    fn candidate(&self, outline: &Outline, width: f64, height: f64) -> Option<Candidate> {
        let c = &self.config;
        let area_fraction = outline.area / (width * height);
        if area_fraction < c.min_area_fraction || area_fraction > c.max_area_fraction {
            return None;
        }

        let long = outline.bbox.width.max(outline.bbox.height);
        let short = outline.bbox.width.min(outline.bbox.height);
        if short <= 0.0 {
            return None;
        }
        let aspect = long / short;
        if aspect < c.min_aspect || aspect > c.max_aspect {
            return None;
        }

        let rectangularity = (outline.area / outline.bbox.area()).min(1.0);
        if rectangularity <= c.min_rectangularity {
            return None;
        }

        let in_lower_band = outline.bbox.cy() >= height * c.upper_band;
        let centred = (outline.bbox.cx() - width / 2.0).abs() <= width * c.center_tolerance;
        if !in_lower_band && !centred {
            return None;
        }

        // Typical handset: a few percent of the frame, about 2:1.
        let size_score = (area_fraction / 0.08).min(1.0);
        let aspect_score = (1.0 - (aspect - 2.0).abs() / 2.5).clamp(0.0, 1.0);
        let rect_score =
            ((rectangularity - c.min_rectangularity) / (1.0 - c.min_rectangularity)).clamp(0.0, 1.0);
        let blend = 0.3 * size_score + 0.3 * aspect_score + 0.4 * rect_score;

        Some(Candidate {
            bbox: outline.bbox,
            aspect,
            area_fraction,
            rectangularity,
            confidence: blend.min(c.max_confidence),
        })
    }

    fn candidates(&self, frame: &Frame) -> MediaResult<Vec<Candidate>> {
        let edges = self.edge_map(frame)?;
        let (w, h) = (frame.width() as f64, frame.height() as f64);
        Ok(self
            .outlines(&edges)?
            .iter()
            .filter_map(|o| self.candidate(o, w, h))
            .collect())
    }
}

impl SignalDetector for PhoneObjectDetector {
    fn signal_type(&self) -> SignalType {
        SignalType::PhoneObject
    }

    fn name(&self) -> &'static str {
        "phone_heuristic"
    }

    fn detect(&self, frame: &Frame, timestamp: f64) -> Option<DetectionResult> {
        if frame.width() < 3 || frame.height() < 3 {
            debug!(frame = frame.index, "Frame too small for shape analysis");
            return None;
        }

        let candidates = match self.candidates(frame) {
            Ok(candidates) => candidates,
            Err(e) => {
                debug!(frame = frame.index, error = %e, "Phone heuristic skipped frame");
                return None;
            }
        };

        let best = candidates
            .iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))?;

        Some(
            DetectionResult::new(SignalType::PhoneObject, best.confidence, timestamp)
                .with_meta("bbox", best.bbox.to_json())
                .with_meta("aspect_ratio", best.aspect)
                .with_meta("area_fraction", best.area_fraction)
                .with_meta("rectangularity", best.rectangularity)
                .with_meta("candidates", candidates.len())
                .with_meta("method", "edge_contour_heuristic"),
        )
    }
}
