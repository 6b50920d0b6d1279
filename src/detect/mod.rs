//! Frame differencing against a fixed reference frame.
//!
//! `MotionDetector` turns a frame into motion `Region`s:
//! 1. Luma, resized to the working width
//! 2. Gaussian blur (sensor noise suppression)
//! 3. First frame only: stored as the reference and nothing else
//! 4. |reference - frame|, thresholded, dilated
//! 5. External contours -> regions
//!
//! `OccupancyTracker` turns the regions of each frame into status transitions.

mod state;

use anyhow::{Context, Result};

use crate::config::DetectorSettings;
use crate::frame::Frame;
use crate::vision::{self, Contour, GrayImage};

pub use state::{OccupancyTracker, TransitionRule};

/// A changed area of one frame, in working-resolution pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Area enclosed by the region's outer contour.
    pub area: f64,
}

impl From<&Contour> for Region {
    fn from(contour: &Contour) -> Self {
        Self {
            x: contour.x,
            y: contour.y,
            width: contour.width,
            height: contour.height,
            area: contour.area,
        }
    }
}

/// Result of differencing one frame against the reference.
#[derive(Clone, Debug, Default)]
pub struct FrameAnalysis {
    /// Regions in contour order.
    pub regions: Vec<Region>,
    /// Foreground pixels in the dilated mask.
    pub changed_pixels: usize,
}

impl FrameAnalysis {
    /// Largest region area, 0 when nothing changed.
    pub fn largest_area(&self) -> f64 {
        self.regions.iter().map(|r| r.area).fold(0.0, f64::max)
    }
}

pub struct MotionDetector {
    settings: DetectorSettings,
    reference: Option<GrayImage>,
}

impl MotionDetector {
    pub fn new(settings: DetectorSettings) -> Self {
        Self {
            settings,
            reference: None,
        }
    }

    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    /// The baseline frame, once the first frame has been seen.
    pub fn reference(&self) -> Option<&GrayImage> {
        self.reference.as_ref()
    }

    /// Grayscale, resized and blurred working image of `frame`.
    pub fn preprocess(&self, frame: &Frame) -> Result<GrayImage> {
        let gray = vision::resize_to_width(&frame.luma()?, self.settings.frame_width);
        Ok(vision::gaussian_blur(&gray, self.settings.blur_kernel))
    }

    /// Analyze one frame.
    ///
    /// The first frame becomes the reference and yields `Ok(None)`; every later frame is
    /// compared against it. The reference is never replaced.
    pub fn analyze(&mut self, frame: &Frame) -> Result<Option<FrameAnalysis>> {
        let current = self.preprocess(frame)?;
        let Some(reference) = &self.reference else {
            log::debug!(
                "reference frame set at {} ms ({}x{})",
                frame.position(),
                current.width(),
                current.height()
            );
            self.reference = Some(current);
            return Ok(None);
        };

        let delta = vision::abs_diff(reference, &current)
            .context("frame size differs from the reference frame")?;
        let mask = vision::threshold(&delta, self.settings.delta_threshold);
        let mask = vision::dilate(&mask, self.settings.dilate_iterations);
        let regions = vision::find_external_contours(&mask)
            .iter()
            .map(Region::from)
            .collect();

        Ok(Some(FrameAnalysis {
            regions,
            changed_pixels: vision::count_nonzero(&mask),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;

    fn gray_frame(w: u32, h: u32, square: Option<(u32, u32, u32)>) -> Frame {
        let mut data = vec![0u8; (w * h) as usize];
        if let Some((x, y, side)) = square {
            for row in y..y + side {
                for col in x..x + side {
                    data[(row * w + col) as usize] = 255;
                }
            }
        }
        Frame::new(data, w, h, PixelFormat::Gray8).unwrap()
    }

    fn settings() -> DetectorSettings {
        DetectorSettings {
            frame_width: 160,
            ..DetectorSettings::default()
        }
    }

    #[test]
    fn first_frame_only_sets_reference() -> Result<()> {
        let mut detector = MotionDetector::new(settings());
        assert!(detector.reference().is_none());
        assert!(detector.analyze(&gray_frame(160, 120, None))?.is_none());
        assert_eq!(detector.reference().map(|r| r.width()), Some(160));

        let analysis = detector.analyze(&gray_frame(160, 120, None))?.expect("analysis");
        assert!(analysis.regions.is_empty());
        assert_eq!(analysis.changed_pixels, 0);
        Ok(())
    }

    #[test]
    fn reference_is_never_replaced() -> Result<()> {
        let mut detector = MotionDetector::new(settings());
        detector.analyze(&gray_frame(160, 120, None))?;
        let before = detector.reference().cloned();
        detector.analyze(&gray_frame(160, 120, Some((60, 40, 40))))?;
        detector.analyze(&gray_frame(160, 120, Some((10, 10, 30))))?;
        assert_eq!(detector.reference().cloned(), before);
        Ok(())
    }

    #[test]
    fn square_yields_one_large_region() -> Result<()> {
        let mut detector = MotionDetector::new(settings());
        detector.analyze(&gray_frame(160, 120, None))?;
        let analysis = detector
            .analyze(&gray_frame(160, 120, Some((60, 40, 40))))?
            .expect("analysis");
        assert_eq!(analysis.regions.len(), 1);
        let region = &analysis.regions[0];
        assert!(region.area >= 1600.0, "area {}", region.area);
        assert!(region.x < 60 && region.x + region.width > 100);
        assert_eq!(analysis.largest_area(), region.area);
        Ok(())
    }

    #[test]
    fn frames_are_scaled_to_working_width() -> Result<()> {
        let mut detector = MotionDetector::new(settings());
        detector.analyze(&gray_frame(320, 240, None))?;
        let reference = detector.reference().expect("reference");
        assert_eq!((reference.width(), reference.height()), (160, 120));
        Ok(())
    }

    #[test]
    fn size_change_against_reference_is_an_error() -> Result<()> {
        let mut detector = MotionDetector::new(settings());
        detector.analyze(&gray_frame(160, 120, None))?;
        assert!(detector.analyze(&gray_frame(160, 90, None)).is_err());
        Ok(())
    }
}
