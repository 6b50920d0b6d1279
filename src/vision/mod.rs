//! Grayscale image operations used by the detection loop.
//!
//! Thin layer over `image` and `imageproc`:
//! - resize: `image::imageops::resize` (triangle filter, i.e. bilinear)
//! - blur: `imageproc::filter::gaussian_blur_f32`
//! - absdiff: `imageproc::map::map_colors2`
//! - threshold: `imageproc::contrast::threshold`
//! - dilation: `imageproc::morphology::dilate` (L-inf norm, one pixel per iteration)
//! - contours: `imageproc::contours::find_contours`, outer borders without a parent
//!
//! Every operation takes an input image by reference and returns a new image; the reference
//! frame held by the detector is never modified after it is stored.

use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};
use image::Luma;
use imageproc::contours::{find_contours, BorderType};
use imageproc::contrast::{threshold as threshold_binary, ThresholdType};
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::map::map_colors2;
use imageproc::morphology;
use imageproc::point::Point;

pub use image::GrayImage;

/// Count of non-zero pixels.
pub fn count_nonzero(image: &GrayImage) -> usize {
    image.pixels().filter(|p| p[0] != 0).count()
}

/// Scale to `width` columns, keeping the aspect ratio (`height = floor(h * width / w)`).
pub fn resize_to_width(image: &GrayImage, width: u32) -> GrayImage {
    if width == 0 || width == image.width() {
        return image.clone();
    }
    let height = ((image.height() as u64 * width as u64) / image.width() as u64).max(1) as u32;
    imageops::resize(image, width, height, FilterType::Triangle)
}

/// Sigma for an odd kernel size, `0.3 * ((ksize - 1) * 0.5 - 1) + 0.8`.
pub fn kernel_sigma(ksize: u32) -> f32 {
    0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Gaussian blur with the sigma implied by `ksize`. A kernel of 1 (or 0) leaves the image
/// untouched.
pub fn gaussian_blur(image: &GrayImage, ksize: u32) -> GrayImage {
    if ksize <= 1 {
        return image.clone();
    }
    gaussian_blur_f32(image, kernel_sigma(ksize))
}

/// Per-pixel `|a - b|`. Fails when the images differ in size.
pub fn abs_diff(a: &GrayImage, b: &GrayImage) -> Result<GrayImage> {
    if a.dimensions() != b.dimensions() {
        return Err(anyhow!(
            "image size mismatch: {}x{} vs {}x{}",
            a.width(),
            a.height(),
            b.width(),
            b.height()
        ));
    }
    Ok(map_colors2(a, b, |p: Luma<u8>, q: Luma<u8>| {
        Luma([p[0].abs_diff(q[0])])
    }))
}

/// Binary threshold: `value > cutoff` becomes 255, everything else 0.
pub fn threshold(image: &GrayImage, cutoff: u8) -> GrayImage {
    threshold_binary(image, cutoff, ThresholdType::Binary)
}

/// Dilate with a 3x3 square element, `iterations` times. Repeated 3x3 passes equal one pass of
/// a (2n+1)x(2n+1) square, which is what the L-inf norm with radius n gives.
pub fn dilate(image: &GrayImage, iterations: u32) -> GrayImage {
    if iterations == 0 {
        return image.clone();
    }
    let radius = iterations.min(u8::MAX as u32) as u8;
    morphology::dilate(image, Norm::LInf, radius)
}

// ----------------------------------------------------------------------------
// Contours
// ----------------------------------------------------------------------------

/// Outer boundary of one connected foreground region.
#[derive(Clone, Debug, PartialEq)]
pub struct Contour {
    /// Boundary pixels in tracing order.
    pub points: Vec<(u32, u32)>,
    /// Polygon area enclosed by `points`. A filled n x n block measures (n-1)^2.
    pub area: f64,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Outer contours of all foreground (non-zero) regions, in the raster order in which the
/// border following meets them. Regions nested inside another region's hole are skipped.
pub fn find_external_contours(mask: &GrayImage) -> Vec<Contour> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
        .filter_map(|c| contour_from_points(&c.points))
        .collect()
}

fn contour_from_points(points: &[Point<i32>]) -> Option<Contour> {
    let min_x = points.iter().map(|p| p.x).min()?;
    let max_x = points.iter().map(|p| p.x).max()?;
    let min_y = points.iter().map(|p| p.y).min()?;
    let max_y = points.iter().map(|p| p.y).max()?;
    Some(Contour {
        points: points.iter().map(|p| (p.x as u32, p.y as u32)).collect(),
        area: polygon_area(points),
        x: min_x as u32,
        y: min_y as u32,
        width: (max_x - min_x + 1) as u32,
        height: (max_y - min_y + 1) as u32,
    })
}

/// Shoelace area of a closed polygon through pixel centers.
fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();
    twice.abs() as f64 / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask(w: u32, h: u32, rects: &[(u32, u32, u32, u32)]) -> GrayImage {
        let mut image = GrayImage::new(w, h);
        for &(x, y, rw, rh) in rects {
            for row in y..y + rh {
                for col in x..x + rw {
                    image.put_pixel(col, row, Luma([255]));
                }
            }
        }
        image
    }

    #[test]
    fn resize_keeps_aspect_ratio() {
        let image = GrayImage::from_pixel(960, 540, Luma([42]));
        let resized = resize_to_width(&image, 480);
        assert_eq!(resized.dimensions(), (480, 270));
        assert!(resized.pixels().all(|p| p[0].abs_diff(42) <= 1));

        let same = resize_to_width(&image, 960);
        assert_eq!(same, image);
    }

    #[test]
    fn kernel_sigma_follows_kernel_size() {
        assert!((kernel_sigma(21) - 3.2).abs() < 1e-5);
        assert!((kernel_sigma(3) - 0.8).abs() < 1e-5);
    }

    #[test]
    fn blur_preserves_flat_images() {
        let image = GrayImage::from_pixel(30, 20, Luma([90]));
        let blurred = gaussian_blur(&image, 21);
        assert!(blurred.pixels().all(|p| p[0].abs_diff(90) <= 1));
        assert_eq!(gaussian_blur(&image, 1), image);
    }

    #[test]
    fn blur_spreads_a_point() {
        let image = mask(21, 21, &[(10, 10, 1, 1)]);
        let blurred = gaussian_blur(&image, 5);
        assert!(blurred.get_pixel(10, 10)[0] < 255);
        assert!(blurred.get_pixel(11, 10)[0] > 0);
        assert_eq!(blurred.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn abs_diff_and_threshold() -> Result<()> {
        let a = GrayImage::from_raw(3, 1, vec![10, 100, 200]).expect("image a");
        let b = GrayImage::from_raw(3, 1, vec![40, 100, 170]).expect("image b");
        let diff = abs_diff(&a, &b)?;
        assert_eq!(diff.as_raw(), &vec![30, 0, 30]);

        let edge = GrayImage::from_raw(3, 1, vec![25, 26, 0]).expect("edge");
        assert_eq!(threshold(&edge, 25).as_raw(), &vec![0, 255, 0]);

        assert!(abs_diff(&a, &GrayImage::new(1, 3)).is_err());
        Ok(())
    }

    #[test]
    fn dilate_grows_by_one_pixel_per_iteration() {
        let image = mask(20, 20, &[(8, 8, 2, 2)]);
        assert_eq!(count_nonzero(&dilate(&image, 1)), 4 * 4);
        assert_eq!(count_nonzero(&dilate(&image, 2)), 6 * 6);
        assert_eq!(dilate(&image, 0), image);

        let corner = mask(5, 5, &[(0, 0, 1, 1)]);
        assert_eq!(count_nonzero(&dilate(&corner, 1)), 4);
    }

    #[test]
    fn empty_mask_has_no_contours() {
        assert!(find_external_contours(&GrayImage::new(8, 8)).is_empty());
    }

    #[test]
    fn filled_block_area_matches_polygon_area() {
        let contours = find_external_contours(&mask(50, 50, &[(5, 7, 40, 40)]));
        assert_eq!(contours.len(), 1);
        let c = &contours[0];
        assert_eq!(c.area, 39.0 * 39.0);
        assert_eq!((c.x, c.y, c.width, c.height), (5, 7, 40, 40));
    }

    #[test]
    fn single_pixels_and_lines_have_zero_area() {
        let contours = find_external_contours(&mask(10, 10, &[(1, 1, 1, 1), (4, 6, 5, 1)]));
        assert_eq!(contours.len(), 2);
        assert!(contours.iter().all(|c| c.area == 0.0));
        assert_eq!(contours[0].points, vec![(1, 1)]);
        assert_eq!(contours[1].width, 5);
    }

    #[test]
    fn diagonal_pixels_are_one_region() {
        let contours = find_external_contours(&mask(6, 6, &[(1, 1, 1, 1), (2, 2, 1, 1)]));
        assert_eq!(contours.len(), 1);
    }

    #[test]
    fn regions_inside_holes_are_not_reported() {
        // Ring 20x20 with a 2-pixel wall and a dot in the middle.
        let ring = mask(
            30,
            30,
            &[
                (5, 5, 20, 2),
                (5, 23, 20, 2),
                (5, 5, 2, 20),
                (23, 5, 2, 20),
                (14, 14, 2, 2),
            ],
        );
        let contours = find_external_contours(&ring);
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].area, 19.0 * 19.0);
    }

    #[test]
    fn separate_regions_are_ordered_by_raster_position() {
        let contours = find_external_contours(&mask(40, 40, &[(20, 2, 5, 5), (2, 10, 10, 10)]));
        assert_eq!(contours.len(), 2);
        assert_eq!((contours[0].x, contours[0].y), (20, 2));
        assert_eq!(contours[0].area, 16.0);
        assert_eq!(contours[1].area, 81.0);
    }

    #[test]
    fn regions_touching_the_border_are_traced() {
        let contours = find_external_contours(&mask(10, 10, &[(0, 0, 10, 3)]));
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].area, 9.0 * 2.0);
    }
}
