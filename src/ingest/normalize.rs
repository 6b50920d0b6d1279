use anyhow::{anyhow, Result};

use crate::frame::PixelFormat;
use crate::vision::GrayImage;

// BT.601 weights in 14-bit fixed point (0.299, 0.587, 0.114).
const LUMA_R: u32 = 4899;
const LUMA_G: u32 = 9617;
const LUMA_B: u32 = 1868;
const LUMA_SHIFT: u32 = 14;

/// Convert a validated pixel buffer into a single-channel luma image.
///
/// `Frame::new` guarantees a buffer of `format.buffer_len(width, height)` bytes; anything
/// shorter is rejected here.
pub(crate) fn normalize_to_luma(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<GrayImage> {
    let plane = width as usize * height as usize;
    let y_plane = || {
        pixels
            .get(..plane)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| anyhow!("{:?} buffer shorter than its luma plane", format))
    };
    let data = match format {
        PixelFormat::Gray8 => y_plane()?,
        PixelFormat::Rgb24 => pixels
            .chunks_exact(3)
            .map(|px| weigh(px[0], px[1], px[2]))
            .collect(),
        PixelFormat::Bgr24 => pixels
            .chunks_exact(3)
            .map(|px| weigh(px[2], px[1], px[0]))
            .collect(),
        // Both YUV layouts already carry luma; only the chroma is dropped.
        PixelFormat::Nv12 => y_plane()?,
        PixelFormat::Yuyv => pixels.iter().step_by(2).copied().collect(),
    };
    GrayImage::from_raw(width, height, data)
        .ok_or_else(|| anyhow!("{:?} buffer does not cover {}x{}", format, width, height))
}

fn weigh(r: u8, g: u8, b: u8) -> u8 {
    let sum = r as u32 * LUMA_R + g as u32 * LUMA_G + b as u32 * LUMA_B;
    ((sum + (1 << (LUMA_SHIFT - 1))) >> LUMA_SHIFT).min(255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_and_bgr_agree_on_luma() -> Result<()> {
        let rgb = [255u8, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255];
        let bgr = [0u8, 0, 255, 0, 255, 0, 255, 0, 0, 255, 255, 255];

        let a = normalize_to_luma(&rgb, 2, 2, PixelFormat::Rgb24)?;
        let b = normalize_to_luma(&bgr, 2, 2, PixelFormat::Bgr24)?;

        assert_eq!(a, b);
        assert_eq!(a.as_raw(), &vec![76, 150, 29, 255]);
        Ok(())
    }

    #[test]
    fn yuv_layouts_keep_the_y_plane() -> Result<()> {
        let nv12 = [10u8, 20, 30, 40, 128, 128];
        let gray = normalize_to_luma(&nv12, 2, 2, PixelFormat::Nv12)?;
        assert_eq!(gray.as_raw(), &vec![10, 20, 30, 40]);

        let yuyv = [10u8, 128, 20, 128, 30, 128, 40, 128];
        let gray = normalize_to_luma(&yuyv, 2, 2, PixelFormat::Yuyv)?;
        assert_eq!(gray.as_raw(), &vec![10, 20, 30, 40]);
        Ok(())
    }

    #[test]
    fn short_buffers_are_rejected() {
        assert!(normalize_to_luma(&[1, 2, 3], 2, 2, PixelFormat::Gray8).is_err());
        assert!(normalize_to_luma(&[1, 2, 3], 2, 2, PixelFormat::Rgb24).is_err());
    }
}
