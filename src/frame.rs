//! Decoded frame container.
//!
//! - `RawFrame`: immutable decoded raster (dimensions, pixel format, planes, presentation index).
//! - `PixelFormat`: the plane layouts the pipeline understands.
//! - `ColorRange`: whether YUV samples use the full 0..=255 scale or the studio 16..=235 one.
//!
//! A `RawFrame` is created once per decoded picture and lives for exactly one pipeline
//! iteration. Consumers borrow it; nothing in the crate stores a frame past the iteration
//! that produced it. There are no `&mut` accessors, so a frame cannot change after creation.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

/// Plane layouts produced by frame sources.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed 8-bit B, G, R (display order).
    Bgr24,
    /// Packed 8-bit R, G, B.
    Rgb24,
    /// Planar Y, U, V with 2x2 chroma subsampling.
    Yuv420p,
    /// Planar Y followed by interleaved U/V at 2x2 subsampling.
    Nv12,
}

impl PixelFormat {
    pub fn name(&self) -> &'static str {
        match self {
            PixelFormat::Bgr24 => "bgr24",
            PixelFormat::Rgb24 => "rgb24",
            PixelFormat::Yuv420p => "yuv420p",
            PixelFormat::Nv12 => "nv12",
        }
    }

    /// Expected byte length of every plane for a `width` x `height` picture.
    pub fn plane_sizes(&self, width: u32, height: u32) -> Result<Vec<usize>> {
        let w = width as usize;
        let h = height as usize;
        let luma = w
            .checked_mul(h)
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        let chroma = chroma_dim(w) * chroma_dim(h);
        Ok(match self {
            PixelFormat::Bgr24 | PixelFormat::Rgb24 => vec![luma
                .checked_mul(3)
                .ok_or_else(|| anyhow!("frame dimensions overflow"))?],
            PixelFormat::Yuv420p => vec![luma, chroma, chroma],
            PixelFormat::Nv12 => vec![luma, chroma * 2],
        })
    }
}

/// Sample range of YUV planes. Packed RGB frames are always full range.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorRange {
    /// 0..=255 for luma and chroma (JPEG range).
    #[default]
    Full,
    /// Luma 16..=235, chroma 16..=240 (MPEG range, the usual H.264 output).
    Limited,
}

pub(crate) fn chroma_dim(luma_dim: usize) -> usize {
    luma_dim.div_ceil(2)
}

/// One decoded picture.
#[derive(Clone)]
pub struct RawFrame {
    width: u32,
    height: u32,
    format: PixelFormat,
    range: ColorRange,
    planes: Vec<Vec<u8>>,
    /// Presentation index assigned by the source, strictly increasing.
    index: u64,
}

// Pixel content stays out of debug output.
impl std::fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("range", &self.range)
            .field("planes", &self.planes.len())
            .field("index", &self.index)
            .finish()
    }
}

impl RawFrame {
    /// Build a frame, validating plane count and sizes against the pixel format.
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        planes: Vec<Vec<u8>>,
        index: u64,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("frame dimensions must be non-zero"));
        }
        let expected = format.plane_sizes(width, height)?;
        if planes.len() != expected.len() {
            return Err(anyhow!(
                "{} frame expects {} planes, got {}",
                format.name(),
                expected.len(),
                planes.len()
            ));
        }
        for (i, (plane, want)) in planes.iter().zip(&expected).enumerate() {
            if plane.len() != *want {
                return Err(anyhow!(
                    "{} plane {} length mismatch: expected {}, got {}",
                    format.name(),
                    i,
                    want,
                    plane.len()
                ));
            }
        }
        Ok(Self {
            width,
            height,
            format,
            range: ColorRange::Full,
            planes,
            index,
        })
    }

    /// Declare the sample range of a YUV frame. Ignored for packed RGB formats.
    pub fn with_color_range(mut self, range: ColorRange) -> Self {
        if matches!(self.format, PixelFormat::Yuv420p | PixelFormat::Nv12) {
            self.range = range;
        }
        self
    }

    /// Wrap an RGB image as an `Rgb24` frame.
    pub fn from_rgb_image(image: RgbImage, index: u64) -> Result<Self> {
        let (width, height) = image.dimensions();
        Self::new(
            width,
            height,
            PixelFormat::Rgb24,
            vec![image.into_raw()],
            index,
        )
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn color_range(&self) -> ColorRange {
        self.range
    }

    pub fn planes(&self) -> &[Vec<u8>] {
        &self.planes
    }

    /// Normalize to a packed RGB image.
    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        let w = self.width as usize;
        let h = self.height as usize;
        let rgb = match self.format {
            PixelFormat::Rgb24 => self.planes[0].clone(),
            PixelFormat::Bgr24 => {
                let mut out = self.planes[0].clone();
                for px in out.chunks_exact_mut(3) {
                    px.swap(0, 2);
                }
                out
            }
            PixelFormat::Yuv420p => {
                let cw = chroma_dim(w);
                yuv_to_rgb(w, h, self.range, |i, j| {
                    let c = (j / 2) * cw + i / 2;
                    (
                        self.planes[0][j * w + i],
                        self.planes[1][c],
                        self.planes[2][c],
                    )
                })
            }
            PixelFormat::Nv12 => {
                let cw = chroma_dim(w);
                yuv_to_rgb(w, h, self.range, |i, j| {
                    let c = ((j / 2) * cw + i / 2) * 2;
                    (
                        self.planes[0][j * w + i],
                        self.planes[1][c],
                        self.planes[1][c + 1],
                    )
                })
            }
        };
        RgbImage::from_raw(self.width, self.height, rgb)
            .ok_or_else(|| anyhow!("RGB buffer does not match frame dimensions"))
    }

    /// Full-range planar YUV 4:2:0 planes (Y, U, V), the encoder input layout.
    /// Limited-range frames are expanded.
    pub fn to_yuv420p(&self) -> Result<[Vec<u8>; 3]> {
        let [y, u, v] = match self.format {
            PixelFormat::Yuv420p => [
                self.planes[0].clone(),
                self.planes[1].clone(),
                self.planes[2].clone(),
            ],
            PixelFormat::Nv12 => {
                let (u, v) = self.planes[1]
                    .chunks_exact(2)
                    .map(|uv| (uv[0], uv[1]))
                    .unzip();
                [self.planes[0].clone(), u, v]
            }
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => {
                let rgb = self.to_rgb_image()?;
                return Ok(rgb_to_yuv420p(&rgb));
            }
        };
        Ok(match self.range {
            ColorRange::Full => [y, u, v],
            ColorRange::Limited => [
                y.into_iter().map(|s| clamp_to_u8(expand_luma(s))).collect(),
                u.into_iter()
                    .map(|s| clamp_to_u8(expand_chroma(s) + 128.0))
                    .collect(),
                v.into_iter()
                    .map(|s| clamp_to_u8(expand_chroma(s) + 128.0))
                    .collect(),
            ],
        })
    }

    /// Baseline JPEG of the frame, for picture snapshots.
    pub fn to_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let rgb = self.to_rgb_image()?;
        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100))
            .encode_image(&rgb)
            .context("encode jpeg")?;
        Ok(bytes)
    }
}

fn expand_luma(y: u8) -> f32 {
    (y as f32 - 16.0) * 255.0 / 219.0
}

/// Centered chroma (-128..=127 on the full scale).
fn expand_chroma(c: u8) -> f32 {
    (c as f32 - 128.0) * 255.0 / 224.0
}

/// BT.601 YUV -> packed RGB.
fn yuv_to_rgb(
    w: usize,
    h: usize,
    range: ColorRange,
    sample: impl Fn(usize, usize) -> (u8, u8, u8),
) -> Vec<u8> {
    let mut rgb = vec![0u8; w * h * 3];
    for j in 0..h {
        for i in 0..w {
            let (y, u, v) = sample(i, j);
            let (y, u, v) = match range {
                ColorRange::Full => (y as f32, u as f32 - 128.0, v as f32 - 128.0),
                ColorRange::Limited => (expand_luma(y), expand_chroma(u), expand_chroma(v)),
            };

            let r = y + 1.402_f32 * v;
            let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
            let b = y + 1.772_f32 * u;

            let offset = (j * w + i) * 3;
            rgb[offset] = clamp_to_u8(r);
            rgb[offset + 1] = clamp_to_u8(g);
            rgb[offset + 2] = clamp_to_u8(b);
        }
    }
    rgb
}

/// Full-range BT.601 RGB -> YUV 4:2:0, chroma averaged over each 2x2 block.
pub(crate) fn rgb_to_yuv420p(image: &RgbImage) -> [Vec<u8>; 3] {
    let (width, height) = image.dimensions();
    let w = width as usize;
    let h = height as usize;
    let cw = chroma_dim(w);
    let ch = chroma_dim(h);

    let mut y_plane = vec![0u8; w * h];
    let mut u_acc = vec![0f32; cw * ch];
    let mut v_acc = vec![0f32; cw * ch];
    let mut counts = vec![0f32; cw * ch];

    for (x, y, px) in image.enumerate_pixels() {
        let r = px[0] as f32;
        let g = px[1] as f32;
        let b = px[2] as f32;
        let (x, y) = (x as usize, y as usize);
        y_plane[y * w + x] = clamp_to_u8(0.299 * r + 0.587 * g + 0.114 * b);
        let c = (y / 2) * cw + x / 2;
        u_acc[c] += -0.168_736 * r - 0.331_264 * g + 0.5 * b + 128.0;
        v_acc[c] += 0.5 * r - 0.418_688 * g - 0.081_312 * b + 128.0;
        counts[c] += 1.0;
    }

    let u_plane = u_acc
        .iter()
        .zip(&counts)
        .map(|(sum, n)| clamp_to_u8(sum / n))
        .collect();
    let v_plane = v_acc
        .iter()
        .zip(&counts)
        .map(|(sum, n)| clamp_to_u8(sum / n))
        .collect();
    [y_plane, u_plane, v_plane]
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_wrong_plane_sizes() {
        let err = RawFrame::new(4, 4, PixelFormat::Yuv420p, vec![vec![0; 16], vec![0; 4]], 0);
        assert!(err.is_err());

        let err = RawFrame::new(4, 4, PixelFormat::Rgb24, vec![vec![0; 47]], 0);
        assert!(err.is_err());

        let ok = RawFrame::new(
            5,
            3,
            PixelFormat::Yuv420p,
            vec![vec![0; 15], vec![0; 6], vec![0; 6]],
            7,
        )
        .unwrap();
        assert_eq!(ok.index(), 7);
    }

    #[test]
    fn nv12_conversion_produces_gray() -> Result<()> {
        let frame = RawFrame::new(
            2,
            2,
            PixelFormat::Nv12,
            vec![vec![128u8; 4], vec![128u8; 2]],
            0,
        )?;
        let rgb = frame.to_rgb_image()?;
        assert_eq!(rgb.into_raw(), vec![128u8; 12]);
        Ok(())
    }

    #[test]
    fn bgr_is_channel_swapped_rgb() -> Result<()> {
        let frame = RawFrame::new(1, 1, PixelFormat::Bgr24, vec![vec![30, 20, 10]], 0)?;
        assert_eq!(frame.to_rgb_image()?.into_raw(), vec![10, 20, 30]);
        Ok(())
    }

    #[test]
    fn rgb_to_yuv_keeps_solid_green_green() -> Result<()> {
        let image = RgbImage::from_pixel(6, 4, image::Rgb([0, 255, 0]));
        let frame = RawFrame::from_rgb_image(image, 0)?;
        let [y, u, v] = frame.to_yuv420p()?;
        assert_eq!(y.len(), 24);
        assert_eq!(u.len(), 6);
        assert_eq!(v.len(), 6);

        let back = RawFrame::new(6, 4, PixelFormat::Yuv420p, vec![y, u, v], 0)?;
        let px = *back.to_rgb_image()?.get_pixel(2, 2);
        assert!(px[0] < 8 && px[1] > 245 && px[2] < 8, "got {:?}", px);
        Ok(())
    }

    #[test]
    fn nv12_to_yuv420p_deinterleaves_chroma() -> Result<()> {
        let frame = RawFrame::new(
            2,
            2,
            PixelFormat::Nv12,
            vec![vec![1, 2, 3, 4], vec![100, 200]],
            0,
        )?;
        let [y, u, v] = frame.to_yuv420p()?;
        assert_eq!(y, vec![1, 2, 3, 4]);
        assert_eq!(u, vec![100]);
        assert_eq!(v, vec![200]);
        Ok(())
    }

    #[test]
    fn limited_range_expands_to_full_scale() -> Result<()> {
        // 2x2 picture: studio black on the top row, studio white below, neutral chroma.
        let planes = vec![vec![16, 16, 235, 235], vec![128], vec![128]];
        let limited = RawFrame::new(2, 2, PixelFormat::Yuv420p, planes.clone(), 0)?
            .with_color_range(ColorRange::Limited);
        assert_eq!(limited.color_range(), ColorRange::Limited);
        let rgb = limited.to_rgb_image()?;
        assert_eq!(*rgb.get_pixel(0, 0), image::Rgb([0, 0, 0]));
        assert_eq!(*rgb.get_pixel(1, 1), image::Rgb([255, 255, 255]));
        let [y, u, v] = limited.to_yuv420p()?;
        assert_eq!(y, vec![0, 0, 255, 255]);
        assert_eq!((u, v), (vec![128], vec![128]));

        // Read as full range the same samples stay washed out.
        let full = RawFrame::new(2, 2, PixelFormat::Yuv420p, planes, 0)?;
        assert_eq!(*full.to_rgb_image()?.get_pixel(0, 0), image::Rgb([16, 16, 16]));
        Ok(())
    }

    #[test]
    fn limited_range_green_keeps_full_saturation() -> Result<()> {
        // BT.601 studio-range pure green.
        let frame = RawFrame::new(
            2,
            2,
            PixelFormat::Yuv420p,
            vec![vec![145; 4], vec![54], vec![34]],
            0,
        )?
        .with_color_range(ColorRange::Limited);
        let px = *frame.to_rgb_image()?.get_pixel(0, 0);
        assert!(px[0] < 6 && px[1] > 248 && px[2] < 6, "got {:?}", px);
        Ok(())
    }

    #[test]
    fn rgb_frames_ignore_range_override() -> Result<()> {
        let frame = RawFrame::new(1, 1, PixelFormat::Rgb24, vec![vec![1, 2, 3]], 0)?
            .with_color_range(ColorRange::Limited);
        assert_eq!(frame.color_range(), ColorRange::Full);
        Ok(())
    }

    #[test]
    fn jpeg_snapshot_has_jpeg_markers() -> Result<()> {
        let frame = RawFrame::from_rgb_image(RgbImage::from_pixel(16, 8, image::Rgb([0, 200, 0])), 0)?;
        let bytes = frame.to_jpeg(90)?;
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        assert_eq!(&bytes[bytes.len() - 2..], &[0xFF, 0xD9]);
        Ok(())
    }
}
