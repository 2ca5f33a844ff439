use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use ndarray::Array4;
use rayon::prelude::*;

use super::{NUM_LANDMARKS, NativePoint};
use crate::types::Frame;

pub const HANDPOSE_INPUT_SIZE: u32 = 224;
pub const PALM_INPUT_SIZE: u32 = 192;

#[derive(Clone, Debug)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_w: u32,
    pub orig_h: u32,
}

/// Square, rotated region of the frame fed to the handpose model.
#[derive(Clone, Debug)]
pub struct HandCrop {
    pub center: (f32, f32),
    pub side: f32,
    pub angle: f32,
    pub orig_w: u32,
    pub orig_h: u32,
}

fn check_buffer(frame: &Frame) -> Result<()> {
    let expected_len = (frame.width as usize)
        .saturating_mul(frame.height as usize)
        .saturating_mul(4);
    if frame.rgba.len() != expected_len {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {}",
            frame.rgba.len(),
            expected_len
        ));
    }
    Ok(())
}

/// Resizes the frame into a black square of `target_size`, keeping aspect.
pub fn letterbox_tensor(frame: &Frame, target_size: u32) -> Result<(Array4<f32>, Letterbox)> {
    check_buffer(frame)?;

    let scale = target_size as f32 / (frame.width.max(frame.height) as f32);
    let new_w = (frame.width as f32 * scale).round().max(1.0) as u32;
    let new_h = (frame.height as f32 * scale).round().max(1.0) as u32;

    let src_image = fir::images::Image::from_vec_u8(
        frame.width,
        frame.height,
        frame.rgba.clone(),
        fir::PixelType::U8x4,
    )?;
    let mut dst_image = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x4);
    let options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    fir::Resizer::new()
        .resize(&src_image, &mut dst_image, Some(&options))
        .context("letterbox resize failed")?;
    let resized = dst_image.into_vec();

    let side = target_size as usize;
    let pad_x = (side.saturating_sub(new_w as usize)) / 2;
    let pad_y = (side.saturating_sub(new_h as usize)) / 2;
    let row_len = new_w as usize * 4;

    let mut canvas = vec![0f32; side * side * 3];
    canvas
        .par_chunks_mut(side * 3)
        .enumerate()
        .skip(pad_y)
        .take(new_h as usize)
        .for_each(|(y, dst_row)| {
            let src_row = &resized[(y - pad_y) * row_len..(y - pad_y + 1) * row_len];
            for (x, px) in src_row.chunks_exact(4).enumerate() {
                let dst = &mut dst_row[(pad_x + x) * 3..(pad_x + x) * 3 + 3];
                dst[0] = px[0] as f32 / 255.0;
                dst[1] = px[1] as f32 / 255.0;
                dst[2] = px[2] as f32 / 255.0;
            }
        });

    let input = Array4::<f32>::from_shape_vec((1, side, side, 3), canvas)
        .map_err(|err| anyhow!("failed to build letterbox tensor: {err}"))?;

    Ok((
        input,
        Letterbox {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
            orig_w: frame.width,
            orig_h: frame.height,
        },
    ))
}

/// Samples the rotated square `crop` into a model input tensor.
pub fn crop_tensor(frame: &Frame, crop: &HandCrop, output_size: u32) -> Result<Array4<f32>> {
    check_buffer(frame)?;

    let size = output_size as usize;
    let mut data = vec![0f32; size * size * 3];
    data.par_chunks_mut(size * 3)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..size {
                let (sx, sy) = crop.to_frame(x as f32 + 0.5, y as f32 + 0.5, output_size);
                row[x * 3..x * 3 + 3].copy_from_slice(&sample_rgb(frame, sx, sy));
            }
        });

    Array4::<f32>::from_shape_vec((1, size, size, 3), data)
        .map_err(|err| anyhow!("failed to build hand crop tensor: {err}"))
}

impl HandCrop {
    fn to_frame(&self, x: f32, y: f32, output_size: u32) -> (f32, f32) {
        let half = output_size as f32 / 2.0;
        let scale = self.side / output_size as f32;
        let dx = (x - half) * scale;
        let dy = (y - half) * scale;
        let (sin, cos) = self.angle.sin_cos();
        (
            self.center.0 + dx * cos - dy * sin,
            self.center.1 + dx * sin + dy * cos,
        )
    }

    /// Maps raw handpose output (crop pixels) to points normalized to the
    /// frame. Depth is scaled like x so it stays comparable across crops.
    pub fn project(&self, raw: &[f32], output_size: u32) -> Result<Vec<NativePoint>> {
        if raw.len() < NUM_LANDMARKS * 3 {
            return Err(anyhow!(
                "unexpected landmarks length: got {}, need {}",
                raw.len(),
                NUM_LANDMARKS * 3
            ));
        }

        let w = self.orig_w.max(1) as f32;
        let h = self.orig_h.max(1) as f32;
        let depth_scale = self.side / output_size as f32 / w;
        Ok(raw
            .chunks_exact(3)
            .take(NUM_LANDMARKS)
            .map(|p| {
                let (fx, fy) = self.to_frame(p[0], p[1], output_size);
                NativePoint {
                    x: (fx / w).clamp(0.0, 1.0),
                    y: (fy / h).clamp(0.0, 1.0),
                    z: Some(p[2] * depth_scale),
                }
            })
            .collect())
    }
}

fn sample_rgb(frame: &Frame, x: f32, y: f32) -> [f32; 3] {
    if x.is_nan() || y.is_nan() {
        return [0.0; 3];
    }
    let x0 = x.floor();
    let y0 = y.floor();

    let (w, h) = (frame.width as i32, frame.height as i32);
    let fetch = |cx: f32, cy: f32| -> [f32; 3] {
        let (ix, iy) = (cx as i32, cy as i32);
        if ix < 0 || iy < 0 || ix >= w || iy >= h {
            return [0.0; 3];
        }
        let idx = ((iy as u32 * frame.width + ix as u32) as usize) * 4;
        match frame.rgba.get(idx..idx + 3) {
            Some(px) => [
                px[0] as f32 / 255.0,
                px[1] as f32 / 255.0,
                px[2] as f32 / 255.0,
            ],
            None => [0.0; 3],
        }
    };

    let (fx, fy) = (x - x0, y - y0);
    let c00 = fetch(x0, y0);
    let c10 = fetch(x0 + 1.0, y0);
    let c01 = fetch(x0, y0 + 1.0);
    let c11 = fetch(x0 + 1.0, y0 + 1.0);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    std::array::from_fn(|c| lerp(lerp(c00[c], c10[c], fx), lerp(c01[c], c11[c], fx), fy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn solid_frame(width: u32, height: u32) -> Frame {
        Frame {
            rgba: vec![255; (width * height * 4) as usize],
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    #[test]
    fn crop_center_projects_to_crop_center() {
        let crop = HandCrop {
            center: (320.0, 240.0),
            side: 200.0,
            angle: 0.0,
            orig_w: 640,
            orig_h: 480,
        };
        let mut raw = vec![0.0; NUM_LANDMARKS * 3];
        raw[0] = 112.0;
        raw[1] = 112.0;
        let points = crop.project(&raw, HANDPOSE_INPUT_SIZE).unwrap();

        assert_eq!(points.len(), NUM_LANDMARKS);
        assert!((points[0].x - 0.5).abs() < 1e-4);
        assert!((points[0].y - 0.5).abs() < 1e-4);
    }

    #[test]
    fn short_landmark_output_is_an_error() {
        let crop = HandCrop {
            center: (0.0, 0.0),
            side: 1.0,
            angle: 0.0,
            orig_w: 1,
            orig_h: 1,
        };
        assert!(crop.project(&[0.0; 9], HANDPOSE_INPUT_SIZE).is_err());
    }

    #[test]
    fn letterbox_pads_the_short_side() {
        let (tensor, letterbox) = letterbox_tensor(&solid_frame(64, 32), 16).unwrap();
        assert_eq!(tensor.shape(), &[1, 16, 16, 3]);
        assert_eq!(letterbox.pad_x, 0.0);
        assert_eq!(letterbox.pad_y, 4.0);
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
        assert_eq!(tensor[[0, 8, 8, 0]], 1.0);
    }
}
