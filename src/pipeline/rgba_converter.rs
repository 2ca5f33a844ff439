use std::time::Instant;

use anyhow::{Result, anyhow, ensure};
use nokhwa::{Buffer, utils::FrameFormat};
use rayon::prelude::*;
use yuv::{
    YuvBiPlanarImage, YuvConversionMode, YuvPackedImage, YuvRange, YuvStandardMatrix,
    yuv_nv12_to_rgba, yuyv422_to_rgba,
};
use zune_jpeg::{
    JpegDecoder,
    zune_core::{bytestream::ZCursor, colorspace::ColorSpace, options::DecoderOptions},
};

use crate::types::Frame;

/// Decodes a raw camera buffer into an RGBA frame stamped with the read time.
pub fn buffer_to_frame(buffer: &Buffer) -> Result<Frame> {
    let resolution = buffer.resolution();
    let (rgba, width, height) = decode(
        buffer.source_frame_format(),
        buffer.buffer(),
        resolution.width_x,
        resolution.height_y,
    )?;

    Ok(Frame {
        rgba,
        width,
        height,
        timestamp: Instant::now(),
    })
}

fn decode(format: FrameFormat, data: &[u8], width: u32, height: u32) -> Result<(Vec<u8>, u32, u32)> {
    let rgba = match format {
        // JPEG carries its own dimensions, which win over the negotiated ones.
        FrameFormat::MJPEG => return mjpeg_to_rgba(data),
        FrameFormat::NV12 => nv12_to_rgba(data, width, height)?,
        FrameFormat::YUYV => yuyv_to_rgba(data, width, height)?,
        FrameFormat::RAWRGB => expand_pixels(data, width, height, 3, |px| [px[0], px[1], px[2]])?,
        FrameFormat::RAWBGR => expand_pixels(data, width, height, 3, |px| [px[2], px[1], px[0]])?,
        FrameFormat::GRAY => expand_pixels(data, width, height, 1, |px| [px[0]; 3])?,
    };
    Ok((rgba, width, height))
}

fn pixel_count(width: u32, height: u32) -> usize {
    width as usize * height as usize
}

fn check_len(kind: &str, data: &[u8], expected: usize) -> Result<()> {
    ensure!(
        data.len() >= expected,
        "{kind} buffer too small: got {}, expected {expected}",
        data.len()
    );
    Ok(())
}

/// Widens packed `channels`-byte pixels to opaque RGBA.
fn expand_pixels(
    data: &[u8],
    width: u32,
    height: u32,
    channels: usize,
    to_rgb: impl Fn(&[u8]) -> [u8; 3] + Sync,
) -> Result<Vec<u8>> {
    let pixels = pixel_count(width, height);
    check_len("packed", data, pixels * channels)?;

    let mut rgba = vec![0u8; pixels * 4];
    rgba.par_chunks_exact_mut(4)
        .zip(data.par_chunks_exact(channels))
        .for_each(|(dst, src)| {
            dst[..3].copy_from_slice(&to_rgb(src));
            dst[3] = 255;
        });
    Ok(rgba)
}

fn nv12_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let y_len = pixel_count(width, height);
    let uv_len = y_len / 2;
    check_len("NV12", data, y_len + uv_len)?;

    let image = YuvBiPlanarImage {
        y_plane: &data[..y_len],
        y_stride: width,
        uv_plane: &data[y_len..y_len + uv_len],
        uv_stride: width,
        width,
        height,
    };
    let mut rgba = vec![0u8; y_len * 4];
    yuv_nv12_to_rgba(
        &image,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
        YuvConversionMode::Balanced,
    )
    .map_err(|err| anyhow!("NV12 conversion failed: {err:?}"))?;
    Ok(rgba)
}

fn yuyv_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    check_len("YUYV", data, pixel_count(width, height) * 2)?;

    let packed = YuvPackedImage {
        yuy: data,
        yuy_stride: width * 2,
        width,
        height,
    };
    let mut rgba = vec![0u8; pixel_count(width, height) * 4];
    yuyv422_to_rgba(
        &packed,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
    )
    .map_err(|err| anyhow!("YUYV conversion failed: {err:?}"))?;
    Ok(rgba)
}

fn mjpeg_to_rgba(data: &[u8]) -> Result<(Vec<u8>, u32, u32)> {
    let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(ZCursor::new(data), options);
    let rgba = decoder
        .decode()
        .map_err(|err| anyhow!("MJPEG decode failed: {err:?}"))?;
    let info = decoder
        .info()
        .ok_or_else(|| anyhow!("MJPEG decoder reported no image info"))?;

    let width = u32::try_from(info.width).map_err(|_| anyhow!("MJPEG width out of range"))?;
    let height = u32::try_from(info.height).map_err(|_| anyhow!("MJPEG height out of range"))?;
    check_len("MJPEG", &rgba, pixel_count(width, height) * 4)?;
    Ok((rgba, width, height))
}
