//! JPEG encoding for streaming (§4.4). Overlay composition draws onto a
//! per-consumer copy; the stored latest frame is never mutated.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use thiserror::Error;
use types::{DetectionBox, Frame};

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("jpeg encoding failed: {0}")]
    Jpeg(String),
}

/// JPEG-encode a frame's raw RGB8 buffer at the given quality (1-100).
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::with_capacity(frame.data.len() / 4);
    let mut cursor = Cursor::new(&mut out);
    let mut encoder = JpegEncoder::new_with_quality(&mut cursor, quality);
    encoder
        .encode(&frame.data, frame.width, frame.height, ExtendedColorType::Rgb8)
        .map_err(|e| EncodeError::Jpeg(e.to_string()))?;
    Ok(out)
}

/// Draw detection box outlines onto a *copy* of the frame's pixel data,
/// then JPEG-encode that copy. The caller's stored latest frame is
/// untouched (§4.4).
pub fn encode_with_overlay(
    frame: &Frame,
    detections: &[DetectionBox],
    quality: u8,
) -> Result<Vec<u8>, EncodeError> {
    let mut pixels = (*frame.data).clone();
    for detection in detections {
        draw_box_outline(&mut pixels, frame.width, frame.height, detection);
    }
    let overlaid = Frame {
        data: std::sync::Arc::new(pixels),
        width: frame.width,
        height: frame.height,
        sequence: frame.sequence,
        timestamp_ms: frame.timestamp_ms,
    };
    encode_jpeg(&overlaid, quality)
}

const OUTLINE_COLOR: [u8; 3] = [255, 32, 32];

fn draw_box_outline(pixels: &mut [u8], width: u32, height: u32, detection: &DetectionBox) {
    let x1 = detection.x1.clamp(0, width as i32 - 1) as u32;
    let x2 = detection.x2.clamp(0, width as i32 - 1) as u32;
    let y1 = detection.y1.clamp(0, height as i32 - 1) as u32;
    let y2 = detection.y2.clamp(0, height as i32 - 1) as u32;

    for x in x1..=x2 {
        set_pixel(pixels, width, x, y1, OUTLINE_COLOR);
        set_pixel(pixels, width, x, y2, OUTLINE_COLOR);
    }
    for y in y1..=y2 {
        set_pixel(pixels, width, x1, y, OUTLINE_COLOR);
        set_pixel(pixels, width, x2, y, OUTLINE_COLOR);
    }
}

fn set_pixel(pixels: &mut [u8], width: u32, x: u32, y: u32, color: [u8; 3]) {
    let idx = (y as usize * width as usize + x as usize) * 3;
    if idx + 2 < pixels.len() {
        pixels[idx..idx + 3].copy_from_slice(&color);
    }
}
