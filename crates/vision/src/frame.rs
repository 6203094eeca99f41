//! Frame source abstraction (§4.4). The camera driver itself is an opaque
//! external collaborator (§1); this crate only defines the trait it must
//! implement and a deterministic stand-in used by `tankd --sim` and by this
//! crate's own tests — mirroring how the teacher swaps a `SimBus` in for
//! real CAN hardware.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use types::Frame;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("camera disconnected")]
    Disconnected,
}

/// Produces frames at best-effort rate. Implementations run on a dedicated
/// thread (camera I/O is synchronous, §5); `next_frame` may block.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Frame, VisionError>;
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A deterministic RGB8 test pattern: a solid color that cycles with the
/// sequence number. Used when no real camera is wired in.
pub struct TestPatternSource {
    width: u32,
    height: u32,
    sequence: u64,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            sequence: 0,
        }
    }
}

impl FrameSource for TestPatternSource {
    fn next_frame(&mut self) -> Result<Frame, VisionError> {
        self.sequence += 1;
        let shade = (self.sequence % 256) as u8;
        let pixel_count = (self.width * self.height) as usize;
        let mut data = Vec::with_capacity(pixel_count * 3);
        for _ in 0..pixel_count {
            data.extend_from_slice(&[shade, shade.wrapping_add(64), shade.wrapping_add(128)]);
        }
        Ok(Frame {
            data: Arc::new(data),
            width: self.width,
            height: self.height,
            sequence: self.sequence,
            timestamp_ms: now_ms(),
        })
    }
}
