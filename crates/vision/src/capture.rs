//! Capture loop (§4.4): runs a [`FrameSource`] on a dedicated thread,
//! publishing only the latest frame into a single-slot, latest-wins
//! `watch` channel. On capture failure it backs off 100ms and retries;
//! after a continuous-failure budget it logs a warning once, not per
//! failure (§7.2), and keeps retrying.

use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, warn};
use types::Frame;

use crate::frame::FrameSource;

const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// How long continuous capture failure is tolerated before the warning
/// fires. The loop never gives up — it keeps retrying either way.
const FAILURE_WARNING_BUDGET: Duration = Duration::from_secs(5);

pub struct CaptureLoop {
    source: Box<dyn FrameSource>,
    frame_tx: watch::Sender<Option<Frame>>,
}

impl CaptureLoop {
    pub fn new(source: Box<dyn FrameSource>) -> (Self, watch::Receiver<Option<Frame>>) {
        let (frame_tx, frame_rx) = watch::channel(None);
        (Self { source, frame_tx }, frame_rx)
    }

    /// Runs until the receiver side is dropped. Intended to be spawned on a
    /// blocking thread (`tokio::task::spawn_blocking`) since [`FrameSource`]
    /// is a synchronous, potentially-blocking interface.
    pub fn run(mut self) {
        let mut failing_since: Option<Instant> = None;
        let mut warned = false;

        loop {
            match self.source.next_frame() {
                Ok(frame) => {
                    failing_since = None;
                    warned = false;
                    debug!(seq = frame.sequence, "captured frame");
                    if self.frame_tx.send(Some(frame)).is_err() {
                        // No receivers left; nothing more to publish to.
                        return;
                    }
                }
                Err(err) => {
                    let since = *failing_since.get_or_insert_with(Instant::now);
                    if !warned && since.elapsed() >= FAILURE_WARNING_BUDGET {
                        warn!(?err, "camera capture has been failing continuously");
                        warned = true;
                    }
                    std::thread::sleep(RETRY_BACKOFF);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::VisionError;

    struct FlakySource {
        calls: u32,
        fail_first: u32,
    }

    impl FrameSource for FlakySource {
        fn next_frame(&mut self) -> Result<Frame, VisionError> {
            self.calls += 1;
            if self.calls <= self.fail_first {
                return Err(VisionError::CaptureFailed("no signal".into()));
            }
            Ok(Frame {
                data: std::sync::Arc::new(vec![0u8; 3]),
                width: 1,
                height: 1,
                sequence: self.calls as u64,
                timestamp_ms: 0,
            })
        }
    }

    #[test]
    fn test_capture_loop_publishes_latest_frame_after_retry() {
        let source = FlakySource { calls: 0, fail_first: 2 };
        let (capture, mut frame_rx) = CaptureLoop::new(Box::new(source));

        let handle = std::thread::spawn(move || capture.run());

        // Poll until a frame shows up or we give this test its budget.
        let deadline = Instant::now() + Duration::from_secs(2);
        let frame = loop {
            if frame_rx.has_changed().unwrap_or(false) {
                if let Some(frame) = frame_rx.borrow_and_update().clone() {
                    break frame;
                }
            }
            if Instant::now() > deadline {
                panic!("no frame published before deadline");
            }
            std::thread::sleep(Duration::from_millis(10));
        };

        assert_eq!(frame.width, 1);
        drop(frame_rx);
        let _ = handle.join();
    }
}
