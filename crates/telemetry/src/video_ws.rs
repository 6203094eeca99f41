//! Video-over-WebSocket streaming (§6): periodically JPEG-encodes the
//! latest captured frame and pushes it to every attached operator session
//! as a base64 `video_frame` event. Generalized from the teacher's custom
//! binary `[0x20][timestamp][width][height][jpeg]` framing into the JSON
//! envelope the rest of this protocol already uses.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tokio::sync::watch;
use tracing::{debug, warn};
use types::Frame;

use crate::fanout::TelemetryFanout;
use crate::protocol::ServerMessage;

const DEFAULT_QUALITY: u8 = 70;
const DEFAULT_INTERVAL: Duration = Duration::from_millis(200);

pub struct VideoStreamer {
    frame_rx: watch::Receiver<Option<Frame>>,
    fanout: TelemetryFanout,
    quality: u8,
    interval: Duration,
}

impl VideoStreamer {
    pub fn new(frame_rx: watch::Receiver<Option<Frame>>, fanout: TelemetryFanout) -> Self {
        Self {
            frame_rx,
            fanout,
            quality: DEFAULT_QUALITY,
            interval: DEFAULT_INTERVAL,
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Runs until the caller aborts the task. Skips ticks where no frame
    /// has arrived yet rather than publishing a blank one.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            let frame = self.frame_rx.borrow_and_update().clone();
            let Some(frame) = frame else {
                continue;
            };
            match vision::encode_jpeg(&frame, self.quality) {
                Ok(jpeg) => {
                    let data_base64 = BASE64.encode(jpeg);
                    debug!(seq = frame.sequence, "streamed video frame");
                    self.fanout.publish(ServerMessage::VideoFrame { data_base64 });
                }
                Err(err) => warn!(?err, "failed to encode video frame"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    fn solid_frame() -> Frame {
        Frame {
            data: Arc::new(vec![5u8; 4 * 4 * 3]),
            width: 4,
            height: 4,
            sequence: 1,
            timestamp_ms: 0,
        }
    }

    #[tokio::test]
    async fn test_streamer_publishes_base64_frame() {
        let (tx, rx) = watch::channel(Some(solid_frame()));
        let fanout = TelemetryFanout::new();
        let mut sub = fanout.subscribe();
        let streamer = VideoStreamer::new(rx, fanout).with_interval(Duration::from_millis(5));

        let handle = tokio::spawn(streamer.run());
        tokio::time::sleep(StdDuration::from_millis(30)).await;
        handle.abort();

        let mut saw_frame = false;
        while let Ok(msg) = sub.try_recv() {
            if let ServerMessage::VideoFrame { data_base64 } = msg {
                assert!(!data_base64.is_empty());
                saw_frame = true;
            }
        }
        assert!(saw_frame);
        drop(tx);
    }
}
