//! MJPEG multipart HTTP video endpoint (§6), hand-rolled over a raw
//! `TcpListener` the way the teacher's dashboard crate hand-rolls its own
//! HTTP responses rather than pulling in a web framework.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info};
use types::Frame;

const BOUNDARY: &str = "tankframe";

#[derive(Debug, Clone)]
pub struct MjpegConfig {
    pub port: u16,
    pub quality: u8,
}

impl Default for MjpegConfig {
    fn default() -> Self {
        Self { port: 8080, quality: 70 }
    }
}

/// Serves `GET /stream` as a `multipart/x-mixed-replace` MJPEG stream, one
/// boundary-delimited JPEG per currently-latest frame.
pub struct MjpegServer {
    config: MjpegConfig,
    frame_rx: watch::Receiver<Option<Frame>>,
}

impl MjpegServer {
    pub fn new(config: MjpegConfig, frame_rx: watch::Receiver<Option<Frame>>) -> Self {
        Self { config, frame_rx }
    }

    pub async fn run(self) -> std::io::Result<()> {
        let addr = format!("0.0.0.0:{}", self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        info!(addr, "MJPEG stream server listening");

        let frame_rx = Arc::new(self.frame_rx);
        let quality = self.config.quality;

        loop {
            let (stream, addr) = listener.accept().await?;
            debug!(?addr, "MJPEG connection");
            let rx = (*frame_rx).clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, rx, quality).await {
                    error!(?e, "MJPEG connection error");
                }
            });
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    mut frame_rx: watch::Receiver<Option<Frame>>,
    quality: u8,
) -> std::io::Result<()> {
    let path = {
        let mut reader = BufReader::new(&mut stream);
        let mut request_line = String::new();
        reader.read_line(&mut request_line).await?;
        let path = request_line.split_whitespace().nth(1).unwrap_or("/").to_string();
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).await?;
            if line == "\r\n" || line.is_empty() {
                break;
            }
        }
        path
    };

    if path != "/stream" {
        let response = "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n";
        stream.write_all(response.as_bytes()).await?;
        return Ok(());
    }

    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary={BOUNDARY}\r\nCache-Control: no-cache\r\nConnection: close\r\n\r\n"
    );
    stream.write_all(header.as_bytes()).await?;

    loop {
        if frame_rx.changed().await.is_err() {
            break;
        }
        let frame = frame_rx.borrow_and_update().clone();
        let Some(frame) = frame else { continue };

        let jpeg = match vision::encode_jpeg(&frame, quality) {
            Ok(jpeg) => jpeg,
            Err(e) => {
                error!(?e, "failed to encode MJPEG frame");
                continue;
            }
        };

        let part_header = format!(
            "--{BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
            jpeg.len()
        );
        if stream.write_all(part_header.as_bytes()).await.is_err() {
            break;
        }
        if stream.write_all(&jpeg).await.is_err() {
            break;
        }
        if stream.write_all(b"\r\n").await.is_err() {
            break;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_uses_dashboard_port() {
        let config = MjpegConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.quality, 70);
    }
}
