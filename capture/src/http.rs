use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;
use vision_hud_common::frame::Frame;

use crate::{next_seq, CaptureError, FrameSource};

/// Fetches one encoded image per capture from an HTTP endpoint, e.g. a
/// screenshot helper or a camera's single-frame URL.
pub struct HttpFrameSource {
    client: reqwest::Client,
    url: String,
}

impl HttpFrameSource {
    pub fn new(url: &str) -> Result<Self, CaptureError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(CaptureError::HttpConnect)?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl FrameSource for HttpFrameSource {
    async fn capture(&self) -> Result<Frame, CaptureError> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(CaptureError::HttpConnect)?;

        if !resp.status().is_success() {
            return Err(CaptureError::HttpStatus(resp.status().as_u16()));
        }

        let bytes = resp.bytes().await.map_err(CaptureError::HttpBody)?.to_vec();
        let seq = next_seq();
        debug!(seq, bytes = bytes.len(), url = self.url, "fetched frame");
        Ok(Frame::from_encoded(bytes, Instant::now(), seq))
    }

    fn name(&self) -> &str {
        "http"
    }
}
