use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{Stage, StageError};

use super::framesize::parse_status;

/// A remote camera that can hand over one image and one status report.
///
/// Implementations do not retry; the recorder decides what a failure means.
#[async_trait]
pub trait CaptureDevice: Send + Sync + 'static {
    /// Fetches one image for `id` and writes it to `dest`.
    async fn capture_image(&self, id: Uuid, dest: &Path) -> Result<(), StageError>;

    /// Fetches the status report and returns the readable frame size.
    async fn capture_status(&self) -> Result<String, StageError>;
}

/// HTTP client for ESP32-CAM style devices.
pub struct CameraClient {
    client: reqwest::Client,
    capture_url: String,
    status_url: String,
    capture_timeout: Duration,
}

impl CameraClient {
    /// `capture_url` may contain `{}` or `{0}` placeholders, each replaced by
    /// the capture identity.
    pub fn new(capture_url: String, status_url: String, capture_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("failed to create HTTP client")?;

        Ok(Self {
            client,
            capture_url,
            status_url,
            capture_timeout,
        })
    }

    pub fn image_url(&self, id: &Uuid) -> String {
        let id = id.to_string();
        self.capture_url.replace("{0}", &id).replace("{}", &id)
    }

    async fn fetch(&self, url: &str) -> reqwest::Result<Vec<u8>> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

fn transport(stage: Stage, err: reqwest::Error) -> StageError {
    StageError::Transport {
        stage,
        message: err.to_string(),
    }
}

#[async_trait]
impl CaptureDevice for CameraClient {
    async fn capture_image(&self, id: Uuid, dest: &Path) -> Result<(), StageError> {
        let url = self.image_url(&id);

        let payload = match tokio::time::timeout(self.capture_timeout, self.fetch(&url)).await {
            Ok(Ok(payload)) => payload,
            Ok(Err(err)) => return Err(transport(Stage::Capture, err)),
            Err(_) => {
                return Err(StageError::Timeout {
                    stage: Stage::Capture,
                    timeout: self.capture_timeout,
                })
            }
        };

        tokio::fs::write(dest, &payload)
            .await
            .map_err(|source| StageError::Io {
                stage: Stage::Capture,
                path: dest.to_path_buf(),
                source,
            })
    }

    async fn capture_status(&self) -> Result<String, StageError> {
        let body = self
            .fetch(&self.status_url)
            .await
            .map_err(|err| transport(Stage::Status, err))?;
        let body = String::from_utf8(body)
            .map_err(|err| StageError::MalformedStatus(format!("status is not UTF-8: {err}")))?;
        parse_status(&body).map(str::to_owned)
    }
}
