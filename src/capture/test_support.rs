//! Scripted camera and in-memory sink for recorder tests.

use std::{
    collections::VecDeque,
    io::Cursor,
    path::Path,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, RgbImage, RgbaImage};
use uuid::Uuid;

use crate::db::{CaptureRecord, CaptureSink};
use crate::error::{Stage, StageError};

use super::client::CaptureDevice;
use super::flags::ControlFlags;
use super::framesize::frame_size_name;

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::new(width, height))
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
        .unwrap();
    buf
}

/// Largest icon the ICO format can hold. Any growth of the canvas makes it
/// impossible to write back as ICO.
pub fn icon_bytes() -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(RgbaImage::new(256, 256))
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Ico)
        .unwrap();
    buf
}

#[derive(Debug, Clone, Copy)]
pub enum ImagePlan {
    Jpeg,
    Icon,
    Truncated,
    Timeout,
    Panic,
}

#[derive(Debug, Clone, Copy)]
pub enum StatusPlan {
    Frame(i64),
    Refused,
}

/// Plays back one `(image, status)` pair per capture attempt. Once the script
/// runs out, the device asks the recorder to terminate and fails the attempt.
pub struct ScriptedDevice {
    script: Mutex<VecDeque<(ImagePlan, StatusPlan)>>,
    pending_status: Mutex<Option<StatusPlan>>,
    flags: ControlFlags,
    jpeg: Vec<u8>,
    pub image_calls: Arc<AtomicUsize>,
    pub status_calls: Arc<AtomicUsize>,
}

impl ScriptedDevice {
    pub fn new(flags: ControlFlags, script: Vec<(ImagePlan, StatusPlan)>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            pending_status: Mutex::new(None),
            flags,
            jpeg: jpeg_bytes(32, 24),
            image_calls: Arc::new(AtomicUsize::new(0)),
            status_calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl CaptureDevice for ScriptedDevice {
    async fn capture_image(&self, _id: Uuid, dest: &Path) -> Result<(), StageError> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        let Some((image, status)) = next else {
            self.flags.request_terminate();
            return Err(StageError::Transport {
                stage: Stage::Capture,
                message: "script exhausted".into(),
            });
        };
        *self.pending_status.lock().unwrap() = Some(status);

        let payload = match image {
            ImagePlan::Jpeg => self.jpeg.clone(),
            ImagePlan::Icon => icon_bytes(),
            ImagePlan::Truncated => self.jpeg[..self.jpeg.len() / 2].to_vec(),
            ImagePlan::Timeout => {
                return Err(StageError::Timeout {
                    stage: Stage::Capture,
                    timeout: Duration::from_secs(60),
                })
            }
            ImagePlan::Panic => panic!("camera driver exploded"),
        };
        std::fs::write(dest, payload).map_err(|source| StageError::Io {
            stage: Stage::Capture,
            path: dest.to_path_buf(),
            source,
        })
    }

    async fn capture_status(&self) -> Result<String, StageError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        match self.pending_status.lock().unwrap().take() {
            Some(StatusPlan::Frame(code)) => frame_size_name(code)
                .map(str::to_owned)
                .ok_or(StageError::UnknownFrameSize(code)),
            Some(StatusPlan::Refused) | None => Err(StageError::Transport {
                stage: Stage::Status,
                message: "connection refused".into(),
            }),
        }
    }
}

/// What a [`MemorySink`] saw. Outlives the sink, which is consumed on release.
#[derive(Default)]
pub struct SinkLog {
    pub records: Mutex<Vec<CaptureRecord>>,
    pub schema_resets: Mutex<Vec<bool>>,
    pub releases: AtomicUsize,
    pub fail_schema: AtomicBool,
    pub fail_inserts: AtomicBool,
    pub fail_release: AtomicBool,
}

impl SinkLog {
    pub fn records(&self) -> Vec<CaptureRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

pub struct MemorySink {
    log: Arc<SinkLog>,
}

impl MemorySink {
    pub fn new() -> (Self, Arc<SinkLog>) {
        let log = Arc::new(SinkLog::default());
        (Self { log: Arc::clone(&log) }, log)
    }
}

#[async_trait]
impl CaptureSink for MemorySink {
    async fn create_schema(&self, reset: bool) -> Result<()> {
        self.log.schema_resets.lock().unwrap().push(reset);
        if self.log.fail_schema.load(Ordering::SeqCst) {
            return Err(anyhow!("database is unreachable"));
        }
        Ok(())
    }

    async fn insert(&self, record: CaptureRecord) -> Result<()> {
        if self.log.fail_inserts.load(Ordering::SeqCst) {
            return Err(anyhow!("disk I/O error"));
        }
        self.log.records.lock().unwrap().push(record);
        Ok(())
    }

    async fn release(self) -> Result<()> {
        self.log.releases.fetch_add(1, Ordering::SeqCst);
        if self.log.fail_release.load(Ordering::SeqCst) {
            return Err(anyhow!("connection already closed"));
        }
        Ok(())
    }
}
