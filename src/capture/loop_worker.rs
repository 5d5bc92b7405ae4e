use std::{any::Any, panic::AssertUnwindSafe, path::PathBuf, time::Duration};

use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

use crate::{
    db::{CaptureRecord, CaptureSink},
    error::{Stage, StageError},
    utils::logging::FailureKind,
};

use super::client::CaptureDevice;
use super::flags::ControlFlags;
use super::validator::{verify_image, Rotation};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

// Import the logging macros (exported at crate root)
use crate::{log_failure, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RecorderState {
    Initializing,
    Idle,
    Capturing,
    Terminating,
    Terminated,
}

/// Why the recording loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The terminate flag was observed.
    Terminated,
    /// Storage or schema setup failed; the terminate flag has been set.
    SetupFailed,
    /// Setup succeeded and the process was started with `--dry-run`.
    DryRun,
}

#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub storage_dir: PathBuf,
    pub rotation: Option<Rotation>,
    pub reset_database: bool,
    pub dry_run: bool,
    pub idle_delay: Duration,
}

#[derive(Debug)]
pub enum IterationOutcome {
    /// A row was written; `valid` tells whether the image passed validation.
    Persisted { id: Uuid, valid: bool },
    /// A hard failure ended the attempt; nothing was written.
    Aborted(StageError),
}

/// Runs the recorder until terminate is set, then releases `sink`.
///
/// The sink is released exactly once on every path out of this function,
/// including setup failure and dry runs.
pub async fn recording_loop<D, S>(
    settings: LoopSettings,
    device: D,
    sink: S,
    flags: ControlFlags,
    state_tx: watch::Sender<RecorderState>,
) -> LoopExit
where
    D: CaptureDevice,
    S: CaptureSink,
{
    set_state(&state_tx, RecorderState::Initializing);

    let exit = if !initialize(&settings, &sink).await {
        flags.request_terminate();
        LoopExit::SetupFailed
    } else if settings.dry_run {
        log_info!("dry run: setup complete, not capturing");
        LoopExit::DryRun
    } else {
        run_until_terminated(&settings, &device, &sink, &flags, &state_tx).await;
        LoopExit::Terminated
    };

    set_state(&state_tx, RecorderState::Terminating);
    release_sink(sink).await;
    set_state(&state_tx, RecorderState::Terminated);

    log_info!("recording loop finished ({exit:?})");
    exit
}

fn set_state(state_tx: &watch::Sender<RecorderState>, next: RecorderState) {
    state_tx.send_if_modified(|current| {
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    });
}

async fn initialize<S: CaptureSink>(settings: &LoopSettings, sink: &S) -> bool {
    if let Err(err) = tokio::fs::create_dir_all(&settings.storage_dir).await {
        log_failure!(
            FailureKind::Os,
            "cannot create image storage {}: {err}",
            settings.storage_dir.display()
        );
        return false;
    }

    if let Err(err) = sink.create_schema(settings.reset_database).await {
        log_failure!(FailureKind::Database, "cannot prepare image table: {err:#}");
        return false;
    }

    if settings.reset_database {
        log_warn!("image table was reset on start");
    }
    log_info!(
        "recorder ready, storing images in {}",
        settings.storage_dir.display()
    );
    true
}

async fn run_until_terminated<D, S>(
    settings: &LoopSettings,
    device: &D,
    sink: &S,
    flags: &ControlFlags,
    state_tx: &watch::Sender<RecorderState>,
) where
    D: CaptureDevice,
    S: CaptureSink,
{
    while !flags.is_terminating() {
        if !flags.is_capturing() {
            set_state(state_tx, RecorderState::Idle);
            tokio::time::sleep(settings.idle_delay).await;
            continue;
        }

        set_state(state_tx, RecorderState::Capturing);
        let outcome = AssertUnwindSafe(run_iteration(settings, device, sink))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                IterationOutcome::Aborted(StageError::Panicked {
                    stage: Stage::Iteration,
                    message: panic_message(panic.as_ref()),
                })
            });

        if let IterationOutcome::Aborted(err) = outcome {
            log_failure!(
                err.failure_kind(),
                "capture attempt abandoned at {} stage: {err}",
                err.stage()
            );
        }
    }
}

/// One pass of capture, status, validate, persist.
///
/// Capture, status and persist failures end the attempt with no row written.
/// A validation failure only marks the record invalid.
pub async fn run_iteration<D, S>(settings: &LoopSettings, device: &D, sink: &S) -> IterationOutcome
where
    D: CaptureDevice,
    S: CaptureSink,
{
    let mut record = CaptureRecord::begin(&settings.storage_dir, Utc::now());

    if let Err(err) = device.capture_image(record.id, &record.image_filename).await {
        return IterationOutcome::Aborted(err);
    }
    record.image_end_time = Some(Utc::now());
    log_capture(&record);

    record.status_start_time = Some(Utc::now());
    let status = device.capture_status().await;
    record.status_end_time = Some(Utc::now());
    match status {
        Ok(framesize) => record.status_framesize = Some(framesize),
        Err(err) => return IterationOutcome::Aborted(err),
    }

    match verify_image(record.image_filename.clone(), settings.rotation).await {
        Ok(geometry) => record.mark_valid(geometry),
        Err(err) => {
            log_failure!(
                err.failure_kind(),
                "{} recorded as invalid: {err}",
                record.file_name()
            );
            record.mark_invalid();
        }
    }

    let (id, valid) = (record.id, record.image_valid);
    match sink.insert(record).await {
        Ok(()) => IterationOutcome::Persisted { id, valid },
        Err(err) => IterationOutcome::Aborted(StageError::Persist(err)),
    }
}

fn log_capture(record: &CaptureRecord) {
    if let Some(end) = record.image_end_time {
        log_info!(
            "Captured {} from {} to {}",
            record.image_filename.display(),
            record.image_start_time.to_rfc3339(),
            end.to_rfc3339()
        );
    }
}

async fn release_sink<S: CaptureSink>(sink: S) {
    match AssertUnwindSafe(sink.release()).catch_unwind().await {
        Ok(Ok(())) => log_info!("capture sink released"),
        Ok(Err(err)) => log_failure!(FailureKind::Database, "failed to release capture sink: {err:#}"),
        Err(panic) => log_failure!(
            FailureKind::Unexpected,
            "capture sink panicked during release: {}",
            panic_message(panic.as_ref())
        ),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
