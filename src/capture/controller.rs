use anyhow::{Context, Result};
use log::info;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::db::CaptureSink;

use super::client::CaptureDevice;
use super::flags::ControlFlags;
use super::loop_worker::{recording_loop, LoopExit, LoopSettings, RecorderState};

/// Owns the background recording task.
pub struct RecorderController {
    handle: Option<JoinHandle<LoopExit>>,
    flags: ControlFlags,
    state_rx: watch::Receiver<RecorderState>,
}

impl RecorderController {
    /// Spawns the recording loop on the current tokio runtime. The sink is
    /// moved into the task, which releases it when the loop ends.
    pub fn spawn<D, S>(settings: LoopSettings, device: D, sink: S, flags: ControlFlags) -> Self
    where
        D: CaptureDevice,
        S: CaptureSink,
    {
        let (state_tx, state_rx) = watch::channel(RecorderState::Initializing);
        let handle = tokio::spawn(recording_loop(
            settings,
            device,
            sink,
            flags.clone(),
            state_tx,
        ));

        Self {
            handle: Some(handle),
            flags,
            state_rx,
        }
    }

    pub fn flags(&self) -> &ControlFlags {
        &self.flags
    }

    pub fn state(&self) -> RecorderState {
        *self.state_rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<RecorderState> {
        self.state_rx.clone()
    }

    /// Waits for the loop to end on its own. Returns `None` if it was
    /// already joined.
    pub async fn wait(&mut self) -> Result<Option<LoopExit>> {
        match self.handle.take() {
            Some(handle) => handle
                .await
                .context("recording loop task failed to join")
                .map(Some),
            None => Ok(None),
        }
    }

    /// Sets terminate and waits for the current iteration to finish. An
    /// in-flight capture is not interrupted, so this can take up to the
    /// capture timeout.
    pub async fn shutdown(&mut self) -> Result<Option<LoopExit>> {
        self.flags.request_terminate();
        info!("Terminate signal sent to recording loop");
        self.wait().await
    }
}
