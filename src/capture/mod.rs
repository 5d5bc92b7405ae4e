pub mod client;
pub mod controller;
pub mod flags;
pub mod framesize;
pub mod loop_worker;
pub mod validator;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::{CameraClient, CaptureDevice};
pub use controller::RecorderController;
pub use flags::ControlFlags;
pub use loop_worker::{LoopExit, LoopSettings, RecorderState};
pub use validator::Rotation;
