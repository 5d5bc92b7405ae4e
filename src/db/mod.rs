mod connection;
pub mod helpers;
pub mod models;
mod repositories;
mod schema;
mod sink;

pub use connection::{Database, DbConnection};
pub use models::{CaptureLogEntry, CaptureRecord, ImageGeometry, LatestImage};
pub use sink::CaptureSink;
