use anyhow::Result;
use async_trait::async_trait;

use crate::db::{connection::DbConnection, models::CaptureRecord};

/// Where the recorder hands finished capture records.
///
/// `release` takes the sink by value, so a sink can be released at most once.
#[async_trait]
pub trait CaptureSink: Send + Sync + Sized + 'static {
    async fn create_schema(&self, reset: bool) -> Result<()>;

    async fn insert(&self, record: CaptureRecord) -> Result<()>;

    async fn release(self) -> Result<()>;
}

#[async_trait]
impl CaptureSink for DbConnection {
    async fn create_schema(&self, reset: bool) -> Result<()> {
        self.database().create_image_table(reset).await
    }

    async fn insert(&self, record: CaptureRecord) -> Result<()> {
        self.database().insert_capture(record).await
    }

    async fn release(self) -> Result<()> {
        DbConnection::release(self).await
    }
}
