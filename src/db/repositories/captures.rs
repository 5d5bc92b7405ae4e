use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{
    connection::Database,
    helpers::{
        format_datetime, format_optional_datetime, parse_datetime, parse_optional_datetime,
        parse_uuid, row_error, to_i64,
    },
    models::{CaptureLogEntry, CaptureRecord, LatestImage},
    schema::ensure_schema,
};

impl Database {
    pub async fn create_image_table(&self, reset: bool) -> Result<()> {
        self.execute(move |conn| ensure_schema(conn, reset)).await
    }

    pub async fn insert_capture(&self, record: CaptureRecord) -> Result<()> {
        self.execute(move |conn| {
            let tx = conn
                .transaction()
                .context("failed to open insert transaction")?;
            tx.execute(
                "INSERT INTO images (
                    image_uuid,
                    image_start_time,
                    image_end_time,
                    image_filename,
                    status_start_time,
                    status_end_time,
                    status_framesize,
                    image_valid,
                    image_height,
                    image_width
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    record.id.to_string(),
                    format_datetime(&record.image_start_time),
                    format_optional_datetime(record.image_end_time.as_ref()),
                    record.image_filename.to_string_lossy().into_owned(),
                    format_optional_datetime(record.status_start_time.as_ref()),
                    format_optional_datetime(record.status_end_time.as_ref()),
                    record.status_framesize,
                    record.image_valid,
                    record.image_height.map(to_i64),
                    record.image_width.map(to_i64),
                ],
            )
            .with_context(|| format!("failed to insert capture {}", record.id))?;
            tx.commit().context("failed to commit capture insert")?;
            Ok(())
        })
        .await
    }

    /// Every attempt that reached the store, in capture end time order.
    pub async fn list_capture_logs(&self) -> Result<Vec<CaptureLogEntry>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT
                    image_uuid,
                    image_valid,
                    image_start_time,
                    image_end_time,
                    status_start_time,
                    status_end_time
                FROM images
                ORDER BY image_end_time ASC",
            )?;

            let entries_iter = stmt.query_map([], |row| {
                let image_uuid: String = row.get(0)?;
                let image_valid: bool = row.get(1)?;
                let image_start_time: String = row.get(2)?;
                let image_end_time: Option<String> = row.get(3)?;
                let status_start_time: Option<String> = row.get(4)?;
                let status_end_time: Option<String> = row.get(5)?;

                Ok(CaptureLogEntry {
                    image_uuid: parse_uuid(&image_uuid, "image_uuid").map_err(row_error)?,
                    image_valid,
                    image_start_time: parse_datetime(&image_start_time, "image_start_time")
                        .map_err(row_error)?,
                    image_end_time: parse_optional_datetime(image_end_time, "image_end_time")
                        .map_err(row_error)?,
                    status_start_time: parse_optional_datetime(
                        status_start_time,
                        "status_start_time",
                    )
                    .map_err(row_error)?,
                    status_end_time: parse_optional_datetime(status_end_time, "status_end_time")
                        .map_err(row_error)?,
                })
            })?;

            let mut entries = Vec::new();
            for entry in entries_iter {
                entries.push(entry?);
            }

            Ok(entries)
        })
        .await
    }

    pub async fn latest_valid_capture(&self) -> Result<Option<LatestImage>> {
        self.execute(|conn| {
            conn.query_row(
                "SELECT image_uuid, image_filename, image_end_time
                 FROM images
                 WHERE image_valid = 1
                 ORDER BY image_end_time DESC
                 LIMIT 1",
                [],
                latest_image_from_row,
            )
            .optional()
            .context("failed to query latest image")
        })
        .await
    }

    /// Latest valid image whose capture ended at or before `before`.
    pub async fn valid_capture_before(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Option<LatestImage>> {
        self.execute(move |conn| {
            conn.query_row(
                "SELECT image_uuid, image_filename, image_end_time
                 FROM images
                 WHERE image_valid = 1 AND image_end_time <= ?1
                 ORDER BY image_end_time DESC
                 LIMIT 1",
                params![format_datetime(&before)],
                latest_image_from_row,
            )
            .optional()
            .context("failed to query past image")
        })
        .await
    }

    pub async fn capture_filename(&self, id: Uuid) -> Result<Option<String>> {
        self.execute(move |conn| {
            conn.query_row(
                "SELECT image_filename FROM images WHERE image_uuid = ?1",
                params![id.to_string()],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .with_context(|| format!("failed to look up image {id}"))
        })
        .await
    }
}

fn latest_image_from_row(row: &Row<'_>) -> rusqlite::Result<LatestImage> {
    let image_uuid: String = row.get(0)?;
    let image_filename: String = row.get(1)?;
    let image_end_time: Option<String> = row.get(2)?;

    Ok(LatestImage {
        image_uuid: parse_uuid(&image_uuid, "image_uuid").map_err(row_error)?,
        image_filename: image_filename.into(),
        image_end_time: parse_optional_datetime(image_end_time, "image_end_time")
            .map_err(row_error)?,
    })
}
