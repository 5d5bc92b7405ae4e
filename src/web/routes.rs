use std::io::Cursor;

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use chrono::{DateTime, TimeDelta, Utc};
use image::{DynamicImage, ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{CaptureLogEntry, LatestImage};
use crate::error::ApiError;

use super::AppState;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_info;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Recorder control
        .route("/recording_status", get(recording_status))
        .route("/start_record", put(start_record))
        .route("/stop_record", put(stop_record))
        .route("/debug_uuid", get(debug_uuid))
        // Capture queries
        .route("/log", get(capture_log))
        .route("/current", get(current_image))
        .route("/past", get(past_image))
        .route("/image", get(get_image))
        .route("/empty_image", get(empty_image))
        .with_state(state)
}

async fn recording_status(State(state): State<AppState>) -> &'static str {
    if state.flags.is_capturing() {
        "true"
    } else {
        "false"
    }
}

async fn start_record(State(state): State<AppState>) -> &'static str {
    if state.flags.start_capturing() {
        log_info!("recording started by control plane");
    }
    "started with success"
}

async fn stop_record(State(state): State<AppState>) -> &'static str {
    if state.flags.stop_capturing() {
        log_info!("recording stopped by control plane");
    }
    "stopped with success"
}

async fn debug_uuid(State(state): State<AppState>) -> String {
    state.instance_id.to_string()
}

async fn capture_log(
    State(state): State<AppState>,
) -> Result<Json<Vec<CaptureLogEntry>>, ApiError> {
    Ok(Json(state.db.list_capture_logs().await?))
}

/// Body of `/current` and `/past`.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ImageSummary {
    pub image_valid: bool,
    pub image_url: String,
    pub image_uuid: Option<Uuid>,
    pub image_time: Option<DateTime<Utc>>,
}

impl From<Option<LatestImage>> for ImageSummary {
    fn from(latest: Option<LatestImage>) -> Self {
        match latest {
            Some(image) => Self {
                image_valid: true,
                image_url: format!("/image?image_uuid={}", image.image_uuid),
                image_uuid: Some(image.image_uuid),
                image_time: image.image_end_time,
            },
            None => Self {
                image_valid: false,
                image_url: "/empty_image".to_string(),
                image_uuid: None,
                image_time: None,
            },
        }
    }
}

async fn current_image(State(state): State<AppState>) -> Result<Json<ImageSummary>, ApiError> {
    let latest = state.db.latest_valid_capture().await?;
    Ok(Json(latest.into()))
}

#[derive(Debug, Deserialize)]
struct PastQuery {
    seconds_ago: Option<String>,
}

async fn past_image(
    State(state): State<AppState>,
    Query(query): Query<PastQuery>,
) -> Result<Json<ImageSummary>, ApiError> {
    let raw = query
        .seconds_ago
        .ok_or_else(|| ApiError::InvalidInput("seconds_ago is required".into()))?;
    let seconds: i64 = raw
        .trim()
        .parse()
        .map_err(|_| ApiError::InvalidInput(format!("seconds_ago must be an integer, got {raw:?}")))?;
    if seconds < 0 {
        return Err(ApiError::InvalidInput(format!(
            "seconds_ago must not be negative, got {seconds}"
        )));
    }

    let before = TimeDelta::try_seconds(seconds)
        .and_then(|ago| Utc::now().checked_sub_signed(ago))
        .ok_or_else(|| ApiError::InvalidInput(format!("seconds_ago {seconds} is out of range")))?;

    let latest = state.db.valid_capture_before(before).await?;
    Ok(Json(latest.into()))
}

#[derive(Debug, Deserialize)]
struct ImageQuery {
    image_uuid: Option<String>,
}

async fn get_image(
    State(state): State<AppState>,
    Query(query): Query<ImageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let raw = query
        .image_uuid
        .ok_or_else(|| ApiError::InvalidInput("image_uuid is required".into()))?;
    let id = Uuid::parse_str(&raw)
        .map_err(|err| ApiError::InvalidInput(format!("image_uuid {raw:?}: {err}")))?;

    let filename = state
        .db
        .capture_filename(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("image {id}")))?;

    let bytes = match tokio::fs::read(&filename).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound(format!("image file {filename}")));
        }
        Err(err) => return Err(err.into()),
    };

    Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes))
}

async fn empty_image() -> Result<impl IntoResponse, ApiError> {
    Ok(([(header::CONTENT_TYPE, "image/png")], empty_png()?))
}

/// A single transparent pixel.
fn empty_png() -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(RgbaImage::new(1, 1))
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(std::io::Error::other)?;
    Ok(buf)
}
