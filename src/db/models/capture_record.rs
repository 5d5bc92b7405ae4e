//! Capture record data model.
//!
//! One record per capture attempt. It is created at the start of an iteration,
//! filled in stage by stage, handed to the sink once, then dropped.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Width and height of a decoded image, both non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageGeometry {
    pub width: u32,
    pub height: u32,
}

/// Where the image for `id` lives. Depends on nothing but its inputs.
pub fn image_path_for(storage_dir: &Path, id: &Uuid) -> PathBuf {
    storage_dir.join(format!("{id}.jpg"))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureRecord {
    pub id: Uuid,
    pub image_start_time: DateTime<Utc>,
    pub image_end_time: Option<DateTime<Utc>>,
    pub image_filename: PathBuf,
    pub status_start_time: Option<DateTime<Utc>>,
    pub status_end_time: Option<DateTime<Utc>>,
    pub status_framesize: Option<String>,
    pub image_valid: bool,
    pub image_width: Option<u32>,
    pub image_height: Option<u32>,
}

impl CaptureRecord {
    /// Fresh record with a new identity. No I/O happens here.
    pub fn begin(storage_dir: &Path, now: DateTime<Utc>) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            image_start_time: now,
            image_end_time: None,
            image_filename: image_path_for(storage_dir, &id),
            status_start_time: None,
            status_end_time: None,
            status_framesize: None,
            image_valid: false,
            image_width: None,
            image_height: None,
        }
    }

    pub fn mark_valid(&mut self, geometry: ImageGeometry) {
        self.image_valid = true;
        self.image_width = Some(geometry.width);
        self.image_height = Some(geometry.height);
    }

    pub fn mark_invalid(&mut self) {
        self.image_valid = false;
        self.image_width = None;
        self.image_height = None;
    }

    pub fn geometry(&self) -> Option<ImageGeometry> {
        match (self.image_valid, self.image_width, self.image_height) {
            (true, Some(width), Some(height)) => Some(ImageGeometry { width, height }),
            _ => None,
        }
    }

    pub fn file_name(&self) -> String {
        self.image_filename
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.image_filename.display().to_string())
    }
}

/// Row of the capture log view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureLogEntry {
    pub image_uuid: Uuid,
    pub image_valid: bool,
    pub image_start_time: DateTime<Utc>,
    pub image_end_time: Option<DateTime<Utc>>,
    pub status_start_time: Option<DateTime<Utc>>,
    pub status_end_time: Option<DateTime<Utc>>,
}

/// Most recent valid image matching a query.
#[derive(Debug, Clone, PartialEq)]
pub struct LatestImage {
    pub image_uuid: Uuid,
    pub image_filename: PathBuf,
    pub image_end_time: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_path_is_derived_from_identity() {
        let dir = Path::new("/var/lib/camrecord");
        let record = CaptureRecord::begin(dir, Utc::now());
        assert_eq!(record.image_filename, image_path_for(dir, &record.id));
        assert_eq!(
            image_path_for(dir, &record.id),
            image_path_for(dir, &record.id)
        );
        assert_eq!(record.file_name(), format!("{}.jpg", record.id));
    }

    #[test]
    fn identities_are_fresh_per_record() {
        let dir = Path::new("/tmp");
        let a = CaptureRecord::begin(dir, Utc::now());
        let b = CaptureRecord::begin(dir, Utc::now());
        assert_ne!(a.id, b.id);
        assert_ne!(a.image_filename, b.image_filename);
    }

    #[test]
    fn validity_tracks_geometry() {
        let mut record = CaptureRecord::begin(Path::new("/tmp"), Utc::now());
        assert!(!record.image_valid);
        assert_eq!(record.geometry(), None);

        record.mark_valid(ImageGeometry { width: 640, height: 480 });
        assert_eq!(record.geometry(), Some(ImageGeometry { width: 640, height: 480 }));

        record.mark_invalid();
        assert!(!record.image_valid);
        assert_eq!((record.image_width, record.image_height), (None, None));
    }
}
