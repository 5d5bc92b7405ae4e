pub mod capture_record;

pub use capture_record::{
    image_path_for, CaptureLogEntry, CaptureRecord, ImageGeometry, LatestImage,
};
