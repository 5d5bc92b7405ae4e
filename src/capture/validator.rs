use std::{
    io::Cursor,
    path::{Path, PathBuf},
};

use image::{DynamicImage, ImageBuffer, ImageFormat, ImageReader, Pixel};
use serde::{Deserialize, Serialize};

use crate::db::ImageGeometry;
use crate::error::{Stage, StageError};

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// Counter-clockwise rotation applied to stored images, normalised to
/// `0..360` degrees. The canvas grows to hold the whole rotated image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub struct Rotation(u16);

impl Rotation {
    pub fn from_degrees(degrees: i64) -> Self {
        Self(degrees.rem_euclid(360) as u16)
    }

    pub fn degrees(self) -> u16 {
        self.0
    }

    pub fn is_identity(self) -> bool {
        self.0 == 0
    }

    fn apply(self, image: DynamicImage) -> DynamicImage {
        // image's quarter turns are clockwise
        match self.0 {
            0 => image,
            90 => image.rotate270(),
            180 => image.rotate180(),
            270 => image.rotate90(),
            degrees => {
                let radians = f64::from(degrees).to_radians();
                if image.color().has_alpha() {
                    DynamicImage::ImageRgba8(rotate_expanded(&image.to_rgba8(), radians))
                } else {
                    DynamicImage::ImageRgb8(rotate_expanded(&image.to_rgb8(), radians))
                }
            }
        }
    }
}

impl From<i64> for Rotation {
    fn from(degrees: i64) -> Self {
        Self::from_degrees(degrees)
    }
}

impl From<Rotation> for i64 {
    fn from(rotation: Rotation) -> Self {
        i64::from(rotation.0)
    }
}

/// Size of the canvas that holds a `width` x `height` image rotated by
/// `radians`.
fn expanded_size(width: u32, height: u32, radians: f64) -> (u32, u32) {
    let (sin, cos) = radians.sin_cos();
    let (sin, cos) = (sin.abs(), cos.abs());
    let (w, h) = (f64::from(width), f64::from(height));
    // absorb float noise so exact fits do not grow by a pixel
    let fit = |extent: f64| (extent - 1e-6).ceil().max(1.0) as u32;
    (fit(w * cos + h * sin), fit(w * sin + h * cos))
}

/// Nearest-neighbour rotation about the centre onto an expanded canvas.
/// Uncovered pixels stay zeroed (black, or transparent with alpha).
fn rotate_expanded<P: Pixel>(
    source: &ImageBuffer<P, Vec<P::Subpixel>>,
    radians: f64,
) -> ImageBuffer<P, Vec<P::Subpixel>> {
    let (width, height) = source.dimensions();
    let (out_width, out_height) = expanded_size(width, height, radians);
    let (sin, cos) = radians.sin_cos();

    let (src_cx, src_cy) = (f64::from(width) / 2.0, f64::from(height) / 2.0);
    let (dst_cx, dst_cy) = (f64::from(out_width) / 2.0, f64::from(out_height) / 2.0);

    let mut rotated = ImageBuffer::new(out_width, out_height);
    for (x, y, pixel) in rotated.enumerate_pixels_mut() {
        let dx = f64::from(x) + 0.5 - dst_cx;
        let dy = f64::from(y) + 0.5 - dst_cy;
        // inverse map with y pointing down
        let sx = (dx * cos - dy * sin + src_cx).floor();
        let sy = (dx * sin + dy * cos + src_cy).floor();
        if sx >= 0.0 && sy >= 0.0 && sx < f64::from(width) && sy < f64::from(height) {
            *pixel = *source.get_pixel(sx as u32, sy as u32);
        }
    }
    rotated
}

/// Opens the stored image, checks it is structurally complete, and returns its
/// size. With a rotation, the file is rewritten rotated; the returned geometry
/// is the size as captured.
pub async fn verify_image(
    path: PathBuf,
    rotation: Option<Rotation>,
) -> Result<ImageGeometry, StageError> {
    tokio::task::spawn_blocking(move || verify_image_blocking(&path, rotation))
        .await
        .map_err(|err| StageError::Panicked {
            stage: Stage::Validate,
            message: err.to_string(),
        })?
}

pub fn verify_image_blocking(
    path: &Path,
    rotation: Option<Rotation>,
) -> Result<ImageGeometry, StageError> {
    let io_error = |source| StageError::Io {
        stage: Stage::Validate,
        path: path.to_path_buf(),
        source,
    };

    let bytes = std::fs::read(path).map_err(io_error)?;

    let reader = ImageReader::new(Cursor::new(bytes.as_slice()))
        .with_guessed_format()
        .map_err(io_error)?;
    let format = reader
        .format()
        .ok_or_else(|| StageError::InvalidImage("unrecognised image format".into()))?;

    if format == ImageFormat::Jpeg && !is_complete_jpeg(&bytes) {
        return Err(StageError::InvalidImage(
            "JPEG is truncated (missing end-of-image marker)".into(),
        ));
    }

    let image = reader
        .decode()
        .map_err(|err| StageError::InvalidImage(err.to_string()))?;

    let geometry = ImageGeometry {
        width: image.width(),
        height: image.height(),
    };
    if geometry.width == 0 || geometry.height == 0 {
        return Err(StageError::InvalidImage(format!(
            "image has empty dimensions {}x{}",
            geometry.width, geometry.height
        )));
    }

    if let Some(rotation) = rotation.filter(|rotation| !rotation.is_identity()) {
        rotation
            .apply(image)
            .save_with_format(path, format)
            .map_err(|err| {
                StageError::InvalidImage(format!(
                    "failed to write rotated image {}: {err}",
                    path.display()
                ))
            })?;
    }

    Ok(geometry)
}

/// SOI at the start and an EOI marker at the end, ignoring the `0x00`/`0xFF`
/// filler some camera frame buffers append after EOI.
fn is_complete_jpeg(bytes: &[u8]) -> bool {
    let end = bytes
        .iter()
        .rposition(|&byte| byte != 0x00 && byte != 0xFF)
        .map_or(0, |last| last + 1);
    let payload = &bytes[..end];
    payload.len() >= JPEG_SOI.len() + JPEG_EOI.len()
        && payload.starts_with(&JPEG_SOI)
        && payload.ends_with(&JPEG_EOI)
}
