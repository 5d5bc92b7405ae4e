//! ESP32 camera frame sizes.
//!
//! The camera's status document only reports a numeric `framesize` code; the
//! table maps it to a readable name. Codes past `UXGA` belong to 3MP/5MP
//! sensors and are treated as unknown.

use serde_json::Value;

use crate::error::StageError;

pub const FRAME_SIZES: [&str; 14] = [
    "96X96",
    "QQVGA(160x120)",
    "QCIF(176x144)",
    "HQVGA(240x176)",
    "240X240",
    "QVGA(320x240)",
    "CIF(400x296)",
    "HVGA(480x320)",
    "VGA(640x480)",
    "SVGA(800x600)",
    "XGA(1024x768)",
    "HD(1280x720)",
    "SXGA(1280x1024)",
    "UXGA(1600x1200)",
];

pub fn frame_size_name(code: i64) -> Option<&'static str> {
    usize::try_from(code)
        .ok()
        .and_then(|index| FRAME_SIZES.get(index))
        .copied()
}

/// Extracts and maps the `framesize` field of a status document.
pub fn parse_status(body: &str) -> Result<&'static str, StageError> {
    let status: Value = serde_json::from_str(body)
        .map_err(|err| StageError::MalformedStatus(format!("invalid JSON: {err}")))?;

    let field = status
        .get("framesize")
        .ok_or_else(|| StageError::MalformedStatus("missing framesize field".into()))?;

    let code = field.as_i64().ok_or_else(|| {
        StageError::MalformedStatus(format!("framesize is not an integer: {field}"))
    })?;

    frame_size_name(code).ok_or(StageError::UnknownFrameSize(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_codes() {
        assert_eq!(frame_size_name(0), Some("96X96"));
        assert_eq!(frame_size_name(8), Some("VGA(640x480)"));
        assert_eq!(frame_size_name(13), Some("UXGA(1600x1200)"));
    }

    #[test]
    fn rejects_codes_outside_table() {
        assert_eq!(frame_size_name(14), None);
        assert_eq!(frame_size_name(-1), None);
    }

    #[test]
    fn parses_device_status_document() {
        let body = r#"{"framesize":9,"quality":10,"brightness":0}"#;
        assert_eq!(parse_status(body).unwrap(), "SVGA(800x600)");
    }

    #[test]
    fn unknown_code_is_a_status_failure() {
        let err = parse_status(r#"{"framesize":21}"#).unwrap_err();
        assert!(matches!(err, StageError::UnknownFrameSize(21)));
        assert!(err.is_hard());
    }

    #[test]
    fn malformed_documents_are_rejected() {
        for body in ["not json", r#"{"quality":10}"#, r#"{"framesize":"VGA"}"#] {
            let err = parse_status(body).unwrap_err();
            assert!(matches!(err, StageError::MalformedStatus(_)), "{body}: {err}");
        }
    }
}
