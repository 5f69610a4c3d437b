//! Evidence filename codec.
//!
//! Evidence metadata lives only in file names. Canonical form:
//!
//! ```text
//! <detection_type>_best_<group_id>_seq<N>.jpg
//! ```
//!
//! where the detection type is omitted for `none`, `best` only appears on the
//! group's best image, and `seq<N>` is omitted when the image has no position.
//! Older deployments wrote `YYYYmmdd_HHMMSS.jpg`, `<type>_YYYYmmdd_HHMMSS.jpg`
//! and `<type>_<group>_seq<N>.jpg`; `decode` accepts all of them.

use chrono::NaiveDateTime;

use crate::classify::DetectionType;

pub const LATEST_FILE_NAME: &str = "latest.jpg";
const EXTENSION: &str = ".jpg";
const BEST_MARKER: &str = "best";
const SEQ_MARKER: &str = "_seq";
const LEGACY_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Metadata recovered from an evidence file name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvidenceName {
    pub detection_type: DetectionType,
    pub is_best: bool,
    pub group_id: Option<String>,
    pub sequence_index: Option<u32>,
    /// Capture time, for legacy names that embed a timestamp.
    pub captured_at: Option<NaiveDateTime>,
}

pub fn encode(
    detection_type: DetectionType,
    is_best: bool,
    group_id: &str,
    sequence_index: Option<u32>,
) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(4);
    if detection_type != DetectionType::None {
        parts.push(detection_type.as_str().to_string());
    }
    if is_best {
        parts.push(BEST_MARKER.to_string());
    }
    parts.push(group_id.to_string());
    let mut name = parts.join("_");
    if let Some(seq) = sequence_index {
        name.push_str(&format!("{}{}", SEQ_MARKER, seq));
    }
    name.push_str(EXTENSION);
    name
}

/// Decode a file name. Returns `None` for `latest.jpg` and anything that is not evidence.
pub fn decode(file_name: &str) -> Option<EvidenceName> {
    if file_name == LATEST_FILE_NAME {
        return None;
    }
    let stem = file_name.strip_suffix(EXTENSION)?;

    let (detection_type, rest) = if let Some(rest) = stem.strip_prefix("cat_with_prey_") {
        (DetectionType::CatWithPrey, rest)
    } else if let Some(rest) = stem.strip_prefix("cat_") {
        (DetectionType::Cat, rest)
    } else {
        (DetectionType::None, stem)
    };

    let (is_best, rest) = match rest.strip_prefix("best_") {
        Some(rest) => (true, rest),
        None => (false, rest),
    };

    let (body, sequence_index) = match rest.rsplit_once(SEQ_MARKER) {
        Some((body, seq)) => match seq.parse::<u32>() {
            Ok(seq) => (body, Some(seq)),
            Err(_) => (rest, None),
        },
        None => (rest, None),
    };
    if body.is_empty() {
        return None;
    }

    let captured_at = NaiveDateTime::parse_from_str(body, LEGACY_TIMESTAMP_FORMAT).ok();
    // A bare timestamp names a single image, not a group.
    let group_id = if captured_at.is_some() && sequence_index.is_none() {
        None
    } else {
        Some(body.to_string())
    };

    Some(EvidenceName {
        detection_type,
        is_best,
        group_id,
        sequence_index,
        captured_at,
    })
}
