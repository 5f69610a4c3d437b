mod burst;
pub mod gemini;
pub mod stub;

use serde::Serialize;

use crate::error::ClassifyError;

pub use burst::{analyze_per_image, resolve_joint, AnalysisStrategy, BurstAnalyzer, BurstVerdict};
pub use gemini::GeminiClassifier;
pub use stub::StubClassifier;

/// Classification capabilities a backend may offer.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassifierCapability {
    /// One image per request. Every backend supports this.
    SingleImage,
    /// All burst images in one request, answered with a best index.
    JointBurst,
}

/// Verdict for one image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImageVerdict {
    pub cat: bool,
    pub prey: bool,
}

/// Raw joint verdict as reported by a backend, before range validation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct JointVerdict {
    pub cat: bool,
    pub prey: bool,
    pub best_index: Option<i64>,
}

/// What a burst (or a single evidence image) shows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionType {
    #[default]
    None,
    Cat,
    CatWithPrey,
}

impl DetectionType {
    pub fn from_flags(cat: bool, prey: bool) -> Self {
        match (cat, prey) {
            (true, true) => DetectionType::CatWithPrey,
            (true, false) => DetectionType::Cat,
            (false, _) => DetectionType::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionType::None => "none",
            DetectionType::Cat => "cat",
            DetectionType::CatWithPrey => "cat_with_prey",
        }
    }
}

/// Image classification backend.
///
/// Backends only answer questions about the pixels they are given; they do not
/// persist images or trigger side effects.
pub trait ClassifierPort: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Returns true when the backend supports a capability.
    fn supports(&self, capability: ClassifierCapability) -> bool;

    /// Classify one JPEG image.
    fn classify_one(&mut self, image: &[u8]) -> Result<ImageVerdict, ClassifyError>;

    /// Classify a whole burst in one request.
    ///
    /// Only called when `supports(ClassifierCapability::JointBurst)` is true.
    fn classify_many(&mut self, _images: &[Vec<u8>]) -> Result<JointVerdict, ClassifyError> {
        Err(ClassifyError::Unsupported {
            backend: self.name(),
            capability: "joint burst classification",
        })
    }
}

/// Extract the outermost JSON object from model output that may carry prose or code fences.
pub(crate) fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
