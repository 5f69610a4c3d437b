use super::{ClassifierCapability, ClassifierPort, ImageVerdict};
use crate::error::ClassifyError;

/// Stub classifier for testing and `stub://` demos.
///
/// Reads the plain-text scene marker written by `StubCamera`: payloads ending in
/// `:cat+prey` show a cat with prey, `:cat` a cat, anything else nothing.
pub struct StubClassifier;

impl StubClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StubClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassifierPort for StubClassifier {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn supports(&self, capability: ClassifierCapability) -> bool {
        matches!(capability, ClassifierCapability::SingleImage)
    }

    fn classify_one(&mut self, image: &[u8]) -> Result<ImageVerdict, ClassifyError> {
        let payload = std::str::from_utf8(image)
            .map_err(|_| ClassifyError::Malformed("stub classifier expects text payloads".into()))?;
        let verdict = if payload.ends_with(":cat+prey") {
            ImageVerdict {
                cat: true,
                prey: true,
            }
        } else if payload.ends_with(":cat") {
            ImageVerdict {
                cat: true,
                prey: false,
            }
        } else {
            ImageVerdict::default()
        };
        Ok(verdict)
    }
}
