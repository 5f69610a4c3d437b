//! Burst analysis: choose the verdict and the best image for a burst.
//!
//! Two strategies:
//! - per-image: classify images in capture order, stop at the first prey hit
//! - joint: one request for the whole burst, validated and clamped
//!
//! `BurstAnalyzer` prefers the joint strategy when the backend supports it and
//! falls back to per-image over the same images when the joint call fails.

use serde::Serialize;

use super::{ClassifierCapability, ClassifierPort, DetectionType, JointVerdict};

/// Strategy that produced a `BurstVerdict`.
///
/// The two strategies can disagree on `best_index` for the same burst, so the
/// strategy travels with the verdict into logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStrategy {
    PerImage,
    Joint,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BurstVerdict {
    pub cat: bool,
    pub prey: bool,
    /// Index of the most representative image; `None` when no image qualified.
    /// Always `Some(i)` with `i < images.len()` when `cat` is true.
    pub best_index: Option<usize>,
    pub strategy: AnalysisStrategy,
}

impl BurstVerdict {
    pub fn negative(strategy: AnalysisStrategy) -> Self {
        Self {
            cat: false,
            prey: false,
            best_index: None,
            strategy,
        }
    }

    pub fn detection_type(&self) -> DetectionType {
        DetectionType::from_flags(self.cat, self.prey)
    }
}

/// Per-image strategy.
///
/// A prey hit returns immediately; later images are not classified. Without a
/// prey hit the first cat image wins. A classifier error counts as a negative
/// for that image.
pub fn analyze_per_image(classifier: &mut dyn ClassifierPort, images: &[Vec<u8>]) -> BurstVerdict {
    let mut first_cat = None;

    for (index, image) in images.iter().enumerate() {
        let verdict = match classifier.classify_one(image) {
            Ok(verdict) => verdict,
            Err(e) => {
                log::warn!(
                    target: "sentinel::classify",
                    "image {} of {} not classified, counted as negative: {}",
                    index + 1,
                    images.len(),
                    e
                );
                continue;
            }
        };
        log::debug!(
            target: "sentinel::classify",
            "image {}: cat={} prey={}",
            index,
            verdict.cat,
            verdict.prey
        );

        if verdict.cat && verdict.prey {
            return BurstVerdict {
                cat: true,
                prey: true,
                best_index: Some(index),
                strategy: AnalysisStrategy::PerImage,
            };
        }
        if verdict.cat && first_cat.is_none() {
            first_cat = Some(index);
        }
    }

    match first_cat {
        Some(index) => BurstVerdict {
            cat: true,
            prey: false,
            best_index: Some(index),
            strategy: AnalysisStrategy::PerImage,
        },
        None => BurstVerdict::negative(AnalysisStrategy::PerImage),
    }
}

/// Validate a joint verdict against the burst size.
///
/// A positive verdict with a missing or out-of-range index is clamped to the
/// first image. A negative verdict carries no index. Prey without a cat is
/// treated as no prey.
pub fn resolve_joint(verdict: JointVerdict, image_count: usize) -> BurstVerdict {
    if !verdict.cat || image_count == 0 {
        return BurstVerdict::negative(AnalysisStrategy::Joint);
    }

    let best_index = match verdict.best_index {
        Some(index) if index >= 0 && (index as u64) < image_count as u64 => index as usize,
        other => {
            log::warn!(
                target: "sentinel::classify",
                "joint best index {:?} invalid for {} images, using 0",
                other,
                image_count
            );
            0
        }
    };

    BurstVerdict {
        cat: true,
        prey: verdict.prey,
        best_index: Some(best_index),
        strategy: AnalysisStrategy::Joint,
    }
}

/// Burst analysis policy: joint when available, per-image otherwise or on failure.
pub struct BurstAnalyzer {
    classifier: Box<dyn ClassifierPort>,
}

impl BurstAnalyzer {
    pub fn new(classifier: Box<dyn ClassifierPort>) -> Self {
        Self { classifier }
    }

    pub fn backend_name(&self) -> &'static str {
        self.classifier.name()
    }

    pub fn analyze(&mut self, images: &[Vec<u8>]) -> BurstVerdict {
        if images.is_empty() {
            return BurstVerdict::negative(AnalysisStrategy::PerImage);
        }

        if self.classifier.supports(ClassifierCapability::JointBurst) {
            match self.classifier.classify_many(images) {
                Ok(joint) => return resolve_joint(joint, images.len()),
                Err(e) => {
                    log::warn!(
                        target: "sentinel::classify",
                        "joint analysis by {} failed, falling back to per-image: {}",
                        self.classifier.name(),
                        e
                    );
                }
            }
        }

        analyze_per_image(self.classifier.as_mut(), images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ImageVerdict;
    use crate::error::ClassifyError;

    /// Answers from a fixed table keyed by the image's first byte and records calls.
    struct TableClassifier {
        joint: Option<Result<JointVerdict, ()>>,
        calls: Vec<u8>,
    }

    const NO_CAT: u8 = 0;
    const CAT: u8 = 1;
    const CAT_PREY: u8 = 2;
    const BROKEN: u8 = 9;

    impl TableClassifier {
        fn per_image() -> Self {
            Self {
                joint: None,
                calls: Vec::new(),
            }
        }

        fn joint(result: Result<JointVerdict, ()>) -> Self {
            Self {
                joint: Some(result),
                calls: Vec::new(),
            }
        }
    }

    impl ClassifierPort for TableClassifier {
        fn name(&self) -> &'static str {
            "table"
        }

        fn supports(&self, capability: ClassifierCapability) -> bool {
            match capability {
                ClassifierCapability::SingleImage => true,
                ClassifierCapability::JointBurst => self.joint.is_some(),
            }
        }

        fn classify_one(&mut self, image: &[u8]) -> Result<ImageVerdict, ClassifyError> {
            self.calls.push(image[0]);
            match image[0] {
                CAT => Ok(ImageVerdict { cat: true, prey: false }),
                CAT_PREY => Ok(ImageVerdict { cat: true, prey: true }),
                BROKEN => Err(ClassifyError::Malformed("garbage".into())),
                _ => Ok(ImageVerdict::default()),
            }
        }

        fn classify_many(&mut self, _images: &[Vec<u8>]) -> Result<JointVerdict, ClassifyError> {
            match self.joint {
                Some(Ok(verdict)) => Ok(verdict),
                _ => Err(ClassifyError::Malformed("not json".into())),
            }
        }
    }

    fn burst(kinds: &[u8]) -> Vec<Vec<u8>> {
        kinds.iter().map(|kind| vec![*kind]).collect()
    }

    #[test]
    fn prey_hit_exits_early() {
        let mut classifier = TableClassifier::per_image();
        let verdict = analyze_per_image(&mut classifier, &burst(&[CAT, CAT_PREY, NO_CAT]));
        assert!(verdict.cat);
        assert!(verdict.prey);
        assert_eq!(verdict.best_index, Some(1));
        assert_eq!(classifier.calls, vec![CAT, CAT_PREY]);
    }

    #[test]
    fn first_cat_wins_without_prey() {
        let mut classifier = TableClassifier::per_image();
        let verdict = analyze_per_image(&mut classifier, &burst(&[NO_CAT, CAT]));
        assert!(verdict.cat);
        assert!(!verdict.prey);
        assert_eq!(verdict.best_index, Some(1));
    }

    #[test]
    fn no_cat_has_no_best_index() {
        let mut classifier = TableClassifier::per_image();
        let verdict = analyze_per_image(&mut classifier, &burst(&[NO_CAT, NO_CAT]));
        assert_eq!(verdict, BurstVerdict::negative(AnalysisStrategy::PerImage));
    }

    #[test]
    fn per_image_error_counts_as_negative() {
        let mut classifier = TableClassifier::per_image();
        let verdict = analyze_per_image(&mut classifier, &burst(&[BROKEN, CAT]));
        assert_eq!(verdict.best_index, Some(1));
        assert!(verdict.cat);
    }

    #[test]
    fn joint_index_out_of_range_is_clamped() {
        let verdict = resolve_joint(
            JointVerdict {
                cat: true,
                prey: true,
                best_index: Some(7),
            },
            3,
        );
        assert_eq!(verdict.best_index, Some(0));
        assert_eq!(verdict.strategy, AnalysisStrategy::Joint);
        assert!(verdict.prey);
    }

    #[test]
    fn joint_null_or_negative_index_is_clamped() {
        for best_index in [None, Some(-1)] {
            let verdict = resolve_joint(
                JointVerdict {
                    cat: true,
                    prey: false,
                    best_index,
                },
                2,
            );
            assert_eq!(verdict.best_index, Some(0));
        }
    }

    #[test]
    fn joint_negative_drops_prey_and_index() {
        let verdict = resolve_joint(
            JointVerdict {
                cat: false,
                prey: true,
                best_index: Some(1),
            },
            2,
        );
        assert_eq!(verdict, BurstVerdict::negative(AnalysisStrategy::Joint));
    }

    #[test]
    fn analyzer_prefers_joint_strategy() {
        let classifier = TableClassifier::joint(Ok(JointVerdict {
            cat: true,
            prey: false,
            best_index: Some(2),
        }));
        let mut analyzer = BurstAnalyzer::new(Box::new(classifier));
        let verdict = analyzer.analyze(&burst(&[NO_CAT, NO_CAT, CAT]));
        assert_eq!(verdict.strategy, AnalysisStrategy::Joint);
        assert_eq!(verdict.best_index, Some(2));
    }

    #[test]
    fn analyzer_falls_back_when_joint_fails() {
        let classifier = TableClassifier::joint(Err(()));
        let mut analyzer = BurstAnalyzer::new(Box::new(classifier));
        let verdict = analyzer.analyze(&burst(&[CAT, CAT_PREY, NO_CAT]));
        assert_eq!(verdict.strategy, AnalysisStrategy::PerImage);
        assert_eq!(verdict.best_index, Some(1));
        assert!(verdict.prey);
    }
}
