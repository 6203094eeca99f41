//! Object detector integration (§4.5). The model itself is an opaque
//! external collaborator; this crate only needs the call interface plus
//! the core's two concerns — confidence threshold and class filtering.

use types::{DetectionBox, Frame};

/// `infer` must be safe to call from the capture loop thread and return
/// promptly. If no model is loaded, implementations return an empty list
/// (§4.5) — callers always hold a `Box<dyn Detector>`, so there is no
/// runtime "is a model loaded" branch at call sites (§9).
pub trait Detector: Send + Sync {
    fn infer(&self, frame: &Frame) -> Vec<DetectionBox>;
}

/// The `Absent` variant of §9's "dynamic optional detector": always empty.
pub struct NullDetector;

impl Detector for NullDetector {
    fn infer(&self, _frame: &Frame) -> Vec<DetectionBox> {
        Vec::new()
    }
}

/// Confidence/class filtering, applied uniformly regardless of which
/// concrete detector is wrapped (§4.5 "only class_id filtering and
/// confidence threshold are the core's concern").
pub struct FilteredDetector {
    inner: Box<dyn Detector>,
    confidence_threshold: f64,
    classes: Option<Vec<i32>>,
}

impl FilteredDetector {
    pub fn new(inner: Box<dyn Detector>, confidence_threshold: f64, classes: Option<Vec<i32>>) -> Self {
        Self {
            inner,
            confidence_threshold,
            classes,
        }
    }
}

impl Detector for FilteredDetector {
    fn infer(&self, frame: &Frame) -> Vec<DetectionBox> {
        self.inner
            .infer(frame)
            .into_iter()
            .filter(|b| b.confidence >= self.confidence_threshold)
            .filter(|b| {
                self.classes
                    .as_ref()
                    .map(|classes| classes.contains(&b.class_id))
                    .unwrap_or(true)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedDetector(Vec<DetectionBox>);

    impl Detector for FixedDetector {
        fn infer(&self, _frame: &Frame) -> Vec<DetectionBox> {
            self.0.clone()
        }
    }

    fn box_with(confidence: f64, class_id: i32) -> DetectionBox {
        DetectionBox {
            x1: 0,
            y1: 0,
            x2: 10,
            y2: 10,
            label: "x".into(),
            confidence,
            class_id,
        }
    }

    fn frame() -> Frame {
        Frame {
            data: std::sync::Arc::new(vec![]),
            width: 640,
            height: 480,
            sequence: 0,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn test_null_detector_returns_empty() {
        assert!(NullDetector.infer(&frame()).is_empty());
    }

    #[test]
    fn test_filtered_detector_applies_confidence_threshold() {
        let inner = Box::new(FixedDetector(vec![box_with(0.9, 0), box_with(0.2, 0)]));
        let filtered = FilteredDetector::new(inner, 0.5, None);
        let result = filtered.infer(&frame());
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].confidence, 0.9);
    }

    #[test]
    fn test_filtered_detector_applies_class_filter() {
        let inner = Box::new(FixedDetector(vec![box_with(0.9, 0), box_with(0.9, 2)]));
        let filtered = FilteredDetector::new(inner, 0.0, Some(vec![0]));
        let result = filtered.infer(&frame());
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].class_id, 0);
    }
}
