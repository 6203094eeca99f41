//! Auto-navigation policy (§4.6): person-following from object detections.
//!
//! Purely a decision function — dispatching the resulting command through
//! the arbiter with `SourceTag::AutoNav` (so joystick input preempts it
//! automatically, §9) is the caller's job.

use types::{Command, DetectionBox};

/// Horizontal centroid thresholds, as fractions of frame width (§4.6).
pub const LEFT_THRESHOLD: f64 = 0.40;
pub const RIGHT_THRESHOLD: f64 = 0.60;

#[derive(Debug, Clone)]
pub struct FollowPolicy {
    /// `class_id`s that qualify as a follow target. Default: person (0).
    pub classes: Vec<i32>,
}

impl Default for FollowPolicy {
    fn default() -> Self {
        Self { classes: vec![0] }
    }
}

impl FollowPolicy {
    pub fn new(classes: Vec<i32>) -> Self {
        Self { classes }
    }

    /// Among boxes whose `class_id` qualifies, pick the highest-confidence
    /// one and steer toward its horizontal centroid. No qualifying box ->
    /// `Stop`.
    pub fn decide(&self, detections: &[DetectionBox], frame_width: u32) -> Command {
        let target = detections
            .iter()
            .filter(|b| self.classes.contains(&b.class_id))
            .max_by(|a, b| a.confidence.partial_cmp(&b.confidence).unwrap_or(std::cmp::Ordering::Equal));

        let Some(target) = target else {
            return Command::Stop;
        };

        let width = frame_width as f64;
        let xc = target.centroid_x();
        let left = LEFT_THRESHOLD * width;
        let right = RIGHT_THRESHOLD * width;

        if xc < left {
            Command::Left
        } else if xc > right {
            Command::Right
        } else {
            Command::Stop
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(class_id: i32, confidence: f64, xc: i32) -> DetectionBox {
        DetectionBox {
            x1: xc - 5,
            y1: 0,
            x2: xc + 5,
            y2: 10,
            label: "person".into(),
            confidence,
            class_id,
        }
    }

    #[test]
    fn test_no_qualifying_box_is_stop() {
        let policy = FollowPolicy::default();
        assert_eq!(policy.decide(&[], 640), Command::Stop);
    }

    #[test]
    fn test_scenario_6_centroid_left_of_threshold_is_left() {
        // Centroid at 0.3W, frame width 640.
        let policy = FollowPolicy::default();
        let detections = vec![detection(0, 0.9, (0.3 * 640.0) as i32)];
        assert_eq!(policy.decide(&detections, 640), Command::Left);
    }

    #[test]
    fn test_centroid_right_of_threshold_is_right() {
        let policy = FollowPolicy::default();
        let detections = vec![detection(0, 0.9, (0.8 * 640.0) as i32)];
        assert_eq!(policy.decide(&detections, 640), Command::Right);
    }

    #[test]
    fn test_centroid_centered_is_stop() {
        let policy = FollowPolicy::default();
        let detections = vec![detection(0, 0.9, 320)];
        assert_eq!(policy.decide(&detections, 640), Command::Stop);
    }

    #[test]
    fn test_unqualified_class_is_ignored() {
        let policy = FollowPolicy::new(vec![0]);
        let detections = vec![detection(7, 0.99, 50)];
        assert_eq!(policy.decide(&detections, 640), Command::Stop);
    }

    #[test]
    fn test_picks_highest_confidence_among_qualifying() {
        let policy = FollowPolicy::default();
        let detections = vec![
            detection(0, 0.4, (0.8 * 640.0) as i32), // would say Right
            detection(0, 0.9, (0.3 * 640.0) as i32), // higher confidence, says Left
        ];
        assert_eq!(policy.decide(&detections, 640), Command::Left);
    }
}
