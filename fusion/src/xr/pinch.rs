//! Pinch detection: index fingertip to thumb tip proximity.

use nalgebra::Point3;

use super::hand_tracking::{HandJoint, TrackedHand};

/// Pinch threshold configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PinchConfig {
    /// Tip-to-tip distance (meters) below which the hand is pinching.
    pub threshold_m: f32,
}

impl Default for PinchConfig {
    fn default() -> Self {
        Self { threshold_m: 0.018 }
    }
}

/// Result of one pinch test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinchReading {
    pub distance_m: f32,
    pub pinching: bool,
}

impl PinchReading {
    pub fn to_sexp(&self) -> String {
        format!(
            "(:distance-m {:.4} :pinching {})",
            self.distance_m,
            if self.pinching { "t" } else { "nil" },
        )
    }
}

/// Pinching iff the tips are strictly closer than `threshold_m`.
pub fn detect_pinch(index_tip: &Point3<f32>, thumb_tip: &Point3<f32>, threshold_m: f32) -> PinchReading {
    let distance_m = nalgebra::distance(index_tip, thumb_tip);
    PinchReading {
        distance_m,
        pinching: distance_m < threshold_m,
    }
}

/// Pinch test on a tracked hand's index and thumb tips.
pub fn detect_hand_pinch(hand: &TrackedHand, threshold_m: f32) -> PinchReading {
    detect_pinch(
        &hand.position(HandJoint::IndexFingerTip),
        &hand.position(HandJoint::ThumbTip),
        threshold_m,
    )
}
