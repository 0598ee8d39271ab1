//! Finger curl and palm-facing classification from hand snapshots.
//!
//! Both classifiers are coarse geometric heuristics recomputed from the
//! current frame's snapshot only; nothing is carried over from earlier
//! frames.  Curl compares the straight-line base-to-tip span of a finger
//! against a per-finger threshold, so a finger splayed sideways at its
//! base can read as curled without being bent.

use nalgebra::Vector3;
use tracing::debug;

use super::hand_tracking::{Hand, HandJoint, HandTrackingState, TrackedHand};

// ── Finger ─────────────────────────────────────────────────

/// The five digits, thumb first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Finger {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl Finger {
    pub const ALL: [Finger; 5] = [
        Self::Thumb,
        Self::Index,
        Self::Middle,
        Self::Ring,
        Self::Pinky,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thumb => "thumb",
            Self::Index => "index",
            Self::Middle => "middle",
            Self::Ring => "ring",
            Self::Pinky => "pinky",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Joint the extension is measured from.
    pub fn base_joint(&self) -> HandJoint {
        match self {
            Self::Thumb => HandJoint::ThumbMetacarpal,
            Self::Index => HandJoint::IndexFingerMetacarpal,
            Self::Middle => HandJoint::MiddleFingerMetacarpal,
            Self::Ring => HandJoint::RingFingerMetacarpal,
            Self::Pinky => HandJoint::PinkyFingerMetacarpal,
        }
    }

    pub fn tip_joint(&self) -> HandJoint {
        match self {
            Self::Thumb => HandJoint::ThumbTip,
            Self::Index => HandJoint::IndexFingerTip,
            Self::Middle => HandJoint::MiddleFingerTip,
            Self::Ring => HandJoint::RingFingerTip,
            Self::Pinky => HandJoint::PinkyFingerTip,
        }
    }
}

// ── Palm facing ────────────────────────────────────────────

/// Palm orientation relative to world-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PalmFacing {
    Up,
    Down,
    Side,
}

impl PalmFacing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Side => "side",
        }
    }
}

// ── Config ─────────────────────────────────────────────────

/// Classifier thresholds.  The thumb threshold and the right-hand palm
/// flip are empirically tuned for typical adult hands.
#[derive(Debug, Clone, PartialEq)]
pub struct GestureConfig {
    /// Per-finger curl threshold (meters), indexed by `Finger::index`.
    pub curl_threshold_m: [f32; 5],
    /// |normal · up| above which the palm faces up or down.
    pub palm_facing_threshold: f32,
    /// Negate the right hand's palm normal so both hands share a convention.
    pub flip_right_palm: bool,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            curl_threshold_m: [0.085, 0.055, 0.055, 0.055, 0.050],
            palm_facing_threshold: 0.5,
            flip_right_palm: true,
        }
    }
}

impl GestureConfig {
    pub fn curl_threshold(&self, finger: Finger) -> f32 {
        self.curl_threshold_m[finger.index()]
    }
}

// ── Readings ───────────────────────────────────────────────

/// Curl result for one finger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FingerCurl {
    pub finger: Finger,
    /// Straight-line base-to-tip distance (meters).
    pub extension_m: f32,
    pub curled: bool,
}

/// Palm normal and its classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PalmReading {
    pub normal: Vector3<f32>,
    pub dot_up: f32,
    pub facing: PalmFacing,
}

/// Everything the classifier derives for one tracked hand in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct HandGestures {
    pub hand: Hand,
    pub curls: [FingerCurl; 5],
    /// `None` when the palm basis is degenerate this frame.
    pub palm: Option<PalmReading>,
}

impl HandGestures {
    pub fn curl(&self, finger: Finger) -> &FingerCurl {
        &self.curls[finger.index()]
    }

    pub fn curled_count(&self) -> usize {
        self.curls.iter().filter(|c| c.curled).count()
    }

    pub fn to_sexp(&self) -> String {
        let mut s = String::from("(:curls (");
        for (i, c) in self.curls.iter().enumerate() {
            if i > 0 {
                s.push(' ');
            }
            s.push_str(&format!(
                "(:finger :{} :extension-m {:.3} :curled {})",
                c.finger.as_str(),
                c.extension_m,
                if c.curled { "t" } else { "nil" },
            ));
        }
        s.push_str(") :palm ");
        match &self.palm {
            Some(p) => s.push_str(&format!(":{} :palm-dot {:.2}", p.facing.as_str(), p.dot_up)),
            None => s.push_str("nil"),
        }
        s.push(')');
        s
    }
}

// ── Classification ─────────────────────────────────────────

/// Base-to-tip distance of a finger.
pub fn finger_extension(hand: &TrackedHand, finger: Finger) -> f32 {
    hand.joint_distance(finger.base_joint(), finger.tip_joint())
}

/// A finger is curled iff its extension is strictly below the threshold.
pub fn classify_curl(extension_m: f32, threshold_m: f32) -> bool {
    extension_m < threshold_m
}

/// Palm normal from the wrist and three metacarpals.
///
/// `normalize((pinky − index) × (middle − wrist))`, negated for the right
/// hand when `flip_right` is set.  `None` if the basis is degenerate.
pub fn palm_normal(hand: &TrackedHand, flip_right: bool) -> Option<Vector3<f32>> {
    let wrist = hand.position(HandJoint::Wrist);
    let index = hand.position(HandJoint::IndexFingerMetacarpal);
    let middle = hand.position(HandJoint::MiddleFingerMetacarpal);
    let pinky = hand.position(HandJoint::PinkyFingerMetacarpal);

    let side = pinky - index;
    let forward = middle - wrist;
    let normal = side.cross(&forward).try_normalize(1.0e-9)?;

    if flip_right && hand.hand == Hand::Right {
        Some(-normal)
    } else {
        Some(normal)
    }
}

/// Three-way facing from the normal's projection on world-up.
pub fn classify_palm(dot_up: f32, threshold: f32) -> PalmFacing {
    if dot_up > threshold {
        PalmFacing::Up
    } else if dot_up < -threshold {
        PalmFacing::Down
    } else {
        PalmFacing::Side
    }
}

/// Classify one tracked hand.
pub fn classify_hand(hand: &TrackedHand, config: &GestureConfig) -> HandGestures {
    let curls = Finger::ALL.map(|finger| {
        let extension_m = finger_extension(hand, finger);
        FingerCurl {
            finger,
            extension_m,
            curled: classify_curl(extension_m, config.curl_threshold(finger)),
        }
    });

    let palm = palm_normal(hand, config.flip_right_palm).map(|normal| {
        let dot_up = normal.dot(&Vector3::y());
        PalmReading {
            normal,
            dot_up,
            facing: classify_palm(dot_up, config.palm_facing_threshold),
        }
    });

    HandGestures {
        hand: hand.hand,
        curls,
        palm,
    }
}

// ── State ──────────────────────────────────────────────────

/// Per-frame classifier output for both hands.
#[derive(Debug, Default)]
pub struct GestureState {
    pub config: GestureConfig,
    left: Option<HandGestures>,
    right: Option<HandGestures>,
}

impl GestureState {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            left: None,
            right: None,
        }
    }

    /// Recompute both hands from this frame's snapshots.  Untracked hands
    /// get no classification.
    pub fn update(&mut self, hands: &HandTrackingState) {
        for hand in Hand::BOTH {
            let gestures = hands
                .snapshot(hand)
                .tracked()
                .map(|tracked| classify_hand(tracked, &self.config));

            let slot = match hand {
                Hand::Left => &mut self.left,
                Hand::Right => &mut self.right,
            };
            if let (Some(old), Some(new)) = (slot.as_ref(), gestures.as_ref()) {
                let old_facing = old.palm.map(|p| p.facing);
                let new_facing = new.palm.map(|p| p.facing);
                if old_facing != new_facing {
                    debug!("Palm facing changed on {:?}: {:?} -> {:?}", hand, old_facing, new_facing);
                }
            }
            *slot = gestures;
        }
    }

    pub fn hand(&self, hand: Hand) -> Option<&HandGestures> {
        match hand {
            Hand::Left => self.left.as_ref(),
            Hand::Right => self.right.as_ref(),
        }
    }

    pub fn reset(&mut self) {
        self.left = None;
        self.right = None;
    }

    pub fn status_sexp(&self) -> String {
        let render = |g: Option<&HandGestures>| g.map(|g| g.to_sexp()).unwrap_or_else(|| "nil".to_string());
        format!(
            "(:left {} :right {})",
            render(self.left.as_ref()),
            render(self.right.as_ref()),
        )
    }

    pub fn config_sexp(&self) -> String {
        let c = &self.config;
        format!(
            "(:curl-thumb-m {:.3} :curl-index-m {:.3} :curl-middle-m {:.3} :curl-ring-m {:.3} :curl-pinky-m {:.3} :palm-facing-threshold {:.2} :flip-right-palm {})",
            c.curl_threshold_m[0],
            c.curl_threshold_m[1],
            c.curl_threshold_m[2],
            c.curl_threshold_m[3],
            c.curl_threshold_m[4],
            c.palm_facing_threshold,
            if c.flip_right_palm { "t" } else { "nil" },
        )
    }
}

// ── Test helpers ───────────────────────────────────────────

#[cfg(test)]
fn tracked(hand: Hand, pose: super::sim::SimHandPose) -> TrackedHand {
    use super::provider::{Handedness, ReferenceSpace, ReferenceSpaceType};
    use super::sim::SimFrame;

    let space = ReferenceSpace {
        id: 1,
        kind: ReferenceSpaceType::Local,
    };
    let mut frame = SimFrame::new(space);
    let source = frame.add_hand(1, Handedness::from(hand), &pose);
    super::hand_tracking::process_hand(&frame, &source, space).expect("sim hand is complete")
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xr::provider::Pose;
    use crate::xr::sim::SimHandPose;
    use nalgebra::{Point3, UnitQuaternion};
    use std::f32::consts::{FRAC_PI_2, PI};

    fn rolled(hand: Hand, angle: f32) -> SimHandPose {
        let orientation = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), angle);
        SimHandPose::open(hand, Pose::new(Point3::new(0.0, 1.2, -0.3), orientation))
    }

    #[test]
    fn test_thumb_curl_threshold() {
        let config = GestureConfig::default();
        let thumb = config.curl_threshold(Finger::Thumb);
        assert_eq!(thumb, 0.085);
        assert!(!classify_curl(0.09, thumb));
        assert!(classify_curl(0.08, thumb));
    }

    #[test]
    fn test_curl_is_strict() {
        assert!(!classify_curl(0.055, 0.055));
        assert!(classify_curl(0.0549, 0.055));
    }

    #[test]
    fn test_palm_classification() {
        assert_eq!(classify_palm(0.6, 0.5), PalmFacing::Up);
        assert_eq!(classify_palm(-0.6, 0.5), PalmFacing::Down);
        assert_eq!(classify_palm(0.1, 0.5), PalmFacing::Side);
        assert_eq!(classify_palm(0.5, 0.5), PalmFacing::Side);
    }

    #[test]
    fn test_open_hand_has_no_curls() {
        let hand = tracked(Hand::Left, rolled(Hand::Left, 0.0));
        let g = classify_hand(&hand, &GestureConfig::default());
        assert_eq!(g.curled_count(), 0);
        for curl in &g.curls {
            assert!(curl.extension_m > 0.09, "{:?}", curl);
        }
    }

    #[test]
    fn test_curled_fingers_detected() {
        let pose = rolled(Hand::Right, 0.0).with_curled([true, false, true, true, true]);
        let g = classify_hand(&tracked(Hand::Right, pose), &GestureConfig::default());
        assert!(g.curl(Finger::Thumb).curled);
        assert!(!g.curl(Finger::Index).curled);
        assert!(g.curl(Finger::Middle).curled);
        assert!(g.curl(Finger::Ring).curled);
        assert!(g.curl(Finger::Pinky).curled);
    }

    #[test]
    fn test_thresholds_are_configurable() {
        let mut config = GestureConfig::default();
        config.curl_threshold_m = [0.2; 5];
        let g = classify_hand(&tracked(Hand::Left, rolled(Hand::Left, 0.0)), &config);
        assert_eq!(g.curled_count(), 5);
    }

    #[test]
    fn test_palm_down_both_hands() {
        let config = GestureConfig::default();
        for hand in Hand::BOTH {
            let g = classify_hand(&tracked(hand, rolled(hand, 0.0)), &config);
            let palm = g.palm.expect("palm");
            assert_eq!(palm.facing, PalmFacing::Down, "{:?}", hand);
            assert!((palm.normal - Vector3::new(0.0, -1.0, 0.0)).norm() < 1e-4);
        }
    }

    #[test]
    fn test_palm_up_and_side() {
        let config = GestureConfig::default();
        let up = classify_hand(&tracked(Hand::Left, rolled(Hand::Left, PI)), &config);
        assert_eq!(up.palm.map(|p| p.facing), Some(PalmFacing::Up));

        let side = classify_hand(&tracked(Hand::Right, rolled(Hand::Right, FRAC_PI_2)), &config);
        assert_eq!(side.palm.map(|p| p.facing), Some(PalmFacing::Side));
    }

    #[test]
    fn test_right_palm_flip_disabled() {
        let config = GestureConfig {
            flip_right_palm: false,
            ..GestureConfig::default()
        };
        let g = classify_hand(&tracked(Hand::Right, rolled(Hand::Right, 0.0)), &config);
        assert_eq!(g.palm.map(|p| p.facing), Some(PalmFacing::Up));
    }

    #[test]
    fn test_untracked_hand_has_no_classification() {
        let mut state = GestureState::default();
        state.update(&HandTrackingState::new());
        assert!(state.hand(Hand::Left).is_none());
        assert!(state.hand(Hand::Right).is_none());
        assert_eq!(state.status_sexp(), "(:left nil :right nil)");
    }

    #[test]
    fn test_to_sexp() {
        let g = classify_hand(&tracked(Hand::Left, rolled(Hand::Left, 0.0)), &GestureConfig::default());
        let sexp = g.to_sexp();
        assert!(sexp.contains("(:finger :thumb"));
        assert!(sexp.contains(":curled nil"));
        assert!(sexp.contains(":palm :down"));
    }

    #[test]
    fn test_config_sexp() {
        let state = GestureState::default();
        let sexp = state.config_sexp();
        assert!(sexp.contains(":curl-thumb-m 0.085"));
        assert!(sexp.contains(":curl-pinky-m 0.050"));
        assert!(sexp.contains(":flip-right-palm t"));
    }
}
