//! Articulated hand tracking: canonical joint set, per-frame hand
//! snapshots, and the batched pose processor that builds them.
//!
//! Models the 25 joints of the WebXR/OpenXR hand skeleton (no palm joint).
//! A snapshot is either complete or untracked: every frame both batch
//! queries (radii, poses) must succeed for all 25 joints, otherwise the
//! hand is untracked for that frame.  Nothing is carried over between
//! frames.

use nalgebra::{Point3, UnitQuaternion};
use thiserror::Error;
use tracing::debug;

use super::provider::{
    JointSpace, Pose, ReferenceSpace, SpatialInputSource, TrackingError, TrackingFrame,
};

// ── Joint definitions ──────────────────────────────────────

/// The 25 canonical hand joints, in batch-query order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandJoint {
    Wrist,
    ThumbMetacarpal,
    ThumbProximal,
    ThumbDistal,
    ThumbTip,
    IndexFingerMetacarpal,
    IndexFingerProximal,
    IndexFingerIntermediate,
    IndexFingerDistal,
    IndexFingerTip,
    MiddleFingerMetacarpal,
    MiddleFingerProximal,
    MiddleFingerIntermediate,
    MiddleFingerDistal,
    MiddleFingerTip,
    RingFingerMetacarpal,
    RingFingerProximal,
    RingFingerIntermediate,
    RingFingerDistal,
    RingFingerTip,
    PinkyFingerMetacarpal,
    PinkyFingerProximal,
    PinkyFingerIntermediate,
    PinkyFingerDistal,
    PinkyFingerTip,
}

/// Total number of joints per hand.
pub const JOINT_COUNT: usize = 25;

/// Canonical joint names, index-aligned with `HandJoint::ALL`.
const JOINT_NAMES: [&str; JOINT_COUNT] = [
    "wrist",
    "thumb-metacarpal", "thumb-phalanx-proximal", "thumb-phalanx-distal", "thumb-tip",
    "index-finger-metacarpal", "index-finger-phalanx-proximal",
    "index-finger-phalanx-intermediate", "index-finger-phalanx-distal", "index-finger-tip",
    "middle-finger-metacarpal", "middle-finger-phalanx-proximal",
    "middle-finger-phalanx-intermediate", "middle-finger-phalanx-distal", "middle-finger-tip",
    "ring-finger-metacarpal", "ring-finger-phalanx-proximal",
    "ring-finger-phalanx-intermediate", "ring-finger-phalanx-distal", "ring-finger-tip",
    "pinky-finger-metacarpal", "pinky-finger-phalanx-proximal",
    "pinky-finger-phalanx-intermediate", "pinky-finger-phalanx-distal", "pinky-finger-tip",
];

impl HandJoint {
    /// Every joint in canonical order.
    pub const ALL: [HandJoint; JOINT_COUNT] = [
        Self::Wrist,
        Self::ThumbMetacarpal,
        Self::ThumbProximal,
        Self::ThumbDistal,
        Self::ThumbTip,
        Self::IndexFingerMetacarpal,
        Self::IndexFingerProximal,
        Self::IndexFingerIntermediate,
        Self::IndexFingerDistal,
        Self::IndexFingerTip,
        Self::MiddleFingerMetacarpal,
        Self::MiddleFingerProximal,
        Self::MiddleFingerIntermediate,
        Self::MiddleFingerDistal,
        Self::MiddleFingerTip,
        Self::RingFingerMetacarpal,
        Self::RingFingerProximal,
        Self::RingFingerIntermediate,
        Self::RingFingerDistal,
        Self::RingFingerTip,
        Self::PinkyFingerMetacarpal,
        Self::PinkyFingerProximal,
        Self::PinkyFingerIntermediate,
        Self::PinkyFingerDistal,
        Self::PinkyFingerTip,
    ];

    /// Convert joint enum to array index (0-24).
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Canonical joint name.
    pub fn as_str(&self) -> &'static str {
        JOINT_NAMES[self.index()]
    }

    /// Parse a canonical joint name.
    pub fn from_name(name: &str) -> Option<Self> {
        JOINT_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| Self::ALL[i])
    }

    /// Fingertip joints, thumb first.
    pub fn fingertip_joints() -> [HandJoint; 5] {
        [
            Self::ThumbTip,
            Self::IndexFingerTip,
            Self::MiddleFingerTip,
            Self::RingFingerTip,
            Self::PinkyFingerTip,
        ]
    }
}

// ── Hand enum ──────────────────────────────────────────────

/// Which hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hand {
    Left,
    Right,
}

impl Hand {
    pub const BOTH: [Hand; 2] = [Hand::Left, Hand::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            _ => None,
        }
    }
}

// ── Joint sample ───────────────────────────────────────────

/// Pose data for a single joint in one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointSample {
    pub joint: HandJoint,
    /// Position in meters, in the frame's reference space.
    pub position: Point3<f32>,
    pub orientation: UnitQuaternion<f32>,
    /// Contact radius in meters.
    pub radius: f32,
}

impl JointSample {
    pub fn pose(&self) -> Pose {
        Pose::new(self.position, self.orientation)
    }

    /// Finite pose and non-negative finite radius.
    pub fn is_valid(&self) -> bool {
        self.pose().is_finite() && self.radius.is_finite() && self.radius >= 0.0
    }

    /// S-expression used by joint visualization clients.
    pub fn to_sexp(&self) -> String {
        let q = self.orientation.coords;
        format!(
            "(:name \"{}\" :position (:x {:.4} :y {:.4} :z {:.4}) :orientation (:x {:.4} :y {:.4} :z {:.4} :w {:.4}) :radius {:.4})",
            self.joint.as_str(),
            self.position.x, self.position.y, self.position.z,
            q.x, q.y, q.z, q.w,
            self.radius,
        )
    }
}

// ── Hand snapshot ──────────────────────────────────────────

/// A fully populated hand: all 25 joints from the current frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedHand {
    pub hand: Hand,
    joints: [JointSample; JOINT_COUNT],
}

impl TrackedHand {
    /// Build from samples in canonical order.  Returns `None` if the
    /// samples are out of order or any sample is invalid.
    pub fn from_samples(hand: Hand, joints: [JointSample; JOINT_COUNT]) -> Option<Self> {
        let ordered = joints
            .iter()
            .zip(HandJoint::ALL)
            .all(|(s, j)| s.joint == j && s.is_valid());
        ordered.then_some(Self { hand, joints })
    }

    pub fn joint(&self, joint: HandJoint) -> &JointSample {
        &self.joints[joint.index()]
    }

    pub fn position(&self, joint: HandJoint) -> Point3<f32> {
        self.joints[joint.index()].position
    }

    pub fn joints(&self) -> &[JointSample; JOINT_COUNT] {
        &self.joints
    }

    /// Euclidean distance between two joints (meters).
    pub fn joint_distance(&self, a: HandJoint, b: HandJoint) -> f32 {
        nalgebra::distance(&self.position(a), &self.position(b))
    }

    /// Look up a joint by canonical name.
    pub fn joint_by_name(&self, name: &str) -> Option<&JointSample> {
        HandJoint::from_name(name).map(|j| self.joint(j))
    }

    /// S-expression listing every joint, for joint visualization.
    pub fn skeleton_sexp(&self) -> String {
        let mut s = format!("(:hand :{} :joint-count {} :joints (", self.hand.as_str(), JOINT_COUNT);
        for (i, sample) in self.joints.iter().enumerate() {
            if i > 0 {
                s.push(' ');
            }
            s.push_str(&sample.to_sexp());
        }
        s.push_str("))");
        s
    }
}

/// One hand's state for one frame: complete or untracked, never partial.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum HandSnapshot {
    #[default]
    Untracked,
    Tracked(TrackedHand),
}

impl HandSnapshot {
    pub fn is_tracked(&self) -> bool {
        matches!(self, Self::Tracked(_))
    }

    pub fn tracked(&self) -> Option<&TrackedHand> {
        match self {
            Self::Tracked(hand) => Some(hand),
            Self::Untracked => None,
        }
    }
}

// ── Batch processing ───────────────────────────────────────

/// Why a hand could not be snapshotted this frame.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SnapshotError {
    #[error("source has no handedness")]
    NoHandedness,
    #[error("source has no joint collection")]
    NoJoints,
    #[error("joint {} not exposed by the runtime", .0.as_str())]
    MissingJoint(HandJoint),
    #[error("batch query failed: {0}")]
    Query(#[from] TrackingError),
    #[error("joint {} has an invalid pose", .0.as_str())]
    InvalidPose(HandJoint),
    #[error("joint {} has an invalid radius", .0.as_str())]
    InvalidRadius(HandJoint),
}

/// Query and decompose all joints of a tracked-hand source.
///
/// Issues exactly one radius batch and one pose batch over the canonical
/// joint list.  Results are read back by canonical index.
pub fn process_hand<F: TrackingFrame + ?Sized>(
    frame: &F,
    source: &SpatialInputSource,
    space: ReferenceSpace,
) -> Result<TrackedHand, SnapshotError> {
    let hand = source.handedness.hand().ok_or(SnapshotError::NoHandedness)?;
    let table = source.hand.as_ref().ok_or(SnapshotError::NoJoints)?;
    let spaces: [JointSpace; JOINT_COUNT] =
        table.resolve_all().map_err(SnapshotError::MissingJoint)?;

    let mut radii = [0.0f32; JOINT_COUNT];
    frame.fill_joint_radii(&spaces, space, &mut radii)?;

    let mut transforms = [nalgebra::Matrix4::identity(); JOINT_COUNT];
    frame.fill_joint_transforms(&spaces, space, &mut transforms)?;

    let mut samples = [JointSample {
        joint: HandJoint::Wrist,
        position: Point3::origin(),
        orientation: UnitQuaternion::identity(),
        radius: 0.0,
    }; JOINT_COUNT];

    for (i, joint) in HandJoint::ALL.into_iter().enumerate() {
        let pose = Pose::from_matrix(&transforms[i]).ok_or(SnapshotError::InvalidPose(joint))?;
        let radius = radii[i];
        if !radius.is_finite() || radius < 0.0 {
            return Err(SnapshotError::InvalidRadius(joint));
        }
        samples[i] = JointSample {
            joint,
            position: pose.position,
            orientation: pose.orientation,
            radius,
        };
    }

    TrackedHand::from_samples(hand, samples).ok_or(SnapshotError::InvalidPose(HandJoint::Wrist))
}

/// Snapshot a hand, collapsing every failure to `Untracked`.
pub fn snapshot_hand<F: TrackingFrame + ?Sized>(
    frame: &F,
    source: &SpatialInputSource,
    space: ReferenceSpace,
) -> HandSnapshot {
    match process_hand(frame, source, space) {
        Ok(hand) => HandSnapshot::Tracked(hand),
        Err(e) => {
            debug!(source = source.id, "hand untracked this frame: {}", e);
            HandSnapshot::Untracked
        }
    }
}

// ── State ──────────────────────────────────────────────────

/// Both hands' snapshots for the current frame.
#[derive(Debug, Default)]
pub struct HandTrackingState {
    pub left: HandSnapshot,
    pub right: HandSnapshot,
    /// Whether any hand is tracked this frame.
    pub active: bool,
}

impl HandTrackingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, hand: Hand) -> &HandSnapshot {
        match hand {
            Hand::Left => &self.left,
            Hand::Right => &self.right,
        }
    }

    fn snapshot_mut(&mut self, hand: Hand) -> &mut HandSnapshot {
        match hand {
            Hand::Left => &mut self.left,
            Hand::Right => &mut self.right,
        }
    }

    /// Rebuild one hand's snapshot from scratch.  `source` and `space`
    /// absent mean the hand is untracked this frame.
    pub fn refresh<F: TrackingFrame + ?Sized>(
        &mut self,
        hand: Hand,
        frame: &F,
        source: Option<&SpatialInputSource>,
        space: Option<ReferenceSpace>,
    ) {
        let snapshot = match (source, space) {
            (Some(source), Some(space)) => snapshot_hand(frame, source, space),
            _ => HandSnapshot::Untracked,
        };
        *self.snapshot_mut(hand) = snapshot;
        self.active = self.left.is_tracked() || self.right.is_tracked();
    }

    pub fn is_tracking(&self, hand: Hand) -> bool {
        self.snapshot(hand).is_tracked()
    }

    /// Single joint by hand and joint name strings.
    pub fn get_joint(&self, hand_str: &str, joint_name: &str) -> Option<JointSample> {
        let hand = Hand::from_name(hand_str)?;
        self.snapshot(hand).tracked()?.joint_by_name(joint_name).copied()
    }

    pub fn reset(&mut self) {
        self.left = HandSnapshot::Untracked;
        self.right = HandSnapshot::Untracked;
        self.active = false;
    }

    pub fn status_sexp(&self) -> String {
        format!(
            "(:active {} :left (:tracking {}) :right (:tracking {}))",
            if self.active { "t" } else { "nil" },
            if self.left.is_tracked() { "t" } else { "nil" },
            if self.right.is_tracked() { "t" } else { "nil" },
        )
    }
}

// ── Tests ──────────────────────────────────────────────────
