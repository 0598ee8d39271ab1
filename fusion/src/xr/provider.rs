//! Tracking provider contract: what the host's spatial tracking runtime
//! hands the fusion layer every frame.
//!
//! Models input sources (tracked hands, controllers, transient pointers),
//! opaque joint handles, reference spaces, and the `TrackingFrame` query
//! trait.  Nothing here owns runtime objects: the host rebuilds its source
//! list each frame and the fusion layer only reads it.

use std::collections::HashMap;

use nalgebra::{Isometry3, Matrix3, Matrix4, Point3, Rotation3, Translation3, UnitQuaternion, Vector3};
use thiserror::Error;

use super::hand_tracking::{Hand, HandJoint, JOINT_COUNT};

/// Identity of an input source, stable for as long as the runtime keeps
/// the physical device attached.
pub type SourceId = u32;

// ── Handedness ─────────────────────────────────────────────

/// Handedness reported by the runtime for an input source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Handedness {
    #[default]
    None,
    Left,
    Right,
}

impl Handedness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Left => "left",
            Self::Right => "right",
        }
    }

    /// Single-letter tag used by the HUD (`L`, `R`, `N`).
    pub fn tag(&self) -> char {
        match self {
            Self::None => 'N',
            Self::Left => 'L',
            Self::Right => 'R',
        }
    }

    /// The hand this handedness designates, if any.
    pub fn hand(&self) -> Option<Hand> {
        match self {
            Self::None => None,
            Self::Left => Some(Hand::Left),
            Self::Right => Some(Hand::Right),
        }
    }
}

impl From<Hand> for Handedness {
    fn from(hand: Hand) -> Self {
        match hand {
            Hand::Left => Self::Left,
            Hand::Right => Self::Right,
        }
    }
}

// ── Source description ─────────────────────────────────────

/// How the runtime derives a source's target ray.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetRayMode {
    Gaze,
    TrackedPointer,
    Screen,
    TransientPointer,
}

impl TargetRayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gaze => "gaze",
            Self::TrackedPointer => "tracked-pointer",
            Self::Screen => "screen",
            Self::TransientPointer => "transient-pointer",
        }
    }
}

/// Logical kind of a source, derived from what it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    TrackedHand,
    Controller,
    TransientPointer,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TrackedHand => "hand",
            Self::Controller => "ctrl",
            Self::TransientPointer => "transient-pointer",
        }
    }
}

/// One button of a controller gamepad.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GamepadButton {
    pub pressed: bool,
    pub value: f32,
}

/// Button and axis state of a controller.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Gamepad {
    pub buttons: Vec<GamepadButton>,
    pub axes: Vec<f32>,
}

impl Gamepad {
    /// Whether the button at `index` exists and is pressed.
    pub fn is_pressed(&self, index: usize) -> bool {
        self.buttons.get(index).map(|b| b.pressed).unwrap_or(false)
    }
}

// ── Joint handles ──────────────────────────────────────────

/// Opaque runtime handle for one joint of one tracked hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JointSpace(pub u64);

/// Named joint collection of a tracked-hand source, as delivered by the
/// runtime.  May be incomplete on some runtimes or frames.
#[derive(Debug, Clone, Default)]
pub struct JointTable {
    spaces: HashMap<String, JointSpace>,
}

impl JointTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, space: JointSpace) {
        self.spaces.insert(name.into(), space);
    }

    pub fn remove(&mut self, name: &str) -> Option<JointSpace> {
        self.spaces.remove(name)
    }

    pub fn len(&self) -> usize {
        self.spaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty()
    }

    /// Resolve the handle of a canonical joint by its canonical name.
    pub fn resolve(&self, joint: HandJoint) -> Option<JointSpace> {
        self.spaces.get(joint.as_str()).copied()
    }

    /// Resolve every canonical joint in canonical order.
    ///
    /// Returns the first missing joint on failure.
    pub fn resolve_all(&self) -> Result<[JointSpace; JOINT_COUNT], HandJoint> {
        let mut out = [JointSpace(0); JOINT_COUNT];
        for (slot, joint) in out.iter_mut().zip(HandJoint::ALL) {
            *slot = self.resolve(joint).ok_or(joint)?;
        }
        Ok(out)
    }
}

// ── Input source ───────────────────────────────────────────

/// A spatial input source as seen in one frame.
#[derive(Debug, Clone)]
pub struct SpatialInputSource {
    pub id: SourceId,
    pub handedness: Handedness,
    pub target_ray_mode: TargetRayMode,
    /// Present only for articulated hand sources.
    pub hand: Option<JointTable>,
    /// Present only for sources with buttons/axes.
    pub gamepad: Option<Gamepad>,
}

impl SpatialInputSource {
    /// A tracked hand source with a joint collection.
    pub fn tracked_hand(id: SourceId, handedness: Handedness, joints: JointTable) -> Self {
        Self {
            id,
            handedness,
            target_ray_mode: TargetRayMode::TrackedPointer,
            hand: Some(joints),
            gamepad: None,
        }
    }

    /// A motion controller.
    pub fn controller(id: SourceId, handedness: Handedness, gamepad: Gamepad) -> Self {
        Self {
            id,
            handedness,
            target_ray_mode: TargetRayMode::TrackedPointer,
            hand: None,
            gamepad: Some(gamepad),
        }
    }

    /// A transient pointer (gaze-and-pinch style), alive only while selecting.
    pub fn transient_pointer(id: SourceId, handedness: Handedness) -> Self {
        Self {
            id,
            handedness,
            target_ray_mode: TargetRayMode::TransientPointer,
            hand: None,
            gamepad: None,
        }
    }

    pub fn kind(&self) -> SourceKind {
        if self.hand.is_some() {
            SourceKind::TrackedHand
        } else if self.target_ray_mode == TargetRayMode::TransientPointer {
            SourceKind::TransientPointer
        } else {
            SourceKind::Controller
        }
    }

    pub fn is_hand(&self) -> bool {
        self.hand.is_some()
    }
}

/// Find a source by id in a frame's source list.
pub fn find_source(sources: &[SpatialInputSource], id: SourceId) -> Option<&SpatialInputSource> {
    sources.iter().find(|s| s.id == id)
}

// ── Reference spaces ───────────────────────────────────────

/// Reference space type selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceSpaceType {
    Local,
    LocalFloor,
    Stage,
    View,
}

impl ReferenceSpaceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::LocalFloor => "local-floor",
            Self::Stage => "stage",
            Self::View => "view",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "local" => Some(Self::Local),
            "local-floor" => Some(Self::LocalFloor),
            "stage" => Some(Self::Stage),
            "view" => Some(Self::View),
            _ => None,
        }
    }
}

/// Handle to an acquired reference space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceSpace {
    pub id: u32,
    pub kind: ReferenceSpaceType,
}

// ── Poses ──────────────────────────────────────────────────

/// Rigid pose: position in meters plus orientation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Point3<f32>,
    pub orientation: UnitQuaternion<f32>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    pub fn new(position: Point3<f32>, orientation: UnitQuaternion<f32>) -> Self {
        Self {
            position,
            orientation,
        }
    }

    pub fn identity() -> Self {
        Self::new(Point3::origin(), UnitQuaternion::identity())
    }

    pub fn from_isometry(iso: &Isometry3<f32>) -> Self {
        Self::new(Point3::from(iso.translation.vector), iso.rotation)
    }

    pub fn to_isometry(&self) -> Isometry3<f32> {
        Isometry3::from_parts(Translation3::from(self.position.coords), self.orientation)
    }

    /// Pointing direction; target rays point down local -Z.
    pub fn forward(&self) -> Vector3<f32> {
        self.orientation * Vector3::new(0.0, 0.0, -1.0)
    }

    pub fn is_finite(&self) -> bool {
        self.position.coords.iter().all(|c| c.is_finite())
            && self.orientation.coords.iter().all(|c| c.is_finite())
    }

    /// Decompose a 4×4 affine transform into position and orientation.
    ///
    /// Scale is discarded.  Returns `None` for non-finite input or a
    /// degenerate basis.
    pub fn from_matrix(m: &Matrix4<f32>) -> Option<Self> {
        if !m.iter().all(|v| v.is_finite()) {
            return None;
        }
        let position = Point3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)]);
        let x = Vector3::new(m[(0, 0)], m[(1, 0)], m[(2, 0)]);
        let y = Vector3::new(m[(0, 1)], m[(1, 1)], m[(2, 1)]);
        let z = Vector3::new(m[(0, 2)], m[(1, 2)], m[(2, 2)]);
        let (sx, sy, sz) = (x.norm(), y.norm(), z.norm());
        if sx <= f32::EPSILON || sy <= f32::EPSILON || sz <= f32::EPSILON {
            return None;
        }
        let basis = Matrix3::from_columns(&[x / sx, y / sy, z / sz]);
        let rotation = Rotation3::from_matrix_unchecked(basis);
        let pose = Self::new(position, UnitQuaternion::from_rotation_matrix(&rotation));
        pose.is_finite().then_some(pose)
    }
}

/// Pose and contact radius of one joint, from an individual query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointPose {
    pub pose: Pose,
    pub radius: f32,
}

/// Non-joint spaces a source exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoseSpace {
    TargetRay(SourceId),
    Grip(SourceId),
}

// ── Errors ─────────────────────────────────────────────────

/// Failures reported by the tracking provider.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackingError {
    #[error("joint radius query failed ({count} joints)")]
    RadiiUnavailable { count: usize },
    #[error("joint pose query failed ({count} joints)")]
    PosesUnavailable { count: usize },
    #[error("batch size mismatch: {joints} joints, {slots} output slots")]
    BatchSize { joints: usize, slots: usize },
    #[error("reference space {} unavailable: {reason}", .space.as_str())]
    ReferenceSpaceUnavailable {
        space: ReferenceSpaceType,
        reason: String,
    },
}

// ── Frame queries ──────────────────────────────────────────

/// Per-frame query surface of the tracking runtime.
///
/// Batch queries fill output slices index-aligned with `joints`; they
/// either fill every slot or fail as a whole.
pub trait TrackingFrame {
    fn fill_joint_radii(
        &self,
        joints: &[JointSpace],
        space: ReferenceSpace,
        radii: &mut [f32],
    ) -> Result<(), TrackingError>;

    fn fill_joint_transforms(
        &self,
        joints: &[JointSpace],
        space: ReferenceSpace,
        transforms: &mut [Matrix4<f32>],
    ) -> Result<(), TrackingError>;

    /// Individual joint query.
    fn joint_pose(&self, joint: JointSpace, space: ReferenceSpace) -> Option<JointPose>;

    /// Target-ray or grip pose of a source.
    fn pose(&self, pose_space: PoseSpace, space: ReferenceSpace) -> Option<Pose>;
}
