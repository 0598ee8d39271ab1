//! Synthetic tracking provider.
//!
//! `SimFrame` implements `TrackingFrame` over an in-memory table of joint
//! transforms and source poses, with switches to make individual batch
//! queries fail.  `SimHandPose` generates a plausible 25-joint hand from a
//! wrist pose and per-finger curl flags.  Used by the tests and by the
//! replay binary in place of a headset.

use std::collections::{HashMap, HashSet};

use nalgebra::{Matrix4, Point3, UnitQuaternion, Vector3};

use super::hand_tracking::{Hand, HandJoint, JOINT_COUNT};
use super::provider::{
    Gamepad, Handedness, JointPose, JointSpace, JointTable, Pose, PoseSpace, ReferenceSpace,
    SourceId, SpatialInputSource, TrackingError, TrackingFrame,
};

const JOINT_RADIUS_M: f32 = 0.008;
const TIP_RADIUS_M: f32 = 0.006;

/// Lateral offsets of index, middle, ring and pinky (left hand).
const FINGER_X: [f32; 4] = [0.02, 0.0, -0.02, -0.038];

/// Index tip position while pinching (left hand, wrist-local).
const PINCH_POINT: [f32; 3] = [0.035, -0.02, -0.11];

/// Handle for `joint` of the hand source `source`.
pub fn joint_space(source: SourceId, joint: HandJoint) -> JointSpace {
    JointSpace(((source as u64) << 8) | joint.index() as u64)
}

fn source_of(space: JointSpace) -> SourceId {
    (space.0 >> 8) as SourceId
}

// ── Hand geometry ──────────────────────────────────────────

/// Procedural hand: wrist pose plus curl and pinch flags.
///
/// Wrist-local frame for the left hand: palm facing -Y, fingers along -Z,
/// thumb toward +X.  The right hand mirrors X.
#[derive(Debug, Clone, PartialEq)]
pub struct SimHandPose {
    pub hand: Hand,
    pub wrist: Pose,
    /// Thumb, index, middle, ring, pinky.
    pub curled: [bool; 5],
    pub pinch: bool,
}

impl SimHandPose {
    pub fn open(hand: Hand, wrist: Pose) -> Self {
        Self {
            hand,
            wrist,
            curled: [false; 5],
            pinch: false,
        }
    }

    pub fn with_curled(mut self, curled: [bool; 5]) -> Self {
        self.curled = curled;
        self
    }

    pub fn pinching(mut self) -> Self {
        self.pinch = true;
        self
    }

    pub fn released(mut self) -> Self {
        self.pinch = false;
        self
    }

    /// A pinching hand, axis-aligned, whose index tip sits at `point`.
    pub fn pinching_at(hand: Hand, point: Point3<f32>) -> Self {
        let tip = Self::mirror(hand, Vector3::from(PINCH_POINT));
        let wrist = Pose::new(Point3::from(point.coords - tip), UnitQuaternion::identity());
        Self::open(hand, wrist).pinching()
    }

    fn mirror(hand: Hand, v: Vector3<f32>) -> Vector3<f32> {
        match hand {
            Hand::Left => v,
            Hand::Right => Vector3::new(-v.x, v.y, v.z),
        }
    }

    /// Wrist-local joint positions in canonical order.
    pub fn local_positions(&self) -> [Vector3<f32>; JOINT_COUNT] {
        let mut out = [Vector3::zeros(); JOINT_COUNT];

        let thumb: [[f32; 3]; 4] = if self.curled[0] {
            [[0.025, 0.0, -0.02], [0.04, -0.01, -0.04], [0.035, -0.025, -0.055], [0.025, -0.03, -0.06]]
        } else {
            [[0.025, 0.0, -0.02], [0.045, 0.0, -0.04], [0.065, 0.0, -0.065], [0.085, 0.0, -0.1]]
        };
        for (i, p) in thumb.iter().enumerate() {
            out[1 + i] = Vector3::from(*p);
        }

        for (f, x) in FINGER_X.iter().copied().enumerate() {
            let chain: [[f32; 3]; 5] = if self.curled[f + 1] {
                [[x, 0.0, -0.03], [x, 0.0, -0.09], [x, -0.03, -0.10], [x, -0.045, -0.08], [x, -0.035, -0.06]]
            } else {
                [[x, 0.0, -0.03], [x, 0.0, -0.09], [x, 0.0, -0.125], [x, 0.0, -0.15], [x, 0.0, -0.17]]
            };
            for (j, p) in chain.iter().enumerate() {
                out[5 + f * 5 + j] = Vector3::from(*p);
            }
        }

        if self.pinch {
            let tip = Vector3::from(PINCH_POINT);
            out[HandJoint::IndexFingerDistal.index()] = Vector3::new(0.03, -0.012, -0.125);
            out[HandJoint::IndexFingerTip.index()] = tip;
            out[HandJoint::ThumbDistal.index()] = Vector3::new(0.06, -0.012, -0.085);
            out[HandJoint::ThumbTip.index()] = tip + Vector3::new(0.006, 0.0, 0.0);
        }

        for p in out.iter_mut() {
            *p = Self::mirror(self.hand, *p);
        }
        out
    }

    /// World-space position of one joint.
    pub fn world_position(&self, joint: HandJoint) -> Point3<f32> {
        self.wrist.to_isometry() * Point3::from(self.local_positions()[joint.index()])
    }

    /// World transforms and radii in canonical order.
    pub fn joint_transforms(&self) -> [(Matrix4<f32>, f32); JOINT_COUNT] {
        let wrist = self.wrist.to_isometry();
        let local = self.local_positions();
        let mut out = [(Matrix4::identity(), 0.0); JOINT_COUNT];
        for (i, joint) in HandJoint::ALL.iter().enumerate() {
            let pose = Pose::new(wrist * Point3::from(local[i]), self.wrist.orientation);
            let radius = if HandJoint::fingertip_joints().contains(joint) {
                TIP_RADIUS_M
            } else {
                JOINT_RADIUS_M
            };
            out[i] = (pose.to_isometry().to_homogeneous(), radius);
        }
        out
    }

    /// Target ray: from the index tip along the wrist's forward axis.
    pub fn target_ray(&self) -> Pose {
        Pose::new(self.world_position(HandJoint::IndexFingerTip), self.wrist.orientation)
    }
}

// ── Frame ──────────────────────────────────────────────────

/// In-memory `TrackingFrame`.
#[derive(Debug, Clone)]
pub struct SimFrame {
    space: ReferenceSpace,
    joints: HashMap<JointSpace, (Matrix4<f32>, f32)>,
    poses: HashMap<PoseSpace, Pose>,
    failing_radii: HashSet<SourceId>,
    failing_poses: HashSet<SourceId>,
}

impl SimFrame {
    /// Empty frame whose poses are expressed in `space`.
    pub fn new(space: ReferenceSpace) -> Self {
        Self {
            space,
            joints: HashMap::new(),
            poses: HashMap::new(),
            failing_radii: HashSet::new(),
            failing_poses: HashSet::new(),
        }
    }

    pub fn space(&self) -> ReferenceSpace {
        self.space
    }

    /// Register a tracked hand and return its source description.  The
    /// target ray comes from `SimHandPose::target_ray`.
    pub fn add_hand(&mut self, id: SourceId, handedness: Handedness, pose: &SimHandPose) -> SpatialInputSource {
        let mut table = JointTable::new();
        for (joint, entry) in HandJoint::ALL.iter().zip(pose.joint_transforms()) {
            let space = joint_space(id, *joint);
            table.insert(joint.as_str(), space);
            self.joints.insert(space, entry);
        }
        self.poses.insert(PoseSpace::TargetRay(id), pose.target_ray());
        SpatialInputSource::tracked_hand(id, handedness, table)
    }

    /// Register a controller whose grip and target ray share `grip`.
    pub fn add_controller(
        &mut self,
        id: SourceId,
        handedness: Handedness,
        grip: Pose,
        gamepad: Gamepad,
    ) -> SpatialInputSource {
        self.poses.insert(PoseSpace::Grip(id), grip);
        self.poses.insert(PoseSpace::TargetRay(id), grip);
        SpatialInputSource::controller(id, handedness, gamepad)
    }

    pub fn add_transient_pointer(&mut self, id: SourceId, handedness: Handedness, ray: Pose) -> SpatialInputSource {
        self.poses.insert(PoseSpace::TargetRay(id), ray);
        SpatialInputSource::transient_pointer(id, handedness)
    }

    pub fn set_pose(&mut self, space: PoseSpace, pose: Pose) {
        self.poses.insert(space, pose);
    }

    pub fn remove_pose(&mut self, space: PoseSpace) {
        self.poses.remove(&space);
    }

    /// Make the radius batch fail for every joint of `source`.
    pub fn fail_radii(&mut self, source: SourceId) {
        self.failing_radii.insert(source);
    }

    /// Make the pose batch (and individual joint queries) fail for `source`.
    pub fn fail_poses(&mut self, source: SourceId) {
        self.failing_poses.insert(source);
    }

    /// Replace one joint's transform with NaNs.
    pub fn corrupt_joint(&mut self, source: SourceId, joint: HandJoint) {
        if let Some(entry) = self.joints.get_mut(&joint_space(source, joint)) {
            entry.0 = Matrix4::from_element(f32::NAN);
        }
    }

    pub fn set_radius(&mut self, source: SourceId, joint: HandJoint, radius: f32) {
        if let Some(entry) = self.joints.get_mut(&joint_space(source, joint)) {
            entry.1 = radius;
        }
    }

    fn check_space(&self, space: ReferenceSpace) -> Result<(), TrackingError> {
        if space == self.space {
            Ok(())
        } else {
            Err(TrackingError::ReferenceSpaceUnavailable {
                space: space.kind,
                reason: format!("frame is expressed in space {}", self.space.id),
            })
        }
    }

    fn check_batch(joints: &[JointSpace], slots: usize) -> Result<(), TrackingError> {
        if joints.len() == slots {
            Ok(())
        } else {
            Err(TrackingError::BatchSize {
                joints: joints.len(),
                slots,
            })
        }
    }
}

impl TrackingFrame for SimFrame {
    fn fill_joint_radii(
        &self,
        joints: &[JointSpace],
        space: ReferenceSpace,
        radii: &mut [f32],
    ) -> Result<(), TrackingError> {
        self.check_space(space)?;
        Self::check_batch(joints, radii.len())?;
        let unavailable = TrackingError::RadiiUnavailable { count: joints.len() };
        for (slot, joint) in radii.iter_mut().zip(joints) {
            if self.failing_radii.contains(&source_of(*joint)) {
                return Err(unavailable);
            }
            *slot = self.joints.get(joint).ok_or_else(|| unavailable.clone())?.1;
        }
        Ok(())
    }

    fn fill_joint_transforms(
        &self,
        joints: &[JointSpace],
        space: ReferenceSpace,
        transforms: &mut [Matrix4<f32>],
    ) -> Result<(), TrackingError> {
        self.check_space(space)?;
        Self::check_batch(joints, transforms.len())?;
        let unavailable = TrackingError::PosesUnavailable { count: joints.len() };
        for (slot, joint) in transforms.iter_mut().zip(joints) {
            if self.failing_poses.contains(&source_of(*joint)) {
                return Err(unavailable);
            }
            *slot = self.joints.get(joint).ok_or_else(|| unavailable.clone())?.0;
        }
        Ok(())
    }

    fn joint_pose(&self, joint: JointSpace, space: ReferenceSpace) -> Option<JointPose> {
        if space != self.space || self.failing_poses.contains(&source_of(joint)) {
            return None;
        }
        let (matrix, radius) = self.joints.get(&joint)?;
        Some(JointPose {
            pose: Pose::from_matrix(matrix)?,
            radius: *radius,
        })
    }

    fn pose(&self, pose_space: PoseSpace, space: ReferenceSpace) -> Option<Pose> {
        if space != self.space {
            return None;
        }
        self.poses.get(&pose_space).copied()
    }
}
