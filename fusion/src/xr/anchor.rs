//! Anchor resolution for the hand-mounted control.
//!
//! Preference order, evaluated fresh every frame with no hysteresis:
//! the anchoring hand's wrist joint, then the grip of a controller with the
//! same handedness, then hidden.

use tracing::debug;

use super::hand_tracking::{Hand, HandJoint, HandSnapshot};
use super::input_sources::LogicalInputSet;
use super::provider::{
    find_source, Handedness, Pose, PoseSpace, ReferenceSpace, SourceId, SpatialInputSource,
    TrackingFrame,
};

/// Which hand carries the control.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorConfig {
    pub hand: Hand,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self { hand: Hand::Left }
    }
}

/// Where this frame's anchor pose came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorSource {
    Wrist(Hand),
    ControllerGrip(SourceId),
}

impl AnchorSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wrist(_) => "wrist",
            Self::ControllerGrip(_) => "grip",
        }
    }
}

/// Result of one frame's resolution.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum AnchorResolution {
    Visible { source: AnchorSource, pose: Pose },
    #[default]
    Hidden,
}

impl AnchorResolution {
    pub fn is_visible(&self) -> bool {
        matches!(self, Self::Visible { .. })
    }

    pub fn pose(&self) -> Option<Pose> {
        match self {
            Self::Visible { pose, .. } => Some(*pose),
            Self::Hidden => None,
        }
    }

    pub fn source(&self) -> Option<AnchorSource> {
        match self {
            Self::Visible { source, .. } => Some(*source),
            Self::Hidden => None,
        }
    }

    pub fn to_sexp(&self) -> String {
        match self {
            Self::Visible { source, pose } => format!(
                "(:visible t :source :{} :position (:x {:.3} :y {:.3} :z {:.3}))",
                source.as_str(),
                pose.position.x,
                pose.position.y,
                pose.position.z,
            ),
            Self::Hidden => "(:visible nil)".to_string(),
        }
    }
}

/// Grip pose of the first controller with `hand`'s handedness.
fn controller_grip<F: TrackingFrame + ?Sized>(
    hand: Hand,
    logical: &LogicalInputSet,
    sources: &[SpatialInputSource],
    frame: &F,
    space: ReferenceSpace,
) -> Option<(SourceId, Pose)> {
    let handedness = Handedness::from(hand);
    logical
        .controllers
        .iter()
        .filter_map(|id| find_source(sources, *id))
        .find(|s| s.handedness == handedness)
        .and_then(|s| {
            frame
                .pose(PoseSpace::Grip(s.id), space)
                .filter(Pose::is_finite)
                .map(|pose| (s.id, pose))
        })
}

/// Stateless resolver; keeps the last result only to log switches.
#[derive(Debug, Default)]
pub struct AnchorTracker {
    pub config: AnchorConfig,
    last: AnchorResolution,
}

impl AnchorTracker {
    pub fn new(config: AnchorConfig) -> Self {
        Self {
            config,
            last: AnchorResolution::Hidden,
        }
    }

    /// Resolve this frame's anchor.  `space` absent means hidden.
    pub fn resolve<F: TrackingFrame + ?Sized>(
        &mut self,
        snapshot: &HandSnapshot,
        logical: &LogicalInputSet,
        sources: &[SpatialInputSource],
        frame: &F,
        space: Option<ReferenceSpace>,
    ) -> AnchorResolution {
        let hand = self.config.hand;
        let resolution = match (snapshot.tracked(), space) {
            (_, None) => AnchorResolution::Hidden,
            (Some(tracked), Some(_)) => AnchorResolution::Visible {
                source: AnchorSource::Wrist(hand),
                pose: tracked.joint(HandJoint::Wrist).pose(),
            },
            (None, Some(space)) => match controller_grip(hand, logical, sources, frame, space) {
                Some((id, pose)) => AnchorResolution::Visible {
                    source: AnchorSource::ControllerGrip(id),
                    pose,
                },
                None => AnchorResolution::Hidden,
            },
        };

        if resolution.source() != self.last.source() {
            debug!(
                "Anchor source changed: {:?} -> {:?}",
                self.last.source(),
                resolution.source()
            );
        }
        self.last = resolution;
        resolution
    }

    pub fn last(&self) -> &AnchorResolution {
        &self.last
    }

    pub fn reset(&mut self) {
        self.last = AnchorResolution::Hidden;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xr::hand_tracking::snapshot_hand;
    use crate::xr::input_sources::{classify_sources, SelectLatch};
    use crate::xr::provider::{Gamepad, ReferenceSpaceType};
    use crate::xr::sim::{SimFrame, SimHandPose};
    use nalgebra::{Point3, UnitQuaternion};

    fn space() -> ReferenceSpace {
        ReferenceSpace {
            id: 1,
            kind: ReferenceSpaceType::LocalFloor,
        }
    }

    fn wrist_pose() -> Pose {
        Pose::new(Point3::new(-0.2, 1.1, -0.3), UnitQuaternion::identity())
    }

    fn grip_pose() -> Pose {
        Pose::new(Point3::new(-0.25, 1.0, -0.2), UnitQuaternion::identity())
    }

    struct Scene {
        frame: SimFrame,
        sources: Vec<SpatialInputSource>,
    }

    impl Scene {
        fn new(with_hand: bool, with_controller: bool) -> Self {
            let mut frame = SimFrame::new(space());
            let mut sources = Vec::new();
            if with_controller {
                sources.push(frame.add_controller(10, Handedness::Left, grip_pose(), Gamepad::default()));
            }
            if with_hand {
                sources.push(frame.add_hand(1, Handedness::Left, &SimHandPose::open(Hand::Left, wrist_pose())));
            }
            Self { frame, sources }
        }

        fn resolve(&self, tracker: &mut AnchorTracker) -> AnchorResolution {
            let logical = classify_sources(&self.sources, &SelectLatch::default());
            let snapshot = match logical.hand_source(Hand::Left).and_then(|id| find_source(&self.sources, id)) {
                Some(src) => snapshot_hand(&self.frame, src, space()),
                None => HandSnapshot::Untracked,
            };
            tracker.resolve(&snapshot, &logical, &self.sources, &self.frame, Some(space()))
        }
    }

    #[test]
    fn test_wrist_preferred() {
        let mut tracker = AnchorTracker::default();
        let r = Scene::new(true, true).resolve(&mut tracker);
        assert_eq!(r.source(), Some(AnchorSource::Wrist(Hand::Left)));
        let pose = r.pose().expect("visible");
        assert!((pose.position - wrist_pose().position).norm() < 1e-5);
    }

    #[test]
    fn test_controller_fallback() {
        let mut tracker = AnchorTracker::default();
        let r = Scene::new(false, true).resolve(&mut tracker);
        assert_eq!(r.source(), Some(AnchorSource::ControllerGrip(10)));
        assert_eq!(r.pose(), Some(grip_pose()));
    }

    #[test]
    fn test_hidden_without_sources() {
        let mut tracker = AnchorTracker::default();
        let r = Scene::new(false, false).resolve(&mut tracker);
        assert_eq!(r, AnchorResolution::Hidden);
        assert_eq!(r.to_sexp(), "(:visible nil)");
    }

    #[test]
    fn test_hidden_without_reference_space() {
        let scene = Scene::new(true, true);
        let logical = classify_sources(&scene.sources, &SelectLatch::default());
        let mut tracker = AnchorTracker::default();
        let r = tracker.resolve(&HandSnapshot::Untracked, &logical, &scene.sources, &scene.frame, None);
        assert!(!r.is_visible());
    }

    #[test]
    fn test_wrong_handedness_controller_ignored() {
        let mut frame = SimFrame::new(space());
        let sources = vec![frame.add_controller(11, Handedness::Right, grip_pose(), Gamepad::default())];
        let logical = classify_sources(&sources, &SelectLatch::default());
        let mut tracker = AnchorTracker::default();
        let r = tracker.resolve(&HandSnapshot::Untracked, &logical, &sources, &frame, Some(space()));
        assert!(!r.is_visible());
    }

    #[test]
    fn test_switches_every_frame_without_hysteresis() {
        let mut tracker = AnchorTracker::default();
        let both = Scene::new(true, true);
        let mut hand_lost = Scene::new(true, true);
        hand_lost.frame.fail_poses(1);

        let sequence = [&both, &hand_lost, &both, &hand_lost];
        let sources: Vec<_> = sequence
            .iter()
            .map(|scene| scene.resolve(&mut tracker).source())
            .collect();
        assert_eq!(
            sources,
            vec![
                Some(AnchorSource::Wrist(Hand::Left)),
                Some(AnchorSource::ControllerGrip(10)),
                Some(AnchorSource::Wrist(Hand::Left)),
                Some(AnchorSource::ControllerGrip(10)),
            ]
        );
    }

    #[test]
    fn test_reset() {
        let mut tracker = AnchorTracker::default();
        Scene::new(true, false).resolve(&mut tracker);
        assert!(tracker.last().is_visible());
        tracker.reset();
        assert!(!tracker.last().is_visible());
    }
}
