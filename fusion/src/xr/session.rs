//! Per-session fusion context.
//!
//! `FusionSession` owns every piece of state the fusion layer keeps and is
//! driven by the host: lifecycle and interaction events through
//! `handle_event`, and one `update` call per presented frame.  Each frame
//! captures the reference space once and runs the stages in order: input
//! classification, hand snapshots, gestures, anchor, drag gate.  Ending the
//! session resets everything except the slider value.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::FusionConfig;

use super::anchor::{AnchorResolution, AnchorTracker};
use super::frame_timing::{FrameTiming, Stage, StageTimes};
use super::gesture::{GestureState, HandGestures};
use super::hand_tracking::{Hand, HandSnapshot, HandTrackingState};
use super::hud::{self, HudText};
use super::input_sources::{InputState, InteractionEvent, LogicalInputSet};
use super::pinch::{detect_hand_pinch, PinchReading};
use super::provider::{
    find_source, PoseSpace, ReferenceSpace, ReferenceSpaceType, SpatialInputSource, TrackingError,
    TrackingFrame,
};
use super::slider::{DragGate, GateInputs, GateReport, LabelSink, SliderView};

// ── Config ─────────────────────────────────────────────────

/// Session-level settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Reference space requested at session start.
    pub reference_space: ReferenceSpaceType,
    /// Fusion budget per frame (ms); frames over it count as missed.
    pub frame_budget_ms: f64,
    /// Frames kept for timing percentiles.
    pub timing_window: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reference_space: ReferenceSpaceType::LocalFloor,
            frame_budget_ms: 1.0,
            timing_window: 1000,
        }
    }
}

// ── Lifecycle ──────────────────────────────────────────────

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Inactive,
    /// Started; reference space request outstanding.
    AwaitingReferenceSpace,
    Running,
    /// Reference space acquisition failed; frames are no-ops.
    NoTracking,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::AwaitingReferenceSpace => "awaiting-reference-space",
            Self::Running => "running",
            Self::NoTracking => "no-tracking",
        }
    }
}

/// Events the host forwards from the runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Started,
    /// Completion of the reference space request.
    ReferenceSpace(Result<ReferenceSpace, TrackingError>),
    Interaction(InteractionEvent),
    Ended,
}

/// Presentation collaborator: receives label text and every frame report.
pub trait Presenter: LabelSink {
    fn present(&mut self, report: &FrameReport);
}

/// Presenter that discards everything.
#[derive(Debug, Default)]
pub struct NullPresenter;

impl LabelSink for NullPresenter {
    fn refresh_label(&mut self, _text: &str) {}
}

impl Presenter for NullPresenter {
    fn present(&mut self, _report: &FrameReport) {}
}

// ── Frame report ───────────────────────────────────────────

/// One hand's outputs for a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct HandReport {
    pub hand: Hand,
    pub snapshot: HandSnapshot,
    /// Present only when the snapshot is tracked.
    pub gestures: Option<HandGestures>,
    pub pinch: Option<PinchReading>,
}

impl HandReport {
    fn to_sexp(&self) -> String {
        format!(
            "(:tracking {} :gestures {} :pinch {})",
            if self.snapshot.is_tracked() { "t" } else { "nil" },
            self.gestures.as_ref().map(|g| g.to_sexp()).unwrap_or_else(|| "nil".to_string()),
            self.pinch.map(|p| p.to_sexp()).unwrap_or_else(|| "nil".to_string()),
        )
    }
}

/// Everything the presentation layer consumes for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub frame: u64,
    pub phase: SessionPhase,
    pub reference_space: Option<ReferenceSpace>,
    pub logical: LogicalInputSet,
    /// Left, right.
    pub hands: [HandReport; 2],
    pub anchor: AnchorResolution,
    pub slider: SliderView,
    pub gate: GateReport,
    pub hud: HudText,
    pub timing: StageTimes,
}

impl FrameReport {
    pub fn hand(&self, hand: Hand) -> &HandReport {
        match hand {
            Hand::Left => &self.hands[0],
            Hand::Right => &self.hands[1],
        }
    }

    pub fn status_sexp(&self) -> String {
        format!(
            "(:frame {} :phase :{} :inputs {} :left {} :right {} :anchor {} :slider {} :gate {})",
            self.frame,
            self.phase.as_str(),
            self.logical.status_sexp(),
            self.hands[0].to_sexp(),
            self.hands[1].to_sexp(),
            self.anchor.to_sexp(),
            self.slider.to_sexp(),
            self.gate.to_sexp(),
        )
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

// ── Session ────────────────────────────────────────────────

/// Explicit per-session context passed through every frame update.
#[derive(Debug)]
pub struct FusionSession {
    config: FusionConfig,
    phase: SessionPhase,
    reference_space: Option<ReferenceSpace>,
    inputs: InputState,
    hands: HandTrackingState,
    gestures: GestureState,
    anchor: AnchorTracker,
    gate: DragGate,
    timing: FrameTiming,
    frame: u64,
}

impl FusionSession {
    pub fn new(config: FusionConfig) -> Self {
        Self {
            phase: SessionPhase::Inactive,
            reference_space: None,
            inputs: InputState::new(),
            hands: HandTrackingState::new(),
            gestures: GestureState::new(config.gesture.clone()),
            anchor: AnchorTracker::new(config.anchor.clone()),
            gate: DragGate::new(config.slider.clone(), config.gate.clone()),
            timing: FrameTiming::new(config.session.timing_window, config.session.frame_budget_ms),
            frame: 0,
            config,
        }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn reference_space(&self) -> Option<ReferenceSpace> {
        self.reference_space
    }

    pub fn inputs(&self) -> &InputState {
        &self.inputs
    }

    pub fn hands(&self) -> &HandTrackingState {
        &self.hands
    }

    pub fn gestures(&self) -> &GestureState {
        &self.gestures
    }

    pub fn gate(&self) -> &DragGate {
        &self.gate
    }

    pub fn slider_value(&self) -> f32 {
        self.gate.value()
    }

    pub fn timing(&self) -> &FrameTiming {
        &self.timing
    }

    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Started => {
                if self.phase != SessionPhase::Inactive {
                    self.end();
                }
                info!(
                    "Fusion: session started, requesting {} reference space",
                    self.config.session.reference_space.as_str()
                );
                self.phase = SessionPhase::AwaitingReferenceSpace;
                self.gate.begin_session();
            }
            SessionEvent::ReferenceSpace(result) => {
                if self.phase != SessionPhase::AwaitingReferenceSpace {
                    debug!("Fusion: ignoring reference space result in phase {}", self.phase.as_str());
                    return;
                }
                match result {
                    Ok(space) => {
                        info!("Fusion: reference space {} acquired", space.kind.as_str());
                        self.reference_space = Some(space);
                        self.phase = SessionPhase::Running;
                    }
                    Err(e) => {
                        warn!("Fusion: {}; continuing without tracking", e);
                        self.phase = SessionPhase::NoTracking;
                    }
                }
            }
            SessionEvent::Interaction(event) => {
                if self.phase == SessionPhase::Inactive {
                    debug!("Fusion: {} outside a session ignored", event.kind.as_str());
                    return;
                }
                self.inputs.handle_event(&event);
            }
            SessionEvent::Ended => self.end(),
        }
    }

    /// Reset every cached component, timing included.  The slider value is kept.
    pub fn end(&mut self) {
        if self.phase != SessionPhase::Inactive {
            info!(
                "Fusion: session ended after {} frames ({} over budget)",
                self.timing.total_frames, self.timing.missed_frames
            );
        }
        self.inputs.reset();
        self.hands.reset();
        self.gestures.reset();
        self.anchor.reset();
        self.gate.end_session();
        self.timing.reset();
        self.reference_space = None;
        self.phase = SessionPhase::Inactive;
    }

    /// Run one frame.  `sources` and `frame` are the runtime's view of the
    /// current frame; nothing from them is retained.
    pub fn update<F, P>(&mut self, sources: &[SpatialInputSource], frame: &F, presenter: &mut P) -> FrameReport
    where
        F: TrackingFrame + ?Sized,
        P: Presenter + ?Sized,
    {
        self.frame += 1;
        let active = self.phase != SessionPhase::Inactive;
        let space = match self.phase {
            SessionPhase::Running => self.reference_space,
            _ => None,
        };
        let mut times = StageTimes::default();

        let start = Instant::now();
        let logical = if active {
            self.inputs.classify(sources).clone()
        } else {
            LogicalInputSet::default()
        };
        times.set(Stage::Inputs, elapsed_ms(start));

        let start = Instant::now();
        for hand in Hand::BOTH {
            let source = logical.hand_source(hand).and_then(|id| find_source(sources, id));
            self.hands.refresh(hand, frame, source, space);
        }
        times.set(Stage::Hands, elapsed_ms(start));

        let start = Instant::now();
        self.gestures.update(&self.hands);
        let threshold = self.config.pinch.threshold_m;
        let hands = Hand::BOTH.map(|hand| {
            let snapshot = self.hands.snapshot(hand).clone();
            let pinch = snapshot.tracked().map(|t| detect_hand_pinch(t, threshold));
            HandReport {
                hand,
                gestures: self.gestures.hand(hand).cloned(),
                snapshot,
                pinch,
            }
        });
        times.set(Stage::Gestures, elapsed_ms(start));

        let start = Instant::now();
        let anchor_hand = self.anchor.config.hand;
        let anchor = self
            .anchor
            .resolve(self.hands.snapshot(anchor_hand), &logical, sources, frame, space);
        times.set(Stage::Anchor, elapsed_ms(start));

        let start = Instant::now();
        let gate = if active {
            let drive_hand = self.gate.gate.drive_hand;
            let drive_index = match drive_hand {
                Hand::Left => 0,
                Hand::Right => 1,
            };
            let ray_source = logical.source_for(drive_hand).or(logical.pinch);
            let ray = match (space, ray_source) {
                (Some(space), Some(id)) => frame.pose(PoseSpace::TargetRay(id), space),
                _ => None,
            };
            let trigger_button = self.gate.gate.trigger_button;
            let trigger_held = ray_source
                .map(|id| {
                    let button = find_source(sources, id)
                        .and_then(|s| s.gamepad.as_ref())
                        .map(|g| g.is_pressed(trigger_button))
                        .unwrap_or(false);
                    button || logical.pinch == Some(id)
                })
                .unwrap_or(false);

            let inputs = GateInputs {
                drive: hands[drive_index].snapshot.tracked(),
                pinch: hands[drive_index].pinch,
                ray,
                trigger_held,
                anchor,
            };
            self.gate.update(inputs, presenter)
        } else {
            GateReport::default()
        };
        times.set(Stage::Gate, elapsed_ms(start));

        self.timing.record_frame(&times);

        let report = FrameReport {
            frame: self.frame,
            phase: self.phase,
            reference_space: space,
            hud: hud::build(&self.inputs.flags, sources, frame, space, threshold),
            logical,
            hands,
            anchor,
            slider: self.gate.view(),
            gate,
            timing: times,
        };
        presenter.present(&report);
        report
    }

    pub fn status_sexp(&self) -> String {
        format!(
            "(:phase :{} :frame {} :reference-space {} :hands {} :inputs {} :slider {} :timing {})",
            self.phase.as_str(),
            self.frame,
            self.reference_space
                .map(|s| format!(":{}", s.kind.as_str()))
                .unwrap_or_else(|| "nil".to_string()),
            self.hands.status_sexp(),
            self.inputs.logical.status_sexp(),
            self.gate.view().to_sexp(),
            self.timing.stats_sexp(),
        )
    }
}

// ── Test helpers ───────────────────────────────────────────

#[cfg(test)]
const LEFT_ID: super::provider::SourceId = 1;
#[cfg(test)]
const RIGHT_ID: super::provider::SourceId = 2;

#[cfg(test)]
fn test_space() -> ReferenceSpace {
    ReferenceSpace {
        id: 1,
        kind: ReferenceSpaceType::LocalFloor,
    }
}

#[cfg(test)]
fn left_wrist() -> super::provider::Pose {
    use nalgebra::{Point3, UnitQuaternion, Vector3};
    super::provider::Pose::new(
        Point3::new(-0.15, 1.1, -0.35),
        UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 0.3),
    )
}

/// Frame with an open left hand at `left_wrist()` and, optionally, a right
/// hand pinching (or not) at panel-local `(x, 0, 0)`.
#[cfg(test)]
fn two_hands(config: &FusionConfig, right: Option<(f32, bool)>) -> (super::sim::SimFrame, Vec<SpatialInputSource>) {
    use super::provider::Handedness;
    use super::sim::{SimFrame, SimHandPose};

    let mut frame = SimFrame::new(test_space());
    let mut sources = vec![frame.add_hand(LEFT_ID, Handedness::Left, &SimHandPose::open(Hand::Left, left_wrist()))];
    if let Some((x, pinch)) = right {
        let panel = config.slider.panel.world_transform(&left_wrist());
        let point = panel * nalgebra::Point3::new(x, 0.0, 0.0);
        let mut pose = SimHandPose::pinching_at(Hand::Right, point);
        if !pinch {
            pose = pose.released();
        }
        sources.push(frame.add_hand(RIGHT_ID, Handedness::Right, &pose));
    }
    (frame, sources)
}

#[cfg(test)]
fn running(config: FusionConfig) -> FusionSession {
    let mut session = FusionSession::new(config);
    session.handle_event(SessionEvent::Started);
    session.handle_event(SessionEvent::ReferenceSpace(Ok(test_space())));
    session
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xr::anchor::AnchorSource;
    use crate::xr::gesture::PalmFacing;
    use crate::xr::input_sources::InteractionKind;
    use crate::xr::provider::{Gamepad, Handedness, Pose};
    use crate::xr::sim::SimFrame;

    #[derive(Default)]
    struct Recorder {
        labels: Vec<String>,
        frames: u64,
    }

    impl LabelSink for Recorder {
        fn refresh_label(&mut self, text: &str) {
            self.labels.push(text.to_string());
        }
    }

    impl Presenter for Recorder {
        fn present(&mut self, _report: &FrameReport) {
            self.frames += 1;
        }
    }

    fn select(kind: InteractionKind, id: u32, handedness: Handedness) -> SessionEvent {
        SessionEvent::Interaction(InteractionEvent::new(kind, id, handedness))
    }

    #[test]
    fn test_inactive_session_is_inert() {
        let config = FusionConfig::default();
        let mut session = FusionSession::new(config.clone());
        let (frame, sources) = two_hands(&config, Some((0.05, true)));
        let mut presenter = Recorder::default();

        let report = session.update(&sources, &frame, &mut presenter);
        assert_eq!(report.phase, SessionPhase::Inactive);
        assert!(!report.hand(Hand::Left).snapshot.is_tracked());
        assert!(!report.anchor.is_visible());
        assert!(!report.gate.open);
        assert_eq!(report.hud.lines, vec!["XR session not active."]);
        assert!(presenter.labels.is_empty());
        assert_eq!(presenter.frames, 1);
    }

    #[test]
    fn test_no_reference_space_yet_is_a_noop() {
        let config = FusionConfig::default();
        let mut session = FusionSession::new(config.clone());
        session.handle_event(SessionEvent::Started);
        let (frame, sources) = two_hands(&config, Some((0.05, true)));
        let mut presenter = Recorder::default();

        let report = session.update(&sources, &frame, &mut presenter);
        assert_eq!(report.phase, SessionPhase::AwaitingReferenceSpace);
        assert!(report.reference_space.is_none());
        assert!(!report.hand(Hand::Right).snapshot.is_tracked());
        assert!(!report.gate.open);
        assert_eq!(presenter.labels, vec!["Voltage: 0.00 V".to_string()]);
    }

    #[test]
    fn test_reference_space_failure_leaves_no_tracking() {
        let config = FusionConfig::default();
        let mut session = FusionSession::new(config.clone());
        session.handle_event(SessionEvent::Started);
        session.handle_event(SessionEvent::ReferenceSpace(Err(TrackingError::ReferenceSpaceUnavailable {
            space: ReferenceSpaceType::LocalFloor,
            reason: "not supported".into(),
        })));
        assert_eq!(session.phase(), SessionPhase::NoTracking);

        let (frame, sources) = two_hands(&config, Some((0.05, true)));
        let report = session.update(&sources, &frame, &mut NullPresenter);
        assert!(!report.hand(Hand::Left).snapshot.is_tracked());
        assert!(!report.anchor.is_visible());
        assert_eq!(session.slider_value(), 0.0);
    }

    #[test]
    fn test_stale_reference_space_ignored() {
        let mut session = FusionSession::new(FusionConfig::default());
        session.handle_event(SessionEvent::ReferenceSpace(Ok(test_space())));
        assert_eq!(session.phase(), SessionPhase::Inactive);
        assert!(session.reference_space().is_none());

        let mut session = running(FusionConfig::default());
        let other = ReferenceSpace {
            id: 9,
            kind: ReferenceSpaceType::Stage,
        };
        session.handle_event(SessionEvent::ReferenceSpace(Ok(other)));
        assert_eq!(session.reference_space(), Some(test_space()));
    }

    #[test]
    fn test_full_frame_outputs() {
        let config = FusionConfig::default();
        let mut session = running(config.clone());
        let (frame, sources) = two_hands(&config, Some((0.0, false)));

        let report = session.update(&sources, &frame, &mut NullPresenter);
        assert_eq!(report.logical.left, Some(LEFT_ID));
        assert_eq!(report.logical.right, Some(RIGHT_ID));
        for hand in Hand::BOTH {
            let h = report.hand(hand);
            let tracked = h.snapshot.tracked().expect("tracked");
            assert_eq!(tracked.joints().len(), 25);
            assert_eq!(h.gestures.as_ref().map(|g| g.curled_count()), Some(0));
            assert_eq!(h.pinch.map(|p| p.pinching), Some(false));
        }
        let left_palm = report.hand(Hand::Left).gestures.as_ref().and_then(|g| g.palm);
        assert_eq!(left_palm.map(|p| p.facing), Some(PalmFacing::Down));
        assert_eq!(report.anchor.source(), Some(AnchorSource::Wrist(Hand::Left)));
        assert!(report.slider.visible);
        assert_eq!(report.hud.lines.len(), 2);
        assert!(report.status_sexp().starts_with("(:frame 1 :phase :running"));
    }

    #[test]
    fn test_drag_updates_value_and_releases() {
        let config = FusionConfig::default();
        let mut session = running(config.clone());
        let mut presenter = Recorder::default();

        let (frame, sources) = two_hands(&config, Some((0.09, true)));
        let report = session.update(&sources, &frame, &mut presenter);
        assert!(report.gate.open, "{:?}", report.gate);
        assert!(report.slider.dragging);
        assert!((report.slider.value - 0.4).abs() < 1e-3);
        assert_eq!(presenter.labels.last().map(String::as_str), Some("Voltage: 0.40 V"));

        let (frame, sources) = two_hands(&config, Some((-0.09, false)));
        let report = session.update(&sources, &frame, &mut presenter);
        assert!(!report.gate.pinching);
        assert!(!report.slider.dragging);
        assert!((report.slider.value - 0.4).abs() < 1e-3);
    }

    #[test]
    fn test_value_stays_in_range() {
        let config = FusionConfig::default();
        let mut session = running(config.clone());
        for i in -12..=12 {
            let (frame, sources) = two_hands(&config, Some((i as f32 * 0.01, true)));
            let report = session.update(&sources, &frame, &mut NullPresenter);
            let v = report.slider.value;
            assert!(v >= config.slider.min && v <= config.slider.max, "{}", v);
        }
    }

    #[test]
    fn test_batch_failure_drops_classification_and_drag() {
        let config = FusionConfig::default();
        let mut session = running(config.clone());

        let (mut frame, sources) = two_hands(&config, Some((0.09, true)));
        frame.fail_radii(RIGHT_ID);
        let report = session.update(&sources, &frame, &mut NullPresenter);
        let right = report.hand(Hand::Right);
        assert!(!right.snapshot.is_tracked());
        assert!(right.gestures.is_none());
        assert!(right.pinch.is_none());
        assert!(!report.gate.tracked);
        assert_eq!(session.slider_value(), 0.0);

        let (frame, sources) = two_hands(&config, Some((0.09, true)));
        let report = session.update(&sources, &frame, &mut NullPresenter);
        assert!(report.hand(Hand::Right).snapshot.is_tracked());
        assert!(report.gate.open);
    }

    #[test]
    fn test_frame_in_other_space_is_untracked() {
        let config = FusionConfig::default();
        let mut session = running(config.clone());
        let (_, sources) = two_hands(&config, Some((0.0, true)));
        let foreign = SimFrame::new(ReferenceSpace {
            id: 2,
            kind: ReferenceSpaceType::Local,
        });
        let report = session.update(&sources, &foreign, &mut NullPresenter);
        assert!(!report.hand(Hand::Left).snapshot.is_tracked());
        assert!(!report.hand(Hand::Right).snapshot.is_tracked());
        assert!(!report.anchor.is_visible());
    }

    #[test]
    fn test_anchor_falls_back_to_controller() {
        let config = FusionConfig::default();
        let mut session = running(config.clone());
        let mut frame = SimFrame::new(test_space());
        let sources = vec![frame.add_controller(7, Handedness::Left, left_wrist(), Gamepad::default())];

        let report = session.update(&sources, &frame, &mut NullPresenter);
        assert_eq!(report.anchor.source(), Some(AnchorSource::ControllerGrip(7)));
        assert_eq!(report.logical.left, Some(7));

        let (frame, sources) = two_hands(&config, None);
        let report = session.update(&sources, &frame, &mut NullPresenter);
        assert_eq!(report.anchor.source(), Some(AnchorSource::Wrist(Hand::Left)));
    }

    #[test]
    fn test_trigger_gate_uses_select_latch() {
        let mut config = FusionConfig::default();
        config.gate.require_trigger = true;
        let mut session = running(config.clone());
        let (frame, sources) = two_hands(&config, Some((0.0, true)));

        let report = session.update(&sources, &frame, &mut NullPresenter);
        assert!(!report.gate.trigger_held);
        assert!(!report.gate.open);

        session.handle_event(select(InteractionKind::SelectStart, RIGHT_ID, Handedness::Right));
        let report = session.update(&sources, &frame, &mut NullPresenter);
        assert!(report.gate.trigger_held);
        assert!(report.gate.open);

        session.handle_event(select(InteractionKind::SelectEnd, RIGHT_ID, Handedness::Right));
        let report = session.update(&sources, &frame, &mut NullPresenter);
        assert!(!report.gate.open);
    }

    #[test]
    fn test_session_end_resets_everything_but_value() {
        let config = FusionConfig::default();
        let mut session = running(config.clone());
        session.handle_event(select(InteractionKind::SelectStart, RIGHT_ID, Handedness::Right));
        let (frame, sources) = two_hands(&config, Some((0.09, true)));
        session.update(&sources, &frame, &mut NullPresenter);
        assert!(session.gate().is_dragging());

        session.handle_event(SessionEvent::Ended);
        assert_eq!(session.phase(), SessionPhase::Inactive);
        assert!(session.reference_space().is_none());
        assert_eq!(session.inputs().latch.active(), None);
        assert!(!session.inputs().flags.select(Handedness::Right));
        assert_eq!(session.inputs().logical, LogicalInputSet::default());
        assert!(!session.hands().active);
        assert!(session.gestures().hand(Hand::Left).is_none());
        assert!(!session.gate().is_dragging());
        assert_eq!(session.gate().state().anchor, AnchorResolution::Hidden);
        assert!((session.slider_value() - 0.4).abs() < 1e-3);
        assert_eq!(session.timing().total_frames, 0);

        let mut presenter = Recorder::default();
        session.handle_event(SessionEvent::Started);
        let report = session.update(&[], &SimFrame::new(test_space()), &mut presenter);
        assert_eq!(report.logical.pinch, None);
        assert!(!report.slider.dragging);
        assert_eq!(presenter.labels, vec!["Voltage: 0.40 V".to_string()]);
    }

    #[test]
    fn test_interaction_outside_session_ignored() {
        let mut session = FusionSession::new(FusionConfig::default());
        session.handle_event(select(InteractionKind::SelectStart, 3, Handedness::Left));
        assert_eq!(session.inputs().latch.active(), None);
    }

    #[test]
    fn test_timing_and_status() {
        let config = FusionConfig::default();
        let mut session = running(config.clone());
        let (frame, sources) = two_hands(&config, None);
        session.update(&sources, &frame, &mut NullPresenter);
        session.update(&sources, &frame, &mut NullPresenter);
        assert_eq!(session.timing().total_frames, 2);

        let sexp = session.status_sexp();
        assert!(sexp.starts_with("(:phase :running :frame 2 :reference-space :local-floor"));
        assert!(sexp.contains(":total-frames 2"));
    }

    #[test]
    fn test_frame_budget_from_config() {
        let mut config = FusionConfig::default();
        config.session.frame_budget_ms = 1e-9;
        config.session.timing_window = 4;
        let mut session = running(config.clone());
        assert_eq!(session.timing().budget_ms, 1e-9);
        assert_eq!(session.timing().window_size, 4);

        let (frame, sources) = two_hands(&config, Some((0.0, true)));
        for _ in 0..6 {
            session.update(&sources, &frame, &mut NullPresenter);
        }
        assert_eq!(session.timing().total_frames, 6);
        assert_eq!(session.timing().missed_frames, 6);
        assert_eq!(session.timing().total_times.len(), 4);

        let relaxed = running(FusionConfig::default());
        assert_eq!(relaxed.timing().budget_ms, 1.0);
    }

    #[test]
    fn test_slider_value_finite_with_rejected_initial() {
        let mut config = FusionConfig::default();
        assert!(config.apply_sexp("(:slider-initial nan)").is_err());
        let session = FusionSession::new(config.clone());
        assert_eq!(session.slider_value(), 0.0);

        config.slider.initial = f32::NAN;
        let session = FusionSession::new(config.clone());
        let v = session.slider_value();
        assert!(v >= config.slider.min && v <= config.slider.max, "{}", v);
    }

    #[test]
    fn test_transient_pointer_drives_ray_via_latch() {
        let config = FusionConfig::default();
        let mut session = running(config.clone());
        let (mut frame, mut sources) = two_hands(&config, None);
        sources.push(frame.add_transient_pointer(30, Handedness::None, Pose::identity()));
        session.handle_event(select(InteractionKind::SelectStart, 30, Handedness::None));

        let report = session.update(&sources, &frame, &mut NullPresenter);
        assert_eq!(report.logical.pinch, Some(30));
        assert_eq!(report.logical.controllers, vec![30]);
        assert!(!report.gate.tracked);
        assert!(!report.gate.open);
    }
}
