//! Hand-mounted slider and its drag gate.
//!
//! The panel hangs off the anchor pose through a tilt node.  The gate is
//! re-evaluated every frame: it is open only while the panel is anchored,
//! the driving hand is tracked and pinching, its target ray hits the
//! panel's hit volume and, if configured, the trigger is held.  While
//! open, the driving index tip is projected onto the panel's local X axis,
//! clamped to the track, and mapped linearly into `[min, max]`.
//!
//! One track offset drives both the knob and the value: the value is
//! always `offset_to_value(knob_offset_m)`, so the displayed knob and the
//! reported value never disagree.  `knob_smoothing` below 1.0 smooths both.

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use tracing::debug;

use super::anchor::AnchorResolution;
use super::hand_tracking::{Hand, HandJoint, TrackedHand};
use super::pinch::PinchReading;
use super::provider::Pose;

// ── Geometry ───────────────────────────────────────────────

/// Placement of the panel relative to the anchor pose.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelLayout {
    /// Rotation about the anchor's X axis applied before the offset.
    pub tilt_deg: f32,
    pub offset_m: Vector3<f32>,
    /// Panel Euler rotation, XYZ order.
    pub rotation_deg: Vector3<f32>,
}

impl Default for PanelLayout {
    fn default() -> Self {
        Self {
            tilt_deg: 20.0,
            offset_m: Vector3::new(0.07, 0.02, -0.05),
            rotation_deg: Vector3::new(0.0, 25.0, 25.0),
        }
    }
}

impl PanelLayout {
    /// Panel frame expressed in the anchor frame.
    pub fn local_transform(&self) -> Isometry3<f32> {
        let tilt = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), self.tilt_deg.to_radians());
        let r = self.rotation_deg;
        let rx = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), r.x.to_radians());
        let ry = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), r.y.to_radians());
        let rz = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), r.z.to_radians());

        let tilt_node = Isometry3::from_parts(Translation3::identity(), tilt);
        let panel = Isometry3::from_parts(Translation3::from(self.offset_m), rx * ry * rz);
        tilt_node * panel
    }

    /// Panel frame in the reference space for a given anchor pose.
    pub fn world_transform(&self, anchor: &Pose) -> Isometry3<f32> {
        anchor.to_isometry() * self.local_transform()
    }
}

/// Box around the panel, in panel-local coordinates, that target rays must hit.
#[derive(Debug, Clone, PartialEq)]
pub struct HitVolume {
    pub half_extents_m: Vector3<f32>,
    pub max_ray_length_m: f32,
}

impl Default for HitVolume {
    fn default() -> Self {
        Self {
            half_extents_m: Vector3::new(0.13, 0.07, 0.04),
            max_ray_length_m: 5.0,
        }
    }
}

impl HitVolume {
    /// Distance along the ray to the volume, or `None` on a miss.  A ray
    /// starting inside the volume hits at distance 0.
    pub fn ray_hits(&self, panel: &Isometry3<f32>, ray: &Pose) -> Option<f32> {
        if !ray.is_finite() {
            return None;
        }
        let origin = panel.inverse_transform_point(&ray.position);
        let dir = panel.inverse_transform_vector(&ray.forward());

        let mut t_near = f32::NEG_INFINITY;
        let mut t_far = f32::INFINITY;
        for axis in 0..3 {
            let (o, d, h) = (origin[axis], dir[axis], self.half_extents_m[axis]);
            if d.abs() < 1.0e-8 {
                if o.abs() > h {
                    return None;
                }
                continue;
            }
            let t1 = (-h - o) / d;
            let t2 = (h - o) / d;
            t_near = t_near.max(t1.min(t2));
            t_far = t_far.min(t1.max(t2));
            if t_near > t_far {
                return None;
            }
        }

        if t_far < 0.0 || t_near > self.max_ray_length_m {
            return None;
        }
        Some(t_near.max(0.0))
    }
}

// ── Config ─────────────────────────────────────────────────

/// Value range, track and label formatting.
#[derive(Debug, Clone, PartialEq)]
pub struct SliderConfig {
    pub min: f32,
    pub max: f32,
    pub initial: f32,
    /// Full track length (meters); the knob travels ±half of it.
    pub track_length_m: f32,
    /// Per-frame blend toward the target offset, in (0, 1].  1.0 disables smoothing.
    pub knob_smoothing: f32,
    pub label_prefix: String,
    pub label_unit: String,
    pub label_decimals: usize,
    pub panel: PanelLayout,
    pub hit_volume: HitVolume,
}

impl Default for SliderConfig {
    fn default() -> Self {
        Self {
            min: -1.4,
            max: 0.4,
            initial: 0.0,
            track_length_m: 0.18,
            knob_smoothing: 1.0,
            label_prefix: "Voltage".to_string(),
            label_unit: "V".to_string(),
            label_decimals: 2,
            panel: PanelLayout::default(),
            hit_volume: HitVolume::default(),
        }
    }
}

impl SliderConfig {
    pub fn half_length(&self) -> f32 {
        self.track_length_m * 0.5
    }

    pub fn clamp_value(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }

    /// Knob offset for a value; values outside the range land on the ends.
    pub fn value_to_offset(&self, value: f32) -> f32 {
        let h = self.half_length();
        let t = (self.clamp_value(value) - self.min) / (self.max - self.min);
        -h + t * 2.0 * h
    }

    /// Value for a track offset; offsets past the ends map to the boundary.
    pub fn offset_to_value(&self, offset_m: f32) -> f32 {
        let t = self.normalized(offset_m);
        self.clamp_value(self.min * (1.0 - t) + self.max * t)
    }

    /// Offset as a fraction of the track, in [0, 1].
    pub fn normalized(&self, offset_m: f32) -> f32 {
        let h = self.half_length();
        (offset_m.clamp(-h, h) + h) / (2.0 * h)
    }

    pub fn label_text(&self, value: f32) -> String {
        format!(
            "{}: {:.*} {}",
            self.label_prefix, self.label_decimals, value, self.label_unit
        )
    }
}

/// Which source drives the slider and whether a trigger is also required.
#[derive(Debug, Clone, PartialEq)]
pub struct GateConfig {
    pub drive_hand: Hand,
    pub require_trigger: bool,
    /// Gamepad button index used as the trigger.
    pub trigger_button: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            drive_hand: Hand::Right,
            require_trigger: false,
            trigger_button: 0,
        }
    }
}

// ── State ──────────────────────────────────────────────────

/// Long-lived slider state, mutated only by `DragGate`.
#[derive(Debug, Clone, PartialEq)]
pub struct SliderState {
    pub value: f32,
    pub knob_offset_m: f32,
    pub dragging: bool,
    pub anchor: AnchorResolution,
}

/// What the presentation layer needs to draw the slider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliderView {
    pub value: f32,
    pub normalized_knob: f32,
    pub knob_offset_m: f32,
    pub dragging: bool,
    pub visible: bool,
}

impl SliderView {
    pub fn to_sexp(&self) -> String {
        format!(
            "(:value {:.3} :knob {:.3} :dragging {} :visible {})",
            self.value,
            self.normalized_knob,
            if self.dragging { "t" } else { "nil" },
            if self.visible { "t" } else { "nil" },
        )
    }
}

/// Receiver of label text refreshes.
pub trait LabelSink {
    fn refresh_label(&mut self, text: &str);
}

impl LabelSink for Vec<String> {
    fn refresh_label(&mut self, text: &str) {
        self.push(text.to_string());
    }
}

/// Per-frame inputs to the gate.
#[derive(Debug, Clone, Copy)]
pub struct GateInputs<'a> {
    /// Driving hand snapshot, if tracked this frame.
    pub drive: Option<&'a TrackedHand>,
    pub pinch: Option<PinchReading>,
    /// Target ray of the driving source.
    pub ray: Option<Pose>,
    pub trigger_held: bool,
    pub anchor: AnchorResolution,
}

/// Which gate conditions held this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GateReport {
    pub anchored: bool,
    pub tracked: bool,
    pub pinching: bool,
    pub ray_hit: bool,
    pub trigger_held: bool,
    pub open: bool,
}

impl GateReport {
    pub fn to_sexp(&self) -> String {
        let b = |v: bool| if v { "t" } else { "nil" };
        format!(
            "(:anchored {} :tracked {} :pinching {} :ray-hit {} :trigger {} :open {})",
            b(self.anchored),
            b(self.tracked),
            b(self.pinching),
            b(self.ray_hit),
            b(self.trigger_held),
            b(self.open),
        )
    }
}

/// Idle/Dragging state machine owning `SliderState`.
#[derive(Debug)]
pub struct DragGate {
    pub config: SliderConfig,
    pub gate: GateConfig,
    state: SliderState,
    label_dirty: bool,
}

impl DragGate {
    pub fn new(config: SliderConfig, gate: GateConfig) -> Self {
        let value = if config.initial.is_finite() {
            config.clamp_value(config.initial)
        } else {
            config.min
        };
        let state = SliderState {
            value,
            knob_offset_m: config.value_to_offset(value),
            dragging: false,
            anchor: AnchorResolution::Hidden,
        };
        Self {
            config,
            gate,
            state,
            label_dirty: true,
        }
    }

    pub fn state(&self) -> &SliderState {
        &self.state
    }

    pub fn value(&self) -> f32 {
        self.state.value
    }

    pub fn is_dragging(&self) -> bool {
        self.state.dragging
    }

    pub fn view(&self) -> SliderView {
        SliderView {
            value: self.state.value,
            normalized_knob: self.config.normalized(self.state.knob_offset_m),
            knob_offset_m: self.state.knob_offset_m,
            dragging: self.state.dragging,
            visible: self.state.anchor.is_visible(),
        }
    }

    /// Evaluate the gate for this frame and apply the drag if it is open.
    pub fn update<L: LabelSink + ?Sized>(&mut self, inputs: GateInputs<'_>, label: &mut L) -> GateReport {
        self.state.anchor = inputs.anchor;
        let panel = inputs.anchor.pose().map(|pose| self.config.panel.world_transform(&pose));

        let anchored = panel.is_some();
        let tracked = inputs.drive.is_some();
        let pinching = inputs.pinch.map(|p| p.pinching).unwrap_or(false);
        let ray_hit = match (panel.as_ref(), inputs.ray.as_ref()) {
            (Some(panel), Some(ray)) => self.config.hit_volume.ray_hits(panel, ray).is_some(),
            _ => false,
        };
        let trigger_ok = inputs.trigger_held || !self.gate.require_trigger;
        let open = anchored && tracked && pinching && ray_hit && trigger_ok;

        match (open, panel, inputs.drive) {
            (true, Some(panel), Some(hand)) => {
                let tip = hand.position(HandJoint::IndexFingerTip);
                let local = panel.inverse_transform_point(&tip);
                let h = self.config.half_length();
                self.drag_to(local.x.clamp(-h, h));
                if !self.state.dragging {
                    debug!("Drag started at {:.3}", self.state.value);
                }
                self.state.dragging = true;
                self.label_dirty = true;
            }
            _ => {
                if self.state.dragging {
                    debug!("Drag released at {:.3}", self.state.value);
                }
                self.state.dragging = false;
            }
        }

        if self.label_dirty {
            label.refresh_label(&self.config.label_text(self.state.value));
            self.label_dirty = false;
        }

        GateReport {
            anchored,
            tracked,
            pinching,
            ray_hit,
            trigger_held: inputs.trigger_held,
            open,
        }
    }

    fn drag_to(&mut self, target_m: f32) {
        let alpha = self.config.knob_smoothing;
        self.state.knob_offset_m = if alpha >= 1.0 {
            target_m
        } else {
            self.state.knob_offset_m + (target_m - self.state.knob_offset_m) * alpha
        };
        self.state.value = self.config.offset_to_value(self.state.knob_offset_m);
    }

    /// Mark the label for refresh on the first frame of a session.
    pub fn begin_session(&mut self) {
        self.label_dirty = true;
    }

    /// Drop drag and anchor state.  The value itself is kept.
    pub fn end_session(&mut self) {
        self.state.dragging = false;
        self.state.anchor = AnchorResolution::Hidden;
        self.label_dirty = true;
    }
}

// ── Test helpers ───────────────────────────────────────────

#[cfg(test)]
fn anchor_at(position: nalgebra::Point3<f32>) -> AnchorResolution {
    use super::anchor::AnchorSource;
    AnchorResolution::Visible {
        source: AnchorSource::Wrist(Hand::Left),
        pose: Pose::new(position, UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 0.4)),
    }
}

/// A right hand pinching at panel-local `(x, 0, 0)`.
#[cfg(test)]
fn right_hand_at(config: &SliderConfig, anchor: &AnchorResolution, x: f32, pinch: bool) -> (TrackedHand, Pose) {
    use super::hand_tracking::process_hand;
    use super::provider::{Handedness, ReferenceSpace, ReferenceSpaceType};
    use super::sim::{SimFrame, SimHandPose};

    let panel = config.panel.world_transform(&anchor.pose().expect("anchored"));
    let point = panel * nalgebra::Point3::new(x, 0.0, 0.0);
    let mut pose = SimHandPose::pinching_at(Hand::Right, point);
    if !pinch {
        pose = pose.released();
    }

    let space = ReferenceSpace {
        id: 1,
        kind: ReferenceSpaceType::LocalFloor,
    };
    let mut frame = SimFrame::new(space);
    let source = frame.add_hand(2, Handedness::Right, &pose);
    let hand = process_hand(&frame, &source, space).expect("tracked");
    (hand, pose.target_ray())
}

// ── Tests ──────────────────────────────────────────────────
