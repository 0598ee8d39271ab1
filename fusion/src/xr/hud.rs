//! Text for the input diagnostics HUD.
//!
//! One header line with the select/squeeze flags, then one line per input
//! source.  Hand pinch distance uses individual by-name joint queries, not
//! the batch snapshot, so the HUD still reports sources the batch processor
//! rejected this frame.

use super::hand_tracking::HandJoint;
use super::input_sources::ActionFlags;
use super::pinch::detect_pinch;
use super::provider::{Handedness, ReferenceSpace, SourceKind, SpatialInputSource, TrackingFrame};

const MAX_BUTTONS: usize = 4;
const MAX_AXES: usize = 2;

/// Rendered HUD text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HudText {
    pub header: String,
    pub lines: Vec<String>,
}

impl HudText {
    pub fn render(&self) -> String {
        let mut s = self.header.clone();
        for line in &self.lines {
            s.push('\n');
            s.push_str(line);
        }
        s
    }
}

pub fn header(flags: &ActionFlags) -> String {
    let n = |v: bool| u8::from(v);
    format!(
        "XR Inputs  SEL[L:{} R:{}]  SQZ[L:{} R:{}]",
        n(flags.select(Handedness::Left)),
        n(flags.select(Handedness::Right)),
        n(flags.squeeze(Handedness::Left)),
        n(flags.squeeze(Handedness::Right)),
    )
}

fn buttons_label(source: &SpatialInputSource) -> String {
    let pressed: Vec<String> = source
        .gamepad
        .iter()
        .flat_map(|g| g.buttons.iter().enumerate())
        .filter(|(_, b)| b.pressed)
        .map(|(i, _)| format!("B{}", i))
        .collect();
    match pressed.len() {
        0 => "—".to_string(),
        n if n > MAX_BUTTONS => format!("{} +{}", pressed[..MAX_BUTTONS].join(","), n - MAX_BUTTONS),
        _ => pressed.join(","),
    }
}

fn axes_label(source: &SpatialInputSource) -> String {
    let axes: Vec<String> = source
        .gamepad
        .iter()
        .flat_map(|g| g.axes.iter())
        .map(|a| format!("{:.2}", a))
        .collect();
    match axes.len() {
        0 => "—".to_string(),
        n if n > MAX_AXES => format!("{}…", axes[..MAX_AXES].join(",")),
        _ => axes.join(","),
    }
}

fn pinch_label<F: TrackingFrame + ?Sized>(
    source: &SpatialInputSource,
    frame: &F,
    space: ReferenceSpace,
    threshold_m: f32,
) -> Option<String> {
    let table = source.hand.as_ref()?;
    let index = frame.joint_pose(table.resolve(HandJoint::IndexFingerTip)?, space)?;
    let thumb = frame.joint_pose(table.resolve(HandJoint::ThumbTip)?, space)?;
    let reading = detect_pinch(&index.pose.position, &thumb.pose.position, threshold_m);
    Some(format!(
        "pinch:{:.3}m{}",
        reading.distance_m,
        if reading.pinching { " ✓" } else { "" }
    ))
}

/// One line per source.  Without a reference space the session is not
/// delivering poses and a single placeholder line is returned.
pub fn input_lines<F: TrackingFrame + ?Sized>(
    sources: &[SpatialInputSource],
    frame: &F,
    space: Option<ReferenceSpace>,
    pinch_threshold_m: f32,
) -> Vec<String> {
    let space = match space {
        Some(space) => space,
        None => return vec!["XR session not active.".to_string()],
    };

    sources
        .iter()
        .map(|source| {
            let kind = match source.kind() {
                SourceKind::TrackedHand => "hand",
                SourceKind::Controller if source.gamepad.is_some() => "ctrl",
                _ => source.target_ray_mode.as_str(),
            };
            let mut line = format!("[{}] {}", source.handedness.tag(), kind);
            if source.gamepad.is_some() {
                line.push_str(&format!(" | btn:{} | ax:{}", buttons_label(source), axes_label(source)));
            }
            if source.is_hand() {
                match pinch_label(source, frame, space, pinch_threshold_m) {
                    Some(label) => line.push_str(&format!(" | {}", label)),
                    None => line.push_str(" | pinch: n/a"),
                }
            }
            line.push_str(&format!(" | ray:{}", source.target_ray_mode.as_str()));
            line
        })
        .collect()
}

/// Full HUD for one frame.
pub fn build<F: TrackingFrame + ?Sized>(
    flags: &ActionFlags,
    sources: &[SpatialInputSource],
    frame: &F,
    space: Option<ReferenceSpace>,
    pinch_threshold_m: f32,
) -> HudText {
    HudText {
        header: header(flags),
        lines: input_lines(sources, frame, space, pinch_threshold_m),
    }
}
