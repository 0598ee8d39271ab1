//! fusion-replay: drive a fusion session from a scripted runtime.
//!
//! Runs one session over a synthetic hand/controller recording and logs the
//! slider label, periodic status, and frame timing.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use nalgebra::{Point3, UnitQuaternion, Vector3};
use tracing::{debug, info};

use xr_fusion::xr::hand_tracking::Hand;
use xr_fusion::xr::input_sources::{InteractionEvent, InteractionKind};
use xr_fusion::xr::provider::{Gamepad, GamepadButton, Handedness, Pose, ReferenceSpace, SpatialInputSource};
use xr_fusion::xr::session::{FrameReport, FusionSession, Presenter, SessionEvent};
use xr_fusion::xr::sim::{SimFrame, SimHandPose};
use xr_fusion::xr::slider::LabelSink;
use xr_fusion::FusionConfig;

const LEFT_HAND: u32 = 1;
const RIGHT_HAND: u32 = 2;
const LEFT_CONTROLLER: u32 = 11;
const RIGHT_CONTROLLER: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// Right hand pinches and sweeps the slider across its track.
    Drag,
    /// Left hand drops out; the panel falls back to the left controller grip.
    AnchorSwitch,
    /// Controllers only, with trigger presses.
    Controller,
}

#[derive(Parser, Debug)]
#[command(name = "fusion-replay", about = "Replay a scripted XR input session")]
struct Cli {
    /// Number of frames to run
    #[arg(long, default_value_t = 180)]
    frames: u64,

    /// Recording to replay
    #[arg(long, value_enum, default_value = "drag")]
    scenario: Scenario,

    /// S-expression config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Inline s-expression overrides, e.g. "(:pinch-threshold-m 0.02)"
    #[arg(long)]
    set: Vec<String>,

    /// Log frame status every N frames (0 disables)
    #[arg(long, default_value_t = 30)]
    status_every: u64,

    /// Show version and exit
    #[arg(long)]
    version: bool,
}

/// Presenter that writes label refreshes and periodic status to the log.
struct LogPresenter {
    status_every: u64,
    last_label: Option<String>,
}

impl LabelSink for LogPresenter {
    fn refresh_label(&mut self, text: &str) {
        if self.last_label.as_deref() != Some(text) {
            info!("label: {}", text);
        }
        self.last_label = Some(text.to_string());
    }
}

impl Presenter for LogPresenter {
    fn present(&mut self, report: &FrameReport) {
        debug!("hud:\n{}", report.hud.render());
        if self.status_every > 0 && report.frame % self.status_every == 0 {
            info!("{}", report.status_sexp());
        }
    }
}

fn reference_space() -> ReferenceSpace {
    ReferenceSpace {
        id: 1,
        kind: xr_fusion::xr::provider::ReferenceSpaceType::LocalFloor,
    }
}

fn left_wrist(t: f32) -> Pose {
    Pose::new(
        Point3::new(-0.15 + 0.01 * (t * 6.0).sin(), 1.1, -0.35),
        UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 0.3),
    )
}

fn pad(trigger: bool) -> Gamepad {
    Gamepad {
        buttons: vec![
            GamepadButton {
                pressed: trigger,
                value: if trigger { 1.0 } else { 0.0 },
            },
            GamepadButton::default(),
        ],
        axes: vec![0.0, 0.0],
    }
}

/// One frame of the recording plus any interaction events preceding it.
fn script(
    scenario: Scenario,
    config: &FusionConfig,
    i: u64,
    frames: u64,
) -> (SimFrame, Vec<SpatialInputSource>, Vec<InteractionEvent>) {
    let t = i as f32 / frames.max(1) as f32;
    let mut frame = SimFrame::new(reference_space());
    let mut sources = Vec::new();
    let mut events = Vec::new();
    let wrist = left_wrist(t);

    match scenario {
        Scenario::Drag => {
            sources.push(frame.add_hand(LEFT_HAND, Handedness::Left, &SimHandPose::open(Hand::Left, wrist)));
            // Pinch for the middle 60% of the recording, sweeping end to end.
            let h = config.slider.half_length();
            let pinching = (0.2..0.8).contains(&t);
            let x = -h + 2.0 * h * ((t - 0.2) / 0.6).clamp(0.0, 1.0);
            let point = config.slider.panel.world_transform(&wrist) * Point3::new(x, 0.0, 0.0);
            let mut pose = SimHandPose::pinching_at(Hand::Right, point);
            if !pinching {
                pose = pose.released();
            }
            sources.push(frame.add_hand(RIGHT_HAND, Handedness::Right, &pose));
        }
        Scenario::AnchorSwitch => {
            sources.push(frame.add_hand(LEFT_HAND, Handedness::Left, &SimHandPose::open(Hand::Left, wrist)));
            sources.push(frame.add_controller(LEFT_CONTROLLER, Handedness::Left, wrist, pad(false)));
            if (0.33..0.66).contains(&t) {
                frame.fail_poses(LEFT_HAND);
            }
        }
        Scenario::Controller => {
            let trigger = (i / 20) % 2 == 1;
            sources.push(frame.add_controller(LEFT_CONTROLLER, Handedness::Left, wrist, pad(false)));
            sources.push(frame.add_controller(RIGHT_CONTROLLER, Handedness::Right, wrist, pad(trigger)));
            if i % 20 == 0 && i > 0 {
                let kind = if trigger {
                    InteractionKind::SelectStart
                } else {
                    InteractionKind::SelectEnd
                };
                events.push(InteractionEvent::new(kind, RIGHT_CONTROLLER, Handedness::Right));
            }
        }
    }
    (frame, sources, events)
}

fn load_config(cli: &Cli) -> anyhow::Result<FusionConfig> {
    let mut config = match &cli.config {
        Some(path) => FusionConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => FusionConfig::default(),
    };
    for raw in &cli.set {
        let applied = config
            .apply_sexp(raw)
            .with_context(|| format!("applying override {}", raw))?;
        info!("applied {} override(s) from {}", applied, raw);
    }
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("fusion-replay {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "xr_fusion=info,fusion_replay=info".into()),
        )
        .init();

    if cli.frames == 0 {
        bail!("--frames must be at least 1");
    }

    info!("fusion-replay v{} starting", env!("CARGO_PKG_VERSION"));
    info!("scenario: {:?}, frames: {}", cli.scenario, cli.frames);

    let config = load_config(&cli)?;
    info!("config: {}", config.config_sexp());

    let mut session = FusionSession::new(config.clone());
    let mut presenter = LogPresenter {
        status_every: cli.status_every,
        last_label: None,
    };

    session.handle_event(SessionEvent::Started);
    for i in 0..cli.frames {
        // The reference space resolves one frame after session start.
        if i == 1 {
            session.handle_event(SessionEvent::ReferenceSpace(Ok(reference_space())));
        }
        let (frame, sources, events) = script(cli.scenario, &config, i, cli.frames);
        for event in events {
            session.handle_event(SessionEvent::Interaction(event));
        }
        session.update(&sources, &frame, &mut presenter);
    }
    info!("final: {}", session.status_sexp());
    info!("timing: {}", session.timing().stats_sexp());
    session.handle_event(SessionEvent::Ended);

    info!("slider value: {:.3}", session.slider_value());
    Ok(())
}
