//! XR input fusion: hand snapshots, gestures, anchoring, and the drag gate.
//!
//! Provides:
//! - `provider`: the runtime seam (`TrackingFrame`, input sources, poses)
//! - `hand_tracking`: 25-joint all-or-nothing hand snapshots
//! - `gesture` / `pinch`: per-hand classification
//! - `input_sources`: logical source set and select latch
//! - `anchor` / `slider`: panel anchoring and the drag-gated slider
//! - `session`: per-session context driving all of the above
//! - `sim`: scripted runtime used by tests and `fusion-replay`

pub mod provider;
pub mod hand_tracking;
pub mod gesture;
pub mod pinch;
pub mod input_sources;
pub mod anchor;
pub mod slider;
pub mod hud;
pub mod frame_timing;
pub mod session;
pub mod sim;

pub use hand_tracking::{Hand, HandJoint, HandSnapshot, TrackedHand};
pub use provider::{ReferenceSpace, ReferenceSpaceType, SpatialInputSource, TrackingFrame};
pub use session::{FrameReport, FusionSession, Presenter, SessionEvent, SessionPhase};
