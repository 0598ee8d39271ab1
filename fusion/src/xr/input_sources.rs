//! Logical input resolution.
//!
//! Turns the frame's raw source list into a handedness-keyed view
//! (left, right, controllers) and tracks the select latch and action flags
//! from discrete interaction events.  The logical view is rebuilt every
//! frame; the latch and flags change only on events.

use tracing::debug;

use super::hand_tracking::Hand;
use super::provider::{Handedness, SourceId, SpatialInputSource};

// ── Interaction events ─────────────────────────────────────

/// Two-state interaction events raised by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    SelectStart,
    SelectEnd,
    SqueezeStart,
    SqueezeEnd,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SelectStart => "select-start",
            Self::SelectEnd => "select-end",
            Self::SqueezeStart => "squeeze-start",
            Self::SqueezeEnd => "squeeze-end",
        }
    }
}

/// One interaction event tagged with its originating source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InteractionEvent {
    pub kind: InteractionKind,
    pub source: SourceId,
    pub handedness: Handedness,
}

impl InteractionEvent {
    pub fn new(kind: InteractionKind, source: SourceId, handedness: Handedness) -> Self {
        Self {
            kind,
            source,
            handedness,
        }
    }
}

// ── Select latch ───────────────────────────────────────────

/// Edge-triggered register holding the source of the active select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SelectLatch {
    active: Option<SourceId>,
}

impl SelectLatch {
    pub fn active(&self) -> Option<SourceId> {
        self.active
    }

    pub fn start(&mut self, source: SourceId) {
        self.active = Some(source);
    }

    /// Clear only if `source` is the one that set the latch.
    pub fn end(&mut self, source: SourceId) {
        if self.active == Some(source) {
            self.active = None;
        }
    }

    pub fn clear(&mut self) {
        self.active = None;
    }
}

// ── Action flags ───────────────────────────────────────────

/// Per-handedness select/squeeze held flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActionFlags {
    pub select: [bool; 3],
    pub squeeze: [bool; 3],
}

fn slot(handedness: Handedness) -> usize {
    match handedness {
        Handedness::Left => 0,
        Handedness::Right => 1,
        Handedness::None => 2,
    }
}

impl ActionFlags {
    pub fn select(&self, handedness: Handedness) -> bool {
        self.select[slot(handedness)]
    }

    pub fn squeeze(&self, handedness: Handedness) -> bool {
        self.squeeze[slot(handedness)]
    }

    pub fn apply(&mut self, event: &InteractionEvent) {
        let i = slot(event.handedness);
        match event.kind {
            InteractionKind::SelectStart => self.select[i] = true,
            InteractionKind::SelectEnd => self.select[i] = false,
            InteractionKind::SqueezeStart => self.squeeze[i] = true,
            InteractionKind::SqueezeEnd => self.squeeze[i] = false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// ── Logical input set ──────────────────────────────────────

/// Handedness-keyed view of one frame's sources.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LogicalInputSet {
    /// Hand if tracked, else the first left controller.
    pub left: Option<SourceId>,
    pub right: Option<SourceId>,
    /// Source of the active select, carried from the latch.
    pub pinch: Option<SourceId>,
    pub left_hand: Option<SourceId>,
    pub right_hand: Option<SourceId>,
    /// Every non-hand source, in runtime order.
    pub controllers: Vec<SourceId>,
}

impl LogicalInputSet {
    pub fn source_for(&self, hand: Hand) -> Option<SourceId> {
        match hand {
            Hand::Left => self.left,
            Hand::Right => self.right,
        }
    }

    /// The tracked-hand source for `hand`, ignoring controllers.
    pub fn hand_source(&self, hand: Hand) -> Option<SourceId> {
        match hand {
            Hand::Left => self.left_hand,
            Hand::Right => self.right_hand,
        }
    }

    pub fn status_sexp(&self) -> String {
        let id = |s: Option<SourceId>| s.map(|v| v.to_string()).unwrap_or_else(|| "nil".to_string());
        let controllers = if self.controllers.is_empty() {
            "nil".to_string()
        } else {
            let ids: Vec<String> = self.controllers.iter().map(|c| c.to_string()).collect();
            format!("({})", ids.join(" "))
        };
        format!(
            "(:left {} :right {} :pinch {} :controllers {})",
            id(self.left),
            id(self.right),
            id(self.pinch),
            controllers,
        )
    }
}

/// Resolve the frame's sources into a logical set.
///
/// The first hand per handedness wins and overrides any controller of the
/// same handedness.  Sources without handedness are only listed.
pub fn classify_sources(sources: &[SpatialInputSource], latch: &SelectLatch) -> LogicalInputSet {
    let mut set = LogicalInputSet {
        pinch: latch.active(),
        ..LogicalInputSet::default()
    };
    let mut left_ctrl = None;
    let mut right_ctrl = None;

    for source in sources {
        if source.is_hand() {
            match source.handedness {
                Handedness::Left => {
                    set.left_hand.get_or_insert(source.id);
                }
                Handedness::Right => {
                    set.right_hand.get_or_insert(source.id);
                }
                Handedness::None => {}
            }
            continue;
        }
        set.controllers.push(source.id);
        match source.handedness {
            Handedness::Left => {
                left_ctrl.get_or_insert(source.id);
            }
            Handedness::Right => {
                right_ctrl.get_or_insert(source.id);
            }
            Handedness::None => {}
        }
    }

    set.left = set.left_hand.or(left_ctrl);
    set.right = set.right_hand.or(right_ctrl);
    set
}

// ── State ──────────────────────────────────────────────────

/// Event-driven latch and flags plus the current frame's logical view.
#[derive(Debug, Default)]
pub struct InputState {
    pub latch: SelectLatch,
    pub flags: ActionFlags,
    pub logical: LogicalInputSet,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle_event(&mut self, event: &InteractionEvent) {
        self.flags.apply(event);
        match event.kind {
            InteractionKind::SelectStart => {
                self.latch.start(event.source);
                debug!("Select latched on source {}", event.source);
            }
            InteractionKind::SelectEnd => {
                let before = self.latch.active();
                self.latch.end(event.source);
                if before != self.latch.active() {
                    debug!("Select released on source {}", event.source);
                }
            }
            InteractionKind::SqueezeStart | InteractionKind::SqueezeEnd => {}
        }
    }

    /// Rebuild the logical view for this frame.
    pub fn classify(&mut self, sources: &[SpatialInputSource]) -> &LogicalInputSet {
        self.logical = classify_sources(sources, &self.latch);
        &self.logical
    }

    pub fn reset(&mut self) {
        self.latch.clear();
        self.flags.reset();
        self.logical = LogicalInputSet::default();
    }
}

// ── Test helpers ───────────────────────────────────────────

#[cfg(test)]
fn hand(id: SourceId, handedness: Handedness) -> SpatialInputSource {
    SpatialInputSource::tracked_hand(id, handedness, super::provider::JointTable::new())
}

#[cfg(test)]
fn ctrl(id: SourceId, handedness: Handedness) -> SpatialInputSource {
    SpatialInputSource::controller(id, handedness, Default::default())
}

// ── Tests ──────────────────────────────────────────────────
