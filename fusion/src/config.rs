//! Aggregated fusion configuration and s-expression overrides.
//!
//! Overrides are plists such as `(:pinch-threshold-m 0.02 :drive-hand :left)`.
//! Only keys present are applied; unknown keys are ignored.  An override is
//! applied to a copy and committed only if the result validates.

use std::path::{Path, PathBuf};

use lexpr::Value;
use thiserror::Error;
use tracing::warn;

use crate::xr::anchor::AnchorConfig;
use crate::xr::gesture::GestureConfig;
use crate::xr::hand_tracking::Hand;
use crate::xr::pinch::PinchConfig;
use crate::xr::provider::ReferenceSpaceType;
use crate::xr::session::SessionConfig;
use crate::xr::slider::{GateConfig, SliderConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed s-expression: {0}")]
    Parse(String),
    #[error("bad value for :{key}: {value}")]
    BadValue { key: &'static str, value: String },
    #[error("inconsistent configuration: {0}")]
    Inconsistent(String),
}

/// Every tunable of the fusion layer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FusionConfig {
    pub pinch: PinchConfig,
    pub gesture: GestureConfig,
    pub slider: SliderConfig,
    pub gate: GateConfig,
    pub anchor: AnchorConfig,
    pub session: SessionConfig,
}

const CURL_KEYS: [&str; 5] = [
    "curl-thumb-m",
    "curl-index-m",
    "curl-middle-m",
    "curl-ring-m",
    "curl-pinky-m",
];

impl FusionConfig {
    /// Read a plist from `path` and apply it over the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::default();
        config.apply_sexp(&raw)?;
        Ok(config)
    }

    /// Apply a plist of overrides.  Returns the number of keys applied.
    pub fn apply_sexp(&mut self, raw: &str) -> Result<usize, ConfigError> {
        let value = lexpr::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let mut next = self.clone();
        let mut applied = 0;

        let mut float = |key: &'static str, slot: &mut f32| -> Result<(), ConfigError> {
            if let Some(raw) = get_keyword(&value, key) {
                *slot = raw
                    .parse::<f32>()
                    .map_err(|_| ConfigError::BadValue { key, value: raw.clone() })?;
                applied += 1;
            }
            Ok(())
        };

        float("pinch-threshold-m", &mut next.pinch.threshold_m)?;
        for (key, slot) in CURL_KEYS.iter().zip(next.gesture.curl_threshold_m.iter_mut()) {
            float(*key, slot)?;
        }
        float("palm-facing-threshold", &mut next.gesture.palm_facing_threshold)?;
        float("slider-min", &mut next.slider.min)?;
        float("slider-max", &mut next.slider.max)?;
        float("slider-initial", &mut next.slider.initial)?;
        float("track-length-m", &mut next.slider.track_length_m)?;
        float("knob-smoothing", &mut next.slider.knob_smoothing)?;

        if let Some(flip) = get_bool(&value, "flip-right-palm") {
            next.gesture.flip_right_palm = flip;
            applied += 1;
        }
        if let Some(required) = get_bool(&value, "require-trigger") {
            next.gate.require_trigger = required;
            applied += 1;
        }
        if let Some(raw) = get_keyword(&value, "trigger-button") {
            next.gate.trigger_button = raw.parse().map_err(|_| ConfigError::BadValue {
                key: "trigger-button",
                value: raw.clone(),
            })?;
            applied += 1;
        }
        if let Some(raw) = get_keyword(&value, "frame-budget-ms") {
            next.session.frame_budget_ms = raw.parse().map_err(|_| ConfigError::BadValue {
                key: "frame-budget-ms",
                value: raw.clone(),
            })?;
            applied += 1;
        }
        if let Some(raw) = get_keyword(&value, "timing-window") {
            next.session.timing_window = raw.parse().map_err(|_| ConfigError::BadValue {
                key: "timing-window",
                value: raw.clone(),
            })?;
            applied += 1;
        }
        if let Some(raw) = get_keyword(&value, "drive-hand") {
            next.gate.drive_hand = parse_hand("drive-hand", &raw)?;
            applied += 1;
        }
        if let Some(raw) = get_keyword(&value, "anchor-hand") {
            next.anchor.hand = parse_hand("anchor-hand", &raw)?;
            applied += 1;
        }
        if let Some(raw) = get_keyword(&value, "reference-space") {
            next.session.reference_space =
                ReferenceSpaceType::from_name(&raw).ok_or(ConfigError::BadValue {
                    key: "reference-space",
                    value: raw.clone(),
                })?;
            applied += 1;
        }

        if let Err(e) = next.validate() {
            warn!("Config: rejected override: {}", e);
            return Err(e);
        }
        *self = next;
        Ok(applied)
    }

    /// Reject values the fusion layer cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |name: &str, v: f32| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::Inconsistent(format!("{} must be positive, got {}", name, v)))
            }
        };

        positive("pinch threshold", self.pinch.threshold_m)?;
        for (key, t) in CURL_KEYS.iter().zip(self.gesture.curl_threshold_m) {
            positive(*key, t)?;
        }
        positive("track length", self.slider.track_length_m)?;

        let palm = self.gesture.palm_facing_threshold;
        if !(0.0..1.0).contains(&palm) {
            return Err(ConfigError::Inconsistent(format!(
                "palm facing threshold must be in [0, 1), got {}",
                palm
            )));
        }
        let s = &self.slider;
        if !(s.min.is_finite() && s.max.is_finite() && s.min < s.max) {
            return Err(ConfigError::Inconsistent(format!(
                "slider range [{}, {}] is empty",
                s.min, s.max
            )));
        }
        if !s.initial.is_finite() {
            return Err(ConfigError::Inconsistent(format!(
                "slider initial value must be finite, got {}",
                s.initial
            )));
        }
        if !(s.knob_smoothing > 0.0 && s.knob_smoothing <= 1.0) {
            return Err(ConfigError::Inconsistent(format!(
                "knob smoothing must be in (0, 1], got {}",
                s.knob_smoothing
            )));
        }
        let budget = self.session.frame_budget_ms;
        if !(budget.is_finite() && budget > 0.0) {
            return Err(ConfigError::Inconsistent(format!(
                "frame budget must be positive, got {}",
                budget
            )));
        }
        if self.session.timing_window == 0 {
            return Err(ConfigError::Inconsistent("timing window must hold at least one frame".into()));
        }
        Ok(())
    }

    /// Active values as a plist in the same key vocabulary `apply_sexp` reads.
    pub fn config_sexp(&self) -> String {
        let g = &self.gesture;
        let s = &self.slider;
        format!(
            "(:pinch-threshold-m {:.3} :curl-thumb-m {:.3} :curl-index-m {:.3} :curl-middle-m {:.3} :curl-ring-m {:.3} :curl-pinky-m {:.3} :palm-facing-threshold {:.2} :flip-right-palm {} :slider-min {:.2} :slider-max {:.2} :slider-initial {:.2} :track-length-m {:.3} :knob-smoothing {:.2} :drive-hand :{} :anchor-hand :{} :require-trigger {} :trigger-button {} :reference-space :{} :frame-budget-ms {:.3} :timing-window {})",
            self.pinch.threshold_m,
            g.curl_threshold_m[0],
            g.curl_threshold_m[1],
            g.curl_threshold_m[2],
            g.curl_threshold_m[3],
            g.curl_threshold_m[4],
            g.palm_facing_threshold,
            if g.flip_right_palm { "t" } else { "nil" },
            s.min,
            s.max,
            s.initial,
            s.track_length_m,
            s.knob_smoothing,
            self.gate.drive_hand.as_str(),
            self.anchor.hand.as_str(),
            if self.gate.require_trigger { "t" } else { "nil" },
            self.gate.trigger_button,
            self.session.reference_space.as_str(),
            self.session.frame_budget_ms,
            self.session.timing_window,
        )
    }
}

fn parse_hand(key: &'static str, raw: &str) -> Result<Hand, ConfigError> {
    Hand::from_name(raw).ok_or_else(|| ConfigError::BadValue {
        key,
        value: raw.to_string(),
    })
}

// ── Plist helpers ──────────────────────────────────────────

/// Look up `:key` in a plist and render its value as a string.
/// Keywords and `:`-prefixed symbols are returned without the colon.
fn get_keyword(value: &Value, key: &str) -> Option<String> {
    let prefixed = format!(":{}", key);
    let mut current = value;
    while let Value::Cons(pair) = current {
        let is_key = match pair.car() {
            Value::Keyword(k) => k.as_ref() == key,
            Value::Symbol(s) => s.as_ref() == prefixed,
            _ => false,
        };
        if is_key {
            let Value::Cons(next) = pair.cdr() else {
                return None;
            };
            let val = next.car();
            return match val {
                Value::Keyword(v) => Some(v.to_string()),
                Value::Symbol(v) => {
                    let s: &str = v;
                    Some(s.strip_prefix(':').unwrap_or(s).to_string())
                }
                Value::String(v) => Some(v.to_string()),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(if *b { "t" } else { "nil" }.to_string()),
                Value::Null | Value::Nil => Some("nil".to_string()),
                _ => Some(val.to_string()),
            };
        }
        current = pair.cdr();
    }
    None
}

/// Anything but `nil` is true.
fn get_bool(value: &Value, key: &str) -> Option<bool> {
    get_keyword(value, key).map(|s| s != "nil")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = FusionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pinch.threshold_m, 0.018);
        assert_eq!(config.gate.drive_hand, Hand::Right);
        assert_eq!(config.anchor.hand, Hand::Left);
        assert_eq!(config.session.reference_space, ReferenceSpaceType::LocalFloor);
        assert_eq!(config.session.frame_budget_ms, 1.0);
        assert_eq!(config.session.timing_window, 1000);
    }

    #[test]
    fn test_get_keyword_forms() {
        let v = lexpr::from_str("(:a 1 :b :left :c \"x\" :d nil)").unwrap();
        assert_eq!(get_keyword(&v, "a"), Some("1".to_string()));
        assert_eq!(get_keyword(&v, "b"), Some("left".to_string()));
        assert_eq!(get_keyword(&v, "c"), Some("x".to_string()));
        assert_eq!(get_bool(&v, "d"), Some(false));
        assert_eq!(get_keyword(&v, "missing"), None);
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = FusionConfig::default();
        let applied = config
            .apply_sexp("(:pinch-threshold-m 0.02 :curl-thumb-m 0.09 :drive-hand :left :anchor-hand :right :require-trigger t :trigger-button 1 :reference-space :stage :knob-smoothing 0.35)")
            .unwrap();
        assert_eq!(applied, 8);
        assert_eq!(config.pinch.threshold_m, 0.02);
        assert_eq!(config.gesture.curl_threshold_m[0], 0.09);
        assert_eq!(config.gate.drive_hand, Hand::Left);
        assert_eq!(config.anchor.hand, Hand::Right);
        assert!(config.gate.require_trigger);
        assert_eq!(config.gate.trigger_button, 1);
        assert_eq!(config.session.reference_space, ReferenceSpaceType::Stage);
        assert_eq!(config.slider.knob_smoothing, 0.35);
    }

    #[test]
    fn test_flip_right_palm_override() {
        let mut config = FusionConfig::default();
        config.apply_sexp("(:flip-right-palm nil)").unwrap();
        assert!(!config.gesture.flip_right_palm);
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let mut config = FusionConfig::default();
        assert_eq!(config.apply_sexp("(:frobnicate 3)").unwrap(), 0);
        assert_eq!(config, FusionConfig::default());
    }

    #[test]
    fn test_bad_value_rejected() {
        let mut config = FusionConfig::default();
        let err = config.apply_sexp("(:drive-hand :middle)").unwrap_err();
        assert!(matches!(err, ConfigError::BadValue { key: "drive-hand", .. }));
        let err = config.apply_sexp("(:slider-min \"low\")").unwrap_err();
        assert!(matches!(err, ConfigError::BadValue { key: "slider-min", .. }));
    }

    #[test]
    fn test_inconsistent_override_not_committed() {
        let mut config = FusionConfig::default();
        let err = config.apply_sexp("(:slider-min 1.0 :slider-max 0.5)").unwrap_err();
        assert!(matches!(err, ConfigError::Inconsistent(_)));
        assert_eq!(config, FusionConfig::default());

        assert!(config.apply_sexp("(:knob-smoothing 0)").is_err());
        assert!(config.apply_sexp("(:pinch-threshold-m -0.01)").is_err());
        assert!(config.apply_sexp("(:frame-budget-ms 0)").is_err());
        assert!(config.apply_sexp("(:timing-window 0)").is_err());
    }

    #[test]
    fn test_non_finite_initial_rejected() {
        let mut config = FusionConfig::default();
        for raw in ["(:slider-initial nan)", "(:slider-initial inf)"] {
            let err = config.apply_sexp(raw).unwrap_err();
            assert!(matches!(err, ConfigError::Inconsistent(_)), "{}", raw);
        }
        assert_eq!(config.slider.initial, 0.0);
    }

    #[test]
    fn test_timing_overrides() {
        let mut config = FusionConfig::default();
        let applied = config.apply_sexp("(:frame-budget-ms 2.5 :timing-window 120)").unwrap();
        assert_eq!(applied, 2);
        assert_eq!(config.session.frame_budget_ms, 2.5);
        assert_eq!(config.session.timing_window, 120);
        assert!(config.config_sexp().ends_with(":frame-budget-ms 2.500 :timing-window 120)"));
        assert!(matches!(
            config.apply_sexp("(:timing-window -3)"),
            Err(ConfigError::BadValue { key: "timing-window", .. })
        ));
    }

    #[test]
    fn test_parse_error() {
        let mut config = FusionConfig::default();
        assert!(matches!(config.apply_sexp("(:a"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_config_sexp_round_trips_through_apply() {
        let mut tuned = FusionConfig::default();
        tuned.apply_sexp("(:drive-hand :left :slider-max 1.5 :require-trigger t)").unwrap();

        let mut restored = FusionConfig::default();
        restored.apply_sexp(&tuned.config_sexp()).unwrap();
        assert_eq!(restored.gate, tuned.gate);
        assert_eq!(restored.slider.max, 1.5);
        assert!(tuned.config_sexp().contains(":reference-space :local-floor"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = FusionConfig::load(Path::new("/nonexistent/fusion.sexp")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
