//! Per-stage timing of the fusion frame update.
//!
//! Keeps a rolling window of per-stage durations and counts frames whose
//! total exceeded the fusion budget.

/// Stages of one fusion frame, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Inputs,
    Hands,
    Gestures,
    Anchor,
    Gate,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Self::Inputs,
        Self::Hands,
        Self::Gestures,
        Self::Anchor,
        Self::Gate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inputs => "inputs",
            Self::Hands => "hands",
            Self::Gestures => "gestures",
            Self::Anchor => "anchor",
            Self::Gate => "gate",
        }
    }
}

/// Durations (ms) of each stage in one frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StageTimes {
    pub ms: [f64; 5],
}

impl StageTimes {
    pub fn set(&mut self, stage: Stage, ms: f64) {
        self.ms[stage as usize] = ms;
    }

    pub fn get(&self, stage: Stage) -> f64 {
        self.ms[stage as usize]
    }

    pub fn total(&self) -> f64 {
        self.ms.iter().sum()
    }
}

/// Rolling frame timing statistics over a window of samples.
#[derive(Debug)]
pub struct FrameTiming {
    /// Per-stage samples, indexed by `Stage`.
    pub stage_times: [Vec<f64>; 5],
    pub total_times: Vec<f64>,
    /// Maximum number of samples to keep.
    pub window_size: usize,
    pub total_frames: u64,
    /// Frames whose total exceeded `budget_ms`.
    pub missed_frames: u64,
    /// Fusion budget per frame in milliseconds.
    pub budget_ms: f64,
}

impl Default for FrameTiming {
    fn default() -> Self {
        Self::new(1000, 1.0)
    }
}

impl FrameTiming {
    pub fn new(window_size: usize, budget_ms: f64) -> Self {
        Self {
            stage_times: std::array::from_fn(|_| Vec::with_capacity(window_size)),
            total_times: Vec::with_capacity(window_size),
            window_size,
            total_frames: 0,
            missed_frames: 0,
            budget_ms,
        }
    }

    /// Record one frame's stage durations.
    pub fn record_frame(&mut self, times: &StageTimes) {
        let total = times.total();
        for stage in Stage::ALL {
            Self::push_sample(&mut self.stage_times[stage as usize], times.get(stage), self.window_size);
        }
        Self::push_sample(&mut self.total_times, total, self.window_size);

        self.total_frames += 1;
        if total > self.budget_ms {
            self.missed_frames += 1;
        }
    }

    fn push_sample(samples: &mut Vec<f64>, value: f64, window_size: usize) {
        samples.push(value);
        if samples.len() > window_size {
            samples.remove(0);
        }
    }

    /// Compute percentile from a sorted slice.
    fn percentile(sorted: &[f64], p: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }
        let idx = ((sorted.len() as f64 - 1.0) * p / 100.0).round() as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    fn sorted(samples: &[f64]) -> Vec<f64> {
        let mut v = samples.to_vec();
        v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        v
    }

    /// Get timing statistics as percentiles.
    pub fn stats(&self) -> FrameTimingStats {
        let total = Self::sorted(&self.total_times);
        let stage_p50 = std::array::from_fn(|i| Self::percentile(&Self::sorted(&self.stage_times[i]), 50.0));
        let stage_p99 = std::array::from_fn(|i| Self::percentile(&Self::sorted(&self.stage_times[i]), 99.0));

        FrameTimingStats {
            stage_p50,
            stage_p99,
            total_p50: Self::percentile(&total, 50.0),
            total_p95: Self::percentile(&total, 95.0),
            total_p99: Self::percentile(&total, 99.0),
            missed_pct: if self.total_frames > 0 {
                (self.missed_frames as f64 / self.total_frames as f64) * 100.0
            } else {
                0.0
            },
            total_frames: self.total_frames,
            missed_frames: self.missed_frames,
        }
    }

    /// Format stats as an s-expression.
    pub fn stats_sexp(&self) -> String {
        let s = self.stats();
        let mut out = String::from("(");
        for stage in Stage::ALL {
            out.push_str(&format!(":{}-p50 {:.3} ", stage.as_str(), s.stage_p50[stage as usize]));
        }
        out.push_str(&format!(
            ":total-p50 {:.3} :total-p99 {:.3} :missed-pct {:.1} :total-frames {} :missed-frames {})",
            s.total_p50, s.total_p99, s.missed_pct, s.total_frames, s.missed_frames,
        ));
        out
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.window_size, self.budget_ms);
    }
}

/// Computed frame timing statistics.
#[derive(Debug, Clone)]
pub struct FrameTimingStats {
    pub stage_p50: [f64; 5],
    pub stage_p99: [f64; 5],
    pub total_p50: f64,
    pub total_p95: f64,
    pub total_p99: f64,
    pub missed_pct: f64,
    pub total_frames: u64,
    pub missed_frames: u64,
}

#[cfg(test)]
fn times(ms: [f64; 5]) -> StageTimes {
    StageTimes { ms }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_stats() {
        let ft = FrameTiming::new(100, 1.0);
        let stats = ft.stats();
        assert_eq!(stats.total_frames, 0);
        assert_eq!(stats.missed_frames, 0);
        assert_eq!(stats.total_p50, 0.0);
    }

    #[test]
    fn test_record_frame() {
        let mut ft = FrameTiming::new(100, 1.0);
        ft.record_frame(&times([0.1, 0.2, 0.05, 0.02, 0.03]));
        assert_eq!(ft.total_frames, 1);
        assert_eq!(ft.missed_frames, 0);
        let stats = ft.stats();
        assert!((stats.total_p50 - 0.4).abs() < 1e-9);
        assert!((stats.stage_p50[Stage::Hands as usize] - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_missed_frame_detection() {
        let mut ft = FrameTiming::new(100, 1.0);
        ft.record_frame(&times([0.5, 0.5, 0.1, 0.0, 0.0])); // 1.1ms > 1.0ms budget
        assert_eq!(ft.missed_frames, 1);
        ft.record_frame(&times([0.1, 0.1, 0.1, 0.1, 0.1]));
        assert_eq!(ft.missed_frames, 1);
        assert_eq!(ft.total_frames, 2);
    }

    #[test]
    fn test_window_size_trim() {
        let mut ft = FrameTiming::new(5, 1.0);
        for i in 0..10 {
            ft.record_frame(&times([i as f64, 0.0, 0.0, 0.0, 0.0]));
        }
        assert_eq!(ft.stage_times[Stage::Inputs as usize].len(), 5);
        assert_eq!(ft.total_times.len(), 5);
        assert_eq!(ft.total_frames, 10);
        assert_eq!(ft.stage_times[0][0], 5.0);
    }

    #[test]
    fn test_stats_sexp_format() {
        let mut ft = FrameTiming::new(100, 1.0);
        ft.record_frame(&times([0.1, 0.2, 0.05, 0.02, 0.03]));
        let sexp = ft.stats_sexp();
        assert!(sexp.starts_with("(:inputs-p50 0.100 :hands-p50 0.200"));
        assert!(sexp.contains(":gate-p50 0.030"));
        assert!(sexp.contains(":total-frames 1"));
        assert!(sexp.ends_with(":missed-frames 0)"));
    }

    #[test]
    fn test_reset() {
        let mut ft = FrameTiming::new(10, 2.0);
        ft.record_frame(&times([3.0, 0.0, 0.0, 0.0, 0.0]));
        ft.reset();
        assert_eq!(ft.total_frames, 0);
        assert!(ft.total_times.is_empty());
        assert_eq!(ft.budget_ms, 2.0);
    }
}
