//! Per-path RTT tracking and probabilistic congestion verdicts

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::config::MonitorConfig;

/// RTT spreads below this are treated as indistinguishable
const DEGENERATE_SPREAD: f64 = 1e-4;

/// Sliding-window RTT tracker that turns recent samples into probabilistic
/// congestion verdicts for one forwarding path
///
/// Each path a flow's responses arrive over gets its own monitor, so
/// congestion is judged against that path's own recent RTT distribution
/// rather than a global threshold: parallel paths have structurally
/// different base latencies.
#[derive(Debug, Clone)]
pub struct RouteMonitor {
    config: Arc<MonitorConfig>,
    /// Bounded FIFO of the most recent RTT samples, in seconds
    samples: VecDeque<f64>,
    r_min: f64,
    r_max: f64,
    /// Most recently computed decrease probability
    pr: f64,
}

impl RouteMonitor {
    /// Construct an empty monitor reading shared tunables from `config`
    pub fn new(config: Arc<MonitorConfig>) -> Self {
        Self {
            samples: VecDeque::with_capacity(config.sample_window),
            r_min: f64::MAX,
            r_max: 0.0,
            pr: config.p_min,
            config,
        }
    }

    /// Record one RTT sample and decide whether it signals congestion
    ///
    /// Returns `false` unconditionally until the sample window has filled.
    /// Afterwards the verdict is drawn with probability `pr`, a RED-style
    /// linear function of where the newest sample sits between the window's
    /// minimum and maximum: the further the path drifts above its own recent
    /// best, the likelier the signal.
    pub fn observe(&mut self, rtt: Duration, rng: &mut impl Rng) -> bool {
        let rtt = rtt.as_secs_f64();
        if self.samples.len() < self.config.sample_window {
            self.samples.push_back(rtt);
            return false;
        }

        self.samples.pop_front();
        self.samples.push_back(rtt);
        // O(sample_window) rescan; the window is small
        self.r_min = rtt;
        self.r_max = rtt;
        for &sample in &self.samples {
            if sample < self.r_min {
                self.r_min = sample;
            }
            if sample > self.r_max {
                self.r_max = sample;
            }
        }

        let p_min = self.config.p_min;
        let spread = self.r_max - self.r_min;
        self.pr = if spread < DEGENERATE_SPREAD {
            p_min
        } else {
            p_min + (self.config.p_max() - p_min) * (rtt - self.r_min) / spread
        };

        rng.random::<f64>() <= self.pr
    }

    /// Most recently computed decrease probability
    pub fn decrease_probability(&self) -> f64 {
        self.pr
    }

    /// Whether enough samples have arrived for verdicts to be computed
    pub fn is_warm(&self) -> bool {
        self.samples.len() >= self.config.sample_window
    }
}
