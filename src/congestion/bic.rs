use std::any::Any;
use std::sync::Arc;

use super::{Controller, ControllerFactory, ControllerMetrics};

/// Guard against equal-valued doubles when comparing the window against the
/// last known maximum
const BIC_EPSILON: f64 = 1e-5;

/// Binary increase congestion control
///
/// After a congestion event the window binary-searches toward the midpoint
/// between the last window that saw congestion and the post-cut window; once
/// it passes the old maximum with no known ceiling left it probes upward in
/// a slow-start-like phase. Below `low_window` it behaves exactly like
/// [`Aimd`](super::Aimd).
#[derive(Debug, Clone)]
pub struct Bic {
    config: Arc<BicConfig>,
    window: f64,
    /// Slow start threshold for the regular-TCP regime below `low_window`
    ssthresh: f64,
    /// Last window known to be safe (post-cut)
    min_win: f64,
    /// Last window that saw congestion; `f64::MAX` when no ceiling is known
    max_win: f64,
    /// Midpoint the binary search is converging toward
    target_win: f64,
    /// Per-response increment of the probing phase, doubled each time the
    /// probing target is reached
    ss_cwnd: f64,
    ss_target: f64,
    in_slow_start: bool,
}

impl Bic {
    /// Construct a state using the given `config`
    pub fn new(config: Arc<BicConfig>) -> Self {
        Self {
            window: config.initial_window,
            ssthresh: f64::MAX,
            min_win: 0.0,
            max_win: f64::MAX,
            target_win: f64::MAX,
            ss_cwnd: 0.0,
            ss_target: 0.0,
            in_slow_start: false,
            config,
        }
    }
}

impl Controller for Bic {
    fn on_progress(&mut self) {
        if self.window < self.config.low_window {
            // Regular TCP behavior below the threshold
            if self.window < self.ssthresh {
                self.window += 1.0;
            } else {
                self.window += 1.0 / self.window;
            }
        } else if !self.in_slow_start {
            if self.target_win - self.window < self.config.max_increment {
                // Binary search toward the target
                self.window += (self.target_win - self.window) / self.window;
            } else {
                // Additive increase, bounded by the increment cap
                self.window += self.config.max_increment / self.window;
            }
            if self.window + BIC_EPSILON < self.max_win {
                self.min_win = self.window;
                self.target_win = (self.max_win + self.min_win) / 2.0;
            } else {
                // Passed the old maximum; probe upward with no known ceiling
                self.in_slow_start = true;
                self.ss_cwnd = 1.0;
                self.ss_target = self.window + 1.0;
                self.max_win = f64::MAX;
            }
        } else {
            // Slow-start probing beyond the old maximum
            self.window += self.ss_cwnd / self.window;
            if self.window >= self.ss_target {
                self.ss_cwnd *= 2.0;
                self.ss_target = self.window + self.ss_cwnd;
            }
            if self.ss_cwnd >= self.config.max_increment {
                self.in_slow_start = false;
            }
        }
    }

    fn on_congestion_event(&mut self) {
        if self.window >= self.config.low_window {
            let prev_max = self.max_win;
            self.max_win = self.window;
            self.window *= self.config.beta;
            self.min_win = self.window;
            if prev_max > self.max_win {
                // Fast convergence: the ceiling dropped since the last
                // backoff, so release capacity by aiming lower
                self.max_win = (self.max_win + self.min_win) / 2.0;
            }
            self.target_win = (self.max_win + self.min_win) / 2.0;
        } else {
            // Regular TCP decrease, honoring the window floor
            self.ssthresh = (self.window * self.config.beta).max(self.config.minimum_window);
            self.window = self.ssthresh;
        }
    }

    fn window(&self) -> f64 {
        self.window
    }

    fn initial_window(&self) -> f64 {
        self.config.initial_window
    }

    fn metrics(&self) -> ControllerMetrics {
        ControllerMetrics {
            congestion_window: self.window,
            ssthresh: (self.ssthresh != f64::MAX).then_some(self.ssthresh),
        }
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Configuration for the [`Bic`] congestion controller
#[derive(Debug, Clone)]
pub struct BicConfig {
    pub(crate) beta: f64,
    pub(crate) initial_window: f64,
    pub(crate) minimum_window: f64,
    pub(crate) low_window: f64,
    pub(crate) max_increment: f64,
}

impl BicConfig {
    /// Multiplicative decrease factor applied on congestion events
    pub fn beta(&mut self, value: f64) -> &mut Self {
        self.beta = value;
        self
    }

    /// Window a fresh flow starts from
    pub fn initial_window(&mut self, value: f64) -> &mut Self {
        self.initial_window = value;
        self
    }

    /// Floor below which decreases cannot push the window
    pub fn minimum_window(&mut self, value: f64) -> &mut Self {
        self.minimum_window = value;
        self
    }

    /// Regular TCP behavior (including slow start) below this window
    pub fn low_window(&mut self, value: f64) -> &mut Self {
        self.low_window = value;
        self
    }

    /// Maximum linear increase per response. Should be between 8 and 64.
    pub fn max_increment(&mut self, value: f64) -> &mut Self {
        self.max_increment = value;
        self
    }
}

impl Default for BicConfig {
    fn default() -> Self {
        Self {
            beta: 0.8,
            initial_window: 1.0,
            minimum_window: 10.0,
            low_window: 14.0,
            max_increment: 16.0,
        }
    }
}

impl ControllerFactory for BicConfig {
    fn build(self: Arc<Self>) -> Box<dyn Controller> {
        Box::new(Bic::new(self))
    }
}
