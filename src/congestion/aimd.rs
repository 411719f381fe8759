use std::any::Any;
use std::sync::Arc;

use super::{Controller, ControllerFactory, ControllerMetrics};

/// Additive-increase/multiplicative-decrease window adaptation, as widely
/// used for TCP
///
/// Grows by one request per delivered response during slow start and by
/// roughly one request per round trip afterwards. Congestion events cut the
/// window by the configured `beta`, never below the configured floor.
#[derive(Debug, Clone)]
pub struct Aimd {
    config: Arc<AimdConfig>,
    /// Number of requests that may be outstanding
    window: f64,
    /// Boundary between slow start and congestion avoidance. Starts
    /// effectively unbounded so a fresh flow stays in slow start until the
    /// first congestion event.
    ssthresh: f64,
}

impl Aimd {
    /// Construct a state using the given `config`
    pub fn new(config: Arc<AimdConfig>) -> Self {
        Self {
            window: config.initial_window,
            ssthresh: f64::MAX,
            config,
        }
    }
}

impl Controller for Aimd {
    fn on_progress(&mut self) {
        if self.window < self.ssthresh {
            // Slow start
            self.window += 1.0;
        } else {
            // Congestion avoidance, approximately one request per round trip
            self.window += 1.0 / self.window;
        }
    }

    fn on_congestion_event(&mut self) {
        self.ssthresh = (self.window * self.config.beta).max(self.config.minimum_window);
        self.window = self.ssthresh;
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

/// Configuration for the [`Aimd`] congestion controller
#[derive(Debug, Clone)]
pub struct AimdConfig {
    pub(crate) beta: f64,
    pub(crate) initial_window: f64,
    pub(crate) minimum_window: f64,
}

impl AimdConfig {
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
}

impl Default for AimdConfig {
    fn default() -> Self {
        Self {
            beta: 0.8,
            initial_window: 1.0,
            minimum_window: 10.0,
        }
    }
}

impl ControllerFactory for AimdConfig {
    fn build(self: Arc<Self>) -> Box<dyn Controller> {
        Box::new(Aimd::new(self))
    }
}
