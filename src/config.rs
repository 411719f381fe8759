//! Parameters governing the requester and forwarder state machines

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::congestion::{self, ControllerFactory};

/// Parameters governing a requester-side [`Flow`](crate::Flow)
///
/// Default values reproduce the behavior the algorithms were tuned with:
/// AIMD window adaptation and a 30-sample per-path RTT window.
pub struct FlowConfig {
    pub(crate) congestion_controller_factory: Arc<dyn ControllerFactory + Send + Sync>,
    pub(crate) monitor: Arc<MonitorConfig>,
    pub(crate) rng_seed: Option<u64>,
}

impl FlowConfig {
    /// How to construct the flow's congestion controller
    ///
    /// Selected once at flow construction; see the [`congestion`] module.
    pub fn congestion_controller_factory(
        &mut self,
        factory: Arc<dyn ControllerFactory + Send + Sync>,
    ) -> &mut Self {
        self.congestion_controller_factory = factory;
        self
    }

    /// Tunables shared by all of the flow's per-path route monitors
    ///
    /// The same `Arc` may be handed to any number of flows; retuning
    /// [`MonitorConfig::set_p_max`] through it takes effect for all of them.
    pub fn monitor(&mut self, monitor: Arc<MonitorConfig>) -> &mut Self {
        self.monitor = monitor;
        self
    }

    /// Seed for the flow's random source
    ///
    /// Congestion verdicts are probabilistic; fixing the seed makes a flow's
    /// window trajectory reproducible given the same event sequence.
    pub fn rng_seed(&mut self, seed: u64) -> &mut Self {
        self.rng_seed = Some(seed);
        self
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            congestion_controller_factory: Arc::new(congestion::AimdConfig::default()),
            monitor: Arc::new(MonitorConfig::default()),
            rng_seed: None,
        }
    }
}

impl fmt::Debug for FlowConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowConfig")
            .field("monitor", &self.monitor)
            .field("rng_seed", &self.rng_seed)
            .finish_non_exhaustive()
    }
}

/// Tunables for per-path RTT monitoring
///
/// Shared by reference across all [`RouteMonitor`](crate::RouteMonitor)
/// instances of a flow (or of several flows), so that the maximum decrease
/// probability stays a single knob rather than per-path state.
pub struct MonitorConfig {
    pub(crate) sample_window: usize,
    pub(crate) p_min: f64,
    /// f64 bits; atomic so the knob can be retuned while monitors are live,
    /// with last-writer-wins semantics
    p_max_bits: AtomicU64,
}

impl MonitorConfig {
    /// Number of RTT samples a monitor holds before it starts producing
    /// verdicts
    pub fn sample_window(&mut self, value: usize) -> &mut Self {
        self.sample_window = value;
        self
    }

    /// Decrease probability assigned when a path's RTT spread is negligible
    pub fn p_min(&mut self, value: f64) -> &mut Self {
        self.p_min = value;
        self
    }

    /// Set the maximum decrease probability
    ///
    /// Takes effect immediately for every monitor reading this config.
    pub fn set_p_max(&self, value: f64) {
        self.p_max_bits.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Current maximum decrease probability
    pub fn p_max(&self) -> f64 {
        f64::from_bits(self.p_max_bits.load(Ordering::Relaxed))
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_window: 30,
            p_min: 1e-4,
            p_max_bits: AtomicU64::new(0.5f64.to_bits()),
        }
    }
}

impl Clone for MonitorConfig {
    fn clone(&self) -> Self {
        Self {
            sample_window: self.sample_window,
            p_min: self.p_min,
            p_max_bits: AtomicU64::new(self.p_max().to_bits()),
        }
    }
}

impl fmt::Debug for MonitorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorConfig")
            .field("sample_window", &self.sample_window)
            .field("p_min", &self.p_min)
            .field("p_max", &self.p_max())
            .finish()
    }
}

/// Parameters governing a [`Forwarder`](crate::Forwarder)
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    pub(crate) smoothing: f64,
    pub(crate) label_offset: u64,
    pub(crate) suppression: SuppressionConfig,
    pub(crate) rng_seed: Option<u64>,
}

impl ForwarderConfig {
    /// Exponential smoothing factor for per-hop outstanding-request averages
    ///
    /// The default of 0.9 gives roughly a ten-sample effective memory.
    pub fn smoothing(&mut self, value: f64) -> &mut Self {
        self.smoothing = value;
        self
    }

    /// Raw interface ids above this offset contribute a path-label digit of
    /// `id - offset` to forwarded responses; ids at or below it do not label
    ///
    /// Contributing ids must stay within `offset + 1 ..= offset + 9`: labels
    /// are positional base-10, so wider digits would corrupt the encoding.
    pub fn label_offset(&mut self, value: u64) -> &mut Self {
        self.label_offset = value;
        self
    }

    /// Retransmission suppression timing
    pub fn suppression(&mut self, value: SuppressionConfig) -> &mut Self {
        self.suppression = value;
        self
    }

    /// Seed for the forwarder's random source, fixing next-hop draws
    pub fn rng_seed(&mut self, seed: u64) -> &mut Self {
        self.rng_seed = Some(seed);
        self
    }
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            smoothing: 0.9,
            label_offset: 256,
            suppression: SuppressionConfig::default(),
            rng_seed: None,
        }
    }
}

/// Exponential backoff applied to retransmitted requests at a forwarder
///
/// The first retransmission forwarded for a request starts an interval;
/// further retransmissions inside the interval are dropped, and each one
/// forwarded multiplies the interval up to `max`.
#[derive(Debug, Clone)]
pub struct SuppressionConfig {
    pub(crate) initial: Duration,
    pub(crate) multiplier: f64,
    pub(crate) max: Duration,
}

impl SuppressionConfig {
    /// Suppression interval after the first forward of a request
    pub fn initial(&mut self, value: Duration) -> &mut Self {
        self.initial = value;
        self
    }

    /// Factor the interval grows by per forwarded retransmission
    pub fn multiplier(&mut self, value: f64) -> &mut Self {
        self.multiplier = value;
        self
    }

    /// Ceiling on the suppression interval
    pub fn max(&mut self, value: Duration) -> &mut Self {
        self.max = value;
        self
    }
}

impl Default for SuppressionConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(10),
            multiplier: 2.0,
            max: Duration::from_millis(250),
        }
    }
}
