//! Logic for adapting the number of requests a flow may keep outstanding

use std::any::Any;
use std::sync::Arc;

mod aimd;
mod bic;

pub use aimd::{Aimd, AimdConfig};
pub use bic::{Bic, BicConfig};

/// Common interface for different window adaptation algorithms
///
/// Windows are measured in outstanding requests rather than bytes: a flow
/// with window `w` may have up to `floor(w)` requests awaiting responses.
/// The flow translates each response into either a progress or a congestion
/// event based on the per-path RTT verdict; timeouts always count as
/// congestion.
pub trait Controller: Send + Sync {
    /// A response was delivered without a congestion signal
    fn on_progress(&mut self);

    /// A congestion signal was observed, either a probabilistic per-path RTT
    /// verdict or a request timeout
    fn on_congestion_event(&mut self);

    /// Number of requests that may be outstanding
    fn window(&self) -> f64;

    /// Initial window value
    fn initial_window(&self) -> f64;

    /// Retrieve implementation-specific counters for traces and
    /// instrumentation
    fn metrics(&self) -> ControllerMetrics {
        ControllerMetrics {
            congestion_window: self.window(),
            ssthresh: None,
        }
    }

    /// Returns Self for use in down-casting to extract implementation details
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

/// Common congestion controller metrics
#[derive(Debug, Default)]
#[non_exhaustive]
pub struct ControllerMetrics {
    /// Congestion window (requests)
    pub congestion_window: f64,
    /// Slow start threshold (requests), if the algorithm tracks one
    pub ssthresh: Option<f64>,
}

/// Constructs controllers on demand
pub trait ControllerFactory {
    /// Construct a fresh `Controller`
    fn build(self: Arc<Self>) -> Box<dyn Controller>;
}
