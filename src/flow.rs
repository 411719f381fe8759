//! Requester-side congestion window state machine

use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use crate::config::{FlowConfig, MonitorConfig};
use crate::congestion::{Controller, ControllerMetrics};
use crate::label::PathLabel;
use crate::monitor::RouteMonitor;

/// Window state machine for one flow of named requests
///
/// Tracks outstanding requests, buckets RTT samples per forwarding path
/// using the label carried by each response, and drives the configured
/// congestion controller with the per-path verdicts. Contains no networking
/// or timer code: the driver reports sends, responses, and timeouts, and
/// polls [`can_send`](Self::can_send) to schedule the next request.
pub struct Flow {
    controller: Box<dyn Controller>,
    /// Lazily created per-path monitors, keyed by the opaque label value
    monitors: FxHashMap<PathLabel, RouteMonitor>,
    /// Sequence number to send timestamp, for RTT computation
    pending: FxHashMap<u64, Instant>,
    in_flight: u64,
    monitor_config: Arc<MonitorConfig>,
    rng: StdRng,
}

impl Flow {
    /// Construct a fresh flow from `config`
    pub fn new(config: &FlowConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            controller: config.congestion_controller_factory.clone().build(),
            monitors: FxHashMap::default(),
            pending: FxHashMap::default(),
            in_flight: 0,
            monitor_config: config.monitor.clone(),
            rng,
        }
    }

    /// Record that the request numbered `seq` was sent at `now`
    pub fn on_send(&mut self, seq: u64, now: Instant) {
        self.pending.insert(seq, now);
        self.in_flight += 1;
    }

    /// Process the response for `seq`, received at `now` over the path
    /// described by `label`
    ///
    /// A response without a label still settles the request but contributes
    /// no RTT sample and leaves the window untouched. A response for a
    /// sequence number with no pending record (a duplicate terminal event)
    /// is dropped entirely, keeping the in-flight count from being
    /// decremented twice.
    pub fn on_response(&mut self, seq: u64, label: Option<PathLabel>, now: Instant) {
        let Some(sent) = self.pending.remove(&seq) else {
            debug!(seq, "response for unknown request");
            return;
        };
        self.in_flight = self.in_flight.saturating_sub(1);

        let Some(label) = label else {
            warn!(seq, "response carried no path label");
            return;
        };

        let rtt = now.saturating_duration_since(sent);
        let monitor = self
            .monitors
            .entry(label)
            .or_insert_with(|| RouteMonitor::new(self.monitor_config.clone()));
        if monitor.observe(rtt, &mut self.rng) {
            self.controller.on_congestion_event();
            trace!(
                path = %label,
                window = self.controller.window(),
                "congestion verdict, window decreased"
            );
        } else {
            self.controller.on_progress();
        }
    }

    /// Process a retransmission timeout for `seq`
    ///
    /// Timeouts always count as congestion, whether or not the request is
    /// still tracked; only the in-flight count is guarded by the pending
    /// record.
    pub fn on_timeout(&mut self, seq: u64) {
        if self.pending.remove(&seq).is_some() {
            self.in_flight = self.in_flight.saturating_sub(1);
        } else {
            debug!(seq, "timeout for unknown request");
        }
        self.controller.on_congestion_event();
        trace!(window = self.controller.window(), "timeout, window decreased");
    }

    /// Process a negative acknowledgement for `seq`
    ///
    /// Negative acknowledgements are handled by the transport; no window
    /// logic is attached here.
    pub fn on_nack(&mut self, seq: u64) {
        trace!(seq, "negative acknowledgement passed through");
    }

    /// Whether the window has headroom for another request
    pub fn can_send(&self) -> bool {
        (self.in_flight as f64) < self.controller.window().floor()
    }

    /// Current congestion window
    pub fn window(&self) -> f64 {
        self.controller.window()
    }

    /// Requests sent but not yet resolved
    pub fn in_flight(&self) -> u64 {
        self.in_flight
    }

    /// Number of distinct forwarding paths observed so far
    pub fn path_count(&self) -> usize {
        self.monitors.len()
    }

    /// Congestion controller counters
    pub fn metrics(&self) -> ControllerMetrics {
        self.controller.metrics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn flow() -> Flow {
        let mut config = FlowConfig::default();
        config.rng_seed(42);
        Flow::new(&config)
    }

    fn drive(flow: &mut Flow, seqs: std::ops::Range<u64>, label: Option<PathLabel>, now: Instant) {
        for seq in seqs {
            flow.on_send(seq, now);
            flow.on_response(seq, label, now + Duration::from_millis(20));
        }
    }

    #[test]
    fn labeled_responses_grow_the_window() {
        let mut flow = flow();
        let now = Instant::now();

        // Default monitors stay in warm-up for 30 samples, so every verdict
        // here is "not congested" and slow start adds one per response
        drive(&mut flow, 0..5, Some(PathLabel::first(3)), now);

        assert_eq!(flow.window(), 6.0);
        assert_eq!(flow.in_flight(), 0);
        assert_eq!(flow.path_count(), 1);
    }

    #[test]
    fn unlabeled_response_settles_without_sampling() {
        let mut flow = flow();
        let now = Instant::now();

        flow.on_send(0, now);
        flow.on_response(0, None, now + Duration::from_millis(20));

        assert_eq!(flow.window(), 1.0);
        assert_eq!(flow.in_flight(), 0);
        assert_eq!(flow.path_count(), 0);
    }

    #[test]
    fn duplicate_response_is_idempotent() {
        let mut flow = flow();
        let now = Instant::now();
        let label = Some(PathLabel::first(3));

        flow.on_send(0, now);
        flow.on_send(1, now);
        flow.on_response(0, label, now + Duration::from_millis(20));
        assert_eq!(flow.in_flight(), 1);

        // Duplicate delivery: no double decrement, no extra sample
        flow.on_response(0, label, now + Duration::from_millis(25));
        assert_eq!(flow.in_flight(), 1);
        assert_eq!(flow.window(), 2.0);
    }

    #[test]
    fn response_for_unknown_request_is_ignored() {
        let mut flow = flow();
        flow.on_response(99, Some(PathLabel::first(3)), Instant::now());
        assert_eq!(flow.in_flight(), 0);
        assert_eq!(flow.window(), 1.0);
        assert_eq!(flow.path_count(), 0);
    }

    #[test]
    fn timeout_decreases_even_when_untracked() {
        let mut flow = flow();
        let now = Instant::now();
        drive(&mut flow, 0..19, Some(PathLabel::first(3)), now);
        assert_eq!(flow.window(), 20.0);

        // Never-sent sequence number: window still cut, in-flight untouched
        flow.on_timeout(1000);
        assert_eq!(flow.window(), 16.0);
        assert_eq!(flow.metrics().ssthresh, Some(16.0));
        assert_eq!(flow.in_flight(), 0);
    }

    #[test]
    fn timeout_settles_pending_request() {
        let mut flow = flow();
        let now = Instant::now();

        flow.on_send(0, now);
        assert_eq!(flow.in_flight(), 1);
        flow.on_timeout(0);
        assert_eq!(flow.in_flight(), 0);

        // The terminal event already happened; a late response is a no-op
        flow.on_response(0, Some(PathLabel::first(3)), now + Duration::from_secs(4));
        assert_eq!(flow.in_flight(), 0);
        assert_eq!(flow.path_count(), 0);
    }

    #[test]
    fn distinct_labels_get_distinct_monitors() {
        let mut flow = flow();
        let now = Instant::now();

        drive(&mut flow, 0..3, Some(PathLabel::first(3)), now);
        drive(&mut flow, 3..6, Some(PathLabel::first(7)), now);
        drive(&mut flow, 6..9, Some(PathLabel::first(3).extend(7)), now);

        assert_eq!(flow.path_count(), 3);
    }

    #[test]
    fn can_send_tracks_window_headroom() {
        let mut flow = flow();
        let now = Instant::now();

        assert!(flow.can_send());
        flow.on_send(0, now);
        assert!(!flow.can_send());

        flow.on_response(0, Some(PathLabel::first(3)), now + Duration::from_millis(20));
        // Window grew to 2: room for two more
        assert!(flow.can_send());
        flow.on_send(1, now);
        assert!(flow.can_send());
        flow.on_send(2, now);
        assert!(!flow.can_send());
    }

    #[test]
    fn nack_leaves_window_untouched() {
        let mut flow = flow();
        flow.on_send(0, Instant::now());
        flow.on_nack(0);
        assert_eq!(flow.window(), 1.0);
        assert_eq!(flow.in_flight(), 1);
    }
}
