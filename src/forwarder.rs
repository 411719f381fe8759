//! Forwarding-node state machine: hop selection, load accounting, path
//! labeling, and retransmission suppression

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{debug, trace};

use crate::config::ForwarderConfig;
use crate::label::PathLabel;
use crate::load::LoadTable;
use crate::{HopId, Prefix};

/// Per-node forwarding logic for named requests
///
/// One forwarder per outbound decision point. The surrounding node owns the
/// request tables and the transport; it reports forwarding opportunities and
/// terminal outcomes and applies the returned decisions. For every request
/// forwarded, the caller must report exactly one terminal outcome, either
/// [`on_response`](Self::on_response) or [`on_expire`](Self::on_expire), to
/// keep the pending counts meaningful.
pub struct Forwarder {
    table: LoadTable,
    /// Backoff state for requests that have been forwarded at least once
    suppression: FxHashMap<u64, SuppressionState>,
    config: ForwarderConfig,
    rng: StdRng,
}

/// Scope of the interface a request arrived on
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum IngressScope {
    /// An attached application: requests go to the first eligible hop
    Local,
    /// A network peer: requests are balanced across eligible hops by load
    NonLocal,
}

/// Outcome of a forwarding opportunity
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ForwardDecision {
    /// Forward the request to this hop
    Forward(HopId),
    /// A retransmission arrived inside its suppression interval; drop it
    /// without forwarding
    Suppress,
}

/// Errors that keep a request from being forwarded
#[derive(Debug, Error, Copy, Clone, Eq, PartialEq)]
pub enum ForwardError {
    /// No eligible next hop; the caller should answer with a no-route
    /// negative acknowledgement
    #[error("no eligible next hop")]
    NoRoute,
}

#[derive(Debug)]
struct SuppressionState {
    interval: Duration,
    last_forwarded: Instant,
}

impl Forwarder {
    /// Construct a forwarder from `config`
    pub fn new(config: ForwarderConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            table: LoadTable::new(config.smoothing),
            suppression: FxHashMap::default(),
            config,
            rng,
        }
    }

    /// Decide where to send the request identified by `request_id`
    ///
    /// `eligible` must already exclude hops failing the caller's forwarding
    /// policy (such as the downstream the request came from). On a
    /// [`ForwardDecision::Forward`] outcome the chosen hop's pending count
    /// has been incremented and its weight refreshed.
    pub fn forward_request(
        &mut self,
        request_id: u64,
        prefix: &Prefix,
        ingress: IngressScope,
        eligible: &[HopId],
        now: Instant,
    ) -> Result<ForwardDecision, ForwardError> {
        if let Some(state) = self.suppression.get(&request_id) {
            if now < state.last_forwarded + state.interval {
                debug!(request_id, %prefix, "retransmission suppressed");
                return Ok(ForwardDecision::Suppress);
            }
        }

        let hop = match ingress {
            IngressScope::Local => {
                let hop = *eligible.first().ok_or(ForwardError::NoRoute)?;
                self.table.ensure_entry(prefix, hop);
                hop
            }
            IngressScope::NonLocal => self
                .table
                .select_next_hop(prefix, eligible, &mut self.rng)
                .ok_or(ForwardError::NoRoute)?,
        };

        self.record_forwarded(request_id, now);
        self.table.increase_pending(prefix, hop);
        self.table.update_weight(prefix, hop);
        trace!(request_id, %prefix, %hop, "forwarding request");
        Ok(ForwardDecision::Forward(hop))
    }

    /// Account for the response satisfying `request_id`, arriving from
    /// `from`, and stamp its path label
    ///
    /// Returns the label the response should carry upstream: extended with
    /// this hop's digit when `from` belongs to the labeled interface class
    /// (raw id above the configured offset), otherwise passed through
    /// unchanged.
    pub fn on_response(
        &mut self,
        request_id: u64,
        prefix: &Prefix,
        from: HopId,
        label: Option<PathLabel>,
    ) -> Option<PathLabel> {
        self.suppression.remove(&request_id);
        self.table.decrease_pending(prefix, from);
        self.table.update_weight(prefix, from);

        if from.0 > self.config.label_offset {
            Some(PathLabel::push(label, from.0 - self.config.label_offset))
        } else {
            label
        }
    }

    /// Account for `request_id` expiring unanswered, with out-records toward
    /// each hop in `out_hops`
    pub fn on_expire(&mut self, request_id: u64, prefix: &Prefix, out_hops: &[HopId]) {
        self.suppression.remove(&request_id);
        for &hop in out_hops {
            self.table.decrease_pending(prefix, hop);
            self.table.update_weight(prefix, hop);
        }
    }

    /// The forwarder's load accounting, for instrumentation
    pub fn load_table(&self) -> &LoadTable {
        &self.table
    }

    fn record_forwarded(&mut self, request_id: u64, now: Instant) {
        let config = &self.config.suppression;
        self.suppression
            .entry(request_id)
            .and_modify(|state| {
                state.interval = state.interval.mul_f64(config.multiplier).min(config.max);
                state.last_forwarded = now;
            })
            .or_insert(SuppressionState {
                interval: config.initial,
                last_forwarded: now,
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn forwarder() -> Forwarder {
        let mut config = ForwarderConfig::default();
        config.rng_seed(9);
        Forwarder::new(config)
    }

    fn prefix() -> Prefix {
        Prefix::from("/video")
    }

    #[test]
    fn no_eligible_hop_is_a_routing_failure() {
        let mut fwd = forwarder();
        let result = fwd.forward_request(0, &prefix(), IngressScope::NonLocal, &[], Instant::now());
        assert_matches!(result, Err(ForwardError::NoRoute));

        let result = fwd.forward_request(0, &prefix(), IngressScope::Local, &[], Instant::now());
        assert_matches!(result, Err(ForwardError::NoRoute));
    }

    #[test]
    fn local_ingress_takes_the_first_eligible_hop() {
        let mut fwd = forwarder();
        let hops = [HopId(300), HopId(301)];
        for id in 0..10 {
            let decision = fwd
                .forward_request(id, &prefix(), IngressScope::Local, &hops, Instant::now())
                .unwrap();
            assert_eq!(decision, ForwardDecision::Forward(HopId(300)));
        }
    }

    #[test]
    fn forwarding_updates_pending_accounting() {
        let mut fwd = forwarder();
        let hop = HopId(300);
        fwd.forward_request(0, &prefix(), IngressScope::NonLocal, &[hop], Instant::now())
            .unwrap();
        assert_eq!(fwd.load_table().pending(&prefix(), hop), 1);

        fwd.on_response(0, &prefix(), hop, None);
        assert_eq!(fwd.load_table().pending(&prefix(), hop), 0);
    }

    #[test]
    fn responses_from_labeled_interfaces_are_stamped() {
        let mut fwd = forwarder();

        // Fresh label for the first labeled hop on the return path
        let label = fwd.on_response(0, &prefix(), HopId(260), None);
        assert_eq!(label, Some(PathLabel::first(4)));

        // Existing labels are extended positionally
        let label = fwd.on_response(1, &prefix(), HopId(259), Some(PathLabel::first(3)));
        assert_eq!(label.unwrap().hops(), vec![3, 3]);
    }

    #[test]
    fn responses_from_unlabeled_interfaces_pass_through() {
        let mut fwd = forwarder();
        assert_eq!(fwd.on_response(0, &prefix(), HopId(100), None), None);

        let label = Some(PathLabel::first(7));
        assert_eq!(fwd.on_response(1, &prefix(), HopId(256), label), label);
    }

    #[test]
    fn expiry_settles_every_out_record() {
        let mut fwd = forwarder();
        let a = HopId(300);
        let b = HopId(301);
        fwd.forward_request(0, &prefix(), IngressScope::Local, &[a], Instant::now())
            .unwrap();

        fwd.on_expire(0, &prefix(), &[a, b]);
        assert_eq!(fwd.load_table().pending(&prefix(), a), 0);
        // No prior forward toward b through this forwarder: transient
        // negative accounting is expected and tolerated
        assert_eq!(fwd.load_table().pending(&prefix(), b), -1);
    }

    #[test]
    fn retransmissions_back_off_exponentially() {
        let mut fwd = forwarder();
        let hops = [HopId(300)];
        let t0 = Instant::now();
        let ms = Duration::from_millis(1);

        let first = fwd
            .forward_request(0, &prefix(), IngressScope::NonLocal, &hops, t0)
            .unwrap();
        assert_matches!(first, ForwardDecision::Forward(_));

        // Inside the initial 10 ms interval
        let retx = fwd
            .forward_request(0, &prefix(), IngressScope::NonLocal, &hops, t0 + 5 * ms)
            .unwrap();
        assert_eq!(retx, ForwardDecision::Suppress);

        // Past the interval: forwarded, and the interval doubles to 20 ms
        let retx = fwd
            .forward_request(0, &prefix(), IngressScope::NonLocal, &hops, t0 + 11 * ms)
            .unwrap();
        assert_matches!(retx, ForwardDecision::Forward(_));

        let retx = fwd
            .forward_request(0, &prefix(), IngressScope::NonLocal, &hops, t0 + 26 * ms)
            .unwrap();
        assert_eq!(retx, ForwardDecision::Suppress);

        let retx = fwd
            .forward_request(0, &prefix(), IngressScope::NonLocal, &hops, t0 + 32 * ms)
            .unwrap();
        assert_matches!(retx, ForwardDecision::Forward(_));
    }

    #[test]
    fn terminal_outcomes_reset_suppression() {
        let mut fwd = forwarder();
        let hops = [HopId(300)];
        let t0 = Instant::now();

        fwd.forward_request(0, &prefix(), IngressScope::NonLocal, &hops, t0)
            .unwrap();
        fwd.on_response(0, &prefix(), HopId(300), None);

        // A fresh request reusing the id starts from a clean slate
        let decision = fwd
            .forward_request(0, &prefix(), IngressScope::NonLocal, &hops, t0 + Duration::from_millis(1))
            .unwrap();
        assert_matches!(decision, ForwardDecision::Forward(_));
    }
}
