//! Per-prefix, per-next-hop load accounting and weighted hop selection

use rand::Rng;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::{HopId, Prefix};

/// Outstanding-request accounting for the next hops of a forwarding node
///
/// Every forwarded request increments the chosen hop's pending count and
/// every terminal outcome decrements it; [`update_weight`](Self::update_weight)
/// folds the count into an exponentially smoothed average and derives the
/// inverse-load weight used for next-hop selection. Counts may transiently
/// go negative when increments and decrements interleave across asynchronous
/// request lifecycles; the noise is bounded and self-correcting, and
/// clamping it would bias the smoothed average, so it is left alone.
#[derive(Debug)]
pub struct LoadTable {
    entries: FxHashMap<(Prefix, HopId), LoadEntry>,
    smoothing: f64,
}

#[derive(Debug)]
struct LoadEntry {
    pending: i64,
    avg_pending: f64,
    weight: f64,
}

impl Default for LoadEntry {
    fn default() -> Self {
        Self {
            pending: 0,
            avg_pending: 0.0,
            weight: 1.0,
        }
    }
}

impl LoadTable {
    /// Construct an empty table with the given smoothing factor
    pub fn new(smoothing: f64) -> Self {
        Self {
            entries: FxHashMap::default(),
            smoothing,
        }
    }

    fn entry(&mut self, prefix: &Prefix, hop: HopId) -> &mut LoadEntry {
        self.entries.entry((prefix.clone(), hop)).or_default()
    }

    /// Idempotently initialize accounting for `(prefix, hop)`
    pub fn ensure_entry(&mut self, prefix: &Prefix, hop: HopId) {
        self.entry(prefix, hop);
    }

    /// Record one more outstanding request toward `hop`
    pub fn increase_pending(&mut self, prefix: &Prefix, hop: HopId) {
        self.entry(prefix, hop).pending += 1;
    }

    /// Record one terminal outcome for a request toward `hop`
    pub fn decrease_pending(&mut self, prefix: &Prefix, hop: HopId) {
        self.entry(prefix, hop).pending -= 1;
    }

    /// Fold the current pending count into the smoothed average and refresh
    /// the selection weight
    pub fn update_weight(&mut self, prefix: &Prefix, hop: HopId) {
        let smoothing = self.smoothing;
        let entry = self.entry(prefix, hop);
        entry.avg_pending =
            smoothing * entry.avg_pending + (1.0 - smoothing) * entry.pending as f64;
        // Inverse-load weighting; hops with little recent load saturate at
        // weight 1, so weights never exceed 1 and never divide by zero
        entry.weight = 1.0 / entry.avg_pending.max(1.0);
    }

    /// Current selection weight of `(prefix, hop)`
    pub fn weight(&self, prefix: &Prefix, hop: HopId) -> f64 {
        self.entries
            .get(&(prefix.clone(), hop))
            .map_or(1.0, |entry| entry.weight)
    }

    /// Smoothed outstanding-request average of `(prefix, hop)`
    pub fn avg_pending(&self, prefix: &Prefix, hop: HopId) -> f64 {
        self.entries
            .get(&(prefix.clone(), hop))
            .map_or(0.0, |entry| entry.avg_pending)
    }

    /// Momentary outstanding-request count of `(prefix, hop)`
    pub fn pending(&self, prefix: &Prefix, hop: HopId) -> i64 {
        self.entries
            .get(&(prefix.clone(), hop))
            .map_or(0, |entry| entry.pending)
    }

    /// Pick a next hop for `prefix` among `eligible`
    ///
    /// Standard weighted roulette over the eligible hops in slice order, so
    /// a fixed `rng` seed reproduces the same choice. A single eligible hop
    /// is returned without consulting the rng; zero eligible hops yield
    /// `None`, which the caller must surface as a no-route failure.
    pub fn select_next_hop(
        &mut self,
        prefix: &Prefix,
        eligible: &[HopId],
        rng: &mut impl Rng,
    ) -> Option<HopId> {
        match eligible {
            [] => None,
            &[hop] => {
                self.ensure_entry(prefix, hop);
                Some(hop)
            }
            hops => {
                let mut total = 0.0;
                for &hop in hops {
                    self.ensure_entry(prefix, hop);
                    total += self.weight(prefix, hop);
                }

                let r = rng.random::<f64>();
                let mut cumulative = 0.0;
                for &hop in hops {
                    cumulative += self.weight(prefix, hop) / total;
                    if r < cumulative {
                        trace!(%prefix, %hop, "selected next hop");
                        return Some(hop);
                    }
                }
                // Rounding can leave the cumulative sum a hair under 1.0
                hops.last().copied()
            }
        }
    }
}
