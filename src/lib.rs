//! Protocol logic for multipath congestion control in name-based
//! request/response networks
//!
//! multipath-cc contains a fully deterministic implementation of the two
//! state machines that cooperate to keep a content-request network loaded
//! but not congested. It contains no networking code and does not get any
//! relevant timestamps from the operating system, which makes every decision
//! reproducible under a fixed random seed.
//!
//! The most important types are [`Flow`], the requester-side congestion
//! window controller that buckets RTT samples per forwarding path using the
//! [`PathLabel`] carried by each response, and [`Forwarder`], the
//! intermediate-node state machine that balances outstanding requests across
//! next hops in inverse proportion to their recent load and stamps return
//! traffic with the labels the requester consumes. Event scheduling,
//! request/response transport, timeout detection, and routing tables are the
//! caller's responsibility: the driver reports sends, responses, timeouts,
//! and forwarding opportunities, and applies the returned decisions.

#![warn(missing_docs)]
#![cfg_attr(test, allow(dead_code))]

use std::fmt;
use std::sync::Arc;

mod config;
pub mod congestion;
mod flow;
mod forwarder;
mod label;
mod load;
mod monitor;

pub use crate::config::{FlowConfig, ForwarderConfig, MonitorConfig, SuppressionConfig};
pub use crate::flow::Flow;
pub use crate::forwarder::{ForwardDecision, ForwardError, Forwarder, IngressScope};
pub use crate::label::PathLabel;
pub use crate::load::LoadTable;
pub use crate::monitor::RouteMonitor;

/// Identifies one next hop (an outbound interface) at a forwarding node
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct HopId(pub u64);

impl From<u64> for HopId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for HopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An opaque name prefix under which requests are aggregated for forwarding
///
/// Name parsing is owned by the transport; the core only needs a cheaply
/// clonable, hashable key to group per-hop load accounting by.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Prefix(Arc<str>);

impl Prefix {
    /// The prefix as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Prefix {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

impl From<String> for Prefix {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
