//! Correlation engine: matching inbound frames to the requests and
//! discovery windows waiting for them.
//!
//! - [`ObserverRegistry`] - every decoded frame is offered to every observer
//! - [`Correlator`] - one request, one response, one deadline
//! - [`DiscoveryWindow`] - many node descriptors over a timed window

mod discovery;
mod pending;
mod registry;

pub use discovery::{
    discover, parse_discovery_timeout, window_length, DiscoveryWindow, DEFAULT_DISCOVERY_GRACE,
};
pub use pending::{command_outcome, delivery_outcome, Correlator, ResponseObserver};
pub use registry::{Disposition, Observer, ObserverGuard, ObserverRegistry};
