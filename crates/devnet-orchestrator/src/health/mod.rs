//! Readiness verification.
//!
//! A [`Probe`] makes one attempt; [`poll_until`] repeats attempts until a
//! streak of successes or a timeout; the waiters pick the probe and timing
//! for each service from the cluster configuration.

mod poll;
mod probe;
mod waiters;

#[cfg(test)]
pub(crate) mod testing;

pub use poll::{poll_until, PollOptions, ProbeFailure};
pub use probe::{
    EngineHealthProbe, GraphqlCheck, GraphqlProbe, HttpProbe, Probe, TcpProbe, WebSocketProbe,
    ATTEMPT_TIMEOUT, TIP_HEIGHT_QUERY, TYPENAME_QUERY,
};
pub use waiters::{
    wait_for, wait_for_indexer, wait_for_indexer_engine_health, wait_for_node,
    wait_for_proof_server, MIN_SYNCED_HEIGHT,
};
