//! Transport abstraction for delivering packed envelopes.
//!
//! The protocol layer produces and consumes opaque envelope bytes; how they
//! reach the peer is a deployment concern. [`Transport`] is the seam where a
//! network stack plugs in. [`LoopbackTransport`] is the in-process
//! implementation used by tests and single-host setups: each peer gets a
//! FIFO queue of delivered envelopes.

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::Result;
use dashmap::DashMap;
use tracing::trace;

/// Delivers packed envelopes to peers by identifier.
pub trait Transport: Send + Sync {
    /// Sends envelope bytes to the peer with the given identifier.
    fn send(&self, peer: &str, envelope: &[u8]) -> Result<()>;
}

/// In-process transport backed by per-peer FIFO queues.
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    queues: DashMap<String, Mutex<VecDeque<Vec<u8>>>>,
}

impl LoopbackTransport {
    /// Creates an empty loopback transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pops the oldest undelivered envelope for `peer`, if any.
    pub fn receive(&self, peer: &str) -> Option<Vec<u8>> {
        let queue = self.queues.get(peer)?;
        let mut queue = queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        queue.pop_front()
    }

    /// Number of undelivered envelopes for `peer`.
    pub fn pending_for(&self, peer: &str) -> usize {
        self.queues
            .get(peer)
            .map(|queue| {
                queue
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .len()
            })
            .unwrap_or(0)
    }
}

impl Transport for LoopbackTransport {
    fn send(&self, peer: &str, envelope: &[u8]) -> Result<()> {
        trace!(peer, bytes = envelope.len(), "Queueing envelope");
        self.queues
            .entry(peer.to_string())
            .or_default()
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push_back(envelope.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_and_receive() {
        let transport = LoopbackTransport::new();
        transport.send("peer-a", b"first").unwrap();
        transport.send("peer-a", b"second").unwrap();

        assert_eq!(transport.pending_for("peer-a"), 2);
        assert_eq!(transport.receive("peer-a").unwrap(), b"first");
        assert_eq!(transport.receive("peer-a").unwrap(), b"second");
        assert!(transport.receive("peer-a").is_none());
    }

    #[test]
    fn test_queues_are_per_peer() {
        let transport = LoopbackTransport::new();
        transport.send("peer-a", b"for a").unwrap();

        assert!(transport.receive("peer-b").is_none());
        assert_eq!(transport.pending_for("peer-b"), 0);
        assert_eq!(transport.receive("peer-a").unwrap(), b"for a");
    }
}
