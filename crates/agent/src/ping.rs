//! Trust-ping handler: liveness checks between agents.
//!
//! A trust ping proves that the peer behind an identifier is alive and in
//! possession of its private key. The handler tracks every outstanding ping
//! in a concurrent table and guarantees exactly one terminal transition per
//! entry (`Pending` → `Success` | `Timeout` | `Mismatch`), no matter how a
//! pong arrival, a timeout sweep, and a cancellation race.
//!
//! ## Flow
//!
//! ```text
//! start_ping ──► Pending ──┬─ matching pong ────► Success
//!                          ├─ wrong sender ─────► Mismatch
//!                          └─ deadline / cancel ► Timeout
//! ```
//!
//! The handler never performs network I/O: `start_ping` returns the packed
//! envelope for the caller to send, and `handle_inbound` returns the reply
//! envelope (if any) for the caller to send. Terminal entries are evicted
//! from the table; the caller's [`PingHandle`] shares the entry and keeps
//! the outcome observable after eviction. A pong that finds no live entry
//! is a stray: discarded, but surfaced as an observability event.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, warn};

use protocol::{
    pack, unpack, validate, Confidentiality, KeyDirectory, KeyPair, Mode, PingMessage,
    PongMessage, ProtocolMessage, Result,
};

/// Fallback expiry for pings started without an explicit timeout.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// State machine
// ============================================================================

/// Lifecycle state of an outstanding ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingState {
    /// Ping sent, awaiting the pong.
    Pending,
    /// A pong from the expected sender arrived in time.
    Success,
    /// The deadline elapsed (or the caller cancelled) before a pong arrived.
    Timeout,
    /// A pong arrived, but its verified sender was not the ping's target.
    Mismatch,
}

impl PingState {
    /// Whether this state is terminal.
    pub fn is_terminal(self) -> bool {
        !matches!(self, PingState::Pending)
    }
}

/// Tracking entry shared between the pending table and the caller's handle.
#[derive(Debug)]
struct PingEntry {
    /// Message id of the ping (equals the expected pong thread id).
    id: String,
    /// Identifier the ping was addressed to.
    target: String,
    /// Instant past which the entry times out.
    deadline: Instant,
    /// Current state; transitions are serialized by the mutex.
    state: Mutex<PingState>,
}

impl PingEntry {
    /// Moves the entry to `terminal` if it is still `Pending`.
    ///
    /// Returns whether this call performed the transition. At most one call
    /// ever returns `true` for a given entry.
    fn resolve(&self, terminal: PingState) -> bool {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if *state == PingState::Pending {
            *state = terminal;
            true
        } else {
            false
        }
    }

    fn state(&self) -> PingState {
        *self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Caller-side view of an outstanding ping.
///
/// Shares state with the handler's tracking table, so the outcome stays
/// observable after the table evicts the entry.
#[derive(Debug, Clone)]
pub struct PingHandle {
    entry: Arc<PingEntry>,
}

impl PingHandle {
    /// Message id of the ping.
    pub fn id(&self) -> &str {
        &self.entry.id
    }

    /// Identifier the ping was addressed to.
    pub fn target(&self) -> &str {
        &self.entry.target
    }

    /// Instant past which the ping times out.
    pub fn deadline(&self) -> Instant {
        self.entry.deadline
    }

    /// Current state of the ping.
    pub fn state(&self) -> PingState {
        self.entry.state()
    }

    /// Whether the ping has reached a terminal state.
    pub fn is_resolved(&self) -> bool {
        self.state().is_terminal()
    }
}

/// What `handle_inbound` decided about an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    /// An inbound ping was answered; send these envelope bytes back.
    Reply(Vec<u8>),
    /// An inbound ping was dropped (no authenticated sender to answer).
    NoReply,
    /// A pong resolved the outstanding ping with this thread id to success.
    Resolved {
        /// Thread id of the resolved ping.
        thread_id: String,
    },
    /// A pong arrived whose verified sender was not the ping's target.
    Mismatched {
        /// Thread id of the affected ping.
        thread_id: String,
        /// Verified sender of the offending pong, if authenticated.
        sender: Option<String>,
    },
    /// A pong matched no live pending entry and was discarded.
    Stray {
        /// Thread id the pong claimed.
        thread_id: String,
    },
}

// ============================================================================
// Handler
// ============================================================================

/// Tracks outstanding trust pings and answers inbound ones.
pub struct TrustPingHandler {
    /// Local key material; index 0 signs outbound envelopes, all entries
    /// are candidate decryption keys for inbound ones.
    keys: Vec<KeyPair>,
    /// Resolves peer identifiers to public keys.
    directory: Arc<dyn KeyDirectory>,
    /// Outstanding pings by message id. Entries leave on terminal transition.
    pending: DashMap<String, Arc<PingEntry>>,
    /// Expiry applied when `start_ping` gets no explicit timeout.
    default_timeout: Duration,
}

impl TrustPingHandler {
    /// Creates a handler signing as `identity` and resolving peers through
    /// `directory`.
    pub fn new(identity: KeyPair, directory: Arc<dyn KeyDirectory>) -> Self {
        Self {
            keys: vec![identity],
            directory,
            pending: DashMap::new(),
            default_timeout: DEFAULT_PING_TIMEOUT,
        }
    }

    /// Overrides the default ping timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Adds an extra local key accepted for inbound decryption.
    pub fn add_decryption_key(&mut self, key: KeyPair) {
        self.keys.push(key);
    }

    /// Identifier this handler signs as.
    pub fn identifier(&self) -> String {
        self.keys[0].identifier()
    }

    /// Number of pings currently awaiting a pong.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Starts a trust ping to `target`.
    ///
    /// Returns the tracking handle and the packed envelope bytes to send
    /// (authenticated-encrypted to the target's key). With `expect_response`
    /// false the handle resolves to [`PingState::Success`] immediately and
    /// nothing is tracked; the peer may still answer, and its pong will be
    /// reported as stray.
    pub fn start_ping(
        &self,
        target: &str,
        expect_response: bool,
        comment: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<(PingHandle, Vec<u8>)> {
        let target_key = self.directory.resolve(target)?;
        let ping = PingMessage::new(expect_response, comment);
        let body = ping.to_bytes()?;
        let envelope = pack(&body, &[target_key], Some(&self.keys[0]), Mode::AuthEncrypt)?;

        let entry = Arc::new(PingEntry {
            id: ping.id.clone(),
            target: target.to_string(),
            deadline: Instant::now() + timeout.unwrap_or(self.default_timeout),
            state: Mutex::new(PingState::Pending),
        });

        if expect_response {
            self.pending.insert(ping.id.clone(), Arc::clone(&entry));
            debug!(id = %ping.id, target, "Trust ping started");
        } else {
            entry.resolve(PingState::Success);
            debug!(id = %ping.id, target, "Fire-and-forget trust ping");
        }

        Ok((PingHandle { entry }, envelope))
    }

    /// Processes one inbound envelope.
    ///
    /// Unpacks, validates the body, and dispatches: a ping produces a reply
    /// envelope mirroring the inbound protection mode; a pong resolves (or
    /// is reported against) the matching pending entry. Envelope and schema
    /// failures surface as errors; protocol-state anomalies (stray,
    /// mismatch) are ordinary outcomes.
    pub fn handle_inbound(&self, envelope: &[u8]) -> Result<InboundOutcome> {
        let opened = unpack(envelope, &self.keys, self.directory.as_ref())?;
        match validate(&opened.plaintext)? {
            ProtocolMessage::Ping(ping) => self.answer_ping(&opened, &ping),
            ProtocolMessage::Pong(pong) => Ok(self.resolve_pong(&opened, &pong)),
        }
    }

    /// Builds the pong answering an inbound ping.
    fn answer_ping(&self, opened: &protocol::Opened, ping: &PingMessage) -> Result<InboundOutcome> {
        let Some(sender) = opened.sender.as_deref() else {
            // No verified sender to address a pong to.
            debug!(id = %ping.id, "Dropping anonymous trust ping");
            return Ok(InboundOutcome::NoReply);
        };

        let sender_key = self.directory.resolve(sender)?;
        let pong = PongMessage::reply_to(ping, None);
        let body = pong.to_bytes()?;

        // Mirror the inbound protection mode.
        let mode = match opened.confidentiality {
            Confidentiality::Encrypted => Mode::AuthEncrypt,
            Confidentiality::Plaintext => Mode::SignOnly,
        };
        let reply = pack(&body, &[sender_key], Some(&self.keys[0]), mode)?;

        debug!(thread_id = %ping.id, sender, "Answering trust ping");
        Ok(InboundOutcome::Reply(reply))
    }

    /// Resolves an inbound pong against the pending table.
    fn resolve_pong(&self, opened: &protocol::Opened, pong: &PongMessage) -> InboundOutcome {
        // Clone the entry out so no table lock is held across the
        // transition and the removal below.
        let entry = self
            .pending
            .get(&pong.thread_id)
            .map(|entry| Arc::clone(entry.value()));

        let Some(entry) = entry else {
            warn!(thread_id = %pong.thread_id, "Stray trust-ping response");
            return InboundOutcome::Stray {
                thread_id: pong.thread_id.clone(),
            };
        };

        if opened.sender.as_deref() == Some(entry.target.as_str()) {
            if entry.resolve(PingState::Success) {
                self.pending.remove(&pong.thread_id);
                debug!(thread_id = %pong.thread_id, target = %entry.target, "Trust ping resolved");
                InboundOutcome::Resolved {
                    thread_id: pong.thread_id.clone(),
                }
            } else {
                // Lost the race against a sweep, cancel, or earlier pong.
                warn!(thread_id = %pong.thread_id, "Stray trust-ping response (already resolved)");
                InboundOutcome::Stray {
                    thread_id: pong.thread_id.clone(),
                }
            }
        } else if entry.resolve(PingState::Mismatch) {
            self.pending.remove(&pong.thread_id);
            warn!(
                thread_id = %pong.thread_id,
                expected = %entry.target,
                actual = ?opened.sender,
                "Trust-ping response from unexpected sender"
            );
            InboundOutcome::Mismatched {
                thread_id: pong.thread_id.clone(),
                sender: opened.sender.clone(),
            }
        } else {
            warn!(thread_id = %pong.thread_id, "Stray trust-ping response (already resolved)");
            InboundOutcome::Stray {
                thread_id: pong.thread_id.clone(),
            }
        }
    }

    /// Times out every pending entry past its deadline.
    ///
    /// Returns the ids of the pings this call transitioned to
    /// [`PingState::Timeout`]. Safe to call from a periodic task while
    /// pongs arrive concurrently; a racing pong and sweep settle on exactly
    /// one terminal state.
    pub fn sweep_expired(&self) -> Vec<String> {
        let now = Instant::now();
        let expired: Vec<Arc<PingEntry>> = self
            .pending
            .iter()
            .filter(|entry| entry.deadline <= now)
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut timed_out = Vec::new();
        for entry in expired {
            if entry.resolve(PingState::Timeout) {
                debug!(id = %entry.id, target = %entry.target, "Trust ping timed out");
                timed_out.push(entry.id.clone());
            }
            self.pending.remove(&entry.id);
        }
        timed_out
    }

    /// Cancels a pending ping, transitioning it to [`PingState::Timeout`]
    /// immediately.
    ///
    /// Returns whether this call performed the transition; `false` means the
    /// ping was unknown or already terminal.
    pub fn cancel(&self, id: &str) -> bool {
        let entry = self.pending.get(id).map(|entry| Arc::clone(entry.value()));
        let Some(entry) = entry else {
            return false;
        };

        let cancelled = entry.resolve(PingState::Timeout);
        self.pending.remove(id);
        if cancelled {
            debug!(id, target = %entry.target, "Trust ping cancelled");
        }
        cancelled
    }
}

impl std::fmt::Debug for TrustPingHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustPingHandler")
            .field("identifier", &self.identifier())
            .field("pending", &self.pending.len())
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}
