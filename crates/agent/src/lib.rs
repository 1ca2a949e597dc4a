//! # AgentWire Agent Library
//!
//! This crate provides the runtime side of AgentWire: the trust-ping
//! handler that tracks liveness checks between agents, plus the
//! collaborators it plugs into (key directory, transport, configuration).
//!
//! ## Overview
//!
//! An agent owns key material, resolves peers through a directory, and
//! exchanges packed envelopes over some transport. This crate provides:
//!
//! - **Trust-Ping Handler**: start pings, answer inbound ones, and track
//!   every outstanding exchange to exactly one terminal outcome
//! - **Key Directory**: concurrent in-memory identifier-to-key resolution
//! - **Transport Seam**: trait for envelope delivery plus an in-process
//!   loopback implementation
//! - **Configuration**: TOML config with validation and env overrides
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                TrustPingHandler                  │
//! │   pending table · exactly-once transitions       │
//! ├────────────────────┬─────────────────────────────┤
//! │  InMemoryDirectory │     protocol pack/unpack    │
//! │  (KeyDirectory)    │     (envelope + crypto)     │
//! ├────────────────────┴─────────────────────────────┤
//! │            Transport (caller-provided)           │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use agent::{InboundOutcome, InMemoryDirectory, PingState, TrustPingHandler};
//! use protocol::{KeyAlgorithm, KeyDirectory, KeyPair};
//!
//! let directory = Arc::new(InMemoryDirectory::new());
//!
//! let alice_key = KeyPair::generate(KeyAlgorithm::Secp256k1).unwrap();
//! let bob_key = KeyPair::generate(KeyAlgorithm::P256).unwrap();
//! directory.register(alice_key.public_key());
//! let bob_id = directory.register(bob_key.public_key());
//!
//! let alice = TrustPingHandler::new(alice_key, Arc::clone(&directory) as Arc<dyn KeyDirectory>);
//! let bob = TrustPingHandler::new(bob_key, Arc::clone(&directory) as Arc<dyn KeyDirectory>);
//!
//! let (handle, ping) = alice.start_ping(&bob_id, true, None, None).unwrap();
//! let InboundOutcome::Reply(pong) = bob.handle_inbound(&ping).unwrap() else {
//!     panic!("expected a reply");
//! };
//! alice.handle_inbound(&pong).unwrap();
//!
//! assert_eq!(handle.state(), PingState::Success);
//! ```
//!
//! ## Modules
//!
//! - [`ping`]: trust-ping state machine and handler
//! - [`directory`]: in-memory key directory
//! - [`transport`]: envelope delivery seam
//! - [`config`]: configuration loading and defaults

pub mod config;
pub mod directory;
pub mod ping;
pub mod transport;

// Re-export protocol for convenience
pub use protocol;

// Re-export config types for convenience
pub use config::{default_config_path, Config, ConfigError};

// Re-export directory types for convenience
pub use directory::InMemoryDirectory;

// Re-export ping types for convenience
pub use ping::{
    InboundOutcome, PingHandle, PingState, TrustPingHandler, DEFAULT_PING_TIMEOUT,
};

// Re-export transport types for convenience
pub use transport::{LoopbackTransport, Transport};
