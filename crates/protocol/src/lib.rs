//! # AgentWire Protocol Library
//!
//! This crate provides the envelope format, key material, and message
//! schemas for AgentWire's secure agent-to-agent messaging layer.
//!
//! ## Overview
//!
//! The protocol crate is the foundation of AgentWire's communication
//! layer, providing:
//!
//! - **Key Material**: a closed set of key families (secp256k1, P-256,
//!   RSA) behind one capability surface — sign, verify, key agreement,
//!   content-key wrap, public-identifier derivation
//! - **Envelope Format**: a versioned, self-describing JSON container
//!   with per-recipient wrapped content keys
//! - **Pack/Unpack**: anoncrypt, authcrypt, sign-only, and signcrypt
//!   protection modes with fail-closed unpacking
//! - **Message Schemas**: trust-ping bodies and structural validation
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Protocol Messages (ping/pong)    │  JSON bodies
//! ├─────────────────────────────────────────┤
//! │          Envelope Pack / Unpack         │  ChaCha20-Poly1305
//! ├─────────────────────────────────────────┤
//! │   Key Wrap (ECDH+HKDF / RSA-OAEP)       │  per recipient
//! ├─────────────────────────────────────────┤
//! │     Transport (injected collaborator)   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{pack, unpack, KeyAlgorithm, KeyDirectory, KeyPair, Mode};
//! use protocol::{ProtocolError, PublicKey};
//!
//! struct SingleKey(PublicKey);
//! impl KeyDirectory for SingleKey {
//!     fn resolve(&self, id: &str) -> protocol::Result<PublicKey> {
//!         if id == self.0.identifier() {
//!             Ok(self.0.clone())
//!         } else {
//!             Err(ProtocolError::UnknownIdentifier(id.to_string()))
//!         }
//!     }
//! }
//!
//! let sender = KeyPair::generate(KeyAlgorithm::Secp256k1).unwrap();
//! let recipient = KeyPair::generate(KeyAlgorithm::P256).unwrap();
//!
//! let bytes = pack(
//!     b"ping?",
//!     &[recipient.public_key()],
//!     Some(&sender),
//!     Mode::AuthEncrypt,
//! )
//! .unwrap();
//!
//! let directory = SingleKey(sender.public_key());
//! let opened = unpack(&bytes, &[recipient], &directory).unwrap();
//! assert_eq!(opened.plaintext, b"ping?");
//! assert_eq!(opened.sender, Some(sender.identifier()));
//! ```
//!
//! ## Modules
//!
//! - [`keys`]: key pairs, public identifiers, wrap/unwrap schemes
//! - [`envelope`]: wire format of the envelope document
//! - [`seal`]: envelope packing and unpacking
//! - [`messages`]: protocol message bodies and schema validation
//! - [`error`]: error types

pub mod envelope;
pub mod error;
pub mod keys;
pub mod messages;
pub mod seal;

pub use envelope::{Envelope, Mode, Protected, RecipientEntry, ENVELOPE_TYPE, ENVELOPE_VERSION};
pub use error::{ProtocolError, Result};
pub use keys::{
    KeyAlgorithm, KeyDirectory, KeyPair, PublicKey, WrappedKey, CONTENT_KEY_LENGTH,
};
pub use messages::{
    validate, PingMessage, PongMessage, ProtocolMessage, PING_MESSAGE_TYPE, PONG_MESSAGE_TYPE,
};
pub use seal::{pack, unpack, Authentication, Confidentiality, Opened};
