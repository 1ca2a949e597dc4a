//! Envelope wire format.
//!
//! An envelope is a self-describing, versioned JSON document. Binary fields
//! are base64url (no padding). Two shapes exist:
//!
//! - encrypted modes: `{ "protected", "iv", "ciphertext", "tag" }`
//! - sign-only mode: `{ "protected", "payload", "signature" }`
//!
//! `protected` is the base64url encoding of the JSON protected header. For
//! encrypted envelopes the encoded header string is the AEAD associated
//! data, so any tampering with the header breaks the authentication tag.
//!
//! The protected header declares the format version, the mode, a
//! per-recipient wrapped-key map keyed by recipient identifier (O(1)
//! lookup, no trial decryption), and — when the mode reveals it — the
//! sender identifier. Unpackers reject envelopes of an unsupported version
//! before interpreting any other field.

use std::collections::BTreeMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};
use crate::keys::{KeyAlgorithm, WrappedKey, WRAP_NONCE_LENGTH};

/// Current envelope format version.
pub const ENVELOPE_VERSION: u8 = 1;

/// Declared content type of AgentWire envelopes.
pub const ENVELOPE_TYPE: &str = "application/agentwire-envelope";

/// How an envelope protects its payload.
///
/// The mode is declared in the protected header; an envelope is exactly one
/// of these, never a silently-downgraded mix of what the packer was asked
/// for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Encrypted to the recipients; sender not identified.
    #[serde(rename = "anoncrypt")]
    AnonEncrypt,
    /// Encrypted, with the sender declared in the protected header and a
    /// signature over the plaintext carried inside the ciphertext.
    #[serde(rename = "authcrypt")]
    AuthEncrypt,
    /// Plaintext payload with a detached signature.
    #[serde(rename = "signed")]
    SignOnly,
    /// Encrypted, with sender identity and signature both hidden inside
    /// the ciphertext.
    #[serde(rename = "signcrypt")]
    SignAndEncrypt,
}

impl Mode {
    /// Whether this mode encrypts the payload.
    pub fn is_encrypted(self) -> bool {
        !matches!(self, Mode::SignOnly)
    }

    /// Whether this mode carries a sender signature.
    pub fn is_signed(self) -> bool {
        !matches!(self, Mode::AnonEncrypt)
    }
}

/// Per-recipient wrapped-key entry as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientEntry {
    /// Algorithm family of the recipient key.
    pub algorithm: KeyAlgorithm,
    /// Wrapped content key, base64url.
    pub encrypted_key: String,
    /// Ephemeral public key for ECDH recipients, base64url.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ephemeral_key: Option<String>,
    /// AEAD nonce for the wrapped key, base64url.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

impl RecipientEntry {
    /// Encodes a wrapped key for the wire.
    pub fn from_wrapped(wrapped: &WrappedKey) -> Self {
        Self {
            algorithm: wrapped.algorithm,
            encrypted_key: b64_encode(&wrapped.encrypted_key),
            ephemeral_key: wrapped.ephemeral_key.as_deref().map(b64_encode),
            nonce: wrapped.nonce.as_ref().map(|n| b64_encode(n)),
        }
    }

    /// Decodes the wire entry back into a wrapped key.
    pub fn to_wrapped(&self) -> Result<WrappedKey> {
        let nonce = match &self.nonce {
            Some(encoded) => {
                let bytes = b64_decode(encoded)?;
                let nonce: [u8; WRAP_NONCE_LENGTH] = bytes.as_slice().try_into().map_err(|_| {
                    ProtocolError::Deserialization(format!(
                        "wrap nonce must be {WRAP_NONCE_LENGTH} bytes, got {}",
                        bytes.len()
                    ))
                })?;
                Some(nonce)
            }
            None => None,
        };
        Ok(WrappedKey {
            algorithm: self.algorithm,
            encrypted_key: b64_decode(&self.encrypted_key)?,
            ephemeral_key: self.ephemeral_key.as_deref().map(b64_decode).transpose()?,
            nonce,
        })
    }
}

/// The protected header of an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Protected {
    /// Envelope format version.
    pub version: u8,
    /// Declared content type.
    pub typ: String,
    /// Protection mode.
    pub mode: Mode,
    /// Per-recipient wrapped keys, keyed by recipient public identifier.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub recipients: BTreeMap<String, RecipientEntry>,
    /// Sender identifier, present for authcrypt and sign-only envelopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
}

impl Protected {
    /// Creates a header for the current format version.
    pub fn new(mode: Mode) -> Self {
        Self {
            version: ENVELOPE_VERSION,
            typ: ENVELOPE_TYPE.to_string(),
            mode,
            recipients: BTreeMap::new(),
            sender: None,
        }
    }

    /// Serializes and base64url-encodes this header.
    ///
    /// The returned string doubles as the AEAD associated data for
    /// encrypted envelopes.
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self)?;
        Ok(b64_encode(&json))
    }

    /// Decodes a base64url protected header, rejecting unsupported
    /// versions before interpreting any other field.
    pub fn decode(encoded: &str) -> Result<Self> {
        let json = b64_decode(encoded)?;
        let value: serde_json::Value = serde_json::from_slice(&json)?;
        let version = value
            .get("version")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| {
                ProtocolError::Deserialization("protected header missing version".into())
            })?;
        if version != u64::from(ENVELOPE_VERSION) {
            return Err(ProtocolError::UnsupportedVersion {
                got: version.min(u64::from(u8::MAX)) as u8,
                supported: ENVELOPE_VERSION,
            });
        }
        Ok(serde_json::from_value(value)?)
    }
}

/// An envelope as transmitted on the wire.
///
/// Constructed once per send, consumed once per receive, never mutated in
/// place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Base64url-encoded protected header.
    pub protected: String,
    /// AEAD nonce, base64url (encrypted modes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iv: Option<String>,
    /// Ciphertext, base64url (encrypted modes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ciphertext: Option<String>,
    /// Authentication tag, base64url (encrypted modes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Plaintext payload, base64url (sign-only mode).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    /// Detached signature, base64url (sign-only mode).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Envelope {
    /// Serializes the envelope to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses an envelope from raw bytes.
    ///
    /// This validates only the outer structure; the protected header is
    /// decoded (and version-checked) separately via [`Protected::decode`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Decodes this envelope's protected header.
    pub fn protected(&self) -> Result<Protected> {
        Protected::decode(&self.protected)
    }
}

/// Base64url (no padding) encode.
pub fn b64_encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Base64url (no padding) decode.
pub fn b64_decode(encoded: &str) -> Result<Vec<u8>> {
    Ok(URL_SAFE_NO_PAD.decode(encoded)?)
}
