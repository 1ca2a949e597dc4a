//! Error types for the protocol crate.
//!
//! Errors fall into three families, and callers are expected to treat them
//! differently:
//!
//! - **Input errors** (malformed envelopes, unsupported versions, schema
//!   violations): rejected immediately, never retried.
//! - **Cryptographic errors** (decryption/tag failures, signature failures,
//!   capability mismatches): always fail closed; security-relevant.
//! - **Addressing errors** (`NotIntendedRecipient`, unknown identifiers):
//!   the envelope was valid but not for us / not resolvable.

use thiserror::Error;

/// Protocol error type covering all possible failure modes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    // Input errors
    /// Failed to serialize data.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Failed to deserialize data.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// Envelope declares a version this implementation does not speak.
    #[error("unsupported envelope version: got {got}, supported {supported}")]
    UnsupportedVersion {
        /// Version declared by the envelope.
        got: u8,
        /// Version this implementation supports.
        supported: u8,
    },

    /// A protocol message failed structural validation.
    #[error("schema violation in field `{field}`: {reason}")]
    SchemaViolation {
        /// The violated field.
        field: &'static str,
        /// Why the field was rejected.
        reason: String,
    },

    /// Pack was asked to encrypt for an empty recipient set.
    #[error("no recipients: at least one recipient key is required")]
    NoRecipients,

    /// A key carries an algorithm tag with no defined scheme.
    #[error("unsupported key type: {0}")]
    UnsupportedKeyType(String),

    /// A signing mode was requested without a sender key.
    #[error("signing key required for the requested mode")]
    SigningKeyRequired,

    // Cryptographic errors
    /// Encryption operation failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Decryption or authentication-tag check failed.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Signature verification failed.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// The declared sender's signature did not verify during unpack.
    #[error("sender authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid or malformed public key material.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Invalid or malformed private key material.
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// The key cannot perform the requested operation.
    #[error("capability mismatch: {algorithm} key cannot perform {operation}")]
    CapabilityMismatch {
        /// Algorithm tag of the offending key.
        algorithm: String,
        /// The operation that was requested.
        operation: &'static str,
    },

    // Addressing errors
    /// None of the local private keys match a recipient entry.
    #[error("not an intended recipient of this envelope")]
    NotIntendedRecipient,

    /// An identifier could not be resolved to a public key.
    #[error("unknown identifier: {0}")]
    UnknownIdentifier(String),
}

impl ProtocolError {
    /// Whether this error is cryptographic (fail-closed, security-relevant)
    /// as opposed to an ordinary input or addressing error.
    ///
    /// Callers use this to log cryptographic failures distinctly.
    pub fn is_cryptographic(&self) -> bool {
        matches!(
            self,
            ProtocolError::Encryption(_)
                | ProtocolError::Decryption(_)
                | ProtocolError::InvalidSignature(_)
                | ProtocolError::AuthenticationFailed(_)
                | ProtocolError::CapabilityMismatch { .. }
        )
    }
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

// Conversions from underlying crate errors

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_eof() || err.is_syntax() {
            ProtocolError::Deserialization(err.to_string())
        } else {
            ProtocolError::Serialization(err.to_string())
        }
    }
}

impl From<base64::DecodeError> for ProtocolError {
    fn from(err: base64::DecodeError) -> Self {
        ProtocolError::Deserialization(format!("invalid base64: {err}"))
    }
}

impl From<k256::ecdsa::Error> for ProtocolError {
    fn from(err: k256::ecdsa::Error) -> Self {
        ProtocolError::InvalidSignature(err.to_string())
    }
}
