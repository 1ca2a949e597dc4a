//! Envelope packing and unpacking.
//!
//! `pack` turns a plaintext into a tamper-evident, optionally confidential
//! envelope addressed to one or more recipient keys; `unpack` is its
//! inverse, recovering the plaintext together with the verified sender
//! identity (or an explicit anonymous status).
//!
//! ## Construction
//!
//! Encrypted modes generate a fresh 32-byte content key per call, seal an
//! inner JSON body `{payload, sender?, signature?}` with
//! ChaCha20-Poly1305 (the encoded protected header is the associated
//! data), and wrap the content key once per recipient with the recipient
//! key's native scheme. Signatures cover the plaintext before encryption,
//! so they are confidentiality-protected. Nonces and content keys are
//! freshly random every call; packing identical input twice never yields
//! identical ciphertext.
//!
//! `unpack` selects the local recipient key by identifier lookup in the
//! protected header (no trial decryption), fails closed on any tag or
//! signature failure, and is read-only: unpacking the same bytes with the
//! same keys twice yields identical output. Replay defense belongs to the
//! protocol layer above.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::envelope::{b64_decode, b64_encode, Envelope, Mode, Protected, RecipientEntry};
use crate::error::{ProtocolError, Result};
use crate::keys::{KeyDirectory, KeyPair, PublicKey, CONTENT_KEY_LENGTH};

/// AEAD nonce length for the envelope body.
const BODY_NONCE_LENGTH: usize = 12;

/// Poly1305 tag length.
const TAG_LENGTH: usize = 16;

/// Whether a recovered payload travelled encrypted or in plaintext.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidentiality {
    /// The payload was encrypted to the recipient.
    Encrypted,
    /// The payload travelled as signed plaintext.
    Plaintext,
}

/// Whether a recovered payload has a verified sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authentication {
    /// A sender signature was present and verified.
    Authenticated,
    /// The envelope carried no sender identity.
    Anonymous,
}

/// The result of unpacking an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opened {
    /// The recovered plaintext.
    pub plaintext: Vec<u8>,
    /// Verified sender identifier, if the envelope was authenticated.
    pub sender: Option<String>,
    /// Whether the payload was encrypted in transit.
    pub confidentiality: Confidentiality,
    /// Whether the sender was authenticated.
    pub authentication: Authentication,
}

/// Inner body sealed inside encrypted envelopes.
///
/// Carrying the signature (and, for signcrypt, the sender identity) here
/// keeps them confidentiality-protected.
#[derive(Debug, Serialize, Deserialize)]
struct InnerBody {
    /// Base64url plaintext.
    payload: String,
    /// Sender identifier (authcrypt and signcrypt).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sender: Option<String>,
    /// Signature over the raw plaintext, base64url.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
}

/// Packs a plaintext into an envelope.
///
/// `recipients` must be non-empty. `sender` is required for every mode
/// except [`Mode::AnonEncrypt`]; signing modes fail with
/// `SigningKeyRequired` without it.
pub fn pack(
    plaintext: &[u8],
    recipients: &[PublicKey],
    sender: Option<&KeyPair>,
    mode: Mode,
) -> Result<Vec<u8>> {
    if recipients.is_empty() {
        return Err(ProtocolError::NoRecipients);
    }
    if mode.is_signed() && sender.is_none() {
        return Err(ProtocolError::SigningKeyRequired);
    }

    let envelope = if mode.is_encrypted() {
        let signer = if mode.is_signed() { sender } else { None };
        pack_encrypted(plaintext, recipients, signer, mode)?
    } else {
        let signer = sender.ok_or(ProtocolError::SigningKeyRequired)?;
        pack_signed(plaintext, signer)?
    };
    envelope.to_bytes()
}

fn pack_encrypted(
    plaintext: &[u8],
    recipients: &[PublicKey],
    sender: Option<&KeyPair>,
    mode: Mode,
) -> Result<Envelope> {
    let mut inner = InnerBody {
        payload: b64_encode(plaintext),
        sender: None,
        signature: None,
    };

    let mut protected = Protected::new(mode);
    if let Some(sender) = sender {
        let identifier = sender.identifier();
        inner.sender = Some(identifier.clone());
        inner.signature = Some(b64_encode(&sender.sign(plaintext)?));
        // Authcrypt reveals the sender before decryption; signcrypt keeps
        // it inside the ciphertext.
        if mode == Mode::AuthEncrypt {
            protected.sender = Some(identifier);
        }
    }

    let mut cek = [0u8; CONTENT_KEY_LENGTH];
    OsRng.fill_bytes(&mut cek);
    for recipient in recipients {
        let wrapped = recipient.wrap_content_key(&cek)?;
        protected
            .recipients
            .insert(recipient.identifier(), RecipientEntry::from_wrapped(&wrapped));
    }

    let protected_b64 = protected.encode()?;
    let body = serde_json::to_vec(&inner)?;

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&cek));
    let mut nonce = [0u8; BODY_NONCE_LENGTH];
    OsRng.fill_bytes(&mut nonce);
    let sealed = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: &body,
                aad: protected_b64.as_bytes(),
            },
        )
        .map_err(|_| ProtocolError::Encryption("envelope body encryption failed".into()))?;

    let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LENGTH);
    Ok(Envelope {
        protected: protected_b64,
        iv: Some(b64_encode(&nonce)),
        ciphertext: Some(b64_encode(ciphertext)),
        tag: Some(b64_encode(tag)),
        payload: None,
        signature: None,
    })
}

fn pack_signed(plaintext: &[u8], sender: &KeyPair) -> Result<Envelope> {
    let mut protected = Protected::new(Mode::SignOnly);
    protected.sender = Some(sender.identifier());
    Ok(Envelope {
        protected: protected.encode()?,
        iv: None,
        ciphertext: None,
        tag: None,
        payload: Some(b64_encode(plaintext)),
        signature: Some(b64_encode(&sender.sign(plaintext)?)),
    })
}

/// Unpacks an envelope using the local agent's candidate private keys.
///
/// The matching local key is found by identifier lookup in the protected
/// header; if none matches, the envelope was not addressed to us
/// (`NotIntendedRecipient`). Sender signatures are verified against the
/// public key resolved through `directory`.
pub fn unpack(bytes: &[u8], local_keys: &[KeyPair], directory: &dyn KeyDirectory) -> Result<Opened> {
    let envelope = Envelope::from_bytes(bytes)?;
    let protected = envelope.protected()?;

    if protected.mode.is_encrypted() {
        unpack_encrypted(&envelope, &protected, local_keys, directory)
    } else {
        unpack_signed(&envelope, &protected, directory)
    }
}

fn unpack_encrypted(
    envelope: &Envelope,
    protected: &Protected,
    local_keys: &[KeyPair],
    directory: &dyn KeyDirectory,
) -> Result<Opened> {
    let (local_key, entry) = local_keys
        .iter()
        .find_map(|key| {
            protected
                .recipients
                .get(&key.identifier())
                .map(|entry| (key, entry))
        })
        .ok_or(ProtocolError::NotIntendedRecipient)?;

    let cek = local_key.unwrap_content_key(&entry.to_wrapped()?)?;

    let nonce = require_field(&envelope.iv, "iv")?;
    let ciphertext = require_field(&envelope.ciphertext, "ciphertext")?;
    let tag = require_field(&envelope.tag, "tag")?;
    if nonce.len() != BODY_NONCE_LENGTH {
        return Err(ProtocolError::Deserialization(format!(
            "iv must be {BODY_NONCE_LENGTH} bytes, got {}",
            nonce.len()
        )));
    }

    let mut sealed = ciphertext;
    sealed.extend_from_slice(&tag);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&cek));
    let body = cipher
        .decrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: &sealed,
                aad: envelope.protected.as_bytes(),
            },
        )
        .map_err(|_| {
            ProtocolError::Decryption("envelope body authentication or decryption failed".into())
        })?;

    let inner: InnerBody = serde_json::from_slice(&body)?;
    let plaintext = b64_decode(&inner.payload)?;

    if !protected.mode.is_signed() {
        return Ok(Opened {
            plaintext,
            sender: None,
            confidentiality: Confidentiality::Encrypted,
            authentication: Authentication::Anonymous,
        });
    }

    let sender = inner.sender.clone().ok_or_else(|| {
        ProtocolError::Deserialization("authenticated envelope missing sender".into())
    })?;
    // Authcrypt declares the sender in the header too; the two must agree.
    if let Some(declared) = &protected.sender {
        if declared != &sender {
            return Err(ProtocolError::AuthenticationFailed(format!(
                "header sender {declared} does not match body sender {sender}"
            )));
        }
    }
    let signature = inner.signature.as_deref().ok_or_else(|| {
        ProtocolError::Deserialization("authenticated envelope missing signature".into())
    })?;
    verify_sender(directory, &sender, &plaintext, &b64_decode(signature)?)?;

    Ok(Opened {
        plaintext,
        sender: Some(sender),
        confidentiality: Confidentiality::Encrypted,
        authentication: Authentication::Authenticated,
    })
}

fn unpack_signed(
    envelope: &Envelope,
    protected: &Protected,
    directory: &dyn KeyDirectory,
) -> Result<Opened> {
    let plaintext = require_field(&envelope.payload, "payload")?;
    let signature = require_field(&envelope.signature, "signature")?;
    let sender = protected.sender.clone().ok_or_else(|| {
        ProtocolError::Deserialization("signed envelope missing sender".into())
    })?;

    verify_sender(directory, &sender, &plaintext, &signature)?;

    Ok(Opened {
        plaintext,
        sender: Some(sender),
        confidentiality: Confidentiality::Plaintext,
        authentication: Authentication::Authenticated,
    })
}

fn verify_sender(
    directory: &dyn KeyDirectory,
    sender: &str,
    plaintext: &[u8],
    signature: &[u8],
) -> Result<()> {
    let sender_key = directory.resolve(sender)?;
    sender_key.verify(plaintext, signature).map_err(|e| {
        ProtocolError::AuthenticationFailed(format!("signature of {sender} did not verify: {e}"))
    })
}

fn require_field(field: &Option<String>, name: &'static str) -> Result<Vec<u8>> {
    let encoded = field.as_deref().ok_or_else(|| {
        ProtocolError::Deserialization(format!("envelope missing `{name}` field"))
    })?;
    b64_decode(encoded)
}
