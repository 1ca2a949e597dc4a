//! Key material and cryptographic identity for AgentWire agents.
//!
//! An agent holds one or more key pairs drawn from a closed set of algorithm
//! families:
//!
//! - **secp256k1**: short-Weierstrass curve with a blockchain-style address
//!   as its public identifier (Keccak-256 over the uncompressed point).
//! - **P-256**: generic named-curve elliptic key.
//! - **RSA**: 2048-bit RSA with an OAEP key-transport scheme.
//!
//! All families expose the same capability surface — sign, verify, key
//! agreement, content-key wrap/unwrap, and public-identifier derivation —
//! so protocol logic never branches on the concrete family, only on
//! capability. Algorithm-specific parameters (curve, hash, padding) are
//! resolved from the key's own metadata, never passed in by callers.
//!
//! ## Scheme selection
//!
//! - Signatures: ECDSA/SHA-256 (fixed 64-byte encoding) for the EC
//!   families, RSA-PSS/SHA-256 for RSA.
//! - Content-key wrap: ephemeral-static ECDH → HKDF-SHA256 →
//!   ChaCha20-Poly1305 for EC recipients; RSA-OAEP(SHA-256) for RSA
//!   recipients.
//!
//! RSA keys have no key-agreement capability; asking one to perform
//! agreement fails with `CapabilityMismatch`, as does mixing curves.
//!
//! ## Security invariants
//!
//! - The public identifier is a pure function of algorithm + public key
//!   bytes and never changes after creation.
//! - Private key material never leaves this module except through the
//!   explicit `secret_bytes` export for storage collaborators.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use hkdf::Hkdf;
use k256::ecdsa::signature::{Signer, Verifier};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ProtocolError, Result};

/// RSA modulus size used by [`KeyPair::generate`].
pub const RSA_KEY_BITS: usize = 2048;

/// Length of a wrapped content key's AEAD nonce in bytes.
pub const WRAP_NONCE_LENGTH: usize = 12;

/// Length of a per-envelope content key in bytes.
pub const CONTENT_KEY_LENGTH: usize = 32;

/// HKDF info string for deriving a key-wrap key from an ECDH shared secret.
const CEK_WRAP_INFO: &[u8] = b"agentwire/1/cek-wrap";

// ============================================================================
// Algorithm tags
// ============================================================================

/// The closed set of key algorithm families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyAlgorithm {
    /// secp256k1 (blockchain-style address scheme).
    Secp256k1,
    /// NIST P-256.
    P256,
    /// RSA-2048.
    Rsa,
}

impl KeyAlgorithm {
    /// Stable string tag used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            KeyAlgorithm::Secp256k1 => "secp256k1",
            KeyAlgorithm::P256 => "p256",
            KeyAlgorithm::Rsa => "rsa",
        }
    }

    /// Parses a wire tag back into an algorithm.
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag {
            "secp256k1" => Ok(KeyAlgorithm::Secp256k1),
            "p256" => Ok(KeyAlgorithm::P256),
            "rsa" => Ok(KeyAlgorithm::Rsa),
            other => Err(ProtocolError::UnsupportedKeyType(other.to_string())),
        }
    }

    /// Whether keys of this family can perform Diffie-Hellman agreement.
    pub fn supports_agreement(self) -> bool {
        !matches!(self, KeyAlgorithm::Rsa)
    }
}

impl std::fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Wrapped content keys
// ============================================================================

/// A per-recipient wrapped content key.
///
/// For EC recipients this carries the packer's ephemeral public key and the
/// AEAD nonce used to seal the content key; for RSA recipients the content
/// key is transported directly under OAEP and both are absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedKey {
    /// Algorithm family of the recipient key.
    pub algorithm: KeyAlgorithm,
    /// The sealed (EC) or OAEP-encrypted (RSA) content key.
    pub encrypted_key: Vec<u8>,
    /// Ephemeral public key, SEC1 compressed (EC families only).
    pub ephemeral_key: Option<Vec<u8>>,
    /// AEAD nonce for the sealed content key (EC families only).
    pub nonce: Option<[u8; WRAP_NONCE_LENGTH]>,
}

// ============================================================================
// Public keys
// ============================================================================

/// A public key from one of the supported algorithm families.
#[derive(Debug, Clone, PartialEq)]
pub enum PublicKey {
    /// secp256k1 public key.
    Secp256k1(k256::PublicKey),
    /// P-256 public key.
    P256(p256::PublicKey),
    /// RSA public key.
    Rsa(RsaPublicKey),
}

impl PublicKey {
    /// Parses public key bytes for the given algorithm.
    ///
    /// EC keys are SEC1-encoded points (compressed or uncompressed);
    /// RSA keys are PKCS#1 DER.
    pub fn from_bytes(algorithm: KeyAlgorithm, bytes: &[u8]) -> Result<Self> {
        match algorithm {
            KeyAlgorithm::Secp256k1 => k256::PublicKey::from_sec1_bytes(bytes)
                .map(PublicKey::Secp256k1)
                .map_err(|e| ProtocolError::InvalidPublicKey(e.to_string())),
            KeyAlgorithm::P256 => p256::PublicKey::from_sec1_bytes(bytes)
                .map(PublicKey::P256)
                .map_err(|e| ProtocolError::InvalidPublicKey(e.to_string())),
            KeyAlgorithm::Rsa => RsaPublicKey::from_pkcs1_der(bytes)
                .map(PublicKey::Rsa)
                .map_err(|e| ProtocolError::InvalidPublicKey(e.to_string())),
        }
    }

    /// The canonical byte encoding: SEC1 compressed for EC, PKCS#1 DER
    /// for RSA.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            PublicKey::Secp256k1(pk) => Ok(pk.to_encoded_point(true).as_bytes().to_vec()),
            PublicKey::P256(pk) => Ok(pk.to_encoded_point(true).as_bytes().to_vec()),
            PublicKey::Rsa(pk) => pk
                .to_pkcs1_der()
                .map(|doc| doc.as_bytes().to_vec())
                .map_err(|e| ProtocolError::InvalidPublicKey(e.to_string())),
        }
    }

    /// The algorithm family of this key.
    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            PublicKey::Secp256k1(_) => KeyAlgorithm::Secp256k1,
            PublicKey::P256(_) => KeyAlgorithm::P256,
            PublicKey::Rsa(_) => KeyAlgorithm::Rsa,
        }
    }

    /// Whether this key can take part in Diffie-Hellman agreement.
    pub fn supports_agreement(&self) -> bool {
        self.algorithm().supports_agreement()
    }

    /// Derives the public identifier for this key.
    ///
    /// The identifier is a pure function of the public key bytes and
    /// algorithm:
    ///
    /// - secp256k1: `0x` + hex of the last 20 bytes of Keccak-256 over the
    ///   uncompressed point (without the `0x04` prefix) — a blockchain-style
    ///   address.
    /// - P-256: `p256:` + hex of the first 16 bytes of SHA-256 over the
    ///   compressed point.
    /// - RSA: colon-grouped hex fingerprint of the first 16 bytes of
    ///   SHA-256 over the PKCS#1 DER.
    pub fn identifier(&self) -> String {
        match self {
            PublicKey::Secp256k1(pk) => {
                let point = pk.to_encoded_point(false);
                let hash = sha3::Keccak256::digest(&point.as_bytes()[1..]);
                let mut out = String::with_capacity(42);
                out.push_str("0x");
                for byte in &hash[12..] {
                    out.push_str(&format!("{byte:02x}"));
                }
                out
            }
            PublicKey::P256(pk) => {
                let hash = Sha256::digest(pk.to_encoded_point(true).as_bytes());
                let mut out = String::from("p256:");
                for byte in &hash[..16] {
                    out.push_str(&format!("{byte:02x}"));
                }
                out
            }
            PublicKey::Rsa(pk) => {
                // PKCS#1 encoding of a valid public key cannot fail.
                let der = pk.to_pkcs1_der().expect("valid RSA public key");
                let hash = Sha256::digest(der.as_bytes());
                hash[..16]
                    .chunks(2)
                    .map(|chunk| format!("{:02x}{:02x}", chunk[0], chunk[1]))
                    .collect::<Vec<_>>()
                    .join(":")
            }
        }
    }

    /// Verifies a signature over `message` with this key.
    ///
    /// The signature scheme is the key's native one: ECDSA/SHA-256 for EC
    /// families, RSA-PSS/SHA-256 for RSA.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        match self {
            PublicKey::Secp256k1(pk) => {
                let sig = k256::ecdsa::Signature::from_slice(signature)?;
                k256::ecdsa::VerifyingKey::from(pk)
                    .verify(message, &sig)
                    .map_err(|e| ProtocolError::InvalidSignature(e.to_string()))
            }
            PublicKey::P256(pk) => {
                let sig = p256::ecdsa::Signature::from_slice(signature)
                    .map_err(|e| ProtocolError::InvalidSignature(e.to_string()))?;
                p256::ecdsa::VerifyingKey::from(pk)
                    .verify(message, &sig)
                    .map_err(|e| ProtocolError::InvalidSignature(e.to_string()))
            }
            PublicKey::Rsa(pk) => {
                let sig = rsa::pss::Signature::try_from(signature)
                    .map_err(|e| ProtocolError::InvalidSignature(e.to_string()))?;
                rsa::pss::VerifyingKey::<Sha256>::new(pk.clone())
                    .verify(message, &sig)
                    .map_err(|e| ProtocolError::InvalidSignature(e.to_string()))
            }
        }
    }

    /// Wraps a fresh content key so that only the holder of this key's
    /// private half can recover it.
    pub fn wrap_content_key(&self, cek: &[u8; CONTENT_KEY_LENGTH]) -> Result<WrappedKey> {
        let kid = self.identifier();
        match self {
            PublicKey::Secp256k1(pk) => {
                let ephemeral = k256::ecdh::EphemeralSecret::random(&mut OsRng);
                let epk = ephemeral.public_key().to_encoded_point(true).as_bytes().to_vec();
                let shared = ephemeral.diffie_hellman(pk);
                let (encrypted_key, nonce) =
                    seal_with_shared(shared.raw_secret_bytes().as_slice(), cek, kid.as_bytes())?;
                Ok(WrappedKey {
                    algorithm: KeyAlgorithm::Secp256k1,
                    encrypted_key,
                    ephemeral_key: Some(epk),
                    nonce: Some(nonce),
                })
            }
            PublicKey::P256(pk) => {
                let ephemeral = p256::ecdh::EphemeralSecret::random(&mut OsRng);
                let epk = ephemeral.public_key().to_encoded_point(true).as_bytes().to_vec();
                let shared = ephemeral.diffie_hellman(pk);
                let (encrypted_key, nonce) =
                    seal_with_shared(shared.raw_secret_bytes().as_slice(), cek, kid.as_bytes())?;
                Ok(WrappedKey {
                    algorithm: KeyAlgorithm::P256,
                    encrypted_key,
                    ephemeral_key: Some(epk),
                    nonce: Some(nonce),
                })
            }
            PublicKey::Rsa(pk) => {
                let encrypted_key = pk
                    .encrypt(&mut OsRng, Oaep::new::<Sha256>(), cek)
                    .map_err(|e| ProtocolError::Encryption(e.to_string()))?;
                Ok(WrappedKey {
                    algorithm: KeyAlgorithm::Rsa,
                    encrypted_key,
                    ephemeral_key: None,
                    nonce: None,
                })
            }
        }
    }
}

// ============================================================================
// Key pairs
// ============================================================================

/// A locally-held key pair from one of the supported algorithm families.
///
/// Private material stays inside this type; `Debug` redacts it.
#[derive(Clone)]
pub enum KeyPair {
    /// secp256k1 key pair.
    Secp256k1(k256::SecretKey),
    /// P-256 key pair.
    P256(p256::SecretKey),
    /// RSA key pair.
    Rsa(RsaPrivateKey),
}

impl KeyPair {
    /// Generates a fresh key pair of the given algorithm family using the
    /// operating system's secure random number generator.
    pub fn generate(algorithm: KeyAlgorithm) -> Result<Self> {
        match algorithm {
            KeyAlgorithm::Secp256k1 => Ok(KeyPair::Secp256k1(k256::SecretKey::random(&mut OsRng))),
            KeyAlgorithm::P256 => Ok(KeyPair::P256(p256::SecretKey::random(&mut OsRng))),
            KeyAlgorithm::Rsa => RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS)
                .map(KeyPair::Rsa)
                .map_err(|e| ProtocolError::InvalidPrivateKey(e.to_string())),
        }
    }

    /// Restores a key pair from exported secret bytes.
    ///
    /// EC keys are 32-byte scalars; RSA keys are PKCS#1 DER.
    pub fn from_secret_bytes(algorithm: KeyAlgorithm, bytes: &[u8]) -> Result<Self> {
        match algorithm {
            KeyAlgorithm::Secp256k1 => k256::SecretKey::from_slice(bytes)
                .map(KeyPair::Secp256k1)
                .map_err(|e| ProtocolError::InvalidPrivateKey(e.to_string())),
            KeyAlgorithm::P256 => p256::SecretKey::from_slice(bytes)
                .map(KeyPair::P256)
                .map_err(|e| ProtocolError::InvalidPrivateKey(e.to_string())),
            KeyAlgorithm::Rsa => RsaPrivateKey::from_pkcs1_der(bytes)
                .map(KeyPair::Rsa)
                .map_err(|e| ProtocolError::InvalidPrivateKey(e.to_string())),
        }
    }

    /// Exports the secret key material for a storage collaborator.
    ///
    /// **Security warning**: callers own keeping this confidential.
    pub fn secret_bytes(&self) -> Result<Vec<u8>> {
        match self {
            KeyPair::Secp256k1(sk) => Ok(sk.to_bytes().to_vec()),
            KeyPair::P256(sk) => Ok(sk.to_bytes().to_vec()),
            KeyPair::Rsa(sk) => sk
                .to_pkcs1_der()
                .map(|doc| doc.as_bytes().to_vec())
                .map_err(|e| ProtocolError::InvalidPrivateKey(e.to_string())),
        }
    }

    /// The algorithm family of this key pair.
    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            KeyPair::Secp256k1(_) => KeyAlgorithm::Secp256k1,
            KeyPair::P256(_) => KeyAlgorithm::P256,
            KeyPair::Rsa(_) => KeyAlgorithm::Rsa,
        }
    }

    /// The public half of this key pair.
    pub fn public_key(&self) -> PublicKey {
        match self {
            KeyPair::Secp256k1(sk) => PublicKey::Secp256k1(sk.public_key()),
            KeyPair::P256(sk) => PublicKey::P256(sk.public_key()),
            KeyPair::Rsa(sk) => PublicKey::Rsa(sk.to_public_key()),
        }
    }

    /// The public identifier of this key pair (see [`PublicKey::identifier`]).
    pub fn identifier(&self) -> String {
        self.public_key().identifier()
    }

    /// Signs `message` with this key's native signature scheme.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        match self {
            KeyPair::Secp256k1(sk) => {
                let signing_key = k256::ecdsa::SigningKey::from(sk);
                let sig: k256::ecdsa::Signature = signing_key.sign(message);
                Ok(sig.to_bytes().to_vec())
            }
            KeyPair::P256(sk) => {
                let signing_key = p256::ecdsa::SigningKey::from(sk);
                let sig: p256::ecdsa::Signature = signing_key.sign(message);
                Ok(sig.to_bytes().to_vec())
            }
            KeyPair::Rsa(sk) => {
                let signing_key = rsa::pss::BlindedSigningKey::<Sha256>::new(sk.clone());
                let sig = signing_key.sign_with_rng(&mut OsRng, message);
                Ok(sig.to_vec())
            }
        }
    }

    /// Derives a raw Diffie-Hellman shared secret with a peer key of the
    /// same curve.
    ///
    /// Fails with `CapabilityMismatch` for RSA keys (no agreement scheme)
    /// and for cross-family pairings.
    pub fn key_agree(&self, peer: &PublicKey) -> Result<Vec<u8>> {
        match (self, peer) {
            (KeyPair::Secp256k1(sk), PublicKey::Secp256k1(pk)) => {
                let shared = k256::ecdh::diffie_hellman(sk.to_nonzero_scalar(), pk.as_affine());
                Ok(shared.raw_secret_bytes().to_vec())
            }
            (KeyPair::P256(sk), PublicKey::P256(pk)) => {
                let shared = p256::ecdh::diffie_hellman(sk.to_nonzero_scalar(), pk.as_affine());
                Ok(shared.raw_secret_bytes().to_vec())
            }
            (KeyPair::Rsa(_), _) | (_, PublicKey::Rsa(_)) => {
                Err(ProtocolError::CapabilityMismatch {
                    algorithm: KeyAlgorithm::Rsa.to_string(),
                    operation: "key agreement",
                })
            }
            (local, peer) => Err(ProtocolError::CapabilityMismatch {
                algorithm: format!("{}+{}", local.algorithm(), peer.algorithm()),
                operation: "cross-family key agreement",
            }),
        }
    }

    /// Recovers the content key from a per-recipient wrapped entry.
    pub fn unwrap_content_key(&self, wrapped: &WrappedKey) -> Result<[u8; CONTENT_KEY_LENGTH]> {
        if wrapped.algorithm != self.algorithm() {
            return Err(ProtocolError::CapabilityMismatch {
                algorithm: self.algorithm().to_string(),
                operation: "content key unwrap for a foreign algorithm",
            });
        }
        let kid = self.identifier();
        match self {
            KeyPair::Secp256k1(sk) => {
                let epk = wrapped_ephemeral_key(wrapped)?;
                let epk = k256::PublicKey::from_sec1_bytes(epk)
                    .map_err(|e| ProtocolError::InvalidPublicKey(e.to_string()))?;
                let shared = k256::ecdh::diffie_hellman(sk.to_nonzero_scalar(), epk.as_affine());
                open_with_shared(shared.raw_secret_bytes().as_slice(), wrapped, kid.as_bytes())
            }
            KeyPair::P256(sk) => {
                let epk = wrapped_ephemeral_key(wrapped)?;
                let epk = p256::PublicKey::from_sec1_bytes(epk)
                    .map_err(|e| ProtocolError::InvalidPublicKey(e.to_string()))?;
                let shared = p256::ecdh::diffie_hellman(sk.to_nonzero_scalar(), epk.as_affine());
                open_with_shared(shared.raw_secret_bytes().as_slice(), wrapped, kid.as_bytes())
            }
            KeyPair::Rsa(sk) => {
                let cek = sk
                    .decrypt(Oaep::new::<Sha256>(), &wrapped.encrypted_key)
                    .map_err(|e| ProtocolError::Decryption(e.to_string()))?;
                cek.as_slice()
                    .try_into()
                    .map_err(|_| ProtocolError::Decryption("wrapped key has wrong length".into()))
            }
        }
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("algorithm", &self.algorithm())
            .field("identifier", &self.identifier())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

// ============================================================================
// Key resolution collaborator
// ============================================================================

/// External key-resolution collaborator.
///
/// The envelope unpacker uses this to resolve a declared sender identifier
/// to its public key for signature verification; callers of the ping
/// handler use it to resolve a target's encryption key before packing.
pub trait KeyDirectory: Send + Sync {
    /// Resolves a public identifier to its public key.
    fn resolve(&self, identifier: &str) -> Result<PublicKey>;
}

// ============================================================================
// Wrap helpers
// ============================================================================

fn wrapped_ephemeral_key(wrapped: &WrappedKey) -> Result<&[u8]> {
    wrapped
        .ephemeral_key
        .as_deref()
        .ok_or_else(|| ProtocolError::Deserialization("missing ephemeral key".into()))
}

/// Derives a key-wrap key from an ECDH shared secret and seals the content
/// key under it. The recipient identifier is the associated data, binding
/// each wrapped entry to its recipient slot.
fn seal_with_shared(
    shared: &[u8],
    cek: &[u8; CONTENT_KEY_LENGTH],
    aad: &[u8],
) -> Result<(Vec<u8>, [u8; WRAP_NONCE_LENGTH])> {
    let kek = derive_wrap_key(shared);
    let cipher = ChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(&kek));
    let mut nonce = [0u8; WRAP_NONCE_LENGTH];
    OsRng.fill_bytes(&mut nonce);
    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), Payload { msg: cek, aad })
        .map_err(|_| ProtocolError::Encryption("content key wrap failed".into()))?;
    Ok((sealed, nonce))
}

fn open_with_shared(
    shared: &[u8],
    wrapped: &WrappedKey,
    aad: &[u8],
) -> Result<[u8; CONTENT_KEY_LENGTH]> {
    let nonce = wrapped
        .nonce
        .ok_or_else(|| ProtocolError::Deserialization("missing wrap nonce".into()))?;
    let kek = derive_wrap_key(shared);
    let cipher = ChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(&kek));
    let cek = cipher
        .decrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: &wrapped.encrypted_key,
                aad,
            },
        )
        .map_err(|_| ProtocolError::Decryption("content key unwrap failed".into()))?;
    cek.as_slice()
        .try_into()
        .map_err(|_| ProtocolError::Decryption("wrapped key has wrong length".into()))
}

fn derive_wrap_key(shared: &[u8]) -> [u8; CONTENT_KEY_LENGTH] {
    let hkdf = Hkdf::<Sha256>::new(None, shared);
    let mut kek = [0u8; CONTENT_KEY_LENGTH];
    // Expanding 32 bytes from HKDF-SHA256 cannot fail.
    hkdf.expand(CEK_WRAP_INFO, &mut kek)
        .expect("valid HKDF output length");
    kek
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ec_algorithms() -> [KeyAlgorithm; 2] {
        [KeyAlgorithm::Secp256k1, KeyAlgorithm::P256]
    }

    fn all_algorithms() -> [KeyAlgorithm; 3] {
        [KeyAlgorithm::Secp256k1, KeyAlgorithm::P256, KeyAlgorithm::Rsa]
    }

    #[test]
    fn test_algorithm_tag_roundtrip() {
        for alg in all_algorithms() {
            assert_eq!(KeyAlgorithm::from_tag(alg.as_str()).unwrap(), alg);
        }
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let err = KeyAlgorithm::from_tag("ed448").unwrap_err();
        assert!(matches!(err, ProtocolError::UnsupportedKeyType(_)));
    }

    #[test]
    fn test_public_key_bytes_roundtrip() {
        for alg in all_algorithms() {
            let pair = KeyPair::generate(alg).unwrap();
            let public = pair.public_key();
            let bytes = public.to_bytes().unwrap();
            let restored = PublicKey::from_bytes(alg, &bytes).unwrap();
            assert_eq!(public, restored);
            assert_eq!(public.identifier(), restored.identifier());
        }
    }

    #[test]
    fn test_identifier_is_stable() {
        for alg in all_algorithms() {
            let pair = KeyPair::generate(alg).unwrap();
            assert_eq!(pair.identifier(), pair.public_key().identifier());
            assert_eq!(pair.identifier(), pair.identifier());
        }
    }

    #[test]
    fn test_identifier_formats() {
        let secp = KeyPair::generate(KeyAlgorithm::Secp256k1).unwrap().identifier();
        assert!(secp.starts_with("0x"));
        assert_eq!(secp.len(), 42);

        let p256 = KeyPair::generate(KeyAlgorithm::P256).unwrap().identifier();
        assert!(p256.starts_with("p256:"));

        let rsa = KeyPair::generate(KeyAlgorithm::Rsa).unwrap().identifier();
        assert_eq!(rsa.matches(':').count(), 7);
    }

    #[test]
    fn test_distinct_keys_distinct_identifiers() {
        let a = KeyPair::generate(KeyAlgorithm::Secp256k1).unwrap();
        let b = KeyPair::generate(KeyAlgorithm::Secp256k1).unwrap();
        assert_ne!(a.identifier(), b.identifier());
    }

    #[test]
    fn test_sign_verify_all_families() {
        let message = b"liveness check";
        for alg in all_algorithms() {
            let pair = KeyPair::generate(alg).unwrap();
            let sig = pair.sign(message).unwrap();
            pair.public_key().verify(message, &sig).unwrap();
        }
    }

    #[test]
    fn test_verify_fails_with_wrong_key() {
        let signer = KeyPair::generate(KeyAlgorithm::Secp256k1).unwrap();
        let other = KeyPair::generate(KeyAlgorithm::Secp256k1).unwrap();
        let sig = signer.sign(b"message").unwrap();
        assert!(other.public_key().verify(b"message", &sig).is_err());
    }

    #[test]
    fn test_verify_fails_with_modified_message() {
        for alg in ec_algorithms() {
            let pair = KeyPair::generate(alg).unwrap();
            let sig = pair.sign(b"original").unwrap();
            assert!(pair.public_key().verify(b"tampered", &sig).is_err());
        }
    }

    #[test]
    fn test_key_agree_same_curve_matches() {
        for alg in ec_algorithms() {
            let a = KeyPair::generate(alg).unwrap();
            let b = KeyPair::generate(alg).unwrap();
            let ab = a.key_agree(&b.public_key()).unwrap();
            let ba = b.key_agree(&a.public_key()).unwrap();
            assert_eq!(ab, ba);
            assert!(!ab.is_empty());
        }
    }

    #[test]
    fn test_key_agree_rsa_capability_mismatch() {
        let rsa = KeyPair::generate(KeyAlgorithm::Rsa).unwrap();
        let ec = KeyPair::generate(KeyAlgorithm::Secp256k1).unwrap();
        let err = rsa.key_agree(&ec.public_key()).unwrap_err();
        assert!(matches!(err, ProtocolError::CapabilityMismatch { .. }));
        assert!(err.is_cryptographic());
    }

    #[test]
    fn test_key_agree_cross_curve_capability_mismatch() {
        let a = KeyPair::generate(KeyAlgorithm::Secp256k1).unwrap();
        let b = KeyPair::generate(KeyAlgorithm::P256).unwrap();
        let err = a.key_agree(&b.public_key()).unwrap_err();
        assert!(matches!(err, ProtocolError::CapabilityMismatch { .. }));
    }

    #[test]
    fn test_wrap_unwrap_all_families() {
        let mut cek = [0u8; CONTENT_KEY_LENGTH];
        OsRng.fill_bytes(&mut cek);
        for alg in all_algorithms() {
            let pair = KeyPair::generate(alg).unwrap();
            let wrapped = pair.public_key().wrap_content_key(&cek).unwrap();
            let recovered = pair.unwrap_content_key(&wrapped).unwrap();
            assert_eq!(recovered, cek);
        }
    }

    #[test]
    fn test_wrap_is_randomized() {
        let cek = [7u8; CONTENT_KEY_LENGTH];
        let pair = KeyPair::generate(KeyAlgorithm::P256).unwrap();
        let first = pair.public_key().wrap_content_key(&cek).unwrap();
        let second = pair.public_key().wrap_content_key(&cek).unwrap();
        assert_ne!(first.encrypted_key, second.encrypted_key);
    }

    #[test]
    fn test_unwrap_with_wrong_key_fails() {
        let cek = [3u8; CONTENT_KEY_LENGTH];
        let intended = KeyPair::generate(KeyAlgorithm::Secp256k1).unwrap();
        let other = KeyPair::generate(KeyAlgorithm::Secp256k1).unwrap();
        let wrapped = intended.public_key().wrap_content_key(&cek).unwrap();
        assert!(other.unwrap_content_key(&wrapped).is_err());
    }

    #[test]
    fn test_unwrap_tampered_wrap_fails() {
        let cek = [9u8; CONTENT_KEY_LENGTH];
        let pair = KeyPair::generate(KeyAlgorithm::P256).unwrap();
        let mut wrapped = pair.public_key().wrap_content_key(&cek).unwrap();
        wrapped.encrypted_key[0] ^= 0xFF;
        let err = pair.unwrap_content_key(&wrapped).unwrap_err();
        assert!(err.is_cryptographic());
    }

    #[test]
    fn test_secret_bytes_roundtrip() {
        for alg in all_algorithms() {
            let pair = KeyPair::generate(alg).unwrap();
            let secret = pair.secret_bytes().unwrap();
            let restored = KeyPair::from_secret_bytes(alg, &secret).unwrap();
            assert_eq!(pair.identifier(), restored.identifier());
        }
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let pair = KeyPair::generate(KeyAlgorithm::Secp256k1).unwrap();
        let debug = format!("{pair:?}");
        assert!(debug.contains("REDACTED"));
        let secret = pair.secret_bytes().unwrap();
        let secret_hex: String = secret.iter().map(|b| format!("{b:02x}")).collect();
        assert!(!debug.contains(&secret_hex));
    }
}
