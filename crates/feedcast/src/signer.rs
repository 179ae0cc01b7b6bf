//! Event signing.
//!
//! Keys are secp256k1 secrets given either as bech32 `nsec1...` or as 64 hex
//! characters. Signatures are BIP-340 Schnorr over the event id without
//! auxiliary randomness, so signing the same fields twice yields the same
//! event byte for byte.

use std::fmt;

use bech32::{Bech32, Hrp};
use feedcast_proto::{compute_event_id, OutboundMessage, SignedMessage, Tag};
use secp256k1::{schnorr, All, Keypair, Message, Secp256k1, SecretKey, XOnlyPublicKey};

use crate::error::SigningError;

const NSEC_HRP: &str = "nsec";
const NPUB_HRP: Hrp = Hrp::parse_unchecked("npub");

/// A validated secret key.
#[derive(Clone)]
pub struct PrivateKey {
    secret: SecretKey,
}

impl PrivateKey {
    /// Parse an `nsec1...` or 64-character hex secret key.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::InvalidKey`] for anything else, including the
    /// zero key and values above the curve order.
    pub fn parse(text: &str) -> Result<Self, SigningError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SigningError::InvalidKey("key is empty".to_string()));
        }

        let bytes = if text.to_ascii_lowercase().starts_with("nsec1") {
            let (hrp, data) = bech32::decode(text)
                .map_err(|e| SigningError::InvalidKey(format!("malformed nsec: {e}")))?;
            if hrp.to_lowercase() != NSEC_HRP {
                return Err(SigningError::InvalidKey(format!(
                    "expected '{NSEC_HRP}' prefix, found '{}'",
                    hrp.to_lowercase()
                )));
            }
            data
        } else {
            hex::decode(text).map_err(|e| {
                SigningError::InvalidKey(format!("expected nsec or hex key: {e}"))
            })?
        };

        if bytes.len() != 32 {
            return Err(SigningError::InvalidKey(format!(
                "key must be 32 bytes, got {}",
                bytes.len()
            )));
        }

        let secret = SecretKey::from_slice(&bytes)
            .map_err(|e| SigningError::InvalidKey(e.to_string()))?;
        Ok(Self { secret })
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

/// Signs outbound messages as one author.
pub struct Signer {
    secp: Secp256k1<All>,
    keypair: Keypair,
    public_key: XOnlyPublicKey,
    pubkey_hex: String,
}

impl Signer {
    /// Create a signer for the given key.
    #[must_use]
    pub fn new(key: &PrivateKey) -> Self {
        let secp = Secp256k1::new();
        let keypair = Keypair::from_secret_key(&secp, &key.secret);
        let (public_key, _parity) = keypair.x_only_public_key();
        let pubkey_hex = hex::encode(public_key.serialize());
        Self {
            secp,
            keypair,
            public_key,
            pubkey_hex,
        }
    }

    /// Author public key, x-only hex.
    #[must_use]
    pub fn public_key_hex(&self) -> &str {
        &self.pubkey_hex
    }

    /// Author public key as bech32 `npub1...`.
    #[must_use]
    pub fn npub(&self) -> String {
        bech32::encode::<Bech32>(NPUB_HRP, &self.public_key.serialize())
            .unwrap_or_else(|_| self.pubkey_hex.clone())
    }

    /// Sign with the current wall-clock time.
    ///
    /// # Errors
    ///
    /// See [`Signer::sign_at`].
    pub fn sign(&self, message: &OutboundMessage) -> Result<SignedMessage, SigningError> {
        let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
        self.sign_at(message, now)
    }

    /// Sign with an explicit `created_at`.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::Serialization`] if the id cannot be computed
    /// and [`SigningError::Verification`] if the signature fails its
    /// self-check.
    pub fn sign_at(
        &self,
        message: &OutboundMessage,
        created_at: u64,
    ) -> Result<SignedMessage, SigningError> {
        let tags: Vec<Tag> = Vec::new();
        let id = compute_event_id(
            &self.pubkey_hex,
            created_at,
            message.kind,
            &tags,
            &message.content,
        )
        .map_err(|e| SigningError::Serialization(e.to_string()))?;

        let digest = Message::from_digest(*id.as_bytes());
        let sig = self.secp.sign_schnorr_no_aux_rand(&digest, &self.keypair);
        self.secp
            .verify_schnorr(&sig, &digest, &self.public_key)
            .map_err(|e| SigningError::Verification(e.to_string()))?;

        Ok(SignedMessage {
            id,
            pubkey: self.pubkey_hex.clone(),
            created_at,
            kind: message.kind,
            tags,
            content: message.content.clone(),
            sig: hex::encode(sig.serialize()),
        })
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("pubkey", &self.pubkey_hex)
            .finish_non_exhaustive()
    }
}

/// Verify an event's id and signature against its own `pubkey`.
///
/// # Errors
///
/// Returns [`SigningError::Verification`] if any check fails.
pub fn verify_signature(event: &SignedMessage) -> Result<(), SigningError> {
    event
        .verify_id()
        .map_err(|e| SigningError::Verification(e.to_string()))?;

    let pubkey_bytes =
        hex::decode(&event.pubkey).map_err(|e| SigningError::Verification(e.to_string()))?;
    let public_key = XOnlyPublicKey::from_slice(&pubkey_bytes)
        .map_err(|e| SigningError::Verification(e.to_string()))?;
    let sig_bytes =
        hex::decode(&event.sig).map_err(|e| SigningError::Verification(e.to_string()))?;
    let sig = schnorr::Signature::from_slice(&sig_bytes)
        .map_err(|e| SigningError::Verification(e.to_string()))?;

    let secp = Secp256k1::verification_only();
    secp.verify_schnorr(&sig, &Message::from_digest(*event.id.as_bytes()), &public_key)
        .map_err(|e| SigningError::Verification(e.to_string()))
}
