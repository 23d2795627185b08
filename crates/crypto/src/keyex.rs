//! X25519 key agreement and key wrapping.
//!
//! Two wrapping schemes protect session keys in transit:
//!
//! - **Conventional**: a 32-byte key-encryption key seals the material with
//!   ChaCha20-Poly1305 under a random nonce.
//! - **Public key**: an ephemeral X25519 exchange with the recipient's
//!   public key yields a one-time key-encryption key derived with BLAKE3
//!   over the shared secret and both public keys.
//!
//! The same agreement primitive keys channel sessions; see
//! [`derive_channel_keys`].

use crate::error::{EngineError, EngineResult};
use crate::hash::key_id;
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

pub const NONCE_SIZE: usize = 12;
pub const TAG_SIZE: usize = 16;
pub const PUBLIC_KEY_SIZE: usize = 32;

const WRAP_CONTEXT: &str = "cryptkit public key wrap 2024-01";
const CHANNEL_C2S_CONTEXT: &str = "cryptkit channel client to server 2024-01";
const CHANNEL_S2C_CONTEXT: &str = "cryptkit channel server to client 2024-01";

/// Long-term X25519 key pair. Public-only pairs can wrap but not unwrap.
#[derive(Clone)]
pub struct AgreementKeyPair {
    secret: Option<StaticSecret>,
    public: X25519PublicKey,
}

impl AgreementKeyPair {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let secret = StaticSecret::random_from_rng(rng);
        let public = X25519PublicKey::from(&secret);
        Self {
            secret: Some(secret),
            public,
        }
    }

    pub fn from_secret(secret: &[u8]) -> EngineResult<Self> {
        let bytes: [u8; 32] = secret.try_into().map_err(|_| EngineError::KeyLength {
            expected: 32,
            actual: secret.len(),
        })?;
        let secret = StaticSecret::from(bytes);
        let public = X25519PublicKey::from(&secret);
        Ok(Self {
            secret: Some(secret),
            public,
        })
    }

    pub fn from_public(public: &[u8]) -> EngineResult<Self> {
        let bytes: [u8; PUBLIC_KEY_SIZE] =
            public.try_into().map_err(|_| EngineError::KeyLength {
                expected: PUBLIC_KEY_SIZE,
                actual: public.len(),
            })?;
        Ok(Self {
            secret: None,
            public: X25519PublicKey::from(bytes),
        })
    }

    pub fn has_private(&self) -> bool {
        self.secret.is_some()
    }

    pub fn public_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.public.to_bytes()
    }

    pub fn secret_bytes(&self) -> EngineResult<Zeroizing<[u8; 32]>> {
        self.secret
            .as_ref()
            .map(|s| Zeroizing::new(s.to_bytes()))
            .ok_or(EngineError::NoKey)
    }

    pub fn key_id(&self) -> [u8; 8] {
        key_id(&self.public_bytes())
    }

    pub fn public_only(&self) -> Self {
        Self {
            secret: None,
            public: self.public,
        }
    }

    /// Wrap `material` so only the holder of this pair's secret can recover it.
    pub fn wrap<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        material: &[u8],
        aad: &[u8],
    ) -> EngineResult<PublicKeyWrap> {
        let ephemeral = EphemeralSecret::random_from_rng(&mut *rng);
        let ephemeral_public = X25519PublicKey::from(&ephemeral);
        let shared = ephemeral.diffie_hellman(&self.public);
        if !shared.was_contributory() {
            return Err(EngineError::Malformed("low-order recipient key".to_string()));
        }
        let kek = wrap_kek(shared.as_bytes(), &ephemeral_public.to_bytes(), &self.public_bytes());
        let sealed = seal(&kek, rng, material, aad)?;
        Ok(PublicKeyWrap {
            ephemeral_public: ephemeral_public.to_bytes(),
            sealed,
        })
    }

    pub fn unwrap(&self, wrapped: &PublicKeyWrap, aad: &[u8]) -> EngineResult<Zeroizing<Vec<u8>>> {
        let secret = self.secret.as_ref().ok_or(EngineError::NoKey)?;
        let peer = X25519PublicKey::from(wrapped.ephemeral_public);
        let shared = secret.diffie_hellman(&peer);
        let kek = wrap_kek(shared.as_bytes(), &wrapped.ephemeral_public, &self.public_bytes());
        open(&kek, &wrapped.sealed, aad)
    }
}

/// Output of [`AgreementKeyPair::wrap`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyWrap {
    pub ephemeral_public: [u8; PUBLIC_KEY_SIZE],
    /// Nonce followed by ciphertext and tag.
    pub sealed: Vec<u8>,
}

fn wrap_kek(shared: &[u8; 32], ephemeral: &[u8; 32], recipient: &[u8; 32]) -> Zeroizing<[u8; 32]> {
    let mut hasher = blake3::Hasher::new_derive_key(WRAP_CONTEXT);
    hasher.update(shared);
    hasher.update(ephemeral);
    hasher.update(recipient);
    Zeroizing::new(*hasher.finalize().as_bytes())
}

/// Seal with a 32-byte key under a fresh random nonce; output is `nonce || ct || tag`.
pub fn seal<R: RngCore + CryptoRng>(
    key: &[u8; 32],
    rng: &mut R,
    plaintext: &[u8],
    aad: &[u8],
) -> EngineResult<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(key));
    let mut nonce = [0u8; NONCE_SIZE];
    rng.fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| EngineError::Malformed("seal".to_string()))?;
    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Inverse of [`seal`]. Any tampering or a wrong key yields
/// [`EngineError::Authentication`].
pub fn open(key: &[u8; 32], sealed: &[u8], aad: &[u8]) -> EngineResult<Zeroizing<Vec<u8>>> {
    if sealed.len() < NONCE_SIZE + TAG_SIZE {
        return Err(EngineError::Malformed("sealed data too short".to_string()));
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
    let cipher = ChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(key));
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| EngineError::Authentication)
}

/// Directional traffic keys for a channel.
pub struct ChannelKeys {
    pub client_to_server: Zeroizing<[u8; 32]>,
    pub server_to_client: Zeroizing<[u8; 32]>,
}

/// One side of an ephemeral channel exchange.
pub struct EphemeralExchange {
    secret: Option<EphemeralSecret>,
    pub public: [u8; PUBLIC_KEY_SIZE],
}

impl EphemeralExchange {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let secret = EphemeralSecret::random_from_rng(rng);
        let public = X25519PublicKey::from(&secret).to_bytes();
        Self {
            secret: Some(secret),
            public,
        }
    }

    /// Complete the exchange. The secret is consumed.
    pub fn agree(&mut self, peer_public: &[u8], transcript: &[u8]) -> EngineResult<ChannelKeys> {
        let peer: [u8; PUBLIC_KEY_SIZE] =
            peer_public.try_into().map_err(|_| EngineError::KeyLength {
                expected: PUBLIC_KEY_SIZE,
                actual: peer_public.len(),
            })?;
        let secret = self
            .secret
            .take()
            .ok_or_else(|| EngineError::Malformed("exchange secret already consumed".to_string()))?;
        let shared = secret.diffie_hellman(&X25519PublicKey::from(peer));
        if !shared.was_contributory() {
            return Err(EngineError::Malformed("low-order peer key".to_string()));
        }
        Ok(derive_channel_keys(shared.as_bytes(), transcript))
    }
}

/// Derive both traffic keys from a shared secret and the handshake transcript.
pub fn derive_channel_keys(shared: &[u8; 32], transcript: &[u8]) -> ChannelKeys {
    let derive = |context: &str| {
        let mut hasher = blake3::Hasher::new_derive_key(context);
        hasher.update(shared);
        hasher.update(transcript);
        Zeroizing::new(*hasher.finalize().as_bytes())
    };
    ChannelKeys {
        client_to_server: derive(CHANNEL_C2S_CONTEXT),
        server_to_client: derive(CHANNEL_S2C_CONTEXT),
    }
}
