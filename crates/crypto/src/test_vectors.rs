//! Known-answer tests pinning the engine to published vectors.
//!
//! - Ed25519: RFC 8032 section 7.1, test 1
//! - X25519: RFC 7748 section 6.1
//! - ChaCha20: RFC 8439 appendix A.1, test vector 1
//! - SHA-256: FIPS 180-2 "abc"
//! - BLAKE3: empty input

use crate::algorithm::Algorithm;
use crate::cipher::StreamCipherState;
use crate::hash::digest;
use crate::keyex::AgreementKeyPair;
use crate::signing::SignatureKeyPair;

/// RFC 8032 test 1 secret key. Publicly known; test use only.
pub const ED25519_SECRET: &str =
    "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";
pub const ED25519_PUBLIC: &str =
    "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a";
pub const ED25519_SIGNATURE_EMPTY: &str = "e5564300c360ac729086e2cc806e828a84877f1eb8e5d974d873e065224901555fb8821590a33bacc61e39701cf9b46bd25bf5f0595bbe24655141438e7a100b";

pub const X25519_ALICE_SECRET: &str =
    "77076d0a7318a57d3c16c17251b26645df4c2f87ebc0992ab177fba51db92c2a";
pub const X25519_ALICE_PUBLIC: &str =
    "8520f0098930a754748b7ddcb43ef75a0dbf3a0d26381af4eba4a98eaa9b4e6a";
pub const X25519_BOB_PUBLIC: &str =
    "de9edb7d7b7dc1b4d35b61c2ece435373f8343c85b78674dadfc7e146f882b4f";

pub const CHACHA20_ZERO_BLOCK: &str = "76b8e0ada0f13d90405d6ae55386bd28bdd219b8a08ded1aa836efcc8b770dc7da41597c5157488d7724e03fb8d84a376a43b8f41518a11cc387b669b2ee6586";

pub const SHA256_ABC: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
pub const BLAKE3_EMPTY: &str = "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ed25519_rfc8032() {
        let pair = SignatureKeyPair::from_secret(&hex::decode(ED25519_SECRET).unwrap()).unwrap();
        assert_eq!(hex::encode(pair.public_bytes()), ED25519_PUBLIC);
        let sig = pair.sign(b"").unwrap();
        assert_eq!(hex::encode(sig), ED25519_SIGNATURE_EMPTY);
    }

    #[test]
    fn test_x25519_rfc7748_public() {
        let alice =
            AgreementKeyPair::from_secret(&hex::decode(X25519_ALICE_SECRET).unwrap()).unwrap();
        assert_eq!(hex::encode(alice.public_bytes()), X25519_ALICE_PUBLIC);
        let bob = AgreementKeyPair::from_public(&hex::decode(X25519_BOB_PUBLIC).unwrap()).unwrap();
        assert!(!bob.has_private());
    }

    #[test]
    fn test_chacha20_zero_key_block() {
        let mut state = StreamCipherState::new(Algorithm::ChaCha20, &[0u8; 32], &[0u8; 12]).unwrap();
        let mut block = [0u8; 64];
        state.encrypt(&mut block).unwrap();
        assert_eq!(hex::encode(block), CHACHA20_ZERO_BLOCK);
    }

    #[test]
    fn test_hash_vectors() {
        assert_eq!(hex::encode(digest(Algorithm::Sha256, b"abc").unwrap()), SHA256_ABC);
        assert_eq!(hex::encode(digest(Algorithm::Blake3, b"").unwrap()), BLAKE3_EMPTY);
    }
}
