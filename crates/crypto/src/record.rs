//! Sequenced ChaCha20-Poly1305 records.
//!
//! Used for envelope segments and channel frames. Each record is sealed
//! under a nonce built from a per-stream prefix and a monotonically rising
//! sequence number, so nonces never repeat under one key and records cannot
//! be reordered or dropped without detection. The final record of a stream
//! carries a flag in its associated data so truncation is detected too.

use crate::error::{EngineError, EngineResult};
use crate::keyex::{NONCE_SIZE, TAG_SIZE};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use zeroize::Zeroizing;

/// Upper bound on records sealed under one key.
pub const MAX_RECORDS: u64 = 1 << 48;

pub struct RecordCipher {
    cipher: ChaCha20Poly1305,
    prefix: [u8; 4],
    sequence: u64,
}

impl RecordCipher {
    pub fn new(key: &Zeroizing<[u8; 32]>, prefix: [u8; 4]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(key.as_slice())),
            prefix,
            sequence: 0,
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    fn next_nonce(&mut self) -> EngineResult<[u8; NONCE_SIZE]> {
        if self.sequence >= MAX_RECORDS {
            return Err(EngineError::KeystreamExhausted);
        }
        let mut nonce = [0u8; NONCE_SIZE];
        nonce[..4].copy_from_slice(&self.prefix);
        nonce[4..].copy_from_slice(&self.sequence.to_be_bytes());
        self.sequence += 1;
        Ok(nonce)
    }

    fn aad(&self, final_record: bool, extra: &[u8]) -> Vec<u8> {
        let mut aad = Vec::with_capacity(9 + extra.len());
        aad.extend_from_slice(&self.sequence.to_be_bytes());
        aad.push(final_record as u8);
        aad.extend_from_slice(extra);
        aad
    }

    /// Seal the next record. Output is ciphertext followed by the tag.
    pub fn seal(&mut self, plaintext: &[u8], final_record: bool, extra: &[u8]) -> EngineResult<Vec<u8>> {
        let aad = self.aad(final_record, extra);
        let nonce = self.next_nonce()?;
        self.cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .map_err(|_| EngineError::Malformed("record seal".to_string()))
    }

    /// Open the next record. The sequence only advances on success.
    pub fn open(&mut self, sealed: &[u8], final_record: bool, extra: &[u8]) -> EngineResult<Vec<u8>> {
        if sealed.len() < TAG_SIZE {
            return Err(EngineError::Malformed("record shorter than tag".to_string()));
        }
        let aad = self.aad(final_record, extra);
        let mut nonce = [0u8; NONCE_SIZE];
        nonce[..4].copy_from_slice(&self.prefix);
        nonce[4..].copy_from_slice(&self.sequence.to_be_bytes());
        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: sealed,
                    aad: &aad,
                },
            )
            .map_err(|_| EngineError::Authentication)?;
        self.next_nonce()?;
        Ok(plaintext)
    }
}

/// Size of a sealed record for a given plaintext length.
pub fn sealed_len(plaintext_len: usize) -> usize {
    plaintext_len + TAG_SIZE
}
