//! Native secure channel: handshake and record layer.
//!
//! ```text
//! client hello   "CKCH" | version | ephemeral X25519 public (32)
//! server hello   "CKSH" | version | ephemeral X25519 public (32) | has_identity
//!                [ | Ed25519 identity (32) | signature (64) over the transcript ]
//! records        u32 BE length (high bit on the closing record) | sealed body
//! ```
//!
//! Traffic keys come from the X25519 exchange and a BLAKE3 hash of both
//! hellos. The first client record carries the credentials; the server
//! answers with a one-byte verdict.

use super::transport::Transport;
use crate::context::KeySnapshot;
use cryptkit_core::{CryptError, CryptResult, ErrorCode};
use cryptkit_crypto::{signing, EphemeralExchange, RecordCipher, SignatureKeyPair};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

pub const PROTOCOL_VERSION: u8 = 1;
const CLIENT_HELLO: &[u8; 4] = b"CKCH";
const SERVER_HELLO: &[u8; 4] = b"CKSH";
const CLIENT_PREFIX: [u8; 4] = *b"CKc0";
const SERVER_PREFIX: [u8; 4] = *b"CKs0";
const CLOSE_FLAG: u32 = 0x8000_0000;
const SIGNATURE_CONTEXT: &[u8] = b"cryptkit channel server identity\0";

/// Largest plaintext carried by one record.
pub const MAX_RECORD: usize = 16 * 1024;

const AUTH_OK: u8 = 0;
const AUTH_REJECTED: u8 = 1;

/// Fingerprint of a server identity key.
pub fn fingerprint(public_key: &[u8]) -> [u8; 32] {
    *blake3::hash(public_key).as_bytes()
}

#[derive(Serialize, Deserialize)]
struct Credentials {
    username: Option<String>,
    password: Option<String>,
}

pub struct ClientSettings<'a> {
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
    pub pinned: Option<[u8; 32]>,
}

pub struct ServerSettings<'a> {
    pub identity: Option<&'a KeySnapshot>,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
}

/// What the handshake learned about the peer.
#[derive(Debug, Clone, Default)]
pub struct PeerInfo {
    /// Fingerprint of the server identity, when one was presented.
    pub server_fingerprint: Option<[u8; 32]>,
    /// Username the client authenticated with.
    pub username: Option<String>,
}

pub struct Channel {
    transport: Box<dyn Transport>,
    sender: RecordCipher,
    receiver: RecordCipher,
    transcript: [u8; 32],
    peer_closed: bool,
    closed: bool,
}

fn handshake_error(detail: &str) -> CryptError {
    CryptError::new(ErrorCode::BadData).with_detail(format!("channel handshake: {detail}"))
}

fn read_hello(transport: &mut dyn Transport, magic: &[u8; 4]) -> CryptResult<Vec<u8>> {
    let mut head = [0u8; 37];
    transport.recv_exact(&mut head)?;
    if &head[..4] != magic {
        return Err(handshake_error("unexpected hello"));
    }
    if head[4] != PROTOCOL_VERSION {
        return Err(CryptError::new(ErrorCode::NotAvail).with_detail(format!("channel version {}", head[4])));
    }
    Ok(head.to_vec())
}

fn transcript_hash(client_hello: &[u8], server_core: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(client_hello);
    hasher.update(server_core);
    *hasher.finalize().as_bytes()
}

fn identity_message(transcript: &[u8; 32]) -> Vec<u8> {
    [SIGNATURE_CONTEXT, transcript.as_slice()].concat()
}

fn credential_matches(expected: Option<&str>, given: Option<&str>) -> bool {
    match (expected, given) {
        (None, _) => true,
        (Some(expected), Some(given)) => bool::from(expected.as_bytes().ct_eq(given.as_bytes())),
        (Some(_), None) => false,
    }
}

impl Channel {
    /// Run the client side of the handshake over `transport`.
    pub fn client(
        mut transport: Box<dyn Transport>,
        mut exchange: EphemeralExchange,
        settings: &ClientSettings<'_>,
    ) -> CryptResult<(Self, PeerInfo)> {
        let mut client_hello = Vec::with_capacity(37);
        client_hello.extend_from_slice(CLIENT_HELLO);
        client_hello.push(PROTOCOL_VERSION);
        client_hello.extend_from_slice(&exchange.public);
        transport.send(&client_hello)?;

        let mut server_core = read_hello(transport.as_mut(), SERVER_HELLO)?;
        let mut flag = [0u8; 1];
        transport.recv_exact(&mut flag)?;
        server_core.push(flag[0]);
        let identity = match flag[0] {
            0 => None,
            1 => {
                let mut public = [0u8; 32];
                transport.recv_exact(&mut public)?;
                server_core.extend_from_slice(&public);
                Some(public)
            }
            _ => return Err(handshake_error("bad identity flag")),
        };
        let transcript = transcript_hash(&client_hello, &server_core);

        let mut server_fingerprint = None;
        if let Some(public) = identity {
            let mut signature = [0u8; 64];
            transport.recv_exact(&mut signature)?;
            signing::verify(&public, &identity_message(&transcript), &signature).map_err(|_| {
                warn!("server identity signature did not verify");
                CryptError::new(ErrorCode::Signature).with_detail("server identity signature")
            })?;
            server_fingerprint = Some(fingerprint(&public));
        }
        if let Some(pinned) = settings.pinned {
            let presented = server_fingerprint.unwrap_or([0; 32]);
            if !bool::from(pinned.as_slice().ct_eq(presented.as_slice())) || server_fingerprint.is_none() {
                transport.close();
                return Err(CryptError::new(ErrorCode::WrongKey).with_detail("server key does not match fingerprint"));
            }
        }

        let keys = exchange.agree(&server_core[5..37], &transcript)?;
        let mut channel = Self {
            transport,
            sender: RecordCipher::new(&keys.client_to_server, CLIENT_PREFIX),
            receiver: RecordCipher::new(&keys.server_to_client, SERVER_PREFIX),
            transcript,
            peer_closed: false,
            closed: false,
        };

        let credentials = Zeroizing::new(
            serde_json::to_vec(&Credentials {
                username: settings.username.map(str::to_string),
                password: settings.password.map(str::to_string),
            })
            .map_err(|e| CryptError::new(ErrorCode::Failed).with_detail(e.to_string()))?,
        );
        channel.send(&credentials, false)?;
        match channel.recv()?.as_deref() {
            Some([AUTH_OK]) => {}
            Some([AUTH_REJECTED]) => {
                channel.transport.close();
                return Err(CryptError::new(ErrorCode::Permission).with_detail("server rejected credentials"));
            }
            _ => return Err(handshake_error("bad authentication reply")),
        }
        info!(authenticated_server = server_fingerprint.is_some(), "channel established");
        Ok((
            channel,
            PeerInfo {
                server_fingerprint,
                username: settings.username.map(str::to_string),
            },
        ))
    }

    /// Run the server side of the handshake over `transport`.
    pub fn server(
        mut transport: Box<dyn Transport>,
        mut exchange: EphemeralExchange,
        settings: &ServerSettings<'_>,
    ) -> CryptResult<(Self, PeerInfo)> {
        let client_hello = read_hello(transport.as_mut(), CLIENT_HELLO)?;
        let identity: Option<&SignatureKeyPair> = settings.identity.map(|key| key.signer()).transpose()?;

        let mut server_core = Vec::with_capacity(70);
        server_core.extend_from_slice(SERVER_HELLO);
        server_core.push(PROTOCOL_VERSION);
        server_core.extend_from_slice(&exchange.public);
        server_core.push(u8::from(identity.is_some()));
        if let Some(pair) = identity {
            server_core.extend_from_slice(&pair.public_bytes());
        }
        let transcript = transcript_hash(&client_hello, &server_core);
        let mut hello = server_core.clone();
        if let Some(pair) = identity {
            hello.extend_from_slice(&pair.sign(&identity_message(&transcript))?);
        }
        transport.send(&hello)?;

        let keys = exchange.agree(&client_hello[5..37], &transcript)?;
        let mut channel = Self {
            transport,
            sender: RecordCipher::new(&keys.server_to_client, SERVER_PREFIX),
            receiver: RecordCipher::new(&keys.client_to_server, CLIENT_PREFIX),
            transcript,
            peer_closed: false,
            closed: false,
        };

        let record = channel
            .recv()?
            .ok_or_else(|| handshake_error("client closed before authenticating"))?;
        let record = Zeroizing::new(record);
        let credentials: Credentials =
            serde_json::from_slice(&record).map_err(|_| handshake_error("bad credentials record"))?;
        let accepted = credential_matches(settings.username, credentials.username.as_deref())
            & credential_matches(settings.password, credentials.password.as_deref());
        if !accepted {
            let _ = channel.send(&[AUTH_REJECTED], true);
            channel.transport.close();
            warn!(username = ?credentials.username, "channel client rejected");
            return Err(CryptError::new(ErrorCode::Permission).with_detail("client credentials rejected"));
        }
        channel.send(&[AUTH_OK], false)?;
        debug!(username = ?credentials.username, "channel client authenticated");
        let peer = PeerInfo {
            server_fingerprint: identity.map(|pair| fingerprint(&pair.public_bytes())),
            username: credentials.username,
        };
        Ok((channel, peer))
    }

    pub fn peer_address(&self) -> Option<(String, u16)> {
        self.transport.peer()
    }

    pub fn is_open(&self) -> bool {
        !self.closed && !self.peer_closed
    }

    /// Seal and send one record. A closing record ends the outbound stream.
    pub fn send(&mut self, data: &[u8], close: bool) -> CryptResult<()> {
        if self.closed {
            return Err(CryptError::new(ErrorCode::Complete));
        }
        if data.len() > MAX_RECORD {
            return Err(CryptError::new(ErrorCode::Overflow));
        }
        let sealed = self.sender.seal(data, close, &self.transcript)?;
        let mut len = sealed.len() as u32;
        if close {
            len |= CLOSE_FLAG;
            self.closed = true;
        }
        let mut frame = Vec::with_capacity(4 + sealed.len());
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(&sealed);
        self.transport.send(&frame)
    }

    /// Receive one record. `None` once the peer has closed its stream.
    pub fn recv(&mut self) -> CryptResult<Option<Vec<u8>>> {
        if self.peer_closed {
            return Ok(None);
        }
        let mut head = [0u8; 4];
        match self.transport.recv_exact(&mut head) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorCode::Complete => {
                self.peer_closed = true;
                return Ok(None);
            }
            Err(err) => return Err(err),
        }
        let raw = u32::from_be_bytes(head);
        let close = raw & CLOSE_FLAG != 0;
        let len = (raw & !CLOSE_FLAG) as usize;
        if len > MAX_RECORD + 64 {
            return Err(CryptError::new(ErrorCode::BadData).with_detail("oversized channel record"));
        }
        let mut sealed = vec![0u8; len];
        self.transport.recv_exact(&mut sealed)?;
        let data = self
            .receiver
            .open(&sealed, close, &self.transcript)
            .map_err(|_| CryptError::new(ErrorCode::BadData).with_detail("channel record failed authentication"))?;
        if close {
            self.peer_closed = true;
        }
        Ok(Some(data))
    }

    /// Send the closing record and release the transport.
    pub fn close(&mut self) {
        if !self.closed {
            let _ = self.send(&[], true);
        }
        self.transport.close();
    }
}

#[cfg(test)]
mod tests {
    use super::super::transport::memory_pair;
    use super::*;
    use crate::context::KeyMaterial;
    use cryptkit_crypto::{Algorithm, HardwareRng};
    use std::thread;

    fn identity() -> KeySnapshot {
        KeySnapshot {
            algorithm: Algorithm::Ed25519,
            label: Some("server".into()),
            material: KeyMaterial::from_seed(Algorithm::Ed25519, &[7; 32]).unwrap(),
            non_exportable: false,
            attached: None,
        }
    }

    fn run(
        server_identity: Option<KeySnapshot>,
        server_password: Option<&'static str>,
        client_password: Option<&'static str>,
        pinned: Option<[u8; 32]>,
    ) -> (CryptResult<(Channel, PeerInfo)>, CryptResult<(Channel, PeerInfo)>) {
        let (a, b) = memory_pair();
        let server = thread::spawn(move || {
            let exchange = EphemeralExchange::generate(&mut HardwareRng::new());
            let settings = ServerSettings {
                identity: server_identity.as_ref(),
                username: None,
                password: server_password,
            };
            Channel::server(Box::new(b), exchange, &settings)
        });
        let exchange = EphemeralExchange::generate(&mut HardwareRng::new());
        let settings = ClientSettings {
            username: Some("alice"),
            password: client_password,
            pinned,
        };
        let client = Channel::client(Box::new(a), exchange, &settings);
        (client, server.join().unwrap())
    }

    #[test]
    fn test_records_flow_both_ways() {
        let (client, server) = run(None, None, None, None);
        let (mut client, _) = client.unwrap();
        let (mut server, peer) = server.unwrap();
        assert_eq!(peer.username.as_deref(), Some("alice"));

        client.send(b"ping", false).unwrap();
        assert_eq!(server.recv().unwrap().unwrap(), b"ping");
        server.send(b"pong", false).unwrap();
        assert_eq!(client.recv().unwrap().unwrap(), b"pong");

        client.close();
        assert_eq!(server.recv().unwrap().unwrap(), b"");
        assert!(server.recv().unwrap().is_none());
    }

    #[test]
    fn test_pinned_fingerprint() {
        let key = identity();
        let good = fingerprint(&key.material.public_bytes().unwrap());
        let (client, server) = run(Some(key.clone()), None, None, Some(good));
        assert_eq!(client.unwrap().1.server_fingerprint, Some(good));
        assert!(server.is_ok());

        let (client, _) = run(Some(key), None, None, Some([1; 32]));
        assert_eq!(client.err().unwrap().kind(), ErrorCode::WrongKey);
    }

    #[test]
    fn test_rejected_password() {
        let (client, server) = run(None, Some("sesame"), Some("guess"), None);
        assert_eq!(client.err().unwrap().kind(), ErrorCode::Permission);
        assert_eq!(server.err().unwrap().kind(), ErrorCode::Permission);
    }
}
