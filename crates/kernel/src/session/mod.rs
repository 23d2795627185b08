//! Sessions: secure channels streamed through push/flush/pop.
//!
//! Only the native channel protocol is built in. A session is configured
//! through attributes, activated by setting `SESSINFO_ACTIVE`, and then moves
//! data in records of at most [`channel::MAX_RECORD`] bytes.

pub mod channel;
pub mod transport;

use crate::attribute::{AttributeId, AttributeValue};
use crate::context::KeySnapshot;
use crate::object::{AttrEnv, AttrInput, AttributeHandler, Lifecycle, ObjectRef};
use crate::types::SessionType;
use channel::{Channel, ClientSettings, PeerInfo, ServerSettings};
use cryptkit_core::{CryptError, CryptResult, ErrorCode, ErrorType, OptionsConfig};
use cryptkit_crypto::EphemeralExchange;
use std::collections::VecDeque;
use tracing::{debug, info};
use transport::{TcpTransport, Timeouts, Transport};
use zeroize::Zeroizing;

/// Port used when `SESSINFO_SERVER_PORT` is not set.
pub const DEFAULT_PORT: u16 = 4433;
const LISTEN_ANY: &str = "0.0.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

pub struct SessionObject {
    role: Role,
    buffer_size: usize,
    timeouts: Timeouts,
    server_name: Option<String>,
    server_port: Option<u16>,
    username: Option<String>,
    password: Option<Zeroizing<String>>,
    private_key: Option<KeySnapshot>,
    pinned: Option<[u8; 32]>,
    transport: Option<Box<dyn Transport>>,
    channel: Option<Channel>,
    peer: PeerInfo,
    peer_address: Option<(String, u16)>,
    outgoing: Vec<u8>,
    incoming: VecDeque<u8>,
}

fn missing(attribute: AttributeId) -> CryptError {
    CryptError::new(ErrorCode::NotInited).with_locus(attribute.raw(), ErrorType::AttrAbsent)
}

impl SessionObject {
    pub fn new(session_type: SessionType, buffer_size: usize, options: &OptionsConfig) -> CryptResult<Self> {
        let role = match session_type {
            SessionType::Channel => Role::Client,
            SessionType::ChannelServer => Role::Server,
            _ => return Err(CryptError::new(ErrorCode::NotAvail)),
        };
        Ok(Self {
            role,
            buffer_size,
            timeouts: Timeouts::from_secs(options.connect_timeout, options.read_timeout, options.write_timeout),
            server_name: None,
            server_port: None,
            username: None,
            password: None,
            private_key: None,
            pinned: None,
            transport: None,
            channel: None,
            peer: PeerInfo::default(),
            peer_address: None,
            outgoing: Vec::new(),
            incoming: VecDeque::new(),
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_active(&self) -> bool {
        self.channel.is_some()
    }

    fn ensure_inactive(&self) -> CryptResult<()> {
        if self.is_active() {
            return Err(CryptError::new(ErrorCode::Inited).with_detail("session already active"));
        }
        Ok(())
    }

    fn ensure_active(&self) -> CryptResult<()> {
        if !self.is_active() {
            return Err(CryptError::new(ErrorCode::NotInited).with_detail("session is not active"));
        }
        Ok(())
    }

    /// Use `transport` instead of opening a TCP connection on activation.
    pub fn attach_transport(&mut self, transport: Box<dyn Transport>) -> CryptResult<()> {
        self.ensure_inactive()?;
        if self.transport.is_some() {
            return Err(CryptError::new(ErrorCode::Inited));
        }
        self.transport = Some(transport);
        Ok(())
    }

    fn open_transport(&mut self) -> CryptResult<Box<dyn Transport>> {
        if let Some(mut transport) = self.transport.take() {
            transport.set_timeouts(self.timeouts)?;
            return Ok(transport);
        }
        let port = self.server_port.unwrap_or(DEFAULT_PORT);
        match self.role {
            Role::Client => {
                let host = self
                    .server_name
                    .as_deref()
                    .ok_or_else(|| missing(AttributeId::SESSINFO_SERVER_NAME))?;
                Ok(Box::new(TcpTransport::connect(host, port, self.timeouts)?))
            }
            Role::Server => {
                if self.server_port.is_none() {
                    return Err(missing(AttributeId::SESSINFO_SERVER_PORT));
                }
                let host = self.server_name.as_deref().unwrap_or(LISTEN_ANY);
                Ok(Box::new(TcpTransport::accept(host, port, self.timeouts)?))
            }
        }
    }

    /// Connect (or accept) and run the handshake.
    pub fn activate(&mut self, exchange: EphemeralExchange) -> CryptResult<()> {
        self.ensure_inactive()?;
        let transport = self.open_transport()?;
        let (channel, peer) = match self.role {
            Role::Client => {
                let settings = ClientSettings {
                    username: self.username.as_deref(),
                    password: self.password.as_deref().map(String::as_str),
                    pinned: self.pinned,
                };
                Channel::client(transport, exchange, &settings)?
            }
            Role::Server => {
                let settings = ServerSettings {
                    identity: self.private_key.as_ref(),
                    username: self.username.as_deref(),
                    password: self.password.as_deref().map(String::as_str),
                };
                Channel::server(transport, exchange, &settings)?
            }
        };
        self.peer_address = channel.peer_address();
        self.peer = peer;
        self.channel = Some(channel);
        info!(role = ?self.role, peer = ?self.peer_address, "session active");
        Ok(())
    }

    /// Close the channel, sending the closing record first.
    pub fn close(&mut self) {
        if self.channel.is_some() && !self.outgoing.is_empty() {
            let _ = self.send_outgoing();
        }
        if let Some(mut channel) = self.channel.take() {
            channel.close();
            debug!(role = ?self.role, "session closed");
        }
    }

    fn channel_mut(&mut self) -> CryptResult<&mut Channel> {
        self.channel
            .as_mut()
            .ok_or_else(|| CryptError::new(ErrorCode::NotInited).with_detail("session is not active"))
    }

    fn send_outgoing(&mut self) -> CryptResult<()> {
        while !self.outgoing.is_empty() {
            let take = self.outgoing.len().min(channel::MAX_RECORD);
            let record: Vec<u8> = self.outgoing[..take].to_vec();
            self.channel_mut()?.send(&record, false)?;
            self.outgoing.drain(..take);
        }
        Ok(())
    }

    /// Queue data for sending, returning how much was accepted.
    pub fn push(&mut self, data: &[u8]) -> CryptResult<usize> {
        self.ensure_active()?;
        let free = self.buffer_size.saturating_sub(self.outgoing.len());
        if free == 0 {
            return Err(CryptError::new(ErrorCode::Overflow).with_detail("session send buffer full"));
        }
        let accepted = data.len().min(free);
        self.outgoing.extend_from_slice(&data[..accepted]);
        while self.outgoing.len() >= channel::MAX_RECORD {
            let record: Vec<u8> = self.outgoing.drain(..channel::MAX_RECORD).collect();
            self.channel_mut()?.send(&record, false)?;
        }
        Ok(accepted)
    }

    /// Send everything queued.
    pub fn flush(&mut self) -> CryptResult<()> {
        self.ensure_active()?;
        self.send_outgoing()
    }

    /// Read received data into `buf`, waiting for a record if none is
    /// buffered. `Complete` once the peer has closed and everything has
    /// been read.
    pub fn pop(&mut self, buf: &mut [u8]) -> CryptResult<usize> {
        self.ensure_active()?;
        while self.incoming.is_empty() {
            match self.channel_mut()?.recv()? {
                Some(record) => self.incoming.extend(record),
                None => return Err(CryptError::new(ErrorCode::Complete).with_detail("peer closed the session")),
            }
        }
        let count = buf.len().min(self.incoming.len());
        for (dst, src) in buf.iter_mut().zip(self.incoming.drain(..count)) {
            *dst = src;
        }
        Ok(count)
    }

    fn set_once<T>(slot: &mut Option<T>, value: T) -> CryptResult<()> {
        if slot.is_some() {
            return Err(CryptError::new(ErrorCode::Inited));
        }
        *slot = Some(value);
        Ok(())
    }
}

impl AttributeHandler for SessionObject {
    fn get_attr(&mut self, id: AttributeId, _env: &AttrEnv<'_>) -> CryptResult<AttributeValue> {
        let absent = || CryptError::new(ErrorCode::NotFound);
        let text = |s: &str| AttributeValue::String(s.as_bytes().to_vec());
        match id {
            AttributeId::ATTRIBUTE_BUFFERSIZE => Ok(AttributeValue::Int(self.buffer_size as i32)),
            AttributeId::SESSINFO_ACTIVE => Ok(AttributeValue::Bool(self.is_active())),
            AttributeId::SESSINFO_CONNECTIONACTIVE => {
                Ok(AttributeValue::Bool(self.channel.as_ref().is_some_and(Channel::is_open)))
            }
            AttributeId::SESSINFO_USERNAME => match self.role {
                Role::Server => self.peer.username.as_deref().map(text).ok_or_else(absent),
                Role::Client => self.username.as_deref().map(text).ok_or_else(absent),
            },
            AttributeId::SESSINFO_SERVER_NAME => self.server_name.as_deref().map(text).ok_or_else(absent),
            AttributeId::SESSINFO_SERVER_PORT => Ok(AttributeValue::Int(i32::from(
                self.server_port.unwrap_or(DEFAULT_PORT),
            ))),
            AttributeId::SESSINFO_SERVER_FINGERPRINT => self
                .peer
                .server_fingerprint
                .or(self.pinned)
                .or_else(|| {
                    self.private_key
                        .as_ref()
                        .and_then(|key| key.material.public_bytes())
                        .map(|public| channel::fingerprint(&public))
                })
                .map(|fp| AttributeValue::String(fp.to_vec()))
                .ok_or_else(absent),
            AttributeId::SESSINFO_CLIENT_NAME if self.role == Role::Server => self
                .peer_address
                .as_ref()
                .map(|(host, _)| text(host))
                .ok_or_else(absent),
            AttributeId::SESSINFO_CLIENT_PORT if self.role == Role::Server => self
                .peer_address
                .as_ref()
                .map(|(_, port)| AttributeValue::Int(i32::from(*port)))
                .ok_or_else(absent),
            AttributeId::SESSINFO_CLIENT_NAME | AttributeId::SESSINFO_CLIENT_PORT => {
                Err(CryptError::new(ErrorCode::NotAvail))
            }
            AttributeId::SESSINFO_VERSION => Ok(AttributeValue::Int(i32::from(channel::PROTOCOL_VERSION))),
            _ => Err(CryptError::new(ErrorCode::NotAvail)),
        }
    }

    fn set_attr(&mut self, id: AttributeId, value: AttrInput, env: &AttrEnv<'_>) -> CryptResult<()> {
        if id == AttributeId::SESSINFO_ACTIVE {
            return match (value.flag()?, self.is_active()) {
                (true, true) => Err(CryptError::new(ErrorCode::Inited)),
                (true, false) => {
                    let exchange = EphemeralExchange::generate(&mut *env.random.lock());
                    self.activate(exchange)
                }
                (false, true) => {
                    self.close();
                    Ok(())
                }
                (false, false) => Err(CryptError::new(ErrorCode::NotInited)),
            };
        }
        self.ensure_inactive()?;
        match id {
            AttributeId::ATTRIBUTE_BUFFERSIZE => self.buffer_size = value.int()? as usize,
            AttributeId::SESSINFO_USERNAME => Self::set_once(&mut self.username, value.text()?)?,
            AttributeId::SESSINFO_PASSWORD => Self::set_once(&mut self.password, Zeroizing::new(value.text()?))?,
            AttributeId::SESSINFO_SERVER_NAME => Self::set_once(&mut self.server_name, value.text()?)?,
            AttributeId::SESSINFO_SERVER_PORT => self.server_port = Some(value.int()? as u16),
            AttributeId::SESSINFO_VERSION => {}
            AttributeId::SESSINFO_SERVER_FINGERPRINT => {
                if self.role != Role::Client {
                    return Err(CryptError::new(ErrorCode::NotAvail));
                }
                let pin: [u8; 32] = value
                    .bytes()?
                    .try_into()
                    .map_err(|_| CryptError::new(ErrorCode::Param3))?;
                Self::set_once(&mut self.pinned, pin)?
            }
            AttributeId::SESSINFO_PRIVATEKEY => {
                if self.role != Role::Server {
                    return Err(CryptError::new(ErrorCode::NotAvail));
                }
                match value.into_object()? {
                    ObjectRef::Key(key) if key.signer().is_ok_and(|pair| pair.has_private()) => {
                        Self::set_once(&mut self.private_key, *key)?
                    }
                    _ => return Err(CryptError::new(ErrorCode::Param3)),
                }
            }
            _ => return Err(CryptError::new(ErrorCode::NotAvail)),
        }
        Ok(())
    }

    fn delete_attr(&mut self, _id: AttributeId, _env: &AttrEnv<'_>) -> CryptResult<()> {
        Err(CryptError::new(ErrorCode::NotAvail))
    }

    fn lifecycle(&self) -> Lifecycle {
        if self.is_active() {
            Lifecycle::Active
        } else {
            Lifecycle::Configured
        }
    }
}

impl Drop for SessionObject {
    fn drop(&mut self) {
        self.close();
    }
}
