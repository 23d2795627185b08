//! Byte transports under a channel session.

use cryptkit_core::{CryptError, CryptResult, ErrorCode};
use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};
use tracing::debug;

const ACCEPT_POLL: Duration = Duration::from_millis(10);

/// Connect, read and write limits for a transport.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub connect: Duration,
    pub read: Duration,
    pub write: Duration,
}

impl Timeouts {
    /// Build from option values in seconds. Zero means "do not wait".
    pub fn from_secs(connect: i32, read: i32, write: i32) -> Self {
        let secs = |v: i32| Duration::from_secs(v.max(0) as u64).max(Duration::from_millis(1));
        Self {
            connect: secs(connect),
            read: secs(read),
            write: secs(write),
        }
    }
}

/// A reliable, ordered byte stream.
pub trait Transport: Send {
    fn send(&mut self, data: &[u8]) -> CryptResult<()>;

    /// Fill `buf` completely. A closed peer is `Complete`, an expired read
    /// timeout is `Timeout`.
    fn recv_exact(&mut self, buf: &mut [u8]) -> CryptResult<()>;

    fn set_timeouts(&mut self, timeouts: Timeouts) -> CryptResult<()>;

    /// Remote address, if the transport has one.
    fn peer(&self) -> Option<(String, u16)> {
        None
    }

    fn close(&mut self) {}
}

fn io_error(err: std::io::Error, code: ErrorCode) -> CryptError {
    match err.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut => {
            CryptError::new(ErrorCode::Timeout).with_detail(err.to_string())
        }
        ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe => {
            CryptError::new(ErrorCode::Complete).with_detail("peer closed the connection")
        }
        _ => CryptError::new(code).with_detail(err.to_string()),
    }
}

pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn connect(host: &str, port: u16, timeouts: Timeouts) -> CryptResult<Self> {
        let addrs = (host, port)
            .to_socket_addrs()
            .map_err(|e| CryptError::new(ErrorCode::Open).with_detail(format!("{host}: {e}")))?;
        let mut last = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeouts.connect) {
                Ok(stream) => {
                    debug!(%addr, "channel connected");
                    let mut transport = Self { stream };
                    transport.set_timeouts(timeouts)?;
                    return Ok(transport);
                }
                Err(e) => last = Some(e),
            }
        }
        Err(match last {
            Some(e) if e.kind() == ErrorKind::TimedOut => CryptError::new(ErrorCode::Timeout).with_detail(e.to_string()),
            Some(e) => CryptError::new(ErrorCode::Open).with_detail(e.to_string()),
            None => CryptError::new(ErrorCode::Open).with_detail(format!("{host}: no addresses")),
        })
    }

    /// Listen on `host:port` and accept one client within the connect timeout.
    pub fn accept(host: &str, port: u16, timeouts: Timeouts) -> CryptResult<Self> {
        let listener = TcpListener::bind((host, port))
            .map_err(|e| CryptError::new(ErrorCode::Open).with_detail(format!("bind {host}:{port}: {e}")))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| CryptError::new(ErrorCode::Open).with_detail(e.to_string()))?;
        let deadline = Instant::now() + timeouts.connect;
        loop {
            match listener.accept() {
                Ok((stream, addr)) => {
                    debug!(%addr, "channel client accepted");
                    stream
                        .set_nonblocking(false)
                        .map_err(|e| CryptError::new(ErrorCode::Open).with_detail(e.to_string()))?;
                    let mut transport = Self { stream };
                    transport.set_timeouts(timeouts)?;
                    return Ok(transport);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(CryptError::new(ErrorCode::Timeout).with_detail("no client connected"));
                    }
                    std::thread::sleep(ACCEPT_POLL);
                }
                Err(e) => return Err(CryptError::new(ErrorCode::Open).with_detail(e.to_string())),
            }
        }
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, data: &[u8]) -> CryptResult<()> {
        self.stream.write_all(data).map_err(|e| io_error(e, ErrorCode::Write))
    }

    fn recv_exact(&mut self, buf: &mut [u8]) -> CryptResult<()> {
        self.stream.read_exact(buf).map_err(|e| io_error(e, ErrorCode::Read))
    }

    fn set_timeouts(&mut self, timeouts: Timeouts) -> CryptResult<()> {
        self.stream
            .set_read_timeout(Some(timeouts.read))
            .and_then(|()| self.stream.set_write_timeout(Some(timeouts.write)))
            .map_err(|e| CryptError::new(ErrorCode::Failed).with_detail(e.to_string()))
    }

    fn peer(&self) -> Option<(String, u16)> {
        self.stream
            .peer_addr()
            .ok()
            .map(|addr| (addr.ip().to_string(), addr.port()))
    }

    fn close(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

/// One end of an in-process transport pair.
pub struct MemoryTransport {
    tx: Option<Sender<Vec<u8>>>,
    rx: Receiver<Vec<u8>>,
    pending: VecDeque<u8>,
    read_timeout: Duration,
}

/// Two connected in-memory transports.
pub fn memory_pair() -> (MemoryTransport, MemoryTransport) {
    let (a_tx, b_rx) = mpsc::channel();
    let (b_tx, a_rx) = mpsc::channel();
    let end = |tx, rx| MemoryTransport {
        tx: Some(tx),
        rx,
        pending: VecDeque::new(),
        read_timeout: Duration::from_secs(30),
    };
    (end(a_tx, a_rx), end(b_tx, b_rx))
}

impl Transport for MemoryTransport {
    fn send(&mut self, data: &[u8]) -> CryptResult<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| CryptError::new(ErrorCode::Complete))?;
        tx.send(data.to_vec())
            .map_err(|_| CryptError::new(ErrorCode::Complete).with_detail("peer closed the connection"))
    }

    fn recv_exact(&mut self, buf: &mut [u8]) -> CryptResult<()> {
        let deadline = Instant::now() + self.read_timeout;
        while self.pending.len() < buf.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(chunk) => self.pending.extend(chunk),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(CryptError::new(ErrorCode::Timeout).with_detail("read timed out"))
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(CryptError::new(ErrorCode::Complete).with_detail("peer closed the connection"))
                }
            }
        }
        let len = buf.len();
        for (dst, src) in buf.iter_mut().zip(self.pending.drain(..len)) {
            *dst = src;
        }
        Ok(())
    }

    fn set_timeouts(&mut self, timeouts: Timeouts) -> CryptResult<()> {
        self.read_timeout = timeouts.read;
        Ok(())
    }

    fn close(&mut self) {
        self.tx = None;
    }
}
