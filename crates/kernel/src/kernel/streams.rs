//! Envelopes, sessions and the push/flush/pop data verbs.

use super::Kernel;
use crate::envelope::EnvelopeObject;
use crate::handle::{Handle, KindSet};
use crate::object::{ObjectRecord, Payload};
use crate::session::transport::Transport;
use crate::session::SessionObject;
use crate::types::{EnvelopeFormat, SessionType};
use cryptkit_core::{CryptError, CryptResult};
use tracing::{debug, info};

const STREAMS: KindSet = KindSet::ENVELOPE.union(KindSet::SESSION);

impl Kernel {
    /// Create an envelope. [`EnvelopeFormat::Auto`] de-envelopes.
    pub fn create_envelope(&self, owner: Option<Handle>, format: EnvelopeFormat) -> CryptResult<Handle> {
        let owner = self.owner(owner, 1)?;
        let iterations = self.options_of(owner)?.keying_iterations;
        let envelope = EnvelopeObject::new(
            format,
            self.config.envelope.buffer_size,
            u32::try_from(iterations).unwrap_or(1),
        )
        .map_err(|e| {
            if e.is(cryptkit_core::ErrorCode::NotAvail) {
                e.with_detail(format!("envelope format {format:?}"))
            } else {
                e
            }
        })?;
        self.register(owner, Payload::Envelope(Box::new(envelope)), None)
    }

    pub fn destroy_envelope(&self, envelope: Handle) -> CryptResult<()> {
        self.destroy_kind(envelope, KindSet::ENVELOPE)
    }

    /// Create a session. Configure it through attributes, then set
    /// `SESSINFO_ACTIVE` to connect.
    pub fn create_session(&self, owner: Option<Handle>, session_type: SessionType) -> CryptResult<Handle> {
        let owner = self.owner(owner, 1)?;
        let session = SessionObject::new(session_type, self.config.envelope.buffer_size, &self.options_of(owner)?)?;
        self.register(owner, Payload::Session(Box::new(session)), None)
    }

    /// Close and destroy a session.
    pub fn destroy_session(&self, session: Handle) -> CryptResult<()> {
        if let Ok(cell) = self.cell(session, 1, KindSet::SESSION) {
            if let Some(session) = cell.lock().as_session_mut() {
                session.close();
            }
        }
        self.destroy_kind(session, KindSet::SESSION)
    }

    /// Run a session over `transport` instead of TCP.
    pub fn attach_transport(&self, session: Handle, transport: Box<dyn Transport>) -> CryptResult<()> {
        let cell = self.cell(session, 1, KindSet::SESSION)?;
        let mut record = cell.lock();
        let session = record.as_session_mut().ok_or_else(|| CryptError::param(1))?;
        session.attach_transport(transport)?;
        debug!("transport attached");
        Ok(())
    }

    fn with_stream<T>(&self, handle: Handle, f: impl FnOnce(&mut ObjectRecord) -> CryptResult<T>) -> CryptResult<T> {
        let cell = self.cell(handle, 1, STREAMS)?;
        let mut record = cell.lock();
        let result = record.ensure_idle().and_then(|()| f(&mut record));
        if let Err(e) = &result {
            record.note_error(e, None);
        }
        result
    }

    /// Push data into an envelope or session, returning how much was taken.
    pub fn push_data(&self, handle: Handle, data: &[u8]) -> CryptResult<usize> {
        if data.is_empty() {
            return Err(CryptError::param(2));
        }
        self.with_stream(handle, |record| match &mut record.payload {
            Payload::Envelope(envelope) => envelope.push(data, &mut self.random.lock()),
            Payload::Session(session) => session.push(data),
            _ => Err(CryptError::param(1)),
        })
    }

    /// End the input of an envelope, or send what a session has queued.
    pub fn flush_data(&self, handle: Handle) -> CryptResult<()> {
        self.with_stream(handle, |record| match &mut record.payload {
            Payload::Envelope(envelope) => envelope.flush(&mut self.random.lock()),
            Payload::Session(session) => session.flush(),
            _ => Err(CryptError::param(1)),
        })
    }

    /// Read processed data into `buf`.
    pub fn pop_data(&self, handle: Handle, buf: &mut [u8]) -> CryptResult<usize> {
        if buf.is_empty() {
            return Err(CryptError::param(2));
        }
        let count = self.with_stream(handle, |record| match &mut record.payload {
            Payload::Envelope(envelope) => Ok(envelope.pop(buf)),
            Payload::Session(session) => session.pop(buf),
            _ => Err(CryptError::param(1)),
        })?;
        if count > 0 {
            debug!(%handle, count, "data popped");
        }
        Ok(count)
    }

    /// Push all of `data`, draining output as needed, flush and collect
    /// the result. Convenience over the three streaming verbs.
    pub fn process_all(&self, envelope: Handle, data: &[u8]) -> CryptResult<Vec<u8>> {
        let mut output = Vec::new();
        let mut buf = vec![0u8; 4096];
        let mut offset = 0;
        while offset < data.len() {
            match self.push_data(envelope, &data[offset..]) {
                Ok(taken) => {
                    offset += taken;
                    self.drain(envelope, &mut buf, &mut output)?;
                }
                Err(e) if e.is(cryptkit_core::ErrorCode::Overflow) => {
                    if self.drain(envelope, &mut buf, &mut output)? == 0 {
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }
        self.flush_data(envelope)?;
        self.drain(envelope, &mut buf, &mut output)?;
        info!(%envelope, input = data.len(), output = output.len(), "envelope processed");
        Ok(output)
    }

    /// Pop everything available into `output`, returning how much was read.
    fn drain(&self, handle: Handle, buf: &mut [u8], output: &mut Vec<u8>) -> CryptResult<usize> {
        let mut total = 0;
        loop {
            let count = self.pop_data(handle, buf)?;
            if count == 0 {
                return Ok(total);
            }
            output.extend_from_slice(&buf[..count]);
            total += count;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::kernel;
    use crate::attribute::AttributeId;
    use crate::session::transport::memory_pair;
    use crate::types::{EnvelopeFormat, SessionType};
    use cryptkit_core::{ErrorCode, ErrorType};
    use cryptkit_crypto::Algorithm;
    use std::thread;

    #[test]
    fn test_password_envelope_round_trip() {
        let kernel = kernel();
        for len in [0usize, 1, 16, 4096] {
            let data: Vec<u8> = (0..len).map(|i| (i * 7) as u8).collect();
            let envelope = kernel.create_envelope(None, EnvelopeFormat::Cryptlib).unwrap();
            kernel
                .set_attribute_string(envelope, AttributeId::ENVINFO_PASSWORD, b"open sesame")
                .unwrap();
            let sealed = kernel.process_all(envelope, &data).unwrap();
            kernel.destroy_envelope(envelope).unwrap();

            let deenvelope = kernel.create_envelope(None, EnvelopeFormat::Auto).unwrap();
            let err = kernel.push_data(deenvelope, &sealed).unwrap_err();
            assert_eq!(err.kind(), ErrorCode::EnvelopeResource);
            assert_eq!(
                kernel.get_attribute(deenvelope, AttributeId::ATTRIBUTE_ERRORLOCUS).unwrap(),
                AttributeId::ENVINFO_PASSWORD.raw()
            );
            assert_eq!(
                kernel.get_attribute(deenvelope, AttributeId::ATTRIBUTE_ERRORTYPE).unwrap(),
                ErrorType::AttrAbsent.code()
            );
            kernel
                .set_attribute_string(deenvelope, AttributeId::ENVINFO_PASSWORD, b"open sesame")
                .unwrap();
            let opened = kernel.process_all(deenvelope, &sealed).unwrap();
            assert_eq!(opened, data, "length {len}");
            kernel.destroy_envelope(deenvelope).unwrap();
        }
        kernel.shutdown().unwrap();
    }

    #[test]
    fn test_key_envelope_with_context() {
        let kernel = kernel();
        let key = kernel.create_context(None, Algorithm::ChaCha20.id()).unwrap();
        kernel.generate_key(key).unwrap();
        let envelope = kernel.create_envelope(None, EnvelopeFormat::Cryptlib).unwrap();
        kernel.set_attribute(envelope, AttributeId::ENVINFO_KEY, key.raw()).unwrap();
        let sealed = kernel.process_all(envelope, b"shared secret").unwrap();

        let deenvelope = kernel.create_envelope(None, EnvelopeFormat::Auto).unwrap();
        assert_eq!(
            kernel.push_data(deenvelope, &sealed).unwrap_err().kind(),
            ErrorCode::EnvelopeResource
        );
        kernel.set_attribute(deenvelope, AttributeId::ENVINFO_KEY, key.raw()).unwrap();
        assert_eq!(kernel.process_all(deenvelope, &sealed).unwrap(), b"shared secret");
    }

    #[test]
    fn test_push_after_flush_and_truncation() {
        let kernel = kernel();
        let envelope = kernel.create_envelope(None, EnvelopeFormat::Cryptlib).unwrap();
        let sealed = kernel.process_all(envelope, b"plain content").unwrap();
        assert_eq!(kernel.push_data(envelope, b"more").unwrap_err().kind(), ErrorCode::Complete);

        let deenvelope = kernel.create_envelope(None, EnvelopeFormat::Auto).unwrap();
        kernel.push_data(deenvelope, &sealed[..sealed.len() - 4]).unwrap();
        assert_eq!(kernel.flush_data(deenvelope).unwrap_err().kind(), ErrorCode::Underflow);
    }

    #[test]
    fn test_declared_size_overrun_is_reported() {
        let kernel = kernel();
        let envelope = kernel.create_envelope(None, EnvelopeFormat::Cryptlib).unwrap();
        kernel.set_attribute(envelope, AttributeId::ENVINFO_DATASIZE, 4).unwrap();
        let err = kernel.process_all(envelope, b"0123456789").unwrap_err();
        assert_eq!(err.kind(), ErrorCode::Overflow);
    }

    #[test]
    fn test_foreign_envelope_formats_unavailable() {
        let kernel = kernel();
        assert_eq!(
            kernel.create_envelope(None, EnvelopeFormat::Pgp).unwrap_err().kind(),
            ErrorCode::NotAvail
        );
    }

    #[test]
    fn test_session_round_trip_over_memory_transport() {
        let kernel = kernel();
        let (client_end, server_end) = memory_pair();
        let server = kernel.create_session(None, SessionType::ChannelServer).unwrap();
        let client = kernel.create_session(None, SessionType::Channel).unwrap();
        kernel.attach_transport(server, Box::new(server_end)).unwrap();
        kernel.attach_transport(client, Box::new(client_end)).unwrap();

        thread::scope(|scope| {
            let server_side = scope.spawn(|| {
                kernel.set_attribute(server, AttributeId::SESSINFO_ACTIVE, 1).unwrap();
                let mut buf = [0u8; 64];
                let n = kernel.pop_data(server, &mut buf).unwrap();
                kernel.push_data(server, &buf[..n]).unwrap();
                kernel.flush_data(server).unwrap();
            });
            kernel.set_attribute(client, AttributeId::SESSINFO_ACTIVE, 1).unwrap();
            assert_eq!(kernel.push_data(client, b"ping").unwrap(), 4);
            kernel.flush_data(client).unwrap();
            let mut buf = [0u8; 64];
            let n = kernel.pop_data(client, &mut buf).unwrap();
            assert_eq!(&buf[..n], b"ping");
            server_side.join().unwrap();
        });

        assert_eq!(kernel.get_attribute(client, AttributeId::SESSINFO_ACTIVE).unwrap(), 1);
        kernel.destroy_session(client).unwrap();
        kernel.destroy_session(server).unwrap();
        kernel.shutdown().unwrap();
    }

    #[test]
    fn test_inactive_session_data_is_refused() {
        let kernel = kernel();
        let session = kernel.create_session(None, SessionType::Channel).unwrap();
        assert_eq!(kernel.push_data(session, b"x").unwrap_err().kind(), ErrorCode::NotInited);
        assert_eq!(kernel.push_data(session, &[]).unwrap_err().kind(), ErrorCode::Param2);
        let ctx = kernel.create_context(None, 1).unwrap();
        assert_eq!(kernel.push_data(ctx, b"x").unwrap_err().kind(), ErrorCode::Param1);
    }
}
