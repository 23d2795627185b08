//! Contexts, devices and the random pool.

use super::Kernel;
use crate::context::ContextObject;
use crate::device::DeviceObject;
use crate::handle::{Handle, KindSet};
use crate::object::Payload;
use crate::types::{CapabilityInfo, DeviceType};
use cryptkit_core::{CryptError, CryptResult, ErrorCode};
use cryptkit_crypto::Algorithm;
use tracing::{debug, info};

fn algorithm(raw: i32) -> CryptResult<Algorithm> {
    Algorithm::from_raw(raw)
        .ok_or_else(|| CryptError::new(ErrorCode::NotAvail).with_detail(format!("algorithm {raw}")))
}

impl Kernel {
    /// Create an unkeyed context. `owner` of `None` is the default user.
    pub fn create_context(&self, owner: Option<Handle>, algo: i32) -> CryptResult<Handle> {
        let owner = self.owner(owner, 1)?;
        let algorithm = algorithm(algo)?;
        let ctx = ContextObject::new(algorithm, &self.options_of(owner)?)?;
        self.register(owner, Payload::Context(Box::new(ctx)), None)
    }

    pub fn destroy_context(&self, ctx: Handle) -> CryptResult<()> {
        self.destroy_kind(ctx, KindSet::CONTEXT)
    }

    /// Run `f` on a context given as the first argument, recording failures.
    fn with_context<T>(
        &self,
        ctx: Handle,
        f: impl FnOnce(&mut ContextObject, &Kernel) -> CryptResult<T>,
    ) -> CryptResult<T> {
        let cell = self.cell(ctx, 1, KindSet::CONTEXT)?;
        let mut record = cell.lock();
        let result = match record.as_context_mut() {
            Some(context) => f(context, self),
            None => Err(CryptError::param(1)),
        };
        if let Err(e) = &result {
            record.note_error(e, None);
        }
        result
    }

    pub fn generate_key(&self, ctx: Handle) -> CryptResult<()> {
        self.with_context(ctx, |context, kernel| context.generate_key(&mut kernel.random.lock()))
    }

    /// Start an asynchronous key generation. Poll it with
    /// [`Kernel::async_query`].
    pub fn generate_key_async(&self, ctx: Handle) -> CryptResult<()> {
        self.with_context(ctx, |context, _| context.generate_key_async())
    }

    /// `Incomplete` while a generation runs, `Ok` once when it finishes,
    /// `Complete` when nothing is outstanding.
    pub fn async_query(&self, ctx: Handle) -> CryptResult<()> {
        self.with_context(ctx, |context, kernel| context.async_query(&mut kernel.random.lock()))
    }

    pub fn async_cancel(&self, ctx: Handle) -> CryptResult<()> {
        self.with_context(ctx, |context, _| context.async_cancel())
    }

    fn transform(&self, ctx: Handle, buf: &mut [u8], encrypt: bool) -> CryptResult<()> {
        let cell = self.cell(ctx, 1, KindSet::CONTEXT)?;
        let mut record = cell.lock();
        let result = (|| {
            record.ensure_idle()?;
            record.props.ensure_usable()?;
            let context = record.as_context_mut().ok_or_else(|| CryptError::param(1))?;
            let mut random = self.random.lock();
            if encrypt {
                context.encrypt(buf, &mut random)?;
            } else {
                context.decrypt(buf, &mut random)?;
            }
            drop(random);
            record.props.consume_usage()
        })();
        if let Err(e) = &result {
            record.note_error(e, None);
        }
        result
    }

    /// Encrypt `buf` in place. Hash and MAC contexts absorb the data; an
    /// empty buffer finalises them.
    pub fn encrypt(&self, ctx: Handle, buf: &mut [u8]) -> CryptResult<()> {
        self.transform(ctx, buf, true)
    }

    pub fn decrypt(&self, ctx: Handle, buf: &mut [u8]) -> CryptResult<()> {
        self.transform(ctx, buf, false)
    }

    pub fn query_capability(&self, algo: i32) -> CryptResult<CapabilityInfo> {
        self.ensure_running()?;
        algorithm(algo).map(CapabilityInfo::of)
    }

    /// Mix caller-supplied entropy into the random pool.
    pub fn add_random(&self, data: &[u8]) -> CryptResult<()> {
        self.ensure_running()?;
        if data.is_empty() {
            return Err(CryptError::param(1));
        }
        self.random.lock().add_entropy(data);
        Ok(())
    }

    /// Ask the pool to poll the operating system for fresh entropy.
    pub fn add_random_poll(&self) -> CryptResult<()> {
        self.ensure_running()?;
        self.random.lock().poll()?;
        debug!("random pool polled");
        Ok(())
    }

    pub fn device_open(&self, owner: Option<Handle>, device_type: DeviceType, name: &str) -> CryptResult<Handle> {
        let owner = self.owner(owner, 1)?;
        if name.is_empty() {
            return Err(CryptError::param(3));
        }
        let device = DeviceObject::open(device_type, name)?;
        let handle = self.register(owner, Payload::Device(Box::new(device)), None)?;
        info!(device = %name, %handle, "device opened");
        Ok(handle)
    }

    /// Close a device. Contexts created through it are signalled.
    pub fn device_close(&self, device: Handle) -> CryptResult<()> {
        self.destroy_kind(device, KindSet::DEVICE)
    }

    /// Create a context inside a device. Requires a logged-in device user.
    pub fn device_create_context(&self, device: Handle, algo: i32) -> CryptResult<Handle> {
        let cell = self.cell(device, 1, KindSet::DEVICE)?;
        let owner = {
            let mut record = cell.lock();
            let checked = record
                .as_device()
                .ok_or_else(|| CryptError::param(1))
                .and_then(DeviceObject::ensure_logged_in);
            if let Err(e) = checked {
                record.note_error(&e, None);
                return Err(e);
            }
            record.owner
        };
        let algorithm = algorithm(algo)?;
        let ctx = ContextObject::new(algorithm, &self.options_of(owner)?)?;
        self.register(owner, Payload::Context(Box::new(ctx)), Some(device))
    }

    pub fn device_query_capability(&self, device: Handle, algo: i32) -> CryptResult<CapabilityInfo> {
        self.cell(device, 1, KindSet::DEVICE)?;
        algorithm(algo).map(CapabilityInfo::of)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::kernel;
    use crate::attribute::AttributeId;
    use crate::types::DeviceType;
    use cryptkit_core::ErrorCode;
    use cryptkit_crypto::Algorithm;

    #[test]
    fn test_stream_cipher_round_trip() {
        let kernel = kernel();
        for len in [0usize, 1, 16, 4096] {
            let ctx = kernel.create_context(None, Algorithm::ChaCha20.id()).unwrap();
            kernel.generate_key(ctx).unwrap();
            let plaintext: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let mut buf = plaintext.clone();
            kernel.encrypt(ctx, &mut buf).unwrap();
            if len >= 16 {
                assert_ne!(buf, plaintext);
            }
            let iv = kernel.get_attribute_bytes(ctx, AttributeId::CTXINFO_IV).unwrap();
            kernel.set_attribute_string(ctx, AttributeId::CTXINFO_IV, &iv).unwrap();
            kernel.decrypt(ctx, &mut buf).unwrap();
            assert_eq!(buf, plaintext, "length {len}");
            kernel.destroy_context(ctx).unwrap();
        }
    }

    #[test]
    fn test_unkeyed_context_cannot_encrypt() {
        let kernel = kernel();
        let ctx = kernel.create_context(None, Algorithm::ChaCha20.id()).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(kernel.encrypt(ctx, &mut buf).unwrap_err().kind(), ErrorCode::NotInited);
        kernel.generate_key(ctx).unwrap();
        assert_eq!(kernel.generate_key(ctx).unwrap_err().kind(), ErrorCode::Inited);
    }

    #[test]
    fn test_unknown_algorithm() {
        let kernel = kernel();
        assert_eq!(kernel.create_context(None, 42).unwrap_err().kind(), ErrorCode::NotAvail);
        assert_eq!(kernel.query_capability(42).unwrap_err().kind(), ErrorCode::NotAvail);
        let info = kernel.query_capability(Algorithm::XChaCha20.id()).unwrap();
        assert_eq!(info.iv_size, 24);
    }

    #[test]
    fn test_async_generation_lifecycle() {
        let kernel = kernel();
        let ctx = kernel.create_context(None, Algorithm::Ed25519.id()).unwrap();
        assert_eq!(kernel.async_query(ctx).unwrap_err().kind(), ErrorCode::Complete);
        kernel.generate_key_async(ctx).unwrap();
        assert_eq!(kernel.async_query(ctx).unwrap_err().kind(), ErrorCode::Incomplete);
        loop {
            match kernel.async_query(ctx) {
                Ok(()) => break,
                Err(e) => assert_eq!(e.kind(), ErrorCode::Incomplete),
            }
        }
        assert_eq!(kernel.async_query(ctx).unwrap_err().kind(), ErrorCode::Complete);
        assert!(kernel.get_attribute_bytes(ctx, AttributeId::CTXINFO_KEY_COMPONENTS).is_ok());
    }

    #[test]
    fn test_async_cancel_never_succeeds() {
        let kernel = kernel();
        let ctx = kernel.create_context(None, Algorithm::Ed25519.id()).unwrap();
        kernel.generate_key_async(ctx).unwrap();
        let _ = kernel.async_query(ctx);
        kernel.async_cancel(ctx).unwrap();
        assert!(kernel.async_query(ctx).is_err());
    }

    #[test]
    fn test_usage_count_limits_operations() {
        let kernel = kernel();
        let ctx = kernel.create_context(None, Algorithm::ChaCha20.id()).unwrap();
        kernel.generate_key(ctx).unwrap();
        kernel.set_attribute(ctx, AttributeId::PROPERTY_USAGECOUNT, 1).unwrap();
        let mut buf = [0u8; 8];
        kernel.encrypt(ctx, &mut buf).unwrap();
        assert_eq!(kernel.encrypt(ctx, &mut buf).unwrap_err().kind(), ErrorCode::Permission);
    }

    #[test]
    fn test_failed_operation_keeps_usage_count() {
        let kernel = kernel();
        let ctx = kernel.create_context(None, Algorithm::ChaCha20.id()).unwrap();
        kernel.set_attribute(ctx, AttributeId::PROPERTY_USAGECOUNT, 1).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(kernel.encrypt(ctx, &mut buf).unwrap_err().kind(), ErrorCode::NotInited);
        assert_eq!(kernel.get_attribute(ctx, AttributeId::PROPERTY_USAGECOUNT).unwrap(), 1);
        kernel.generate_key(ctx).unwrap();
        kernel.encrypt(ctx, &mut buf).unwrap();
        assert_eq!(kernel.get_attribute(ctx, AttributeId::PROPERTY_USAGECOUNT).unwrap(), 0);
    }

    #[test]
    fn test_device_contexts_need_login_and_die_with_device() {
        let kernel = kernel();
        let device = kernel.device_open(None, DeviceType::None, "soft").unwrap();
        assert_eq!(
            kernel.device_create_context(device, 1).unwrap_err().kind(),
            ErrorCode::Permission
        );
        kernel
            .set_attribute_string(device, AttributeId::DEVINFO_INITIALISE, b"so-pin")
            .unwrap();
        let ctx = kernel.device_create_context(device, 1).unwrap();
        kernel.generate_key(ctx).unwrap();
        kernel
            .set_attribute_string(device, AttributeId::DEVINFO_ZEROISE, b"so-pin")
            .unwrap();
        assert_eq!(kernel.generate_key(ctx).unwrap_err().kind(), ErrorCode::Signalled);
        kernel.destroy_context(ctx).unwrap();
        kernel.device_close(device).unwrap();
        kernel.shutdown().unwrap();
    }

    #[test]
    fn test_hardware_devices_unavailable() {
        let kernel = kernel();
        assert_eq!(
            kernel.device_open(None, DeviceType::Pkcs11, "slot").unwrap_err().kind(),
            ErrorCode::NotAvail
        );
    }
}
