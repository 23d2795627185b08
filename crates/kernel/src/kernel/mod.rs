//! The kernel process context.
//!
//! A [`Kernel`] owns the handle registry, the random pool, the account
//! directory and the configuration. Every API verb is a method on it; the
//! verbs are grouped by object kind in the submodules. Handles are checked
//! here before any object-specific code runs, and a handle that does not
//! resolve (or resolves to the wrong kind) is reported as a bad parameter
//! at its 1-based argument position.

mod accounts;
mod attributes;
mod certs;
mod contexts;
mod keysets;
mod mechanisms;
mod streams;

use crate::context::KeySnapshot;
use crate::handle::{Handle, KindSet, ObjectKind};
use crate::object::{ObjectCell, ObjectRecord, Payload};
use crate::registry::HandleRegistry;
use crate::user::UserObject;
use accounts::Accounts;
use cryptkit_core::{CryptError, CryptResult, ErrorCode, KernelConfig, OptionsConfig, UserRole};
use cryptkit_crypto::RandomPool;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name of the user every kernel starts with.
pub const DEFAULT_USER: &str = "default";

pub struct Kernel {
    registry: HandleRegistry<ObjectCell>,
    random: Mutex<RandomPool>,
    config: KernelConfig,
    accounts: Mutex<Accounts>,
    default_user: Handle,
    shut_down: AtomicBool,
}

impl Kernel {
    /// Start a kernel: validate the configuration, seed the random pool and
    /// create the default user.
    pub fn new(config: KernelConfig) -> CryptResult<Self> {
        config
            .validate()
            .map_err(|e| CryptError::param(1).with_detail(e.to_string()))?;
        let random = Mutex::new(RandomPool::new()?);
        let registry = HandleRegistry::new(config.registry.max_objects);
        let user = UserObject::new(DEFAULT_USER, UserRole::Normal, config.options.clone(), true);
        let placeholder = Handle::from_raw(1 << crate::handle::INDEX_BITS)
            .ok_or_else(|| CryptError::new(ErrorCode::Failed))?;
        let default_user = registry.allocate(
            ObjectKind::User,
            Mutex::new(ObjectRecord::new(placeholder, Payload::User(Box::new(user)))),
            None,
        )?;
        if let Ok((_, cell)) = registry.resolve(default_user) {
            cell.lock().owner = default_user;
        }
        let accounts = Accounts::from_config(&config.users, &mut random.lock());
        info!(
            max_objects = registry.capacity(),
            users = config.users.len(),
            "cryptkit kernel started"
        );
        Ok(Self {
            registry,
            random,
            config,
            accounts: Mutex::new(accounts),
            default_user,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Handle of the default user.
    pub fn default_user(&self) -> Handle {
        self.default_user
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Number of live objects, the default user included.
    pub fn object_count(&self) -> usize {
        self.registry.len()
    }

    /// Destroy every remaining object. Fails with `Incomplete` if objects
    /// other than the default user were still alive; the kernel is unusable
    /// afterwards either way.
    pub fn shutdown(&self) -> CryptResult<()> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Err(CryptError::new(ErrorCode::NotInited));
        }
        let mut leaked = 0usize;
        for (handle, kind) in self.registry.live_handles() {
            if handle == self.default_user {
                continue;
            }
            if self.registry.destroy(handle).is_ok() {
                leaked += 1;
                warn!(%handle, %kind, "object still alive at shutdown");
            }
        }
        if let Err(e) = self.registry.destroy(self.default_user) {
            warn!(error = %e, "default user could not be released");
        }
        info!(leaked, "cryptkit kernel shut down");
        if leaked > 0 {
            return Err(CryptError::new(ErrorCode::Incomplete)
                .with_detail(format!("{leaked} objects were not destroyed")));
        }
        Ok(())
    }

    fn ensure_running(&self) -> CryptResult<()> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(CryptError::new(ErrorCode::NotInited).with_detail("kernel has been shut down"));
        }
        Ok(())
    }

    /// Resolve `handle` given as argument `param`, requiring one of `kinds`.
    fn object(&self, handle: Handle, param: usize, kinds: KindSet) -> CryptResult<(ObjectKind, Arc<ObjectCell>)> {
        self.ensure_running()?;
        match self.registry.resolve(handle) {
            Ok((kind, cell)) if kinds.contains(kind) => Ok((kind, cell)),
            Ok(_) => Err(CryptError::param(param)),
            Err(e) if e.is(ErrorCode::Signalled) => Err(e),
            Err(_) => Err(CryptError::param(param)),
        }
    }

    fn cell(&self, handle: Handle, param: usize, kinds: KindSet) -> CryptResult<Arc<ObjectCell>> {
        self.object(handle, param, kinds).map(|(_, cell)| cell)
    }

    /// Resolve an owner argument. `None` selects the default user.
    fn owner(&self, owner: Option<Handle>, param: usize) -> CryptResult<Handle> {
        let owner = owner.unwrap_or(self.default_user);
        self.cell(owner, param, KindSet::USER)?;
        Ok(owner)
    }

    /// Option set in force for `owner`.
    fn options_of(&self, owner: Handle) -> CryptResult<OptionsConfig> {
        let cell = self.cell(owner, 1, KindSet::USER)?;
        let record = cell.lock();
        record
            .as_user()
            .map(|user| user.options().clone())
            .ok_or_else(|| CryptError::new(ErrorCode::Failed))
    }

    /// Register a new object. Objects of logged-in users depend on the
    /// user unless another dependency is given.
    fn register(&self, owner: Handle, payload: Payload, depends_on: Option<Handle>) -> CryptResult<Handle> {
        let kind = payload.kind();
        let depends_on = depends_on.or((owner != self.default_user).then_some(owner));
        let handle = self
            .registry
            .allocate(kind, Mutex::new(ObjectRecord::new(owner, payload)), depends_on)?;
        debug!(%handle, %kind, %owner, "object created");
        Ok(handle)
    }

    /// Destroy an object of one of `kinds`. Signalled objects may be
    /// destroyed too; that is the only thing left to do with them.
    fn destroy_kind(&self, handle: Handle, kinds: KindSet) -> CryptResult<()> {
        self.ensure_running()?;
        match self.registry.kind_of(handle) {
            Ok(kind) if kinds.contains(kind) => {}
            _ => return Err(CryptError::param(1)),
        }
        if handle == self.default_user {
            return Err(CryptError::new(ErrorCode::Permission).with_detail("the default user cannot be destroyed"));
        }
        let (_, signalled) = self.registry.destroy(handle).map_err(|_| CryptError::param(1))?;
        debug!(%handle, "object destroyed");
        for dependant in signalled {
            warn!(%dependant, parent = %handle, "object signalled");
        }
        Ok(())
    }

    /// Destroy any object.
    pub fn destroy_object(&self, handle: Handle) -> CryptResult<()> {
        self.destroy_kind(handle, KindSet::ALL.without(KindSet::USER))
    }

    /// Copy out the key of a context given as argument `param`.
    fn key_snapshot(&self, handle: Handle, param: usize) -> CryptResult<KeySnapshot> {
        let cell = self.cell(handle, param, KindSet::CONTEXT)?;
        let record = cell.lock();
        let ctx = record.as_context().ok_or_else(|| CryptError::param(param))?;
        ctx.snapshot(record.props.non_exportable)
    }

    fn distinct(first: Handle, second: Handle, param: usize) -> CryptResult<()> {
        if first == second {
            return Err(CryptError::param(param));
        }
        Ok(())
    }
}

/// Copy `data` out under the two-phase length protocol: with no buffer the
/// required length is returned; a short buffer is `Overflow`.
pub(crate) fn copy_out(data: &[u8], buf: Option<&mut [u8]>) -> CryptResult<usize> {
    if let Some(buf) = buf {
        if buf.len() < data.len() {
            return Err(CryptError::new(ErrorCode::Overflow)
                .with_detail(format!("need {} bytes, have {}", data.len(), buf.len())));
        }
        buf[..data.len()].copy_from_slice(data);
    }
    Ok(data.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(super) fn kernel() -> Kernel {
        Kernel::new(KernelConfig::default()).unwrap()
    }

    #[test]
    fn test_kernel_starts_with_default_user() {
        let kernel = kernel();
        assert_eq!(kernel.object_count(), 1);
        let record = kernel.cell(kernel.default_user(), 1, KindSet::USER).unwrap();
        assert_eq!(record.lock().owner, kernel.default_user());
    }

    #[test]
    fn test_shutdown_reports_leaks() {
        let kernel = kernel();
        kernel.create_context(None, 1).unwrap();
        assert_eq!(kernel.shutdown().unwrap_err().kind(), ErrorCode::Incomplete);
        assert_eq!(kernel.create_context(None, 1).unwrap_err().kind(), ErrorCode::NotInited);
        assert_eq!(kernel.shutdown().unwrap_err().kind(), ErrorCode::NotInited);
    }

    #[test]
    fn test_clean_shutdown() {
        let kernel = kernel();
        let ctx = kernel.create_context(None, 1).unwrap();
        kernel.destroy_context(ctx).unwrap();
        kernel.shutdown().unwrap();
    }

    #[test]
    fn test_destroyed_handle_is_bad_parameter() {
        let kernel = kernel();
        let ctx = kernel.create_context(None, 1).unwrap();
        kernel.destroy_context(ctx).unwrap();
        assert_eq!(kernel.destroy_context(ctx).unwrap_err().kind(), ErrorCode::Param1);
        assert_eq!(kernel.generate_key(ctx).unwrap_err().kind(), ErrorCode::Param1);
        let again = kernel.create_context(None, 1).unwrap();
        assert_ne!(again, ctx);
        assert_eq!(kernel.generate_key(ctx).unwrap_err().kind(), ErrorCode::Param1);
    }

    #[test]
    fn test_wrong_kind_is_bad_parameter() {
        let kernel = kernel();
        let ctx = kernel.create_context(None, 1).unwrap();
        assert_eq!(kernel.destroy_cert(ctx).unwrap_err().kind(), ErrorCode::Param1);
        assert_eq!(
            kernel.destroy_object(kernel.default_user()).unwrap_err().kind(),
            ErrorCode::Param1
        );
    }

    #[test]
    fn test_copy_out_protocol() {
        assert_eq!(copy_out(b"abc", None).unwrap(), 3);
        let mut short = [0u8; 2];
        assert_eq!(copy_out(b"abc", Some(&mut short)).unwrap_err().kind(), ErrorCode::Overflow);
        let mut buf = [0u8; 8];
        assert_eq!(copy_out(b"abc", Some(&mut buf)).unwrap(), 3);
        assert_eq!(&buf[..3], b"abc");
    }
}
