//! User accounts: login, logout and password changes.

use super::Kernel;
use crate::handle::{Handle, KindSet};
use crate::object::Payload;
use crate::user::UserObject;
use cryptkit_core::{CryptError, CryptResult, ErrorCode, UserEntry, UserRole};
use cryptkit_crypto::kdf::DEFAULT_SALT_SIZE;
use cryptkit_crypto::{derive_key, Algorithm, RandomPool};
use std::collections::HashMap;
use subtle::ConstantTimeEq;
use tracing::{info, warn};
use zeroize::Zeroizing;

const PASSWORD_ITERATIONS: u32 = 64;

struct Account {
    name: String,
    role: UserRole,
    salt: Vec<u8>,
    digest: Zeroizing<[u8; 32]>,
}

impl Account {
    fn new(name: &str, role: UserRole, password: &[u8], random: &mut RandomPool) -> CryptResult<Self> {
        let salt = random.bytes(DEFAULT_SALT_SIZE);
        let digest = derive_key(Algorithm::Blake3, password, &salt, PASSWORD_ITERATIONS)?;
        Ok(Self {
            name: name.to_string(),
            role,
            salt,
            digest,
        })
    }

    fn verify(&self, password: &[u8]) -> bool {
        derive_key(Algorithm::Blake3, password, &self.salt, PASSWORD_ITERATIONS)
            .map(|candidate| bool::from(candidate.as_slice().ct_eq(self.digest.as_slice())))
            .unwrap_or(false)
    }
}

/// Account directory, keyed by lower-cased user name.
pub(super) struct Accounts {
    entries: HashMap<String, Account>,
}

impl Accounts {
    pub(super) fn from_config(users: &[UserEntry], random: &mut RandomPool) -> Self {
        let mut entries = HashMap::new();
        for entry in users {
            match Account::new(&entry.name, entry.user_type, entry.password.as_bytes(), random) {
                Ok(account) => {
                    entries.insert(entry.name.to_lowercase(), account);
                }
                Err(e) => warn!(user = %entry.name, error = %e, "account not loaded"),
            }
        }
        Self { entries }
    }
}

impl Kernel {
    /// Log a configured user in, returning a user object that carries its
    /// own copy of the options.
    pub fn login(&self, name: &str, password: &str) -> CryptResult<Handle> {
        self.ensure_running()?;
        if name.is_empty() {
            return Err(CryptError::param(1));
        }
        let (display_name, role) = {
            let accounts = self.accounts.lock();
            let account = accounts
                .entries
                .get(&name.to_lowercase())
                .ok_or_else(|| CryptError::new(ErrorCode::NotFound).with_detail(format!("no user {name}")))?;
            if !account.verify(password.as_bytes()) {
                warn!(user = %name, "login rejected");
                return Err(CryptError::new(ErrorCode::WrongKey).with_detail("incorrect password"));
            }
            (account.name.clone(), account.role)
        };
        let user = UserObject::new(&display_name, role, self.config.options.clone(), false);
        let handle = self.register(self.default_user, Payload::User(Box::new(user)), None)?;
        info!(user = %display_name, role = ?role, %handle, "user logged in");
        Ok(handle)
    }

    /// Log a user out. Every object the user owns is signalled.
    pub fn logout(&self, user: Handle) -> CryptResult<()> {
        self.cell(user, 1, KindSet::USER)?;
        if user == self.default_user {
            return Err(CryptError::new(ErrorCode::Permission).with_detail("the default user cannot log out"));
        }
        let (_, signalled) = self.registry.destroy(user).map_err(|_| CryptError::param(1))?;
        info!(%user, signalled = signalled.len(), "user logged out");
        Ok(())
    }

    /// Record a password set through `USERINFO_PASSWORD`.
    pub(super) fn change_password(&self, name: &str, password: &str) -> CryptResult<()> {
        let mut accounts = self.accounts.lock();
        let account = accounts
            .entries
            .get_mut(&name.to_lowercase())
            .ok_or_else(|| CryptError::new(ErrorCode::NotFound))?;
        *account = Account::new(&account.name, account.role, password.as_bytes(), &mut self.random.lock())?;
        info!(user = %name, "password changed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::kernel::Kernel;
    use crate::attribute::AttributeId;
    use cryptkit_core::{ErrorCode, KernelConfig, UserEntry, UserRole};

    fn kernel_with_users() -> Kernel {
        let config = KernelConfig {
            users: vec![
                UserEntry {
                    name: "alice".into(),
                    password: "wonderland".into(),
                    user_type: UserRole::Normal,
                },
                UserEntry {
                    name: "ca".into(),
                    password: "issuer".into(),
                    user_type: UserRole::Ca,
                },
            ],
            ..KernelConfig::default()
        };
        Kernel::new(config).unwrap()
    }

    #[test]
    fn test_login_checks_password() {
        let kernel = kernel_with_users();
        assert_eq!(kernel.login("bob", "x").unwrap_err().kind(), ErrorCode::NotFound);
        assert_eq!(kernel.login("alice", "x").unwrap_err().kind(), ErrorCode::WrongKey);
        let user = kernel.login("Alice", "wonderland").unwrap();
        kernel.logout(user).unwrap();
        assert_eq!(kernel.logout(user).unwrap_err().kind(), ErrorCode::Param1);
    }

    #[test]
    fn test_logout_signals_owned_objects() {
        let kernel = kernel_with_users();
        let user = kernel.login("alice", "wonderland").unwrap();
        let ctx = kernel.create_context(Some(user), 1).unwrap();
        kernel.logout(user).unwrap();
        assert_eq!(kernel.generate_key(ctx).unwrap_err().kind(), ErrorCode::Signalled);
        kernel.destroy_context(ctx).unwrap();
        kernel.shutdown().unwrap();
    }

    #[test]
    fn test_default_user_cannot_log_out() {
        let kernel = kernel_with_users();
        assert_eq!(
            kernel.logout(kernel.default_user()).unwrap_err().kind(),
            ErrorCode::Permission
        );
    }

    #[test]
    fn test_password_change_applies_to_next_login() {
        let kernel = kernel_with_users();
        let user = kernel.login("alice", "wonderland").unwrap();
        kernel
            .set_attribute_string(user, AttributeId::USERINFO_PASSWORD, b"looking-glass")
            .unwrap();
        kernel.logout(user).unwrap();
        assert_eq!(kernel.login("alice", "wonderland").unwrap_err().kind(), ErrorCode::WrongKey);
        let user = kernel.login("alice", "looking-glass").unwrap();
        kernel.logout(user).unwrap();
    }

    #[test]
    fn test_user_options_are_private_copies() {
        let kernel = kernel_with_users();
        let user = kernel.login("alice", "wonderland").unwrap();
        kernel
            .set_attribute(user, AttributeId::OPTION_KEYING_ITERATIONS, 1000)
            .unwrap();
        assert_eq!(
            kernel
                .get_attribute(kernel.default_user(), AttributeId::OPTION_KEYING_ITERATIONS)
                .unwrap(),
            500
        );
        kernel.logout(user).unwrap();
    }
}
