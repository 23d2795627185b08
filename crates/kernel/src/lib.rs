//! The cryptkit security kernel.
//!
//! All cryptographic state lives in objects owned by a [`Kernel`] and is
//! reached only through opaque [`Handle`]s. Callers create contexts,
//! certificates, keysets, envelopes, sessions, devices and users, configure
//! them through attributes and drive them with the kernel verbs. Object
//! internals never cross the API.
//!
//! ```no_run
//! use cryptkit_core::KernelConfig;
//! use cryptkit_kernel::{AttributeId, EnvelopeFormat, Kernel};
//!
//! let kernel = Kernel::new(KernelConfig::default())?;
//! let envelope = kernel.create_envelope(None, EnvelopeFormat::Cryptlib)?;
//! kernel.set_attribute_string(envelope, AttributeId::ENVINFO_PASSWORD, b"secret")?;
//! let sealed = kernel.process_all(envelope, b"message")?;
//! kernel.destroy_envelope(envelope)?;
//! # Ok::<(), cryptkit_core::CryptError>(())
//! ```

pub mod attribute;
pub mod certificate;
pub mod context;
pub mod device;
pub mod envelope;
pub mod handle;
pub mod kernel;
pub mod keyset;
pub mod mechanism;
pub mod object;
pub mod registry;
pub mod session;
pub mod types;
pub mod user;

pub use attribute::{AttributeId, AttributeValue};
pub use handle::{Handle, ObjectKind};
pub use kernel::{Kernel, DEFAULT_USER};
pub use session::transport::{memory_pair, MemoryTransport, TcpTransport, Transport};
pub use types::{
    CapabilityInfo, CertAction, CertFormat, CertType, CrlReason, DeviceType, EnvelopeFormat,
    KeyIdType, KeysetOption, KeysetType, ObjectInfo, ObjectType, SessionType,
};
