//! Integration tests for the cryptkit kernel
//!
//! This suite drives the kernel only through its public verbs:
//! - Contexts, key export and signatures across handles
//! - Certificates, keysets and certificate store workflows
//! - Envelopes and sessions through push/flush/pop
//! - Handle lifetime, dependencies and concurrent use

pub mod test_utils;

#[cfg(test)]
mod context_tests;

#[cfg(test)]
mod certificate_authority_tests;

#[cfg(test)]
mod envelope_session_tests;

#[cfg(test)]
mod lifecycle_tests;
