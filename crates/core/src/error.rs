//! Core error types

use crate::status::{ErrorCode, ErrorType, StatusClass};
use thiserror::Error;

/// Failure returned by every kernel operation.
///
/// The `Display` form is the fixed description of the status code; the
/// locus and detail are diagnostic extras that never change the code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} ({}){}", .code.message(), .code.code(), render_detail(.detail))]
pub struct CryptError {
    code: ErrorCode,
    /// Attribute id the failure is attributed to, if any.
    locus: Option<i32>,
    error_type: ErrorType,
    detail: Option<String>,
}

/// Result alias used across the kernel.
pub type CryptResult<T> = Result<T, CryptError>;

impl CryptError {
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            locus: None,
            error_type: ErrorType::None,
            detail: None,
        }
    }

    /// Parameter error for a 1-based argument position.
    pub fn param(position: usize) -> Self {
        Self::new(ErrorCode::param(position))
    }

    pub fn with_locus(mut self, attribute: i32, error_type: ErrorType) -> Self {
        self.locus = Some(attribute);
        self.error_type = error_type;
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn kind(&self) -> ErrorCode {
        self.code
    }

    /// Raw signed status value.
    pub fn code(&self) -> i32 {
        self.code.code()
    }

    pub fn class(&self) -> StatusClass {
        self.code.class()
    }

    pub fn locus(&self) -> Option<i32> {
        self.locus
    }

    pub fn error_type(&self) -> ErrorType {
        self.error_type
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    pub fn message(&self) -> &'static str {
        self.code.message()
    }

    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code
    }
}

fn render_detail(detail: &Option<String>) -> String {
    match detail {
        Some(detail) => format!(": {}", detail),
        None => String::new(),
    }
}

impl From<ErrorCode> for CryptError {
    fn from(code: ErrorCode) -> Self {
        CryptError::new(code)
    }
}

impl From<std::io::Error> for CryptError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        let code = match err.kind() {
            ErrorKind::NotFound => ErrorCode::Open,
            ErrorKind::PermissionDenied => ErrorCode::Permission,
            ErrorKind::TimedOut | ErrorKind::WouldBlock => ErrorCode::Timeout,
            ErrorKind::UnexpectedEof => ErrorCode::Underflow,
            ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset => ErrorCode::Open,
            ErrorKind::OutOfMemory => ErrorCode::Memory,
            _ => ErrorCode::Failed,
        };
        CryptError::new(code).with_detail(err.to_string())
    }
}

/// Shorthand for `Err(CryptError::new(code))`.
pub fn fail<T>(code: ErrorCode) -> CryptResult<T> {
    Err(CryptError::new(code))
}
