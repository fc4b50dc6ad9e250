//! This module provides the error type shared by every disk query in the
//! crate.
//!
//! `DiskError` separates the failures a caller can act on (a disk that does
//! not exist, a query that needs elevation, a device that does not implement
//! a query, a malformed argument) from opaque operating system failures.

use thiserror::Error;

/// Represents a disk-related operation error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiskError {
    /// The path or device number does not resolve to a disk.
    #[error("not found: {0}")]
    NotFound(String),

    /// The requested access level needs an elevated process.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The device does not implement the query, or answered with a buffer
    /// that cannot be decoded.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Negative device number, empty path or an unrecognized path form.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Any other operating system failure, with its raw error code.
    #[error("os error {code}: {message}")]
    Os { code: i32, message: String },
}

/// Result type alias for disk queries.
pub type Result<T> = std::result::Result<T, DiskError>;

impl DiskError {
    /// Returns true for failures that only mean "this candidate has nothing
    /// to report", which enumeration skips silently.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            DiskError::NotFound(_) | DiskError::Unsupported(_) | DiskError::AccessDenied(_)
        )
    }
}

/// Automatic conversion from Win32 errors to `DiskError`.
///
/// Win32 error codes that map onto the crate's taxonomy become the matching
/// variant; everything else is kept as `DiskError::Os`.
#[cfg(windows)]
impl From<windows::core::Error> for DiskError {
    fn from(value: windows::core::Error) -> Self {
        use windows::Win32::Foundation::{
            ERROR_ACCESS_DENIED, ERROR_FILE_NOT_FOUND, ERROR_INVALID_FUNCTION,
            ERROR_NOT_SUPPORTED, ERROR_PATH_NOT_FOUND,
        };

        let code = value.code();
        let message = value.message().to_string();

        if code == ERROR_FILE_NOT_FOUND.to_hresult() || code == ERROR_PATH_NOT_FOUND.to_hresult() {
            DiskError::NotFound(message)
        } else if code == ERROR_ACCESS_DENIED.to_hresult() {
            DiskError::AccessDenied(message)
        } else if code == ERROR_INVALID_FUNCTION.to_hresult()
            || code == ERROR_NOT_SUPPORTED.to_hresult()
        {
            DiskError::Unsupported(message)
        } else {
            DiskError::Os {
                code: code.0,
                message,
            }
        }
    }
}
