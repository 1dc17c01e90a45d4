//! # macOS Mach API Errors
//!
//! Mach APIs return `kern_return_t` values, which are integer error codes.
//! This module converts the ones the inspector meets into a Rust error type.

use mach2::kern_return::{
    kern_return_t, KERN_FAILURE, KERN_INVALID_ADDRESS, KERN_INVALID_ARGUMENT, KERN_PROTECTION_FAILURE,
};
use thiserror::Error;

/// Mach kernel API error
///
/// Common values:
///
/// - `KERN_SUCCESS` (0): Operation succeeded
/// - `KERN_INVALID_ADDRESS` (1): Address not mapped in the task
/// - `KERN_PROTECTION_FAILURE` (2): Address mapped but not accessible
/// - `KERN_INVALID_ARGUMENT` (4): Bad port, bad PID, or stale task
/// - `KERN_FAILURE` (5): General failure; `task_for_pid()` also uses it for "not allowed"
///
/// ## References
///
/// - [kern_return_t documentation](https://developer.apple.com/documentation/kernel/kern_return_t)
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachError
{
    /// `KERN_INVALID_ADDRESS`
    #[error("KERN_INVALID_ADDRESS: address is not mapped")]
    InvalidAddress,

    /// `KERN_PROTECTION_FAILURE`
    ///
    /// For `task_for_pid()` this means macOS's security policy blocked the call: run with
    /// `sudo` or sign the binary with the debugger entitlement.
    ///
    /// See: [macOS Debugging Entitlements](https://developer.apple.com/documentation/bundleresources/entitlements/com.apple.security.cs.debugger)
    #[error("KERN_PROTECTION_FAILURE: Permission denied")]
    ProtectionFailure,

    /// `KERN_INVALID_ARGUMENT`
    #[error("KERN_INVALID_ARGUMENT: Invalid task or argument")]
    InvalidArgument,

    /// `KERN_FAILURE`
    ///
    /// `attach()` checks whether the process exists when it sees this. If it does, the
    /// failure is reported as `PermissionDenied` instead.
    #[error("KERN_FAILURE: Process not found")]
    Failure,

    /// Any other code; the value is kept so it can be looked up.
    #[error("Unknown Mach error: {0}")]
    Unknown(kern_return_t),
}

impl From<kern_return_t> for MachError
{
    fn from(code: kern_return_t) -> Self
    {
        match code {
            KERN_INVALID_ADDRESS => MachError::InvalidAddress,
            KERN_PROTECTION_FAILURE => MachError::ProtectionFailure,
            KERN_INVALID_ARGUMENT => MachError::InvalidArgument,
            KERN_FAILURE => MachError::Failure,
            _ => MachError::Unknown(code),
        }
    }
}
