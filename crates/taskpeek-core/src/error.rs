//! # Error Types
//!
//! General error handling for the inspector.
//!
//! We use `thiserror` to generate the `Error` implementations and messages.

use thiserror::Error;

/// Main error type for inspector operations
///
/// ## Error Categories
///
/// 1. **Launch errors**: `ChannelFailed`, `SpawnFailed`, `ExecFailed`. Fatal before the
///    control loop starts.
/// 2. **Attach errors**: `ProcessNotFound`, `PermissionDenied`, `AttachFailed`,
///    `NotAttached`, `CapabilityRevoked`. Recoverable; attach is retried on the next request.
/// 3. **Memory errors**: `ReadFailed`, `WriteFailed`. Recoverable per request.
/// 4. **Platform errors**: `MachError` (macOS-specific), `Unsupported`
/// 5. **I/O errors**: `Io`
#[derive(Error, Debug)]
pub enum PeekError
{
    /// The process with the given PID doesn't exist or has exited
    #[error("Process not found: PID {0}")]
    ProcessNotFound(u32),

    /// Insufficient privilege to inspect the target process
    ///
    /// - **Linux**: opening `/proc/<pid>/mem` failed the kernel's ptrace access check
    ///   (Yama `ptrace_scope`, a different UID, or a non-dumpable target)
    /// - **macOS**: `task_for_pid()` was refused; run with `sudo` or sign with the
    ///   debugger entitlement
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Invalid argument passed to an inspector function
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Failed to attach to a process for a reason not covered by a more specific variant
    #[error("Failed to attach to process: {0}")]
    AttachFailed(String),

    /// Operation requires an attached session
    #[error("Not attached to a process")]
    NotAttached,

    /// The capability was valid once but the target has since gone away
    #[error("Capability for PID {0} was revoked (target exited or detached)")]
    CapabilityRevoked(u32),

    /// A privileged read from the target's address space failed
    #[error("Failed to read {len} byte(s) at 0x{address:x}: {details}")]
    ReadFailed
    {
        /// Start of the requested range
        address: u64,
        /// Requested length in bytes
        len: usize,
        /// Platform-specific reason
        details: String,
    },

    /// A privileged write into the target's address space failed
    #[error("Failed to write {len} byte(s) at 0x{address:x}: {details}")]
    WriteFailed
    {
        /// Start of the written range
        address: u64,
        /// Number of bytes we tried to write
        len: usize,
        /// Platform-specific reason
        details: String,
    },

    /// The request channel could not be created or read
    #[error("Request channel failure: {0}")]
    ChannelFailed(String),

    /// The OS refused to create the target process
    #[error("Failed to create target process: {0}")]
    SpawnFailed(String),

    /// The target process was created but its image could not be executed
    #[error("Failed to execute '{program}': {details}")]
    ExecFailed
    {
        /// Program path that was launched
        program: String,
        /// Reason reported by the OS
        details: String,
    },

    /// No debug engine exists for this platform
    #[error("Unsupported platform: {0}")]
    Unsupported(String),

    /// macOS-specific Mach API error
    #[cfg(target_os = "macos")]
    #[error("Mach API error: {0}")]
    MachError(#[from] crate::platform::macos::error::MachError),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PeekError
{
    /// Errors that abort startup before the control loop begins.
    pub fn is_launch_error(&self) -> bool
    {
        matches!(
            self,
            PeekError::ChannelFailed(_) | PeekError::SpawnFailed(_) | PeekError::ExecFailed { .. }
        )
    }

    /// Errors after which a cached session must not be reused.
    pub fn invalidates_session(&self) -> bool
    {
        matches!(
            self,
            PeekError::ProcessNotFound(_) | PeekError::CapabilityRevoked(_) | PeekError::NotAttached
        )
    }
}

/// Convenience type alias for `Result<T, PeekError>`
///
/// ```rust
/// use taskpeek_core::error::PeekResult;
/// fn foo() -> PeekResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type PeekResult<T> = std::result::Result<T, PeekError>;
