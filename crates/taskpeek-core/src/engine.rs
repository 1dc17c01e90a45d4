//! # Debug Engine
//!
//! The capability contract the inspector needs from the platform.
//!
//! A [`DebugEngine`] knows how to turn a process id into a [`MemoryAccess`] capability.
//! Each platform implements it with its own privileged API:
//!
//! - **Linux**: `/proc/<pid>/mem`, guarded by the kernel's ptrace access check
//!   - See: [proc_pid_mem(5)](https://man7.org/linux/man-pages/man5/proc_pid_mem.5.html)
//! - **macOS**: the task port from `task_for_pid()` plus `mach_vm_read_overwrite()`
//!   - See: [Apple Mach Kernel Programming](https://developer.apple.com/library/archive/documentation/Darwin/Conceptual/KernelProgramming/Mach/Mach.html)
//!
//! ## Why a trait?
//!
//! The control loop only ever sees `Box<dyn DebugEngine>`, so tests drive it with a mock
//! engine and no privileges at all.

use std::path::Path;

use crate::error::{PeekError, PeekResult};
use crate::target::TargetImage;
use crate::types::{Address, ProcessId};

/// Privileged read/write access to one target's address space.
///
/// Implementations own the platform handle (an open file, a Mach port) and release it
/// in [`detach`](MemoryAccess::detach).
pub trait MemoryAccess
{
    /// The process this capability refers to.
    fn pid(&self) -> ProcessId;

    /// Whether the handle is still usable: not detached, and the target still exists.
    fn is_valid(&self) -> bool;

    /// Read up to `len` bytes at `address`.
    ///
    /// May return fewer bytes than requested if the range crosses into unmapped memory;
    /// callers that need the whole range must check the length.
    ///
    /// ## Errors
    ///
    /// - `ReadFailed`: the address is not readable
    /// - `CapabilityRevoked`: the target went away
    /// - `NotAttached`: called after [`detach`](MemoryAccess::detach)
    fn read(&self, address: Address, len: usize) -> PeekResult<Vec<u8>>;

    /// Write `data` at `address`, returning the number of bytes written.
    ///
    /// ## Errors
    ///
    /// Same classes as [`read`](MemoryAccess::read), with `WriteFailed` in place of
    /// `ReadFailed`.
    fn write(&self, address: Address, data: &[u8]) -> PeekResult<usize>;

    /// Release the platform handle. Idempotent.
    ///
    /// ## Errors
    ///
    /// Platform-specific failure releasing the handle. The capability is invalid either way.
    fn detach(&mut self) -> PeekResult<()>;
}

/// Outcome of one attach attempt: the capability (if any) plus the reported status.
///
/// Both halves are kept because the platform may hand back a handle *and* an error;
/// usability needs both to be good.
pub struct AttachReport
{
    pub capability: Option<Box<dyn MemoryAccess>>,
    pub status: PeekResult<()>,
}

impl AttachReport
{
    pub fn attached(capability: Box<dyn MemoryAccess>) -> Self
    {
        Self {
            capability: Some(capability),
            status: Ok(()),
        }
    }

    pub fn failed(error: PeekError) -> Self
    {
        Self {
            capability: None,
            status: Err(error),
        }
    }

    /// [`attach_is_usable`] applied to this report.
    pub fn is_usable(&self) -> bool
    {
        let valid = self.capability.as_ref().is_some_and(|cap| cap.is_valid());
        attach_is_usable(valid, self.status.is_err())
    }
}

impl std::fmt::Debug for AttachReport
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("AttachReport")
            .field("capability", &self.capability.as_ref().map(|cap| cap.pid()))
            .field("status", &self.status)
            .finish()
    }
}

/// A session is usable iff the capability is valid and the attach status reports no error.
pub const fn attach_is_usable(capability_valid: bool, status_failed: bool) -> bool
{
    capability_valid && !status_failed
}

/// Platform debug engine.
///
/// ## Lifecycle
///
/// 1. [`initialize`](DebugEngine::initialize): once per process; later calls are no-ops
/// 2. [`resolve_target`](DebugEngine::resolve_target): describe the executable
/// 3. [`attach`](DebugEngine::attach): obtain a capability for the live pid
pub trait DebugEngine
{
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// One-time engine setup.
    ///
    /// ## Errors
    ///
    /// Backend-specific; the inspector treats failure here as fatal.
    fn initialize(&self) -> PeekResult<()>;

    /// Build the target description for `program`.
    ///
    /// ## Errors
    ///
    /// See [`TargetImage::resolve`].
    fn resolve_target(&self, program: &Path) -> PeekResult<TargetImage>
    {
        TargetImage::resolve(program)
    }

    /// Attach to the running process `pid`, whose image is `image`.
    fn attach(&self, image: &TargetImage, pid: ProcessId) -> AttachReport;
}

/// The engine for the platform this crate was built for.
///
/// ## Errors
///
/// `Unsupported` on platforms without a backend.
pub fn create_engine() -> PeekResult<Box<dyn DebugEngine>>
{
    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(crate::platform::linux::LinuxEngine::new()))
    }

    #[cfg(target_os = "macos")]
    {
        Ok(Box::new(crate::platform::macos::MacEngine::new()))
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        Err(PeekError::Unsupported(std::env::consts::OS.to_string()))
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn usable_only_when_valid_and_not_failed()
    {
        assert!(attach_is_usable(true, false));
        assert!(!attach_is_usable(true, true));
        assert!(!attach_is_usable(false, false));
        assert!(!attach_is_usable(false, true));
    }

    #[test]
    fn failed_report_is_not_usable()
    {
        let report = AttachReport::failed(PeekError::PermissionDenied("denied".into()));
        assert!(!report.is_usable());
        assert!(report.capability.is_none());
    }

    #[cfg(any(target_os = "linux", target_os = "macos"))]
    #[test]
    fn engine_exists_for_this_platform()
    {
        let engine = create_engine().unwrap();
        assert!(!engine.name().is_empty());
    }
}
