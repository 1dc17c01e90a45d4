//! # macOS Debug Engine
//!
//! macOS uses the Mach microkernel, which exposes another process's memory through its
//! **task port**:
//!
//! - `task_for_pid()`: get a send right to the target's task port
//! - `mach_vm_read_overwrite()` / `mach_vm_write()`: copy memory in and out
//! - `mach_port_deallocate()`: release the right on detach
//!
//! All of these come from the `mach2` crate.
//!
//! `task_for_pid()` is restricted: run as root, or sign the inspector with the
//! `com.apple.security.cs.debugger` entitlement. Targets protected by SIP cannot be
//! inspected at all.
//!
//! ## References
//!
//! - [Apple Mach Kernel Programming](https://developer.apple.com/library/archive/documentation/Darwin/Conceptual/KernelProgramming/Mach/Mach.html)
//! - [task_for_pid(3) man page](https://developer.apple.com/library/archive/documentation/Darwin/Reference/ManPages/man3/task_for_pid.3.html)

pub mod error;
pub mod task;

use once_cell::sync::OnceCell;
use tracing::{debug, info};

pub use self::task::MachTask;
use crate::engine::{AttachReport, DebugEngine};
use crate::error::{PeekError, PeekResult};
use crate::target::TargetImage;
use crate::types::ProcessId;

static PAGE_SIZE: OnceCell<usize> = OnceCell::new();

/// macOS implementation of [`DebugEngine`].
#[derive(Debug, Default)]
pub struct MacEngine;

impl MacEngine
{
    pub fn new() -> Self
    {
        Self
    }

    /// Host page size, probed on first use.
    ///
    /// ## Errors
    ///
    /// `AttachFailed` if `sysconf()` fails.
    #[allow(unsafe_code)] // sysconf(3)
    pub fn page_size(&self) -> PeekResult<usize>
    {
        PAGE_SIZE
            .get_or_try_init(|| {
                let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
                let size = usize::try_from(size)
                    .ok()
                    .filter(|&size| size > 0)
                    .ok_or_else(|| PeekError::AttachFailed("sysconf(_SC_PAGESIZE) failed".to_string()))?;
                info!("macOS debug engine initialized (page size {})", size);
                Ok(size)
            })
            .copied()
    }
}

impl DebugEngine for MacEngine
{
    fn name(&self) -> &'static str
    {
        "macos-mach"
    }

    fn initialize(&self) -> PeekResult<()>
    {
        self.page_size().map(|_| ())
    }

    fn attach(&self, image: &TargetImage, pid: ProcessId) -> AttachReport
    {
        if let Err(err) = self.initialize() {
            return AttachReport::failed(err);
        }

        debug!("Attaching to PID {} ({})", pid, image.path().display());

        match MachTask::attach(pid) {
            Ok(task) => {
                info!("Attached to PID {}", pid);
                AttachReport::attached(Box::new(task))
            }
            Err(err) => AttachReport::failed(err),
        }
    }
}
