//! # Linux Debug Engine
//!
//! Attach on Linux means opening `/proc/<pid>/mem`.
//!
//! The open performs the same access check as `PTRACE_ATTACH` (`PTRACE_MODE_ATTACH`), so
//! permission problems surface at attach time, but the target is never stopped: no
//! `SIGSTOP`, no wait-for-stop, and the inspector can keep reading while the target runs.
//!
//! Whether the check passes depends on:
//!
//! - Yama `ptrace_scope` (`/proc/sys/kernel/yama/ptrace_scope`). With `1` (the common
//!   default) a parent may still inspect its own children, which is what the launcher
//!   produces.
//! - Matching UIDs, or `CAP_SYS_PTRACE`.
//! - The target being dumpable.
//!
//! ## References
//!
//! - [proc_pid_mem(5)](https://man7.org/linux/man-pages/man5/proc_pid_mem.5.html)
//! - [ptrace(2), "Ptrace access mode checking"](https://man7.org/linux/man-pages/man2/ptrace.2.html)

pub mod memory;

use std::fs;
use std::io::{self, ErrorKind};

use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

pub use self::memory::ProcMemory;
use crate::engine::{AttachReport, DebugEngine};
use crate::error::{PeekError, PeekResult};
use crate::target::TargetImage;
use crate::types::ProcessId;

const PTRACE_SCOPE_PATH: &str = "/proc/sys/kernel/yama/ptrace_scope";

/// Host facts probed once per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostInfo
{
    pub page_size: usize,
    /// Yama `ptrace_scope`, if the LSM is present.
    pub ptrace_scope: Option<u8>,
}

impl HostInfo
{
    #[allow(unsafe_code)] // sysconf(3)
    fn probe() -> PeekResult<Self>
    {
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        let page_size = usize::try_from(page_size)
            .ok()
            .filter(|&size| size > 0)
            .ok_or_else(|| PeekError::AttachFailed("sysconf(_SC_PAGESIZE) failed".to_string()))?;

        let ptrace_scope = fs::read_to_string(PTRACE_SCOPE_PATH)
            .ok()
            .and_then(|s| s.trim().parse::<u8>().ok());

        Ok(Self {
            page_size,
            ptrace_scope,
        })
    }
}

static HOST: OnceCell<HostInfo> = OnceCell::new();

/// Linux implementation of [`DebugEngine`].
#[derive(Debug, Default)]
pub struct LinuxEngine;

impl LinuxEngine
{
    pub fn new() -> Self
    {
        Self
    }

    /// Host facts, probing them on first use.
    ///
    /// ## Errors
    ///
    /// `AttachFailed` if the page size cannot be determined.
    pub fn host_info(&self) -> PeekResult<HostInfo>
    {
        HOST.get_or_try_init(|| {
            let host = HostInfo::probe()?;
            info!(
                "Linux debug engine initialized (page size {}, ptrace_scope {})",
                host.page_size,
                host.ptrace_scope.map_or_else(|| "n/a".to_string(), |s| s.to_string())
            );
            if host.ptrace_scope.is_some_and(|scope| scope >= 2) {
                warn!("ptrace_scope >= 2: attaching will require CAP_SYS_PTRACE");
            }
            Ok(host)
        })
        .copied()
    }

    fn permission_hint(&self) -> &'static str
    {
        match HOST.get().and_then(|host| host.ptrace_scope) {
            Some(3) => "ptrace_scope is 3: attaching is disabled until reboot",
            Some(2) => "ptrace_scope is 2: run with CAP_SYS_PTRACE",
            _ => "check that the target runs as the same user and is dumpable",
        }
    }

    /// Map a failed open of `/proc/<pid>/mem` onto the attach error taxonomy.
    fn classify_open_error(&self, pid: ProcessId, err: &io::Error) -> PeekError
    {
        match err.kind() {
            ErrorKind::NotFound => PeekError::ProcessNotFound(pid.0),
            ErrorKind::PermissionDenied => PeekError::PermissionDenied(format!(
                "cannot open /proc/{pid}/mem: {err} ({})",
                self.permission_hint()
            )),
            _ => PeekError::AttachFailed(format!("cannot open /proc/{pid}/mem: {err}")),
        }
    }
}

impl DebugEngine for LinuxEngine
{
    fn name(&self) -> &'static str
    {
        "linux-procfs"
    }

    fn initialize(&self) -> PeekResult<()>
    {
        self.host_info().map(|_| ())
    }

    fn attach(&self, image: &TargetImage, pid: ProcessId) -> AttachReport
    {
        if let Err(err) = self.initialize() {
            return AttachReport::failed(err);
        }

        debug!("Attaching to PID {} ({})", pid, image.path().display());

        match ProcMemory::open(pid) {
            Ok(memory) => {
                if !memory.is_alive() {
                    // /proc/<pid>/mem of a zombie opens fine but has no address space.
                    return AttachReport::failed(PeekError::ProcessNotFound(pid.0));
                }
                info!("Attached to PID {}", pid);
                AttachReport::attached(Box::new(memory))
            }
            Err(err) => AttachReport::failed(self.classify_open_error(pid, &err)),
        }
    }
}
