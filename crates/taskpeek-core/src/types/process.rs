//! Process identity and exit status.

use std::fmt;

/// Process identifier (PID)
///
/// A newtype rather than a bare `u32` so a PID can't be confused with the other integers
/// flowing through the launcher and the debug engines.
///
/// ## Example
///
/// ```rust
/// use taskpeek_core::types::ProcessId;
///
/// let pid = ProcessId::from(12345);
/// assert_eq!(u32::from(pid), 12345);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub u32);

impl ProcessId
{
    /// The PID as the platform's `pid_t`, or `None` if it isn't a single positive PID.
    ///
    /// `0` and values that would wrap negative name process groups or "every process"
    /// in `kill(2)` and `waitpid(2)`, so they never reach a syscall.
    pub fn as_raw(self) -> Option<libc::pid_t>
    {
        libc::pid_t::try_from(self.0).ok().filter(|&pid| pid > 0)
    }
}

impl From<u32> for ProcessId
{
    fn from(pid: u32) -> Self
    {
        ProcessId(pid)
    }
}

impl From<ProcessId> for u32
{
    fn from(pid: ProcessId) -> Self
    {
        pid.0
    }
}

impl fmt::Display for ProcessId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// How a reaped target process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetExit
{
    /// Normal exit with the given status code.
    Exited(i32),
    /// Killed by the given signal.
    Signaled(i32),
}

impl TargetExit
{
    /// Exit status used by `posix_spawn` implementations when the image could not be executed.
    pub const EXEC_FAILURE_STATUS: i32 = 127;

    /// Decode a raw `waitpid` status. Returns `None` for stop/continue notifications.
    pub fn from_wait_status(status: libc::c_int) -> Option<Self>
    {
        if libc::WIFEXITED(status) {
            Some(TargetExit::Exited(libc::WEXITSTATUS(status)))
        } else if libc::WIFSIGNALED(status) {
            Some(TargetExit::Signaled(libc::WTERMSIG(status)))
        } else {
            None
        }
    }

    pub fn success(self) -> bool
    {
        self == TargetExit::Exited(0)
    }

    /// Whether the exit status suggests the image never started.
    pub fn looks_like_exec_failure(self) -> bool
    {
        self == TargetExit::Exited(Self::EXEC_FAILURE_STATUS)
    }
}

impl fmt::Display for TargetExit
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            TargetExit::Exited(code) => write!(f, "exited with status {code}"),
            TargetExit::Signaled(signal) => write!(f, "killed by signal {signal}"),
        }
    }
}
