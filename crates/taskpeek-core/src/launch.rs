//! # Process Launch
//!
//! Launches the target with `posix_spawn()` and wires its stdout into the request
//! channel.
//!
//! ## Descriptor ownership
//!
//! The pipe is created *before* the child exists, with `FD_CLOEXEC` on both ends (atomically
//! via `pipe2()` where available). The spawn file actions then, inside the child:
//!
//! 1. close the read end,
//! 2. `dup2()` the write end onto `STDOUT_FILENO` (which clears `FD_CLOEXEC` on fd 1),
//! 3. close the original write end.
//!
//! After a successful spawn the parent drops its write end, so the only writer left is
//! the child's stdout and end-of-stream arrives as soon as the child exits.
//!
//! ## References
//!
//! - [posix_spawn(3)](https://man7.org/linux/man-pages/man3/posix_spawn.3.html)

use std::ffi::{CString, OsString};
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use std::{env, io, mem, ptr, thread};

use libc::c_int;
use tracing::{debug, info, trace};

use crate::channel::RequestChannel;
use crate::config::InspectorConfig;
use crate::error::{PeekError, PeekResult};
use crate::types::{ProcessId, TargetExit};

/// Both ends of a freshly created pipe, each marked close-on-exec.
#[derive(Debug)]
pub struct PipePair
{
    read: OwnedFd,
    write: OwnedFd,
}

impl PipePair
{
    /// Create a pipe pair for the request channel.
    ///
    /// ## Errors
    ///
    /// `ChannelFailed` if the pipe cannot be created or configured. Descriptors created
    /// before the failure are closed.
    #[allow(unsafe_code)] // pipe2(2), or pipe(2) + fcntl(2)
    pub fn new() -> PeekResult<Self>
    {
        let mut fds: [c_int; 2] = [-1; 2];

        // pipe2() sets FD_CLOEXEC atomically, so a spawn on another thread can't inherit
        // the descriptors in between.
        #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
        let result = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };
        #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
        let result = unsafe { libc::pipe(fds.as_mut_ptr()) };

        if result != 0 {
            let err = io::Error::last_os_error();
            return Err(PeekError::ChannelFailed(format!("Failed to create pipe: {err}")));
        }

        // SAFETY: the call above just returned these descriptors and nothing else owns them.
        let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };

        #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
        for fd in [&read, &write] {
            if unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC) } == -1 {
                let err = io::Error::last_os_error();
                return Err(PeekError::ChannelFailed(format!("Failed to configure pipe: {err}")));
            }
        }

        Ok(Self { read, write })
    }

    pub fn read_end(&self) -> BorrowedFd<'_>
    {
        use std::os::fd::AsFd;
        self.read.as_fd()
    }

    pub fn write_end(&self) -> BorrowedFd<'_>
    {
        use std::os::fd::AsFd;
        self.write.as_fd()
    }

    /// Split into `(read, write)`.
    pub fn into_parts(self) -> (OwnedFd, OwnedFd)
    {
        (self.read, self.write)
    }
}

/// Owned `posix_spawn_file_actions_t`, destroyed on drop.
struct SpawnFileActions
{
    raw: libc::posix_spawn_file_actions_t,
}

#[allow(unsafe_code)] // posix_spawn_file_actions_*(3)
impl SpawnFileActions
{
    fn new() -> PeekResult<Self>
    {
        let mut raw: libc::posix_spawn_file_actions_t = unsafe { mem::zeroed() };
        let result = unsafe { libc::posix_spawn_file_actions_init(&mut raw) };
        if result != 0 {
            return Err(PeekError::SpawnFailed(format!(
                "Failed to initialize file actions: {}",
                io::Error::from_raw_os_error(result)
            )));
        }
        Ok(Self { raw })
    }

    fn add_close(&mut self, fd: RawFd, desc: &str) -> PeekResult<()>
    {
        let result = unsafe { libc::posix_spawn_file_actions_addclose(&mut self.raw, fd) };
        Self::check(desc, result)
    }

    fn add_dup2(&mut self, fd: RawFd, target: RawFd, desc: &str) -> PeekResult<()>
    {
        let result = unsafe { libc::posix_spawn_file_actions_adddup2(&mut self.raw, fd, target) };
        Self::check(desc, result)
    }

    fn check(desc: &str, result: c_int) -> PeekResult<()>
    {
        if result == 0 {
            return Ok(());
        }
        Err(PeekError::SpawnFailed(format!(
            "Failed to {desc}: {}",
            io::Error::from_raw_os_error(result)
        )))
    }

    fn as_ptr(&self) -> *const libc::posix_spawn_file_actions_t
    {
        &self.raw
    }
}

impl Drop for SpawnFileActions
{
    #[allow(unsafe_code)]
    fn drop(&mut self)
    {
        unsafe {
            let _ = libc::posix_spawn_file_actions_destroy(&mut self.raw);
        }
    }
}

/// Spawns targets according to an [`InspectorConfig`].
#[derive(Debug, Clone)]
pub struct Launcher
{
    argv0: String,
    max_message_len: usize,
}

impl Launcher
{
    pub fn new(config: &InspectorConfig) -> Self
    {
        Self {
            argv0: config.argv0.clone(),
            max_message_len: config.max_message_len,
        }
    }

    /// Launch `program` with stdout redirected into a new request channel.
    ///
    /// The child receives only the configured `argv[0]` placeholder and inherits the
    /// inspector's environment.
    ///
    /// ## Errors
    ///
    /// - `InvalidArgument`: empty path, or a NUL byte in the path or `argv[0]`
    /// - `ChannelFailed`: the pipe could not be created; no process was started
    /// - `ExecFailed`: the image could not be executed (missing, not executable, bad format)
    /// - `SpawnFailed`: the process itself could not be created
    #[allow(unsafe_code)] // posix_spawn(3)
    pub fn launch(&self, program: &Path) -> PeekResult<(TargetProcess, RequestChannel)>
    {
        info!("Launching target: {} (argv[0] = {:?})", program.display(), self.argv0);

        if program.as_os_str().is_empty() {
            return Err(PeekError::InvalidArgument("Program path cannot be empty".to_string()));
        }

        let program_cstr = CString::new(program.as_os_str().as_bytes())
            .map_err(|e| PeekError::InvalidArgument(format!("Invalid program path: {e}")))?;
        let argv0_cstr =
            CString::new(self.argv0.as_str()).map_err(|e| PeekError::InvalidArgument(format!("Invalid argv[0]: {e}")))?;
        let env_cstrs = inherited_environment();

        let argv: [*mut libc::c_char; 2] = [argv0_cstr.as_ptr().cast_mut(), ptr::null_mut()];
        let mut envp: Vec<*mut libc::c_char> = env_cstrs.iter().map(|s| s.as_ptr().cast_mut()).collect();
        envp.push(ptr::null_mut());

        let pipe = PipePair::new()?;
        debug!(
            "Created request channel (read fd {}, write fd {})",
            pipe.read_end().as_raw_fd(),
            pipe.write_end().as_raw_fd()
        );

        let mut actions = SpawnFileActions::new()?;
        actions.add_close(pipe.read_end().as_raw_fd(), "close channel read end")?;
        actions.add_dup2(pipe.write_end().as_raw_fd(), libc::STDOUT_FILENO, "redirect stdout")?;
        actions.add_close(pipe.write_end().as_raw_fd(), "close channel write end")?;

        trace!("Calling posix_spawn");
        let mut pid: libc::pid_t = 0;
        let spawn_result = unsafe {
            libc::posix_spawn(
                &mut pid,
                program_cstr.as_ptr(),
                actions.as_ptr(),
                ptr::null(),
                argv.as_ptr(),
                envp.as_ptr(),
            )
        };
        drop(actions);

        if spawn_result != 0 {
            return Err(classify_spawn_error(program, spawn_result));
        }

        let (read_end, write_end) = pipe.into_parts();
        // The child holds the only writer from here on.
        drop(write_end);

        let pid = ProcessId(u32::try_from(pid).map_err(|_| PeekError::SpawnFailed(format!("bogus pid {pid}")))?);
        info!("Started target process with PID: {}", pid);

        Ok((
            TargetProcess::new(pid, program.to_path_buf()),
            RequestChannel::new(read_end, self.max_message_len),
        ))
    }
}

fn inherited_environment() -> Vec<CString>
{
    env::vars_os()
        .filter_map(|(key, value)| {
            let mut entry: OsString = key;
            entry.push("=");
            entry.push(value);
            CString::new(entry.into_vec()).ok()
        })
        .collect()
}

/// errno values from `posix_spawn` that mean the image could not replace the child.
fn is_exec_errno(code: c_int) -> bool
{
    matches!(
        code,
        libc::ENOENT
            | libc::EACCES
            | libc::ENOEXEC
            | libc::ENOTDIR
            | libc::ELOOP
            | libc::ETXTBSY
            | libc::E2BIG
            | libc::ENAMETOOLONG
    )
}

fn classify_spawn_error(program: &Path, code: c_int) -> PeekError
{
    let err = io::Error::from_raw_os_error(code);
    if is_exec_errno(code) {
        PeekError::ExecFailed {
            program: program.display().to_string(),
            details: err.to_string(),
        }
    } else {
        PeekError::SpawnFailed(format!("{}: {err}", program.display()))
    }
}

/// A launched target process.
///
/// Dropping it neither kills nor reaps the child.
#[derive(Debug)]
pub struct TargetProcess
{
    pid: ProcessId,
    program: PathBuf,
    exit: Option<TargetExit>,
}

impl TargetProcess
{
    fn new(pid: ProcessId, program: PathBuf) -> Self
    {
        Self {
            pid,
            program,
            exit: None,
        }
    }

    pub fn pid(&self) -> ProcessId
    {
        self.pid
    }

    pub fn program(&self) -> &Path
    {
        &self.program
    }

    /// Exit status, if the process has already been reaped.
    pub fn exit_status(&self) -> Option<TargetExit>
    {
        self.exit
    }

    /// Reap the process if it has exited, without blocking.
    ///
    /// ## Errors
    ///
    /// `ProcessNotFound` if the PID is not our child, `Io` for other `waitpid` failures.
    #[allow(unsafe_code)] // waitpid(2)
    pub fn try_wait(&mut self) -> PeekResult<Option<TargetExit>>
    {
        if self.exit.is_some() {
            return Ok(self.exit);
        }

        let raw = self.raw_pid()?;
        let mut status: c_int = 0;
        let result = unsafe { libc::waitpid(raw, &mut status, libc::WNOHANG) };
        match result {
            0 => Ok(None),
            r if r == raw => {
                self.exit = TargetExit::from_wait_status(status);
                if let Some(exit) = self.exit {
                    debug!("Target {} {}", self.pid, exit);
                }
                Ok(self.exit)
            }
            _ => {
                let err = io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::ECHILD) {
                    Err(PeekError::ProcessNotFound(self.pid.0))
                } else {
                    Err(PeekError::Io(err))
                }
            }
        }
    }

    /// Poll [`try_wait`](Self::try_wait) until the process is reaped or `timeout` passes.
    ///
    /// ## Errors
    ///
    /// Same as [`try_wait`](Self::try_wait).
    pub fn wait_timeout(&mut self, timeout: Duration) -> PeekResult<Option<TargetExit>>
    {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(exit) = self.try_wait()? {
                return Ok(Some(exit));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    /// Send `SIGTERM` unless the process has already been reaped.
    ///
    /// ## Errors
    ///
    /// `ProcessNotFound` if the process no longer exists.
    pub fn terminate(&mut self) -> PeekResult<()>
    {
        self.signal(libc::SIGTERM)
    }

    /// Send `SIGKILL` unless the process has already been reaped.
    ///
    /// ## Errors
    ///
    /// `ProcessNotFound` if the process no longer exists.
    pub fn kill(&mut self) -> PeekResult<()>
    {
        self.signal(libc::SIGKILL)
    }

    fn raw_pid(&self) -> PeekResult<libc::pid_t>
    {
        self.pid.as_raw().ok_or(PeekError::ProcessNotFound(self.pid.0))
    }

    #[allow(unsafe_code)] // kill(2)
    fn signal(&mut self, signal: c_int) -> PeekResult<()>
    {
        if self.exit.is_some() {
            return Ok(());
        }
        let raw = self.raw_pid()?;
        if unsafe { libc::kill(raw, signal) } == -1 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ESRCH) {
                return Err(PeekError::ProcessNotFound(self.pid.0));
            }
            return Err(PeekError::Io(err));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn exec_class_errors_are_distinguished()
    {
        let program = Path::new("/nonexistent/target");
        assert!(matches!(
            classify_spawn_error(program, libc::ENOENT),
            PeekError::ExecFailed { .. }
        ));
        assert!(matches!(
            classify_spawn_error(program, libc::EACCES),
            PeekError::ExecFailed { .. }
        ));
        assert!(matches!(classify_spawn_error(program, libc::EAGAIN), PeekError::SpawnFailed(_)));
        assert!(matches!(classify_spawn_error(program, libc::ENOMEM), PeekError::SpawnFailed(_)));
    }

    #[test]
    #[allow(unsafe_code)]
    fn pipe_ends_are_close_on_exec()
    {
        let pipe = PipePair::new().unwrap();
        for fd in [pipe.read_end(), pipe.write_end()] {
            let flags = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFD) };
            assert!(flags & libc::FD_CLOEXEC != 0);
        }
    }

    #[test]
    fn empty_program_is_rejected()
    {
        let launcher = Launcher::new(&InspectorConfig::default());
        assert!(matches!(
            launcher.launch(Path::new("")),
            Err(PeekError::InvalidArgument(_))
        ));
    }

    #[test]
    fn missing_program_is_an_exec_failure()
    {
        let launcher = Launcher::new(&InspectorConfig::default());
        match launcher.launch(Path::new("/nonexistent/taskpeek-target")) {
            // glibc and macOS report the exec errno from posix_spawn itself.
            Err(PeekError::ExecFailed { program, .. }) => assert!(program.contains("taskpeek-target")),
            // Older libcs spawn successfully and the child exits with 127.
            Ok((mut target, _channel)) => {
                let exit = target.wait_timeout(Duration::from_secs(5)).unwrap();
                assert!(exit.is_some_and(TargetExit::looks_like_exec_failure));
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn group_pids_never_reach_kill_or_waitpid()
    {
        // kill(0, ..) would signal our own process group; waitpid(-1, ..) would reap any child.
        for pid in [ProcessId(0), ProcessId(u32::MAX)] {
            let mut target = TargetProcess::new(pid, PathBuf::from("/bin/sh"));
            assert!(matches!(target.terminate(), Err(PeekError::ProcessNotFound(_))));
            assert!(matches!(target.try_wait(), Err(PeekError::ProcessNotFound(_))));
        }
    }
}
