//! # Linux Memory Capability
//!
//! [`ProcMemory`] wraps an open `/proc/<pid>/mem`. Reads and writes are `pread` /
//! `pwrite` at the target virtual address used as the file offset.
//!
//! Error mapping:
//!
//! - `EIO` / `EFAULT`: the range is not mapped (or not accessible) in the target
//! - `ESRCH`, or end-of-file from a dead target: the capability is revoked
//! - `EINVAL`: the address does not fit in `off_t`

use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;

use tracing::{debug, trace};

use crate::engine::MemoryAccess;
use crate::error::{PeekError, PeekResult};
use crate::types::{Address, ProcessId};

/// Privileged access to one target through `/proc/<pid>/mem`.
#[derive(Debug)]
pub struct ProcMemory
{
    pid: ProcessId,
    file: Option<File>,
}

impl ProcMemory
{
    /// Open the target's memory file for reading and writing.
    ///
    /// ## Errors
    ///
    /// The raw `io::Error` from `open()`, so the engine can classify it.
    pub fn open(pid: ProcessId) -> io::Result<Self>
    {
        let path = format!("/proc/{pid}/mem");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .or_else(|err| {
                // Read-only is enough for inspection; some kernels refuse writable mem.
                if err.kind() == io::ErrorKind::PermissionDenied {
                    trace!("{} not writable, retrying read-only", path);
                    OpenOptions::new().read(true).open(&path)
                } else {
                    Err(err)
                }
            })?;
        Ok(Self { pid, file: Some(file) })
    }

    /// Whether the target still has an address space: it exists and is not a zombie.
    pub fn is_alive(&self) -> bool
    {
        process_is_alive(self.pid)
    }

    fn file(&self) -> PeekResult<&File>
    {
        self.file.as_ref().ok_or(PeekError::NotAttached)
    }

    fn classify(&self, err: &io::Error) -> Option<PeekError>
    {
        match err.raw_os_error() {
            Some(libc::ESRCH) => Some(PeekError::CapabilityRevoked(self.pid.0)),
            _ if !self.is_alive() => Some(PeekError::CapabilityRevoked(self.pid.0)),
            _ => None,
        }
    }
}

impl MemoryAccess for ProcMemory
{
    fn pid(&self) -> ProcessId
    {
        self.pid
    }

    fn is_valid(&self) -> bool
    {
        self.file.is_some() && self.is_alive()
    }

    fn read(&self, address: Address, len: usize) -> PeekResult<Vec<u8>>
    {
        let file = self.file()?;
        let mut buffer = vec![0u8; len];
        let mut total = 0usize;

        while total < len {
            let offset = address.value().saturating_add(total as u64);
            match file.read_at(&mut buffer[total..], offset) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                // Bytes before the unreadable page are still a (short) result.
                Err(_) if total > 0 => break,
                Err(err) => {
                    return Err(self.classify(&err).unwrap_or_else(|| PeekError::ReadFailed {
                        address: address.value(),
                        len,
                        details: err.to_string(),
                    }));
                }
            }
        }

        if total == 0 && len > 0 && !self.is_alive() {
            return Err(PeekError::CapabilityRevoked(self.pid.0));
        }

        trace!("Read {} of {} byte(s) at {} from PID {}", total, len, address, self.pid);
        buffer.truncate(total);
        Ok(buffer)
    }

    fn write(&self, address: Address, data: &[u8]) -> PeekResult<usize>
    {
        let file = self.file()?;
        let mut total = 0usize;

        while total < data.len() {
            let offset = address.value().saturating_add(total as u64);
            match file.write_at(&data[total..], offset) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    return Err(self.classify(&err).unwrap_or_else(|| PeekError::WriteFailed {
                        address: address.value(),
                        len: data.len(),
                        details: err.to_string(),
                    }));
                }
            }
        }

        Ok(total)
    }

    fn detach(&mut self) -> PeekResult<()>
    {
        if self.file.take().is_some() {
            debug!("Detached from PID {}", self.pid);
        }
        Ok(())
    }
}

/// `kill(pid, 0)` succeeds (or fails with `EPERM`) and `/proc/<pid>/stat` is not a zombie.
#[allow(unsafe_code)] // kill(2)
pub(crate) fn process_is_alive(pid: ProcessId) -> bool
{
    let Some(raw) = pid.as_raw() else {
        return false;
    };
    if unsafe { libc::kill(raw, 0) } != 0 && io::Error::last_os_error().raw_os_error() != Some(libc::EPERM) {
        return false;
    }

    match fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => !matches!(stat_state(&stat), Some('Z' | 'X')),
        Err(_) => false,
    }
}

/// Process state letter from a `/proc/<pid>/stat` line.
///
/// The command name is parenthesised and may itself contain `)`, so the state is found
/// after the *last* closing parenthesis.
fn stat_state(stat: &str) -> Option<char>
{
    let rest = &stat[stat.rfind(')')? + 1..];
    rest.trim_start().chars().next()
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn parses_state_after_tricky_comm()
    {
        assert_eq!(stat_state("1234 (bash) S 1 1234"), Some('S'));
        assert_eq!(stat_state("42 (a) b) Z 1 42"), Some('Z'));
        assert_eq!(stat_state("garbage"), None);
    }

    #[test]
    fn group_pids_are_never_alive()
    {
        assert!(process_is_alive(ProcessId(std::process::id())));
        assert!(!process_is_alive(ProcessId(0)));
        assert!(!process_is_alive(ProcessId(u32::MAX)));
    }

    #[test]
    fn reads_own_memory()
    {
        let pid = ProcessId(std::process::id());
        let memory = ProcMemory::open(pid).unwrap();
        assert!(memory.is_valid());

        let value: u32 = 0xdead_beef;
        let address = Address::from(&value as *const u32 as u64);
        let bytes = memory.read(address, 4).unwrap();
        assert_eq!(bytes, value.to_ne_bytes());
    }

    #[test]
    fn unmapped_address_is_a_read_failure()
    {
        let memory = ProcMemory::open(ProcessId(std::process::id())).unwrap();
        let err = memory.read(Address::from(0x10u64), 1).unwrap_err();
        assert!(matches!(err, PeekError::ReadFailed { address: 0x10, len: 1, .. }));
    }

    #[test]
    fn detach_makes_capability_invalid()
    {
        let mut memory = ProcMemory::open(ProcessId(std::process::id())).unwrap();
        memory.detach().unwrap();
        memory.detach().unwrap();
        assert!(!memory.is_valid());
        assert!(matches!(memory.read(Address::from(0x1000u64), 1), Err(PeekError::NotAttached)));
    }
}
