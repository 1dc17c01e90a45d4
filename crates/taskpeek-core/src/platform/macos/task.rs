//! # macOS Task Capability
//!
//! On macOS, a **task** represents a process. The inspector's capability is a send right
//! to the target's task port, obtained with `task_for_pid()`.
//!
//! ## Mach Ports
//!
//! Mach ports are communication channels to kernel objects (tasks, threads, etc.).
//! They're like file descriptors, but for kernel objects. The right is released with
//! `mach_port_deallocate()` on detach, or on drop if detach was never called.
//!
//! ## References
//!
//! - [Apple Mach Kernel Programming](https://developer.apple.com/library/archive/documentation/Darwin/Conceptual/KernelProgramming/Mach/Mach.html)
//! - [XNU Kernel Source](https://github.com/apple-oss-distributions/xnu) (for `task_for_pid` implementation)

use std::cmp::min;

use libc::c_int;
use mach2::kern_return::{kern_return_t, KERN_FAILURE, KERN_INVALID_ADDRESS, KERN_PROTECTION_FAILURE, KERN_SUCCESS};
use mach2::mach_port::mach_port_deallocate;
use mach2::message::mach_msg_type_number_t;
use mach2::port::{mach_port_t, MACH_PORT_NULL};
use mach2::traps::{mach_task_self, task_for_pid};
use mach2::vm::{mach_vm_read_overwrite, mach_vm_write};
use mach2::vm_types::{mach_vm_address_t, mach_vm_size_t, vm_offset_t};
use tracing::{debug, trace, warn};

use super::error::MachError;
use crate::engine::MemoryAccess;
use crate::error::{PeekError, PeekResult};
use crate::types::{Address, ProcessId};

/// Largest single `mach_vm_read_overwrite()` call.
const MAX_VM_READ_CHUNK: usize = 64 * 1024;

/// Send right to a target's task port.
#[derive(Debug)]
pub struct MachTask
{
    pid: ProcessId,
    task: mach_port_t,
}

impl MachTask
{
    /// Obtain the task port for `pid`.
    ///
    /// ## Errors
    ///
    /// - `PermissionDenied`: the process exists but `task_for_pid()` refused (needs `sudo`
    ///   or the debugger entitlement)
    /// - `ProcessNotFound`: no such process
    /// - `MachError`: any other Mach failure
    #[allow(unsafe_code)] // task_for_pid(), kill(2)
    pub fn attach(pid: ProcessId) -> PeekResult<Self>
    {
        let raw = pid.as_raw().ok_or(PeekError::ProcessNotFound(pid.0))?;
        let mut task: mach_port_t = MACH_PORT_NULL;
        let result = unsafe { task_for_pid(mach_task_self(), raw as c_int, &mut task) };

        if result != KERN_SUCCESS {
            // macOS quirk: task_for_pid() returns KERN_FAILURE instead of
            // KERN_PROTECTION_FAILURE when permissions are denied.
            if result == KERN_FAILURE || result == KERN_PROTECTION_FAILURE {
                if process_exists(pid) {
                    return Err(PeekError::PermissionDenied(format!(
                        "task_for_pid() failed for PID {pid}, which exists. Try running with sudo or signing with \
                         the debugger entitlement."
                    )));
                }
                return Err(PeekError::ProcessNotFound(pid.0));
            }
            return Err(MachError::from(result).into());
        }

        debug!("Obtained task port {} for PID {}", task, pid);
        Ok(Self { pid, task })
    }

    fn task(&self) -> PeekResult<mach_port_t>
    {
        if self.task == MACH_PORT_NULL {
            return Err(PeekError::NotAttached);
        }
        Ok(self.task)
    }

    fn classify(&self, code: kern_return_t) -> Option<PeekError>
    {
        if !process_exists(self.pid) {
            return Some(PeekError::CapabilityRevoked(self.pid.0));
        }
        match code {
            KERN_INVALID_ADDRESS | KERN_PROTECTION_FAILURE => None,
            _ => Some(MachError::from(code).into()),
        }
    }
}

impl MemoryAccess for MachTask
{
    fn pid(&self) -> ProcessId
    {
        self.pid
    }

    fn is_valid(&self) -> bool
    {
        self.task != MACH_PORT_NULL && process_exists(self.pid)
    }

    #[allow(unsafe_code)] // mach_vm_read_overwrite()
    fn read(&self, address: Address, len: usize) -> PeekResult<Vec<u8>>
    {
        let task = self.task()?;
        let mut buffer = vec![0u8; len];
        let mut total = 0usize;
        let mut cursor = address.value();

        while total < len {
            let chunk_len = min(MAX_VM_READ_CHUNK, len - total);
            let mut actual: mach_vm_size_t = 0;

            let result = unsafe {
                mach_vm_read_overwrite(
                    task,
                    cursor,
                    chunk_len as mach_vm_size_t,
                    buffer[total..].as_mut_ptr() as mach_vm_address_t,
                    &mut actual,
                )
            };

            if result != KERN_SUCCESS {
                if total > 0 {
                    break;
                }
                return Err(self.classify(result).unwrap_or_else(|| PeekError::ReadFailed {
                    address: address.value(),
                    len,
                    details: MachError::from(result).to_string(),
                }));
            }

            if actual == 0 {
                break;
            }

            total += actual as usize;
            cursor += actual;
        }

        trace!("Read {} of {} byte(s) at {} from PID {}", total, len, address, self.pid);
        buffer.truncate(total);
        Ok(buffer)
    }

    #[allow(unsafe_code)] // mach_vm_write()
    fn write(&self, address: Address, data: &[u8]) -> PeekResult<usize>
    {
        let task = self.task()?;
        if data.is_empty() {
            return Ok(0);
        }

        let count = mach_msg_type_number_t::try_from(data.len()).map_err(|_| PeekError::WriteFailed {
            address: address.value(),
            len: data.len(),
            details: "write too large".to_string(),
        })?;

        let result = unsafe { mach_vm_write(task, address.value(), data.as_ptr() as vm_offset_t, count) };

        if result != KERN_SUCCESS {
            return Err(self.classify(result).unwrap_or_else(|| PeekError::WriteFailed {
                address: address.value(),
                len: data.len(),
                details: MachError::from(result).to_string(),
            }));
        }

        Ok(data.len())
    }

    #[allow(unsafe_code)] // mach_port_deallocate()
    fn detach(&mut self) -> PeekResult<()>
    {
        if self.task == MACH_PORT_NULL {
            return Ok(());
        }

        let task = std::mem::replace(&mut self.task, MACH_PORT_NULL);
        let result = unsafe { mach_port_deallocate(mach_task_self(), task) };
        if result != KERN_SUCCESS {
            return Err(MachError::from(result).into());
        }

        debug!("Released task port for PID {}", self.pid);
        Ok(())
    }
}

impl Drop for MachTask
{
    fn drop(&mut self)
    {
        if let Err(err) = self.detach() {
            warn!("Failed to release task port for PID {}: {}", self.pid, err);
        }
    }
}

/// `kill(pid, 0)`: signal 0 checks for existence without sending anything.
#[allow(unsafe_code)]
fn process_exists(pid: ProcessId) -> bool
{
    let Some(raw) = pid.as_raw() else {
        return false;
    };
    unsafe { libc::kill(raw, 0) == 0 || *libc::__error() == libc::EPERM }
}
