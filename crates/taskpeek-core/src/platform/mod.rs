//! # Platform-Specific Implementations
//!
//! Each platform has its own submodule that implements the
//! [`DebugEngine`](crate::engine::DebugEngine) trait with that platform's native APIs:
//!
//! - **Linux**: `/proc/<pid>/mem`
//!   - See: [proc_pid_mem(5)](https://man7.org/linux/man-pages/man5/proc_pid_mem.5.html)
//! - **macOS**: Mach task ports (`task_for_pid`, `mach_vm_read_overwrite`)
//!   - See: [Apple Mach Kernel Programming](https://developer.apple.com/library/archive/documentation/Darwin/Conceptual/KernelProgramming/Mach/Mach.html)
//!
//! Only the module for the current platform is compiled.

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "macos")]
pub mod macos;
