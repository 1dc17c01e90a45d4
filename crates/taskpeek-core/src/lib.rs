//! # taskpeek-core
//!
//! Process launch, debug attach, and cross-process memory access for taskpeek.
//!
//! This crate provides:
//! - Launching a target with its stdout wired into a [`RequestChannel`]
//! - The [`DebugEngine`] / [`MemoryAccess`] capability contract and platform backends
//! - Validated, cached [`AttachedSession`]s
//! - Bounded reads and writes of the target's memory
//! - The [`Inspector`] control loop that ties them together
//!
//! ## Platform Support
//!
//! - **Linux**: `/proc/<pid>/mem` (ptrace access check, target never stopped)
//! - **macOS**: Mach APIs (`task_for_pid`, `mach_vm_read_overwrite`)
//! - **Other Unix**: everything but attach works; [`create_engine`] returns `Unsupported`
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! use taskpeek_core::prelude::*;
//!
//! let config = InspectorConfig::default();
//! let (mut target, mut channel) = Launcher::new(&config).launch(Path::new("./my-target"))?;
//! let mut inspector = Inspector::for_target(create_engine()?, config, &target)?;
//! let reason = inspector.run(&mut channel, &mut target);
//! println!("{reason:?}");
//! # Ok::<(), PeekError>(())
//! ```
//!
//! ## Why unsafe code is needed
//!
//! Spawning, polling the pipe, and the Mach memory calls go straight to libc and the
//! kernel. Each call is wrapped in a safe function and the `unsafe` blocks are kept to
//! the FFI call itself.

#![allow(unsafe_code)] // Required for low-level system APIs (posix_spawn, poll, Mach)

pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod inspector;
pub mod launch;
pub mod memory;
pub mod platform;
pub mod prelude;
pub mod report;
pub mod session;
pub mod target;
pub mod types;

pub use channel::{ChannelEvent, RequestChannel};
pub use config::InspectorConfig;
pub use engine::{attach_is_usable, create_engine, AttachReport, DebugEngine, MemoryAccess};
pub use error::{PeekError, PeekResult};
pub use inspector::{ExitReason, Inspector, LoopState, LoopStats, ServiceOutcome};
pub use launch::{Launcher, TargetProcess};
pub use report::{ChannelSink, LogSink, ReportEvent, ReportSink};
pub use session::{AttachedSession, SessionCache, SessionSlot};
pub use target::{ImageKind, TargetImage};
pub use types::{Address, ProcessId, TargetExit};
