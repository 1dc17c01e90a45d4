//! Integration tests for the macOS debug engine
//!
//! These tests require:
//! - Running on macOS (`#[cfg(target_os = "macos")]`)
//! - Special permissions (sudo or debugging entitlements) for the tests that attach
//!
//! Tests that need `task_for_pid()` skip with a message when it is refused.

#![cfg(target_os = "macos")]

use std::path::Path;

use taskpeek_core::engine::{create_engine, DebugEngine, MemoryAccess};
use taskpeek_core::error::PeekError;
use taskpeek_core::platform::macos::{MacEngine, MachTask};
use taskpeek_core::target::{ImageKind, TargetImage};
use taskpeek_core::types::{Address, ProcessId};

#[test]
fn test_engine_initializes()
{
    let engine = create_engine().unwrap();
    assert_eq!(engine.name(), "macos-mach");
    assert!(engine.initialize().is_ok());
    assert!(engine.initialize().is_ok());
}

#[test]
fn test_attach_invalid_pid()
{
    let engine = MacEngine::new();
    let image = TargetImage::new("/bin/sh", ImageKind::Unknown);
    let report = engine.attach(&image, ProcessId::from(i32::MAX as u32));

    assert!(!report.is_usable());
    match report.status {
        Err(PeekError::ProcessNotFound(_) | PeekError::MachError(_) | PeekError::PermissionDenied(_)) => {}
        other => panic!("unexpected attach status: {other:?}"),
    }
}

#[test]
fn test_read_own_memory()
{
    let mut task = match MachTask::attach(ProcessId(std::process::id())) {
        Ok(task) => task,
        Err(PeekError::PermissionDenied(msg)) => {
            eprintln!("skipping: {msg}");
            return;
        }
        Err(err) => panic!("unexpected attach error: {err}"),
    };

    let value: u64 = 0x0123_4567_89ab_cdef;
    let bytes = task.read(Address::from(&value as *const u64 as u64), 8).unwrap();
    assert_eq!(bytes, value.to_ne_bytes());

    task.detach().unwrap();
    assert!(!task.is_valid());
    assert!(matches!(task.read(Address::from(0x1000u64), 1), Err(PeekError::NotAttached)));
}

#[test]
fn test_resolve_system_binary()
{
    let engine = MacEngine::new();
    let image = engine.resolve_target(Path::new("/bin/ls")).unwrap();
    // System binaries are usually universal, which resolves as Unknown.
    assert!(!matches!(image.kind(), ImageKind::Script { .. }));
}
