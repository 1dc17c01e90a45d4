//! Tests for error handling

use taskpeek_core::error::{PeekError, PeekResult};
#[cfg(target_os = "macos")]
use taskpeek_core::platform::macos::error::MachError;

#[cfg(target_os = "macos")]
#[test]
fn test_mach_error_protection_failure()
{
    let error = MachError::ProtectionFailure;
    let message = format!("{}", error);
    assert!(message.contains("Permission denied"));
}

#[cfg(target_os = "macos")]
#[test]
fn test_mach_error_unknown()
{
    let error = MachError::Unknown(999);
    let message = format!("{}", error);
    assert!(message.contains("999"));
}

#[cfg(target_os = "macos")]
#[test]
fn test_mach_error_to_peek_error()
{
    let peek_err: PeekError = MachError::InvalidAddress.into();
    assert!(matches!(peek_err, PeekError::MachError(MachError::InvalidAddress)));
}

#[test]
fn test_process_not_found_display()
{
    let error = PeekError::ProcessNotFound(12345);
    let message = format!("{}", error);
    assert!(message.contains("12345"));
    assert!(message.contains("not found"));
}

#[test]
fn test_permission_denied_display()
{
    let error = PeekError::PermissionDenied("test reason".to_string());
    let message = format!("{}", error);
    assert!(message.contains("Permission denied"));
    assert!(message.contains("test reason"));
}

#[test]
fn test_read_failed_display()
{
    let error = PeekError::ReadFailed {
        address: 0x1000,
        len: 1,
        details: "Input/output error".to_string(),
    };
    let message = format!("{}", error);
    assert!(message.contains("0x1000"));
    assert!(message.contains("1 byte"));
}

#[test]
fn test_exec_failed_display()
{
    let error = PeekError::ExecFailed {
        program: "/bin/nope".to_string(),
        details: "No such file or directory".to_string(),
    };
    assert!(format!("{}", error).contains("/bin/nope"));
}

#[test]
fn test_launch_error_classification()
{
    assert!(PeekError::ChannelFailed("pipe".into()).is_launch_error());
    assert!(PeekError::SpawnFailed("fork".into()).is_launch_error());
    assert!(PeekError::ExecFailed {
        program: "x".into(),
        details: "y".into()
    }
    .is_launch_error());
    assert!(!PeekError::PermissionDenied("x".into()).is_launch_error());
}

#[test]
fn test_session_invalidation_classification()
{
    assert!(PeekError::CapabilityRevoked(1).invalidates_session());
    assert!(PeekError::ProcessNotFound(1).invalidates_session());
    assert!(PeekError::NotAttached.invalidates_session());
    assert!(!PeekError::ReadFailed {
        address: 1,
        len: 1,
        details: String::new()
    }
    .invalidates_session());
    assert!(!PeekError::PermissionDenied("x".into()).invalidates_session());
}

#[test]
fn test_io_error_conversion()
{
    let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
    let error: PeekError = io.into();
    assert!(matches!(error, PeekError::Io(_)));
}

#[test]
fn test_result_type()
{
    // Test that Result type is properly aliased
    let _result: PeekResult<()> = Ok(());
    let _error_result: PeekResult<()> = Err(PeekError::ProcessNotFound(12345));
}
