//! # Memory Access Operations
//!
//! Bounded reads and writes against an [`AttachedSession`].
//!
//! Both operations refuse null addresses and empty ranges, re-check the session before
//! touching the target, and treat a short transfer as a failure rather than a partial
//! success.

use std::fmt::Write as _;

use taskpeek_protocol::MemoryRequest;
use tracing::trace;

use crate::error::{PeekError, PeekResult};
use crate::session::AttachedSession;
use crate::types::Address;

/// Read exactly `request.size()` bytes at `request.address()`.
///
/// ## Errors
///
/// - `InvalidArgument`: the request is not actionable, exceeds `max_read_size`, or its
///   range wraps around the address space
/// - `CapabilityRevoked`: the session is no longer valid
/// - `ReadFailed`: the platform read failed or came back short
pub fn read_memory(session: &AttachedSession, request: MemoryRequest, max_read_size: usize) -> PeekResult<Vec<u8>>
{
    if let Some(reason) = request.skip_reason() {
        return Err(PeekError::InvalidArgument(format!("request {request} is not actionable: {reason}")));
    }

    let address = Address::new(request.address());
    let size = request.size();
    if size > max_read_size {
        return Err(PeekError::InvalidArgument(format!(
            "read of {size} byte(s) exceeds the {max_read_size}-byte limit"
        )));
    }
    if address.range_end(size).is_none() {
        return Err(PeekError::InvalidArgument(format!("range {request} wraps the address space")));
    }

    if !session.is_valid() {
        return Err(PeekError::CapabilityRevoked(session.pid().0));
    }

    let bytes = session.capability().read(address, size)?;
    if bytes.len() != size {
        return Err(PeekError::ReadFailed {
            address: address.value(),
            len: size,
            details: format!("short read: {} of {size} byte(s)", bytes.len()),
        });
    }

    trace!("Read {} from PID {}", request, session.pid());
    Ok(bytes)
}

/// Write all of `data` at `address`.
///
/// ## Errors
///
/// - `InvalidArgument`: null address, empty data, or a wrapping range
/// - `CapabilityRevoked`: the session is no longer valid
/// - `WriteFailed`: the platform write failed or came back short
pub fn write_memory(session: &AttachedSession, address: Address, data: &[u8]) -> PeekResult<usize>
{
    if address.is_null() {
        return Err(PeekError::InvalidArgument("cannot write to a null address".to_string()));
    }
    if data.is_empty() {
        return Err(PeekError::InvalidArgument("nothing to write".to_string()));
    }
    if address.range_end(data.len()).is_none() {
        return Err(PeekError::InvalidArgument(format!(
            "write of {} byte(s) at {address} wraps the address space",
            data.len()
        )));
    }

    if !session.is_valid() {
        return Err(PeekError::CapabilityRevoked(session.pid().0));
    }

    let written = session.capability().write(address, data)?;
    if written != data.len() {
        return Err(PeekError::WriteFailed {
            address: address.value(),
            len: data.len(),
            details: format!("short write: {written} of {} byte(s)", data.len()),
        });
    }

    trace!("Wrote {} byte(s) at {} in PID {}", written, address, session.pid());
    Ok(written)
}

/// Formats bytes into a traditional hex + ASCII view.
pub fn format_hexdump(base: Address, bytes: &[u8], width: usize) -> String
{
    let width = width.clamp(8, 32);
    let mut out = String::new();
    for (row, chunk) in bytes.chunks(width).enumerate() {
        let addr = base.value().saturating_add((row * width) as u64);
        let _ = write!(out, "{addr:016x}: ");

        for i in 0..width {
            match chunk.get(i) {
                Some(byte) => {
                    let _ = write!(out, "{byte:02x} ");
                }
                None => out.push_str("   "),
            }
        }

        out.push(' ');
        out.extend(chunk.iter().map(|&byte| {
            if byte.is_ascii_graphic() || byte == b' ' {
                byte as char
            } else {
                '.'
            }
        }));
        out.push('\n');
    }
    out
}
