//! Decoded memory requests.

use std::fmt;

/// One unit of work requested by the target: read `size` bytes at `address`.
///
/// Built fresh for every received line and consumed once. The zero address is the
/// "no request" sentinel and a zero size means the type tag was not recognised; either
/// one makes the request a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MemoryRequest
{
    address: u64,
    size: usize,
}

/// Why a request will not reach the target's memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason
{
    /// The address was missing, malformed, or literally zero.
    NullAddress,
    /// The type tag was missing from the type table.
    UnknownSize,
}

impl fmt::Display for SkipReason
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            SkipReason::NullAddress => f.write_str("null address"),
            SkipReason::UnknownSize => f.write_str("unknown type size"),
        }
    }
}

impl MemoryRequest
{
    /// The no-op request.
    pub const NONE: Self = Self::new(0, 0);

    pub const fn new(address: u64, size: usize) -> Self
    {
        Self { address, size }
    }

    pub const fn address(self) -> u64
    {
        self.address
    }

    pub const fn size(self) -> usize
    {
        self.size
    }

    /// `true` when a memory operation may be attempted for this request.
    pub const fn is_actionable(self) -> bool
    {
        self.address != 0 && self.size != 0
    }

    /// The reason this request must be skipped, if any. The address is checked first.
    pub const fn skip_reason(self) -> Option<SkipReason>
    {
        if self.address == 0 {
            Some(SkipReason::NullAddress)
        } else if self.size == 0 {
            Some(SkipReason::UnknownSize)
        } else {
            None
        }
    }
}

impl fmt::Display for MemoryRequest
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{} byte(s) at 0x{:x}", self.size, self.address)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn none_is_not_actionable()
    {
        assert!(!MemoryRequest::NONE.is_actionable());
        assert_eq!(MemoryRequest::NONE.skip_reason(), Some(SkipReason::NullAddress));
        assert_eq!(MemoryRequest::default(), MemoryRequest::NONE);
    }

    #[test]
    fn skip_reasons()
    {
        assert_eq!(MemoryRequest::new(0, 1).skip_reason(), Some(SkipReason::NullAddress));
        assert_eq!(MemoryRequest::new(0x1000, 0).skip_reason(), Some(SkipReason::UnknownSize));
        assert_eq!(MemoryRequest::new(0x1000, 1).skip_reason(), None);
        assert!(MemoryRequest::new(0x1000, 1).is_actionable());
    }

    #[test]
    fn display()
    {
        assert_eq!(MemoryRequest::new(0x1000, 1).to_string(), "1 byte(s) at 0x1000");
    }
}
