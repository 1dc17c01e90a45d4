//! Memory address type.

use std::fmt;

/// Strongly typed virtual address in the target process.
///
/// Wrapping the raw `u64` keeps addresses from being mixed up with sizes and byte
/// counts, which travel through the same code paths.
///
/// ## Example
///
/// ```rust
/// use taskpeek_core::types::Address;
///
/// let addr = Address::from(0x1000);
/// assert_eq!(addr.checked_add(0x100), Some(Address::from(0x1100)));
/// assert!(Address::ZERO.is_null());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(u64);

impl Address
{
    /// The null address. Never a valid request target.
    pub const ZERO: Self = Address(0);

    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Get the raw `u64` value of this address
    pub const fn value(self) -> u64
    {
        self.0
    }

    pub const fn is_null(self) -> bool
    {
        self.0 == 0
    }

    /// Add an offset to this address, checking for overflow
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(Address)
    }

    /// End of a `len`-byte range starting here, or `None` if it wraps the address space.
    pub fn range_end(self, len: usize) -> Option<Self>
    {
        self.checked_add(u64::try_from(len).ok()?)
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:016x}", self.0)
    }
}

impl fmt::LowerHex for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::LowerHex::fmt(&self.0, f)
    }
}
