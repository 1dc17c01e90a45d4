//! # taskpeek-protocol
//!
//! Wire format spoken by a taskpeek target over its standard output.
//!
//! A target asks the inspector to look at one of its own values by printing a single
//! line:
//!
//! ```text
//! <hex-address> <type-tag>\n
//! ```
//!
//! The address is hexadecimal (an optional `0x` prefix is accepted) and the type tag is
//! looked up in a [`TypeTable`] to find the byte width to read. The table is explicit and
//! extensible; the default one only knows `"b"` (a `bool`).
//!
//! Decoding never fails. Anything malformed collapses into a request that the inspector
//! treats as a no-op (see [`MemoryRequest::skip_reason`]). Callers that want to know
//! *why* a message was rejected can use [`decode_strict`].
//!
//! ## Example
//!
//! ```rust
//! use taskpeek_protocol::{decode, TypeTable};
//!
//! let table = TypeTable::default();
//! let request = decode("7fff5fbff7a0 b", &table);
//! assert_eq!(request.address(), 0x7fff_5fbf_f7a0);
//! assert_eq!(request.size(), std::mem::size_of::<bool>());
//! ```

pub mod decode;
pub mod framing;
pub mod request;
pub mod table;

pub use decode::{decode, decode_strict, encode, parse_hex_address, DecodeError};
pub use framing::LineFramer;
pub use request::{MemoryRequest, SkipReason};
pub use table::{TypeTable, BOOL_TAG};
