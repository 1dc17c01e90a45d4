//! Request line decoding and encoding.

use thiserror::Error;
use tracing::debug;

use crate::request::MemoryRequest;
use crate::table::TypeTable;

/// Why a request line could not be turned into an actionable [`MemoryRequest`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError
{
    /// The line contained no tokens.
    #[error("empty request")]
    Empty,

    /// Only one token was present.
    #[error("missing type tag after {0:?}")]
    MissingTag(String),

    /// The first token is not a hexadecimal `u64`.
    #[error("invalid hexadecimal address {0:?}")]
    InvalidAddress(String),

    /// The type tag is not in the table. The address parsed fine and is kept.
    #[error("unknown type tag {tag:?} for address 0x{address:x}")]
    UnknownTag
    {
        /// Address that preceded the tag
        address: u64,
        /// The unrecognised tag
        tag: String,
    },
}

/// Parse a hexadecimal address token.
///
/// An optional `0x` / `0X` prefix is accepted. Every remaining character must be a hex
/// digit and the value must fit in a `u64`; there is no partial parse.
pub fn parse_hex_address(token: &str) -> Option<u64>
{
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }

    u64::from_str_radix(digits, 16).ok()
}

/// Decode a request line, reporting exactly what was wrong with it.
///
/// Tokens after the type tag are ignored.
///
/// ## Errors
///
/// See [`DecodeError`].
pub fn decode_strict(message: &str, table: &TypeTable) -> Result<MemoryRequest, DecodeError>
{
    let mut tokens = message.split_whitespace();

    let address_token = tokens.next().ok_or(DecodeError::Empty)?;
    let tag = tokens
        .next()
        .ok_or_else(|| DecodeError::MissingTag(address_token.to_string()))?;

    let address =
        parse_hex_address(address_token).ok_or_else(|| DecodeError::InvalidAddress(address_token.to_string()))?;

    let size = table.width(tag).ok_or_else(|| DecodeError::UnknownTag {
        address,
        tag: tag.to_string(),
    })?;

    Ok(MemoryRequest::new(address, size))
}

/// Decode a request line. Never fails.
///
/// Lines with fewer than two tokens or a malformed address become
/// [`MemoryRequest::NONE`]. An unknown tag keeps the address but leaves the size at zero.
pub fn decode(message: &str, table: &TypeTable) -> MemoryRequest
{
    match decode_strict(message, table) {
        Ok(request) => request,
        Err(DecodeError::UnknownTag { address, tag }) => {
            debug!("Unknown type tag {tag:?} for 0x{address:x}, size left at zero");
            MemoryRequest::new(address, 0)
        }
        Err(err) => {
            debug!("Request {message:?} decoded as no-op: {err}");
            MemoryRequest::NONE
        }
    }
}

/// Encode a request line as a target would write it, newline included.
pub fn encode(address: u64, tag: &str) -> String
{
    format!("{address:x} {tag}\n")
}

#[cfg(test)]
mod tests
{
    use proptest::prelude::*;

    use super::*;
    use crate::table::BOOL_TAG;

    #[test]
    fn decodes_bool_request()
    {
        let request = decode("7fff5fbff7a0 b", &TypeTable::default());
        assert_eq!(request.address(), 0x7fff_5fbf_f7a0);
        assert_eq!(request.size(), std::mem::size_of::<bool>());
        assert!(request.is_actionable());
    }

    #[test]
    fn zero_address_is_a_noop()
    {
        let request = decode("0 b", &TypeTable::default());
        assert_eq!(request.address(), 0);
        assert!(!request.is_actionable());
    }

    #[test]
    fn unknown_tag_keeps_address_but_not_size()
    {
        let table = TypeTable::default();
        let request = decode("1000 x", &table);
        assert_eq!(request.address(), 0x1000);
        assert_eq!(request.size(), 0);
        assert!(!request.is_actionable());

        assert_eq!(
            decode_strict("1000 x", &table),
            Err(DecodeError::UnknownTag {
                address: 0x1000,
                tag: "x".to_string()
            })
        );
    }

    #[test]
    fn too_few_tokens()
    {
        let table = TypeTable::default();
        assert_eq!(decode("", &table), MemoryRequest::NONE);
        assert_eq!(decode("   \t ", &table), MemoryRequest::NONE);
        assert_eq!(decode("1000", &table), MemoryRequest::NONE);
        assert_eq!(decode_strict("", &table), Err(DecodeError::Empty));
        assert_eq!(decode_strict("1000", &table), Err(DecodeError::MissingTag("1000".to_string())));
    }

    #[test]
    fn address_parsing_is_strict()
    {
        let table = TypeTable::default();
        assert_eq!(decode("12zz b", &table), MemoryRequest::NONE);
        assert_eq!(decode("+12 b", &table), MemoryRequest::NONE);
        assert_eq!(decode("0x b", &table), MemoryRequest::NONE);
        assert_eq!(decode("10000000000000000 b", &table), MemoryRequest::NONE);
        assert_eq!(
            decode_strict("-1 b", &table),
            Err(DecodeError::InvalidAddress("-1".to_string()))
        );
    }

    #[test]
    fn prefixes_and_separators()
    {
        let table = TypeTable::default();
        assert_eq!(decode("0xDEADbeef b", &table).address(), 0xdead_beef);
        assert_eq!(decode("0XFF\tb", &table).address(), 0xff);
        assert_eq!(decode("  ff   b  trailing tokens", &table).address(), 0xff);
    }

    #[test]
    fn extended_table()
    {
        let table = TypeTable::default().with_tag("q", 8);
        assert_eq!(decode("1000 q", &table), MemoryRequest::new(0x1000, 8));
    }

    #[test]
    fn encode_matches_decode()
    {
        let line = encode(0x7fff_5fbf_f7a0, BOOL_TAG);
        assert_eq!(line, "7fff5fbff7a0 b\n");
        assert_eq!(decode(&line, &TypeTable::default()).address(), 0x7fff_5fbf_f7a0);
    }

    proptest! {
        #[test]
        fn any_hex_with_bool_tag_decodes(address in any::<u64>(), prefixed in any::<bool>(), upper in any::<bool>())
        {
            let hex = if upper { format!("{address:X}") } else { format!("{address:x}") };
            let token = if prefixed { format!("0x{hex}") } else { hex };
            let request = decode(&format!("{token} b"), &TypeTable::default());
            prop_assert_eq!(request.address(), address);
            prop_assert_eq!(request.size(), std::mem::size_of::<bool>());
        }

        #[test]
        fn single_token_never_actionable(token in "\\S{0,24}")
        {
            let request = decode(&token, &TypeTable::default());
            prop_assert!(!request.is_actionable());
            prop_assert_eq!(request.address(), 0);
        }

        #[test]
        fn unknown_tags_have_zero_size(address in 1u64.., tag in "[c-z][a-z0-9]{0,6}")
        {
            let request = decode(&format!("{address:x} {tag}"), &TypeTable::default());
            prop_assert_eq!(request.size(), 0);
            prop_assert!(!request.is_actionable());
        }
    }
}
