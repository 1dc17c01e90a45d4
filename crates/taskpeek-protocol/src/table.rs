//! Type tag table.
//!
//! Maps the second token of a request line to the number of bytes the inspector should
//! read. Only the boolean tag is registered by default; other widths are added by the
//! embedding application with [`TypeTable::with_tag`].

use std::collections::BTreeMap;

/// Tag for a `bool` on the target platform.
pub const BOOL_TAG: &str = "b";

/// Registry of recognised type tags and their byte widths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeTable
{
    widths: BTreeMap<String, usize>,
}

impl Default for TypeTable
{
    fn default() -> Self
    {
        Self::empty().with_tag(BOOL_TAG, std::mem::size_of::<bool>())
    }
}

impl TypeTable
{
    /// A table with no tags at all. Every request decoded against it has size zero.
    pub fn empty() -> Self
    {
        Self {
            widths: BTreeMap::new(),
        }
    }

    /// Register (or replace) a tag.
    ///
    /// Tags are matched exactly against a whitespace-delimited token, so a tag that
    /// contains whitespace can never match. A width of zero is stored but any request
    /// carrying it is skipped by the inspector.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>, width: usize) -> Self
    {
        self.insert(tag, width);
        self
    }

    /// Register (or replace) a tag in place, returning the previous width.
    pub fn insert(&mut self, tag: impl Into<String>, width: usize) -> Option<usize>
    {
        self.widths.insert(tag.into(), width)
    }

    /// Byte width registered for `tag`.
    pub fn width(&self, tag: &str) -> Option<usize>
    {
        self.widths.get(tag).copied()
    }

    /// Iterate over `(tag, width)` pairs in tag order.
    pub fn tags(&self) -> impl Iterator<Item = (&str, usize)>
    {
        self.widths.iter().map(|(tag, width)| (tag.as_str(), *width))
    }

    /// Largest registered width, or zero for an empty table.
    pub fn max_width(&self) -> usize
    {
        self.widths.values().copied().max().unwrap_or(0)
    }

    pub fn len(&self) -> usize
    {
        self.widths.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.widths.is_empty()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn default_table_knows_bool()
    {
        let table = TypeTable::default();
        assert_eq!(table.width(BOOL_TAG), Some(std::mem::size_of::<bool>()));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn unknown_tags_have_no_width()
    {
        let table = TypeTable::default();
        assert_eq!(table.width("x"), None);
        assert_eq!(table.width("B"), None);
    }

    #[test]
    fn tags_can_be_added_and_replaced()
    {
        let mut table = TypeTable::default().with_tag("u32", 4).with_tag("u64", 8);
        assert_eq!(table.width("u32"), Some(4));
        assert_eq!(table.max_width(), 8);

        assert_eq!(table.insert("u32", 2), Some(4));
        assert_eq!(table.width("u32"), Some(2));

        let tags: Vec<_> = table.tags().map(|(tag, _)| tag).collect();
        assert_eq!(tags, vec!["b", "u32", "u64"]);
    }

    #[test]
    fn empty_table()
    {
        let table = TypeTable::empty();
        assert!(table.is_empty());
        assert_eq!(table.max_width(), 0);
    }
}
