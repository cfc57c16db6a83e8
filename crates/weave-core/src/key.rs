#![forbid(unsafe_code)]

//! Property keys and watch paths.
//!
//! A [`Key`] names one property step: a string key on an object or a
//! numeric index on an array. Notification paths are slices of keys. Watch
//! paths are parsed from dotted strings (`"a.b.*"`) into [`WatchPath`]
//! segments, where `*` matches one segment and `**` matches any remaining
//! depth.
//!
//! Matching between the two is done on the textual segment, so the watch
//! path `"items.0"` matches the notification key `Key::Index(0)`.

use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::error::WatchError;

/// Segment that matches exactly one path segment.
pub const WILDCARD: &str = "*";
/// Segment that matches any remaining depth; only legal as the last segment.
pub const DEEP_WILDCARD: &str = "**";

/// One step of a property path.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// Named property.
    Name(Rc<str>),
    /// Array index.
    Index(usize),
}

impl Key {
    /// The key as a path segment (`Index(3)` → `"3"`).
    #[must_use]
    pub fn segment(&self) -> Cow<'_, str> {
        match self {
            Self::Name(name) => Cow::Borrowed(name),
            Self::Index(index) => Cow::Owned(index.to_string()),
        }
    }

    /// Numeric value of the key, parsing names that are canonical integers.
    #[must_use]
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Index(index) => Some(*index),
            Self::Name(name) => parse_index(name),
        }
    }

    /// Whether the key is the array `length` pseudo-property.
    #[must_use]
    pub fn is_length(&self) -> bool {
        matches!(self, Self::Name(name) if &**name == "length")
    }

    /// Private keys start with `_` and are exempt from the attrs contract.
    #[must_use]
    pub fn is_private(&self) -> bool {
        matches!(self, Self::Name(name) if name.starts_with('_'))
    }

    /// The `length` key.
    #[must_use]
    pub fn length() -> Self {
        Self::Name(Rc::from("length"))
    }
}

fn parse_index(s: &str) -> Option<usize> {
    if s.is_empty() || (s.len() > 1 && s.starts_with('0')) {
        return None;
    }
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{name:?}"),
            Self::Index(index) => write!(f, "[{index}]"),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Self::Name(Rc::from(name))
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Self::Name(Rc::from(name))
    }
}

impl From<Rc<str>> for Key {
    fn from(name: Rc<str>) -> Self {
        Self::Name(name)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// Render a notification path as a dotted string, for logs and tests.
#[must_use]
pub fn path_string(path: &[Key]) -> String {
    let mut out = String::new();
    for (i, key) in path.iter().enumerate() {
        if i > 0 {
            out.push('.');
        }
        out.push_str(&key.segment());
    }
    out
}

// ---------------------------------------------------------------------------
// WatchPath
// ---------------------------------------------------------------------------

/// A validated watch path.
///
/// # Invariants
///
/// 1. At least one segment; no segment is empty.
/// 2. `**` appears at most once, as the final segment.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct WatchPath {
    segments: SmallVec<[Rc<str>; 4]>,
}

impl WatchPath {
    /// Parse a dotted path such as `"a.b.*"` or `"list.**"`.
    pub fn parse(path: &str) -> Result<Self, WatchError> {
        Self::from_segments(path.split('.'))
    }

    /// Build a path from individual segments.
    pub fn from_segments<I, S>(segments: I) -> Result<Self, WatchError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let segments: SmallVec<[Rc<str>; 4]> = segments
            .into_iter()
            .map(|s| Rc::from(s.as_ref()))
            .collect();
        if segments.is_empty() {
            return Err(WatchError::EmptyPath);
        }
        let display = join(&segments);
        if segments.iter().any(|s| s.is_empty()) {
            return Err(WatchError::EmptySegment { path: display });
        }
        let last = segments.len() - 1;
        if segments[..last].iter().any(|s| &**s == DEEP_WILDCARD) {
            return Err(WatchError::DeepWildcardNotLast { path: display });
        }
        Ok(Self { segments })
    }

    /// The parsed segments.
    #[must_use]
    pub fn segments(&self) -> &[Rc<str>] {
        &self.segments
    }

    /// Number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always false; kept for API symmetry with slices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

fn join(segments: &[Rc<str>]) -> String {
    segments
        .iter()
        .map(|s| &**s)
        .collect::<Vec<_>>()
        .join(".")
}

impl fmt::Debug for WatchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WatchPath({})", join(&self.segments))
    }
}

impl fmt::Display for WatchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&join(&self.segments))
    }
}

impl std::str::FromStr for WatchPath {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_keys_render_as_segments() {
        assert_eq!(Key::Index(7).segment(), "7");
        assert_eq!(Key::from("name").segment(), "name");
    }

    #[test]
    fn canonical_integer_names_parse_as_indices() {
        assert_eq!(Key::from("12").as_index(), Some(12));
        assert_eq!(Key::from("012").as_index(), None);
        assert_eq!(Key::from("-1").as_index(), None);
        assert_eq!(Key::from("length").as_index(), None);
    }

    #[test]
    fn parse_accepts_trailing_deep_wildcard() {
        let path = WatchPath::parse("a.b.**").unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(path.to_string(), "a.b.**");
    }

    #[test]
    fn parse_rejects_inner_deep_wildcard() {
        assert_eq!(
            WatchPath::parse("a.**.b"),
            Err(WatchError::DeepWildcardNotLast {
                path: "a.**.b".into()
            })
        );
    }

    #[test]
    fn parse_rejects_empty_segments() {
        assert!(matches!(
            WatchPath::parse("a..b"),
            Err(WatchError::EmptySegment { .. })
        ));
        assert!(matches!(
            WatchPath::parse(""),
            Err(WatchError::EmptySegment { .. })
        ));
        assert_eq!(
            WatchPath::from_segments(Vec::<&str>::new()),
            Err(WatchError::EmptyPath)
        );
    }

    #[test]
    fn private_and_length_keys() {
        assert!(Key::from("_cache").is_private());
        assert!(!Key::from("cache").is_private());
        assert!(Key::length().is_length());
        assert!(!Key::Index(0).is_private());
    }

    #[test]
    fn path_string_joins_with_dots() {
        let path = [Key::from("a"), Key::Index(2), Key::from("b")];
        assert_eq!(path_string(&path), "a.2.b");
    }
}
