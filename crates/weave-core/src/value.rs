#![forbid(unsafe_code)]

//! Values stored in view-model properties.
//!
//! Primitives are stored inline; objects and arrays live in the graph arena
//! and are referenced by [`NodeId`]. Built-in value types that must not be
//! wrapped (dates, regular expressions, boxed booleans, host handles) are
//! carried as [`Opaque`] leaves.
//!
//! # Equality
//!
//! [`Value::same`] is the referential comparison used to skip no-op writes:
//! primitives compare by value (`NaN` is never the same as itself), nodes by
//! handle, opaque values by pointer.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::graph::NodeId;

/// A property value.
#[derive(Clone, Default)]
pub enum Value {
    /// Missing property.
    #[default]
    Undefined,
    /// Explicit null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Number (all numbers are `f64`).
    Number(f64),
    /// Immutable string.
    Str(Rc<str>),
    /// Object or array in the graph.
    Node(NodeId),
    /// Opaque leaf, never wrapped.
    Opaque(Opaque),
}

impl Value {
    /// Referential equality.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Node(a), Self::Node(b)) => a == b,
            (Self::Opaque(a), Self::Opaque(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Truthiness used by conditional rendering.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::Str(s) => !s.is_empty(),
            Self::Node(_) | Self::Opaque(_) => true,
        }
    }

    /// The node handle, if this value is an object or array.
    #[must_use]
    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Self::Node(id) => Some(*id),
            _ => None,
        }
    }

    /// The number, if this value is numeric.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The string, if this value is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Whether the value is `Undefined`.
    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Text rendering used by text bindings.
    ///
    /// `Undefined` and `Null` render empty; integral numbers render without a
    /// fractional part.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Undefined | Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::Str(s) => s.to_string(),
            Self::Node(_) => "[object]".to_string(),
            Self::Opaque(o) => format!("{o:?}"),
        }
    }

    /// Hashable identity used for list keys.
    #[must_use]
    pub fn identity(&self) -> Identity {
        match self {
            Self::Undefined => Identity::Undefined,
            Self::Null => Identity::Null,
            Self::Bool(b) => Identity::Bool(*b),
            Self::Number(n) => Identity::Number(normalize_bits(*n)),
            Self::Str(s) => Identity::Str(Rc::clone(s)),
            Self::Node(id) => Identity::Node(*id),
            Self::Opaque(o) => Identity::Opaque(o.addr()),
        }
    }
}

fn normalize_bits(n: f64) -> u64 {
    // +0 and -0 are the same key.
    if n == 0.0 { 0 } else { n.to_bits() }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        n.to_string()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{}", format_number(*n)),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Node(id) => write!(f, "{id:?}"),
            Self::Opaque(o) => write!(f, "{o:?}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Self::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(Rc::from(s))
    }
}

impl From<NodeId> for Value {
    fn from(id: NodeId) -> Self {
        Self::Node(id)
    }
}

impl From<Opaque> for Value {
    fn from(o: Opaque) -> Self {
        Self::Opaque(o)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

// ---------------------------------------------------------------------------
// Opaque
// ---------------------------------------------------------------------------

/// A shared value the graph stores as-is and compares by pointer.
#[derive(Clone)]
pub struct Opaque {
    inner: Rc<dyn Any>,
    type_name: &'static str,
}

impl Opaque {
    /// Wrap any value as an opaque leaf.
    pub fn new<T: Any>(value: T) -> Self {
        Self {
            inner: Rc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Borrow the contents as `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref()
    }

    /// Pointer identity.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner).cast::<()>() as usize
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Opaque<{}>", self.type_name)
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Hashable identity of a [`Value`], used as a list key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Identity {
    /// `Undefined`.
    Undefined,
    /// `Null`.
    Null,
    /// Boolean.
    Bool(bool),
    /// Number, by normalized bit pattern.
    Number(u64),
    /// String contents.
    Str(Rc<str>),
    /// Node handle.
    Node(NodeId),
    /// Opaque pointer address.
    Opaque(usize),
}
