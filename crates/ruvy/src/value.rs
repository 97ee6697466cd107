//! The runtime value model.
//!
//! Values form a small tagged union over the host language's primitive types
//! plus two interpreter-internal variants: the `main` toplevel object and
//! method handles. The interpreter itself needs very little from a value:
//! push/pop it, ask whether it is truthy, and obtain its [`TypeTag`] for
//! method-table lookup. Everything else (arithmetic, comparison, printing)
//! is host-runtime behavior reached through dynamic dispatch.
//!
//! Shared payloads (strings, arrays, hashes, method handles) are behind `Rc`,
//! so cloning a value is cheap and the ownership graph stays a plain tree:
//! the context owns instruction sequences, which own their nested sequences.

use std::{
    fmt::{self, Write},
    hash::{Hash, Hasher},
    mem::discriminant,
    rc::Rc,
};

use indexmap::IndexMap;
use strum::Display;

use crate::iseq::InstructionSequence;

/// A runtime value.
///
/// Immediate values (nil, booleans, integers) are stored inline; everything
/// with a payload shares it through `Rc`. Hashes use an insertion-ordered map
/// to match host semantics.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    True,
    False,
    Int(i64),
    Sym(Rc<str>),
    Str(Rc<str>),
    Array(Rc<Vec<Value>>),
    Hash(Rc<IndexMap<Value, Value>>),
    /// The toplevel `main` object, receiver of toplevel method definitions.
    Main,
    /// A user-defined method bound to the type it was defined on.
    Method(Rc<MethodHandle>),
}

/// An instruction sequence together with the type it was defined on.
#[derive(Debug)]
pub struct MethodHandle {
    pub owner: TypeTag,
    pub name: Rc<str>,
    pub iseq: Rc<InstructionSequence>,
}

/// The host class of a value, used to key the user-method table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum TypeTag {
    NilClass,
    TrueClass,
    FalseClass,
    Integer,
    String,
    Symbol,
    Array,
    Hash,
    /// `main` is an instance of Object as far as method lookup is concerned.
    #[strum(serialize = "Object")]
    Main,
    Method,
}

impl Value {
    /// Returns the host class of this value for method-table lookup.
    #[must_use]
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Self::Nil => TypeTag::NilClass,
            Self::True => TypeTag::TrueClass,
            Self::False => TypeTag::FalseClass,
            Self::Int(_) => TypeTag::Integer,
            Self::Str(_) => TypeTag::String,
            Self::Sym(_) => TypeTag::Symbol,
            Self::Array(_) => TypeTag::Array,
            Self::Hash(_) => TypeTag::Hash,
            Self::Main => TypeTag::Main,
            Self::Method(_) => TypeTag::Method,
        }
    }

    /// Host truthiness: only nil and false are falsy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Self::Nil | Self::False)
    }

    /// Renders the value the way the host's `inspect` does.
    #[must_use]
    pub fn inspect(&self) -> String {
        let mut out = String::new();
        self.inspect_fmt(&mut out).expect("formatting into a String cannot fail");
        out
    }

    /// `inspect` into an existing writer.
    pub fn inspect_fmt(&self, f: &mut impl Write) -> fmt::Result {
        match self {
            Self::Nil => f.write_str("nil"),
            Self::True => f.write_str("true"),
            Self::False => f.write_str("false"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Sym(name) => write!(f, ":{name}"),
            Self::Str(s) => string_inspect_fmt(s, f),
            Self::Array(items) => {
                f.write_char('[')?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.inspect_fmt(f)?;
                }
                f.write_char(']')
            }
            Self::Hash(map) => {
                f.write_char('{')?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    key.inspect_fmt(f)?;
                    f.write_str("=>")?;
                    value.inspect_fmt(f)?;
                }
                f.write_char('}')
            }
            Self::Main => f.write_str("main"),
            Self::Method(handle) => write!(f, "#<Method: {}#{}>", handle.owner, handle.name),
        }
    }
}

/// `to_s` rendering: strings print their contents, nil prints empty,
/// composites fall back to their `inspect` form.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => Ok(()),
            Self::Str(s) => f.write_str(s),
            Self::Sym(name) => f.write_str(name),
            Self::Main => f.write_str("main"),
            other => other.inspect_fmt(f),
        }
    }
}

/// Renders a string in double quotes with the common escapes.
fn string_inspect_fmt(s: &str, f: &mut impl Write) -> fmt::Result {
    f.write_char('"')?;
    for c in s.chars() {
        match c {
            '\\' => f.write_str("\\\\")?,
            '"' => f.write_str("\\\"")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            '\r' => f.write_str("\\r")?,
            _ => f.write_char(c)?,
        }
    }
    f.write_char('"')
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        if v { Self::True } else { Self::False }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil)
            | (Self::True, Self::True)
            | (Self::False, Self::False)
            | (Self::Main, Self::Main) => true,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Sym(a), Self::Sym(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            // IndexMap equality is order-insensitive, matching the host.
            (Self::Hash(a), Self::Hash(b)) => a == b,
            (Self::Method(a), Self::Method(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        discriminant(self).hash(state);
        match self {
            Self::Nil | Self::True | Self::False | Self::Main => {}
            Self::Int(n) => n.hash(state),
            Self::Sym(s) | Self::Str(s) => s.hash(state),
            Self::Array(items) => {
                items.len().hash(state);
                for item in items.iter() {
                    item.hash(state);
                }
            }
            Self::Hash(map) => {
                // Equal hashes may differ in insertion order, so combine
                // per-pair hashes order-independently.
                map.len().hash(state);
                let mut combined: u64 = 0;
                for (key, value) in map.iter() {
                    let mut hasher = ahash::AHasher::default();
                    key.hash(&mut hasher);
                    value.hash(&mut hasher);
                    combined = combined.wrapping_add(hasher.finish());
                }
                combined.hash(state);
            }
            Self::Method(handle) => (Rc::as_ptr(handle) as usize).hash(state),
        }
    }
}
