//! Dynamic value type covering everything the guest runtime can produce
//!
//! [`Argument`] is the host-side tagged union: one variant per guest value
//! kind, with value-equality and hashing defined so that arguments can key a
//! guest table. Reference variants carry a foreign identity only; the host
//! never owns or frees what they point at.

use crate::collection;
use crate::object::{ObjectId, ObjectRef};
use crate::{Error, Result};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A dynamic guest value
#[derive(Debug, Clone, Default)]
pub enum Argument {
    /// Nil/absent value
    #[default]
    Nil,
    /// Boolean value
    Bool(bool),
    /// Floating point number
    Number(f64),
    /// Integer number (never auto-detected; only produced by typed capture)
    Integer(i64),
    /// Owned text
    String(String),
    /// Light reference: raw identity, nothing owned on either side
    LightRef(u64),
    /// Full guest reference: guest-owned, the host never frees it
    Ref(u64),
    /// Resolved guest object (identity plus optional class tag)
    Object(ObjectRef),
    /// Ordered sequence, pushed as a 1-based table
    List(Vec<Argument>),
    /// Associative table; keys unique by value-equality
    Map(HashMap<Argument, Argument>),
}

/// Kind discriminant for [`Argument`]
///
/// Used for expected-type lists and error reporting. `Function` and `Thread`
/// never back a live `Argument`; they only appear as the reported kind of a
/// guest slot that has no conversion rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgumentKind {
    Nil,
    Boolean,
    Number,
    Integer,
    String,
    LightRef,
    Ref,
    Object,
    List,
    Map,
    Function,
    Thread,
}

impl fmt::Display for ArgumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArgumentKind::Nil => "Nil",
            ArgumentKind::Boolean => "Boolean",
            ArgumentKind::Number => "Number",
            ArgumentKind::Integer => "Integer",
            ArgumentKind::String => "String",
            ArgumentKind::LightRef => "Light userdata",
            ArgumentKind::Ref => "Userdata",
            ArgumentKind::Object => "Object",
            ArgumentKind::List => "Table list",
            ArgumentKind::Map => "Table",
            ArgumentKind::Function => "Function",
            ArgumentKind::Thread => "Thread",
        };
        write!(f, "{name}")
    }
}

impl Argument {
    /// Build a light reference from a raw identity
    pub fn light_ref(id: u64) -> Self {
        Argument::LightRef(id)
    }

    /// Build a full guest reference from a raw identity
    pub fn guest_ref(id: u64) -> Self {
        Argument::Ref(id)
    }

    /// Kind of the active variant
    pub fn kind(&self) -> ArgumentKind {
        match self {
            Argument::Nil => ArgumentKind::Nil,
            Argument::Bool(_) => ArgumentKind::Boolean,
            Argument::Number(_) => ArgumentKind::Number,
            Argument::Integer(_) => ArgumentKind::Integer,
            Argument::String(_) => ArgumentKind::String,
            Argument::LightRef(_) => ArgumentKind::LightRef,
            Argument::Ref(_) => ArgumentKind::Ref,
            Argument::Object(_) => ArgumentKind::Object,
            Argument::List(_) => ArgumentKind::List,
            Argument::Map(_) => ArgumentKind::Map,
        }
    }

    /// Check if the value is nil
    pub fn is_nil(&self) -> bool {
        matches!(self, Argument::Nil)
    }

    /// Try to get as bool
    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Argument::Bool(value) => Ok(*value),
            other => Err(other.unexpected(ArgumentKind::Boolean)),
        }
    }

    /// Try to get as f64
    pub fn as_number(&self) -> Result<f64> {
        match self {
            Argument::Number(value) => Ok(*value),
            other => Err(other.unexpected(ArgumentKind::Number)),
        }
    }

    /// Try to get as i64
    pub fn as_integer(&self) -> Result<i64> {
        match self {
            Argument::Integer(value) => Ok(*value),
            other => Err(other.unexpected(ArgumentKind::Integer)),
        }
    }

    /// Try to get as string
    pub fn as_string(&self) -> Result<&str> {
        match self {
            Argument::String(value) => Ok(value.as_str()),
            other => Err(other.unexpected(ArgumentKind::String)),
        }
    }

    /// Try to get as a resolved object
    pub fn as_object(&self) -> Result<&ObjectRef> {
        match self {
            Argument::Object(object) => Ok(object),
            other => Err(other.unexpected(ArgumentKind::Object)),
        }
    }

    /// Try to get the raw identity of a reference variant
    pub fn as_ref_id(&self) -> Result<u64> {
        match self {
            Argument::LightRef(id) | Argument::Ref(id) => Ok(*id),
            other => Err(other.unexpected(ArgumentKind::Ref)),
        }
    }

    /// Convert a container variant into an ordered list
    ///
    /// Succeeds on `List` directly and on `Map` when the key set is exactly
    /// the 1..=N integer range.
    pub fn to_list(&self) -> Result<Vec<Argument>> {
        match self {
            Argument::List(items) => Ok(items.clone()),
            Argument::Map(map) => collection::list_from_map(map),
            other => Err(other.unexpected(ArgumentKind::List)),
        }
    }

    /// Convert a container variant into a map
    ///
    /// List element at position `i` (0-based) becomes the entry keyed by
    /// `Integer(i + 1)`. Never fails for containers.
    pub fn to_map(&self) -> Result<HashMap<Argument, Argument>> {
        match self {
            Argument::List(items) => Ok(collection::map_from_list(items.clone())),
            Argument::Map(map) => Ok(map.clone()),
            other => Err(other.unexpected(ArgumentKind::Map)),
        }
    }

    /// Upgrade a reference variant into a resolved object, in place
    ///
    /// Idempotent on `Object` (the existing class tag is kept). The upgrade
    /// is irreversible for the lifetime of the value.
    pub fn upgrade_to_object(&mut self, class: Option<&str>) -> Result<&ObjectRef> {
        if let Argument::LightRef(id) | Argument::Ref(id) = *self {
            let id = ObjectId(id);
            *self = Argument::Object(match class {
                Some(class) => ObjectRef::with_class(id, class),
                None => ObjectRef::new(id),
            });
        }

        match self {
            Argument::Object(object) => Ok(object),
            other => Err(other.unexpected(ArgumentKind::Object)),
        }
    }

    /// Take the value out, leaving `Nil` behind
    pub fn take(&mut self) -> Argument {
        std::mem::take(self)
    }

    fn unexpected(&self, expected: ArgumentKind) -> Error {
        Error::UnexpectedType {
            expected,
            actual: self.kind(),
            index: None,
        }
    }
}

/// Canonical bit pattern for number equality and hashing
///
/// Collapses every NaN to one pattern and `-0.0` to `0.0` so that the
/// hash/equality consistency law holds for map keys.
fn canonical_bits(value: f64) -> u64 {
    if value.is_nan() {
        f64::NAN.to_bits()
    } else if value == 0.0 {
        0
    } else {
        value.to_bits()
    }
}

impl PartialEq for Argument {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Argument::Nil, Argument::Nil) => true,
            (Argument::Bool(a), Argument::Bool(b)) => a == b,
            (Argument::Number(a), Argument::Number(b)) => canonical_bits(*a) == canonical_bits(*b),
            (Argument::Integer(a), Argument::Integer(b)) => a == b,
            (Argument::String(a), Argument::String(b)) => a == b,
            (Argument::LightRef(a), Argument::LightRef(b)) => a == b,
            (Argument::Ref(a), Argument::Ref(b)) => a == b,
            (Argument::Object(a), Argument::Object(b)) => a == b,
            (Argument::List(a), Argument::List(b)) => a == b,
            (Argument::Map(a), Argument::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Argument {}

impl Hash for Argument {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Argument::Nil => {}
            Argument::Bool(value) => value.hash(state),
            Argument::Number(value) => canonical_bits(*value).hash(state),
            Argument::Integer(value) => value.hash(state),
            Argument::String(value) => value.hash(state),
            Argument::LightRef(id) | Argument::Ref(id) => id.hash(state),
            Argument::Object(object) => object.hash(state),
            Argument::List(items) => items.hash(state),
            Argument::Map(map) => {
                // Entry order is arbitrary, so fold entry hashes with XOR
                map.len().hash(state);
                let mut combined = 0u64;
                for (key, value) in map {
                    let mut entry = DefaultHasher::new();
                    key.hash(&mut entry);
                    value.hash(&mut entry);
                    combined ^= entry.finish();
                }
                combined.hash(state);
            }
        }
    }
}

// Conversion from common types

impl From<bool> for Argument {
    fn from(value: bool) -> Self {
        Argument::Bool(value)
    }
}

impl From<f64> for Argument {
    fn from(value: f64) -> Self {
        Argument::Number(value)
    }
}

impl From<i64> for Argument {
    fn from(value: i64) -> Self {
        Argument::Integer(value)
    }
}

impl From<i32> for Argument {
    fn from(value: i32) -> Self {
        Argument::Integer(value as i64)
    }
}

impl From<&str> for Argument {
    fn from(value: &str) -> Self {
        Argument::String(value.to_string())
    }
}

impl From<String> for Argument {
    fn from(value: String) -> Self {
        Argument::String(value)
    }
}

impl From<ObjectRef> for Argument {
    fn from(value: ObjectRef) -> Self {
        Argument::Object(value)
    }
}

impl<T: Into<Argument>> From<Vec<T>> for Argument {
    fn from(value: Vec<T>) -> Self {
        Argument::List(value.into_iter().map(Into::into).collect())
    }
}

impl From<HashMap<Argument, Argument>> for Argument {
    fn from(value: HashMap<Argument, Argument>) -> Self {
        Argument::Map(value)
    }
}
