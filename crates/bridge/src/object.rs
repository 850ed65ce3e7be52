//! Opaque references to guest-side objects
//!
//! The host never resolves these: an [`ObjectRef`] is just a numeric identity
//! plus an optional class tag used for metatable assignment on push.

use std::fmt;
use std::hash::{Hash, Hasher};

/// Raw identity of a guest-side object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A resolved guest reference: identity plus optional class tag
///
/// Immutable after construction. Equality and hashing use the identity only;
/// the class tag is advisory.
#[derive(Debug, Clone)]
pub struct ObjectRef {
    id: ObjectId,
    class: Option<String>,
}

impl ObjectRef {
    /// Create a reference without a class tag
    pub fn new(id: ObjectId) -> Self {
        Self { id, class: None }
    }

    /// Create a reference with a class tag
    pub fn with_class(id: ObjectId, class: impl Into<String>) -> Self {
        Self {
            id,
            class: Some(class.into()),
        }
    }

    /// Underlying guest identity
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Class tag, if one was supplied
    pub fn class(&self) -> Option<&str> {
        self.class.as_deref()
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ObjectRef {}

impl Hash for ObjectRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
