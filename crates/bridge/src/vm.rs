//! Boundary surface of the embedded guest runtime
//!
//! The runtime itself is an external collaborator; the bridge only consumes
//! this stack-indexed API, modeled on the Lua 5.1 C surface. Implementations
//! wrap a live VM handle; [`crate::mock::MockVm`] provides an in-memory one
//! for tests.

use crate::value::ArgumentKind;
use std::fmt;

/// Registry pseudo-index, addressing the runtime's well-known side-table
/// storage instead of a stack slot
pub const REGISTRY_INDEX: i32 = -10_000;

/// Raw guest type code of a stack slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawType {
    /// No value at the index (beyond the stack top)
    None,
    Nil,
    Boolean,
    LightUserdata,
    Number,
    String,
    Table,
    Function,
    Userdata,
    Thread,
}

impl RawType {
    /// Numeric code as reported by the guest C API
    pub fn code(self) -> i32 {
        match self {
            RawType::None => -1,
            RawType::Nil => 0,
            RawType::Boolean => 1,
            RawType::LightUserdata => 2,
            RawType::Number => 3,
            RawType::String => 4,
            RawType::Table => 5,
            RawType::Function => 6,
            RawType::Userdata => 7,
            RawType::Thread => 8,
        }
    }

    /// Argument kind this raw type maps to, if any
    pub fn kind(self) -> Option<ArgumentKind> {
        match self {
            RawType::None => None,
            RawType::Nil => Some(ArgumentKind::Nil),
            RawType::Boolean => Some(ArgumentKind::Boolean),
            RawType::LightUserdata => Some(ArgumentKind::LightRef),
            RawType::Number => Some(ArgumentKind::Number),
            RawType::String => Some(ArgumentKind::String),
            RawType::Table => Some(ArgumentKind::Map),
            RawType::Function => Some(ArgumentKind::Function),
            RawType::Userdata => Some(ArgumentKind::Ref),
            RawType::Thread => Some(ArgumentKind::Thread),
        }
    }
}

/// Status of a protected guest call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Ok,
    /// Guest-side runtime error
    RuntimeError,
    /// Guest-side memory allocation error
    MemoryError,
    /// Error while running the error handler
    HandlerError,
}

impl CallStatus {
    /// Numeric status code as reported by the guest C API
    pub fn code(self) -> i32 {
        match self {
            CallStatus::Ok => 0,
            CallStatus::RuntimeError => 2,
            CallStatus::MemoryError => 4,
            CallStatus::HandlerError => 5,
        }
    }

    pub fn is_err(self) -> bool {
        !matches!(self, CallStatus::Ok)
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallStatus::Ok => "ok",
            CallStatus::RuntimeError => "runtime error",
            CallStatus::MemoryError => "memory error",
            CallStatus::HandlerError => "error handler error",
        };
        write!(f, "{name}")
    }
}

/// Stack-indexed guest runtime surface
///
/// Indices are 1-based from the stack bottom, negative from the top, with
/// [`REGISTRY_INDEX`] addressing the registry side table. All access to one
/// runtime handle must be serialized by the host; the bridge borrows the
/// implementation mutably, which enforces that within safe Rust.
pub trait GuestVm {
    /// Index of the top stack slot (0 when empty)
    fn top(&self) -> i32;

    /// Raw type of the slot, `RawType::None` beyond the top
    fn type_of(&self, index: i32) -> RawType;

    // Type-test predicates. Defaults are exact; implementations may override
    // with the runtime's coercing semantics.

    fn is_boolean(&self, index: i32) -> bool {
        self.type_of(index) == RawType::Boolean
    }

    fn is_number(&self, index: i32) -> bool {
        self.type_of(index) == RawType::Number
    }

    fn is_string(&self, index: i32) -> bool {
        self.type_of(index) == RawType::String
    }

    fn is_table(&self, index: i32) -> bool {
        self.type_of(index) == RawType::Table
    }

    fn is_nil(&self, index: i32) -> bool {
        self.type_of(index) == RawType::Nil
    }

    fn is_userdata(&self, index: i32) -> bool {
        matches!(
            self.type_of(index),
            RawType::Userdata | RawType::LightUserdata
        )
    }

    // Typed readers

    fn to_boolean(&self, index: i32) -> bool;
    fn to_number(&self, index: i32) -> f64;
    fn to_integer(&self, index: i32) -> i64;
    /// Text of a string slot; `None` when the slot is not a string
    fn to_text(&self, index: i32) -> Option<String>;
    /// Raw identity of a userdata or light-reference slot
    fn to_ref(&self, index: i32) -> Option<u64>;

    // Typed writers

    fn push_nil(&mut self);
    fn push_boolean(&mut self, value: bool);
    fn push_number(&mut self, value: f64);
    fn push_integer(&mut self, value: i64);
    fn push_string(&mut self, value: &str);
    fn push_light_ref(&mut self, id: u64);
    /// Push a copy of the slot at `index`
    fn push_value(&mut self, index: i32);

    // Table primitives

    /// Push a fresh table; `narr`/`nrec` are size hints
    fn new_table(&mut self, narr: usize, nrec: usize);
    /// Push a fresh full-userdata wrapper boxing a raw identity
    fn new_userdata(&mut self, payload: u64);
    /// Pop a key, push `table[key]` (raw access)
    fn raw_get(&mut self, table_index: i32);
    /// Pop a key and a value, set `table[key] = value` (raw access)
    fn raw_set(&mut self, table_index: i32);
    /// Pop a value, set `table[position] = value` (raw access)
    fn raw_set_index(&mut self, table_index: i32, position: i64);
    /// Pop a key; push the next key/value pair of the table, or push nothing
    /// and return false when the traversal is done
    fn next_entry(&mut self, table_index: i32) -> bool;
    /// Pop a table (or nil) and set it as the metatable of the slot at `index`
    fn set_metatable(&mut self, index: i32);

    // Stack editing

    fn remove(&mut self, index: i32);
    fn set_top(&mut self, top: i32);

    fn pop(&mut self, count: usize) {
        self.set_top(self.top() - count as i32);
    }

    // Globals

    /// Push the value of a global variable
    fn get_global(&mut self, name: &str);
    /// Pop a value and store it as a global variable
    fn set_global(&mut self, name: &str);

    /// Protected call: consumes the function slot and `nargs` arguments,
    /// leaves exactly `nresults` results (or one error object on failure)
    fn pcall(&mut self, nargs: usize, nresults: usize) -> CallStatus;

    /// Convert a top-relative index into an absolute one
    ///
    /// Required during recursive table traversal, where pushes shift every
    /// relative index.
    fn abs_index(&self, index: i32) -> i32 {
        if index > 0 || index <= REGISTRY_INDEX {
            index
        } else {
            self.top() + index + 1
        }
    }
}
