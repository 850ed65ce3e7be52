//! Stack marshalling between host [`Argument`]s and the guest runtime
//!
//! [`StackBridge`] is the only component that touches the guest call stack.
//! Construct one per guest invocation: the full-stack capture is cached for
//! the lifetime of the instance and must not outlive the invocation whose
//! stack it mirrors.

use crate::object::ObjectRef;
use crate::value::{Argument, ArgumentKind};
use crate::vm::{GuestVm, RawType, REGISTRY_INDEX};
use crate::{Error, Result};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Marshalling engine over one guest runtime handle
pub struct StackBridge<'vm, V: GuestVm + ?Sized> {
    vm: &'vm mut V,
    captured: Option<Vec<Argument>>,
}

impl<'vm, V: GuestVm + ?Sized> StackBridge<'vm, V> {
    /// Create a bridge for one invocation over the given runtime handle
    pub fn new(vm: &'vm mut V) -> Self {
        Self { vm, captured: None }
    }

    /// Access the underlying runtime handle
    pub fn vm(&mut self) -> &mut V {
        &mut *self.vm
    }

    /// Parse every stack slot from index 1 upward, auto-detecting types
    ///
    /// The result is cached: repeat calls within one invocation return the
    /// first capture even if the stack changed in between.
    pub fn capture_all(&mut self) -> Result<&[Argument]> {
        if self.captured.is_none() {
            let mut values = Vec::new();
            let mut index = 1;
            while self.vm.type_of(index) != RawType::None {
                values.push(self.parse_one(index)?);
                index += 1;
            }
            trace!(count = values.len(), "captured full guest stack");
            self.captured = Some(values);
        }

        Ok(self.captured.as_deref().unwrap_or(&[]))
    }

    /// Parse exactly `kinds.len()` slots, enforcing each expected kind
    ///
    /// The first mismatch fails with the 1-based slot index attached; a stack
    /// shorter than the expected list fails with [`Error::OutOfRange`].
    pub fn capture_typed(&mut self, kinds: &[ArgumentKind]) -> Result<Vec<Argument>> {
        let mut values = Vec::with_capacity(kinds.len());

        for (position, &kind) in kinds.iter().enumerate() {
            let index = position as i32 + 1;
            if self.vm.type_of(index) == RawType::None {
                return Err(Error::OutOfRange(format!(
                    "expected {} arguments, got {}",
                    kinds.len(),
                    position
                )));
            }

            match self.parse_one_as(index, kind, false) {
                Ok(value) => values.push(value),
                Err(Error::UnexpectedType { expected, actual, .. }) => {
                    return Err(Error::UnexpectedType {
                        expected,
                        actual,
                        index: Some(position + 1),
                    });
                }
                Err(other) => return Err(other),
            }
        }

        Ok(values)
    }

    /// Parse one slot, auto-detecting its type
    ///
    /// Tables always parse as `Map`; a list cannot be told apart from any
    /// other table by shape alone.
    pub fn parse_one(&mut self, index: i32) -> Result<Argument> {
        if self.vm.is_boolean(index) {
            self.parse_one_as(index, ArgumentKind::Boolean, true)
        } else if self.vm.is_number(index) {
            self.parse_one_as(index, ArgumentKind::Number, true)
        } else if self.vm.is_string(index) {
            self.parse_one_as(index, ArgumentKind::String, true)
        } else if self.vm.is_userdata(index) {
            self.parse_one_as(index, ArgumentKind::Ref, true)
        } else if self.vm.is_nil(index) {
            self.parse_one_as(index, ArgumentKind::Nil, true)
        } else if self.vm.is_table(index) {
            self.parse_one_as(index, ArgumentKind::Map, true)
        } else {
            Err(Error::BadType {
                type_code: self.vm.type_of(index).code(),
            })
        }
    }

    /// Parse one slot as a known kind
    ///
    /// `force` skips the guest-type re-validation when the caller has already
    /// established it (auto-detection); it never changes the conversion.
    pub fn parse_one_as(&mut self, index: i32, kind: ArgumentKind, force: bool) -> Result<Argument> {
        if !force {
            let matches = match kind {
                ArgumentKind::Nil => self.vm.is_nil(index),
                ArgumentKind::Boolean => self.vm.is_boolean(index),
                ArgumentKind::Number | ArgumentKind::Integer => self.vm.is_number(index),
                ArgumentKind::String => self.vm.is_string(index),
                ArgumentKind::LightRef => self.vm.type_of(index) == RawType::LightUserdata,
                ArgumentKind::Ref | ArgumentKind::Object => self.vm.is_userdata(index),
                ArgumentKind::Map => self.vm.is_table(index),
                // no checker exists for the remaining kinds
                _ => {
                    return Err(Error::BadType {
                        type_code: self.vm.type_of(index).code(),
                    })
                }
            };
            if !matches {
                return Err(self.unexpected_at(kind, index));
            }
        }

        match kind {
            ArgumentKind::Nil => Ok(Argument::Nil),
            ArgumentKind::Boolean => Ok(Argument::Bool(self.vm.to_boolean(index))),
            ArgumentKind::Number => Ok(Argument::Number(self.vm.to_number(index))),
            ArgumentKind::Integer => Ok(Argument::Integer(self.vm.to_integer(index))),
            ArgumentKind::String => {
                let text = self.vm.to_text(index);
                text.map(Argument::String)
                    .ok_or_else(|| self.unexpected_at(ArgumentKind::String, index))
            }
            ArgumentKind::LightRef => {
                let id = self.vm.to_ref(index);
                id.map(Argument::LightRef)
                    .ok_or_else(|| self.unexpected_at(ArgumentKind::LightRef, index))
            }
            ArgumentKind::Ref => {
                let id = self.vm.to_ref(index);
                id.map(Argument::Ref)
                    .ok_or_else(|| self.unexpected_at(ArgumentKind::Ref, index))
            }
            ArgumentKind::Object => {
                let id = self.vm.to_ref(index);
                let mut value = id
                    .map(Argument::Ref)
                    .ok_or_else(|| self.unexpected_at(ArgumentKind::Object, index))?;
                value.upgrade_to_object(None)?;
                Ok(value)
            }
            ArgumentKind::Map => self.parse_table(index),
            _ => Err(Error::BadType {
                type_code: self.vm.type_of(index).code(),
            }),
        }
    }

    /// Recursive raw traversal of a guest table
    ///
    /// Works on absolute indices only: nested iteration pushes shift the
    /// stack, so key and value are addressed as offsets from the current top.
    fn parse_table(&mut self, index: i32) -> Result<Argument> {
        let table_index = self.vm.abs_index(index);
        let mut entries = HashMap::new();

        self.vm.push_nil();
        while self.vm.next_entry(table_index) {
            let top = self.vm.top();
            let key = self.parse_one(top - 1)?;
            let value = self.parse_one(top)?;
            entries.insert(key, value);
            // drop the value, keep the key for the next iteration step
            self.vm.pop(1);
        }

        Ok(Argument::Map(entries))
    }

    /// Push one value onto the guest stack
    pub fn push_one(&mut self, value: &Argument) -> Result<()> {
        match value {
            Argument::Nil => self.vm.push_nil(),
            Argument::Bool(value) => self.vm.push_boolean(*value),
            Argument::Number(value) => self.vm.push_number(*value),
            Argument::Integer(value) => self.vm.push_integer(*value),
            Argument::String(value) => self.vm.push_string(value),
            Argument::LightRef(id) | Argument::Ref(id) => self.vm.push_light_ref(*id),
            Argument::Object(object) => self.push_object(object),
            Argument::List(items) => self.push_list(items)?,
            Argument::Map(map) => self.push_map(map)?,
        }
        Ok(())
    }

    /// Push a sequence of values in order
    ///
    /// The first failure aborts the remainder; partial stack state is the
    /// caller's to clear.
    pub fn push_many(&mut self, values: &[Argument]) -> Result<usize> {
        let mut pushed = 0;
        for value in values {
            self.push_one(value)?;
            pushed += 1;
        }
        Ok(pushed)
    }

    fn push_list(&mut self, items: &[Argument]) -> Result<()> {
        self.vm.new_table(items.len(), 0);
        let table_index = self.vm.abs_index(-1);
        for (position, item) in items.iter().enumerate() {
            self.push_one(item)?;
            self.vm.raw_set_index(table_index, position as i64 + 1);
        }
        Ok(())
    }

    fn push_map(&mut self, map: &HashMap<Argument, Argument>) -> Result<()> {
        self.vm.new_table(0, map.len());
        let table_index = self.vm.abs_index(-1);
        for (key, value) in map {
            self.push_one(key)?;
            self.push_one(value)?;
            self.vm.raw_set(table_index);
        }
        Ok(())
    }

    /// Push an object through the reference-identity cache
    ///
    /// The registry "ud" side table maps raw identity to the guest-visible
    /// wrapper, so pushing the same identity twice yields the same handle.
    /// When a class tag is present, the metatable registered under it in the
    /// registry "mt" side table is assigned to the wrapper.
    fn push_object(&mut self, object: &ObjectRef) {
        let id = object.id().0;

        self.vm.push_string("ud");
        self.vm.raw_get(REGISTRY_INDEX);

        self.vm.push_light_ref(id);
        self.vm.raw_get(-2);

        if self.vm.is_nil(-1) {
            // no wrapper yet: create one and cache it under the identity
            self.vm.pop(1);
            self.vm.new_userdata(id);
            self.vm.push_light_ref(id);
            self.vm.push_value(-2);
            self.vm.raw_set(-4);
        }

        // the wrapper stays; the side table goes
        self.vm.remove(-2);

        if let Some(class) = object.class() {
            self.vm.push_string("mt");
            self.vm.raw_get(REGISTRY_INDEX);
            self.vm.push_string(class);
            self.vm.raw_get(-2);
            self.vm.remove(-2);
            self.vm.set_metatable(-2);
        }
    }

    /// Call a guest global function with positional arguments
    ///
    /// Runs a protected call and parses exactly `returns` results. A guest
    /// runtime or memory error becomes [`Error::CallFailed`] carrying the
    /// guest's error message (best effort: an unreadable error object yields
    /// a substitute message, never a second failure).
    pub fn call(&mut self, name: &str, args: &[Argument], returns: usize) -> Result<Vec<Argument>> {
        debug!(function = name, args = args.len(), returns, "guest call");

        self.vm.get_global(name);
        self.push_many(args)?;

        let status = self.vm.pcall(args.len(), returns);
        if status.is_err() {
            let message = self.error_message();
            debug!(function = name, %status, %message, "guest call failed");
            return Err(Error::CallFailed { status, message });
        }

        let top = self.vm.top();
        let mut results = Vec::with_capacity(returns);
        for position in 0..returns {
            let index = top - returns as i32 + position as i32 + 1;
            results.push(self.parse_one(index)?);
        }
        Ok(results)
    }

    /// Discard all guest stack slots
    pub fn clear_stack(&mut self) {
        self.vm.set_top(0);
        trace!("cleared guest stack");
    }

    fn error_message(&mut self) -> String {
        let top = self.vm.top();
        match self.parse_one_as(top, ArgumentKind::String, false) {
            Ok(Argument::String(message)) => message,
            Ok(other) => format!("cannot get error message: unexpected {} value", other.kind()),
            Err(err) => format!("cannot get error message: {err}"),
        }
    }

    fn unexpected_at(&self, expected: ArgumentKind, index: i32) -> Error {
        Error::UnexpectedType {
            expected,
            actual: self
                .vm
                .type_of(index)
                .kind()
                .unwrap_or(ArgumentKind::Nil),
            index: None,
        }
    }
}
