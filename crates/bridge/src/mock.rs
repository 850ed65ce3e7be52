//! In-memory guest runtime for tests
//!
//! [`MockVm`] implements [`GuestVm`] over plain Rust data: a slot stack, a
//! table heap with insertion-ordered raw iteration, full userdata with a
//! wrapper handle distinct from its payload (so reference deduplication is
//! observable), metatables, a registry pre-seeded with the "ud" and "mt"
//! side tables, globals, and named native functions callable through
//! [`GuestVm::pcall`] with the guest's fresh-stack calling convention.
//!
//! There is no string/number coercion. Where the real C API leaves behavior
//! undefined (raw table access on a non-table, popping an empty stack), the
//! mock panics with a message instead.

use crate::vm::{CallStatus, GuestVm, RawType, REGISTRY_INDEX};
use std::collections::HashMap;
use std::rc::Rc;

/// Native function installed into the mock globals
///
/// Receives the runtime with a fresh stack holding only the call arguments
/// and the argument count; returns how many results it left on the stack, or
/// an error message that becomes the protected call's error object.
pub type NativeFn = Rc<dyn Fn(&mut MockVm, usize) -> std::result::Result<usize, String>>;

#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Nil,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    Str(String),
    LightRef(u64),
    Table(usize),
    Userdata(usize),
    Function(String),
}

impl Slot {
    fn type_name(&self) -> &'static str {
        match self {
            Slot::Nil => "nil",
            Slot::Boolean(_) => "boolean",
            Slot::Integer(_) | Slot::Number(_) => "number",
            Slot::Str(_) => "string",
            Slot::LightRef(_) => "userdata",
            Slot::Table(_) => "table",
            Slot::Userdata(_) => "userdata",
            Slot::Function(_) => "function",
        }
    }
}

/// Integral number keys collapse to integer keys, as in a real guest table
fn normalize_key(key: Slot) -> Slot {
    if let Slot::Number(number) = key {
        if number.fract() == 0.0 && number.abs() < i64::MAX as f64 {
            return Slot::Integer(number as i64);
        }
        if number.is_nan() {
            panic!("table key may not be NaN");
        }
    }
    key
}

#[derive(Default)]
struct TableData {
    /// Raw iteration order is insertion order
    entries: Vec<(Slot, Slot)>,
    meta: Option<usize>,
}

struct UserdataData {
    payload: u64,
    meta: Option<usize>,
}

/// In-memory guest runtime
pub struct MockVm {
    stack: Vec<Slot>,
    tables: Vec<TableData>,
    userdata: Vec<UserdataData>,
    natives: HashMap<String, NativeFn>,
    registry: usize,
    globals: usize,
}

impl MockVm {
    pub fn new() -> Self {
        let mut vm = Self {
            stack: Vec::new(),
            tables: Vec::new(),
            userdata: Vec::new(),
            natives: HashMap::new(),
            registry: 0,
            globals: 0,
        };
        vm.registry = vm.alloc_table();
        vm.globals = vm.alloc_table();

        // the host environment seeds the reference and metatable side tables
        let ud = vm.alloc_table();
        let mt = vm.alloc_table();
        vm.set_table_entry(vm.registry, Slot::Str("ud".into()), Slot::Table(ud));
        vm.set_table_entry(vm.registry, Slot::Str("mt".into()), Slot::Table(mt));

        vm
    }

    /// Install a native function and expose it as a global
    pub fn register_function<F>(&mut self, name: &str, function: F)
    where
        F: Fn(&mut MockVm, usize) -> std::result::Result<usize, String> + 'static,
    {
        self.natives.insert(name.to_string(), Rc::new(function));
        let globals = self.globals;
        self.set_table_entry(
            globals,
            Slot::Str(name.to_string()),
            Slot::Function(name.to_string()),
        );
    }

    /// Wrapper handle of a full-userdata slot, for dedup inspection in tests
    pub fn userdata_handle(&self, index: i32) -> Option<usize> {
        match self.slot_opt(index)? {
            Slot::Userdata(handle) => Some(handle),
            _ => None,
        }
    }

    /// Metatable handle of a table or userdata slot
    pub fn metatable_of(&self, index: i32) -> Option<usize> {
        match self.slot_opt(index)? {
            Slot::Table(handle) => self.tables[handle].meta,
            Slot::Userdata(handle) => self.userdata[handle].meta,
            _ => None,
        }
    }

    fn alloc_table(&mut self) -> usize {
        self.tables.push(TableData::default());
        self.tables.len() - 1
    }

    fn set_table_entry(&mut self, handle: usize, key: Slot, value: Slot) {
        let key = normalize_key(key);
        if key == Slot::Nil {
            panic!("table key may not be nil");
        }

        let table = &mut self.tables[handle];
        match table.entries.iter().position(|(k, _)| *k == key) {
            Some(position) if value == Slot::Nil => {
                table.entries.remove(position);
            }
            Some(position) => table.entries[position].1 = value,
            None if value == Slot::Nil => {}
            None => table.entries.push((key, value)),
        }
    }

    fn table_entry(&self, handle: usize, key: Slot) -> Slot {
        let key = normalize_key(key);
        self.tables[handle]
            .entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.clone())
            .unwrap_or(Slot::Nil)
    }

    /// 0-based stack position for a valid relative or absolute index
    fn slot_position(&self, index: i32) -> Option<usize> {
        if index > 0 {
            let position = index as usize - 1;
            (position < self.stack.len()).then_some(position)
        } else if index < 0 && index > REGISTRY_INDEX {
            let position = self.stack.len() as i32 + index;
            (position >= 0).then_some(position as usize)
        } else {
            None
        }
    }

    fn slot_opt(&self, index: i32) -> Option<Slot> {
        if index == REGISTRY_INDEX {
            return Some(Slot::Table(self.registry));
        }
        self.slot_position(index).map(|i| self.stack[i].clone())
    }

    fn table_at(&self, index: i32) -> usize {
        match self.slot_opt(index) {
            Some(Slot::Table(handle)) => handle,
            other => panic!("expected table at index {index}, found {other:?}"),
        }
    }

    fn pop_slot(&mut self, context: &str) -> Slot {
        match self.stack.pop() {
            Some(slot) => slot,
            None => panic!("{context} on an empty stack"),
        }
    }

    fn fail_call(&mut self, outer: Vec<Slot>, message: String) -> CallStatus {
        self.stack = outer;
        self.stack.push(Slot::Str(message));
        CallStatus::RuntimeError
    }
}

impl Default for MockVm {
    fn default() -> Self {
        Self::new()
    }
}

impl GuestVm for MockVm {
    fn top(&self) -> i32 {
        self.stack.len() as i32
    }

    fn type_of(&self, index: i32) -> RawType {
        match self.slot_opt(index) {
            None => RawType::None,
            Some(Slot::Nil) => RawType::Nil,
            Some(Slot::Boolean(_)) => RawType::Boolean,
            Some(Slot::Integer(_)) | Some(Slot::Number(_)) => RawType::Number,
            Some(Slot::Str(_)) => RawType::String,
            Some(Slot::LightRef(_)) => RawType::LightUserdata,
            Some(Slot::Table(_)) => RawType::Table,
            Some(Slot::Userdata(_)) => RawType::Userdata,
            Some(Slot::Function(_)) => RawType::Function,
        }
    }

    fn to_boolean(&self, index: i32) -> bool {
        match self.slot_opt(index) {
            Some(Slot::Boolean(value)) => value,
            Some(Slot::Nil) | None => false,
            Some(_) => true,
        }
    }

    fn to_number(&self, index: i32) -> f64 {
        match self.slot_opt(index) {
            Some(Slot::Number(value)) => value,
            Some(Slot::Integer(value)) => value as f64,
            _ => 0.0,
        }
    }

    fn to_integer(&self, index: i32) -> i64 {
        match self.slot_opt(index) {
            Some(Slot::Integer(value)) => value,
            Some(Slot::Number(value)) => value as i64,
            _ => 0,
        }
    }

    fn to_text(&self, index: i32) -> Option<String> {
        match self.slot_opt(index) {
            Some(Slot::Str(value)) => Some(value),
            _ => None,
        }
    }

    fn to_ref(&self, index: i32) -> Option<u64> {
        match self.slot_opt(index) {
            Some(Slot::Userdata(handle)) => Some(self.userdata[handle].payload),
            Some(Slot::LightRef(id)) => Some(id),
            _ => None,
        }
    }

    fn push_nil(&mut self) {
        self.stack.push(Slot::Nil);
    }

    fn push_boolean(&mut self, value: bool) {
        self.stack.push(Slot::Boolean(value));
    }

    fn push_number(&mut self, value: f64) {
        self.stack.push(Slot::Number(value));
    }

    fn push_integer(&mut self, value: i64) {
        self.stack.push(Slot::Integer(value));
    }

    fn push_string(&mut self, value: &str) {
        self.stack.push(Slot::Str(value.to_string()));
    }

    fn push_light_ref(&mut self, id: u64) {
        self.stack.push(Slot::LightRef(id));
    }

    fn push_value(&mut self, index: i32) {
        match self.slot_opt(index) {
            Some(slot) => self.stack.push(slot),
            None => panic!("push_value of invalid index {index}"),
        }
    }

    fn new_table(&mut self, _narr: usize, _nrec: usize) {
        let handle = self.alloc_table();
        self.stack.push(Slot::Table(handle));
    }

    fn new_userdata(&mut self, payload: u64) {
        self.userdata.push(UserdataData {
            payload,
            meta: None,
        });
        self.stack.push(Slot::Userdata(self.userdata.len() - 1));
    }

    fn raw_get(&mut self, table_index: i32) {
        let handle = self.table_at(table_index);
        let key = self.pop_slot("raw_get");
        let value = self.table_entry(handle, key);
        self.stack.push(value);
    }

    fn raw_set(&mut self, table_index: i32) {
        let handle = self.table_at(table_index);
        let value = self.pop_slot("raw_set");
        let key = self.pop_slot("raw_set");
        self.set_table_entry(handle, key, value);
    }

    fn raw_set_index(&mut self, table_index: i32, position: i64) {
        let handle = self.table_at(table_index);
        let value = self.pop_slot("raw_set_index");
        self.set_table_entry(handle, Slot::Integer(position), value);
    }

    fn next_entry(&mut self, table_index: i32) -> bool {
        let handle = self.table_at(table_index);
        let key = self.pop_slot("next_entry");

        let entries = &self.tables[handle].entries;
        let next = match key {
            Slot::Nil => entries.first().cloned(),
            key => {
                let key = normalize_key(key);
                match entries.iter().position(|(k, _)| *k == key) {
                    Some(position) => entries.get(position + 1).cloned(),
                    None => panic!("next_entry with a key absent from the table"),
                }
            }
        };

        match next {
            Some((key, value)) => {
                self.stack.push(key);
                self.stack.push(value);
                true
            }
            None => false,
        }
    }

    fn set_metatable(&mut self, index: i32) {
        let target = match self.slot_opt(index) {
            Some(slot) => slot,
            None => panic!("set_metatable on invalid index {index}"),
        };
        let meta = match self.pop_slot("set_metatable") {
            Slot::Table(handle) => Some(handle),
            Slot::Nil => None,
            other => panic!("metatable must be a table or nil, found {other:?}"),
        };

        match target {
            Slot::Table(handle) => self.tables[handle].meta = meta,
            Slot::Userdata(handle) => self.userdata[handle].meta = meta,
            other => panic!("set_metatable on {other:?}"),
        }
    }

    fn remove(&mut self, index: i32) {
        match self.slot_position(index) {
            Some(position) => {
                self.stack.remove(position);
            }
            None => panic!("remove of invalid index {index}"),
        }
    }

    fn set_top(&mut self, top: i32) {
        if top < 0 {
            panic!("set_top below zero");
        }
        self.stack.resize(top as usize, Slot::Nil);
    }

    fn get_global(&mut self, name: &str) {
        let value = self.table_entry(self.globals, Slot::Str(name.to_string()));
        self.stack.push(value);
    }

    fn set_global(&mut self, name: &str) {
        let value = self.pop_slot("set_global");
        let globals = self.globals;
        self.set_table_entry(globals, Slot::Str(name.to_string()), value);
    }

    fn pcall(&mut self, nargs: usize, nresults: usize) -> CallStatus {
        let len = self.stack.len();
        assert!(
            len > nargs,
            "pcall without a function below the arguments"
        );
        let base = len - nargs - 1;

        // split off the callee's fresh stack: only its arguments
        let frame = self.stack.split_off(base + 1);
        let callee = self.pop_slot("pcall");
        let outer = std::mem::replace(&mut self.stack, frame);

        let name = match callee {
            Slot::Function(name) => name,
            Slot::Nil => return self.fail_call(outer, "attempt to call a nil value".to_string()),
            other => {
                let message = format!("attempt to call a {} value", other.type_name());
                return self.fail_call(outer, message);
            }
        };

        let native = match self.natives.get(&name) {
            Some(native) => Rc::clone(native),
            None => {
                let message = format!("attempt to call undefined function '{name}'");
                return self.fail_call(outer, message);
            }
        };

        match native(self, nargs) {
            Ok(produced) => {
                let keep = self.stack.len().saturating_sub(produced);
                let mut results = self.stack.split_off(keep);
                results.resize(nresults, Slot::Nil);

                self.stack = outer;
                self.stack.extend(results);
                CallStatus::Ok
            }
            Err(message) => self.fail_call(outer, message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_indexing_and_types() {
        let mut vm = MockVm::new();
        vm.push_integer(1);
        vm.push_string("two");
        vm.push_boolean(false);

        assert_eq!(vm.top(), 3);
        assert_eq!(vm.type_of(1), RawType::Number);
        assert_eq!(vm.type_of(-1), RawType::Boolean);
        assert_eq!(vm.type_of(2), RawType::String);
        assert_eq!(vm.type_of(4), RawType::None);
        assert_eq!(vm.abs_index(-2), 2);

        vm.pop(2);
        assert_eq!(vm.top(), 1);
    }

    #[test]
    fn table_raw_access_and_iteration() {
        let mut vm = MockVm::new();
        vm.new_table(0, 0);

        vm.push_string("k");
        vm.push_integer(5);
        vm.raw_set(1);

        vm.push_integer(7);
        vm.raw_set_index(1, 1);

        // read back table["k"]
        vm.push_string("k");
        vm.raw_get(1);
        assert_eq!(vm.to_integer(-1), 5);
        vm.pop(1);

        // raw-next traversal sees both entries in insertion order
        vm.push_nil();
        assert!(vm.next_entry(1));
        assert_eq!(vm.to_text(-2).as_deref(), Some("k"));
        vm.pop(1);
        assert!(vm.next_entry(1));
        assert_eq!(vm.to_integer(-1), 7);
        vm.pop(1);
        assert!(!vm.next_entry(1));
    }

    #[test]
    fn integral_number_keys_collapse_to_integer_keys() {
        let mut vm = MockVm::new();
        vm.new_table(0, 0);

        vm.push_number(1.0);
        vm.push_string("one");
        vm.raw_set(1);

        vm.push_integer(1);
        vm.raw_get(1);
        assert_eq!(vm.to_text(-1).as_deref(), Some("one"));
    }

    #[test]
    fn globals_round_trip() {
        let mut vm = MockVm::new();
        vm.push_integer(9);
        vm.set_global("nine");

        vm.get_global("nine");
        assert_eq!(vm.to_integer(-1), 9);

        vm.get_global("missing");
        assert_eq!(vm.type_of(-1), RawType::Nil);
    }

    #[test]
    fn pcall_runs_native_on_a_fresh_stack() {
        let mut vm = MockVm::new();
        vm.push_string("caller frame junk");

        vm.register_function("swap", |vm, nargs| {
            assert_eq!(nargs, 2);
            assert_eq!(vm.top(), 2);
            vm.push_value(2);
            vm.push_value(1);
            Ok(2)
        });

        vm.get_global("swap");
        vm.push_integer(1);
        vm.push_integer(2);
        assert_eq!(vm.pcall(2, 2), CallStatus::Ok);

        assert_eq!(vm.top(), 3);
        assert_eq!(vm.to_integer(2), 2);
        assert_eq!(vm.to_integer(3), 1);
        assert_eq!(vm.to_text(1).as_deref(), Some("caller frame junk"));
    }

    #[test]
    fn pcall_pads_missing_results_with_nil() {
        let mut vm = MockVm::new();
        vm.register_function("one", |vm, _| {
            vm.push_boolean(true);
            Ok(1)
        });

        vm.get_global("one");
        assert_eq!(vm.pcall(0, 3), CallStatus::Ok);
        assert_eq!(vm.top(), 3);
        assert_eq!(vm.type_of(2), RawType::Nil);
        assert_eq!(vm.type_of(3), RawType::Nil);
    }

    #[test]
    fn pcall_on_nil_reports_an_error_object() {
        let mut vm = MockVm::new();
        vm.get_global("does_not_exist");
        let status = vm.pcall(0, 1);
        assert_eq!(status, CallStatus::RuntimeError);
        assert!(vm.to_text(-1).unwrap().contains("nil value"));
    }

    #[test]
    fn native_error_becomes_the_error_object() {
        let mut vm = MockVm::new();
        vm.register_function("explode", |_, _| Err("boom".to_string()));

        vm.get_global("explode");
        assert_eq!(vm.pcall(0, 0), CallStatus::RuntimeError);
        assert_eq!(vm.to_text(-1).as_deref(), Some("boom"));
    }

    #[test]
    fn registry_is_seeded_with_side_tables() {
        let mut vm = MockVm::new();
        vm.push_string("ud");
        vm.raw_get(REGISTRY_INDEX);
        assert_eq!(vm.type_of(-1), RawType::Table);

        vm.push_string("mt");
        vm.raw_get(REGISTRY_INDEX);
        assert_eq!(vm.type_of(-1), RawType::Table);
    }
}
