//! Registration glue for guest-callable entry points
//!
//! The host collaborator that loads plugins hands each registered name a
//! runtime handle. [`ModuleApi`] is the explicit registration list for those
//! entry points: no process-wide state, handlers are installed at startup.
//!
//! Every failure an entry point produces is converted into a guest-visible
//! result (`false` plus a message string) before control returns across the
//! boundary; an unwind through the guest's calling convention would be
//! undefined behavior.

use crate::bridge::StackBridge;
use crate::value::Argument;
use crate::vm::{CallStatus, GuestVm};
use crate::{Error, Result};
use std::collections::HashMap;
use tracing::{debug, warn};

/// A guest-callable entry point
///
/// Captures its arguments from the bridge, performs host logic, pushes its
/// results, and returns how many values it pushed.
pub type EntryPoint<V> =
    Box<dyn Fn(&mut StackBridge<'_, V>) -> Result<usize> + Send + Sync>;

/// Explicit registration list of guest-callable entry points
pub struct ModuleApi<V: GuestVm + ?Sized> {
    entries: HashMap<String, EntryPoint<V>>,
}

impl<V: GuestVm + ?Sized> ModuleApi<V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register an entry point under a guest-visible name
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&mut StackBridge<'_, V>) -> Result<usize> + Send + Sync + 'static,
    {
        self.entries.insert(name.into(), Box::new(handler));
    }

    /// Names of all registered entry points
    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Invoke a registered entry point over the given runtime handle
    ///
    /// Returns the number of values left on the guest stack as results. Any
    /// failure is logged and converted into `false` plus a message string; a
    /// guest memory error is logged distinctly so the host can stop issuing
    /// further guest calls for the rest of the tick.
    pub fn invoke(&self, name: &str, vm: &mut V) -> i32 {
        let mut bridge = StackBridge::new(vm);

        let Some(handler) = self.entries.get(name) else {
            warn!(entry = name, "unknown entry point");
            return report_failure(&mut bridge, &format!("no such function: {name}"));
        };

        debug!(entry = name, "dispatching entry point");
        match handler(&mut bridge) {
            Ok(pushed) => pushed as i32,
            Err(Error::CallFailed {
                status: CallStatus::MemoryError,
                message,
            }) => {
                warn!(entry = name, %message, "guest memory error during entry point");
                report_failure(&mut bridge, &message)
            }
            Err(err) => {
                warn!(entry = name, error = %err, "entry point failed");
                report_failure(&mut bridge, &err.to_string())
            }
        }
    }
}

impl<V: GuestVm + ?Sized> Default for ModuleApi<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Replace whatever the failed handler left on the stack with the
/// guest-visible sentinel pair: `false` and the failure message
fn report_failure<V: GuestVm + ?Sized>(bridge: &mut StackBridge<'_, V>, message: &str) -> i32 {
    bridge.clear_stack();
    if bridge.push_one(&Argument::Bool(false)).is_err() {
        return 0;
    }
    if bridge.push_one(&Argument::from(message)).is_err() {
        return 1;
    }
    2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockVm;
    use crate::value::ArgumentKind;
    use crate::vm::RawType;

    #[test]
    fn entry_point_pushes_results() {
        let mut api: ModuleApi<MockVm> = ModuleApi::new();
        api.register("greet", |bridge| {
            bridge.push_one(&Argument::from("hello"))?;
            Ok(1)
        });

        let mut vm = MockVm::new();
        let pushed = api.invoke("greet", &mut vm);
        assert_eq!(pushed, 1);
        assert_eq!(vm.to_text(1).as_deref(), Some("hello"));
    }

    #[test]
    fn failing_entry_point_returns_sentinel_pair() {
        let mut api: ModuleApi<MockVm> = ModuleApi::new();
        api.register("strict", |bridge| {
            // requires one number; the stack is empty
            bridge.capture_typed(&[ArgumentKind::Number])?;
            Ok(0)
        });

        let mut vm = MockVm::new();
        let pushed = api.invoke("strict", &mut vm);
        assert_eq!(pushed, 2);
        assert_eq!(vm.type_of(1), RawType::Boolean);
        assert!(!vm.to_boolean(1));
        assert!(!vm.to_text(2).unwrap().is_empty());
    }

    #[test]
    fn unknown_entry_point_reports_failure() {
        let api: ModuleApi<MockVm> = ModuleApi::new();
        let mut vm = MockVm::new();
        let pushed = api.invoke("nope", &mut vm);
        assert_eq!(pushed, 2);
        assert!(vm.to_text(2).unwrap().contains("nope"));
    }

    #[test]
    fn entry_names_lists_registrations() {
        let mut api: ModuleApi<MockVm> = ModuleApi::new();
        api.register("a", |_| Ok(0));
        api.register("b", |_| Ok(0));

        let mut names: Vec<_> = api.entry_names().collect();
        names.sort_unstable();
        assert_eq!(names, vec!["a", "b"]);
    }
}
