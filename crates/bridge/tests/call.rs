//! Guest function invocation through the protected-call protocol

use lua_bridge::mock::MockVm;
use lua_bridge::{
    Argument, ArgumentKind, CallStatus, Error, GuestVm, ModuleApi, StackBridge,
};
use std::collections::HashMap;

#[test]
fn call_passes_arguments_and_captures_returns() {
    let mut vm = MockVm::new();
    vm.register_function("double", |vm, _nargs| {
        let mut bridge = StackBridge::new(vm);
        let args = bridge
            .capture_typed(&[ArgumentKind::Number])
            .map_err(|err| err.to_string())?;
        let doubled = args[0].as_number().map_err(|err| err.to_string())? * 2.0;
        bridge
            .push_one(&Argument::Number(doubled))
            .map_err(|err| err.to_string())?;
        Ok(1)
    });

    let mut bridge = StackBridge::new(&mut vm);
    let results = bridge
        .call("double", &[Argument::Number(21.0)], 1)
        .unwrap();
    assert_eq!(results, vec![Argument::Number(42.0)]);
}

#[test]
fn call_returns_multiple_values() {
    let mut vm = MockVm::new();
    vm.register_function("divmod", |vm, _| {
        let mut bridge = StackBridge::new(vm);
        let args = bridge
            .capture_typed(&[ArgumentKind::Integer, ArgumentKind::Integer])
            .map_err(|err| err.to_string())?;
        let a = args[0].as_integer().map_err(|err| err.to_string())?;
        let b = args[1].as_integer().map_err(|err| err.to_string())?;
        bridge
            .push_many(&[Argument::Integer(a / b), Argument::Integer(a % b)])
            .map_err(|err| err.to_string())?;
        Ok(2)
    });

    let mut bridge = StackBridge::new(&mut vm);
    let results = bridge
        .call(
            "divmod",
            &[Argument::Integer(17), Argument::Integer(5)],
            2,
        )
        .unwrap();
    // return slots are auto-detected, so integers come back as numbers
    assert_eq!(results, vec![Argument::Number(3.0), Argument::Number(2.0)]);
}

#[test]
fn short_returns_are_padded_with_nil() {
    let mut vm = MockVm::new();
    vm.register_function("just_one", |vm, _| {
        vm.push_boolean(true);
        Ok(1)
    });

    let mut bridge = StackBridge::new(&mut vm);
    let results = bridge.call("just_one", &[], 2).unwrap();
    assert_eq!(results, vec![Argument::Bool(true), Argument::Nil]);
}

#[test]
fn missing_function_fails_with_call_error() {
    let mut vm = MockVm::new();
    let mut bridge = StackBridge::new(&mut vm);

    let err = bridge.call("missing_function", &[], 1).unwrap_err();
    match err {
        Error::CallFailed { status, message } => {
            assert_eq!(status, CallStatus::RuntimeError);
            assert!(!message.is_empty());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn guest_error_message_is_propagated() {
    let mut vm = MockVm::new();
    vm.register_function("explode", |_, _| Err("boom".to_string()));

    let mut bridge = StackBridge::new(&mut vm);
    let err = bridge.call("explode", &[], 0).unwrap_err();
    match err {
        Error::CallFailed { status, message } => {
            assert_eq!(status, CallStatus::RuntimeError);
            assert_eq!(message, "boom");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn table_arguments_arrive_intact() {
    let mut vm = MockVm::new();
    vm.register_function("table_size", |vm, _| {
        let mut bridge = StackBridge::new(vm);
        let args = bridge
            .capture_typed(&[ArgumentKind::Map])
            .map_err(|err| err.to_string())?;
        let size = args[0].to_map().map_err(|err| err.to_string())?.len();
        bridge
            .push_one(&Argument::Integer(size as i64))
            .map_err(|err| err.to_string())?;
        Ok(1)
    });

    let mut table = HashMap::new();
    table.insert(Argument::from("a"), Argument::Number(1.0));
    table.insert(Argument::from("b"), Argument::Bool(false));
    table.insert(Argument::Integer(1), Argument::from("positional"));

    let mut bridge = StackBridge::new(&mut vm);
    let results = bridge
        .call("table_size", &[Argument::Map(table)], 1)
        .unwrap();
    assert_eq!(results[0], Argument::Number(3.0));
}

#[test]
fn entry_point_drives_a_full_invocation() {
    // a host entry point that answers a guest query by calling back into a
    // guest function and echoing its result
    let mut api: ModuleApi<MockVm> = ModuleApi::new();
    api.register("relay", |bridge| {
        let args = bridge.capture_typed(&[ArgumentKind::String])?;
        let target = args[0].as_string()?.to_string();
        bridge.clear_stack();
        let results = bridge.call(&target, &[Argument::Number(10.0)], 1)?;
        bridge.push_one(&results[0])?;
        Ok(1)
    });

    let mut vm = MockVm::new();
    vm.register_function("triple", |vm, _| {
        let mut bridge = StackBridge::new(vm);
        let args = bridge
            .capture_typed(&[ArgumentKind::Number])
            .map_err(|err| err.to_string())?;
        let n = args[0].as_number().map_err(|err| err.to_string())?;
        bridge
            .push_one(&Argument::Number(n * 3.0))
            .map_err(|err| err.to_string())?;
        Ok(1)
    });

    vm.push_string("triple");
    let pushed = api.invoke("relay", &mut vm);
    assert_eq!(pushed, 1);
    assert_eq!(vm.to_number(vm.top()), 30.0);
}

#[test]
fn entry_point_converts_call_failure_into_sentinel() {
    let mut api: ModuleApi<MockVm> = ModuleApi::new();
    api.register("fragile", |bridge| {
        bridge.call("not_a_function", &[], 1)?;
        Ok(0)
    });

    let mut vm = MockVm::new();
    let pushed = api.invoke("fragile", &mut vm);
    assert_eq!(pushed, 2);
    assert!(!vm.to_boolean(1));
    assert!(vm.to_text(2).unwrap().contains("guest call failed"));
}
