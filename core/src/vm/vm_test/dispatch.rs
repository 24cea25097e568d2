use super::*;

#[test]
fn true_strict_equals_true() {
    let (outcome, ctx) = run(vec![STRICT_EQUAL, 22, 22, slot(3), HALT]);
    assert_eq!(outcome.state, VmState::Halted);
    assert_eq!(outcome.steps, 2);
    assert!(outcome.fault.is_none());
    assert_eq!(ctx.resolve(3), Some(&Val::Bool(true)));
}

#[test]
fn halt_stops_immediately() {
    let (outcome, ctx) = run(vec![HALT, 999]);
    assert_eq!(outcome.state, VmState::Halted);
    assert_eq!(outcome.steps, 1);
    assert_eq!(ctx.ip(), 1);
}

#[test]
fn unknown_opcode_faults() {
    let (outcome, _) = run(vec![STORE, int(1), slot(0), 99]);
    assert_eq!(outcome.state, VmState::Faulted);
    assert_eq!(outcome.fault, Some(Fault::UnknownOpcode { address: 3, opcode: 99 }));

    let (outcome, _) = run(vec![-1]);
    assert_eq!(outcome.fault, Some(Fault::UnknownOpcode { address: 0, opcode: -1 }));
}

#[test]
fn running_off_the_end_is_a_bounds_fault() {
    let (outcome, _) = run(vec![STORE, int(1), slot(0)]);
    assert_eq!(outcome.fault, Some(Fault::OperandBounds { address: 3, len: 3 }));
}

#[test]
fn bad_jump_target_faults() {
    let (outcome, _) = run(vec![JUMP, int(50)]);
    assert_eq!(outcome.fault, Some(Fault::OperandBounds { address: 50, len: 2 }));

    let (outcome, _) = run(vec![JUMP, 22]);
    assert!(matches!(outcome.fault, Some(Fault::ConstantTag { .. })));
}

#[test]
fn truncated_operand_faults_instead_of_routing() {
    // a handler target is installed but structural faults are never caught
    let (outcome, _) = run(vec![TRY_ENTER, int(4), STRICT_EQUAL, 46, HALT]);
    assert_eq!(outcome.state, VmState::Faulted);
    assert!(matches!(outcome.fault, Some(Fault::ConstantTag { .. })));
}

#[test]
fn return_at_root_halts_with_value() {
    let (outcome, _) = run(vec![RETURN, int(4)]);
    assert_eq!(outcome.state, VmState::Halted);
    assert_eq!(outcome.result, Some(Val::Int(4)));
    assert_eq!(outcome.into_result(), Ok(Val::Int(4)));
}

#[test]
fn thrown_exception_is_caught_by_enclosing_frame() {
    let program = vec![
        TRY_ENTER,
        int(5), // 0
        THROW,
        int(7), // 2
        HALT,   // 4
        GET_EXCEPTION,
        slot(0), // 5
        HALT,    // 7
    ];
    let (outcome, ctx) = run(program);
    assert_eq!(outcome.state, VmState::Halted);
    assert_eq!(outcome.steps, 4);
    assert_eq!(ctx.resolve(0), Some(&Val::Int(7)));
    assert_eq!(ctx.pending(), None);
}

#[test]
fn unhandled_exception_faults_the_run() {
    let (outcome, _) = run(vec![THROW, int(5)]);
    assert_eq!(outcome.state, VmState::Faulted);
    assert_eq!(
        outcome.fault,
        Some(Fault::UnhandledRuntimeException { value: Val::Int(5) })
    );
}

#[test]
fn unbound_variable_is_catchable() {
    let program = vec![
        TRY_ENTER,
        int(5), // 0
        STORE,
        slot(9),
        slot(0), // 2
        GET_EXCEPTION,
        slot(1), // 5
        HALT,    // 7
    ];
    let (outcome, ctx) = run(program);
    assert_eq!(outcome.state, VmState::Halted);
    match ctx.resolve(1) {
        Some(Val::Str(msg)) => assert!(msg.starts_with("ReferenceError")),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn nested_call_returns_into_caller() {
    let program = vec![
        CALL,
        int(5),
        int(20),
        slot(0), // 0
        HALT,    // 4
        ADD,
        slot(0),
        int(1),
        slot(1), // 5
        RETURN,
        slot(1), // 9
    ];
    let (outcome, ctx) = run(program);
    assert_eq!(outcome.state, VmState::Halted);
    assert_eq!(ctx.depth(), 1);
    assert_eq!(ctx.resolve(0), Some(&Val::Int(21)));
    assert_eq!(ctx.resolve(1), None);
}

#[test]
fn exception_crosses_nested_call_boundary() {
    let program = vec![
        TRY_ENTER,
        int(7), // 0
        CALL,
        int(10),
        int(1),
        slot(0), // 2
        HALT,    // 6
        GET_EXCEPTION,
        slot(1), // 7
        HALT,    // 9
        THROW,
        int(9), // 10
    ];
    let mut recorder = TraceRecorder::new(16);
    let outcome = {
        let mut vm = Vm::new(machine(program)).with_trace(&mut recorder);
        let outcome = vm.run();
        assert_eq!(vm.context().resolve(1), Some(&Val::Int(9)));
        assert_eq!(vm.context().depth(), 2);
        outcome
    };
    assert_eq!(outcome.state, VmState::Halted);
    assert_eq!(outcome.steps, 5);

    let names: Vec<&str> = recorder.entries().iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["TRY_ENTER", "THROW", "CALL", "GET_EXCEPTION", "HALT"]);
    assert_eq!(recorder.entries()[1].depth, 3);
}

#[test]
fn try_exit_drops_handler_scope() {
    let program = vec![
        TRY_ENTER,
        int(6), // 0
        TRY_EXIT, // 2
        THROW,
        int(3), // 3
        HALT,   // 5
        HALT,   // 6
    ];
    let (outcome, ctx) = run(program);
    assert_eq!(
        outcome.fault,
        Some(Fault::UnhandledRuntimeException { value: Val::Int(3) })
    );
    assert_eq!(ctx.depth(), 1);
}

#[test]
fn step_limit_bounds_infinite_loops() {
    let machine = Arc::new(Machine::new(vec![JUMP, int(0)], test_table()).with_max_steps(Some(10)));
    let mut vm = Vm::new(machine);
    let outcome = vm.run();
    assert_eq!(outcome.fault, Some(Fault::StepLimit { limit: 10 }));
    assert_eq!(outcome.steps, 10);
    // terminal states are sticky
    assert_eq!(vm.run(), outcome);
    assert_eq!(vm.state(), VmState::Faulted);
}

#[test]
fn closure_sink_sees_every_instruction() {
    let mut seen = Vec::new();
    let mut sink = |event: &crate::vm::TraceEvent<'_>| seen.push((event.address, event.opcode));
    let mut vm = Vm::new(machine(vec![STRICT_EQUAL, 22, 38, slot(0), HALT])).with_trace(&mut sink);
    vm.run();
    drop(vm);
    assert_eq!(seen, vec![(0, STRICT_EQUAL), (4, HALT)]);
}

#[test]
fn machine_is_shareable_across_threads() {
    let machine = machine(vec![STRICT_EQUAL, 22, 22, slot(0), HALT]);
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let machine = Arc::clone(&machine);
            std::thread::spawn(move || Vm::new(machine).run().state)
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), VmState::Halted);
    }
}
