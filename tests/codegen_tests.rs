use tinyjit::ir::{Function, Instruction, Program};
use tinyjit::{compile_instructions, compile_program, VirtualMachine};

fn agrees_with_vm(body: Vec<Instruction>) {
    let vm_result = VirtualMachine::new().execute(&body).unwrap();
    match compile_instructions(&body).unwrap() {
        Some(compiled) => assert_eq!(compiled.invoke(), vm_result),
        None => {
            // No backend on this host architecture; nothing to compare.
        }
    }
}

#[test]
fn scenario_1_agrees() {
    agrees_with_vm(vec![Instruction::LoadImm(10), Instruction::LoadImm(5), Instruction::Add, Instruction::Return]);
}

#[test]
fn scenario_2_agrees() {
    agrees_with_vm(vec![
        Instruction::LoadImm(100),
        Instruction::LoadImm(50),
        Instruction::Sub,
        Instruction::LoadImm(3),
        Instruction::Div,
        Instruction::LoadImm(4),
        Instruction::Mul,
        Instruction::Return,
    ]);
}

#[test]
fn scenario_3_agrees_print_is_a_silent_no_op_natively() {
    agrees_with_vm(vec![
        Instruction::LoadImm(15),
        Instruction::LoadImm(3),
        Instruction::Sub,
        Instruction::LoadImm(2),
        Instruction::Mul,
        Instruction::LoadImm(4),
        Instruction::Div,
        Instruction::Print,
        Instruction::Return,
    ]);
}

#[test]
fn extreme_immediates_agree() {
    agrees_with_vm(vec![Instruction::LoadImm(i64::MIN), Instruction::Return]);
    agrees_with_vm(vec![Instruction::LoadImm(i64::MAX), Instruction::Return]);
}

#[test]
fn empty_body_compiles_to_zero() {
    if let Some(compiled) = compile_instructions(&[]).unwrap() {
        assert_eq!(compiled.invoke(), 0);
    }
}

#[test]
fn scenarios_5_and_6_use_call_so_codegen_declines_and_vm_still_agrees() {
    let program = Program::new()
        .with_function(Function::new(
            "Main",
            vec![],
            vec![
                Instruction::LoadImm(10),
                Instruction::LoadImm(5),
                Instruction::Call("Step1".to_string()),
                Instruction::LoadImm(2),
                Instruction::Mul,
                Instruction::Print,
                Instruction::Return,
            ],
        ))
        .with_function(Function::new(
            "Step1",
            vec!["int".to_string(), "int".to_string()],
            vec![Instruction::LoadArg(0), Instruction::LoadArg(1), Instruction::Add, Instruction::Return],
        ));

    assert!(compile_program(&program).unwrap().is_none());

    let mut vm = VirtualMachine::new();
    assert_eq!(vm.execute_program(&program).unwrap(), 30);
}

#[test]
fn program_with_load_arg_in_main_declines_to_the_vm() {
    let program = Program::new().with_function(Function::new(
        "Main",
        vec!["int".to_string()],
        vec![Instruction::LoadArg(0), Instruction::Return],
    ));

    assert!(compile_program(&program).unwrap().is_none());
}

#[test]
fn program_without_main_is_a_hard_error() {
    let program = Program::new().with_function(Function::new("Helper", vec![], vec![]));
    let err = compile_program(&program).unwrap_err();
    assert!(matches!(err, tinyjit::error::ProgramError::NoMainFunction));
}
