//! Helpers for assembling compiler dump trees by hand.
//!
//! Integration tests stand in for the compiler front end: each test builds
//! the array-of-tuples dump a compiled program would produce and feeds it to
//! the decoder, then observes output through a collecting writer.

use ruvy::{CollectStringPrint, ExecutionContext, Raw, StdHost, Value};

/// An opcode tuple.
pub fn insn(opcode: &str, operands: Vec<Raw>) -> Raw {
    let mut tuple = vec![Raw::sym(opcode)];
    tuple.extend(operands);
    Raw::List(tuple)
}

/// A call-data descriptor map the way the compiler dumps one.
pub fn calldata(mid: &str, argc: i64) -> Raw {
    Raw::Map(vec![
        (Raw::sym("mid"), Raw::sym(mid)),
        (Raw::sym("flag"), Raw::Int(16)),
        (Raw::sym("orig_argc"), Raw::Int(argc)),
    ])
}

/// A full sequence container with the compiler's fixed element layout:
/// display label at position 6, locals at 11, argument descriptor at 12,
/// instruction list last.
pub fn iseq_tuple(label: &str, locals: &[&str], lead_num: Option<i64>, body: Vec<Raw>) -> Raw {
    let args = match lead_num {
        Some(count) => Raw::Map(vec![(Raw::sym("lead_num"), Raw::Int(count))]),
        None => Raw::Map(Vec::new()),
    };
    Raw::List(vec![
        Raw::str("YARVInstructionSequence/SimpleDataFormat"),
        Raw::Int(3),
        Raw::Int(4),
        Raw::Int(1),
        Raw::Map(Vec::new()),
        Raw::str(label),
        Raw::str("test.rb"),
        Raw::str("test.rb"),
        Raw::Int(1),
        Raw::sym("top"),
        Raw::List(locals.iter().map(|name| Raw::sym(name)).collect()),
        args,
        Raw::List(Vec::new()),
        Raw::List(body),
    ])
}

/// A toplevel program with no locals.
pub fn program(body: Vec<Raw>) -> Raw {
    iseq_tuple("<main>", &[], None, body)
}

/// Decodes and runs a program, returning its value and collected output.
pub fn run(raw: &Raw) -> (Value, String) {
    let iseq = ruvy::decode(raw).expect("program should decode");
    let mut host = StdHost::new();
    let mut writer = CollectStringPrint::new();
    let value = {
        let mut ctx = ExecutionContext::new(&mut host, &mut writer);
        ctx.eval(&iseq).expect("program should run")
    };
    (value, writer.into_output())
}

/// Like [`run`] but returns the runtime error.
pub fn run_err(raw: &Raw) -> ruvy::RunError {
    let iseq = ruvy::decode(raw).expect("program should decode");
    let mut host = StdHost::new();
    let mut writer = CollectStringPrint::new();
    let mut ctx = ExecutionContext::new(&mut host, &mut writer);
    ctx.eval(&iseq).expect_err("program should fail")
}
