//! End-to-end programs, assembled the way the compiler dumps them and
//! observed through their printed output.

mod common;

use common::{calldata, insn, iseq_tuple, program, run, run_err};
use ruvy::{CollectStringPrint, ExecutionContext, Raw, RunError, StdHost, TypeTag, Value};

#[test]
fn puts_a_string_literal() {
    // puts 'foo'
    let raw = program(vec![
        insn("putself", vec![]),
        insn("putstring", vec![Raw::str("foo")]),
        insn("opt_send_without_block", vec![calldata("puts", 1)]),
        insn("leave", vec![]),
    ]);
    let (value, output) = run(&raw);
    assert_eq!(output, "foo\n");
    assert_eq!(value, Value::Nil);
}

#[test]
fn addition_through_operator_dispatch() {
    // p 2 + 3
    let raw = program(vec![
        insn("putself", vec![]),
        insn("putobject", vec![Raw::Int(2)]),
        insn("putobject", vec![Raw::Int(3)]),
        insn("opt_plus", vec![calldata("+", 1)]),
        insn("opt_send_without_block", vec![calldata("p", 1)]),
        insn("leave", vec![]),
    ]);
    let (value, output) = run(&raw);
    assert_eq!(output, "5\n");
    assert_eq!(value, Value::Int(5));
}

#[test]
fn integer_division_truncates() {
    // p 2 / 3
    let raw = program(vec![
        insn("putself", vec![]),
        insn("putobject", vec![Raw::Int(2)]),
        insn("putobject", vec![Raw::Int(3)]),
        insn("opt_div", vec![calldata("/", 1)]),
        insn("opt_send_without_block", vec![calldata("p", 1)]),
        insn("leave", vec![]),
    ]);
    assert_eq!(run(&raw).1, "0\n");
}

#[test]
fn bitwise_or_goes_through_the_host() {
    // p 2 | 3
    let raw = program(vec![
        insn("putself", vec![]),
        insn("putobject", vec![Raw::Int(2)]),
        insn("putobject", vec![Raw::Int(3)]),
        insn("opt_or", vec![calldata("|", 1)]),
        insn("opt_send_without_block", vec![calldata("p", 1)]),
        insn("leave", vec![]),
    ]);
    assert_eq!(run(&raw).1, "3\n");
}

#[test]
fn uminus_dedups_a_string_literal() {
    // p(-'string')
    let raw = program(vec![
        insn("putself", vec![]),
        insn("opt_str_uminus", vec![Raw::str("string"), calldata("-@", 0)]),
        insn("opt_send_without_block", vec![calldata("p", 1)]),
        insn("leave", vec![]),
    ]);
    let (value, output) = run(&raw);
    assert_eq!(output, "\"string\"\n");
    assert_eq!(value, Value::Str("string".into()));
}

#[test]
fn global_write_then_read() {
    // $g = 5; p $g
    let raw = program(vec![
        insn("putobject", vec![Raw::Int(5)]),
        insn("setglobal", vec![Raw::sym("$g")]),
        insn("putself", vec![]),
        insn("getglobal", vec![Raw::sym("$g")]),
        insn("opt_send_without_block", vec![calldata("p", 1)]),
        insn("leave", vec![]),
    ]);
    let iseq = ruvy::decode(&raw).unwrap();
    let mut host = StdHost::new();
    let mut writer = CollectStringPrint::new();
    let mut ctx = ExecutionContext::new(&mut host, &mut writer);
    let value = ctx.eval(&iseq).unwrap();
    assert_eq!(value, Value::Int(5));
    assert_eq!(ctx.global("$g"), Some(&Value::Int(5)));
    assert_eq!(writer.output(), "5\n");
}

#[test]
fn user_defined_method_with_one_argument() {
    // def f(x); x + 1; end; p f(41)
    let body = iseq_tuple(
        "f",
        &["x"],
        Some(1),
        vec![
            insn("getlocal_WC_0", vec![Raw::Int(3)]),
            insn("putobject_INT2FIX_1_", vec![]),
            insn("opt_plus", vec![calldata("+", 1)]),
            insn("leave", vec![]),
        ],
    );
    let raw = program(vec![
        insn("definemethod", vec![Raw::sym("f"), body]),
        insn("pop", vec![]),
        insn("putself", vec![]),
        insn("putself", vec![]),
        insn("putobject", vec![Raw::Int(41)]),
        insn("opt_send_without_block", vec![calldata("f", 1)]),
        insn("opt_send_without_block", vec![calldata("p", 1)]),
        insn("leave", vec![]),
    ]);
    let iseq = ruvy::decode(&raw).unwrap();
    let mut host = StdHost::new();
    let mut writer = CollectStringPrint::new();
    let mut ctx = ExecutionContext::new(&mut host, &mut writer);
    let value = ctx.eval(&iseq).unwrap();
    assert_eq!(value, Value::Int(42));
    assert!(ctx.lookup_method(TypeTag::Main, "f").is_some());
    assert_eq!(writer.output(), "42\n");
}

#[test]
fn branchunless_falls_through_on_zero_and_empty_string() {
    // 0 and "" are truthy; only nil and false take the branch.
    for (literal, expected) in [
        (Raw::Int(0), "\"truthy\"\n"),
        (Raw::str(""), "\"truthy\"\n"),
        (Raw::Bool(false), "\"falsy\"\n"),
        (Raw::Nil, "\"falsy\"\n"),
    ] {
        let raw = program(vec![
            insn("putobject", vec![literal.clone()]),
            insn("branchunless", vec![Raw::sym("label_else")]),
            insn("putself", vec![]),
            insn("putstring", vec![Raw::str("truthy")]),
            insn("opt_send_without_block", vec![calldata("p", 1)]),
            insn("leave", vec![]),
            Raw::sym("label_else"),
            insn("putself", vec![]),
            insn("putstring", vec![Raw::str("falsy")]),
            insn("opt_send_without_block", vec![calldata("p", 1)]),
            insn("leave", vec![]),
        ]);
        assert_eq!(run(&raw).1, expected, "for literal {literal:?}");
    }
}

#[test]
fn while_loop_counts_down() {
    // i = 3; while i > 0; puts i; i = i - 1; end
    // One local, so the biased index for slot 0 is 3.
    let raw = iseq_tuple(
        "<main>",
        &["i"],
        None,
        vec![
            insn("putobject", vec![Raw::Int(3)]),
            insn("setlocal_WC_0", vec![Raw::Int(3)]),
            Raw::sym("label_check"),
            insn("getlocal_WC_0", vec![Raw::Int(3)]),
            insn("putobject_INT2FIX_0_", vec![]),
            insn("opt_gt", vec![calldata(">", 1)]),
            insn("branchunless", vec![Raw::sym("label_done")]),
            insn("putself", vec![]),
            insn("getlocal_WC_0", vec![Raw::Int(3)]),
            insn("opt_send_without_block", vec![calldata("puts", 1)]),
            insn("pop", vec![]),
            insn("getlocal_WC_0", vec![Raw::Int(3)]),
            insn("putobject_INT2FIX_1_", vec![]),
            insn("opt_minus", vec![calldata("-", 1)]),
            insn("setlocal_WC_0", vec![Raw::Int(3)]),
            insn("jump", vec![Raw::sym("label_check")]),
            Raw::sym("label_done"),
            insn("putnil", vec![]),
            insn("leave", vec![]),
        ],
    );
    assert_eq!(run(&raw).1, "3\n2\n1\n");
}

#[test]
fn locals_round_trip_through_biased_indices() {
    // x = 5; y = x + 1; p y  -- two locals: x is slot 0 (index 4), y slot 1 (index 3).
    let raw = iseq_tuple(
        "<main>",
        &["x", "y"],
        None,
        vec![
            insn("putobject", vec![Raw::Int(5)]),
            insn("setlocal_WC_0", vec![Raw::Int(4)]),
            insn("getlocal_WC_0", vec![Raw::Int(4)]),
            insn("putobject_INT2FIX_1_", vec![]),
            insn("opt_plus", vec![calldata("+", 1)]),
            insn("setlocal_WC_0", vec![Raw::Int(3)]),
            insn("putself", vec![]),
            insn("getlocal_WC_0", vec![Raw::Int(3)]),
            insn("opt_send_without_block", vec![calldata("p", 1)]),
            insn("leave", vec![]),
        ],
    );
    assert_eq!(run(&raw).1, "6\n");
}

#[test]
fn reading_an_unset_local_is_an_error() {
    let raw = iseq_tuple(
        "<main>",
        &["count"],
        None,
        vec![insn("getlocal_WC_0", vec![Raw::Int(3)]), insn("leave", vec![])],
    );
    match run_err(&raw) {
        RunError::UndefinedLocal { name, receiver } => {
            assert_eq!(&*name, "count");
            assert_eq!(receiver, "main");
        }
        other => panic!("expected UndefinedLocal, got {other:?}"),
    }
}

#[test]
fn calling_a_user_method_with_the_wrong_arity_is_an_error() {
    let body = iseq_tuple(
        "f",
        &["x"],
        Some(1),
        vec![insn("putnil", vec![]), insn("leave", vec![])],
    );
    let raw = program(vec![
        insn("definemethod", vec![Raw::sym("f"), body]),
        insn("pop", vec![]),
        insn("putself", vec![]),
        insn("opt_send_without_block", vec![calldata("f", 0)]),
        insn("leave", vec![]),
    ]);
    assert!(matches!(run_err(&raw), RunError::ArityMismatch { given: 0, expected: 1, .. }));
}

#[test]
fn arrays_build_index_and_concatenate() {
    // p(([10, 20] + [30])[2])
    let raw = program(vec![
        insn("putself", vec![]),
        insn("duparray", vec![Raw::List(vec![Raw::Int(10), Raw::Int(20)])]),
        insn("putobject", vec![Raw::Int(30)]),
        insn("newarray", vec![Raw::Int(1)]),
        insn("concatarray", vec![]),
        insn("putobject", vec![Raw::Int(2)]),
        insn("opt_aref", vec![calldata("[]", 1)]),
        insn("opt_send_without_block", vec![calldata("p", 1)]),
        insn("leave", vec![]),
    ]);
    assert_eq!(run(&raw).1, "30\n");
}

#[test]
fn hash_literal_and_string_key_lookup() {
    // h = {"k" => 1}; p h["k"]  -- via the literal-key specialization.
    let raw = program(vec![
        insn("putself", vec![]),
        insn(
            "duphash",
            vec![Raw::Map(vec![(Raw::str("k"), Raw::Int(1))])],
        ),
        insn("opt_aref_with", vec![Raw::str("k"), calldata("[]", 1)]),
        insn("opt_send_without_block", vec![calldata("p", 1)]),
        insn("leave", vec![]),
    ]);
    assert_eq!(run(&raw).1, "1\n");
}

#[test]
fn newhash_builds_from_stack_pairs() {
    // p({:a => 1}[:a])
    let raw = program(vec![
        insn("putself", vec![]),
        insn("putobject", vec![Raw::sym("a")]),
        insn("putobject_INT2FIX_1_", vec![]),
        insn("newhash", vec![Raw::Int(2)]),
        insn("putobject", vec![Raw::sym("a")]),
        insn("opt_aref", vec![calldata("[]", 1)]),
        insn("opt_send_without_block", vec![calldata("p", 1)]),
        insn("leave", vec![]),
    ]);
    assert_eq!(run(&raw).1, "1\n");
}

#[test]
fn newhash_zero_is_an_empty_hash() {
    // p({}.empty?)
    let raw = program(vec![
        insn("putself", vec![]),
        insn("newhash", vec![Raw::Int(0)]),
        insn("opt_empty_p", vec![calldata("empty?", 0)]),
        insn("opt_send_without_block", vec![calldata("p", 1)]),
        insn("leave", vec![]),
    ]);
    assert_eq!(run(&raw).1, "true\n");
}

#[test]
fn unary_specializations_dispatch_to_the_host() {
    // p !nil; p 41.succ; p "abc".length; p nil.nil?
    let raw = program(vec![
        insn("putself", vec![]),
        insn("putnil", vec![]),
        insn("opt_not", vec![calldata("!", 0)]),
        insn("opt_send_without_block", vec![calldata("p", 1)]),
        insn("pop", vec![]),
        insn("putself", vec![]),
        insn("putobject", vec![Raw::Int(41)]),
        insn("opt_succ", vec![calldata("succ", 0)]),
        insn("opt_send_without_block", vec![calldata("p", 1)]),
        insn("pop", vec![]),
        insn("putself", vec![]),
        insn("putstring", vec![Raw::str("abc")]),
        insn("opt_length", vec![calldata("length", 0)]),
        insn("opt_send_without_block", vec![calldata("p", 1)]),
        insn("pop", vec![]),
        insn("putself", vec![]),
        insn("putnil", vec![]),
        insn("opt_nil_p", vec![calldata("nil?", 0)]),
        insn("opt_send_without_block", vec![calldata("p", 1)]),
        insn("leave", vec![]),
    ]);
    assert_eq!(run(&raw).1, "true\n42\n3\ntrue\n");
}

#[test]
fn constant_lookup_through_a_cold_inline_cache() {
    // p RUBY_ENGINE  -- the cache instructions are no-ops around the lookup.
    let raw = program(vec![
        insn("putself", vec![]),
        insn("opt_getinlinecache", vec![Raw::sym("label_done"), Raw::Int(0)]),
        insn("getconstant", vec![Raw::sym("RUBY_ENGINE")]),
        insn("opt_setinlinecache", vec![Raw::Int(0)]),
        Raw::sym("label_done"),
        insn("opt_send_without_block", vec![calldata("p", 1)]),
        insn("leave", vec![]),
    ]);
    assert_eq!(run(&raw).1, "\"ruvy\"\n");
}

#[test]
fn frozen_string_literal_pushes_the_literal() {
    // p 'lit'.freeze
    let raw = program(vec![
        insn("putself", vec![]),
        insn("opt_str_freeze", vec![Raw::str("lit"), calldata("freeze", 0)]),
        insn("opt_send_without_block", vec![calldata("p", 1)]),
        insn("leave", vec![]),
    ]);
    let (value, output) = run(&raw);
    assert_eq!(output, "\"lit\"\n");
    assert_eq!(value, Value::Str("lit".into()));
}

#[test]
fn string_equality_and_comparison() {
    // p "a" + "b" == "ab"
    let raw = program(vec![
        insn("putself", vec![]),
        insn("putstring", vec![Raw::str("a")]),
        insn("putstring", vec![Raw::str("b")]),
        insn("opt_plus", vec![calldata("+", 1)]),
        insn("putstring", vec![Raw::str("ab")]),
        insn("opt_eq", vec![calldata("==", 1)]),
        insn("opt_send_without_block", vec![calldata("p", 1)]),
        insn("leave", vec![]),
    ]);
    assert_eq!(run(&raw).1, "true\n");
}

#[test]
fn user_method_calls_another_user_method() {
    // def inc(x); x + 1; end; def twice(x); inc(inc(x)); end; p twice(40)
    let inc = iseq_tuple(
        "inc",
        &["x"],
        Some(1),
        vec![
            insn("getlocal_WC_0", vec![Raw::Int(3)]),
            insn("putobject_INT2FIX_1_", vec![]),
            insn("opt_plus", vec![calldata("+", 1)]),
            insn("leave", vec![]),
        ],
    );
    let twice = iseq_tuple(
        "twice",
        &["x"],
        Some(1),
        vec![
            insn("putself", vec![]),
            insn("putself", vec![]),
            insn("getlocal_WC_0", vec![Raw::Int(3)]),
            insn("opt_send_without_block", vec![calldata("inc", 1)]),
            insn("opt_send_without_block", vec![calldata("inc", 1)]),
            insn("leave", vec![]),
        ],
    );
    let raw = program(vec![
        insn("definemethod", vec![Raw::sym("inc"), inc]),
        insn("pop", vec![]),
        insn("definemethod", vec![Raw::sym("twice"), twice]),
        insn("pop", vec![]),
        insn("putself", vec![]),
        insn("putself", vec![]),
        insn("putobject", vec![Raw::Int(40)]),
        insn("opt_send_without_block", vec![calldata("twice", 1)]),
        insn("opt_send_without_block", vec![calldata("p", 1)]),
        insn("leave", vec![]),
    ]);
    let (value, output) = run(&raw);
    assert_eq!(output, "42\n");
    assert_eq!(value, Value::Int(42));
}

#[test]
fn division_by_zero_unwinds_as_a_host_error() {
    let raw = program(vec![
        insn("putobject_INT2FIX_1_", vec![]),
        insn("putobject_INT2FIX_0_", vec![]),
        insn("opt_div", vec![calldata("/", 1)]),
        insn("leave", vec![]),
    ]);
    match run_err(&raw) {
        RunError::Host(exc) => assert_eq!(exc.to_string(), "ZeroDivisionError: divided by 0"),
        other => panic!("expected a host error, got {other:?}"),
    }
}

#[test]
fn branchnil_skips_the_nil_arm() {
    // x = nil; p(x&.succ) compiles to a branchnil guard.
    let raw = iseq_tuple(
        "<main>",
        &["x"],
        None,
        vec![
            insn("putself", vec![]),
            insn("putnil", vec![]),
            insn("setlocal_WC_0", vec![Raw::Int(3)]),
            insn("getlocal_WC_0", vec![Raw::Int(3)]),
            insn("dup", vec![]),
            insn("branchnil", vec![Raw::sym("label_nil")]),
            insn("opt_succ", vec![calldata("succ", 0)]),
            Raw::sym("label_nil"),
            insn("opt_send_without_block", vec![calldata("p", 1)]),
            insn("leave", vec![]),
        ],
    );
    assert_eq!(run(&raw).1, "nil\n");
}
