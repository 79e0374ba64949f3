use std::cell::RefCell;
use std::rc::Rc;

use proptest::prelude::*;

use spoodle::bytecode::{Instruction, Op, Program, decode_all};
use spoodle::vm::value::Value;
use spoodle::vm::{Context, Step, VmError};

fn compile(source: &str) -> Program {
    spoodle::compile_source(source, |line, col, msg| panic!("{line}:{col}: {msg}"))
        .expect("compiles")
        .expect("no syntax errors")
}

fn eval(source: &str) -> Result<(Value, String), spoodle::Error> {
    let program = compile(source);
    let out = Rc::new(RefCell::new(Vec::<u8>::new()));
    let value = spoodle::run(&program, out.clone())?;
    let text = String::from_utf8(out.borrow().clone()).unwrap();
    Ok((value, text))
}

fn value(source: &str) -> Value {
    eval(source).unwrap().0
}

fn sink() -> Rc<RefCell<std::io::Sink>> {
    Rc::new(RefCell::new(std::io::sink()))
}

fn string(s: &str) -> Value {
    Value::String(s.into())
}

const FIB: &str = "
let fib = function(n) {
    if (n <= 2) return 1;
    return fib(n - 1) + fib(n - 2);
};
let r = fib(10);
return r;
";

// --- Calls and recursion ---

#[test]
fn recursive_fibonacci() {
    let program = compile(FIB);
    let mut ctx = Context::new(&program, sink());
    assert_eq!(ctx.execute().unwrap(), Value::Number(55.0));
    // Only the returned value is left: every call cleaned up after itself
    assert_eq!(ctx.stack(), &[Value::Number(55.0)]);
    assert_eq!(ctx.frames().len(), 1);
}

#[test]
fn call_frame_layout() {
    let program = compile(
        "let f = function(a, b) { return a - b; };
         { let keep = 7; return keep + f(10, 20); }",
    );
    let mut ctx = Context::new(&program, sink());

    while ctx.function() == 0 {
        ctx.step_one().unwrap();
    }
    let bp = ctx.bp();
    assert_eq!(ctx.stack()[bp], Value::Number(10.0));
    assert_eq!(ctx.stack()[bp + 1], Value::Number(20.0));
    assert!(matches!(ctx.stack()[bp - 1], Value::Function(_)));
    // [keep, keep (operand), callee, 10, 20]
    let depth_before = ctx.stack().len() - 3;

    while ctx.function() != 0 {
        ctx.step_one().unwrap();
    }
    assert_eq!(ctx.stack().len(), depth_before + 1);
    assert_eq!(ctx.stack().last(), Some(&Value::Number(-10.0)));
    assert_eq!(ctx.execute().unwrap(), Value::Number(-3.0));
}

#[test]
fn missing_return_yields_null() {
    assert_eq!(value("let f = function() { 1; }; return f();"), Value::Null);
}

#[test]
fn function_ending_in_if_falls_back_to_null() {
    let f = "let f = function(a) { if (a) return 1; };";
    assert_eq!(value(&format!("{f} return f(0);")), Value::Null);
    assert_eq!(value(&format!("{f} return f(1);")), Value::Number(1.0));
}

#[test]
fn main_without_return_halts_with_null() {
    let (v, out) = eval("$emit(1);").unwrap();
    assert_eq!(v, Value::Null);
    assert_eq!(out, "1\n");
}

#[test]
fn arity_is_checked() {
    let err = eval("let f = function(a) { return a; }; return f(1, 2);").unwrap_err();
    assert!(matches!(err, spoodle::Error::Runtime(VmError::ArityMismatch { expected: 1, got: 2, .. })));
}

#[test]
fn calling_a_number_fails() {
    let err = eval("let n = 3; n();").unwrap_err();
    assert!(matches!(err, spoodle::Error::Runtime(VmError::NotCallable { .. })));
}

#[test]
fn runaway_recursion_is_bounded() {
    let err = eval("let f = function() { return f(); }; return f();").unwrap_err();
    assert!(matches!(err, spoodle::Error::Runtime(VmError::CallDepthExceeded { .. })));
}

#[test]
fn functions_do_not_capture_enclosing_locals() {
    // `x` inside the inner literal is not a local there, so it is a global
    let err = eval(
        "let outer = function(x) { let inner = function() { return x; }; return inner(); };
         return outer(1);",
    )
    .unwrap_err();
    assert!(matches!(err, spoodle::Error::Runtime(VmError::GlobalNotInitialized { .. })));
}

// --- Scoping ---

#[test]
fn shadowing_in_nested_blocks() {
    assert_eq!(value("let x = 1; { let x = 2; return x; }"), Value::Number(2.0));
    let v = value(
        "let r = 0;
         { let x = 1; { let x = 2; r = x; } r = r + x * 10; }
         return r;",
    );
    assert_eq!(v, Value::Number(12.0));
}

#[test]
fn let_initializer_sees_outer_binding() {
    assert_eq!(value("{ let x = 5; { let x = x + 1; return x; } }"), Value::Number(6.0));
}

#[test]
fn compound_assignment_on_globals_and_locals() {
    assert_eq!(value("let x = 10; x -= 3; x *= 2; return x;"), Value::Number(14.0));
    assert_eq!(value("{ let y = 1; y += 4; y %= 3; return y; }"), Value::Number(2.0));
}

#[test]
fn assignment_is_an_expression() {
    assert_eq!(value("let a = 0; let b = 0; a = b = 4; return a + b;"), Value::Number(8.0));
}

#[test]
fn forward_global_reference_fails_only_at_runtime() {
    let program = compile("return later; let later = 1;");
    let err = Context::new(&program, sink()).execute().unwrap_err();
    assert!(matches!(err, VmError::GlobalNotInitialized { .. }));
    assert!(err.to_string().contains("global not initialized"));

    let v = value(
        "let f = function() { return g(); };
         let g = function() { return 3; };
         return f();",
    );
    assert_eq!(v, Value::Number(3.0));
}

// --- Control flow ---

#[test]
fn short_circuit_keeps_decisive_operand() {
    assert_eq!(value("return 1 && 2;"), Value::Number(2.0));
    assert_eq!(value("return 1 || 2;"), Value::Number(1.0));
    assert_eq!(value("return 0 && 2;"), Value::Number(0.0));
    assert_eq!(value("return 0 || null;"), Value::Null);
    assert_eq!(value(r#"return "" || "x";"#), string("x"));
}

#[test]
fn short_circuit_skips_right_operand() {
    let (v, out) = eval(
        "let hit = function() { $emit(\"hit\"); return 1; };
         0 && hit();
         1 || hit();
         return 1 && hit();",
    )
    .unwrap();
    assert_eq!(v, Value::Number(1.0));
    assert_eq!(out, "hit\n");
}

#[test]
fn false_branch_is_never_executed() {
    let program = compile("if (false) { return 1; } return 2;");
    // PUSH BOOLEAN (3 bytes), CJF (3 bytes), then the branch's PUSH
    let branch_push = 6;
    assert_eq!(
        Instruction::decode(&program.main, branch_push).unwrap().0,
        Instruction::Push(spoodle::bytecode::Constant::Number(1.0))
    );

    let mut ctx = Context::new(&program, sink());
    let result = loop {
        assert_ne!(ctx.ip(), branch_push);
        if let Step::Halt(v) = ctx.step_one().unwrap() {
            break v;
        }
    };
    assert_eq!(result, Value::Number(2.0));
}

#[test]
fn if_else_chains() {
    let classify = "let c = function(n) {
        if (n < 0) return \"neg\";
        else if (n == 0) return \"zero\";
        else { let big = n > 100; if (big) return \"big\"; }
        return \"small\";
    };";
    let v = |arg: &str| value(&format!("{classify} return c({arg});"));
    assert_eq!(v("0 - 5"), string("neg"));
    assert_eq!(v("0"), string("zero"));
    assert_eq!(v("500"), string("big"));
    assert_eq!(v("7"), string("small"));
}

#[test]
fn else_branch_runs_when_then_falls_through() {
    assert_eq!(value("let r = 0; if (0) r = 1; else r = 2; return r;"), Value::Number(2.0));
    assert_eq!(value("let r = 0; if (1) r = 1; else r = 2; return r;"), Value::Number(1.0));
}

#[test]
fn nested_if_in_then_branch_can_fall_through() {
    let f = "let f = function(a, b) { if (a) { if (b) return 1; } else return 3; return 4; };";
    assert_eq!(value(&format!("{f} return f(1, 0);")), Value::Number(4.0));
    assert_eq!(value(&format!("{f} return f(1, 1);")), Value::Number(1.0));
    assert_eq!(value(&format!("{f} return f(0, 1);")), Value::Number(3.0));
}

#[test]
fn let_as_unbraced_branch_keeps_slots_aligned() {
    assert_eq!(value("{ let a = 7; if (0) let b = 2; let c = 3; return c; }"), Value::Number(3.0));
    assert_eq!(value("{ let a = 7; if (1) let b = 2; let c = 3; return a + c; }"), Value::Number(10.0));
    assert_eq!(value("{ let a = 7; if (1) 0; else let b = 2; let c = 3; return c; }"), Value::Number(3.0));

    // The branch's binding ends with the branch
    let program = compile("let f = function(a) { let v = 1; if (a) let v = 2; return v; }; return f(1);");
    let mut ctx = Context::new(&program, sink());
    assert_eq!(ctx.execute().unwrap(), Value::Number(1.0));
    assert_eq!(ctx.stack(), &[Value::Number(1.0)]);
}

#[test]
fn empty_string_is_falsy() {
    assert_eq!(value(r#"if ("") return 1; else return 2;"#), Value::Number(2.0));
}

// --- Values and built-ins ---

#[test]
fn emit_prints_each_argument() {
    let (_, out) = eval(r#"$emit("hello", 1 + 2, true, null);"#).unwrap();
    assert_eq!(out, "hello\n3\ntrue\nnull\n");
}

#[test]
fn typeof_reports_runtime_tags() {
    assert_eq!(value("return $typeof(1);"), string("NUMBER"));
    assert_eq!(value("return $typeof(5l);"), string("LONG"));
    assert_eq!(value(r#"return $typeof("s");"#), string("STRING"));
    assert_eq!(value("return $typeof(function() {});"), string("FUNCTION"));
    assert_eq!(value("return $typeof($emit);"), string("NATIVE_FUNCTION"));
}

#[test]
fn builtins_cannot_be_overwritten() {
    assert_eq!(value("$emit = 5; return $typeof($emit);"), string("NATIVE_FUNCTION"));
}

#[test]
fn arithmetic_is_number_only() {
    let err = eval("return 1l + 1;").unwrap_err();
    assert!(matches!(err, spoodle::Error::Runtime(VmError::Type { op: Op::Add, .. })));
    let err = eval(r#"return "a" == "a";"#).unwrap_err();
    assert!(matches!(err, spoodle::Error::Runtime(VmError::Type { op: Op::Ceq, .. })));
}

#[test]
fn division_and_remainder_follow_ieee() {
    assert_eq!(value("return 7 / 2;"), Value::Number(3.5));
    assert_eq!(value("return 7 % 3;"), Value::Number(1.0));
    assert_eq!(value("return 1 / 0;"), Value::Number(f64::INFINITY));
}

#[test]
fn long_literal_out_of_range_fails_compilation() {
    let err = spoodle::compile_source("return 9223372036854775808l;", |_, _, _| {}).unwrap_err();
    assert!(matches!(err, spoodle::Error::Compile(spoodle::codegen::CompileError::LongOutOfRange { .. })));
}

// --- Driver ---

#[test]
fn syntax_errors_go_to_the_callback() {
    let mut errors = Vec::new();
    let result = spoodle::compile_source("let x = ;\nlet = 2;\nreturn 1;", |line, col, msg| {
        errors.push((line, col, msg.to_string()))
    })
    .unwrap();
    assert!(result.is_none());
    assert_eq!(errors.len(), 2);
    assert_eq!((errors[0].0, errors[0].1), (1, 9));
    assert_eq!((errors[1].0, errors[1].1), (2, 5));
    assert!(errors[1].2.contains("identifier"));
}

#[test]
fn lex_errors_go_to_the_callback() {
    let mut errors = Vec::new();
    let result =
        spoodle::compile_source("let s = 'x';\nif (a & b) 1;", |line, col, msg| errors.push((line, col, msg.to_string())))
            .unwrap();
    assert!(result.is_none());
    // Both quotes and the lone '&'
    let positions: Vec<(usize, usize)> = errors.iter().map(|e| (e.0, e.1)).collect();
    assert_eq!(positions, vec![(1, 9), (1, 11), (2, 7)]);
}

#[test]
fn debug_session_tracks_listing_lines() {
    let program = compile("let f = function(a) { return a; }; return f(4);");
    let mut session = spoodle::debug(&program, sink()).unwrap();
    // Line 0 is the `main:` header
    assert_eq!(session.current_line(), Some(1));
    let mut lines = Vec::new();
    loop {
        let line = session.current_line().expect("every ip maps to a line");
        lines.push(line);
        let text = session.listing().text.lines().nth(line).unwrap();
        assert!(text.starts_with('\t'), "{text}");
        if let Step::Halt(v) = session.step().unwrap() {
            assert_eq!(v, Value::Number(4.0));
            break;
        }
    }
    assert!(session.snapshot().halted);
    // Function 1's section comes after main's
    assert!(lines.iter().any(|&l| session.listing().lines[l].function == 1));
}

#[test]
fn disassembly_offsets_match_decoder() {
    let program = compile(FIB);
    for code in std::iter::once(&program.main).chain(program.functions.iter().flatten().map(|f| &f.code)) {
        let (text, offsets) = spoodle::disasm::disassemble(code).unwrap();
        let decoded = decode_all(code).unwrap();
        assert_eq!(text.lines().count(), decoded.len());
        assert_eq!(offsets, decoded.iter().map(|(at, _)| *at).collect::<Vec<_>>());
    }
}

// --- Properties ---

fn roundtrip(code: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for (_, inst) in decode_all(code).unwrap() {
        inst.encode(&mut out);
    }
    out
}

fn run_stepping(program: &Program) -> (Value, spoodle::vm::snapshot::Snapshot) {
    let mut ctx = Context::new(program, sink());
    loop {
        if let Step::Halt(v) = ctx.step_one().unwrap() {
            return (v, ctx.snapshot());
        }
    }
}

fn run_executing(program: &Program) -> (Value, spoodle::vm::snapshot::Snapshot) {
    let mut ctx = Context::new(program, sink());
    let v = ctx.execute().unwrap();
    (v, ctx.snapshot())
}

#[derive(Debug, Clone, Copy)]
enum Arith {
    Add,
    Sub,
    Mul,
}

fn arb_step() -> impl Strategy<Value = (Arith, u32, bool)> {
    (prop_oneof![Just(Arith::Add), Just(Arith::Sub), Just(Arith::Mul)], 0u32..100, any::<bool>())
}

/// `acc = acc <op> k` steps, some through a block local, plus the value the
/// program must return.
fn arith_program(steps: &[(Arith, u32, bool)]) -> (String, f64) {
    let mut src = String::from("let acc = 1;\n");
    let mut expected = 1.0f64;
    for &(op, k, via_local) in steps {
        let sym = match op {
            Arith::Add => "+",
            Arith::Sub => "-",
            Arith::Mul => "*",
        };
        if via_local {
            src.push_str(&format!("{{ let t = {k}; acc = acc {sym} t; }}\n"));
        } else {
            src.push_str(&format!("acc {sym}= {k};\n"));
        }
        let k = k as f64;
        expected = match op {
            Arith::Add => expected + k,
            Arith::Sub => expected - k,
            Arith::Mul => expected * k,
        };
    }
    src.push_str("return acc;\n");
    (src, expected)
}

/// Nested blocks with `lets[i]` declarations at depth `i + 1`.
fn nested_blocks(lets: &[usize]) -> String {
    let mut src = String::new();
    for (depth, &n) in lets.iter().enumerate() {
        src.push('{');
        for i in 0..n {
            src.push_str(&format!(" let v{depth}_{i} = {i};"));
        }
    }
    src.push_str(&"}".repeat(lets.len()));
    src
}

/// Statement shapes inside `function(a, b, c) { let v = 100; ... return v; }`.
#[derive(Debug, Clone)]
enum Shape {
    Return(u32),
    ReturnV,
    Let(u32),
    Expr,
    If { cond: usize, then: Box<Shape>, otherwise: Option<Box<Shape>> },
    Block(Vec<Shape>),
}

const CONDS: [&str; 3] = ["a", "b", "c"];

/// Whether a trailing `else` would attach inside this statement.
fn open_tail(s: &Shape) -> bool {
    match s {
        Shape::If { otherwise: None, .. } => true,
        Shape::If { otherwise: Some(e), .. } => open_tail(e),
        _ => false,
    }
}

fn if_shape(cond: usize, then: Shape, otherwise: Option<Shape>) -> Shape {
    // Keep the source unambiguous: brace a then-branch that would steal the else
    let then = if otherwise.is_some() && open_tail(&then) { Shape::Block(vec![then]) } else { then };
    Shape::If { cond, then: Box::new(then), otherwise: otherwise.map(Box::new) }
}

fn arb_shape() -> impl Strategy<Value = Shape> {
    let leaf = prop_oneof![
        (0u32..50).prop_map(Shape::Return),
        Just(Shape::ReturnV),
        (0u32..50).prop_map(Shape::Let),
        Just(Shape::Expr),
    ];
    leaf.prop_recursive(5, 40, 3, |inner| {
        prop_oneof![
            (0usize..3, inner.clone(), prop::option::of(inner.clone()))
                .prop_map(|(cond, then, otherwise)| if_shape(cond, then, otherwise)),
            prop::collection::vec(inner, 0..4).prop_map(Shape::Block),
        ]
    })
}

fn render(s: &Shape, out: &mut String) {
    match s {
        Shape::Return(k) => out.push_str(&format!("return {k}; ")),
        Shape::ReturnV => out.push_str("return v; "),
        Shape::Let(k) => out.push_str(&format!("let v = {k}; ")),
        Shape::Expr => out.push_str("a; "),
        Shape::If { cond, then, otherwise } => {
            out.push_str(&format!("if ({}) ", CONDS[*cond]));
            render(then, out);
            if let Some(e) = otherwise {
                out.push_str("else ");
                render(e, out);
            }
        }
        Shape::Block(body) => {
            out.push_str("{ ");
            for s in body {
                render(s, out);
            }
            out.push_str("} ");
        }
    }
}

/// Reference semantics: lexical scopes as a stack of `v` bindings; an
/// unbraced branch is its own scope.
fn reference(s: &Shape, args: [bool; 3], scopes: &mut Vec<Vec<u32>>) -> Option<u32> {
    let innermost = |scopes: &Vec<Vec<u32>>| scopes.iter().flatten().last().copied();
    match s {
        Shape::Return(k) => Some(*k),
        Shape::ReturnV => innermost(scopes),
        Shape::Let(k) => {
            if let Some(scope) = scopes.last_mut() {
                scope.push(*k);
            }
            None
        }
        Shape::Expr => None,
        Shape::If { cond, then, otherwise } => {
            let taken = if args[*cond] { Some(then) } else { otherwise.as_ref() };
            let branch = taken?;
            if matches!(**branch, Shape::Block(_)) {
                reference(branch, args, scopes)
            } else {
                scopes.push(Vec::new());
                let r = reference(branch, args, scopes);
                scopes.pop();
                r
            }
        }
        Shape::Block(body) => {
            scopes.push(Vec::new());
            let r = body.iter().find_map(|s| reference(s, args, scopes));
            scopes.pop();
            r
        }
    }
}

proptest! {
    /// Nested `if`/`else` shapes, with and without braces, return what the
    /// reference evaluator returns and leave only the result on the stack.
    #[test]
    fn branches_match_reference(body in prop::collection::vec(arb_shape(), 1..4), args in any::<[bool; 3]>()) {
        let mut src = String::from("let f = function(a, b, c) { let v = 100; ");
        for s in &body {
            render(s, &mut src);
        }
        let [a, b, c] = args.map(|x| x as u8);
        src.push_str(&format!("return v; }}; return f({a}, {b}, {c});"));

        let mut scopes = vec![vec![100]];
        let expected = body
            .iter()
            .find_map(|s| reference(s, args, &mut scopes))
            .or_else(|| scopes.iter().flatten().last().copied());

        let program = compile(&src);
        let mut ctx = Context::new(&program, sink());
        let result = ctx.execute();
        let expected_value = expected.map(|k| Value::Number(k as f64));
        prop_assert_eq!(result.as_ref().ok(), expected_value.as_ref(), "{}", src);
        prop_assert_eq!(ctx.stack().len(), 1, "{}", src);
    }


    /// Arithmetic programs compute what Rust computes, and stepping reaches
    /// the same final state as `execute`.
    #[test]
    fn step_and_execute_agree(steps in prop::collection::vec(arb_step(), 0..20)) {
        let (src, expected) = arith_program(&steps);
        let program = compile(&src);
        let (stepped, stepped_state) = run_stepping(&program);
        let (executed, executed_state) = run_executing(&program);
        prop_assert_eq!(&executed, &Value::Number(expected));
        prop_assert_eq!(stepped, executed);
        prop_assert_eq!(stepped_state, executed_state);
    }

    /// Every scope exit pops exactly the locals it declared.
    #[test]
    fn scope_exit_pops_match_declarations(lets in prop::collection::vec(0usize..6, 1..8)) {
        let program = compile(&nested_blocks(&lets));
        let pops = decode_all(&program.main)
            .unwrap()
            .iter()
            .filter(|(_, inst)| *inst == Instruction::Simple(Op::Pop))
            .count();
        prop_assert_eq!(pops, lets.iter().sum::<usize>());

        let mut ctx = Context::new(&program, sink());
        prop_assert_eq!(ctx.execute().unwrap(), Value::Null);
        prop_assert!(ctx.stack().is_empty());
    }

    /// Decoding compiled code and encoding it again reproduces it exactly.
    #[test]
    fn compiled_code_round_trips(steps in prop::collection::vec(arb_step(), 0..12)) {
        let (src, _) = arith_program(&steps);
        let program = compile(&format!("let f = function(acc) {{ {src} }};\n{src}"));
        prop_assert_eq!(roundtrip(&program.main), program.main.to_vec());
        for f in program.functions.iter().flatten() {
            prop_assert_eq!(roundtrip(&f.code), f.code.to_vec());
        }
    }
}
