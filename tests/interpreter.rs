use calla::{
    diagnostics::{CallaError, Diagnostic, DiagnosticKind},
    runtime::Interpreter,
    value::{Value, ValueKind},
};

fn eval(source: &str) -> Value {
    let mut interpreter = Interpreter::new();
    interpreter
        .eval_source(source)
        .expect("evaluation should succeed")
}

fn eval_error(source: &str) -> Diagnostic {
    let mut interpreter = Interpreter::new();
    match interpreter.eval_source(source) {
        Ok(value) => panic!("expected error, received value {value}"),
        Err(CallaError::Diagnostic(diag)) => diag,
        Err(other) => panic!("expected diagnostic, received {other}"),
    }
}

fn expect_int(value: &Value) -> i64 {
    match value.0.as_ref() {
        ValueKind::Int(n) => *n,
        _ => panic!("expected Int, found {}", value.type_name()),
    }
}

fn expect_str(value: &Value) -> &str {
    match value.0.as_ref() {
        ValueKind::Str(s) => s,
        _ => panic!("expected Str, found {}", value.type_name()),
    }
}

#[test]
fn evaluates_basic_arithmetic() {
    let value = eval("return 2 + 2 * 10;");
    assert_eq!(expect_int(&value), 22);
}

#[test]
fn returns_last_expression_from_script() {
    let value = eval(
        r#"
        var x = 40;
        x + 2
        "#,
    );
    assert_eq!(expect_int(&value), 42);
}

#[test]
fn concatenates_strings() {
    let value = eval(r#"return "foo" + "bar";"#);
    assert_eq!(expect_str(&value), "foobar");
}

#[test]
fn division_by_zero_is_a_runtime_error() {
    let diag = eval_error("return 1 / 0;");
    assert_eq!(diag.kind, DiagnosticKind::Runtime);
    assert!(diag.message.contains("integer arithmetic failed"));
}

#[test]
fn overflowing_integer_literal_is_rejected() {
    let diag = eval_error("return 99999999999999999999;");
    assert_eq!(diag.kind, DiagnosticKind::Parser);
    assert!(diag.message.contains("integer literal out of range"));
}

#[test]
fn negating_int_min_is_a_runtime_error() {
    let diag = eval_error("return -(-9223372036854775807 - 1);");
    assert_eq!(diag.kind, DiagnosticKind::Runtime);
    assert!(diag.message.contains("integer arithmetic failed"));
}

#[test]
fn while_loop_with_break_and_continue() {
    let value = eval(
        r#"
        var mut i = 0;
        var mut total = 0;
        while i < 10 {
            i = i + 1;
            if i == 3 { continue; }
            if i > 5 { break; }
            total = total + i;
        }
        return total;
        "#,
    );
    assert_eq!(expect_int(&value), 1 + 2 + 4 + 5);
}

#[test]
fn recursive_function_with_annotation() {
    let value = eval(
        r#"
        fn fib(n: int) -> int {
            if n < 2 { return n; }
            return fib(n - 1) + fib(n - 2);
        }
        return fib(10);
        "#,
    );
    assert_eq!(expect_int(&value), 55);
}

#[test]
fn recursion_requires_an_explicit_return_type() {
    let diag = eval_error(
        r#"
        fn countdown(n: int) {
            if n > 0 { countdown(n - 1); }
        }
        "#,
    );
    assert_eq!(diag.kind, DiagnosticKind::Check);
    assert!(diag.message.contains("undefined variable `countdown`"));
}

#[test]
fn free_functions_pass_as_pointer_arguments() {
    let value = eval(
        r#"
        fn add(a: int, b: int) -> int { return a + b; }
        fn apply(op: fn(int, int) -> int, x: int) -> int {
            return op(op(x, x), x);
        }
        return apply(add, 5);
        "#,
    );
    assert_eq!(expect_int(&value), 15);
}

// ---- capture semantics ----------------------------------------------------

#[test]
fn by_value_capture_snapshots_at_creation() {
    let value = eval(
        r#"
        var mut base = 1;
        var f = [base]() -> int { return base; };
        base = 5;
        return f();
        "#,
    );
    assert_eq!(expect_int(&value), 1);
}

#[test]
fn by_reference_capture_aliases_the_original() {
    let value = eval(
        r#"
        var mut hits = 0;
        var record = [&hits]() { hits = hits + 1; };
        record();
        record();
        return hits;
        "#,
    );
    assert_eq!(expect_int(&value), 2);
}

#[test]
fn reference_capture_sees_later_writes() {
    let value = eval(
        r#"
        var mut base = 1;
        var f = [&base]() -> int { return base; };
        base = 7;
        return f();
        "#,
    );
    assert_eq!(expect_int(&value), 7);
}

#[test]
fn capture_all_by_value() {
    let value = eval(
        r#"
        var mut x = 2;
        var mut y = 3;
        var f = [=]() -> int { return x + y; };
        x = 100;
        return f();
        "#,
    );
    assert_eq!(expect_int(&value), 5);
}

#[test]
fn capture_all_by_reference() {
    let value = eval(
        r#"
        var mut x = 2;
        var f = [&]() { x = x * 10; };
        f();
        return x;
        "#,
    );
    assert_eq!(expect_int(&value), 20);
}

#[test]
fn mut_lambda_accumulates_through_one_binding() {
    let value = eval(
        r#"
        var mut seed = 10;
        var bump = [seed]() mut -> int {
            seed = seed + 1;
            return seed;
        };
        bump();
        bump();
        return bump();
        "#,
    );
    assert_eq!(expect_int(&value), 13);
    // The original is untouched.
    let original = eval(
        r#"
        var mut seed = 10;
        var bump = [seed]() mut -> int {
            seed = seed + 1;
            return seed;
        };
        bump();
        return seed;
        "#,
    );
    assert_eq!(expect_int(&original), 10);
}

#[test]
fn binding_a_closure_copies_its_state() {
    let value = eval(
        r#"
        var mut seed = 10;
        var a = [seed]() mut -> int {
            seed = seed + 1;
            return seed;
        };
        a();
        var b = a;
        a();
        a();
        return b();
        "#,
    );
    // b branched off after one call, so its own state advances from 11.
    assert_eq!(expect_int(&value), 12);
}

#[test]
fn uncaptured_outer_local_is_rejected() {
    let diag = eval_error(
        r#"
        var x = 1;
        var f = []() -> int { return x; };
        "#,
    );
    assert_eq!(diag.kind, DiagnosticKind::Check);
    assert!(diag.message.contains("`x` is not captured"));
}

#[test]
fn non_mut_lambda_cannot_write_a_value_capture() {
    let diag = eval_error(
        r#"
        var mut x = 1;
        var f = [x]() { x = 2; };
        "#,
    );
    assert_eq!(diag.kind, DiagnosticKind::Check);
    assert!(diag
        .message
        .contains("cannot assign to by-value capture `x` in a non-mut lambda"));
}

#[test]
fn reference_capture_respects_source_immutability() {
    let diag = eval_error(
        r#"
        var x = 1;
        var f = [&x]() { x = 2; };
        "#,
    );
    assert_eq!(diag.kind, DiagnosticKind::Check);
    assert!(diag
        .message
        .contains("cannot assign through reference capture of immutable binding `x`"));
}

#[test]
fn immutable_binding_rejects_assignment() {
    let diag = eval_error("var x = 1; x = 2;");
    assert_eq!(diag.kind, DiagnosticKind::Check);
    assert!(diag.message.contains("cannot assign to immutable binding `x`"));
}

// ---- functors -------------------------------------------------------------

#[test]
fn functor_state_persists_across_invocations() {
    let value = eval(
        r#"
        functor Counter(count: int)(step: int) -> int {
            count = count + step;
            return count;
        }
        var c = Counter(0);
        c(5);
        c(5);
        return c(5);
        "#,
    );
    assert_eq!(expect_int(&value), 15);
}

#[test]
fn binding_a_functor_copies_its_fields() {
    let value = eval(
        r#"
        functor Counter(count: int)(step: int) -> int {
            count = count + step;
            return count;
        }
        var c = Counter(0);
        c(1);
        c(1);
        var d = c;
        c(1);
        c(1);
        return d(1);
        "#,
    );
    assert_eq!(expect_int(&value), 3);
}

// ---- return-type resolution -----------------------------------------------

#[test]
fn return_disagreement_is_rejected_at_definition_time() {
    // Never invoked, rejected anyway.
    let diag = eval_error(
        r#"
        fn weird(flag: bool) {
            if flag { return 1; }
            return 1.5;
        }
        "#,
    );
    assert_eq!(diag.kind, DiagnosticKind::Check);
    assert!(diag.message.contains("return statements disagree"));
}

#[test]
fn explicit_return_type_permits_int_widening() {
    let value = eval(
        r#"
        fn pick(flag: bool) -> float {
            if flag { return 1; }
            return 1.5;
        }
        return to_int(pick(true) * 10.0);
        "#,
    );
    assert_eq!(expect_int(&value), 10);
}

#[test]
fn lambda_return_disagreement_is_rejected() {
    let diag = eval_error(
        r#"
        var f = [](flag: bool) {
            if flag { return 1; }
            return "one";
        };
        "#,
    );
    assert_eq!(diag.kind, DiagnosticKind::Check);
    assert!(diag.message.contains("return statements disagree"));
}

// ---- function pointers ----------------------------------------------------

#[test]
fn pointer_accepts_free_function_and_plain_lambda() {
    let value = eval(
        r#"
        fn inc(n: int) -> int { return n + 1; }
        var p: fn(int) -> int = inc;
        var q: fn(int) -> int = [](n: int) -> int { return n * 2; };
        return p(1) + q(4);
        "#,
    );
    assert_eq!(expect_int(&value), 10);
}

#[test]
fn pointer_rejects_capturing_lambda() {
    let diag = eval_error(
        r#"
        var mut x = 1;
        var p: fn(int) -> int = [x](n: int) -> int { return n + x; };
        "#,
    );
    assert_eq!(diag.kind, DiagnosticKind::Check);
    assert!(diag
        .message
        .contains("a capturing lambda cannot be assigned to a function pointer"));
}

#[test]
fn pointer_rejects_functor_instance() {
    let diag = eval_error(
        r#"
        functor Scaler(k: int)(n: int) -> int { return n * k; }
        var p: fn(int) -> int = Scaler(2);
        "#,
    );
    assert_eq!(diag.kind, DiagnosticKind::Check);
    assert!(diag
        .message
        .contains("a functor instance cannot be assigned to a function pointer"));
}

// ---- function boxes -------------------------------------------------------

#[test]
fn box_holds_any_callable_of_the_signature() {
    let value = eval(
        r#"
        functor Scaler(k: int)(n: int) -> int { return n * k; }
        fn triple(n: int) -> int { return n * 3; }
        var mut op: box fn(int) -> int;
        op = triple;
        var a = op(7);
        op = Scaler(10);
        var b = op(7);
        op = [](n: int) -> int { return n + 1; };
        return a + b + op(7);
        "#,
    );
    assert_eq!(expect_int(&value), 21 + 70 + 8);
}

#[test]
fn box_dispatches_to_the_most_recent_assignment() {
    let value = eval(
        r#"
        fn add(a: int, b: int) -> int { return a + b; }
        var mut op: box fn(int, int) -> int;
        op = add;
        var first = op(2, 3);
        op = [](a: int, b: int) -> int { return a * b; };
        return first * 10 + op(2, 3);
        "#,
    );
    assert_eq!(expect_int(&value), 56);
}

#[test]
fn box_accepts_a_capturing_lambda() {
    let value = eval(
        r#"
        var mut bias = 100;
        var mut op: box fn(int) -> int;
        op = [&bias](n: int) -> int { return n + bias; };
        bias = 200;
        return op(7);
        "#,
    );
    assert_eq!(expect_int(&value), 207);
}

#[test]
fn box_accepts_a_native_function() {
    let value = eval(
        r#"
        var mut op: box fn(int) -> int;
        op = abs;
        return op(-9);
        "#,
    );
    assert_eq!(expect_int(&value), 9);
}

#[test]
fn box_signature_mismatch_is_rejected_at_assignment() {
    let diag = eval_error(
        r#"
        fn add(a: int, b: int) -> int { return a + b; }
        var mut op: box fn(int) -> int;
        op = add;
        "#,
    );
    assert_eq!(diag.kind, DiagnosticKind::Check);
    assert!(diag.message.contains("signature mismatch: box expects"));
}

#[test]
fn invoking_an_empty_box_is_its_own_error() {
    let diag = eval_error(
        r#"
        var op: box fn(int) -> int;
        op(3);
        "#,
    );
    assert_eq!(diag.kind, DiagnosticKind::Runtime);
    assert!(diag.message.contains("empty function box invoked"));
    assert!(!diag.message.contains("not callable"));
}

#[test]
fn non_box_binding_requires_an_initializer() {
    let diag = eval_error("var x: int;");
    assert_eq!(diag.kind, DiagnosticKind::Check);
    assert!(diag.message.contains("requires an initializer"));
}

#[test]
fn storing_into_a_box_copies_closure_state() {
    let value = eval(
        r#"
        var mut seed = 0;
        var tick = [seed]() mut -> int {
            seed = seed + 1;
            return seed;
        };
        tick();
        var mut op: box fn() -> int;
        op = tick;
        tick();
        return op();
        "#,
    );
    // The box branched off after one call.
    assert_eq!(expect_int(&value), 2);
}

#[test]
fn functions_can_return_boxed_closures() {
    let value = eval(
        r#"
        fn make_adder(k: int) -> box fn(int) -> int {
            return [k](n: int) -> int { return n + k; };
        }
        var add5 = make_adder(5);
        return add5(3);
        "#,
    );
    assert_eq!(expect_int(&value), 8);
}

// ---- natives and sessions -------------------------------------------------

#[test]
fn typed_natives_compose() {
    let value = eval("return max(3, min(10, 7));");
    assert_eq!(expect_int(&value), 7);
}

#[test]
fn numeric_conversions_round_trip() {
    let value = eval("return to_int(sqrt(to_float(49)));");
    assert_eq!(expect_int(&value), 7);
}

#[test]
fn definitions_persist_across_eval_calls() {
    let mut interpreter = Interpreter::new();
    interpreter
        .eval_source("fn inc(n: int) -> int { return n + 1; }")
        .expect("define function");
    interpreter
        .eval_source("var mut x = 1;")
        .expect("define variable");
    interpreter.eval_source("x = inc(x);").expect("assign");
    let value = interpreter.eval_source("x").expect("read variable");
    assert_eq!(expect_int(&value), 2);
}

#[test]
fn rejected_line_leaves_the_session_intact() {
    let mut interpreter = Interpreter::new();
    interpreter.eval_source("var mut x = 1;").expect("define");
    assert!(interpreter.eval_source("x = true;").is_err());
    let value = interpreter.eval_source("x").expect("read variable");
    assert_eq!(expect_int(&value), 1);
}

#[test]
fn duplicate_definitions_are_rejected() {
    let diag = eval_error(
        r#"
        fn f() -> int { return 1; }
        fn f() -> int { return 2; }
        "#,
    );
    assert_eq!(diag.kind, DiagnosticKind::Check);
    assert!(diag.message.contains("`f` is already defined"));
}

#[test]
fn nested_declarations_are_rejected() {
    let diag = eval_error(
        r#"
        fn outer() -> int {
            fn inner() -> int { return 1; }
            return inner();
        }
        "#,
    );
    assert_eq!(diag.kind, DiagnosticKind::Parser);
    assert!(diag.message.contains("only allowed at top level"));
}
