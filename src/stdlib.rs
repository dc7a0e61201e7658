//! Built-in functions. Typed natives behave like free functions and can be
//! stored in boxes and function-pointer bindings; the variadic printers are
//! callable only by name.

use crate::{
    diagnostics::{CallaError, Diagnostic, DiagnosticKind},
    environment::EnvironmentRef,
    types::{Signature, Type},
    value::{Callable, NativeFunction, Value, ValueKind},
};

pub fn natives() -> Vec<NativeFunction> {
    vec![
        NativeFunction {
            name: "print",
            signature: Signature::new(vec![Type::Any], Type::Unit),
            variadic: true,
            callback: |args| {
                print!("{}", join(args));
                Ok(Value::unit())
            },
        },
        NativeFunction {
            name: "println",
            signature: Signature::new(vec![Type::Any], Type::Unit),
            variadic: true,
            callback: |args| {
                println!("{}", join(args));
                Ok(Value::unit())
            },
        },
        NativeFunction {
            name: "dbg",
            signature: Signature::new(vec![Type::Any], Type::Any),
            variadic: false,
            callback: |args| {
                eprintln!("{:?}", args[0]);
                Ok(args[0].clone())
            },
        },
        NativeFunction {
            name: "abs",
            signature: Signature::new(vec![Type::Int], Type::Int),
            variadic: false,
            callback: |args| Ok(Value::int(int_arg(args, 0)?.abs())),
        },
        NativeFunction {
            name: "min",
            signature: Signature::new(vec![Type::Int, Type::Int], Type::Int),
            variadic: false,
            callback: |args| Ok(Value::int(int_arg(args, 0)?.min(int_arg(args, 1)?))),
        },
        NativeFunction {
            name: "max",
            signature: Signature::new(vec![Type::Int, Type::Int], Type::Int),
            variadic: false,
            callback: |args| Ok(Value::int(int_arg(args, 0)?.max(int_arg(args, 1)?))),
        },
        NativeFunction {
            name: "sqrt",
            signature: Signature::new(vec![Type::Float], Type::Float),
            variadic: false,
            callback: |args| Ok(Value::float(float_arg(args, 0)?.sqrt())),
        },
        NativeFunction {
            name: "to_float",
            signature: Signature::new(vec![Type::Int], Type::Float),
            variadic: false,
            callback: |args| Ok(Value::float(int_arg(args, 0)? as f64)),
        },
        NativeFunction {
            name: "to_int",
            signature: Signature::new(vec![Type::Float], Type::Int),
            variadic: false,
            callback: |args| Ok(Value::int(float_arg(args, 0)? as i64)),
        },
    ]
}

pub fn install(env: &EnvironmentRef) {
    let mut env = env.borrow_mut();
    for native in natives() {
        env.define(
            native.name.to_string(),
            Value::callable(Callable::Native(native)),
        );
    }
}

fn join(args: &[Value]) -> String {
    args.iter()
        .map(|value| value.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn int_arg(args: &[Value], idx: usize) -> Result<i64, CallaError> {
    match args.get(idx).map(|value| &*value.0) {
        Some(ValueKind::Int(n)) => Ok(*n),
        other => Err(type_error("int", other)),
    }
}

fn float_arg(args: &[Value], idx: usize) -> Result<f64, CallaError> {
    match args.get(idx).map(|value| &*value.0) {
        Some(ValueKind::Float(n)) => Ok(*n),
        other => Err(type_error("float", other)),
    }
}

fn type_error(expected: &str, found: Option<&ValueKind>) -> CallaError {
    let found = match found {
        Some(ValueKind::Unit) => "unit",
        Some(ValueKind::Bool(_)) => "bool",
        Some(ValueKind::Int(_)) => "int",
        Some(ValueKind::Float(_)) => "float",
        Some(ValueKind::Str(_)) => "str",
        Some(ValueKind::Callable(_)) => "callable",
        Some(ValueKind::Constructor(_)) => "functor",
        Some(ValueKind::Box(_)) => "box",
        None => "nothing",
    };
    CallaError::from(Diagnostic::new(
        DiagnosticKind::Runtime,
        format!("expected `{expected}`, found {found}"),
    ))
}
