use std::{cell::RefCell, rc::Rc};

use crate::{
    ast::{
        self, BinaryOp, CaptureMode, CaptureSpec, Expr, ExprKind, Literal, Program, Stmt, StmtKind,
        UnaryOp,
    },
    check::{self, CheckContext},
    diagnostics::{CallaError, Diagnostic, DiagnosticKind, Result, SourceSpan},
    environment::{Environment, EnvironmentRef},
    parser,
    types::Signature,
    value::{
        BoxValue, Callable, CapturedVar, ClosureValue, FunctorInstance, Value, ValueKind,
    },
};

pub struct Interpreter {
    globals: EnvironmentRef,
    env: EnvironmentRef,
    check_ctx: CheckContext,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        let globals = Environment::new();
        crate::stdlib::install(&globals);
        // Top-level statements evaluate in a child scope so that top-level
        // bindings are capturable locals, while functions, functors, and
        // natives stay global.
        let env = Environment::with_parent(Rc::clone(&globals));
        Self {
            globals,
            env,
            check_ctx: CheckContext::new(),
        }
    }

    pub fn eval_source(&mut self, source: &str) -> Result<Value> {
        let program = parser::parse_program(source).map_err(CallaError::from)?;
        check::check_program(&program, &mut self.check_ctx).map_err(CallaError::from)?;
        self.eval_program(program)
    }

    pub fn eval_program(&mut self, program: Program) -> Result<Value> {
        let mut last_value: Option<Value> = None;
        for item in program.items {
            match &item.kind {
                StmtKind::Function(decl) => {
                    self.globals.borrow_mut().define(
                        decl.name.clone(),
                        Value::callable(Callable::Function(Rc::clone(decl))),
                    );
                }
                StmtKind::Functor(decl) => {
                    self.globals.borrow_mut().define(
                        decl.name.clone(),
                        Value::new(ValueKind::Constructor(Rc::clone(decl))),
                    );
                }
                _ => match self.execute_statement(&item)? {
                    FlowControl::Next => {}
                    FlowControl::NextValue(value) => {
                        last_value = Some(value);
                    }
                    FlowControl::Return(value) => return Ok(value),
                    FlowControl::Break | FlowControl::Continue => {
                        return Err(CallaError::from(Diagnostic::new(
                            DiagnosticKind::Runtime,
                            "loop control flow outside loop",
                        )));
                    }
                },
            }
        }
        Ok(last_value.unwrap_or_else(Value::unit))
    }

    fn execute_statement(&mut self, stmt: &Stmt) -> Result<FlowControl> {
        match &stmt.kind {
            StmtKind::VarDecl {
                name,
                annotation,
                initializer,
                ..
            } => {
                let box_signature = annotation
                    .as_ref()
                    .and_then(|ann| crate::types::Type::from_expr(ann).ok())
                    .and_then(|ty| match ty {
                        crate::types::Type::BoxFn(sig) => Some(sig),
                        _ => None,
                    });
                let value = match (box_signature, initializer) {
                    (Some(signature), None) => {
                        Value::new(ValueKind::Box(BoxValue::empty(signature)))
                    }
                    (Some(signature), Some(expr)) => {
                        let value = self.evaluate(expr)?;
                        self.box_store(signature, &value, expr.span)?
                    }
                    (None, Some(expr)) => self.evaluate(expr)?.instance_copy(),
                    (None, None) => Value::unit(),
                };
                self.env.borrow_mut().define(name.clone(), value);
                Ok(FlowControl::Next)
            }
            StmtKind::Expr(expr) => {
                let value = self.evaluate(expr)?;
                Ok(FlowControl::NextValue(value))
            }
            StmtKind::Block(statements) => self.execute_block(statements),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let cond = self.evaluate(condition)?;
                if cond.expect_bool(condition.span)? {
                    self.execute_block(then_branch)
                } else if let Some(branch) = else_branch {
                    self.execute_block(branch)
                } else {
                    Ok(FlowControl::Next)
                }
            }
            StmtKind::While { condition, body } => {
                loop {
                    let cond = self.evaluate(condition)?;
                    if !cond.expect_bool(condition.span)? {
                        break;
                    }
                    match self.execute_block(body)? {
                        FlowControl::Next | FlowControl::NextValue(_) => {}
                        FlowControl::Continue => continue,
                        FlowControl::Break => break,
                        FlowControl::Return(value) => return Ok(FlowControl::Return(value)),
                    }
                }
                Ok(FlowControl::Next)
            }
            StmtKind::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::unit(),
                };
                Ok(FlowControl::Return(value))
            }
            StmtKind::Break => Ok(FlowControl::Break),
            StmtKind::Continue => Ok(FlowControl::Continue),
            StmtKind::Function(_) | StmtKind::Functor(_) => Err(CallaError::from(
                Diagnostic::new(
                    DiagnosticKind::Runtime,
                    "declarations are only allowed at top level",
                )
                .with_span(stmt.span),
            )),
        }
    }

    fn execute_block(&mut self, statements: &[Stmt]) -> Result<FlowControl> {
        let child = Environment::with_parent(Rc::clone(&self.env));
        let prev = Rc::clone(&self.env);
        self.env = child;
        let mut last_value: Option<Value> = None;
        for stmt in statements {
            let flow = match self.execute_statement(stmt) {
                Ok(flow) => flow,
                Err(err) => {
                    self.env = prev;
                    return Err(err);
                }
            };
            match flow {
                FlowControl::Next => {}
                FlowControl::NextValue(value) => {
                    last_value = Some(value);
                }
                other => {
                    self.env = prev;
                    return Ok(other);
                }
            }
        }
        self.env = prev;
        if let Some(value) = last_value {
            Ok(FlowControl::NextValue(value))
        } else {
            Ok(FlowControl::Next)
        }
    }

    fn evaluate(&mut self, expr: &Expr) -> Result<Value> {
        match &expr.kind {
            ExprKind::Literal(lit) => Ok(self.literal(lit)),
            ExprKind::Variable(name) => Environment::get(&self.env, name, expr.span),
            ExprKind::Binary {
                op: op @ (BinaryOp::And | BinaryOp::Or),
                left,
                right,
            } => {
                let lhs = self.evaluate(left)?.expect_bool(left.span)?;
                // Short-circuit: the right operand only runs when needed.
                let result = match op {
                    BinaryOp::And if !lhs => false,
                    BinaryOp::Or if lhs => true,
                    _ => self.evaluate(right)?.expect_bool(right.span)?,
                };
                Ok(Value::bool(result))
            }
            ExprKind::Binary { op, left, right } => {
                let left_value = self.evaluate(left)?;
                let right_value = self.evaluate(right)?;
                self.binary(op, left_value, right_value, expr.span)
            }
            ExprKind::Unary { op, expr: right } => {
                let value = self.evaluate(right)?;
                self.unary(op, value, expr.span)
            }
            ExprKind::Assign { target, value } => {
                let value = self.evaluate(value)?;
                let ExprKind::Variable(name) = &target.kind else {
                    return Err(CallaError::from(
                        Diagnostic::new(DiagnosticKind::Runtime, "invalid assignment target")
                            .with_span(target.span),
                    ));
                };
                let slot = Environment::slot(&self.env, name).ok_or_else(|| {
                    CallaError::from(
                        Diagnostic::new(
                            DiagnosticKind::Runtime,
                            format!("undefined variable `{name}`"),
                        )
                        .with_span(target.span),
                    )
                })?;
                // Assigning a callable into a box binding replaces the held
                // callable rather than the binding itself.
                let stored = {
                    let current = slot.borrow();
                    if let ValueKind::Box(existing) = &*current.0 {
                        self.box_store(existing.signature.clone(), &value, target.span)?
                    } else {
                        value.instance_copy()
                    }
                };
                *slot.borrow_mut() = stored.clone();
                Ok(stored)
            }
            ExprKind::Call { callee, args } => {
                let callee_value = self.evaluate(callee)?;
                let mut eval_args = Vec::new();
                for arg in args {
                    eval_args.push(self.evaluate(arg)?);
                }
                self.call(callee_value, eval_args, expr.span)
            }
            ExprKind::Group(inner) => self.evaluate(inner),
            ExprKind::Lambda(lambda) => {
                let captures = self.resolve_captures(lambda, expr.span)?;
                Ok(Value::callable(Callable::Closure(Rc::new(ClosureValue {
                    lambda: Rc::clone(lambda),
                    captures,
                }))))
            }
        }
    }

    /// Builds the capture set at lambda-creation time. By-value captures
    /// snapshot the current value into fresh storage; by-reference captures
    /// alias the original slot. Capture-all forms enumerate the body's free
    /// variables and capture every one that resolves to a local.
    fn resolve_captures(
        &mut self,
        lambda: &Rc<ast::LambdaExpr>,
        span: SourceSpan,
    ) -> Result<Vec<CapturedVar>> {
        let mut captures = Vec::new();
        for spec in &lambda.captures {
            match spec {
                CaptureSpec::All { mode, .. } => {
                    for name in ast::lambda_free_variables(lambda) {
                        if let Some(slot) =
                            Environment::slot_until(&self.env, &name, &self.globals)
                        {
                            captures.push(self.capture(name, *mode, slot));
                        }
                    }
                }
                CaptureSpec::Named { mode, name, .. } => {
                    let slot = Environment::slot_until(&self.env, name, &self.globals)
                        .ok_or_else(|| {
                            CallaError::from(
                                Diagnostic::new(
                                    DiagnosticKind::Runtime,
                                    format!("cannot capture `{name}`: no such local variable"),
                                )
                                .with_span(span),
                            )
                        })?;
                    captures.push(self.capture(name.clone(), *mode, slot));
                }
            }
        }
        Ok(captures)
    }

    fn capture(
        &self,
        name: String,
        mode: CaptureMode,
        slot: Rc<RefCell<Value>>,
    ) -> CapturedVar {
        let slot = match mode {
            CaptureMode::ByValue => Rc::new(RefCell::new(slot.borrow().instance_copy())),
            CaptureMode::ByReference => slot,
        };
        CapturedVar { name, mode, slot }
    }

    fn box_store(
        &self,
        signature: Signature,
        value: &Value,
        span: SourceSpan,
    ) -> Result<Value> {
        match &*value.0 {
            ValueKind::Callable(callable) => Ok(Value::new(ValueKind::Box(BoxValue::holding(
                signature,
                callable.clone(),
            )))),
            ValueKind::Box(other) => Ok(Value::new(ValueKind::Box(BoxValue {
                signature,
                held: other.held.as_ref().map(Callable::instance_copy),
            }))),
            _ => Err(CallaError::from(
                Diagnostic::new(
                    DiagnosticKind::Runtime,
                    format!("cannot store a {} in a box", value.type_name()),
                )
                .with_span(span),
            )),
        }
    }

    fn call(&mut self, callee: Value, args: Vec<Value>, span: SourceSpan) -> Result<Value> {
        match &*callee.0 {
            ValueKind::Callable(callable) => self.call_callable(callable, args, span),
            ValueKind::Constructor(decl) => {
                if args.len() != decl.fields.len() {
                    return Err(CallaError::from(
                        Diagnostic::new(
                            DiagnosticKind::Runtime,
                            format!(
                                "functor `{}` expected {} fields but received {}",
                                decl.name,
                                decl.fields.len(),
                                args.len()
                            ),
                        )
                        .with_span(span),
                    ));
                }
                let fields = decl
                    .fields
                    .iter()
                    .zip(args)
                    .map(|(field, arg)| {
                        (
                            field.name.clone(),
                            Rc::new(RefCell::new(arg.instance_copy())),
                        )
                    })
                    .collect();
                Ok(Value::callable(Callable::Functor(Rc::new(
                    FunctorInstance {
                        decl: Rc::clone(decl),
                        fields,
                    },
                ))))
            }
            ValueKind::Box(wrapper) => match &wrapper.held {
                Some(callable) => {
                    let callable = callable.clone();
                    self.call_callable(&callable, args, span)
                }
                // Distinct from the "value is not callable" failure.
                None => Err(CallaError::from(
                    Diagnostic::new(
                        DiagnosticKind::Runtime,
                        format!("empty function box invoked ({})", wrapper.signature),
                    )
                    .with_span(span),
                )),
            },
            _ => Err(CallaError::from(
                Diagnostic::new(DiagnosticKind::Runtime, "value is not callable").with_span(span),
            )),
        }
    }

    fn call_callable(
        &mut self,
        callable: &Callable,
        args: Vec<Value>,
        span: SourceSpan,
    ) -> Result<Value> {
        match callable {
            Callable::Native(native) => native.call(&args),
            Callable::Function(decl) => {
                self.check_arity(decl.params.len(), args.len(), span)?;
                let frame = Environment::with_parent(Rc::clone(&self.globals));
                for (param, arg) in decl.params.iter().zip(args) {
                    frame
                        .borrow_mut()
                        .define(param.name.clone(), arg.instance_copy());
                }
                let result = self.run_body(&decl.body, frame)?;
                Ok(widen_return(decl.return_type.as_ref(), result))
            }
            Callable::Closure(closure) => {
                self.check_arity(closure.lambda.params.len(), args.len(), span)?;
                let capture_frame = Environment::with_parent(Rc::clone(&self.globals));
                for cap in &closure.captures {
                    capture_frame
                        .borrow_mut()
                        .define_slot(cap.name.clone(), Rc::clone(&cap.slot));
                }
                let frame = Environment::with_parent(capture_frame);
                for (param, arg) in closure.lambda.params.iter().zip(args) {
                    frame
                        .borrow_mut()
                        .define(param.name.clone(), arg.instance_copy());
                }
                let result = self.run_body(&closure.lambda.body, frame)?;
                Ok(widen_return(closure.lambda.return_type.as_ref(), result))
            }
            Callable::Functor(instance) => {
                self.check_arity(instance.decl.params.len(), args.len(), span)?;
                let field_frame = Environment::with_parent(Rc::clone(&self.globals));
                for (name, slot) in &instance.fields {
                    field_frame
                        .borrow_mut()
                        .define_slot(name.clone(), Rc::clone(slot));
                }
                let frame = Environment::with_parent(field_frame);
                for (param, arg) in instance.decl.params.iter().zip(args) {
                    frame
                        .borrow_mut()
                        .define(param.name.clone(), arg.instance_copy());
                }
                let result = self.run_body(&instance.decl.body, frame)?;
                Ok(widen_return(instance.decl.return_type.as_ref(), result))
            }
        }
    }

    fn check_arity(&self, expected: usize, received: usize, span: SourceSpan) -> Result<()> {
        if expected != received {
            return Err(CallaError::from(
                Diagnostic::new(
                    DiagnosticKind::Runtime,
                    format!("expected {expected} arguments but received {received}"),
                )
                .with_span(span),
            ));
        }
        Ok(())
    }

    /// Runs a callable body. Results come only from `return`; falling off the
    /// end yields unit.
    fn run_body(&mut self, body: &[Stmt], env: EnvironmentRef) -> Result<Value> {
        let prev = Rc::clone(&self.env);
        self.env = env;
        let mut result = Value::unit();
        for stmt in body {
            let flow = match self.execute_statement(stmt) {
                Ok(flow) => flow,
                Err(err) => {
                    self.env = prev;
                    return Err(err);
                }
            };
            match flow {
                FlowControl::Next | FlowControl::NextValue(_) => {}
                FlowControl::Return(value) => {
                    result = value;
                    break;
                }
                FlowControl::Break | FlowControl::Continue => {
                    self.env = prev;
                    return Err(CallaError::from(Diagnostic::new(
                        DiagnosticKind::Runtime,
                        "loop control flow cannot escape a callable body",
                    )));
                }
            }
        }
        self.env = prev;
        Ok(result)
    }

    fn literal(&self, literal: &Literal) -> Value {
        match literal {
            Literal::Int(n) => Value::int(*n),
            Literal::Float(n) => Value::float(*n),
            Literal::Bool(b) => Value::bool(*b),
            Literal::Str(s) => Value::string(s.clone()),
            Literal::Unit => Value::unit(),
        }
    }

    fn binary(&self, op: &BinaryOp, left: Value, right: Value, span: SourceSpan) -> Result<Value> {
        use BinaryOp::*;
        match op {
            Add => {
                if let (ValueKind::Str(a), ValueKind::Str(b)) = (&*left.0, &*right.0) {
                    return Ok(Value::string(format!("{a}{b}")));
                }
                self.arithmetic(left, right, span, i64::checked_add, |a, b| a + b)
            }
            Sub => self.arithmetic(left, right, span, i64::checked_sub, |a, b| a - b),
            Mul => self.arithmetic(left, right, span, i64::checked_mul, |a, b| a * b),
            Div => self.arithmetic(left, right, span, i64::checked_div, |a, b| a / b),
            Mod => self.arithmetic(left, right, span, i64::checked_rem, |a, b| a % b),
            Equal => Ok(Value::bool(self.equal(&left, &right))),
            NotEqual => Ok(Value::bool(!self.equal(&left, &right))),
            Less => self.comparison(left, right, span, |a, b| a < b),
            LessEqual => self.comparison(left, right, span, |a, b| a <= b),
            Greater => self.comparison(left, right, span, |a, b| a > b),
            GreaterEqual => self.comparison(left, right, span, |a, b| a >= b),
            And | Or => Err(CallaError::from(
                Diagnostic::new(DiagnosticKind::Runtime, "logical operator not short-circuited")
                    .with_span(span),
            )),
        }
    }

    fn unary(&self, op: &UnaryOp, value: Value, span: SourceSpan) -> Result<Value> {
        match op {
            UnaryOp::Negate => match &*value.0 {
                ValueKind::Int(n) => n.checked_neg().map(Value::int).ok_or_else(|| {
                    CallaError::from(
                        Diagnostic::new(DiagnosticKind::Runtime, "integer arithmetic failed")
                            .with_note("overflow or division by zero")
                            .with_span(span),
                    )
                }),
                ValueKind::Float(n) => Ok(Value::float(-n)),
                _ => Err(CallaError::from(
                    Diagnostic::new(DiagnosticKind::Runtime, "unary `-` expects numeric value")
                        .with_span(span),
                )),
            },
            UnaryOp::Not => Ok(Value::bool(!value.expect_bool(span)?)),
        }
    }

    fn arithmetic<I, F>(
        &self,
        left: Value,
        right: Value,
        span: SourceSpan,
        int_op: I,
        float_op: F,
    ) -> Result<Value>
    where
        I: Fn(i64, i64) -> Option<i64>,
        F: Fn(f64, f64) -> f64,
    {
        match (&*left.0, &*right.0) {
            (ValueKind::Int(a), ValueKind::Int(b)) => {
                int_op(*a, *b).map(Value::int).ok_or_else(|| {
                    CallaError::from(
                        Diagnostic::new(DiagnosticKind::Runtime, "integer arithmetic failed")
                            .with_note("overflow or division by zero")
                            .with_span(span),
                    )
                })
            }
            _ => {
                let a = self.number(&left, span)?;
                let b = self.number(&right, span)?;
                Ok(Value::float(float_op(a, b)))
            }
        }
    }

    fn comparison<F>(&self, left: Value, right: Value, span: SourceSpan, cmp: F) -> Result<Value>
    where
        F: Fn(f64, f64) -> bool,
    {
        let left_num = self.number(&left, span)?;
        let right_num = self.number(&right, span)?;
        Ok(Value::bool(cmp(left_num, right_num)))
    }

    fn number(&self, value: &Value, span: SourceSpan) -> Result<f64> {
        match &*value.0 {
            ValueKind::Int(n) => Ok(*n as f64),
            ValueKind::Float(n) => Ok(*n),
            _ => Err(CallaError::from(
                Diagnostic::new(
                    DiagnosticKind::Runtime,
                    format!("expected numeric value, found {}", value.type_name()),
                )
                .with_span(span),
            )),
        }
    }

    fn equal(&self, left: &Value, right: &Value) -> bool {
        match (&*left.0, &*right.0) {
            (ValueKind::Unit, ValueKind::Unit) => true,
            (ValueKind::Bool(a), ValueKind::Bool(b)) => a == b,
            (ValueKind::Int(a), ValueKind::Int(b)) => a == b,
            (ValueKind::Float(a), ValueKind::Float(b)) => (*a - *b).abs() < f64::EPSILON,
            (ValueKind::Str(a), ValueKind::Str(b)) => a == b,
            _ => false,
        }
    }
}

/// An explicit `float` return type accepts `int` returns; the widening
/// happens here so callers always observe a float.
fn widen_return(annotation: Option<&ast::TypeExpr>, value: Value) -> Value {
    if let (Some(ann), ValueKind::Int(n)) = (annotation, &*value.0) {
        if matches!(crate::types::Type::from_expr(ann), Ok(crate::types::Type::Float)) {
            return Value::float(*n as f64);
        }
    }
    value
}

enum FlowControl {
    Next,
    NextValue(Value),
    Return(Value),
    Break,
    Continue,
}
