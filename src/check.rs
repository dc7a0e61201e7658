//! Definition-time checking. Runs between parsing and evaluation and rejects
//! every program the semantic rules call ill-formed: return-type
//! disagreements, signature mismatches on box and function-pointer
//! assignment, capturing-lambda-to-pointer assignment, references to
//! uncaptured outer locals, and writes through captures that do not permit
//! them. The evaluator assumes a checked program.

use std::collections::HashMap;

use crate::{
    ast::{
        BinaryOp, CaptureMode, CaptureSpec, Expr, ExprKind, FunctionDecl, FunctorDecl, LambdaExpr,
        Literal, Param, Program, Stmt, StmtKind, UnaryOp,
    },
    diagnostics::{Diagnostic, DiagnosticKind, SourceSpan},
    stdlib,
    types::{self, CallableKind, Signature, Type},
};

/// Definitions and top-level bindings seen by the checker so far. The
/// evaluator keeps one of these alive across `eval_source` calls so that a
/// REPL line can refer to names introduced by earlier lines.
pub struct CheckContext {
    globals: HashMap<String, Global>,
    script: HashMap<String, Local>,
}

impl CheckContext {
    pub fn new() -> Self {
        let mut globals = HashMap::new();
        for native in stdlib::natives() {
            let kind = if native.variadic {
                GlobalKind::Variadic
            } else {
                GlobalKind::Value
            };
            globals.insert(
                native.name.to_string(),
                Global {
                    ty: Type::Callable {
                        kind: CallableKind::Function,
                        signature: native.signature.clone(),
                    },
                    kind,
                },
            );
        }
        Self {
            globals,
            script: HashMap::new(),
        }
    }
}

impl Default for CheckContext {
    fn default() -> Self {
        Self::new()
    }
}

pub fn check_program(program: &Program, ctx: &mut CheckContext) -> Result<(), Diagnostic> {
    let mut checker = Checker::new(ctx);
    for item in &program.items {
        match &item.kind {
            StmtKind::Function(decl) => checker.check_function(decl)?,
            StmtKind::Functor(decl) => checker.check_functor(decl)?,
            _ => checker.check_stmt(item)?,
        }
    }
    // Only a fully checked program updates the context; a rejected one
    // leaves no trace.
    ctx.globals = checker.globals;
    if let Some(frame) = checker.frames.first_mut() {
        if let Some(scope) = frame.scopes.first_mut() {
            ctx.script = std::mem::take(scope);
        }
    }
    Ok(())
}

fn err(message: impl Into<String>, span: SourceSpan) -> Diagnostic {
    Diagnostic::new(DiagnosticKind::Check, message).with_span(span)
}

#[derive(Clone)]
struct Local {
    ty: Type,
    mutable: bool,
}

#[derive(Clone)]
enum GlobalKind {
    /// An ordinary value binding: a free function or a typed native.
    Value,
    /// A variadic native; callable but not usable as a value.
    Variadic,
    /// A functor declaration; `Name(args)` instantiates it.
    Ctor { fields: Vec<Type> },
}

#[derive(Clone)]
struct Global {
    ty: Type,
    kind: GlobalKind,
}

struct CapturedInfo {
    name: String,
    mode: CaptureMode,
    ty: Type,
    assignable: bool,
}

enum FrameKind {
    /// Top-level script statements.
    Script,
    /// A free-function or functor body; sees only its own scopes and globals.
    Function,
    Lambda {
        captures: Vec<CapturedInfo>,
        capture_all: Option<CaptureMode>,
        mutable: bool,
    },
}

struct Frame {
    kind: FrameKind,
    scopes: Vec<HashMap<String, Local>>,
    returns: Vec<(Type, SourceSpan)>,
    declared_return: Option<Type>,
    loop_depth: usize,
}

impl Frame {
    fn new(kind: FrameKind, declared_return: Option<Type>) -> Self {
        Self {
            kind,
            scopes: vec![HashMap::new()],
            returns: Vec::new(),
            declared_return,
            loop_depth: 0,
        }
    }
}

enum Resolution {
    Local {
        ty: Type,
        mutable: bool,
    },
    Capture {
        ty: Type,
        mode: CaptureMode,
        assignable: bool,
    },
    Global {
        ty: Type,
        kind: GlobalKind,
    },
}

struct Checker {
    globals: HashMap<String, Global>,
    frames: Vec<Frame>,
}

impl Checker {
    fn new(ctx: &CheckContext) -> Self {
        let mut script = Frame::new(FrameKind::Script, None);
        script.scopes[0] = ctx.script.clone();
        Self {
            globals: ctx.globals.clone(),
            frames: vec![script],
        }
    }

    fn frame(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("frame stack is never empty")
    }

    fn declare(&mut self, name: &str, ty: Type, mutable: bool) {
        self.frame()
            .scopes
            .last_mut()
            .expect("scope stack is never empty")
            .insert(name.to_string(), Local { ty, mutable });
    }

    fn declare_global(&mut self, name: &str, global: Global, span: SourceSpan) -> Result<(), Diagnostic> {
        if self.globals.contains_key(name) {
            return Err(err(format!("`{name}` is already defined"), span));
        }
        self.globals.insert(name.to_string(), global);
        Ok(())
    }

    // ---- declarations ----------------------------------------------------

    fn check_function(&mut self, decl: &FunctionDecl) -> Result<(), Diagnostic> {
        let params = self.param_types(&decl.params)?;
        let declared = decl
            .return_type
            .as_ref()
            .map(Type::from_expr)
            .transpose()?;

        // With an explicit return type the function is visible to its own
        // body, so recursion works; with an inferred one it is not, mirroring
        // the rule that a deduced return type cannot depend on itself.
        if let Some(ret) = &declared {
            let signature = Signature::new(params.clone(), ret.clone());
            self.declare_global(
                &decl.name,
                Global {
                    ty: Type::Callable {
                        kind: CallableKind::Function,
                        signature,
                    },
                    kind: GlobalKind::Value,
                },
                decl.span,
            )?;
        }

        let frame = Frame::new(FrameKind::Function, declared.clone());
        self.frames.push(frame);
        for param in &decl.params {
            let ty = Type::from_expr(&param.annotation)?;
            self.declare(&param.name, ty, true);
        }
        let body_result = self.check_stmts(&decl.body);
        let frame = self.frames.pop().expect("frame stack is never empty");
        body_result?;
        let ret = self.finish_frame(frame, "function")?;

        if declared.is_none() {
            let signature = Signature::new(params, ret);
            self.declare_global(
                &decl.name,
                Global {
                    ty: Type::Callable {
                        kind: CallableKind::Function,
                        signature,
                    },
                    kind: GlobalKind::Value,
                },
                decl.span,
            )?;
        }
        Ok(())
    }

    fn check_functor(&mut self, decl: &FunctorDecl) -> Result<(), Diagnostic> {
        let fields = self.param_types(&decl.fields)?;
        let params = self.param_types(&decl.params)?;
        let declared = decl
            .return_type
            .as_ref()
            .map(Type::from_expr)
            .transpose()?;

        if let Some(ret) = &declared {
            let signature = Signature::new(params.clone(), ret.clone());
            self.declare_global(
                &decl.name,
                Global {
                    ty: Type::Callable {
                        kind: CallableKind::Functor,
                        signature,
                    },
                    kind: GlobalKind::Ctor {
                        fields: fields.clone(),
                    },
                },
                decl.span,
            )?;
        }

        let frame = Frame::new(FrameKind::Function, declared.clone());
        self.frames.push(frame);
        // Fields are ordinary mutable variables from the body's point of
        // view; their mutations persist on the instance.
        for field in &decl.fields {
            let ty = Type::from_expr(&field.annotation)?;
            self.declare(&field.name, ty, true);
        }
        self.frame().scopes.push(HashMap::new());
        for param in &decl.params {
            let ty = Type::from_expr(&param.annotation)?;
            self.declare(&param.name, ty, true);
        }
        let body_result = self.check_stmts(&decl.body);
        let frame = self.frames.pop().expect("frame stack is never empty");
        body_result?;
        let ret = self.finish_frame(frame, "functor")?;

        if declared.is_none() {
            let signature = Signature::new(params, ret);
            self.declare_global(
                &decl.name,
                Global {
                    ty: Type::Callable {
                        kind: CallableKind::Functor,
                        signature,
                    },
                    kind: GlobalKind::Ctor { fields },
                },
                decl.span,
            )?;
        }
        Ok(())
    }

    fn param_types(&self, params: &[Param]) -> Result<Vec<Type>, Diagnostic> {
        let mut seen = HashMap::new();
        for param in params {
            if seen.insert(param.name.clone(), ()).is_some() {
                return Err(err(
                    format!("duplicate parameter `{}`", param.name),
                    param.span,
                ));
            }
        }
        params
            .iter()
            .map(|param| Type::from_expr(&param.annotation))
            .collect()
    }

    /// Return-type resolution: an explicit annotation constrains every
    /// return (permitting only `int` → `float` widening); otherwise the
    /// result type is the unique common type of all return statements, and a
    /// disagreement is rejected here, never at invocation time.
    fn finish_frame(&self, frame: Frame, context: &str) -> Result<Type, Diagnostic> {
        if let Some(declared) = frame.declared_return {
            for (ty, span) in &frame.returns {
                let widened = declared == Type::Float && *ty == Type::Int;
                if !widened && self.check_assign_compatible(&declared, ty, *span).is_err() {
                    return Err(err(
                        format!("return type mismatch: expected `{declared}`, found `{ty}`"),
                        *span,
                    ));
                }
            }
            return Ok(declared);
        }
        let mut returns = frame.returns.iter();
        let Some((first, _)) = returns.next() else {
            return Ok(Type::Unit);
        };
        for (ty, span) in returns {
            if !types::matches(first, ty) {
                return Err(err(
                    format!("return statements disagree: `{first}` vs `{ty}`"),
                    *span,
                )
                .with_note(format!("add an explicit return type to the {context}")));
            }
        }
        Ok(first.clone())
    }

    // ---- name resolution -------------------------------------------------

    fn resolve_enclosing(&self, frame_idx: usize, name: &str) -> Option<(Type, bool)> {
        let frame = &self.frames[frame_idx];
        for scope in frame.scopes.iter().rev() {
            if let Some(local) = scope.get(name) {
                return Some((local.ty.clone(), local.mutable));
            }
        }
        if let FrameKind::Lambda {
            captures,
            capture_all,
            mutable,
        } = &frame.kind
        {
            if let Some(cap) = captures.iter().find(|cap| cap.name == name) {
                return Some((cap.ty.clone(), cap.assignable));
            }
            if let Some(mode) = capture_all {
                if frame_idx > 0 {
                    if let Some((ty, assignable)) = self.resolve_enclosing(frame_idx - 1, name) {
                        let assignable = match mode {
                            CaptureMode::ByValue => *mutable,
                            CaptureMode::ByReference => assignable,
                        };
                        return Some((ty, assignable));
                    }
                }
            }
        }
        None
    }

    fn resolve_name(&self, name: &str, span: SourceSpan) -> Result<Resolution, Diagnostic> {
        let idx = self.frames.len() - 1;
        let frame = &self.frames[idx];
        for scope in frame.scopes.iter().rev() {
            if let Some(local) = scope.get(name) {
                return Ok(Resolution::Local {
                    ty: local.ty.clone(),
                    mutable: local.mutable,
                });
            }
        }
        let mut in_lambda = false;
        if let FrameKind::Lambda {
            captures,
            capture_all,
            mutable,
        } = &frame.kind
        {
            in_lambda = true;
            if let Some(cap) = captures.iter().find(|cap| cap.name == name) {
                return Ok(Resolution::Capture {
                    ty: cap.ty.clone(),
                    mode: cap.mode,
                    assignable: cap.assignable,
                });
            }
            if let Some(mode) = capture_all {
                if idx > 0 {
                    if let Some((ty, assignable)) = self.resolve_enclosing(idx - 1, name) {
                        let assignable = match mode {
                            CaptureMode::ByValue => *mutable,
                            CaptureMode::ByReference => assignable,
                        };
                        return Ok(Resolution::Capture {
                            ty,
                            mode: *mode,
                            assignable,
                        });
                    }
                }
            }
        }
        if let Some(global) = self.globals.get(name) {
            return Ok(Resolution::Global {
                ty: global.ty.clone(),
                kind: global.kind.clone(),
            });
        }
        if in_lambda && idx > 0 && self.resolve_enclosing(idx - 1, name).is_some() {
            return Err(err(
                format!("`{name}` is not captured; add it to the capture list"),
                span,
            ));
        }
        Err(err(format!("undefined variable `{name}`"), span))
    }

    // ---- statements ------------------------------------------------------

    fn check_stmts(&mut self, stmts: &[Stmt]) -> Result<(), Diagnostic> {
        for stmt in stmts {
            self.check_stmt(stmt)?;
        }
        Ok(())
    }

    fn check_block(&mut self, stmts: &[Stmt]) -> Result<(), Diagnostic> {
        self.frame().scopes.push(HashMap::new());
        let result = self.check_stmts(stmts);
        self.frame().scopes.pop();
        result
    }

    fn check_stmt(&mut self, stmt: &Stmt) -> Result<(), Diagnostic> {
        match &stmt.kind {
            StmtKind::VarDecl {
                name,
                mutable,
                annotation,
                initializer,
            } => {
                let annotated = annotation.as_ref().map(Type::from_expr).transpose()?;
                let initialized = initializer
                    .as_ref()
                    .map(|expr| self.check_expr(expr).map(|ty| (ty, expr.span)))
                    .transpose()?;
                let ty = match (annotated, initialized) {
                    (Some(ty), Some((vt, span))) => {
                        self.check_assign_compatible(&ty, &vt, span)?;
                        ty
                    }
                    (Some(ty), None) => {
                        if !matches!(ty, Type::BoxFn(_)) {
                            return Err(err(
                                format!("binding `{name}` of type `{ty}` requires an initializer"),
                                stmt.span,
                            )
                            .with_note("only box bindings may start empty"));
                        }
                        ty
                    }
                    (None, Some((vt, _))) => vt,
                    (None, None) => {
                        return Err(err(
                            format!("binding `{name}` requires a type annotation or an initializer"),
                            stmt.span,
                        ));
                    }
                };
                self.declare(name, ty, *mutable);
                Ok(())
            }
            StmtKind::Expr(expr) => self.check_expr(expr).map(|_| ()),
            StmtKind::Block(stmts) => self.check_block(stmts),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let cond = self.check_expr(condition)?;
                if !types::matches(&Type::Bool, &cond) {
                    return Err(err(
                        format!("if condition must be `bool`, found `{cond}`"),
                        condition.span,
                    ));
                }
                self.check_block(then_branch)?;
                if let Some(branch) = else_branch {
                    self.check_block(branch)?;
                }
                Ok(())
            }
            StmtKind::While { condition, body } => {
                let cond = self.check_expr(condition)?;
                if !types::matches(&Type::Bool, &cond) {
                    return Err(err(
                        format!("while condition must be `bool`, found `{cond}`"),
                        condition.span,
                    ));
                }
                self.frame().loop_depth += 1;
                let result = self.check_block(body);
                self.frame().loop_depth -= 1;
                result
            }
            StmtKind::Return(expr) => {
                let ty = match expr {
                    Some(expr) => self.check_expr(expr)?,
                    None => Type::Unit,
                };
                let span = expr.as_ref().map(|e| e.span).unwrap_or(stmt.span);
                self.frame().returns.push((ty, span));
                Ok(())
            }
            StmtKind::Break => {
                if self.frame().loop_depth == 0 {
                    return Err(err("`break` outside loop", stmt.span));
                }
                Ok(())
            }
            StmtKind::Continue => {
                if self.frame().loop_depth == 0 {
                    return Err(err("`continue` outside loop", stmt.span));
                }
                Ok(())
            }
            StmtKind::Function(_) => Err(err(
                "function declarations are only allowed at top level",
                stmt.span,
            )),
            StmtKind::Functor(_) => Err(err(
                "functor declarations are only allowed at top level",
                stmt.span,
            )),
        }
    }

    // ---- expressions -----------------------------------------------------

    fn check_expr(&mut self, expr: &Expr) -> Result<Type, Diagnostic> {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(match literal {
                Literal::Int(_) => Type::Int,
                Literal::Float(_) => Type::Float,
                Literal::Bool(_) => Type::Bool,
                Literal::Str(_) => Type::Str,
                Literal::Unit => Type::Unit,
            }),
            ExprKind::Variable(name) => match self.resolve_name(name, expr.span)? {
                Resolution::Local { ty, .. } | Resolution::Capture { ty, .. } => Ok(ty),
                Resolution::Global { ty, kind } => match kind {
                    GlobalKind::Value => Ok(ty),
                    GlobalKind::Variadic => Err(err(
                        format!("native `{name}` cannot be used as a value; call it directly"),
                        expr.span,
                    )),
                    GlobalKind::Ctor { .. } => Err(err(
                        format!("functor `{name}` must be instantiated before use"),
                        expr.span,
                    )),
                },
            },
            ExprKind::Unary { op, expr: inner } => {
                let ty = self.check_expr(inner)?;
                match op {
                    UnaryOp::Negate => {
                        if ty.is_numeric() {
                            Ok(ty)
                        } else {
                            Err(err(
                                format!("unary `-` expects a numeric operand, found `{ty}`"),
                                inner.span,
                            ))
                        }
                    }
                    UnaryOp::Not => {
                        if types::matches(&Type::Bool, &ty) {
                            Ok(Type::Bool)
                        } else {
                            Err(err(
                                format!("unary `!` expects `bool`, found `{ty}`"),
                                inner.span,
                            ))
                        }
                    }
                }
            }
            ExprKind::Binary { op, left, right } => {
                let lt = self.check_expr(left)?;
                let rt = self.check_expr(right)?;
                self.check_binary(op, &lt, &rt, expr.span)
            }
            ExprKind::Assign { target, value } => {
                let vt = self.check_expr(value)?;
                let ExprKind::Variable(name) = &target.kind else {
                    return Err(err("invalid assignment target", target.span));
                };
                match self.resolve_name(name, target.span)? {
                    Resolution::Local { ty, mutable } => {
                        if !mutable {
                            return Err(err(
                                format!("cannot assign to immutable binding `{name}`"),
                                target.span,
                            ));
                        }
                        self.check_assign_compatible(&ty, &vt, value.span)?;
                        Ok(ty)
                    }
                    Resolution::Capture {
                        ty,
                        mode,
                        assignable,
                    } => {
                        if !assignable {
                            let message = match mode {
                                CaptureMode::ByValue => format!(
                                    "cannot assign to by-value capture `{name}` in a non-mut lambda"
                                ),
                                CaptureMode::ByReference => format!(
                                    "cannot assign through reference capture of immutable binding `{name}`"
                                ),
                            };
                            return Err(err(message, target.span));
                        }
                        self.check_assign_compatible(&ty, &vt, value.span)?;
                        Ok(ty)
                    }
                    Resolution::Global { .. } => Err(err(
                        format!("cannot assign to `{name}`"),
                        target.span,
                    )),
                }
            }
            ExprKind::Call { callee, args } => self.check_call(callee, args, expr.span),
            ExprKind::Group(inner) => self.check_expr(inner),
            ExprKind::Lambda(lambda) => self.check_lambda(lambda),
        }
    }

    fn check_binary(
        &self,
        op: &BinaryOp,
        left: &Type,
        right: &Type,
        span: SourceSpan,
    ) -> Result<Type, Diagnostic> {
        use BinaryOp::*;
        match op {
            Add if *left == Type::Str && *right == Type::Str => Ok(Type::Str),
            Add | Sub | Mul | Div | Mod => {
                if left.is_numeric() && right.is_numeric() {
                    if *left == Type::Int && *right == Type::Int {
                        Ok(Type::Int)
                    } else {
                        Ok(Type::Float)
                    }
                } else {
                    Err(err(
                        format!("arithmetic expects numeric operands, found `{left}` and `{right}`"),
                        span,
                    ))
                }
            }
            Less | LessEqual | Greater | GreaterEqual => {
                if left.is_numeric() && right.is_numeric() {
                    Ok(Type::Bool)
                } else {
                    Err(err(
                        format!("comparison expects numeric operands, found `{left}` and `{right}`"),
                        span,
                    ))
                }
            }
            Equal | NotEqual => {
                if left.signature().is_some() || right.signature().is_some() {
                    return Err(err("cannot compare callables", span));
                }
                if types::matches(left, right) {
                    Ok(Type::Bool)
                } else {
                    Err(err(
                        format!("cannot compare `{left}` with `{right}`"),
                        span,
                    ))
                }
            }
            And | Or => {
                if types::matches(&Type::Bool, left) && types::matches(&Type::Bool, right) {
                    Ok(Type::Bool)
                } else {
                    Err(err(
                        format!("logical operator expects `bool` operands, found `{left}` and `{right}`"),
                        span,
                    ))
                }
            }
        }
    }

    fn check_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        span: SourceSpan,
    ) -> Result<Type, Diagnostic> {
        // Constructors and variadic natives are only meaningful as direct
        // callees, so resolve a bare name before general expression checking.
        if let ExprKind::Variable(name) = &callee.kind {
            if let Resolution::Global { ty, kind } = self.resolve_name(name, callee.span)? {
                match kind {
                    GlobalKind::Variadic => {
                        for arg in args {
                            self.check_expr(arg)?;
                        }
                        let ret = ty
                            .signature()
                            .map(|sig| (*sig.ret).clone())
                            .unwrap_or(Type::Unit);
                        return Ok(ret);
                    }
                    GlobalKind::Ctor { fields } => {
                        self.check_args(name, &fields, args, span)?;
                        return Ok(ty);
                    }
                    GlobalKind::Value => {
                        return self.check_callable_call(&ty, args, span);
                    }
                }
            }
        }
        let ty = self.check_expr(callee)?;
        self.check_callable_call(&ty, args, span)
    }

    fn check_callable_call(
        &mut self,
        ty: &Type,
        args: &[Expr],
        span: SourceSpan,
    ) -> Result<Type, Diagnostic> {
        let Some(signature) = ty.signature() else {
            return Err(err(
                format!("value of type `{ty}` is not callable"),
                span,
            ));
        };
        let signature = signature.clone();
        self.check_args("callable", &signature.params, args, span)?;
        Ok(*signature.ret)
    }

    fn check_args(
        &mut self,
        what: &str,
        params: &[Type],
        args: &[Expr],
        span: SourceSpan,
    ) -> Result<(), Diagnostic> {
        if params.len() != args.len() {
            return Err(err(
                format!(
                    "`{what}` expected {} arguments but received {}",
                    params.len(),
                    args.len()
                ),
                span,
            ));
        }
        // Passing an argument initializes the parameter, so box and pointer
        // parameters follow the assignment rules.
        for (param, arg) in params.iter().zip(args.iter()) {
            let at = self.check_expr(arg)?;
            self.check_assign_compatible(param, &at, arg.span)?;
        }
        Ok(())
    }

    /// Box and function-pointer targets accept callables under their own
    /// rules; everything else requires an exact type match.
    fn check_assign_compatible(
        &self,
        target: &Type,
        value: &Type,
        span: SourceSpan,
    ) -> Result<(), Diagnostic> {
        match target {
            Type::BoxFn(expected) => match value {
                Type::Callable { signature, .. } | Type::BoxFn(signature) => {
                    if types::signatures_match(expected, signature) {
                        Ok(())
                    } else {
                        Err(err(
                            format!(
                                "signature mismatch: box expects `{expected}`, found `{signature}`"
                            ),
                            span,
                        ))
                    }
                }
                other => Err(err(
                    format!("cannot store a value of type `{other}` in a box"),
                    span,
                )),
            },
            Type::Callable {
                kind: CallableKind::Function,
                signature: expected,
            } => match value {
                Type::Callable {
                    kind: CallableKind::Function,
                    signature,
                } => {
                    if types::signatures_match(expected, signature) {
                        Ok(())
                    } else {
                        Err(err(
                            format!(
                                "signature mismatch: expected `{expected}`, found `{signature}`"
                            ),
                            span,
                        ))
                    }
                }
                Type::Callable {
                    kind: CallableKind::Closure,
                    ..
                } => Err(err(
                    "a capturing lambda cannot be assigned to a function pointer",
                    span,
                )
                .with_note("captured state has no representation as a bare function value")),
                Type::Callable {
                    kind: CallableKind::Functor,
                    ..
                } => Err(err(
                    "a functor instance cannot be assigned to a function pointer",
                    span,
                )
                .with_note("functor state has no representation as a bare function value")),
                other => Err(err(
                    format!("type mismatch: expected `{target}`, found `{other}`"),
                    span,
                )),
            },
            _ => {
                if types::matches(target, value) {
                    Ok(())
                } else {
                    Err(err(
                        format!("type mismatch: expected `{target}`, found `{value}`"),
                        span,
                    ))
                }
            }
        }
    }

    fn check_lambda(&mut self, lambda: &LambdaExpr) -> Result<Type, Diagnostic> {
        let mut captures = Vec::new();
        let mut capture_all = None;
        let enclosing = self.frames.len() - 1;
        for spec in &lambda.captures {
            match spec {
                CaptureSpec::All { mode, .. } => capture_all = Some(*mode),
                CaptureSpec::Named { mode, name, span } => {
                    if captures.iter().any(|cap: &CapturedInfo| cap.name == *name) {
                        return Err(err(format!("duplicate capture of `{name}`"), *span));
                    }
                    let Some((ty, source_mutable)) = self.resolve_enclosing(enclosing, name)
                    else {
                        return Err(err(
                            format!("cannot capture `{name}`: no such local variable"),
                            *span,
                        ));
                    };
                    let assignable = match mode {
                        CaptureMode::ByValue => lambda.mutable,
                        CaptureMode::ByReference => source_mutable,
                    };
                    captures.push(CapturedInfo {
                        name: name.clone(),
                        mode: *mode,
                        ty,
                        assignable,
                    });
                }
            }
        }

        let params = self.param_types(&lambda.params)?;
        let declared = lambda
            .return_type
            .as_ref()
            .map(Type::from_expr)
            .transpose()?;
        let non_capturing = lambda.captures.is_empty();

        let frame = Frame::new(
            FrameKind::Lambda {
                captures,
                capture_all,
                mutable: lambda.mutable,
            },
            declared,
        );
        self.frames.push(frame);
        for param in &lambda.params {
            let ty = Type::from_expr(&param.annotation)?;
            self.declare(&param.name, ty, true);
        }
        let body_result = self.check_stmts(&lambda.body);
        let frame = self.frames.pop().expect("frame stack is never empty");
        body_result?;
        let ret = self.finish_frame(frame, "lambda")?;

        // A lambda with an empty capture list decays to a plain function
        // value; any capture makes it a closure.
        let kind = if non_capturing {
            CallableKind::Function
        } else {
            CallableKind::Closure
        };
        Ok(Type::Callable {
            kind,
            signature: Signature::new(params, ret),
        })
    }
}
