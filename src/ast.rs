use std::{collections::HashSet, rc::Rc};

use indexmap::IndexSet;

use crate::diagnostics::SourceSpan;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Unit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnaryOp {
    Negate,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeExpr {
    pub kind: TypeExprKind,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeExprKind {
    /// A primitive type name: `int`, `float`, `bool`, `str`, `unit`.
    Named(String),
    /// A function-pointer type: `fn(int, int) -> int`.
    Pointer {
        params: Vec<TypeExpr>,
        ret: Option<Box<TypeExpr>>,
    },
    /// A function-box type: `box fn(int, int) -> int`.
    BoxFn {
        params: Vec<TypeExpr>,
        ret: Option<Box<TypeExpr>>,
    },
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub annotation: TypeExpr,
    pub span: SourceSpan,
}

/// How a lambda gains access to one outer variable: an independent copy made
/// at creation time, or an alias to the original storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    ByValue,
    ByReference,
}

#[derive(Debug, Clone)]
pub enum CaptureSpec {
    /// `=` or `&` alone: apply one mode uniformly to every outer local the
    /// body references.
    All { mode: CaptureMode, span: SourceSpan },
    /// `x` or `&x`.
    Named {
        mode: CaptureMode,
        name: String,
        span: SourceSpan,
    },
}

impl CaptureSpec {
    pub fn span(&self) -> SourceSpan {
        match self {
            CaptureSpec::All { span, .. } | CaptureSpec::Named { span, .. } => *span,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LambdaExpr {
    pub captures: Vec<CaptureSpec>,
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    /// `mut` marker: permits in-place modification of by-value snapshots.
    pub mutable: bool,
    pub body: Vec<Stmt>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Literal(Literal),
    Variable(String),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Group(Box<Expr>),
    Lambda(Rc<LambdaExpr>),
}

#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    pub body: Vec<Stmt>,
    pub span: SourceSpan,
}

/// A function object: a callable value type carrying named state fields. The
/// body sees the fields as ordinary mutable variables whose mutations persist
/// across invocations of the same instance.
#[derive(Debug, Clone)]
pub struct FunctorDecl {
    pub name: String,
    pub fields: Vec<Param>,
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    pub body: Vec<Stmt>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    VarDecl {
        name: String,
        mutable: bool,
        annotation: Option<TypeExpr>,
        initializer: Option<Expr>,
    },
    Function(Rc<FunctionDecl>),
    Functor(Rc<FunctorDecl>),
    Expr(Expr),
    Block(Vec<Stmt>),
    If {
        condition: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
    },
    Return(Option<Expr>),
    Break,
    Continue,
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub struct Program {
    pub items: Vec<Stmt>,
}

/// Collects the outer variables a lambda body references, in first-reference
/// order. Parameters and body-local bindings are excluded; references made by
/// nested lambdas count through their own capture lists.
pub fn lambda_free_variables(lambda: &LambdaExpr) -> IndexSet<String> {
    let mut free = IndexSet::new();
    let mut bound: Vec<HashSet<String>> = vec![HashSet::new()];
    for param in &lambda.params {
        bound[0].insert(param.name.clone());
    }
    free_in_stmts(&lambda.body, &mut bound, &mut free);
    free
}

fn is_bound(name: &str, bound: &[HashSet<String>]) -> bool {
    bound.iter().any(|scope| scope.contains(name))
}

fn free_in_stmts(stmts: &[Stmt], bound: &mut Vec<HashSet<String>>, free: &mut IndexSet<String>) {
    for stmt in stmts {
        free_in_stmt(stmt, bound, free);
    }
}

fn free_in_stmt(stmt: &Stmt, bound: &mut Vec<HashSet<String>>, free: &mut IndexSet<String>) {
    match &stmt.kind {
        StmtKind::VarDecl {
            name, initializer, ..
        } => {
            if let Some(init) = initializer {
                free_in_expr(init, bound, free);
            }
            bound
                .last_mut()
                .expect("scope stack is never empty")
                .insert(name.clone());
        }
        StmtKind::Expr(expr) => free_in_expr(expr, bound, free),
        StmtKind::Block(stmts) => {
            bound.push(HashSet::new());
            free_in_stmts(stmts, bound, free);
            bound.pop();
        }
        StmtKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            free_in_expr(condition, bound, free);
            bound.push(HashSet::new());
            free_in_stmts(then_branch, bound, free);
            bound.pop();
            if let Some(branch) = else_branch {
                bound.push(HashSet::new());
                free_in_stmts(branch, bound, free);
                bound.pop();
            }
        }
        StmtKind::While { condition, body } => {
            free_in_expr(condition, bound, free);
            bound.push(HashSet::new());
            free_in_stmts(body, bound, free);
            bound.pop();
        }
        StmtKind::Return(expr) => {
            if let Some(expr) = expr {
                free_in_expr(expr, bound, free);
            }
        }
        StmtKind::Break | StmtKind::Continue => {}
        // Function and functor declarations are top-level only; the parser
        // rejects them inside bodies.
        StmtKind::Function(_) | StmtKind::Functor(_) => {}
    }
}

fn free_in_expr(expr: &Expr, bound: &mut Vec<HashSet<String>>, free: &mut IndexSet<String>) {
    match &expr.kind {
        ExprKind::Literal(_) => {}
        ExprKind::Variable(name) => {
            if !is_bound(name, bound) {
                free.insert(name.clone());
            }
        }
        ExprKind::Binary { left, right, .. } => {
            free_in_expr(left, bound, free);
            free_in_expr(right, bound, free);
        }
        ExprKind::Unary { expr, .. } => free_in_expr(expr, bound, free),
        ExprKind::Assign { target, value } => {
            free_in_expr(target, bound, free);
            free_in_expr(value, bound, free);
        }
        ExprKind::Call { callee, args } => {
            free_in_expr(callee, bound, free);
            for arg in args {
                free_in_expr(arg, bound, free);
            }
        }
        ExprKind::Group(inner) => free_in_expr(inner, bound, free),
        ExprKind::Lambda(nested) => {
            for capture in &nested.captures {
                match capture {
                    CaptureSpec::Named { name, .. } => {
                        if !is_bound(name, bound) {
                            free.insert(name.clone());
                        }
                    }
                    CaptureSpec::All { .. } => {
                        for name in lambda_free_variables(nested) {
                            if !is_bound(&name, bound) {
                                free.insert(name);
                            }
                        }
                    }
                }
            }
        }
    }
}
