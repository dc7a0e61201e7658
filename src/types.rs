use std::fmt;

use crate::{
    ast::{TypeExpr, TypeExprKind},
    diagnostics::{Diagnostic, DiagnosticKind},
};

/// Which concrete shape a callable value has. Signatures never depend on the
/// kind; the kind matters only for the function-pointer restriction (a bare
/// function value has no storage for captured state).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallableKind {
    /// A free function, a native, or a non-capturing lambda (which decays).
    Function,
    /// A capturing lambda.
    Closure,
    /// A functor instance.
    Functor,
}

/// Argument types plus return type. Two signatures match only if they are
/// identical.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub params: Vec<Type>,
    pub ret: Box<Type>,
}

impl Signature {
    pub fn new(params: Vec<Type>, ret: Type) -> Self {
        Self {
            params,
            ret: Box::new(ret),
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn(")?;
        for (idx, param) in self.params.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, ") -> {}", self.ret)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Unit,
    Bool,
    Int,
    Float,
    Str,
    /// Wildcard used only by variadic/polymorphic natives such as `dbg`.
    Any,
    Callable {
        kind: CallableKind,
        signature: Signature,
    },
    /// The type-erased wrapper: holds at most one callable of the signature.
    BoxFn(Signature),
}

impl Type {
    /// Resolves a syntactic type annotation. An absent return annotation in a
    /// `fn(..)` type means `unit`.
    pub fn from_expr(expr: &TypeExpr) -> Result<Type, Diagnostic> {
        match &expr.kind {
            TypeExprKind::Named(name) => match name.as_str() {
                "int" => Ok(Type::Int),
                "float" => Ok(Type::Float),
                "bool" => Ok(Type::Bool),
                "str" => Ok(Type::Str),
                "unit" => Ok(Type::Unit),
                other => Err(Diagnostic::new(
                    DiagnosticKind::Check,
                    format!("unknown type `{other}`"),
                )
                .with_span(expr.span)),
            },
            TypeExprKind::Pointer { params, ret } => Ok(Type::Callable {
                kind: CallableKind::Function,
                signature: Self::signature_from_parts(params, ret.as_deref())?,
            }),
            TypeExprKind::BoxFn { params, ret } => Ok(Type::BoxFn(Self::signature_from_parts(
                params,
                ret.as_deref(),
            )?)),
        }
    }

    fn signature_from_parts(
        params: &[TypeExpr],
        ret: Option<&TypeExpr>,
    ) -> Result<Signature, Diagnostic> {
        let params = params.iter().map(Type::from_expr).collect::<Result<_, _>>()?;
        let ret = match ret {
            Some(expr) => Type::from_expr(expr)?,
            None => Type::Unit,
        };
        Ok(Signature::new(params, ret))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    pub fn signature(&self) -> Option<&Signature> {
        match self {
            Type::Callable { signature, .. } => Some(signature),
            Type::BoxFn(signature) => Some(signature),
            _ => None,
        }
    }
}

/// Structural match with `Any` as a wildcard on either side.
pub fn matches(expected: &Type, actual: &Type) -> bool {
    match (expected, actual) {
        (Type::Any, _) | (_, Type::Any) => true,
        (
            Type::Callable {
                kind: a,
                signature: sig_a,
            },
            Type::Callable {
                kind: b,
                signature: sig_b,
            },
        ) => a == b && signatures_match(sig_a, sig_b),
        (Type::BoxFn(a), Type::BoxFn(b)) => signatures_match(a, b),
        (a, b) => a == b,
    }
}

pub fn signatures_match(a: &Signature, b: &Signature) -> bool {
    a.params.len() == b.params.len()
        && a.params
            .iter()
            .zip(b.params.iter())
            .all(|(x, y)| matches(x, y))
        && matches(&a.ret, &b.ret)
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Unit => write!(f, "unit"),
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::Str => write!(f, "str"),
            Type::Any => write!(f, "any"),
            Type::Callable { signature, .. } => write!(f, "{signature}"),
            Type::BoxFn(signature) => write!(f, "box {signature}"),
        }
    }
}
