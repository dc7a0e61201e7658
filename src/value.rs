use std::{cell::RefCell, fmt, rc::Rc};

use crate::{
    ast::{CaptureMode, FunctionDecl, FunctorDecl, LambdaExpr},
    diagnostics::{CallaError, Diagnostic, DiagnosticKind, SourceSpan},
    types::Signature,
};

/// One unit of variable storage. Environments, by-value snapshots, reference
/// captures, and functor fields are all slots; a by-reference capture is
/// literally a second handle on the original slot.
pub type Slot = Rc<RefCell<Value>>;

#[derive(Clone)]
pub struct Value(pub Rc<ValueKind>);

impl Value {
    pub fn new(kind: ValueKind) -> Self {
        Self(Rc::new(kind))
    }

    pub fn unit() -> Self {
        Self::new(ValueKind::Unit)
    }

    pub fn bool(value: bool) -> Self {
        Self::new(ValueKind::Bool(value))
    }

    pub fn int(value: i64) -> Self {
        Self::new(ValueKind::Int(value))
    }

    pub fn float(value: f64) -> Self {
        Self::new(ValueKind::Float(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(ValueKind::Str(value.into()))
    }

    pub fn callable(callable: Callable) -> Self {
        Self::new(ValueKind::Callable(callable))
    }

    pub fn type_name(&self) -> &'static str {
        match &*self.0 {
            ValueKind::Unit => "unit",
            ValueKind::Bool(_) => "bool",
            ValueKind::Int(_) => "int",
            ValueKind::Float(_) => "float",
            ValueKind::Str(_) => "str",
            ValueKind::Callable(_) => "callable",
            ValueKind::Constructor(_) => "functor",
            ValueKind::Box(_) => "box",
        }
    }

    pub fn expect_bool(&self, span: SourceSpan) -> Result<bool, CallaError> {
        match &*self.0 {
            ValueKind::Bool(b) => Ok(*b),
            _ => Err(CallaError::from(
                Diagnostic::new(
                    DiagnosticKind::Runtime,
                    format!("expected `bool`, found {}", self.type_name()),
                )
                .with_span(span),
            )),
        }
    }

    /// Copy semantics for storing a value in new storage: closures copy their
    /// by-value snapshots and functor instances copy their fields, so no two
    /// bindings (or boxes) share captured state except through a reference
    /// capture.
    pub fn instance_copy(&self) -> Value {
        match &*self.0 {
            ValueKind::Callable(callable) => Value::callable(callable.instance_copy()),
            ValueKind::Box(b) => Value::new(ValueKind::Box(BoxValue {
                signature: b.signature.clone(),
                held: b.held.as_ref().map(Callable::instance_copy),
            })),
            _ => self.clone(),
        }
    }
}

pub enum ValueKind {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Callable(Callable),
    /// A functor declaration used as a value only at instantiation sites.
    Constructor(Rc<FunctorDecl>),
    Box(BoxValue),
}

/// Anything invocable with a fixed signature.
#[derive(Clone)]
pub enum Callable {
    Function(Rc<FunctionDecl>),
    Closure(Rc<ClosureValue>),
    Functor(Rc<FunctorInstance>),
    Native(NativeFunction),
}

impl Callable {
    pub fn instance_copy(&self) -> Callable {
        match self {
            Callable::Closure(closure) => Callable::Closure(Rc::new(ClosureValue {
                lambda: Rc::clone(&closure.lambda),
                captures: closure
                    .captures
                    .iter()
                    .map(CapturedVar::instance_copy)
                    .collect(),
            })),
            Callable::Functor(instance) => Callable::Functor(Rc::new(FunctorInstance {
                decl: Rc::clone(&instance.decl),
                fields: instance
                    .fields
                    .iter()
                    .map(|(name, slot)| {
                        (
                            name.clone(),
                            Rc::new(RefCell::new(slot.borrow().instance_copy())),
                        )
                    })
                    .collect(),
            })),
            other => other.clone(),
        }
    }
}

pub struct ClosureValue {
    pub lambda: Rc<LambdaExpr>,
    pub captures: Vec<CapturedVar>,
}

pub struct CapturedVar {
    pub name: String,
    pub mode: CaptureMode,
    pub slot: Slot,
}

impl CapturedVar {
    fn instance_copy(&self) -> CapturedVar {
        let slot = match self.mode {
            // The snapshot travels with the closure instance.
            CaptureMode::ByValue => Rc::new(RefCell::new(self.slot.borrow().instance_copy())),
            // The alias keeps pointing at the original storage.
            CaptureMode::ByReference => Rc::clone(&self.slot),
        };
        CapturedVar {
            name: self.name.clone(),
            mode: self.mode,
            slot,
        }
    }
}

pub struct FunctorInstance {
    pub decl: Rc<FunctorDecl>,
    pub fields: Vec<(String, Slot)>,
}

/// The type-erased wrapper: holds at most one callable of the declared
/// signature. Assignment replaces the held callable wholesale.
#[derive(Clone)]
pub struct BoxValue {
    pub signature: Signature,
    pub held: Option<Callable>,
}

impl BoxValue {
    pub fn empty(signature: Signature) -> Self {
        Self {
            signature,
            held: None,
        }
    }

    pub fn holding(signature: Signature, callable: Callable) -> Self {
        Self {
            signature,
            held: Some(callable.instance_copy()),
        }
    }
}

#[derive(Clone)]
pub struct NativeFunction {
    pub name: &'static str,
    pub signature: Signature,
    /// Variadic natives (`print`, `println`) accept any argument list and are
    /// special-cased by the checker; they cannot be used as values.
    pub variadic: bool,
    pub callback: fn(&[Value]) -> Result<Value, CallaError>,
}

impl NativeFunction {
    pub fn call(&self, args: &[Value]) -> Result<Value, CallaError> {
        if !self.variadic && args.len() != self.signature.params.len() {
            return Err(CallaError::from(Diagnostic::new(
                DiagnosticKind::Runtime,
                format!(
                    "function `{}` expected {} arguments but received {}",
                    self.name,
                    self.signature.params.len(),
                    args.len()
                ),
            )));
        }
        (self.callback)(args)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            ValueKind::Unit => write!(f, "unit"),
            ValueKind::Bool(b) => write!(f, "{b}"),
            ValueKind::Int(n) => write!(f, "{n}"),
            ValueKind::Float(n) => write!(f, "{n}"),
            ValueKind::Str(s) => write!(f, "\"{s}\""),
            ValueKind::Callable(c) => write!(f, "{c}"),
            ValueKind::Constructor(decl) => write!(f, "<functor {}>", decl.name),
            ValueKind::Box(b) => match &b.held {
                Some(held) => write!(f, "<box {} holding {held}>", b.signature),
                None => write!(f, "<empty box {}>", b.signature),
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            ValueKind::Str(s) => write!(f, "{s}"),
            ValueKind::Unit => write!(f, "unit"),
            _ => write!(f, "{self:?}"),
        }
    }
}

impl fmt::Display for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Function(decl) => write!(f, "<fn {}>", decl.name),
            Callable::Closure(closure) => {
                if closure.captures.is_empty() {
                    write!(f, "<lambda>")
                } else {
                    write!(f, "<closure")?;
                    for (idx, cap) in closure.captures.iter().enumerate() {
                        let prefix = if idx == 0 { " " } else { ", " };
                        match cap.mode {
                            CaptureMode::ByValue => write!(f, "{prefix}{}", cap.name)?,
                            CaptureMode::ByReference => write!(f, "{prefix}&{}", cap.name)?,
                        }
                    }
                    write!(f, ">")
                }
            }
            Callable::Functor(instance) => write!(f, "<{} instance>", instance.decl.name),
            Callable::Native(native) => write!(f, "<native fn {}>", native.name),
        }
    }
}
