use std::{cell::RefCell, rc::Rc};

use indexmap::IndexMap;

use crate::{
    diagnostics::{CallaError, Diagnostic, DiagnosticKind, SourceSpan},
    value::{Slot, Value},
};

pub type EnvironmentRef = Rc<RefCell<Environment>>;

/// A scope in the chain, mapping names to shared storage slots. Mutability
/// and visibility are enforced by the checker before evaluation starts, so
/// the environment only manages storage.
#[derive(Default)]
pub struct Environment {
    parent: Option<EnvironmentRef>,
    bindings: IndexMap<String, Slot>,
}

impl Environment {
    pub fn new() -> EnvironmentRef {
        Rc::new(RefCell::new(Self {
            parent: None,
            bindings: IndexMap::new(),
        }))
    }

    pub fn with_parent(parent: EnvironmentRef) -> EnvironmentRef {
        Rc::new(RefCell::new(Self {
            parent: Some(parent),
            bindings: IndexMap::new(),
        }))
    }

    /// Defines a binding backed by fresh storage.
    pub fn define(&mut self, name: String, value: Value) {
        self.bindings.insert(name, Rc::new(RefCell::new(value)));
    }

    /// Defines a binding backed by existing storage; used for reference
    /// captures, closure snapshots, and functor fields.
    pub fn define_slot(&mut self, name: String, slot: Slot) {
        self.bindings.insert(name, slot);
    }

    pub fn slot(env: &EnvironmentRef, name: &str) -> Option<Slot> {
        if let Some(slot) = env.borrow().bindings.get(name) {
            return Some(Rc::clone(slot));
        }
        let parent = env.borrow().parent.clone();
        parent.and_then(|parent| Environment::slot(&parent, name))
    }

    /// Looks up a slot in the chain, stopping before `boundary`. Closure
    /// creation uses this to capture locals while leaving globals alone.
    pub fn slot_until(env: &EnvironmentRef, name: &str, boundary: &EnvironmentRef) -> Option<Slot> {
        if Rc::ptr_eq(env, boundary) {
            return None;
        }
        if let Some(slot) = env.borrow().bindings.get(name) {
            return Some(Rc::clone(slot));
        }
        let parent = env.borrow().parent.clone();
        parent.and_then(|parent| Environment::slot_until(&parent, name, boundary))
    }

    pub fn get(env: &EnvironmentRef, name: &str, span: SourceSpan) -> Result<Value, CallaError> {
        Environment::slot(env, name)
            .map(|slot| slot.borrow().clone())
            .ok_or_else(|| {
                CallaError::from(
                    Diagnostic::new(
                        DiagnosticKind::Runtime,
                        format!("undefined variable `{name}`"),
                    )
                    .with_span(span),
                )
            })
    }

}
