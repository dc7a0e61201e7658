//! Core library for the Calla language runtime and tooling. Calla is a small
//! scripting language built around first-class callables: free functions,
//! capture-list lambdas, stateful functors, and signature-checked function
//! boxes. The pipeline is lexing, parsing, definition-time checking, and
//! tree-walking evaluation, plus REPL utilities.

pub mod ast;
pub mod check;
pub mod diagnostics;
pub mod environment;
pub mod lexer;
pub mod parser;
pub mod repl;
pub mod runtime;
pub mod stdlib;
pub mod types;
pub mod value;

pub use diagnostics::{CallaError, Diagnostic, DiagnosticKind, SourceSpan};
pub use repl::Repl;
pub use runtime::Interpreter;
