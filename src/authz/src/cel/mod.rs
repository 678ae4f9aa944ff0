//! CEL (Common Expression Language) condition compiler and evaluator
//!
//! Conditions are checked against a fixed [`SymbolTable`] when a policy is
//! written, so unknown identifiers and type errors surface as validation
//! failures instead of runtime surprises. Compiled programs are cached by
//! source text for evaluation at decision time.

pub mod checker;
pub mod context;
pub mod convert;
pub mod engine;
pub mod error;
pub mod symbols;

pub use context::EvalContext;
pub use engine::{CompiledPredicate, Engine};
pub use error::{CelError, Result};
pub use symbols::{SymbolTable, ValueType};
