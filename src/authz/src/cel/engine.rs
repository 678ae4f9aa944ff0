//! CEL expression engine with write-time validation and program caching

use cel_interpreter::objects::Value as CelValue;
use cel_interpreter::{Context, Program};
use dashmap::DashMap;
use std::sync::Arc;

use crate::cel::{
    checker::Checker,
    context::EvalContext,
    convert::json_to_cel,
    error::{CelError, Result},
    symbols::{SymbolTable, ValueType},
};

/// A condition that passed parsing, symbol resolution and type checking
#[derive(Clone)]
pub struct CompiledPredicate {
    source: String,
    program: Arc<Program>,
}

impl CompiledPredicate {
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl std::fmt::Debug for CompiledPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledPredicate")
            .field("source", &self.source)
            .finish()
    }
}

/// CEL engine for compiling and evaluating rule conditions
pub struct Engine {
    symbols: SymbolTable,

    /// Compiled program cache keyed by source text (thread-safe)
    program_cache: Arc<DashMap<String, Arc<Program>>>,

    /// Boolean conditions that already passed the checker
    predicate_cache: Arc<DashMap<String, CompiledPredicate>>,
}

impl Engine {
    /// Engine checking against the access-control vocabulary
    pub fn new() -> Self {
        Self::with_symbols(SymbolTable::access_control())
    }

    pub fn with_symbols(symbols: SymbolTable) -> Self {
        Self {
            symbols,
            program_cache: Arc::new(DashMap::new()),
            predicate_cache: Arc::new(DashMap::new()),
        }
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Compile a condition and require its static type to be `expected`
    ///
    /// # Errors
    /// Syntax errors, unknown identifiers or functions, type mismatches, and
    /// a result type other than `expected`. Pure: nothing is evaluated.
    pub fn compile(&self, expr: &str, expected: ValueType) -> Result<CompiledPredicate> {
        let ast = cel_parser::parse(expr).map_err(|e| CelError::Syntax(format!("{:?}", e)))?;

        let found = Checker::new(&self.symbols).check(&ast)?;
        if found != expected {
            return Err(CelError::ResultType {
                expected: expected.to_string(),
                found: found.to_string(),
            });
        }

        Ok(CompiledPredicate {
            source: expr.to_string(),
            program: self.program(expr)?,
        })
    }

    /// Cached executable program for `expr`
    fn program(&self, expr: &str) -> Result<Arc<Program>> {
        if let Some(prog) = self.program_cache.get(expr) {
            return Ok(prog.clone());
        }

        let program = Program::compile(expr).map_err(|e| CelError::Syntax(format!("{:?}", e)))?;

        let program = Arc::new(program);
        self.program_cache.insert(expr.to_string(), program.clone());

        Ok(program)
    }

    /// Evaluate a compiled predicate with the given context
    ///
    /// # Errors
    /// Returns error if evaluation fails or result is not boolean
    pub fn evaluate(&self, predicate: &CompiledPredicate, ctx: &EvalContext) -> Result<bool> {
        let mut cel_context = Context::default();

        for (key, value) in ctx.to_variables() {
            cel_context.add_variable_from_value(key, json_to_cel(&value));
        }

        let result = predicate
            .program
            .execute(&cel_context)
            .map_err(|e| CelError::Evaluation(format!("{:?}", e)))?;

        Self::to_bool(&result)
    }

    /// Compile (or fetch from cache) and evaluate a boolean condition
    pub fn evaluate_condition(&self, expr: &str, ctx: &EvalContext) -> Result<bool> {
        let predicate = self.condition(expr)?;
        self.evaluate(&predicate, ctx)
    }

    /// Checked boolean predicate for `expr`, compiled at most once
    fn condition(&self, expr: &str) -> Result<CompiledPredicate> {
        if let Some(predicate) = self.predicate_cache.get(expr) {
            return Ok(predicate.clone());
        }

        let predicate = self.compile(expr, ValueType::Bool)?;
        self.predicate_cache.insert(expr.to_string(), predicate.clone());
        Ok(predicate)
    }

    /// Clear the compiled program and predicate caches
    pub fn clear_cache(&self) {
        self.program_cache.clear();
        self.predicate_cache.clear();
    }

    /// Number of cached programs
    pub fn cached_programs(&self) -> usize {
        self.program_cache.len()
    }

    /// Number of checked boolean conditions
    pub fn cached_predicates(&self) -> usize {
        self.predicate_cache.len()
    }

    fn to_bool(value: &CelValue) -> Result<bool> {
        match value {
            CelValue::Bool(b) => Ok(*b),
            _ => Err(CelError::NonBooleanResult),
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn create_test_context() -> EvalContext {
        let mut subject = HashMap::new();
        subject.insert("id".to_string(), json!("7d1c"));
        subject.insert("name".to_string(), json!("alice"));
        subject.insert("roles".to_string(), json!(["DataSteward", "DataConsumer"]));
        subject.insert("teams".to_string(), json!(["Engineering"]));

        let mut resource = HashMap::new();
        resource.insert("type".to_string(), json!("table"));
        resource.insert("owner".to_string(), json!("alice"));
        resource.insert("tags".to_string(), json!(["PII.Sensitive", "Tier.Tier1"]));
        resource.insert("attributes".to_string(), json!({"tier": 1}));

        EvalContext::new()
            .with_subject(subject)
            .with_resource(resource)
            .with_operation("read")
    }

    #[test]
    fn test_engine_creation() {
        let engine = Engine::new();
        assert_eq!(engine.cached_programs(), 0);
    }

    #[test]
    fn test_simple_expression() {
        let engine = Engine::new();
        let ctx = create_test_context();

        assert!(engine.evaluate_condition("true", &ctx).unwrap());
        assert!(!engine.evaluate_condition("false", &ctx).unwrap());
    }

    #[test]
    fn test_owner_expression() {
        let engine = Engine::new();
        let ctx = create_test_context();

        assert!(engine
            .evaluate_condition("resource.owner == subject.name", &ctx)
            .unwrap());
    }

    #[test]
    fn test_role_and_tag_membership() {
        let engine = Engine::new();
        let ctx = create_test_context();

        assert!(engine
            .evaluate_condition("'DataSteward' in subject.roles", &ctx)
            .unwrap());
        assert!(!engine
            .evaluate_condition("'Admin' in subject.roles", &ctx)
            .unwrap());
        assert!(engine
            .evaluate_condition("resource.tags.exists(t, t.startsWith('PII'))", &ctx)
            .unwrap());
    }

    #[test]
    fn test_operation_variable() {
        let engine = Engine::new();
        let ctx = create_test_context();

        assert!(engine
            .evaluate_condition("operation == 'read' && resource.type == 'table'", &ctx)
            .unwrap());
    }

    #[test]
    fn test_program_caching() {
        let engine = Engine::new();
        let ctx = create_test_context();

        engine.evaluate_condition("true", &ctx).unwrap();
        assert_eq!(engine.cached_programs(), 1);
        assert_eq!(engine.cached_predicates(), 1);

        engine.evaluate_condition("true", &ctx).unwrap();
        assert_eq!(engine.cached_programs(), 1);
        assert_eq!(engine.cached_predicates(), 1);

        engine.evaluate_condition("false", &ctx).unwrap();
        assert_eq!(engine.cached_programs(), 2);
        assert_eq!(engine.cached_predicates(), 2);

        engine.clear_cache();
        assert_eq!(engine.cached_programs(), 0);
        assert_eq!(engine.cached_predicates(), 0);
    }

    #[test]
    fn test_compile_alone_does_not_cache_predicate() {
        let engine = Engine::new();
        let ctx = create_test_context();

        engine.compile("resource.owner == subject.name", ValueType::Bool).unwrap();
        assert_eq!(engine.cached_predicates(), 0);

        for _ in 0..5 {
            assert!(engine
                .evaluate_condition("resource.owner == subject.name", &ctx)
                .unwrap());
        }
        assert_eq!(engine.cached_predicates(), 1);
    }

    #[test]
    fn test_rejected_condition_not_cached() {
        let engine = Engine::new();
        let ctx = create_test_context();

        assert!(engine.evaluate_condition("'hello'", &ctx).is_err());
        assert!(engine.evaluate_condition("'hello'", &ctx).is_err());
        assert_eq!(engine.cached_predicates(), 0);
    }

    #[test]
    fn test_syntax_error() {
        let engine = Engine::new();
        let result = engine.compile("invalid syntax @#$", ValueType::Bool);
        assert!(matches!(result, Err(CelError::Syntax(_))));
        assert_eq!(engine.cached_programs(), 0);
    }

    #[test]
    fn test_unknown_identifier_against_restricted_table() {
        let engine = Engine::with_symbols(
            SymbolTable::access_control().without_variable("subject.name"),
        );

        let result = engine.compile("resource.owner == subject.name", ValueType::Bool);
        assert_eq!(
            result.unwrap_err(),
            CelError::UnknownIdentifier("subject.name".to_string())
        );
    }

    #[test]
    fn test_non_boolean_expression_rejected_at_compile_time() {
        let engine = Engine::new();

        let result = engine.compile("'hello'", ValueType::Bool);
        assert_eq!(
            result.unwrap_err(),
            CelError::ResultType {
                expected: "bool".to_string(),
                found: "string".to_string()
            }
        );
    }

    #[test]
    fn test_missing_attribute_fails_evaluation() {
        let engine = Engine::new();
        let mut ctx = create_test_context();
        ctx.resource.remove("owner");

        let result = engine.evaluate_condition("resource.owner == subject.name", &ctx);
        assert!(matches!(result, Err(CelError::Evaluation(_))));
    }
}
