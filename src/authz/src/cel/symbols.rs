//! Symbol table describing what a condition may reference

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Static type of a CEL sub-expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Bool,
    Int,
    UInt,
    Double,
    String,
    Bytes,
    List,
    Map,
    Null,
    /// Statically unknown (map values, list elements, comprehension variables)
    Dyn,
}

impl ValueType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int | Self::UInt | Self::Double)
    }

    /// Whether a value of this type may stand where `expected` is required
    pub fn accepts(&self, expected: ValueType) -> bool {
        *self == expected || *self == Self::Dyn || expected == Self::Dyn
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::UInt => "uint",
            Self::Double => "double",
            Self::String => "string",
            Self::Bytes => "bytes",
            Self::List => "list",
            Self::Map => "map",
            Self::Null => "null",
            Self::Dyn => "dyn",
        };
        f.write_str(name)
    }
}

/// Identifiers and functions a condition may use
///
/// Identifiers are dotted paths. A path whose prefix is a registered
/// namespace (`resource`, `subject`) must itself be registered; anything
/// else is an unknown identifier.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    variables: BTreeMap<String, ValueType>,
    namespaces: BTreeSet<String>,
    functions: BTreeMap<String, ValueType>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The vocabulary available to access-control rule conditions
    pub fn access_control() -> Self {
        Self::new()
            .with_variable("resource.type", ValueType::String)
            .with_variable("resource.name", ValueType::String)
            .with_variable("resource.owner", ValueType::String)
            .with_variable("resource.tags", ValueType::List)
            .with_variable("resource.attributes", ValueType::Map)
            .with_variable("subject.id", ValueType::String)
            .with_variable("subject.name", ValueType::String)
            .with_variable("subject.roles", ValueType::List)
            .with_variable("subject.teams", ValueType::List)
            .with_variable("operation", ValueType::String)
            .with_builtin_functions()
    }

    /// Register an identifier; dotted prefixes become namespaces
    pub fn with_variable(mut self, path: impl Into<String>, value_type: ValueType) -> Self {
        let path = path.into();
        let segments: Vec<&str> = path.split('.').collect();
        for end in 1..segments.len() {
            self.namespaces.insert(segments[..end].join("."));
        }
        self.variables.insert(path, value_type);
        self
    }

    /// Drop an identifier (restricted vocabularies, tests)
    pub fn without_variable(mut self, path: &str) -> Self {
        self.variables.remove(path);
        self
    }

    pub fn with_function(mut self, name: impl Into<String>, returns: ValueType) -> Self {
        self.functions.insert(name.into(), returns);
        self
    }

    fn with_builtin_functions(self) -> Self {
        self.with_function("has", ValueType::Bool)
            .with_function("size", ValueType::Int)
            .with_function("contains", ValueType::Bool)
            .with_function("startsWith", ValueType::Bool)
            .with_function("endsWith", ValueType::Bool)
            .with_function("matches", ValueType::Bool)
            .with_function("exists", ValueType::Bool)
            .with_function("exists_one", ValueType::Bool)
            .with_function("all", ValueType::Bool)
            .with_function("map", ValueType::List)
            .with_function("filter", ValueType::List)
            .with_function("string", ValueType::String)
            .with_function("int", ValueType::Int)
            .with_function("uint", ValueType::UInt)
            .with_function("double", ValueType::Double)
            .with_function("max", ValueType::Dyn)
    }

    pub fn variable(&self, path: &str) -> Option<ValueType> {
        self.variables.get(path).copied()
    }

    pub fn is_namespace(&self, path: &str) -> bool {
        self.namespaces.contains(path)
    }

    pub fn function(&self, name: &str) -> Option<ValueType> {
        self.functions.get(name).copied()
    }

    /// Top-level names that must be bound at evaluation time
    pub fn roots(&self) -> BTreeSet<&str> {
        self.variables
            .keys()
            .map(|path| path.split('.').next().unwrap_or(path.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_control_vocabulary() {
        let table = SymbolTable::access_control();
        assert_eq!(table.variable("resource.owner"), Some(ValueType::String));
        assert_eq!(table.variable("subject.roles"), Some(ValueType::List));
        assert!(table.is_namespace("resource"));
        assert!(table.is_namespace("subject"));
        assert!(!table.is_namespace("operation"));
        assert_eq!(table.function("size"), Some(ValueType::Int));
        assert!(table.function("eval").is_none());
    }

    #[test]
    fn test_without_variable_keeps_namespace() {
        let table = SymbolTable::access_control().without_variable("subject.name");
        assert!(table.variable("subject.name").is_none());
        assert!(table.is_namespace("subject"));
    }

    #[test]
    fn test_roots() {
        let table = SymbolTable::access_control();
        let roots: Vec<_> = table.roots().into_iter().collect();
        assert_eq!(roots, vec!["operation", "resource", "subject"]);
    }

    #[test]
    fn test_dyn_accepts_anything() {
        assert!(ValueType::Dyn.accepts(ValueType::Bool));
        assert!(ValueType::Bool.accepts(ValueType::Dyn));
        assert!(!ValueType::String.accepts(ValueType::Bool));
    }
}
