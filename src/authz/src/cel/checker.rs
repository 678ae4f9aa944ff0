//! Static checking of parsed conditions against a symbol table

use cel_parser::{ArithmeticOp, Atom, Expression, Member, RelationOp, UnaryOp};

use crate::cel::error::{CelError, Result};
use crate::cel::symbols::{SymbolTable, ValueType};

/// Macros that bind their first argument as a local variable
const COMPREHENSIONS: [&str; 5] = ["all", "exists", "exists_one", "map", "filter"];

/// Walks a condition AST, resolving identifiers and inferring types
pub struct Checker<'a> {
    table: &'a SymbolTable,
    locals: Vec<String>,
}

impl<'a> Checker<'a> {
    pub fn new(table: &'a SymbolTable) -> Self {
        Self {
            table,
            locals: Vec::new(),
        }
    }

    /// Infer the type of `expr`, failing on the first unresolved name or
    /// type mismatch
    pub fn check(&mut self, expr: &Expression) -> Result<ValueType> {
        match expr {
            Expression::Atom(atom) => Ok(atom_type(atom)),

            Expression::Ident(name) => self.ident(name.as_str()),

            Expression::Member(inner, member) => self.member(expr, inner, member),

            Expression::FunctionCall(name, target, args) => {
                let Expression::Ident(name) = name.as_ref() else {
                    return Err(CelError::Syntax("function name must be an identifier".to_string()));
                };
                self.call(name.as_str(), target.as_deref(), args)
            }

            Expression::Relation(left, op, right) => {
                let lt = self.check(left)?;
                let rt = self.check(right)?;
                match op {
                    RelationOp::Equals | RelationOp::NotEquals => {
                        if !comparable(lt, rt) {
                            return Err(mismatch("equality", lt, rt));
                        }
                    }
                    RelationOp::In => {
                        if !matches!(rt, ValueType::List | ValueType::Map | ValueType::Dyn) {
                            return Err(mismatch("'in'", ValueType::List, rt));
                        }
                    }
                    _ => {
                        let ordered = (lt.is_numeric() && rt.is_numeric())
                            || (lt == ValueType::String && rt == ValueType::String)
                            || lt == ValueType::Dyn
                            || rt == ValueType::Dyn;
                        if !ordered {
                            return Err(mismatch("comparison", lt, rt));
                        }
                    }
                }
                Ok(ValueType::Bool)
            }

            Expression::And(left, right) | Expression::Or(left, right) => {
                for side in [left, right] {
                    let t = self.check(side)?;
                    if !t.accepts(ValueType::Bool) {
                        return Err(mismatch("logical operator", ValueType::Bool, t));
                    }
                }
                Ok(ValueType::Bool)
            }

            Expression::Unary(op, operand) => {
                let t = self.check(operand)?;
                match op {
                    UnaryOp::Not | UnaryOp::DoubleNot => {
                        if !t.accepts(ValueType::Bool) {
                            return Err(mismatch("negation", ValueType::Bool, t));
                        }
                        Ok(ValueType::Bool)
                    }
                    _ => {
                        if !(t.is_numeric() || t == ValueType::Dyn) {
                            return Err(mismatch("unary minus", ValueType::Int, t));
                        }
                        Ok(t)
                    }
                }
            }

            Expression::Arithmetic(left, op, right) => {
                let lt = self.check(left)?;
                let rt = self.check(right)?;
                if lt == ValueType::Dyn || rt == ValueType::Dyn {
                    return Ok(ValueType::Dyn);
                }
                if lt.is_numeric() && rt.is_numeric() {
                    return Ok(if lt == rt { lt } else { ValueType::Dyn });
                }
                let concatenates = matches!(op, ArithmeticOp::Add)
                    && lt == rt
                    && matches!(lt, ValueType::String | ValueType::List);
                if concatenates {
                    return Ok(lt);
                }
                Err(mismatch("arithmetic", lt, rt))
            }

            Expression::Ternary(condition, then, otherwise) => {
                let ct = self.check(condition)?;
                if !ct.accepts(ValueType::Bool) {
                    return Err(mismatch("ternary condition", ValueType::Bool, ct));
                }
                let a = self.check(then)?;
                let b = self.check(otherwise)?;
                Ok(if a == b { a } else { ValueType::Dyn })
            }

            Expression::List(items) => {
                for item in items {
                    self.check(item)?;
                }
                Ok(ValueType::List)
            }

            Expression::Map(entries) => {
                for (key, value) in entries {
                    self.check(key)?;
                    self.check(value)?;
                }
                Ok(ValueType::Map)
            }
        }
    }

    fn ident(&self, name: &str) -> Result<ValueType> {
        if self.locals.iter().any(|local| local == name) {
            return Ok(ValueType::Dyn);
        }
        if let Some(t) = self.table.variable(name) {
            return Ok(t);
        }
        if self.table.is_namespace(name) {
            return Ok(ValueType::Map);
        }
        Err(CelError::UnknownIdentifier(name.to_string()))
    }

    fn member(
        &mut self,
        expr: &Expression,
        inner: &Expression,
        member: &Member,
    ) -> Result<ValueType> {
        match member {
            Member::Attribute(field) => {
                if let (Some(parent), Some(path)) = (self.path_of(inner), self.path_of(expr)) {
                    if self.table.is_namespace(&parent) {
                        return self
                            .table
                            .variable(&path)
                            .ok_or(CelError::UnknownIdentifier(path));
                    }
                }
                let t = self.check(inner)?;
                if !t.accepts(ValueType::Map) {
                    return Err(mismatch(&format!("field access '.{}'", field), ValueType::Map, t));
                }
                Ok(ValueType::Dyn)
            }
            Member::Index(index) => {
                let t = self.check(inner)?;
                self.check(index)?;
                if !matches!(t, ValueType::List | ValueType::Map | ValueType::Dyn) {
                    return Err(mismatch("index", ValueType::List, t));
                }
                Ok(ValueType::Dyn)
            }
            _ => Err(CelError::Syntax("message construction is not supported".to_string())),
        }
    }

    fn call(
        &mut self,
        name: &str,
        target: Option<&Expression>,
        args: &[Expression],
    ) -> Result<ValueType> {
        let returns = self
            .table
            .function(name)
            .ok_or_else(|| CelError::UnknownFunction(name.to_string()))?;

        if let Some(target) = target {
            self.check(target)?;
        }

        let binding = match args.first() {
            Some(Expression::Ident(var)) if COMPREHENSIONS.contains(&name) && args.len() >= 2 => {
                Some(var.as_str().to_string())
            }
            _ => None,
        };

        let Some(var) = binding else {
            for arg in args {
                self.check(arg)?;
            }
            return Ok(returns);
        };

        self.locals.push(var);
        let body = args[1..].iter().try_fold(ValueType::Dyn, |_, arg| self.check(arg));
        self.locals.pop();
        let body = body?;

        if name != "map" && !body.accepts(ValueType::Bool) {
            return Err(mismatch(&format!("'{}' predicate", name), ValueType::Bool, body));
        }
        Ok(returns)
    }

    /// Dotted path for `a.b.c` chains rooted at a non-local identifier
    fn path_of(&self, expr: &Expression) -> Option<String> {
        match expr {
            Expression::Ident(name) if !self.locals.iter().any(|l| l == name.as_str()) => {
                Some(name.as_str().to_string())
            }
            Expression::Member(inner, member) => match member.as_ref() {
                Member::Attribute(field) => {
                    self.path_of(inner).map(|parent| format!("{}.{}", parent, field.as_str()))
                }
                _ => None,
            },
            _ => None,
        }
    }
}

fn atom_type(atom: &Atom) -> ValueType {
    match atom {
        Atom::Int(_) => ValueType::Int,
        Atom::UInt(_) => ValueType::UInt,
        Atom::Float(_) => ValueType::Double,
        Atom::String(_) => ValueType::String,
        Atom::Bytes(_) => ValueType::Bytes,
        Atom::Bool(_) => ValueType::Bool,
        Atom::Null => ValueType::Null,
    }
}

fn comparable(a: ValueType, b: ValueType) -> bool {
    a == b
        || a == ValueType::Dyn
        || b == ValueType::Dyn
        || a == ValueType::Null
        || b == ValueType::Null
        || (a.is_numeric() && b.is_numeric())
}

fn mismatch(context: &str, expected: ValueType, found: ValueType) -> CelError {
    CelError::TypeMismatch {
        context: context.to_string(),
        expected: expected.to_string(),
        found: found.to_string(),
    }
}
