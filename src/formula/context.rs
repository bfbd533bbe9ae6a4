use super::ast::Expr;
use super::functions::{DEFAULT_FUNCTIONS, FunctionRegistry};
use super::operators::{apply_binary, apply_unary};
use super::{ExpressionError, ExpressionResult};
use crate::core::Value;
use crate::core::names::{NAME_PROPERTY, fold, unescape};
use crate::thing::Thing;
use std::collections::HashMap;

/// Binds one thing's property values for the duration of one evaluation.
pub struct EvaluationContext<'a> {
    thing: &'a Thing,
    variables: HashMap<String, Value>,
    registry: &'a FunctionRegistry,
}

impl<'a> EvaluationContext<'a> {
    /// A context with the thing's own name bound as `Name` and the built-in
    /// functions available.
    pub fn new(thing: &'a Thing) -> Self {
        Self::with_registry(thing, &DEFAULT_FUNCTIONS)
    }

    pub fn with_registry(thing: &'a Thing, registry: &'a FunctionRegistry) -> Self {
        let mut context = Self {
            thing,
            variables: HashMap::new(),
            registry,
        };
        context.bind(NAME_PROPERTY, Value::Text(thing.name().to_string()));
        context
    }

    pub fn thing(&self) -> &Thing {
        self.thing
    }

    /// Make `value` visible under `name`; lookups ignore case and brackets.
    pub fn bind(&mut self, name: &str, value: Value) {
        self.variables.insert(fold(&unescape(name)), value);
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.variables.get(&fold(&unescape(name.trim())))
    }

    pub fn evaluate(&self, expr: &Expr) -> ExpressionResult {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Property(name) => self.lookup(name).cloned().ok_or_else(|| {
                ExpressionError::BadValue(format!(
                    "Unknown property [{}] on '{}'",
                    unescape(name),
                    self.thing.name()
                ))
            }),
            Expr::Function { name, args } => match self.registry.find(name) {
                Some(function) => function.evaluate(args, self),
                None => Err(ExpressionError::BadValue(format!(
                    "Unknown function: {}",
                    name
                ))),
            },
            Expr::BinaryOp { left, op, right } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                apply_binary(*op, &left, &right)
            }
            Expr::UnaryOp { op, expr } => {
                let value = self.evaluate(expr)?;
                apply_unary(*op, &value)
            }
        }
    }
}
