//! Formula engine for calculated fields.
//!
//! A formula is parsed once into an [`Expr`] tree and evaluated against an
//! [`EvaluationContext`] that binds one thing's property values by display
//! name. Parse failures and value failures are reported as distinct
//! [`ExpressionError`] kinds.

pub mod ast;
pub mod context;
pub mod functions;
pub mod operators;
pub mod parser;

pub use ast::{BinaryOp, Expr, UnaryOp};
pub use context::EvaluationContext;
pub use functions::{FormulaFunction, FunctionRegistry};

use crate::core::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Formula parse error: {0}")]
    FormulaParse(String),

    #[error("Bad value: {0}")]
    BadValue(String),
}

pub type ExpressionResult = std::result::Result<Value, ExpressionError>;

/// A parsed formula together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    expr: Expr,
}

impl Formula {
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let expr = parser::parse(source)?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn evaluate(&self, context: &EvaluationContext<'_>) -> ExpressionResult {
        context.evaluate(&self.expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thing::Thing;
    use chrono::NaiveDate;

    fn context_for<'a>(thing: &'a Thing, bindings: &[(&str, Value)]) -> EvaluationContext<'a> {
        let mut context = EvaluationContext::new(thing);
        for (name, value) in bindings {
            context.bind(name, value.clone());
        }
        context
    }

    #[test]
    fn test_if_picks_branch() {
        let thing = Thing::new("Alice").unwrap();
        let formula = Formula::parse(r#"IF([Age]>18,"adult","minor")"#).unwrap();

        let adult = context_for(&thing, &[("Age", Value::Integer(20))]);
        assert_eq!(formula.evaluate(&adult).unwrap(), Value::from("adult"));

        let minor = context_for(&thing, &[("Age", Value::Integer(10))]);
        assert_eq!(formula.evaluate(&minor).unwrap(), Value::from("minor"));
    }

    #[test]
    fn test_upper_rejects_numbers() {
        let thing = Thing::new("Bob").unwrap();
        let context = context_for(&thing, &[]);
        let err = Formula::parse("UPPER(42)").unwrap().evaluate(&context).unwrap_err();
        assert!(matches!(err, ExpressionError::BadValue(_)));

        let ok = Formula::parse("UPPER([Name])").unwrap().evaluate(&context).unwrap();
        assert_eq!(ok, Value::from("BOB"));
    }

    #[test]
    fn test_datediff_years() {
        let thing = Thing::new("Carol").unwrap();
        let born = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
        let context = context_for(&thing, &[("[Birth Date]", Value::Date(born))]);
        let result = Formula::parse(r#"DATEDIFF("yyyy", [Birth Date], "2010-01-01")"#)
            .unwrap()
            .evaluate(&context)
            .unwrap();
        let years = result.as_f64().unwrap();
        assert!((years - 3653.0 / 365.25).abs() < 1e-9);

        let bad = Formula::parse(r#"DATEDIFF("mm", [Birth Date], "2010-01-01")"#)
            .unwrap()
            .evaluate(&context);
        assert!(matches!(bad, Err(ExpressionError::BadValue(_))));
    }

    #[test]
    fn test_arity_and_unknowns() {
        let thing = Thing::new("Dan").unwrap();
        let context = context_for(&thing, &[]);
        for source in ["IF(1, 2)", "NOPE(1)", "[Missing] + 1"] {
            let result = Formula::parse(source).unwrap().evaluate(&context);
            assert!(matches!(result, Err(ExpressionError::BadValue(_))), "{}", source);
        }
    }

    #[test]
    fn test_referenced_properties() {
        let formula = Formula::parse(r#"IF([Age] > 18, [First Name] & "!", Nick)"#).unwrap();
        assert_eq!(
            formula.expr().referenced_properties(),
            vec!["Age", "First Name", "Nick"]
        );
    }
}
