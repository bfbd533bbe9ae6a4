use super::ast::Expr;
use super::context::EvaluationContext;
use super::{ExpressionError, ExpressionResult};
use crate::core::Value;
use crate::schema::massage::parse_date;
use chrono::{Local, NaiveDate};
use lazy_static::lazy_static;
use tracing::debug;

/// A built-in formula function. Receives its arguments unevaluated so that
/// conditionals only evaluate the branch they take.
pub trait FormulaFunction: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(&self, args: &[Expr], context: &EvaluationContext<'_>) -> ExpressionResult;
}

/// Registry of formula functions, looked up by upper-cased name
pub struct FunctionRegistry {
    functions: Vec<Box<dyn FormulaFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self {
            functions: Vec::new(),
        }
    }

    pub fn register(&mut self, function: Box<dyn FormulaFunction>) {
        debug!(function = function.name(), "registered formula function");
        self.functions.push(function);
    }

    pub fn with_default_functions() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(IfFunction));
        registry.register(Box::new(UpperFunction));
        registry.register(Box::new(LowerFunction));
        registry.register(Box::new(LenFunction));
        registry.register(Box::new(DateDiffFunction));
        registry.register(Box::new(TodayFunction));
        registry
    }

    pub fn find(&self, name: &str) -> Option<&dyn FormulaFunction> {
        self.functions
            .iter()
            .find(|f| f.name().eq_ignore_ascii_case(name))
            .map(|boxed| &**boxed)
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::with_default_functions()
    }
}

lazy_static! {
    pub static ref DEFAULT_FUNCTIONS: FunctionRegistry = FunctionRegistry::with_default_functions();
}

fn expect_arity(name: &str, args: &[Expr], expected: usize) -> Result<(), ExpressionError> {
    if args.len() != expected {
        return Err(ExpressionError::BadValue(format!(
            "{} expects {} argument{}, got {}",
            name,
            expected,
            if expected == 1 { "" } else { "s" },
            args.len()
        )));
    }
    Ok(())
}

pub struct IfFunction;

impl FormulaFunction for IfFunction {
    fn name(&self) -> &'static str {
        "IF"
    }

    fn evaluate(&self, args: &[Expr], context: &EvaluationContext<'_>) -> ExpressionResult {
        expect_arity(self.name(), args, 3)?;
        let condition = context.evaluate(&args[0])?;
        if condition.truthy() {
            context.evaluate(&args[1])
        } else {
            context.evaluate(&args[2])
        }
    }
}

fn change_case(
    name: &str,
    args: &[Expr],
    context: &EvaluationContext<'_>,
    convert: fn(&str) -> String,
) -> ExpressionResult {
    expect_arity(name, args, 1)?;
    match context.evaluate(&args[0])? {
        Value::Null => Ok(Value::Null),
        Value::Text(s) => Ok(Value::Text(convert(&s))),
        v if v.is_numeric() => Err(ExpressionError::BadValue(format!(
            "{} expects text, not the number {}",
            name, v
        ))),
        v => Ok(Value::Text(convert(&v.to_string()))),
    }
}

pub struct UpperFunction;

impl FormulaFunction for UpperFunction {
    fn name(&self) -> &'static str {
        "UPPER"
    }

    fn evaluate(&self, args: &[Expr], context: &EvaluationContext<'_>) -> ExpressionResult {
        change_case(self.name(), args, context, str::to_uppercase)
    }
}

pub struct LowerFunction;

impl FormulaFunction for LowerFunction {
    fn name(&self) -> &'static str {
        "LOWER"
    }

    fn evaluate(&self, args: &[Expr], context: &EvaluationContext<'_>) -> ExpressionResult {
        change_case(self.name(), args, context, str::to_lowercase)
    }
}

pub struct LenFunction;

impl FormulaFunction for LenFunction {
    fn name(&self) -> &'static str {
        "LEN"
    }

    fn evaluate(&self, args: &[Expr], context: &EvaluationContext<'_>) -> ExpressionResult {
        expect_arity(self.name(), args, 1)?;
        match context.evaluate(&args[0])? {
            Value::Null => Ok(Value::Null),
            Value::Array(items) => Ok(Value::Integer(items.len() as i64)),
            v => Ok(Value::Integer(v.to_literal().chars().count() as i64)),
        }
    }
}

pub struct DateDiffFunction;

impl DateDiffFunction {
    fn as_date(&self, value: &Value) -> Result<Option<NaiveDate>, ExpressionError> {
        match value {
            Value::Null => Ok(None),
            Value::Date(d) => Ok(Some(*d)),
            Value::Text(s) => parse_date(s).map(Some).ok_or_else(|| {
                ExpressionError::BadValue(format!("DATEDIFF cannot read '{}' as a date", s))
            }),
            other => Err(ExpressionError::BadValue(format!(
                "DATEDIFF expects dates, got {} '{}'",
                other.type_name(),
                other
            ))),
        }
    }
}

impl FormulaFunction for DateDiffFunction {
    fn name(&self) -> &'static str {
        "DATEDIFF"
    }

    fn evaluate(&self, args: &[Expr], context: &EvaluationContext<'_>) -> ExpressionResult {
        expect_arity(self.name(), args, 3)?;
        let interval = context.evaluate(&args[0])?.to_literal();
        let start = self.as_date(&context.evaluate(&args[1])?)?;
        let end = self.as_date(&context.evaluate(&args[2])?)?;

        match interval.to_ascii_lowercase().as_str() {
            "yyyy" => match (start, end) {
                (Some(start), Some(end)) => {
                    Ok(Value::Float((end - start).num_days() as f64 / 365.25))
                }
                _ => Ok(Value::Null),
            },
            other => Err(ExpressionError::BadValue(format!(
                "DATEDIFF interval '{}' is not supported; use \"yyyy\"",
                other
            ))),
        }
    }
}

pub struct TodayFunction;

impl FormulaFunction for TodayFunction {
    fn name(&self) -> &'static str {
        "TODAY"
    }

    fn evaluate(&self, args: &[Expr], _context: &EvaluationContext<'_>) -> ExpressionResult {
        expect_arity(self.name(), args, 0)?;
        Ok(Value::Date(Local::now().date_naive()))
    }
}
