use tracing::instrument;

use crate::types::{EvaluationContext, Expr, LogicalOp, Value};

use super::{FormulaError, FormulaLimits, functions, ops};

/// Evaluates validated formula trees against an [`EvaluationContext`].
///
/// The interpreter holds no mutable state; one instance can be shared across
/// threads and used for any number of evaluations.
#[derive(Debug, Clone, Default)]
pub struct Interpreter {
    limits: FormulaLimits,
}

impl Interpreter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_limits(limits: FormulaLimits) -> Self {
        Self { limits }
    }

    #[must_use]
    pub fn limits(&self) -> &FormulaLimits {
        &self.limits
    }

    /// Parse and validate `source` under this interpreter's limits.
    ///
    /// # Errors
    ///
    /// Returns [`FormulaError::Syntax`] or [`FormulaError::Validation`].
    pub fn parse(&self, source: &str) -> Result<Expr, FormulaError> {
        super::parse_with_limits(source, &self.limits)
    }

    /// Evaluate a formula to a finite number. Boolean results count as 1 or 0.
    ///
    /// # Errors
    ///
    /// Returns [`FormulaError::UndefinedVariable`] for unknown fields and
    /// [`FormulaError::Evaluation`] for type errors, division by zero,
    /// non-numeric or non-finite results.
    pub fn evaluate(&self, expr: &Expr, context: &EvaluationContext) -> Result<f64, FormulaError> {
        let value = self.evaluate_value(expr, context)?;
        numeric_result(&value)
    }

    /// Evaluate a formula to its raw [`Value`].
    ///
    /// # Errors
    ///
    /// See [`evaluate`](Self::evaluate).
    pub fn evaluate_value(
        &self,
        expr: &Expr,
        context: &EvaluationContext,
    ) -> Result<Value, FormulaError> {
        self.eval(expr, context, 1)
    }

    /// Parse, validate and evaluate `source` in one step.
    ///
    /// # Errors
    ///
    /// Any error from [`parse`](Self::parse) or [`evaluate`](Self::evaluate).
    #[instrument(level = "trace", skip(self, context))]
    pub fn evaluate_source(
        &self,
        source: &str,
        context: &EvaluationContext,
    ) -> Result<f64, FormulaError> {
        let expr = self.parse(source)?;
        self.evaluate(&expr, context)
    }

    fn eval(
        &self,
        expr: &Expr,
        context: &EvaluationContext,
        depth: usize,
    ) -> Result<Value, FormulaError> {
        if depth > self.limits.max_depth {
            return Err(FormulaError::evaluation(format!(
                "formula nesting exceeds the maximum depth of {}",
                self.limits.max_depth
            )));
        }
        let next = depth + 1;

        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Variable(name) => resolve_variable(name, context),
            Expr::Attribute { .. } => {
                let path = expr.dotted_path().ok_or_else(|| {
                    FormulaError::evaluation("attribute access is only allowed on field paths")
                })?;
                resolve_path(&path, context)
            }
            Expr::Binary { op, left, right } => {
                let l = self.eval(left, context, next)?;
                let r = self.eval(right, context, next)?;
                ops::binary(*op, &l, &r)
            }
            Expr::Unary { op, operand } => {
                let v = self.eval(operand, context, next)?;
                ops::unary(*op, &v)
            }
            Expr::Compare { first, rest } => {
                let mut left = self.eval(first, context, next)?;
                for (op, e) in rest {
                    let right = self.eval(e, context, next)?;
                    if !ops::compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::Logical { op, left, right } => {
                let l = self.eval(left, context, next)?;
                match op {
                    LogicalOp::And if !l.is_truthy() => Ok(l),
                    LogicalOp::Or if l.is_truthy() => Ok(l),
                    _ => self.eval(right, context, next),
                }
            }
            Expr::Call { function, args } => {
                let f = functions::lookup(function).ok_or_else(|| {
                    FormulaError::evaluation(format!("function '{function}' is not allowed"))
                })?;
                let args = args
                    .iter()
                    .map(|a| self.eval(a, context, next))
                    .collect::<Result<Vec<_>, _>>()?;
                f.call(&args)
            }
            Expr::Conditional {
                test,
                then,
                otherwise,
            } => {
                if self.eval(test, context, next)?.is_truthy() {
                    self.eval(then, context, next)
                } else {
                    self.eval(otherwise, context, next)
                }
            }
            Expr::List(items) | Expr::Tuple(items) => items
                .iter()
                .map(|e| self.eval(e, context, next))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Expr::Subscript { object, index } => {
                let object = self.eval(object, context, next)?;
                let index = self.eval(index, context, next)?;
                subscript(&object, &index)
            }
        }
    }
}

fn group_error(path: &str) -> FormulaError {
    FormulaError::evaluation(format!(
        "'{path}' is a group of fields; reference one of them, e.g. {path}.<field>"
    ))
}

fn resolve_variable(name: &str, context: &EvaluationContext) -> Result<Value, FormulaError> {
    if let Some(v) = context.get_flat(name) {
        return Ok(v.clone());
    }
    if context.is_group(name) {
        return Err(group_error(name));
    }
    Err(FormulaError::UndefinedVariable {
        name: name.to_owned(),
        available: context.field_paths(),
    })
}

fn resolve_path(path: &str, context: &EvaluationContext) -> Result<Value, FormulaError> {
    if let Some(v) = context.lookup(path) {
        return Ok(v.clone());
    }
    if context.is_group(path) {
        return Err(group_error(path));
    }
    Err(FormulaError::UndefinedVariable {
        name: path.to_owned(),
        available: context.field_paths(),
    })
}

fn subscript(object: &Value, index: &Value) -> Result<Value, FormulaError> {
    let i = match index {
        Value::Int(i) => *i,
        Value::Bool(b) => i64::from(*b),
        other => {
            return Err(FormulaError::evaluation(format!(
                "indices must be integers, got '{}'",
                other.type_name()
            )));
        }
    };
    let resolve = |len: usize| -> Result<usize, FormulaError> {
        let len_i = i64::try_from(len).unwrap_or(i64::MAX);
        let idx = if i < 0 { i + len_i } else { i };
        usize::try_from(idx)
            .ok()
            .filter(|&idx| idx < len)
            .ok_or_else(|| FormulaError::evaluation("index out of range"))
    };
    match object {
        Value::List(items) => Ok(items[resolve(items.len())?].clone()),
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::String(chars[resolve(chars.len())?].to_string()))
        }
        other => Err(FormulaError::evaluation(format!(
            "'{}' values are not subscriptable",
            other.type_name()
        ))),
    }
}

#[allow(clippy::cast_precision_loss)]
fn numeric_result(value: &Value) -> Result<f64, FormulaError> {
    let n = match value {
        Value::Int(v) => *v as f64,
        Value::Float(v) => *v,
        Value::Bool(b) => f64::from(u8::from(*b)),
        other => {
            return Err(FormulaError::evaluation(format!(
                "formula must evaluate to a number, got '{}'",
                other.type_name()
            )));
        }
    };
    if !n.is_finite() {
        return Err(FormulaError::evaluation(
            "formula result is not a finite number",
        ));
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> EvaluationContext {
        EvaluationContext::from_json(&serde_json::json!({
            "ram_gb": 16,
            "condition": "used",
            "cpu": {"cores": 8, "threads": 16},
            "storage": {"primary": {"capacity_gb": 2000}},
            "disks": [1, 2, 3],
            "flag": true
        }))
        .unwrap()
    }

    fn eval(source: &str) -> Result<f64, FormulaError> {
        Interpreter::new().evaluate_source(source, &ctx())
    }

    fn eval_value(source: &str) -> Value {
        let interp = Interpreter::new();
        let expr = interp.parse(source).unwrap();
        interp.evaluate_value(&expr, &ctx()).unwrap()
    }

    #[test]
    fn hand_built_call_outside_the_registry_is_refused() {
        let expr = Expr::Call {
            function: "exec".into(),
            args: vec![],
        };
        let err = Interpreter::new().evaluate(&expr, &ctx()).unwrap_err();
        assert!(matches!(
            &err,
            FormulaError::Evaluation { message } if message.contains("is not allowed")
        ));
        assert!(err.to_string().contains("'exec'"));
    }

    #[test]
    fn arithmetic_over_fields() {
        assert_eq!(eval("ram_gb * 2.5").unwrap(), 40.0);
        assert_eq!(eval("cpu.cores * 5 + 10").unwrap(), 50.0);
        assert_eq!(eval("storage.primary.capacity_gb / 1000").unwrap(), 2.0);
    }

    #[test]
    fn flat_and_nested_spellings_agree() {
        assert_eq!(eval("cpu_cores").unwrap(), eval("cpu.cores").unwrap());
        assert_eq!(eval("storage_primary_capacity_gb").unwrap(), 2000.0);
    }

    #[test]
    fn precedence_and_power() {
        assert_eq!(eval("-2 ** 2").unwrap(), -4.0);
        assert_eq!(eval("2 ** 3 ** 2").unwrap(), 512.0);
        assert_eq!(eval("(1 + 2) * 3").unwrap(), 9.0);
        assert_eq!(eval("7 // 2 + 7 % 2").unwrap(), 4.0);
    }

    #[test]
    fn conditional_and_comparisons() {
        assert_eq!(eval("1.5 if condition == 'used' else 2").unwrap(), 1.5);
        assert_eq!(eval("0 < ram_gb <= 16").unwrap(), 1.0);
        assert_eq!(eval("0 < ram_gb < 16").unwrap(), 0.0);
        assert_eq!(eval("ram_gb > 8 and cpu.cores > 4").unwrap(), 1.0);
        assert_eq!(eval("not flag").unwrap(), 0.0);
    }

    #[test]
    fn logical_operators_return_operands() {
        assert_eq!(eval_value("0 or ram_gb"), Value::Int(16));
        assert_eq!(eval_value("0 and missing_field"), Value::Int(0));
    }

    #[test]
    fn functions_and_sequences() {
        assert_eq!(eval("max(ram_gb, 32)").unwrap(), 32.0);
        assert_eq!(eval("sum(disks)").unwrap(), 6.0);
        assert_eq!(eval("disks[-1]").unwrap(), 3.0);
        assert_eq!(eval("min([4, 2, 9])").unwrap(), 2.0);
        assert_eq!(eval("round(2.5)").unwrap(), 2.0);
    }

    #[test]
    fn undefined_variable_lists_fields() {
        let err = eval("ram * 2").unwrap_err();
        let FormulaError::UndefinedVariable { name, available } = err else {
            panic!("expected undefined variable");
        };
        assert_eq!(name, "ram");
        assert!(available.contains(&"ram_gb".to_owned()));
        assert!(available.contains(&"cpu.cores".to_owned()));
    }

    #[test]
    fn undefined_attribute_path() {
        let err = eval("cpu.sockets").unwrap_err();
        assert!(matches!(err, FormulaError::UndefinedVariable { ref name, .. } if name == "cpu.sockets"));
    }

    #[test]
    fn groups_are_not_values() {
        let err = eval("cpu * 2").unwrap_err();
        assert!(err.to_string().contains("'cpu' is a group of fields"));
    }

    #[test]
    fn runtime_errors() {
        assert!(matches!(eval("1 / 0"), Err(FormulaError::Evaluation { .. })));
        assert!(eval("condition * 1.5").is_err());
        assert!(eval("condition").unwrap_err().to_string().contains("got 'string'"));
        assert!(eval("10.0 ** 400").unwrap_err().to_string().contains("finite"));
        assert!(eval("disks[5]").is_err());
    }

    #[test]
    fn boolean_results_are_numeric() {
        assert_eq!(eval("True").unwrap(), 1.0);
        assert_eq!(eval("ram_gb == 32").unwrap(), 0.0);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let interp = Interpreter::new();
        let expr = interp.parse("round(ram_gb * 1.15, 2) + sqrt(cpu.cores)").unwrap();
        let context = ctx();
        let first = interp.evaluate(&expr, &context).unwrap();
        for _ in 0..10 {
            assert_eq!(interp.evaluate(&expr, &context).unwrap(), first);
        }
    }

    #[test]
    fn programmatic_trees_respect_the_depth_limit() {
        let mut expr = Expr::Literal(Value::Int(1));
        for _ in 0..20 {
            expr = Expr::Unary {
                op: crate::types::UnaryOp::Neg,
                operand: Box::new(expr),
            };
        }
        let interp = Interpreter::with_limits(FormulaLimits {
            max_length: 100,
            max_depth: 10,
        });
        let err = interp.evaluate(&expr, &ctx()).unwrap_err();
        assert!(err.to_string().contains("maximum depth"));
    }
}
