//! The fixed set of functions a formula may call.

use std::cmp::Ordering;
use std::fmt;

use crate::types::{BinaryOp, Value};

use super::FormulaError;
use super::ops::{self, float_to_int};

type Implementation = fn(&[Value]) -> Result<Value, FormulaError>;

/// A function callable from formulas.
#[derive(Clone, Copy)]
pub struct Function {
    pub name: &'static str,
    pub min_args: usize,
    /// `None` for variadic functions.
    pub max_args: Option<usize>,
    pub summary: &'static str,
    implementation: Implementation,
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .finish_non_exhaustive()
    }
}

impl Function {
    #[must_use]
    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min_args && self.max_args.is_none_or(|max| count <= max)
    }

    /// Human-readable arity, e.g. `"1 or 2 arguments"`.
    #[must_use]
    pub fn arity(&self) -> String {
        let plural = |n: usize| if n == 1 { "argument" } else { "arguments" };
        match self.max_args {
            Some(max) if max == self.min_args => format!("exactly {max} {}", plural(max)),
            Some(max) if max == self.min_args + 1 => {
                format!("{} or {max} {}", self.min_args, plural(max))
            }
            Some(max) => format!("{} to {max} {}", self.min_args, plural(max)),
            None => format!("at least {} {}", self.min_args, plural(self.min_args)),
        }
    }

    /// Invoke the function after checking its arity.
    ///
    /// # Errors
    ///
    /// Returns [`FormulaError::Evaluation`] on an arity mismatch or when the
    /// function rejects its arguments.
    pub fn call(&self, args: &[Value]) -> Result<Value, FormulaError> {
        if !self.accepts(args.len()) {
            return Err(FormulaError::evaluation(format!(
                "{}() takes {}, got {}",
                self.name,
                self.arity(),
                args.len()
            )));
        }
        (self.implementation)(args)
    }
}

/// Every function available to formulas.
pub static FUNCTIONS: &[Function] = &[
    Function {
        name: "abs",
        min_args: 1,
        max_args: Some(1),
        summary: "absolute value",
        implementation: abs,
    },
    Function {
        name: "min",
        min_args: 1,
        max_args: None,
        summary: "smallest argument, or smallest item of one list",
        implementation: min,
    },
    Function {
        name: "max",
        min_args: 1,
        max_args: None,
        summary: "largest argument, or largest item of one list",
        implementation: max,
    },
    Function {
        name: "round",
        min_args: 1,
        max_args: Some(2),
        summary: "round half to even, optionally to n digits",
        implementation: round,
    },
    Function {
        name: "int",
        min_args: 1,
        max_args: Some(1),
        summary: "truncate to an integer",
        implementation: int,
    },
    Function {
        name: "float",
        min_args: 1,
        max_args: Some(1),
        summary: "convert to a float",
        implementation: float,
    },
    Function {
        name: "sum",
        min_args: 1,
        max_args: None,
        summary: "sum of the arguments, or of one list plus an optional start",
        implementation: sum,
    },
    Function {
        name: "sqrt",
        min_args: 1,
        max_args: Some(1),
        summary: "square root",
        implementation: sqrt,
    },
    Function {
        name: "pow",
        min_args: 2,
        max_args: Some(2),
        summary: "x raised to y",
        implementation: pow,
    },
    Function {
        name: "floor",
        min_args: 1,
        max_args: Some(1),
        summary: "largest integer not above x",
        implementation: floor,
    },
    Function {
        name: "ceil",
        min_args: 1,
        max_args: Some(1),
        summary: "smallest integer not below x",
        implementation: ceil,
    },
    Function {
        name: "clamp",
        min_args: 3,
        max_args: Some(3),
        summary: "x limited to the range [lo, hi]",
        implementation: clamp,
    },
];

/// Find a function by name.
#[must_use]
pub fn lookup(name: &str) -> Option<&'static Function> {
    FUNCTIONS.iter().find(|f| f.name == name)
}

/// Names of all functions, in registry order.
#[must_use]
pub fn names() -> Vec<&'static str> {
    FUNCTIONS.iter().map(|f| f.name).collect()
}

// -- Helpers ----------------------------------------------------------------

fn number(function: &str, value: &Value) -> Result<f64, FormulaError> {
    value.as_f64().ok_or_else(|| {
        FormulaError::evaluation(format!(
            "{function}() requires a number, got '{}'",
            value.type_name()
        ))
    })
}

/// A single list argument spreads into its items.
fn spread(args: &[Value]) -> &[Value] {
    match args {
        [Value::List(items)] => items,
        _ => args,
    }
}

fn integral(function: &str, v: f64) -> Result<Value, FormulaError> {
    float_to_int(v).map(Value::Int).ok_or_else(|| {
        FormulaError::evaluation(format!("{function}() cannot convert {v} to an integer"))
    })
}

fn extreme(function: &str, args: &[Value], keep: Ordering) -> Result<Value, FormulaError> {
    let items = spread(args);
    let Some((first, rest)) = items.split_first() else {
        return Err(FormulaError::evaluation(format!(
            "{function}() arg is an empty sequence"
        )));
    };
    let mut best = first;
    for item in rest {
        let ordering = item.partial_cmp_value(best).ok_or_else(|| {
            FormulaError::evaluation(format!(
                "{function}() cannot compare '{}' and '{}'",
                item.type_name(),
                best.type_name()
            ))
        })?;
        if ordering == keep {
            best = item;
        }
    }
    Ok(best.clone())
}

// -- Implementations --------------------------------------------------------

#[allow(clippy::cast_precision_loss)]
fn abs(args: &[Value]) -> Result<Value, FormulaError> {
    match &args[0] {
        Value::Int(v) => Ok(v
            .checked_abs()
            .map_or_else(|| Value::Float(-(i64::MIN as f64)), Value::Int)),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Float(v) => Ok(Value::Float(v.abs())),
        other => Err(FormulaError::evaluation(format!(
            "abs() requires a number, got '{}'",
            other.type_name()
        ))),
    }
}

fn min(args: &[Value]) -> Result<Value, FormulaError> {
    extreme("min", args, Ordering::Less)
}

fn max(args: &[Value]) -> Result<Value, FormulaError> {
    extreme("max", args, Ordering::Greater)
}

#[allow(clippy::cast_precision_loss)]
fn round(args: &[Value]) -> Result<Value, FormulaError> {
    let digits = match args.get(1) {
        None | Some(Value::Null) => None,
        Some(Value::Int(n)) => Some(*n),
        Some(Value::Bool(b)) => Some(i64::from(*b)),
        Some(other) => {
            return Err(FormulaError::evaluation(format!(
                "round() ndigits must be an integer, got '{}'",
                other.type_name()
            )));
        }
    };

    match (&args[0], digits) {
        (Value::Int(v), None) => Ok(Value::Int(*v)),
        (Value::Bool(b), None) => Ok(Value::Int(i64::from(*b))),
        (Value::Float(v), None) => integral("round", v.round_ties_even()),
        (Value::Int(v), Some(n)) if n >= 0 => Ok(Value::Int(*v)),
        (Value::Int(v), Some(n)) => {
            let factor = 10f64.powi(i32::try_from(n.saturating_neg()).unwrap_or(i32::MAX).min(308));
            integral("round", (*v as f64 / factor).round_ties_even() * factor)
        }
        (value, Some(n)) => {
            let v = number("round", value)?;
            let n = i32::try_from(n.clamp(-308, 308)).unwrap_or(0);
            let factor = 10f64.powi(n);
            let scaled = v * factor;
            if !scaled.is_finite() {
                return Ok(Value::Float(v));
            }
            Ok(Value::Float(scaled.round_ties_even() / factor))
        }
        (other, None) => Err(FormulaError::evaluation(format!(
            "round() requires a number, got '{}'",
            other.type_name()
        ))),
    }
}

fn int(args: &[Value]) -> Result<Value, FormulaError> {
    match &args[0] {
        Value::Int(v) => Ok(Value::Int(*v)),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Float(v) => integral("int", v.trunc()),
        Value::String(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
            FormulaError::evaluation(format!("invalid literal for int(): '{s}'"))
        }),
        other => Err(FormulaError::evaluation(format!(
            "int() cannot convert '{}'",
            other.type_name()
        ))),
    }
}

fn float(args: &[Value]) -> Result<Value, FormulaError> {
    match &args[0] {
        Value::String(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
            FormulaError::evaluation(format!("could not convert string to float: '{s}'"))
        }),
        other => number("float", other).map(Value::Float),
    }
}

fn sum(args: &[Value]) -> Result<Value, FormulaError> {
    let (items, start) = match args {
        [Value::List(items)] => (items.as_slice(), Value::Int(0)),
        [Value::List(items), start] => (items.as_slice(), start.clone()),
        _ => (args, Value::Int(0)),
    };
    let mut total = start;
    for item in items {
        if item.as_f64().is_none() {
            return Err(FormulaError::evaluation(format!(
                "sum() requires numbers, got '{}'",
                item.type_name()
            )));
        }
        total = ops::binary(BinaryOp::Add, &total, item)?;
    }
    Ok(total)
}

fn sqrt(args: &[Value]) -> Result<Value, FormulaError> {
    let v = number("sqrt", &args[0])?;
    if v < 0.0 {
        return Err(FormulaError::evaluation("sqrt() of a negative number"));
    }
    Ok(Value::Float(v.sqrt()))
}

fn pow(args: &[Value]) -> Result<Value, FormulaError> {
    ops::binary(BinaryOp::Pow, &args[0], &args[1])
}

fn floor(args: &[Value]) -> Result<Value, FormulaError> {
    match &args[0] {
        Value::Int(v) => Ok(Value::Int(*v)),
        other => integral("floor", number("floor", other)?.floor()),
    }
}

fn ceil(args: &[Value]) -> Result<Value, FormulaError> {
    match &args[0] {
        Value::Int(v) => Ok(Value::Int(*v)),
        other => integral("ceil", number("ceil", other)?.ceil()),
    }
}

fn clamp(args: &[Value]) -> Result<Value, FormulaError> {
    let x = number("clamp", &args[0])?;
    let lo = number("clamp", &args[1])?;
    let hi = number("clamp", &args[2])?;
    if !(lo <= hi) {
        return Err(FormulaError::evaluation(format!(
            "clamp() lower bound {lo} exceeds upper bound {hi}"
        )));
    }
    if x.is_nan() {
        return Err(FormulaError::evaluation("clamp() received NaN"));
    }
    if let (Value::Int(x), Value::Int(lo), Value::Int(hi)) = (&args[0], &args[1], &args[2]) {
        return Ok(Value::Int((*x).clamp(*lo, *hi)));
    }
    let clamped = if x < lo {
        lo
    } else if x > hi {
        hi
    } else {
        x
    };
    Ok(Value::Float(clamped))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Vec<Value>) -> Result<Value, FormulaError> {
        lookup(name).unwrap().call(&args)
    }

    #[test]
    fn registry_contents() {
        assert_eq!(
            names(),
            vec![
                "abs", "min", "max", "round", "int", "float", "sum", "sqrt", "pow", "floor",
                "ceil", "clamp"
            ]
        );
        assert!(lookup("eval").is_none());
        assert!(lookup("__import__").is_none());
    }

    #[test]
    fn arity_descriptions() {
        assert_eq!(lookup("abs").unwrap().arity(), "exactly 1 argument");
        assert_eq!(lookup("round").unwrap().arity(), "1 or 2 arguments");
        assert_eq!(lookup("clamp").unwrap().arity(), "exactly 3 arguments");
        assert_eq!(lookup("max").unwrap().arity(), "at least 1 argument");
        let err = call("abs", vec![]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "evaluation error: abs() takes exactly 1 argument, got 0"
        );
    }

    #[test]
    fn round_half_to_even() {
        assert_eq!(call("round", vec![Value::Float(2.5)]).unwrap(), Value::Int(2));
        assert_eq!(call("round", vec![Value::Float(3.5)]).unwrap(), Value::Int(4));
        assert_eq!(call("round", vec![Value::Float(-0.5)]).unwrap(), Value::Int(0));
        assert_eq!(
            call("round", vec![Value::Float(1.25), Value::Int(1)]).unwrap(),
            Value::Float(1.2)
        );
        assert_eq!(
            call("round", vec![Value::Int(1250), Value::Int(-2)]).unwrap(),
            Value::Int(1200)
        );
    }

    #[test]
    fn min_max_accept_lists_or_varargs() {
        assert_eq!(
            call("max", vec![Value::Int(1), Value::Float(2.5)]).unwrap(),
            Value::Float(2.5)
        );
        assert_eq!(
            call("min", vec![Value::from(vec![3_i64, 1, 2])]).unwrap(),
            Value::Int(1)
        );
        assert!(call("min", vec![Value::List(vec![])]).is_err());
        assert!(call("max", vec![Value::Int(1), Value::from("a")]).is_err());
    }

    #[test]
    fn sum_forms() {
        assert_eq!(
            call("sum", vec![Value::from(vec![1_i64, 2, 3])]).unwrap(),
            Value::Int(6)
        );
        assert_eq!(
            call("sum", vec![Value::from(vec![1_i64, 2]), Value::Float(0.5)]).unwrap(),
            Value::Float(3.5)
        );
        assert_eq!(
            call("sum", vec![Value::Int(1), Value::Int(2)]).unwrap(),
            Value::Int(3)
        );
        assert!(call("sum", vec![Value::from(vec!["a"])]).is_err());
    }

    #[test]
    fn conversions() {
        assert_eq!(call("int", vec![Value::Float(-2.7)]).unwrap(), Value::Int(-2));
        assert_eq!(call("int", vec![Value::from("42")]).unwrap(), Value::Int(42));
        assert!(call("int", vec![Value::Float(f64::INFINITY)]).is_err());
        assert_eq!(call("float", vec![Value::Int(2)]).unwrap(), Value::Float(2.0));
        assert_eq!(call("floor", vec![Value::Float(-1.5)]).unwrap(), Value::Int(-2));
        assert_eq!(call("ceil", vec![Value::Float(1.2)]).unwrap(), Value::Int(2));
    }

    #[test]
    fn math_domain() {
        assert_eq!(call("sqrt", vec![Value::Int(16)]).unwrap(), Value::Float(4.0));
        assert!(call("sqrt", vec![Value::Int(-1)]).is_err());
        assert_eq!(
            call("pow", vec![Value::Int(2), Value::Int(3)]).unwrap(),
            Value::Int(8)
        );
    }

    #[test]
    fn clamp_bounds() {
        assert_eq!(
            call("clamp", vec![Value::Int(15), Value::Int(0), Value::Int(10)]).unwrap(),
            Value::Int(10)
        );
        assert_eq!(
            call("clamp", vec![Value::Float(-1.5), Value::Int(0), Value::Int(10)]).unwrap(),
            Value::Float(0.0)
        );
        assert!(call("clamp", vec![Value::Int(1), Value::Int(5), Value::Int(0)]).is_err());
    }
}
