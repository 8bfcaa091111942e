//! Arithmetic, unary and comparison semantics for formula values.

use crate::types::{BinaryOp, CompareOp, UnaryOp, Value};

use super::FormulaError;

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn of(value: &Value) -> Option<Num> {
        match value {
            Value::Int(v) => Some(Num::Int(*v)),
            Value::Float(v) => Some(Num::Float(*v)),
            Value::Bool(b) => Some(Num::Int(i64::from(*b))),
            _ => None,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn to_f64(self) -> f64 {
        match self {
            Num::Int(v) => v as f64,
            Num::Float(v) => v,
        }
    }
}

/// Convert a float to an integer when it fits `i64` exactly in range.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub(crate) fn float_to_int(v: f64) -> Option<i64> {
    if v.is_finite() && v >= i64::MIN as f64 && v < i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

fn unsupported(op: BinaryOp, left: &Value, right: &Value) -> FormulaError {
    FormulaError::evaluation(format!(
        "unsupported operand types for {op}: '{}' and '{}'",
        left.type_name(),
        right.type_name()
    ))
}

fn zero_division(op: BinaryOp) -> FormulaError {
    match op {
        BinaryOp::Mod => FormulaError::evaluation("modulo by zero"),
        _ => FormulaError::evaluation("division by zero"),
    }
}

/// Apply a binary arithmetic operator.
pub(crate) fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, FormulaError> {
    match (op, left, right) {
        (BinaryOp::Add, Value::String(a), Value::String(b)) => {
            return Ok(Value::String(format!("{a}{b}")));
        }
        (BinaryOp::Add, Value::List(a), Value::List(b)) => {
            return Ok(Value::List(a.iter().chain(b).cloned().collect()));
        }
        (BinaryOp::Mul, Value::String(_) | Value::List(_), _)
        | (BinaryOp::Mul, _, Value::String(_) | Value::List(_)) => {
            return Err(FormulaError::evaluation(
                "sequence repetition is not supported",
            ));
        }
        _ => {}
    }

    let (Some(a), Some(b)) = (Num::of(left), Num::of(right)) else {
        return Err(unsupported(op, left, right));
    };

    match (a, b) {
        (Num::Int(x), Num::Int(y)) => int_binary(op, x, y),
        _ => float_binary(op, a.to_f64(), b.to_f64()),
    }
}

#[allow(clippy::cast_precision_loss)]
fn int_binary(op: BinaryOp, x: i64, y: i64) -> Result<Value, FormulaError> {
    // Overflowing integer results fall back to float arithmetic.
    let promoted = || float_binary(op, x as f64, y as f64);
    match op {
        BinaryOp::Add => x.checked_add(y).map_or_else(promoted, |v| Ok(Value::Int(v))),
        BinaryOp::Sub => x.checked_sub(y).map_or_else(promoted, |v| Ok(Value::Int(v))),
        BinaryOp::Mul => x.checked_mul(y).map_or_else(promoted, |v| Ok(Value::Int(v))),
        BinaryOp::Div => float_binary(op, x as f64, y as f64),
        BinaryOp::FloorDiv => {
            if y == 0 {
                return Err(zero_division(op));
            }
            match x.checked_div(y) {
                Some(q) => {
                    let q = if (x % y != 0) && ((x < 0) != (y < 0)) { q - 1 } else { q };
                    Ok(Value::Int(q))
                }
                None => promoted(),
            }
        }
        BinaryOp::Mod => {
            if y == 0 {
                return Err(zero_division(op));
            }
            match x.checked_rem(y) {
                Some(r) => {
                    let r = if r != 0 && ((r < 0) != (y < 0)) { r + y } else { r };
                    Ok(Value::Int(r))
                }
                None => Ok(Value::Int(0)),
            }
        }
        BinaryOp::Pow => {
            if y >= 0 {
                u32::try_from(y)
                    .ok()
                    .and_then(|e| x.checked_pow(e))
                    .map_or_else(promoted, |v| Ok(Value::Int(v)))
            } else {
                promoted()
            }
        }
    }
}

/// Floored quotient and remainder of `x / y`, `y` non-zero. The quotient is
/// derived from the remainder so that `x == q * y + r` holds.
fn float_divmod(x: f64, y: f64) -> (f64, f64) {
    let mut r = x % y;
    let mut q = (x - r) / y;
    if r != 0.0 {
        if (r < 0.0) != (y < 0.0) {
            r += y;
            q -= 1.0;
        }
    } else {
        r = 0.0_f64.copysign(y);
    }
    if q == 0.0 {
        return (0.0_f64.copysign(x / y), r);
    }
    let mut floored = q.floor();
    if q - floored > 0.5 {
        floored += 1.0;
    }
    (floored, r)
}

fn float_binary(op: BinaryOp, x: f64, y: f64) -> Result<Value, FormulaError> {
    let v = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => {
            if y == 0.0 {
                return Err(zero_division(op));
            }
            x / y
        }
        BinaryOp::FloorDiv => {
            if y == 0.0 {
                return Err(zero_division(op));
            }
            float_divmod(x, y).0
        }
        BinaryOp::Mod => {
            if y == 0.0 {
                return Err(zero_division(op));
            }
            float_divmod(x, y).1
        }
        BinaryOp::Pow => {
            if x == 0.0 && y < 0.0 {
                return Err(FormulaError::evaluation(
                    "zero cannot be raised to a negative power",
                ));
            }
            let v = x.powf(y);
            if v.is_nan() && !x.is_nan() && !y.is_nan() {
                return Err(FormulaError::evaluation(
                    "negative number cannot be raised to a fractional power",
                ));
            }
            v
        }
    };
    Ok(Value::Float(v))
}

/// Apply a unary operator.
pub(crate) fn unary(op: UnaryOp, operand: &Value) -> Result<Value, FormulaError> {
    if op == UnaryOp::Not {
        return Ok(Value::Bool(!operand.is_truthy()));
    }
    let Some(n) = Num::of(operand) else {
        let symbol = if op == UnaryOp::Neg { "-" } else { "+" };
        return Err(FormulaError::evaluation(format!(
            "bad operand type for unary {symbol}: '{}'",
            operand.type_name()
        )));
    };
    Ok(match (op, n) {
        (UnaryOp::Neg, Num::Int(v)) => v
            .checked_neg()
            .map_or_else(|| Value::Float(-n.to_f64()), Value::Int),
        (UnaryOp::Neg, Num::Float(v)) => Value::Float(-v),
        (_, Num::Int(v)) => Value::Int(v),
        (_, Num::Float(v)) => Value::Float(v),
    })
}

/// Evaluate one comparison link.
pub(crate) fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, FormulaError> {
    left.compare(op, right).ok_or_else(|| {
        FormulaError::evaluation(format!(
            "'{op}' is not supported between '{}' and '{}'",
            left.type_name(),
            right.type_name()
        ))
    })
}
