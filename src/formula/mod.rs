//! The formula language: a small, sandboxed arithmetic expression language
//! evaluated against a listing's [`EvaluationContext`](crate::EvaluationContext).
//!
//! Source text goes through three stages before it can run:
//!
//! 1. the lexer splits it into tokens with character offsets,
//! 2. the parser builds a raw tree and rejects statements, assignment and
//!    other forms the grammar does not cover,
//! 3. a whitelist walk converts the raw tree into an [`Expr`], rejecting
//!    method calls, unknown functions and dunder access.
//!
//! Only an [`Expr`] can be evaluated, so nothing reaches the
//! [`Interpreter`] without passing the whitelist.

mod diagnostics;
mod error;
mod functions;
mod interpreter;
mod lexer;
mod ops;
mod parser;
mod validate;

use serde::{Deserialize, Serialize};

pub use diagnostics::{
    Diagnostic, READABLE_DEPTH, Severity, analyze, check_field_references,
    extract_field_references, field_references, render_expr, render_tree, validate,
};
pub use error::FormulaError;
pub use functions::{FUNCTIONS, Function, lookup as lookup_function, names as function_names};
pub use interpreter::Interpreter;

use crate::types::Expr;

/// Safety limits applied while parsing and evaluating formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormulaLimits {
    /// Maximum source length in characters.
    pub max_length: usize,
    /// Maximum nesting depth of the formula tree.
    pub max_depth: usize,
}

impl Default for FormulaLimits {
    fn default() -> Self {
        Self {
            max_length: 10_000,
            max_depth: 64,
        }
    }
}

/// Parse and validate a formula under the default [`FormulaLimits`].
///
/// # Errors
///
/// Returns [`FormulaError::Syntax`] for malformed text and
/// [`FormulaError::Validation`] for constructs outside the language.
pub fn parse(source: &str) -> Result<Expr, FormulaError> {
    parse_with_limits(source, &FormulaLimits::default())
}

/// Parse and validate a formula under explicit limits.
///
/// # Errors
///
/// As [`parse`], plus [`FormulaError::Validation`] when the source is
/// longer than `limits.max_length` or nests deeper than `limits.max_depth`.
pub fn parse_with_limits(source: &str, limits: &FormulaLimits) -> Result<Expr, FormulaError> {
    let length = source.chars().count();
    if length > limits.max_length {
        return Err(FormulaError::validation(
            format!(
                "formula is {length} characters long; the maximum is {}",
                limits.max_length
            ),
            limits.max_length,
        ));
    }
    let tokens = lexer::tokenize(source)?;
    let raw = parser::parse_tokens(&tokens, limits.max_depth)?;
    let expr = validate::lower(raw)?;
    // Tree height bounds the evaluator's recursion.
    let depth = expr.depth();
    if depth > limits.max_depth {
        return Err(FormulaError::validation(
            format!(
                "formula nesting exceeds the maximum depth of {}",
                limits.max_depth
            ),
            0,
        ));
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_formula() {
        let expr = parse("ram_gb * 2.5").unwrap();
        assert_eq!(expr.to_string(), "(ram_gb * 2.5)");
    }

    #[test]
    fn length_limit() {
        let limits = FormulaLimits {
            max_length: 10,
            max_depth: 64,
        };
        let err = parse_with_limits("ram_gb * 2.5 + 1", &limits).unwrap_err();
        assert!(matches!(err, FormulaError::Validation { .. }));
        assert!(err.to_string().contains("maximum is 10"));
        assert!(parse_with_limits("ram_gb", &limits).is_ok());
    }

    #[test]
    fn depth_limit_is_a_validation_error() {
        let source = format!("{}x{}", "abs(".repeat(80), ")".repeat(80));
        assert!(matches!(
            parse(&source),
            Err(FormulaError::Validation { .. })
        ));
    }

    #[test]
    fn tree_height_never_exceeds_limit() {
        let limits = FormulaLimits {
            max_length: 10_000,
            max_depth: 3,
        };
        for source in ["-x + 1", "a < b if c < d else e", "abs(-x)", "-(-(-x))"] {
            if let Ok(expr) = parse_with_limits(source, &limits) {
                assert!(expr.depth() <= 3, "{source}");
            }
        }
    }

    #[test]
    fn function_registry_is_shared() {
        assert_eq!(function_names().len(), FUNCTIONS.len());
        assert!(lookup_function("clamp").is_some());
    }
}
