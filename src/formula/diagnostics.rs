//! Non-fatal formula analysis: heuristics, field references and tree dumps.

use std::collections::BTreeSet;
use std::fmt;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::types::{BinaryOp, Expr, Value};

use super::{FormulaError, parse};

/// Nesting depth above which a formula is flagged as hard to read.
pub const READABLE_DEPTH: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// One finding about a formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Diagnostic {
    fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            position: None,
            suggestion: None,
        }
    }

    fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    fn from_error(err: &FormulaError) -> Self {
        let message = match err {
            FormulaError::Syntax { message, .. } | FormulaError::Validation { message, .. } => {
                message.clone()
            }
            other => other.to_string(),
        };
        Self {
            severity: Severity::Error,
            message,
            position: err.position(),
            suggestion: err.suggestion().map(str::to_owned),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.severity)?;
        if let Some(p) = self.position {
            write!(f, " at position {p}")?;
        }
        write!(f, ": {}", self.message)?;
        if let Some(s) = &self.suggestion {
            write!(f, " (suggestion: {s})")?;
        }
        Ok(())
    }
}

/// Check a formula and report everything worth telling its author.
///
/// Never fails: a formula that does not parse yields a single
/// [`Severity::Error`] diagnostic. An empty result means nothing to report.
#[must_use]
pub fn validate(source: &str) -> Vec<Diagnostic> {
    match parse(source) {
        Ok(expr) => analyze(&expr),
        Err(err) => vec![Diagnostic::from_error(&err)],
    }
}

/// Heuristic diagnostics for an already-parsed formula.
#[must_use]
pub fn analyze(expr: &Expr) -> Vec<Diagnostic> {
    let mut out = Vec::new();

    let mut divisions = Vec::new();
    collect_divisions(expr, &mut divisions);
    if divisions.iter().any(|divisor| !is_nonzero_literal(divisor)) {
        out.push(
            Diagnostic::new(Severity::Warning, "formula divides by a value that may be zero")
                .with_suggestion("guard the divisor, e.g. x / max(y, 1)"),
        );
    }

    let depth = expr.depth();
    if depth > READABLE_DEPTH {
        out.push(
            Diagnostic::new(
                Severity::Warning,
                format!("formula is nested {depth} levels deep"),
            )
            .with_suggestion("split it into simpler rules for readability"),
        );
    }

    if divisions.len() >= 2 {
        out.push(Diagnostic::new(
            Severity::Info,
            format!(
                "formula performs {} divisions; floating-point rounding may accumulate",
                divisions.len()
            ),
        ));
    }

    out
}

fn collect_divisions<'e>(expr: &'e Expr, out: &mut Vec<&'e Expr>) {
    if let Expr::Binary {
        op: BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod,
        right,
        ..
    } = expr
    {
        out.push(right.as_ref());
    }
    for child in expr.children() {
        collect_divisions(child, out);
    }
}

fn is_nonzero_literal(expr: &Expr) -> bool {
    match expr {
        Expr::Literal(Value::Int(v)) => *v != 0,
        Expr::Literal(Value::Float(v)) => *v != 0.0,
        Expr::Unary { operand, .. } => is_nonzero_literal(operand),
        _ => false,
    }
}

/// Every field path a formula reads: dotted paths for attribute chains,
/// bare names for plain variables. Function names are not included.
///
/// # Errors
///
/// Returns the parse error when `source` is not a valid formula.
pub fn extract_field_references(source: &str) -> Result<BTreeSet<String>, FormulaError> {
    Ok(field_references(&parse(source)?))
}

/// Field references of an already-parsed formula.
#[must_use]
pub fn field_references(expr: &Expr) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    collect_references(expr, &mut out);
    out
}

fn collect_references(expr: &Expr, out: &mut BTreeSet<String>) {
    match expr {
        Expr::Variable(name) => {
            out.insert(name.clone());
        }
        Expr::Attribute { .. } => {
            if let Some(path) = expr.dotted_path() {
                out.insert(path);
            }
        }
        _ => {
            for child in expr.children() {
                collect_references(child, out);
            }
        }
    }
}

/// Warn about fields the formula reads that `schema` does not list.
///
/// A reference matches a schema entry when the two agree exactly or after
/// spelling both with `_` in place of `.`.
///
/// # Errors
///
/// Returns the parse error when `source` is not a valid formula.
pub fn check_field_references<S: AsRef<str>>(
    source: &str,
    schema: &[S],
) -> Result<Vec<Diagnostic>, FormulaError> {
    let known: BTreeSet<String> = schema
        .iter()
        .map(|s| s.as_ref().replace('.', "_"))
        .collect();
    Ok(extract_field_references(source)?
        .into_iter()
        .filter(|field| !known.contains(&field.replace('.', "_")))
        .map(|field| {
            Diagnostic::new(
                Severity::Warning,
                format!("field '{field}' is not in the schema"),
            )
            .with_suggestion("check the spelling or add the field to the listing context")
        })
        .collect())
}

/// Indented, one-node-per-line dump of a formula tree.
///
/// # Errors
///
/// Returns the parse error when `source` is not a valid formula.
pub fn render_tree(source: &str) -> Result<String, FormulaError> {
    Ok(render_expr(&parse(source)?))
}

/// Render an already-parsed tree; see [`render_tree`].
#[must_use]
pub fn render_expr(expr: &Expr) -> String {
    let mut out = String::new();
    render_node(expr, 0, &mut out);
    out
}

fn node_label(expr: &Expr) -> String {
    match expr {
        Expr::Literal(v) => format!("Literal({v})"),
        Expr::Variable(name) => format!("Variable({name})"),
        Expr::Attribute { .. } => {
            format!("Attribute({})", expr.dotted_path().unwrap_or_default())
        }
        Expr::Binary { op, .. } => format!("BinaryOp({op})"),
        Expr::Unary { op, .. } => format!("UnaryOp({})", op.to_string().trim_end()),
        Expr::Compare { rest, .. } => {
            let ops: Vec<String> = rest.iter().map(|(op, _)| op.to_string()).collect();
            format!("Compare({})", ops.join(" "))
        }
        Expr::Logical { op, .. } => format!("BoolOp({op})"),
        Expr::Call { function, .. } => format!("Call({function})"),
        Expr::Conditional { .. } => "IfExp".to_owned(),
        Expr::List(_) => "List".to_owned(),
        Expr::Tuple(_) => "Tuple".to_owned(),
        Expr::Subscript { .. } => "Subscript".to_owned(),
    }
}

fn render_node(expr: &Expr, indent: usize, out: &mut String) {
    if !out.is_empty() {
        out.push('\n');
    }
    let _ = write!(out, "{:indent$}{}", "", node_label(expr), indent = indent * 2);
    if matches!(expr, Expr::Attribute { .. }) {
        return;
    }
    for child in expr.children() {
        render_node(child, indent + 1, out);
    }
}
