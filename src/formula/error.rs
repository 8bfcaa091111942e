use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while parsing, validating or evaluating a formula.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum FormulaError {
    /// Malformed formula text.
    #[error("syntax error{}: {message}{}", at(.position), hint(.suggestion))]
    Syntax {
        message: String,
        position: Option<usize>,
        suggestion: Option<String>,
    },

    /// Well-formed text using a construct outside the allowed grammar.
    #[error("validation error{}: {message}{}", at(.position), hint(.suggestion))]
    Validation {
        message: String,
        position: Option<usize>,
        suggestion: Option<String>,
    },

    /// A referenced field is not present in the evaluation context.
    #[error("undefined variable '{name}'{}", available_hint(.available))]
    UndefinedVariable { name: String, available: Vec<String> },

    /// Runtime type or arithmetic failure.
    #[error("evaluation error: {message}")]
    Evaluation { message: String },
}

impl FormulaError {
    pub(crate) fn syntax(message: impl Into<String>, position: usize) -> Self {
        FormulaError::Syntax {
            message: message.into(),
            position: Some(position),
            suggestion: None,
        }
    }

    pub(crate) fn validation(message: impl Into<String>, position: usize) -> Self {
        FormulaError::Validation {
            message: message.into(),
            position: Some(position),
            suggestion: None,
        }
    }

    pub(crate) fn evaluation(message: impl Into<String>) -> Self {
        FormulaError::Evaluation {
            message: message.into(),
        }
    }

    /// Attach a corrective suggestion to a syntax or validation error.
    #[must_use]
    pub(crate) fn with_suggestion(mut self, hint: impl Into<String>) -> Self {
        if let FormulaError::Syntax { suggestion, .. } | FormulaError::Validation { suggestion, .. } =
            &mut self
        {
            *suggestion = Some(hint.into());
        }
        self
    }

    /// Character offset into the formula source, when known.
    #[must_use]
    pub fn position(&self) -> Option<usize> {
        match self {
            FormulaError::Syntax { position, .. } | FormulaError::Validation { position, .. } => {
                *position
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            FormulaError::Syntax { suggestion, .. }
            | FormulaError::Validation { suggestion, .. } => suggestion.as_deref(),
            _ => None,
        }
    }

    /// Whether the error was raised before evaluation (syntax or validation).
    #[must_use]
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            FormulaError::Syntax { .. } | FormulaError::Validation { .. }
        )
    }
}

fn at(position: &Option<usize>) -> String {
    position.map_or_else(String::new, |p| format!(" at position {p}"))
}

fn hint(suggestion: &Option<String>) -> String {
    suggestion
        .as_ref()
        .map_or_else(String::new, |s| format!(" (suggestion: {s})"))
}

const MAX_LISTED_FIELDS: usize = 8;

fn available_hint(available: &[String]) -> String {
    if available.is_empty() {
        return String::new();
    }
    let shown: Vec<&str> = available
        .iter()
        .take(MAX_LISTED_FIELDS)
        .map(String::as_str)
        .collect();
    let more = available.len().saturating_sub(MAX_LISTED_FIELDS);
    if more > 0 {
        format!("; available: {} and {more} more", shown.join(", "))
    } else {
        format!("; available: {}", shown.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_error_display() {
        let err = FormulaError::syntax("unexpected end of formula", 7)
            .with_suggestion("remove the trailing operator");
        assert_eq!(
            err.to_string(),
            "syntax error at position 7: unexpected end of formula \
             (suggestion: remove the trailing operator)"
        );
        assert_eq!(err.position(), Some(7));
        assert!(err.is_parse_error());
    }

    #[test]
    fn validation_error_display() {
        let err = FormulaError::validation("imports are not allowed", 0);
        assert_eq!(
            err.to_string(),
            "validation error at position 0: imports are not allowed"
        );
        assert_eq!(err.suggestion(), None);
    }

    #[test]
    fn undefined_variable_display() {
        let err = FormulaError::UndefinedVariable {
            name: "ram".into(),
            available: vec!["ram_gb".into(), "cpu.cores".into()],
        };
        assert_eq!(
            err.to_string(),
            "undefined variable 'ram'; available: ram_gb, cpu.cores"
        );
    }

    #[test]
    fn undefined_variable_truncates_long_lists() {
        let available: Vec<String> = (0..10).map(|i| format!("f{i}")).collect();
        let err = FormulaError::UndefinedVariable {
            name: "x".into(),
            available,
        };
        assert!(err.to_string().ends_with("f7 and 2 more"));
    }

    #[test]
    fn evaluation_error_display() {
        let err = FormulaError::evaluation("division by zero");
        assert_eq!(err.to_string(), "evaluation error: division by zero");
        assert!(!err.is_parse_error());
        assert_eq!(err.position(), None);
    }
}
