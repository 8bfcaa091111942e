use thiserror::Error;

use crate::CompileError;
use crate::config::ConfigError;
use crate::definition::DefinitionError;
use crate::types::ContextError;

/// Unified error type covering definitions, compilation, configuration and I/O.
///
/// Returned by convenience methods like [`RuleSet::from_json()`](crate::RuleSet::from_json)
/// and [`RuleSet::from_file()`](crate::RuleSet::from_file).
#[derive(Debug, Error)]
pub enum ValuatorError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[cfg(feature = "binary-cache")]
    #[error(transparent)]
    Serialize(#[from] crate::serial::SerializeError),

    #[cfg(feature = "binary-cache")]
    #[error(transparent)]
    Deserialize(#[from] crate::serial::DeserializeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_are_transparent() {
        let err = ValuatorError::from(CompileError::DuplicateRule { id: "1".into() });
        assert_eq!(err.to_string(), "duplicate rule id '1'");

        let err = ValuatorError::from(DefinitionError::NotARuleList);
        assert!(matches!(err, ValuatorError::Definition(_)));
    }
}
