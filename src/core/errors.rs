//! GL-003: Error taxonomy.
//!
//! - [`DataConversionError`] — the dish cannot produce a requested type
//! - [`UnsupportedDishTypeError`] — a raw value could not be classified
//! - [`UnknownOperationError`] — a step names an unregistered operation
//! - [`OperationError`] — raised by an operation's `run`
//! - [`InterpreterConfigError`] — malformed control flow or exhausted jumps
//!
//! [`RecipeError`] groups what the static pass can raise before a run starts;
//! [`StepError`] groups what a single step can raise while running.

use super::types::{DishType, Host};
use std::fmt;
use thiserror::Error;

/// The dish cannot produce `to` from its current `from` value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot convert {from} to {to}: {cause}")]
pub struct DataConversionError {
    pub from: DishType,
    pub to: DishType,
    pub cause: String,
}

impl DataConversionError {
    pub fn new(from: DishType, to: DishType, cause: impl Into<String>) -> Self {
        Self {
            from,
            to,
            cause: cause.into(),
        }
    }
}

/// A raw host value has no dish type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported dish value: {shape}")]
pub struct UnsupportedDishTypeError {
    pub shape: String,
}

/// A recipe step names an operation the registry does not know.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct UnknownOperationError {
    pub name: String,
    /// Closest registered name, when one differs only in case or spacing.
    pub suggestion: Option<String>,
}

impl fmt::Display for UnknownOperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown operation '{}'", self.name)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{}'?)", s)?;
        }
        Ok(())
    }
}

/// Failure raised by an operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    #[error("{message}")]
    Failed { message: String },

    #[error("invalid argument {}: {message}", .index + 1)]
    InvalidArgument { index: usize, message: String },

    #[error("{op} is not available in the {host} host")]
    Excluded { op: String, host: Host },

    #[error(transparent)]
    Conversion(#[from] DataConversionError),
}

impl OperationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    pub fn invalid_argument(index: usize, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            index,
            message: message.into(),
        }
    }
}

/// Malformed control flow, bad arguments, or an exhausted jump budget.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterpreterConfigError {
    #[error("duplicate label '{name}' at steps {} and {}", .first + 1, .second + 1)]
    DuplicateLabel {
        name: String,
        first: usize,
        second: usize,
    },

    #[error("Merge at step {} has no matching Fork", .step + 1)]
    UnmatchedMerge { step: usize },

    #[error("step {} jumps to unknown label '{label}'", .step + 1)]
    UnknownLabel { step: usize, label: String },

    #[error("step {} jumps to label '{label}' outside its fork branch", .step + 1)]
    CrossRegionJump { step: usize, label: String },

    #[error("step {} ({op}): {message}", .step + 1)]
    InvalidArgument {
        step: usize,
        op: String,
        message: String,
    },

    #[error("reached maximum jumps ({max})")]
    JumpLimitExceeded { step: usize, max: u32 },
}

/// Everything that stops a recipe from starting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecipeError {
    #[error("{0}")]
    Parse(String),

    #[error(transparent)]
    UnknownOperation(#[from] UnknownOperationError),

    #[error(transparent)]
    Config(#[from] InterpreterConfigError),
}

/// Everything a running step can raise.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error(transparent)]
    Conversion(#[from] DataConversionError),

    #[error(transparent)]
    Config(#[from] InterpreterConfigError),
}

impl StepError {
    /// Step failures a Fork with `ignoreErrors` may absorb. Config errors are fatal.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gl003_conversion_message() {
        let e = DataConversionError::new(DishType::Html, DishType::Number, "not numeric");
        assert_eq!(e.to_string(), "cannot convert html to number: not numeric");
    }

    #[test]
    fn test_gl003_unknown_operation_suggestion() {
        let e = UnknownOperationError {
            name: "to base64".into(),
            suggestion: Some("To Base64".into()),
        };
        assert_eq!(
            e.to_string(),
            "unknown operation 'to base64' (did you mean 'To Base64'?)"
        );
        let bare = UnknownOperationError {
            name: "Frobnicate".into(),
            suggestion: None,
        };
        assert_eq!(bare.to_string(), "unknown operation 'Frobnicate'");
    }

    #[test]
    fn test_gl003_step_numbers_are_one_based() {
        let e = InterpreterConfigError::UnmatchedMerge { step: 0 };
        assert_eq!(e.to_string(), "Merge at step 1 has no matching Fork");
        let e = InterpreterConfigError::DuplicateLabel {
            name: "top".into(),
            first: 1,
            second: 4,
        };
        assert!(e.to_string().contains("steps 2 and 5"));
    }

    #[test]
    fn test_gl003_recoverable() {
        let op: StepError = OperationError::new("boom").into();
        assert!(op.is_recoverable());
        let conv: StepError =
            DataConversionError::new(DishType::String, DishType::Json, "bad").into();
        assert!(conv.is_recoverable());
        let cfg: StepError = InterpreterConfigError::JumpLimitExceeded { step: 2, max: 10 }.into();
        assert!(!cfg.is_recoverable());
    }

    #[test]
    fn test_gl003_excluded_message() {
        let e = OperationError::Excluded {
            op: "Sleep".into(),
            host: Host::Cli,
        };
        assert_eq!(e.to_string(), "Sleep is not available in the cli host");
    }
}
