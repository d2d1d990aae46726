//! Error types for expression evaluation.

use bg_core::BgError;
use thiserror::Error;

/// Errors raised when an expression is evaluated numerically.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("Unbound variable: {var}")]
    UnboundVariable { var: String },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("{func} is undefined at {value}")]
    Domain { func: &'static str, value: f64 },

    #[error("Non-finite result: {value}")]
    NonFinite { value: f64 },

    #[error("{got} {what} values supplied, {want} expected")]
    UnusedValues {
        what: String,
        got: usize,
        want: usize,
    },
}

pub type ExprResult<T> = Result<T, ExprError>;

impl From<ExprError> for BgError {
    fn from(e: ExprError) -> Self {
        BgError::InvalidArg {
            what: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_conversion() {
        let err: BgError = ExprError::UnboundVariable { var: "x_0".into() }.into();
        assert!(matches!(err, BgError::InvalidArg { .. }));
        assert!(err.to_string().contains("x_0"));
    }
}
