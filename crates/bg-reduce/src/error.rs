//! Reduction error types.

use bg_core::BgError;
use bg_graph::GraphError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReduceError {
    /// A port is neither bonded nor exposed.
    #[error("Incomplete model: port {port} is not connected")]
    IncompleteModel { port: String },

    /// No admissible causal assignment exists.
    #[error("Causality conflict at [{}]: {reason}", .components.join(", "))]
    CausalityConflict {
        components: Vec<String>,
        reason: String,
    },

    /// The algebraic relations form a cycle; `components` lists the
    /// components along one such cycle.
    #[error("Algebraic loop through [{}]", .components.join(", "))]
    AlgebraicLoop { components: Vec<String> },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Invariant violated: {what}")]
    Invariant { what: String },
}

pub type ReduceResult<T> = Result<T, ReduceError>;

impl From<ReduceError> for BgError {
    fn from(err: ReduceError) -> Self {
        BgError::Model {
            what: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_lists_components() {
        let err = ReduceError::AlgebraicLoop {
            components: vec!["J".into(), "R1".into()],
        };
        assert_eq!(err.to_string(), "Algebraic loop through [J, R1]");
        let core: BgError = err.into();
        assert!(core.to_string().contains("R1"));
    }
}
