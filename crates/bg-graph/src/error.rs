//! Graph-specific error types.

use bg_core::{BgError, CompId};
use thiserror::Error;

/// Construction and mutation errors.
///
/// Every operation that returns one of these leaves the graph unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The port is already bonded or exposed.
    #[error("Port {port} is already attached")]
    PortBusy { port: String },

    /// The port handle was issued by a different graph.
    #[error("Port {comp}.{index} belongs to another graph")]
    Scope { comp: CompId, index: u32 },

    #[error("Exposure label already in use: {label}")]
    DuplicateLabel { label: String },

    #[error("Component name already in use: {name}")]
    DuplicateName { name: String },

    /// Names are path segments and may not be empty or contain '.'.
    #[error("Invalid component name: {name:?}")]
    InvalidName { name: String },

    /// Port count or constitutive relation does not fit the component kind.
    #[error("Component {component}: {reason}")]
    ArityMismatch { component: String, reason: String },

    #[error("{what} not found")]
    NotFound { what: String },
}

pub type GraphResult<T> = Result<T, GraphError>;

impl From<GraphError> for BgError {
    fn from(err: GraphError) -> Self {
        BgError::Model {
            what: err.to_string(),
        }
    }
}
