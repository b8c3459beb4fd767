//! Errors raised while orchestrating an assignment run

use thiserror::Error;

use crate::scenario::{FunctionId, MatrixId};

pub type Result<T> = std::result::Result<T, Error>;

/// Boxed failure reported by an external solver.
pub type SolverError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure reported by the network/matrix store behind a [`crate::Scenario`].
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct EngineError(pub String);

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{role} attribute {name} does not exist")]
    MissingAttribute { role: &'static str, name: String },

    #[error("matrix {0} was not found")]
    MissingMatrix(MatrixId),

    #[error("output matrix name \"{0}\" does not exist")]
    UnknownOutputMatrix(String),

    #[error(
        "function {function} already uses us3, which is reserved for transit segment \
         congestion values; modify the expression to use different attributes"
    )]
    ReservedCongestionVariable { function: FunctionId },

    #[error("no unused transit time function id left to remap function {0}")]
    FunctionIdsExhausted(FunctionId),

    #[error("transit assignment failed for class {class}")]
    Solver {
        class: String,
        #[source]
        source: SolverError,
    },

    #[error("scenario engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("invalid parameter document: {0}")]
    Parameters(#[from] serde_json::Error),

    #[error("could not read parameter document: {0}")]
    Io(#[from] std::io::Error),
}
