use thiserror::Error;

use crate::location::Location;

#[derive(Debug, Error)]
pub enum Error {
    #[error("location {location} assigned twice (to `{first}` and `{second}`)")]
    DuplicateLocation {
        location: Location,
        first: String,
        second: String,
    },

    #[error("value `{0}` has no location")]
    MissingLocation(String),

    #[error("function `{0}` has no flow graph")]
    MissingGraph(String),

    #[error("call to `{callee}` passes {actual} arguments, expected {expected}")]
    ArityMismatch {
        callee: String,
        expected: usize,
        actual: usize,
    },

    #[error("invalid program: {0}")]
    InvalidProgram(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("uninitialized loads still unresolved after {rounds} repair rounds: {loads:?}")]
    NotConverged { rounds: usize, loads: Vec<String> },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
