use thiserror::Error;

#[derive(Debug, Error)]
pub enum AadError {
    #[error("tape must be empty to switch adjoint mode")]
    TapeNotEmpty,
    #[error("node {0} is not on the tape")]
    NodeNotOnTape(usize),
}

pub type Result<T> = std::result::Result<T, AadError>;
