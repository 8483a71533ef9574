use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrajError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("mismatch: {0}")]
    Mismatch(String),
    #[error("invalid selection: {0}")]
    InvalidSelection(String),
}

pub type TrajResult<T> = Result<T, TrajError>;
