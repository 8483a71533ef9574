use thiserror::Error;
use traj_core::TrajError;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("invalid mask: {0}")]
    InvalidMask(String),
    #[error("empty input: {0}")]
    EmptyInput(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error(
        "distance matrix for {n_frames} frames requires {required_bytes} bytes ({}); \
         enable the sieve to cluster a subset",
        budget_note(.budget_bytes)
    )]
    OutOfMemory {
        n_frames: usize,
        required_bytes: usize,
        budget_bytes: Option<usize>,
    },
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Traj(TrajError),
}

fn budget_note(budget_bytes: &Option<usize>) -> String {
    match budget_bytes {
        Some(limit) => format!("memory_budget_bytes={limit}"),
        None => "allocation failed".to_string(),
    }
}

pub type ClusterResult<T> = Result<T, ClusterError>;

impl ClusterError {
    /// Stable machine-readable code used in streamed error events.
    pub fn code(&self) -> &'static str {
        match self {
            ClusterError::InvalidMask(_) => "invalid_mask",
            ClusterError::EmptyInput(_) => "empty_input",
            ClusterError::InvalidParameter(_) => "invalid_parameter",
            ClusterError::OutOfMemory { .. } => "out_of_memory",
            ClusterError::Config(_) => "config",
            ClusterError::Io(_) => "io",
            ClusterError::Traj(_) => "trajectory",
        }
    }
}

impl From<TrajError> for ClusterError {
    fn from(err: TrajError) -> Self {
        match err {
            TrajError::InvalidSelection(msg) => ClusterError::InvalidMask(msg),
            other => ClusterError::Traj(other),
        }
    }
}
