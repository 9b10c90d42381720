pub mod types;

pub use types::{AppError, JobError};

/// Convenience result alias used across the service layer
pub type AppResult<T> = Result<T, AppError>;
