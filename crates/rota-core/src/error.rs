use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CoreError {
    /// Short error code string for API-layer responses.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::InvalidId(_) => "INVALID_ID",
            CoreError::Config(_) => "CONFIG_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
