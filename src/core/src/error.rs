use thiserror::Error;

/// Traefiker error types
#[derive(Error, Debug)]
pub enum DeployError {
    /// Malformed mount, port, link or restart entry
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Image build failed or never reported a tagged image
    #[error("Build error: {0}")]
    BuildError(String),

    /// Backend refused to create or start an instance
    #[error("Launch failed for {image}: {message}")]
    LaunchError { image: String, message: String },

    /// Stopping a previous instance failed
    #[error("Stop failed for {id}: {message}")]
    StopError { id: String, message: String },

    /// The new instance could not be found after launch
    #[error("Verification failed: {0}")]
    VerifyError(String),

    /// Engine connection or listing failure
    #[error("Backend error: {0}")]
    BackendError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl DeployError {
    /// Process exit status for this error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            DeployError::ConfigError(_) => 2,
            DeployError::BuildError(_) => 3,
            DeployError::LaunchError { .. } => 4,
            DeployError::VerifyError(_) => 5,
            _ => 1,
        }
    }
}

impl From<serde_json::Error> for DeployError {
    fn from(err: serde_json::Error) -> Self {
        DeployError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for DeployError {
    fn from(err: serde_yaml::Error) -> Self {
        DeployError::SerializationError(err.to_string())
    }
}

/// Result type alias for Traefiker operations
pub type Result<T> = std::result::Result<T, DeployError>;
