use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeskPilotError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// No display source, or the capture backend failed.
    #[error("Capture error: {0}")]
    Capture(String),

    /// The decision service answered with something that is not a Messages API payload.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Non-2xx answer from the decision service.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Run rejected: {0}")]
    RunRejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Run cancelled")]
    Cancelled,
}

impl DeskPilotError {
    /// True for failures reaching the decision endpoint (timeouts, connection
    /// errors, non-2xx statuses). These are the only errors a run may retry.
    pub fn is_transport(&self) -> bool {
        matches!(self, DeskPilotError::Transport(_) | DeskPilotError::Http(_))
    }
}

impl serde::Serialize for DeskPilotError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type DeskPilotResult<T> = Result<T, DeskPilotError>;
