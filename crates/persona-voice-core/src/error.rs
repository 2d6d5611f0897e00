use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersonaVoiceError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Unknown voice provider: {0}")]
    UnknownProvider(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PersonaVoiceError>;
