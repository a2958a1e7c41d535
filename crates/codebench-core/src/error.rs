use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodeBenchError {
    #[error("Dataset load failed: {0}")]
    DatasetLoad(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),
}

pub type Result<T> = std::result::Result<T, CodeBenchError>;
