// src/utils/error.rs
use thiserror::Error;

// Define specific error types for different parts of the application
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Input bytes could not be interpreted as text. Fatal for the request.
    #[error("Decoding error: {0}")]
    Decoding(String),

    /// Extraction ran to completion but no block referenced the target year.
    #[error("No matching question blocks found for {0}")]
    EmptyResult(String),

    /// Rejected before scanning begins.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ExtractError {
    /// Short hint shown next to the error in CLI responses.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            ExtractError::Decoding(_) => Some("파일 인코딩을 확인해주세요 (UTF-8, UTF-16 또는 CP949)"),
            ExtractError::EmptyResult(_) => Some("문서에 대상 연도 표기가 있는지 확인해주세요"),
            ExtractError::Configuration(_) => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Task already exists: {0}")]
    TaskExists(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported file: {0}")]
    UnsupportedFile(String),

    #[error("Input too large: {0}")]
    TooLarge(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error), // Automatically convert IO errors

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Data processing failed: {0}")]
    Processing(String),
}
