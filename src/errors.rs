use thiserror::Error;

/// Errors raised by the chat core. Application edges wrap these in `anyhow`.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DuetError {
    #[error("{name} must be between {min} and {max}, got {value}")]
    OutOfRange {
        name: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Unknown export format: {0} (expected md or json)")]
    UnknownFormat(String),

    #[error("No API key configured. Set {0} or add it to the config file.")]
    MissingApiKey(String),

    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },
}

pub type DuetResult<T> = Result<T, DuetError>;
