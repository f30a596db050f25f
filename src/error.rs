use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("{field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("{0}")]
    Conflict(String),

    #[error("Room is full")]
    RoomFull,

    #[error("Refunds are not possible after the talk room has started")]
    RefundClosed,

    #[error("A refund for this room was already processed")]
    AlreadyRefunded,

    #[error("Sending too fast, wait {wait_ms}ms and try again")]
    RateLimited { wait_ms: u64 },

    #[error("Message could not be sent after {attempts} attempts: {source}")]
    SendFailed {
        attempts: u32,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gateway rejected request ({status}): {body}")]
    Gateway { status: u16, body: String },

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),
}

impl AppError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field,
            message: message.into(),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
