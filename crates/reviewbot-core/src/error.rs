use std::io;

use reqwest::StatusCode;
use thiserror::Error;

use crate::browser::BrowserError;
use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum ReviewBotError {
    #[error("{0}")]
    Message(String),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{context} responded with {status}")]
    Status {
        context: String,
        status: StatusCode,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("page markup did not match: {0}")]
    MarkupDrift(String),
    #[error("restaurant '{restaurant}' has no reviews to average")]
    EmptyReviews { restaurant: String },
    #[error("completion error: {0}")]
    Completion(String),
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),
}

impl ReviewBotError {
    pub fn message<T: Into<String>>(message: T) -> Self {
        ReviewBotError::Message(message.into())
    }

    pub(crate) fn status(context: impl Into<String>, status: StatusCode) -> Self {
        ReviewBotError::Status {
            context: context.into(),
            status,
        }
    }
}
