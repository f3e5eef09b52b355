// author: kodeholic (powered by Gemini)

use std::fmt;

#[derive(Debug)]
pub enum CanvasError {
    Unauthorized,
    InvalidCooldown(String),
    Store(String),
    Relay(String),
    Internal(String),
    Io(std::io::Error),
}

impl fmt::Display for CanvasError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanvasError::Unauthorized         => write!(f, "Unauthorized"),
            CanvasError::InvalidCooldown(raw) => write!(f, "Invalid cooldown value: {}", raw),
            CanvasError::Store(msg)           => write!(f, "Shared store error: {}", msg),
            CanvasError::Relay(msg)           => write!(f, "Relay error: {}", msg),
            CanvasError::Internal(msg)        => write!(f, "Internal error: {}", msg),
            CanvasError::Io(err)              => write!(f, "Network I/O error: {}", err),
        }
    }
}

impl std::error::Error for CanvasError {}

impl From<std::io::Error> for CanvasError {
    fn from(err: std::io::Error) -> Self {
        CanvasError::Io(err)
    }
}

impl From<redis::RedisError> for CanvasError {
    fn from(err: redis::RedisError) -> Self {
        CanvasError::Store(err.to_string())
    }
}

pub type CanvasResult<T> = Result<T, CanvasError>;
