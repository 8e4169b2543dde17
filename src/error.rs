//! Application error carrying a process exit code.
//!
//! Exit codes:
//! - `2`: bad input (arguments, config, missing or malformed files)
//! - `3`: not enough data to do the requested work
//! - `4`: upstream or data failure (ERDDAP, malformed payloads, model evaluation)

use thiserror::Error;

#[derive(Clone, Error)]
#[error("{message}")]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_the_bare_message() {
        let err = AppError::new(3, "No complete rows remain after cleaning.");
        assert_eq!(err.to_string(), "No complete rows remain after cleaning.");
        assert_eq!(err.exit_code(), 3);
    }
}
