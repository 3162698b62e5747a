//! Crate-wide error type.
//!
//! Every failure carries a process exit code so the binary can report the
//! failure class without downcasting. The classes are:
//!
//! - [`EXIT_CONFIG`]: bad configuration or CLI input
//! - [`EXIT_DATA`]: unreadable or malformed files on disk
//! - [`EXIT_NUMERIC`]: a single likelihood evaluation failed numerically
//! - [`EXIT_ENGINE`]: the radiative-transfer collaborator failed
//! - [`EXIT_INTERNAL`]: programming errors (unknown parameter, wrong lifecycle state)
//!
//! Only [`EXIT_NUMERIC`] is recoverable: the sampler-facing callback turns it
//! into a sentinel log-likelihood. Everything else aborts the run.

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_DATA: u8 = 3;
pub const EXIT_NUMERIC: u8 = 4;
pub const EXIT_ENGINE: u8 = 5;
pub const EXIT_INTERNAL: u8 = 6;

#[derive(Clone)]
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

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(EXIT_CONFIG, message)
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::new(EXIT_DATA, message)
    }

    pub fn numeric(message: impl Into<String>) -> Self {
        Self::new(EXIT_NUMERIC, message)
    }

    pub fn engine(message: impl Into<String>) -> Self {
        Self::new(EXIT_ENGINE, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(EXIT_INTERNAL, message)
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// True when the failure belongs to one evaluation point rather than the run.
    pub fn is_numeric(&self) -> bool {
        self.exit_code == EXIT_NUMERIC
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
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

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_numeric_errors_are_recoverable() {
        assert!(AppError::numeric("not positive definite").is_numeric());
        assert!(!AppError::engine("opacity table missing").is_numeric());
        assert_eq!(AppError::config("x").exit_code(), EXIT_CONFIG);
    }
}
