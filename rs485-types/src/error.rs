//! Errors raised while validating or parsing plain settings

pub type Result<T> = std::result::Result<T, Error>;

/// Rejected setting or unknown code
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
