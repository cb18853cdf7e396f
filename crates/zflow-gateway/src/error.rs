/*!
 * Error types for the zflow gateway crate.
 */
use thiserror::Error;

/// Error type for gateway operations
#[derive(Error, Debug)]
pub enum Error {
    /// Discovery error
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// Payload transform error
    #[error("Transform error: {0}")]
    Transform(String),

    /// Expression error (post-operations and hooks)
    #[error("Expression error: {0}")]
    Expression(String),

    /// Device template error
    #[error("Template error: {0}")]
    Template(String),

    /// Device error
    #[error("Device error: {0}")]
    Device(#[from] zflow_devices::DeviceError),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] zflow_core::error::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new discovery error
    pub fn discovery<S: AsRef<str>>(msg: S) -> Self {
        Error::Discovery(msg.as_ref().to_string())
    }

    /// Create a new transform error
    pub fn transform<S: AsRef<str>>(msg: S) -> Self {
        Error::Transform(msg.as_ref().to_string())
    }

    /// Create a new expression error
    pub fn expression<S: AsRef<str>>(msg: S) -> Self {
        Error::Expression(msg.as_ref().to_string())
    }

    /// Create a new template error
    pub fn template<S: AsRef<str>>(msg: S) -> Self {
        Error::Template(msg.as_ref().to_string())
    }

    /// Create a new not found error
    pub fn not_found<S: AsRef<str>>(msg: S) -> Self {
        Error::NotFound(msg.as_ref().to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<evalexpr::EvalexprError> for Error {
    fn from(err: evalexpr::EvalexprError) -> Self {
        Error::Expression(err.to_string())
    }
}
