//! Error types for the core library

use core::fmt;
use alloc::boxed::Box;
use alloc::string::String;

/// The core error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Handle error
    Handle(HandleError),
    /// A user-supplied callback panicked
    Callback(CallbackError),
    /// Generic error with message
    Message(Box<str>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Handle(e) => write!(f, "Handle error: {}", e),
            Error::Callback(e) => write!(f, "Callback error: {}", e),
            Error::Message(msg) => write!(f, "{}", msg),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias
pub type Result<T> = core::result::Result<T, Error>;

/// Handle errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleError {
    /// Handle is null
    Null,
    /// Handle is stale (generation mismatch)
    Stale,
    /// Handle index out of bounds
    OutOfBounds,
}

impl fmt::Display for HandleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandleError::Null => write!(f, "Handle is null"),
            HandleError::Stale => write!(f, "Handle is stale (already freed)"),
            HandleError::OutOfBounds => write!(f, "Handle index out of bounds"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for HandleError {}

impl From<HandleError> for Error {
    fn from(e: HandleError) -> Self {
        Error::Handle(e)
    }
}

/// A panic raised by user code, captured at an isolation boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackError {
    /// Which callback failed (e.g. "on_mount")
    pub site: &'static str,
    /// Panic payload rendered as text
    pub message: Box<str>,
}

impl CallbackError {
    /// Create a callback error
    pub fn new(site: &'static str, message: impl Into<String>) -> Self {
        Self {
            site,
            message: message.into().into_boxed_str(),
        }
    }
}

impl fmt::Display for CallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} panicked: {}", self.site, self.message)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CallbackError {}

impl From<CallbackError> for Error {
    fn from(e: CallbackError) -> Self {
        Error::Callback(e)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Message(s.into())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Message(s.into_boxed_str())
    }
}
