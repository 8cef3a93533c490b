//! Reconciler errors

use thiserror::Error;
use void_core::{CallbackError, HandleError};

use crate::fiber::FiberId;
use crate::root::RootId;

/// Errors surfaced from the reconciler's entry points
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Structural error: {0}")]
    Structural(String),

    #[error("No host parent found above fiber {0:?}")]
    HostParentNotFound(FiberId),

    #[error("Render failed in {component}: {message}")]
    RenderFailed { component: String, message: String },

    #[error("Unknown root {0:?}")]
    StaleRoot(RootId),

    #[error("Root {0:?} has been unmounted")]
    RootUnmounted(RootId),

    #[error("Maximum update depth exceeded after {0} nested synchronous commits")]
    NestedUpdateLimit(u32),

    #[error("Handle error: {0}")]
    Handle(#[from] HandleError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<RenderError> for ReconcileError {
    fn from(e: RenderError) -> Self {
        ReconcileError::RenderFailed {
            component: e.component,
            message: e.message,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// A component's render panicked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderError {
    /// Name of the component that failed
    pub component: String,
    /// Panic message
    pub message: String,
}

impl RenderError {
    pub(crate) fn from_callback(component: &str, error: CallbackError) -> Self {
        Self {
            component: component.to_string(),
            message: error.message.into_string(),
        }
    }
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed to render: {}", self.component, self.message)
    }
}

/// Why a unit of work stopped
#[derive(Debug)]
pub(crate) enum WorkError {
    /// User code threw; may be recovered by an error boundary
    Threw { fiber: FiberId, error: RenderError },
    /// The tree is inconsistent; fatal for the root
    Fatal(ReconcileError),
}

impl From<ReconcileError> for WorkError {
    fn from(e: ReconcileError) -> Self {
        WorkError::Fatal(e)
    }
}

impl From<HandleError> for WorkError {
    fn from(e: HandleError) -> Self {
        WorkError::Fatal(e.into())
    }
}
