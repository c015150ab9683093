
use thiserror::Error;

/// Error type for the worker framework.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Error originating from the underlying `lapin` client.
    #[error("broker communication error: {0}")]
    Broker(#[from] lapin::Error),

    /// A required configuration key could not be found for the worker.
    #[error("worker '{worker}' is missing required configuration key '{key}'")]
    MissingConfig { worker: String, key: String },

    /// A configuration key was present but its value could not be used.
    #[error("worker '{worker}' has an invalid value for configuration key '{key}': {reason}")]
    InvalidConfig {
        worker: String,
        key: String,
        reason: String,
    },

    /// The configured logging driver is not registered.
    #[error("unknown logging driver '{0}'")]
    UnknownLogDriver(String),

    /// Error returned by the message handler logic.
    #[error("message handler failed: {0}")]
    Handler(#[from] Box<dyn std::error::Error + Send + Sync>),

    /// The message handler panicked; the payload is the panic message.
    #[error("message handler panicked: {0}")]
    HandlerPanic(String),
}

// Allow converting from a string-like type into a handler error
impl From<&str> for WorkerError {
    fn from(s: &str) -> Self {
        WorkerError::Handler(s.to_string().into())
    }
}

impl From<String> for WorkerError {
    fn from(s: String) -> Self {
        WorkerError::Handler(s.into())
    }
}
