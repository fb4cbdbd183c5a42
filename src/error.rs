//! Error types for product-archiver

use thiserror::Error;

/// Result type for product-archiver operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for product-archiver
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to launch Chrome
    #[error("Failed to launch Chrome: {0}")]
    Launch(String),

    /// Chrome not found
    #[error("Chrome not found")]
    ChromeNotFound,

    /// Transport error
    #[error("Transport error: {context}")]
    Transport {
        context: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// CDP protocol error
    #[error("CDP error in {method}: {message} (code {code})")]
    Cdp {
        method: String,
        code: i64,
        message: String,
    },

    /// Script threw inside the page
    #[error("JavaScript error: {0}")]
    Script(String),

    /// Navigation error
    #[error("Navigation error: {0}")]
    Navigation(String),

    /// A control index no longer resolves to an element
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// Timeout
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Decode error (e.g., base64)
    #[error("Decode error: {0}")]
    Decode(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("HTTP {status} fetching {url}")]
    HttpStatus { url: String, status: u16 },

    /// Bad input (unparseable URL, empty identifier list, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The page never showed a title or a not-found marker
    #[error("Page did not become ready after {attempts} attempts")]
    PageStuck { attempts: u32 },

    /// Operator declined to continue at the captcha prompt
    #[error("Operator aborted at attempt {attempt}")]
    EscalationAborted { attempt: u32 },

    /// Retry exhausted
    #[error("Retry exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: u32, last_error: String },
}

impl Error {
    /// Create a transport error with context
    pub fn transport(context: impl Into<String>) -> Self {
        Self::Transport {
            context: context.into(),
            source: None,
        }
    }

    /// Create a transport error with IO source
    pub fn transport_io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Transport {
            context: context.into(),
            source: Some(source),
        }
    }

    /// Create a CDP error with full context
    pub fn cdp(method: impl Into<String>, code: i64, message: impl Into<String>) -> Self {
        Self::Cdp {
            method: method.into(),
            code,
            message: message.into(),
        }
    }

    /// Whether a bounded retry should try the operation again.
    ///
    /// An operator refusal is final; everything else may be transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Error::EscalationAborted { .. })
    }
}
