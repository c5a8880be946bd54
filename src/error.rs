use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/**
 * Store error type - uses miette to attach diagnostic codes and help text
 *
 * Every failure of the store layer surfaces as one of these variants; absence
 * of a record is never an error and is reported as `None` instead.
 */
#[derive(Error, Debug, Diagnostic)]
pub enum StoreError {
    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(store::configuration),
        help("Check the slot layout, base directory and digest settings of the store")
    )]
    Configuration(String),

    #[error("Slot {id} already exists in store {store}")]
    #[diagnostic(
        code(store::already_exists),
        help("Allocate a new id with next_free_id() and retry")
    )]
    AlreadyExists { store: String, id: u64 },

    #[error("Usage error: {0}")]
    #[diagnostic(code(store::usage))]
    Usage(String),

    #[error("Persistence error: {message}")]
    #[diagnostic(code(store::persistence))]
    Persistence {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Format error: {0}")]
    #[diagnostic(
        code(store::format),
        help("The content must be well-formed XML, or the slot name must carry a numeric id")
    )]
    Format(String),

    #[error("IO error: {0}")]
    #[diagnostic(code(store::io_error))]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn configuration(message: impl Into<String>) -> Self {
        StoreError::Configuration(message.into())
    }

    pub fn usage(message: impl Into<String>) -> Self {
        StoreError::Usage(message.into())
    }

    pub fn format(message: impl Into<String>) -> Self {
        StoreError::Format(message.into())
    }

    pub fn already_exists(store: impl Into<String>, id: u64) -> Self {
        StoreError::AlreadyExists {
            store: store.into(),
            id,
        }
    }

    /**
     * Persistence failure without an underlying cause (e.g. a rejected commit)
     */
    pub fn persistence(message: impl Into<String>, path: Option<PathBuf>) -> Self {
        StoreError::Persistence {
            message: message.into(),
            path,
            source: None,
        }
    }

    /**
     * Wraps an I/O error together with the path it happened on
     */
    pub fn io_error(message: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let message = message.into();
        StoreError::Persistence {
            message: format!("{}: {}", message, source),
            path: Some(path.into()),
            source: Some(Box::new(source)),
        }
    }

    /**
     * Only an id collision may be retried (with a freshly allocated id)
     */
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }

    /**
     * Prepends context to the message of persistence and usage errors
     */
    pub fn with_context(self, context: impl Into<String>) -> Self {
        let context = context.into();
        match self {
            StoreError::Persistence {
                message,
                path,
                source,
            } => StoreError::Persistence {
                message: format!("{}: {}", context, message),
                path,
                source,
            },
            StoreError::Usage(message) => StoreError::Usage(format!("{}: {}", context, message)),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = StoreError::configuration("bad layout");
        assert!(matches!(error, StoreError::Configuration(_)));

        let error = StoreError::already_exists("docs", 42);
        assert!(matches!(error, StoreError::AlreadyExists { id: 42, .. }));
        assert!(error.is_retryable());

        assert!(!StoreError::usage("deleted").is_retryable());
    }

    #[test]
    fn test_error_with_context() {
        let error = StoreError::persistence("commit rejected", None).with_context("update");
        match error {
            StoreError::Persistence { message, .. } => {
                assert!(message.starts_with("update: "));
                assert!(message.contains("commit rejected"));
            }
            other => panic!("Expected Persistence variant, got {:?}", other),
        }
    }

    #[test]
    fn test_io_error_keeps_source_and_path() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error = StoreError::io_error("Failed to write slot", "/tmp/slot", io);
        match &error {
            StoreError::Persistence { path, source, .. } => {
                assert_eq!(path.as_deref(), Some(std::path::Path::new("/tmp/slot")));
                assert!(source.is_some());
            }
            other => panic!("Expected Persistence variant, got {:?}", other),
        }
        assert!(error.to_string().contains("denied"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let store_error: StoreError = io_error.into();
        assert!(matches!(store_error, StoreError::Io(_)));
    }
}
