use std::{fmt, io};

/// Crate-wide `Result` type using [`DocsnapError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations outside the
/// traversal engine, which reports [`ExportError`] directly.
pub type Result<T> = std::result::Result<T, DocsnapError>;

/// Top-level error type for docsnap.
#[derive(Debug)]
pub enum DocsnapError {
    /// The traversal failed or was cancelled.
    Export(ExportError),

    /// A store call failed outside of a traversal (e.g. loading a JSON store).
    Store(StoreError),

    /// Connection-related errors.
    Connection(ConnectionError),

    /// Configuration errors.
    Config(ConfigError),

    /// I/O errors.
    Io(io::Error),

    /// JSON encoding or decoding errors.
    Json(serde_json::Error),

    /// Generic error with a free-form message.
    Generic(String),
}

/// Errors raised by the traversal engine.
///
/// Context variants wrap the error of a child node with the path of the
/// level it unwound through, so the rendered message reads from the root
/// down to the failing node.
#[derive(Debug)]
pub enum ExportError {
    /// Listing collections, documents or sub-collections failed.
    Enumeration { path: String, source: StoreError },

    /// Fetching a document's own fields failed (not-found excluded).
    Fetch { path: String, source: StoreError },

    /// A failure inside the given collection.
    Collection {
        path: String,
        source: Box<ExportError>,
    },

    /// A failure inside the sub-collections of the given document.
    Document {
        path: String,
        source: Box<ExportError>,
    },

    /// The traversal context was cancelled.
    Cancelled,

    /// A spawned export task panicked or was aborted.
    TaskFailed(String),
}

/// Classification of store failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// The requested document does not exist.
    NotFound,

    /// The store could not be reached.
    Unavailable,

    /// The credentials do not allow the operation.
    PermissionDenied,

    /// The store returned data docsnap cannot interpret.
    InvalidData,

    /// Anything else.
    Other,
}

/// Error reported by a [`DocumentStore`](crate::store::DocumentStore).
#[derive(Debug)]
pub struct StoreError {
    kind: StoreErrorKind,
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// Connection-specific errors.
#[derive(Debug)]
pub enum ConnectionError {
    /// Failed to establish a connection.
    ConnectionFailed(String),

    /// Invalid connection URI.
    InvalidUri(String),

    /// Not currently connected.
    NotConnected,

    /// Ping command failed.
    PingFailed(String),
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },

    /// Free-form configuration problem.
    Generic(String),
}

impl StoreError {
    /// Create a store error of the given kind.
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a [`StoreErrorKind::NotFound`] error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::NotFound, message)
    }

    /// Attach the underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> StoreErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the error means "document absent", which the traversal
    /// treats as an empty set of fields.
    pub fn is_not_found(&self) -> bool {
        self.kind == StoreErrorKind::NotFound
    }
}

impl ExportError {
    /// Whether this error, or the error it wraps, is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            ExportError::Cancelled => true,
            ExportError::Collection { source, .. } | ExportError::Document { source, .. } => {
                source.is_cancelled()
            }
            _ => false,
        }
    }

    /// Wrap with the path of the collection the error unwound through.
    ///
    /// A bare cancellation carries no location and is passed through as is.
    pub fn within_collection(self, path: &str) -> Self {
        match self {
            ExportError::Cancelled => self,
            source => ExportError::Collection {
                path: path.to_string(),
                source: Box::new(source),
            },
        }
    }

    /// Wrap with the path of the document whose sub-collections failed.
    pub fn within_document(self, path: &str) -> Self {
        match self {
            ExportError::Cancelled => self,
            source => ExportError::Document {
                path: path.to_string(),
                source: Box::new(source),
            },
        }
    }

    /// Path of the innermost node the failure originated from, if known.
    pub fn origin_path(&self) -> Option<&str> {
        match self {
            ExportError::Enumeration { path, .. } | ExportError::Fetch { path, .. } => Some(path),
            ExportError::Collection { source, .. } | ExportError::Document { source, .. } => {
                source.origin_path()
            }
            ExportError::Cancelled | ExportError::TaskFailed(_) => None,
        }
    }
}

impl DocsnapError {
    /// Whether the error is a user-requested cancellation rather than a
    /// genuine failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DocsnapError::Export(err) if err.is_cancelled())
    }
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for DocsnapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocsnapError::Export(e) => write!(f, "Export failed: {e}"),
            DocsnapError::Store(e) => write!(f, "Store error: {e}"),
            DocsnapError::Connection(e) => write!(f, "Connection error: {e}"),
            DocsnapError::Config(e) => write!(f, "Configuration error: {e}"),
            DocsnapError::Io(e) => write!(f, "I/O error: {e}"),
            DocsnapError::Json(e) => write!(f, "JSON error: {e}"),
            DocsnapError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::Enumeration { path, source } => {
                write!(f, "failed to iterate over {path}: {source}")
            }
            ExportError::Fetch { path, source } => {
                write!(f, "failed to get document data {path}: {source}")
            }
            ExportError::Collection { path, source } => {
                write!(f, "failed to export collection {path}: {source}")
            }
            ExportError::Document { path, source } => {
                write!(f, "failed to export sub-collections for document {path}: {source}")
            }
            ExportError::Cancelled => write!(f, "export cancelled"),
            ExportError::TaskFailed(msg) => write!(f, "export task failed: {msg}"),
        }
    }
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreErrorKind::NotFound => "not found",
            StoreErrorKind::Unavailable => "unavailable",
            StoreErrorKind::PermissionDenied => "permission denied",
            StoreErrorKind::InvalidData => "invalid data",
            StoreErrorKind::Other => "store failure",
        };
        f.write_str(name)
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::ConnectionFailed(msg) => write!(f, "Failed to connect: {msg}"),
            ConnectionError::InvalidUri(uri) => write!(f, "Invalid connection URI: {uri}"),
            ConnectionError::NotConnected => write!(f, "Not connected to the store"),
            ConnectionError::PingFailed(msg) => write!(f, "Ping failed: {msg}"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
            ConfigError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for DocsnapError {}
impl std::error::Error for ExportError {}
impl std::error::Error for ConnectionError {}
impl std::error::Error for ConfigError {}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}

/* ========================= Conversions to DocsnapError ========================= */

impl From<ExportError> for DocsnapError {
    fn from(err: ExportError) -> Self {
        DocsnapError::Export(err)
    }
}

impl From<StoreError> for DocsnapError {
    fn from(err: StoreError) -> Self {
        DocsnapError::Store(err)
    }
}

impl From<io::Error> for DocsnapError {
    fn from(err: io::Error) -> Self {
        DocsnapError::Io(err)
    }
}

impl From<serde_json::Error> for DocsnapError {
    fn from(err: serde_json::Error) -> Self {
        DocsnapError::Json(err)
    }
}

impl From<ConnectionError> for DocsnapError {
    fn from(err: ConnectionError) -> Self {
        DocsnapError::Connection(err)
    }
}

impl From<ConfigError> for DocsnapError {
    fn from(err: ConfigError) -> Self {
        DocsnapError::Config(err)
    }
}

impl From<String> for DocsnapError {
    fn from(msg: String) -> Self {
        DocsnapError::Generic(msg)
    }
}

impl From<&str> for DocsnapError {
    fn from(msg: &str) -> Self {
        DocsnapError::Generic(msg.to_owned())
    }
}
