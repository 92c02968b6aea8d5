use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error as ThisError;

#[non_exhaustive]
#[derive(Clone, Debug, ThisError)]
pub(crate) enum EmberError {
    #[error("io error: {0}")]
    IoError(#[from] Arc<std::io::Error>),

    #[error("key not found")]
    KeyNotFound,

    #[error("checksum mismatch in journal. offset=`{offset}`")]
    ChecksumMismatch { offset: u64 },

    #[error("truncated journal record. offset=`{offset}`")]
    TruncatedRecord { offset: u64 },

    #[error("unknown journal entry tag. tag=`{tag}`, offset=`{offset}`")]
    UnknownEntryTag { tag: u8, offset: u64 },

    #[error("invalid manifest. path=`{0}`")]
    InvalidManifest(PathBuf),

    #[error("{0}: does not exist (create_if_missing is false)")]
    DbMissing(PathBuf),

    #[error("{0}: exists (error_if_exists is true)")]
    DbExists(PathBuf),

    #[error("{0}: no database found to repair")]
    NothingToRepair(PathBuf),

    #[error("lock {0}: already held by process")]
    LockHeld(PathBuf),

    #[error("comparator mismatch. expected=`{expected}`, existing=`{existing}`")]
    ComparatorMismatch { expected: String, existing: String },

    #[error("invalid option. name=`{name}`, reason=`{reason}`")]
    InvalidOption { name: &'static str, reason: String },

    #[error("snapshot is newer than the database. snapshot=`{snapshot}`, last_sequence=`{last_sequence}`")]
    InvalidSnapshot { snapshot: u64, last_sequence: u64 },

    #[error("compression is not available in this build")]
    CompressionUnsupported,

    #[error("a previous journal write failed; the database is read-only")]
    BackgroundError(Box<EmberError>),
}

impl From<std::io::Error> for EmberError {
    fn from(value: std::io::Error) -> Self {
        Self::IoError(Arc::new(value))
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The classification of an engine status.
///
/// Mirrors the classic leveldb status codes: every failed engine call
/// reports exactly one of these.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The requested key or file does not exist.
    NotFound,

    /// Persisted data failed an integrity check.
    Corruption,

    /// The engine does not support the requested feature.
    NotSupported,

    /// The caller passed an invalid option or argument.
    InvalidArgument,

    /// The filesystem reported an error.
    Io,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "NotFound"),
            ErrorKind::Corruption => write!(f, "Corruption"),
            ErrorKind::NotSupported => write!(f, "Not implemented"),
            ErrorKind::InvalidArgument => write!(f, "Invalid argument"),
            ErrorKind::Io => write!(f, "IO error"),
        }
    }
}

/// A public engine status that is not ok.
#[derive(Debug, Clone)]
pub struct Error {
    msg: String,
    kind: ErrorKind,
    source: Option<Arc<BoxError>>,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.msg)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref().as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl Error {
    /// Creates a new not-found status.
    pub fn not_found(msg: String) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }

    /// Creates a new corruption status.
    pub fn corruption(msg: String) -> Self {
        Self::new(ErrorKind::Corruption, msg)
    }

    /// Creates a new not-supported status.
    pub fn not_supported(msg: String) -> Self {
        Self::new(ErrorKind::NotSupported, msg)
    }

    /// Creates a new invalid-argument status.
    pub fn invalid_argument(msg: String) -> Self {
        Self::new(ErrorKind::InvalidArgument, msg)
    }

    /// Creates a new I/O status.
    pub fn io(msg: String) -> Self {
        Self::new(ErrorKind::Io, msg)
    }

    fn new(kind: ErrorKind, msg: String) -> Self {
        Self {
            msg,
            kind,
            source: None,
        }
    }

    /// Adds a source to the error.
    pub fn with_source(mut self, source: BoxError) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Returns the status classification.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the message without the classification prefix.
    pub fn message(&self) -> &str {
        &self.msg
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

impl From<EmberError> for Error {
    fn from(err: EmberError) -> Self {
        let msg = err.to_string();
        match err {
            EmberError::KeyNotFound => Error::not_found(msg),

            EmberError::ChecksumMismatch { .. } => Error::corruption(msg),
            EmberError::TruncatedRecord { .. } => Error::corruption(msg),
            EmberError::UnknownEntryTag { .. } => Error::corruption(msg),
            EmberError::InvalidManifest(_) => Error::corruption(msg),

            EmberError::DbMissing(_) => Error::invalid_argument(msg),
            EmberError::DbExists(_) => Error::invalid_argument(msg),
            EmberError::ComparatorMismatch { .. } => Error::invalid_argument(msg),
            EmberError::InvalidOption { .. } => Error::invalid_argument(msg),
            EmberError::InvalidSnapshot { .. } => Error::invalid_argument(msg),

            EmberError::CompressionUnsupported => Error::not_supported(msg),

            EmberError::IoError(err) => Error::io(msg).with_source(Box::new(err)),
            EmberError::NothingToRepair(_) => Error::io(msg),
            EmberError::LockHeld(_) => Error::io(msg),
            EmberError::BackgroundError(inner) => {
                let inner = Error::from(*inner);
                Error::new(inner.kind, format!("{msg} ({inner})"))
            }
        }
    }
}
