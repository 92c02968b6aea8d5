use std::sync::Arc;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The failure categories a host callback can observe.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Argument validation failed before anything was submitted. Raised
    /// synchronously, never through a callback.
    BadArgument,

    /// The engine could not open the database.
    OpenFailed,

    /// The engine could not destroy the database.
    DestroyFailed,

    /// The engine could not repair the database.
    RepairFailed,

    /// A point read failed for a reason other than a missing key.
    ReadFailed,

    /// A batch could not be applied.
    WriteFailed,

    /// Creating an iterator failed, or an iterator reported an error.
    IteratorFailed,

    /// Creating a snapshot failed.
    SnapshotFailed,

    /// The engine failed while computing a property.
    PropertyMissing,

    /// Compacting a key range failed.
    CompactFailed,

    /// A write batch was mutated while a write of it is in flight.
    BatchInUse,

    /// The engine does not support the requested feature.
    NotImplemented,

    /// The binding itself failed: a worker panicked or the worker pool
    /// could not be started.
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::BadArgument => "TypeError",
            ErrorKind::OpenFailed => "OpenFailed",
            ErrorKind::DestroyFailed => "DestroyFailed",
            ErrorKind::RepairFailed => "RepairFailed",
            ErrorKind::ReadFailed => "ReadFailed",
            ErrorKind::WriteFailed => "WriteFailed",
            ErrorKind::IteratorFailed => "IteratorFailed",
            ErrorKind::SnapshotFailed => "SnapshotFailed",
            ErrorKind::PropertyMissing => "PropertyMissing",
            ErrorKind::CompactFailed => "CompactFailed",
            ErrorKind::BatchInUse => "BatchInUse",
            ErrorKind::NotImplemented => "NotImplemented",
            ErrorKind::Internal => "Internal",
        };
        write!(f, "{name}")
    }
}

/// The engine status classification behind an error, when the engine
/// produced it.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    NotFound,
    Corruption,
    IoError,
    InvalidArgument,
    NotSupported,
}

impl From<emberdb::ErrorKind> for Status {
    fn from(kind: emberdb::ErrorKind) -> Self {
        match kind {
            emberdb::ErrorKind::NotFound => Status::NotFound,
            emberdb::ErrorKind::Corruption => Status::Corruption,
            emberdb::ErrorKind::NotSupported => Status::NotSupported,
            emberdb::ErrorKind::InvalidArgument => Status::InvalidArgument,
            // Io and any classification added later.
            _ => Status::IoError,
        }
    }
}

/// An error delivered to a host callback or returned from a call site.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    status: Option<Status>,
    msg: String,
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
    fn new(kind: ErrorKind, msg: String) -> Self {
        Self {
            kind,
            status: None,
            msg,
            source: None,
        }
    }

    /// An argument failed validation.
    pub(crate) fn bad_argument(detail: impl std::fmt::Display) -> Self {
        Self::new(ErrorKind::BadArgument, format!("Invalid arguments: {detail}"))
    }

    pub(crate) fn batch_in_use() -> Self {
        Self::new(
            ErrorKind::BatchInUse,
            "write batch is being written and cannot be modified".to_string(),
        )
    }

    pub(crate) fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, msg.into())
    }

    /// Translates an engine status. `kind` names the operation that failed;
    /// the engine's classification is kept as the [`Status`].
    pub(crate) fn from_engine(kind: ErrorKind, err: emberdb::Error) -> Self {
        let status = Status::from(err.kind());
        let msg = err.to_string();
        let source: BoxError = Box::new(err);
        Self {
            kind,
            status: Some(status),
            msg,
            source: Some(Arc::new(source)),
        }
    }

    /// Returns the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the engine status classification, if the engine produced
    /// this error.
    pub fn status(&self) -> Option<Status> {
        self.status
    }

    /// Returns the message without the kind prefix.
    pub fn message(&self) -> &str {
        &self.msg
    }
}

/// Adapter for `map_err` at engine call sites.
pub(crate) fn engine(kind: ErrorKind) -> impl FnOnce(emberdb::Error) -> Error {
    move |err| Error::from_engine(kind, err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(emberdb::Error::corruption("bad block".into()), ErrorKind::ReadFailed, Status::Corruption)]
    #[case(emberdb::Error::io("disk full".into()), ErrorKind::ReadFailed, Status::IoError)]
    #[case(emberdb::Error::invalid_argument("bad".into()), ErrorKind::ReadFailed, Status::InvalidArgument)]
    #[case(emberdb::Error::not_supported("zlib".into()), ErrorKind::ReadFailed, Status::NotSupported)]
    fn test_engine_status_translation(
        #[case] err: emberdb::Error,
        #[case] kind: ErrorKind,
        #[case] status: Status,
    ) {
        let translated = Error::from_engine(ErrorKind::ReadFailed, err);
        assert_eq!(translated.kind(), kind);
        assert_eq!(translated.status(), Some(status));
    }

    #[test]
    fn test_engine_message_is_kept() {
        let err = Error::from_engine(
            ErrorKind::OpenFailed,
            emberdb::Error::invalid_argument("/tmp/x: does not exist".into()),
        );
        assert_eq!(err.message(), "Invalid argument: /tmp/x: does not exist");
        assert_eq!(
            err.to_string(),
            "OpenFailed: Invalid argument: /tmp/x: does not exist"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_bad_argument_reads_as_type_error() {
        let err = Error::bad_argument("key must be a buffer");
        assert_eq!(err.kind(), ErrorKind::BadArgument);
        assert_eq!(err.status(), None);
        assert_eq!(err.to_string(), "TypeError: Invalid arguments: key must be a buffer");
    }
}
