use backtrace::Backtrace;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;

use crate::common::{atomic, Atomic};

/// Error kinds for Ferrite operations
///
/// This enum represents all possible error types that can occur during Ferrite
/// mapping, storage and migration operations. Each error kind describes a specific
/// category of failure, enabling precise error handling.
///
/// # Examples
///
/// ```rust,ignore
/// use ferrite::errors::{FerriteError, ErrorKind, FerriteResult};
///
/// fn example() -> FerriteResult<()> {
///     Err(FerriteError::new("No identity field found", ErrorKind::NoPrimaryKey))
/// }
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    // Schema Errors - fatal at registration time, never retried
    /// No identity field was declared for a registered type
    NoPrimaryKey,
    /// A declared field cannot be represented by any column kind
    UnsupportedFieldType,
    /// The relation graph between registered types contains a cycle
    CyclicRelation,
    /// A column name is empty, duplicated or otherwise invalid
    InvalidFieldName,

    // Mapping Errors - recovered locally with a diagnostic
    /// A stored value could not be converted to the target field's type
    MappingError,
    /// A value has the wrong type for the requested conversion
    InvalidDataType,

    // Store Errors - propagated to the caller as typed failures
    /// Generic failure from the underlying relational engine
    StoreError,
    /// An operation was attempted before the store was opened
    StoreNotOpen,
    /// The store has already been closed
    StoreAlreadyClosed,
    /// The referenced table does not exist
    TableNotFound,
    /// Transaction demarcation failed
    TransactionError,
    /// The requested row or record was not found
    NotFound,

    // Migration Errors - abort the whole migration, version left unchanged
    /// A migration step failed
    MigrationError,
    /// A persisted schema definition could not be tokenized
    MalformedCreationText,
    /// No schema version record exists for the requested version
    MetadataNotFound,

    // Generic/Internal Errors - used as fallback
    /// Internal error (usually indicates a bug)
    InternalError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::NoPrimaryKey => write!(f, "No primary key"),
            ErrorKind::UnsupportedFieldType => write!(f, "Unsupported field type"),
            ErrorKind::CyclicRelation => write!(f, "Cyclic relation"),
            ErrorKind::InvalidFieldName => write!(f, "Invalid field name"),
            ErrorKind::MappingError => write!(f, "Mapping error"),
            ErrorKind::InvalidDataType => write!(f, "Invalid data type"),
            ErrorKind::StoreError => write!(f, "Store error"),
            ErrorKind::StoreNotOpen => write!(f, "Store not open"),
            ErrorKind::StoreAlreadyClosed => write!(f, "Store already closed"),
            ErrorKind::TableNotFound => write!(f, "Table not found"),
            ErrorKind::TransactionError => write!(f, "Transaction error"),
            ErrorKind::NotFound => write!(f, "Not found"),
            ErrorKind::MigrationError => write!(f, "Migration error"),
            ErrorKind::MalformedCreationText => write!(f, "Malformed creation text"),
            ErrorKind::MetadataNotFound => write!(f, "Metadata not found"),
            ErrorKind::InternalError => write!(f, "Internal error"),
        }
    }
}

/// Custom Ferrite error type.
///
/// `FerriteError` encapsulates error information including the error message, kind,
/// and optional cause. It supports error chaining and backtraces for debugging.
///
/// # Examples
///
/// ```rust,ignore
/// use ferrite::errors::{FerriteError, ErrorKind};
///
/// // Create a simple error
/// let err = FerriteError::new("Table not found", ErrorKind::TableNotFound);
///
/// // Create an error with a cause
/// let cause = FerriteError::new("Engine failure", ErrorKind::StoreError);
/// let err = FerriteError::new_with_cause("Migration aborted", ErrorKind::MigrationError, cause);
/// ```
///
/// # Type alias
///
/// The `FerriteResult<T>` type alias is equivalent to `Result<T, FerriteError>` and is
/// used throughout the codebase for operations that can fail.
#[derive(Clone)]
pub struct FerriteError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<FerriteError>>,
    backtrace: Atomic<Backtrace>,
}

impl FerriteError {
    /// Creates a new `FerriteError` with the specified message and error kind.
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        FerriteError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace: atomic(Backtrace::new()),
        }
    }

    /// Creates a new `FerriteError` with a cause error.
    ///
    /// This creates an error chain where the cause error is preserved for debugging.
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: FerriteError) -> Self {
        FerriteError {
            message: message.to_string(),
            error_kind,
            cause: Some(Box::new(cause)),
            backtrace: atomic(Backtrace::new()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn cause(&self) -> Option<&Box<FerriteError>> {
        self.cause.as_ref()
    }
}

impl Display for FerriteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for FerriteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // print error message with stack trace followed by cause
        match &self.cause {
            Some(cause) => write!(f, "{}\nCaused by: {:?}", self.message, cause),
            None => write!(f, "{}\n{:?}", self.message, self.backtrace.read()),
        }
    }
}

impl Error for FerriteError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// A result type alias for Ferrite operations.
///
/// `FerriteResult<T>` is shorthand for `Result<T, FerriteError>`.
/// All fallible Ferrite operations return this type.
pub type FerriteResult<T> = Result<T, FerriteError>;

// From trait implementations for automatic error conversion
impl From<std::io::Error> for FerriteError {
    fn from(err: std::io::Error) -> Self {
        FerriteError::new(&format!("IO error: {}", err), ErrorKind::StoreError)
    }
}

impl From<std::num::ParseIntError> for FerriteError {
    fn from(err: std::num::ParseIntError) -> Self {
        FerriteError::new(
            &format!("Integer parsing error: {}", err),
            ErrorKind::InvalidDataType,
        )
    }
}

impl From<std::num::ParseFloatError> for FerriteError {
    fn from(err: std::num::ParseFloatError) -> Self {
        FerriteError::new(
            &format!("Float parsing error: {}", err),
            ErrorKind::InvalidDataType,
        )
    }
}

impl From<hex::FromHexError> for FerriteError {
    fn from(err: hex::FromHexError) -> Self {
        FerriteError::new(
            &format!("Hex decoding error: {}", err),
            ErrorKind::InvalidDataType,
        )
    }
}

impl From<String> for FerriteError {
    fn from(msg: String) -> Self {
        FerriteError::new(&msg, ErrorKind::InternalError)
    }
}

impl From<&str> for FerriteError {
    fn from(msg: &str) -> Self {
        FerriteError::new(msg, ErrorKind::InternalError)
    }
}
