//! Errors returned by this crate.

use std::error as stderr;
use std::fmt;
use std::io;

/// Convenient type alias to shorten the signature on every usage.
pub(crate) type BoxError = Box<dyn stderr::Error + Send + Sync>;

/// The error type that this crate use for wrapping errors.
///
/// The variants follow the stages of a dump upload: configuration, scope derivation and parsing,
/// bucket handling, the data transfer and the byte source feeding it. Errors reported by a
/// storage backend keep their native code in the [`Network` variant](Self::Network).
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The configuration is malformed or misses required values.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Identifies invalid arguments passed to a function or method.
    #[error("{0}")]
    InvalidArguments(Args),
    /// The raw API key doesn't decode into a signed key.
    #[error("invalid API key format: {0}")]
    InvalidKeyFormat(String),
    /// The satellite rejected the API key or doesn't match the requested address.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    /// The encryption key couldn't be derived from the passphrase.
    #[error("key derivation failed: {0}")]
    KeyDerivationFailed(String),
    /// The caveat used for restricting a scope is invalid.
    #[error("invalid restriction: {0}")]
    InvalidRestriction(String),
    /// A serialized scope doesn't decode into a satellite address, API key and encryption access.
    #[error("malformed scope token: {0}")]
    MalformedScopeToken(String),
    /// The bucket couldn't be opened, not even after trying to create it.
    #[error("bucket {bucket:?} is unavailable: {cause}")]
    BucketUnavailable {
        /// Name of the bucket.
        bucket: String,
        /// The last error returned when opening or creating the bucket.
        #[source]
        cause: Box<Error>,
    },
    /// Writing the object's data failed; the stored object may be partial.
    #[error("upload of {key:?} failed: {cause}")]
    Upload {
        /// The object key that was being written.
        key: String,
        /// The error that interrupted the upload.
        #[source]
        cause: BoxError,
    },
    /// The byte source feeding an upload failed.
    #[error("byte source read failed: {0}")]
    SourceRead(#[source] io::Error),
    /// Identifies a native error returned by a storage backend.
    #[error("{0}")]
    Network(Network),
    /// Identifies errors produced by the internal implementation that aren't expected to happen.
    #[error("{0}")]
    Internal(Internal),
}

impl Error {
    /// Creates an [`Internal` variant](Self::Internal) from the provided context message and the
    /// error that originated it.
    pub(crate) fn new_internal(ctx_msg: &str, err: BoxError) -> Self {
        Error::Internal(Internal {
            ctx_msg: String::from(ctx_msg),
            inner: err,
        })
    }

    /// Convenient constructor for creating an [`InvalidArguments` variant](Self::InvalidArguments)
    /// Error.
    ///
    /// See [`Args`] documentation to know about the convention for the value of the `names`
    /// parameter.
    pub(crate) fn new_invalid_arguments(names: &str, msg: &str) -> Self {
        Self::InvalidArguments(Args::new(names, msg))
    }

    /// Convenient constructor for creating an [`Upload` variant](Self::Upload).
    pub(crate) fn new_upload(key: &str, cause: impl Into<BoxError>) -> Self {
        Self::Upload {
            key: String::from(key),
            cause: cause.into(),
        }
    }

    /// Returns `true` if the error is a native backend error reporting that a bucket doesn't
    /// exist.
    pub fn is_bucket_not_found(&self) -> bool {
        matches!(self, Self::Network(Network::BucketNotFound(_)))
    }

    /// Returns `true` if the error is a native backend error rejecting the operation because the
    /// API key doesn't grant it.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::Network(Network::PermissionDenied(_)))
    }

    /// Wraps this error into an [`io::Error`] for returning it from [`io::Write`] and
    /// [`io::Read`] implementations.
    pub(crate) fn into_io(self) -> io::Error {
        io::Error::new(io::ErrorKind::Other, self)
    }
}

impl From<Network> for Error {
    fn from(err: Network) -> Self {
        Self::Network(err)
    }
}

/// Represents invalid arguments error regarding the business domain.
#[derive(Debug)]
pub struct Args {
    /// One or several parameters names; it has several conventions for expressing the involved
    /// parameters.
    ///
    /// * When a specific parameter is invalid its value is the exact parameter name.
    /// * when the parameter is struct, the invalid fields can be __optionally__ indicated using
    ///   curly brackets (e.g invalid field: `caveat{bucket}`).
    /// * When several parameters are invalid, its values is the parameters names wrapped in round
    ///   brackets (e.g. `(p1,p3)`).
    pub names: String,
    /// A human friendly message that explains why the argument(s) are invalid.
    pub msg: String,
}

impl Args {
    fn new(names: &str, msg: &str) -> Self {
        Args {
            names: String::from(names),
            msg: String::from(msg),
        }
    }
}

impl fmt::Display for Args {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(
            f,
            "{} arguments have invalid values. {}",
            self.names, self.msg
        )
    }
}

/// Wraps a native error returned by a storage backend providing the access to its details.
#[derive(Debug)]
pub enum Network {
    /// The satellite doesn't recognize the API key or the API key signature is invalid.
    Unauthenticated(String),
    /// The API key is valid but its caveats don't grant the operation.
    PermissionDenied(String),
    /// The backend rejected the operation because the bucket's name contains non-allowed
    /// characters.
    BucketNameInvalid(String),
    /// The backend rejected the operation because the bucket doesn't exist.
    BucketNotFound(String),
    /// The backend rejected the operation because the object's key contains non-allowed
    /// characters.
    ObjectKeyInvalid(String),
    /// It doesn't exist an object in the specified bucket and key.
    ObjectNotFound(String),
    /// The specified upload was already committed or aborted.
    UploadDone(String),
    /// A backend internal error.
    Internal(String),
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        let (code, details) = match self {
            Self::Unauthenticated(msg) => ("unauthenticated", msg),
            Self::PermissionDenied(msg) => ("permission denied", msg),
            Self::BucketNameInvalid(msg) => ("bucket name invalid", msg),
            Self::BucketNotFound(msg) => ("bucket not found", msg),
            Self::ObjectKeyInvalid(msg) => ("object key invalid", msg),
            Self::ObjectNotFound(msg) => ("object not found", msg),
            Self::UploadDone(msg) => ("upload done", msg),
            Self::Internal(msg) => ("internal", msg),
        };

        write!(f, r#"code: "{}", details: "{}""#, code, details)
    }
}

/// Represents an error that happen because of the violation of an internal assumption.
///
/// An assumption example is: encoding a caveat with bincode never fails.
#[derive(Debug)]
pub struct Internal {
    /// A human friendly message to provide context of the error.
    pub ctx_msg: String,
    /// The inner error that caused this internal error
    inner: BoxError,
}

impl fmt::Display for Internal {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(f, "{}: {}", self.ctx_msg, self.inner)
    }
}

impl stderr::Error for Internal {
    fn source(&self) -> Option<&(dyn stderr::Error + 'static)> {
        Some(self.inner.as_ref())
    }
}
