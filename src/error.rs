use std::error::Error as StdError;
use std::io;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// Any failure that cannot be confidently attributed to any other error
    /// category in this enum.
    ///
    /// Internal is never a guarantee that the error is not caused by the
    /// user, merely that the code cannot tell.
    Internal,

    /// The user provided invalid input or performed an action that is
    /// unsupported or impossible to complete.
    User,
}

/// Fine-grained condition flags for consumers that want to branch on error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The real password does not satisfy the complexity policy.
    PasswordTooSimple,
    /// The candidate fake password verifies against the real password.
    PasswordSameAsReal,
    /// The candidate real password verifies against the fake password.
    PasswordSameAsFake,
    /// Login did not produce an authenticated session.
    AuthenticationFailed,
    /// A file operation was requested before a successful login.
    NotLoggedIn,
    /// The container does not start with the silenda marker.
    MarkerMismatch,
    /// Input data ended before the expected component could be read.
    TruncatedInput,
    /// The file name recovered from a container is not usable as a
    /// single path component.
    InvalidFileName,
    /// The credential record on disk has the wrong size.
    RecordCorrupt,
    /// No agent program is available for this platform.
    DeviceUnsupported,
    /// The agent could not be spawned, timed out, failed, or found no device.
    DeviceUnavailable,
    /// The block cipher could not be keyed.
    CipherInit,
    /// bcrypt failed to produce a hash.
    PasswordHashFailure,
    /// Unexpected state reached within silenda logic.
    InternalInvariant,
    /// Interaction with the filesystem, stdin/stdout, or a child process failed.
    Io,
}

#[derive(Debug, Error)]
#[error("{msg}")]
pub struct SilendaError {
    /// Broad error category, always provided.
    pub category: ErrorCategory,
    /// Optional specific condition tag for consumers that need to
    /// branch their behavior. Any code consuming errors MUST handle
    /// the absence of a defined kind.
    pub kind: Option<ErrorKind>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    msg: String,
}

impl SilendaError {
    /// Creates a new error with a required category and display message.
    pub fn new(category: ErrorCategory, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: None,
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that also tags the failure with a kind.
    pub fn with_kind(category: ErrorCategory, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that carries both a kind tag and the originating source error.
    pub fn with_kind_and_source(
        category: ErrorCategory,
        kind: ErrorKind,
        msg: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: Some(Box::new(source)),
            msg: msg.into(),
        }
    }

    /// Shorthand for an I/O failure, classifying missing files and
    /// permission problems as user errors.
    pub fn io(msg: impl Into<String>, err: io::Error) -> Self {
        let category = match err.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => ErrorCategory::User,
            _ => ErrorCategory::Internal,
        };
        Self::with_kind_and_source(category, ErrorKind::Io, msg, err)
    }

    /// The user-facing message carried by the error.
    pub fn message(&self) -> &str {
        &self.msg
    }

    /// Returns the preserved source error if present.
    pub fn source_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Whether any error in the source chain is an I/O permission failure.
    pub fn is_permission_denied(&self) -> bool {
        let mut current: Option<&(dyn StdError + 'static)> = Some(self);
        while let Some(err) = current {
            if let Some(io_err) = err.downcast_ref::<io::Error>() {
                if io_err.kind() == io::ErrorKind::PermissionDenied {
                    return true;
                }
            }
            current = err.source();
        }
        false
    }

    /// Wraps the current error with a higher-level message while preserving the original as source.
    pub fn with_context(self, msg: impl Into<String>) -> Self {
        let category = self.category;
        let kind = self.kind;
        Self {
            category,
            kind,
            source: Some(Box::new(self)),
            msg: msg.into(),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, SilendaError>;
