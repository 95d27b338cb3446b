use std::fmt;

/// Error classification from §7 of the design: callers branch on `kind()`
/// rather than matching message strings, mirroring the three propagation
/// classes the sync worker and migrator need to tell apart.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Connection failures, 5xx, throttling, partial reads. The caller must
    /// not advance its checkpoint.
    #[error("transient remote storage error: {0}")]
    Transient(#[source] anyhow::Error),

    /// The requested object does not exist. Distinguished from `Transient`
    /// because a 404 on delete is swallowed by the sync worker, not retried.
    #[error("remote object not found")]
    NotFound,

    /// A malformed manifest or request that can never succeed by retrying.
    #[error("permanent remote storage error: {0}")]
    Permanent(#[source] anyhow::Error),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    NotFound,
    Permanent,
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::Transient(_) => ErrorKind::Transient,
            ProviderError::NotFound => ErrorKind::NotFound,
            ProviderError::Permanent(_) => ErrorKind::Permanent,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::Permanent => write!(f, "permanent"),
        }
    }
}
