use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("directory unavailable: {0}")]
    Unavailable(String),

    #[error("directory write failed: {0}")]
    Write(String),

    /// A uniqueness constraint (e.g. on uidNumber) rejected the write
    #[error("directory constraint violated: {0}")]
    Conflict(String),

    #[error("entry already exists: {0}")]
    AlreadyExists(String),

    #[error("no such entry: {0}")]
    NotFound(String),

    #[error("malformed directory entry {dn}: {reason}")]
    InvalidEntry { dn: String, reason: String },
}

impl DirectoryError {
    /// True for failures of a write the directory actually received or rejected.
    pub fn is_write_failure(&self) -> bool {
        matches!(
            self,
            DirectoryError::Write(_)
                | DirectoryError::Conflict(_)
                | DirectoryError::AlreadyExists(_)
                | DirectoryError::NotFound(_)
        )
    }

    /// Reclassify a connectivity failure during a mutation as a write failure.
    pub(crate) fn into_write(self) -> Self {
        match self {
            DirectoryError::Unavailable(msg) => DirectoryError::Write(msg),
            other => other,
        }
    }
}
