use thiserror::Error;

/// Failure while paging a channel on the remote source. Never fatal to a
/// whole sync: the affected channel is excluded from the run.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("missing access to channel {0}")]
    Forbidden(u64),
    #[error("channel {0} not found")]
    NotFound(u64),
    #[error("remote error: {0}")]
    Remote(String),
}

/// Archive file could not be understood. Callers treat the archive as absent.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("archive header is invalid")]
    BadHeader,
    #[error("archive is encrypted but no passphrase is configured")]
    MissingKey,
    #[error("archive decryption failed")]
    Decrypt,
    #[error("archive encryption failed")]
    Encrypt,
    #[error("archive compression failed: {0}")]
    Compression(#[source] std::io::Error),
    #[error("archive json is invalid: {0}")]
    Json(#[from] serde_json::Error),
}

/// Unexpected fault while handling a load request.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("could not persist archive: {0}")]
    Persist(#[from] tempfile::PersistError),
}
