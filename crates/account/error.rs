#[derive(Debug, thiserror::Error)]
pub enum AtomStoreError {
    #[error("Atom store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Custom(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("Account state lock was poisoned: {0}")]
    StateLock(String),
    #[error("Atom store error: {0}")]
    Store(#[from] AtomStoreError),
    #[error("{0}")]
    Custom(String),
}
