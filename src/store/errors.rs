use crate::index::IndexError;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// The database never opened; every operation fails with this.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("io error: {0}")]
    IO(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}
