use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettlementError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("A draw already exists for {0}")]
    Conflict(String),

    #[error("Randomness service failed: {0}")]
    Randomness(String),

    #[error("Failed to record draw: {0}")]
    DrawInsert(#[source] rusqlite::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

#[derive(Error, Debug)]
pub enum EntryError {
    #[error("Invalid numbers: {0}")]
    InvalidNumbers(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown subscription: {0}")]
    UnknownSubscription(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Failure talking to a third-party service.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned error {code}: {message}")]
    Remote {
        service: &'static str,
        code: i64,
        message: String,
    },

    #[error("Malformed response from {0}: {1}")]
    Malformed(&'static str, String),
}
