use thiserror::Error;

/// Protocol and node errors.
///
/// The first four variants mirror the recoverable failure classes of the
/// shard protocol: they are logged, the offending message is dropped, and
/// processing continues. Anything else that escapes a consensus handler is
/// treated as fatal because the local chain may have diverged.
#[derive(Error, Debug)]
pub enum DevvError {
    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("verification failed: {0}")]
    VerificationFailed(String),

    #[error("consistency failure: {0}")]
    ConsistencyFailure(String),

    #[error("overdraft: address {address} coin {coin} would reach {balance}")]
    Overdraft {
        address: String,
        coin: u64,
        balance: i64,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl DevvError {
    /// True for errors that are handled by dropping the offending message.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DevvError::Deserialization(_)
                | DevvError::VerificationFailed(_)
                | DevvError::ConsistencyFailure(_)
                | DevvError::Overdraft { .. }
        )
    }
}

pub type DevvResult<T> = Result<T, DevvError>;
