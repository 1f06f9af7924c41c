use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("rejected at ingestion: {0}")]
    Invalid(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("profile {0} not found")]
    ProfileNotFound(String),

    #[error("question {0} not found")]
    QuestionNotFound(i64),

    #[error("no lives left, remediation required")]
    OutOfLives,

    #[error("identity {0} has not been resumed in this session")]
    SessionNotResumed(String),

    #[error("email {0} is already registered")]
    DuplicateEmail(String),

    #[error("no {0} joker left")]
    JokerUnavailable(&'static str),

    #[error("not enough experience: {needed} xp required")]
    InsufficientXp { needed: u32 },

    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type EngineResult<T> = Result<T, EngineError>;
