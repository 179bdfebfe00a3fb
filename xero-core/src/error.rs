use thiserror::Error;

/// Why a mention cycle ended in the failed state. None of these touch the
/// durable cursor.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("cursor load failed: {0}")]
    CursorLoad(String),

    #[error("mention fetch failed: {0}")]
    Fetch(String),

    #[error("mention fetch returned a missing or malformed body")]
    MalformedPage,
}
