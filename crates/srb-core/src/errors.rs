/// Core error type for the bot.
///
/// Adapter crates map their specific failures into this type so the core can
/// handle them consistently (re-prompt vs terminate vs swallow, per flow).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    /// Locally recoverable input problem; the current prompt is repeated.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("{0}")]
    StoreRead(String),

    #[error("{0}")]
    StoreWrite(String),

    /// Per-recipient notification failure; logged, never surfaced.
    #[error("notify error: {0}")]
    Notify(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
