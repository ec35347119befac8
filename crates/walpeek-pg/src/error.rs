use thiserror::Error;
use walpeek_core::TransportError;

#[derive(Debug, Error)]
pub enum PgError {
    #[error("postgres error: {0}")]
    Postgres(String),

    #[error("connection failed: {0}")]
    Connect(#[source] tokio_postgres::Error),

    #[error("TLS config error: {0}")]
    Tls(String),

    #[error("failed to create replication slot: {0}")]
    SlotCreationFailed(String),

    #[error("failed to drop replication slot: {0}")]
    SlotDropFailed(String),

    #[error("unsupported slot option: {0}")]
    UnsupportedSlotOption(&'static str),

    #[error("replication option '{0}' is not supported by this transport")]
    UnsupportedStreamOption(&'static str),

    #[error("replication error: {0}")]
    Replication(String),

    #[error("pgoutput decode error: {0}")]
    PgOutput(String),

    #[error("truncated pgoutput message: {0}")]
    Truncated(#[from] std::io::Error),
}

impl From<tokio_postgres::Error> for PgError {
    fn from(e: tokio_postgres::Error) -> Self {
        // Extract database error details if available
        if let Some(db_err) = e.as_db_error() {
            let msg = format!(
                "{}: {} (code: {})",
                db_err.severity(),
                db_err.message(),
                db_err.code().code()
            );
            PgError::Postgres(msg)
        } else {
            PgError::Postgres(e.to_string())
        }
    }
}

impl From<PgError> for TransportError {
    fn from(e: PgError) -> Self {
        TransportError::other(e)
    }
}

pub type PgResult<T> = Result<T, PgError>;
