use std::fmt;

use thiserror::Error;

/// Boxed cause carried through from a transport implementation.
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures reported by the protocol-session collaborator.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("server requires an alternate credential source")]
    AlternateSourceRequired,

    #[error("authentication failed: {0}")]
    AuthenticationFailed(#[source] Cause),

    #[error("replication slot '{0}' does not exist")]
    SlotNotFound(String),

    #[error("replication slot '{0}' already exists")]
    SlotAlreadyExists(String),

    #[error(transparent)]
    Other(Cause),
}

impl TransportError {
    pub fn other(err: impl Into<Cause>) -> Self {
        TransportError::Other(err.into())
    }

    pub fn authentication(err: impl Into<Cause>) -> Self {
        TransportError::AuthenticationFailed(err.into())
    }
}

/// Invalid session configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("at least one publication name is required")]
    NoPublications,

    #[error("invalid slot name '{0}': use 1-63 lowercase letters, digits or underscores")]
    InvalidSlotName(String),

    #[error("unsupported protocol version {0} (expected 1-4)")]
    UnsupportedProtocolVersion(u32),

    #[error("invalid LSN format: {0}")]
    InvalidLsn(String),
}

/// Stable failure taxonomy surfaced to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidConfig,
    MissingCredential,
    EmptyCredential,
    RetryFailed,
    UnhandledConnect,
    SlotCreateFailed,
    UnhandledStartReplication,
    StreamFailed,
}

impl ErrorCode {
    /// Numeric process status for this code. Never zero, never the
    /// cancellation status.
    pub fn status(self) -> u8 {
        match self {
            ErrorCode::InvalidConfig => 2,
            ErrorCode::MissingCredential => 10,
            ErrorCode::EmptyCredential => 11,
            ErrorCode::RetryFailed => 12,
            ErrorCode::UnhandledConnect => 13,
            ErrorCode::SlotCreateFailed => 20,
            ErrorCode::UnhandledStartReplication => 30,
            ErrorCode::StreamFailed => 31,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::InvalidConfig => "invalid session configuration",
            ErrorCode::MissingCredential => "a password is required but prompting is disabled",
            ErrorCode::EmptyCredential => "no password was entered",
            ErrorCode::RetryFailed => "the second connection attempt failed",
            ErrorCode::UnhandledConnect => "could not connect to the server",
            ErrorCode::SlotCreateFailed => "could not create the replication slot",
            ErrorCode::UnhandledStartReplication => "could not start replication",
            ErrorCode::StreamFailed => "the replication stream failed",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::InvalidConfig => "InvalidConfig",
            ErrorCode::MissingCredential => "MissingCredential",
            ErrorCode::EmptyCredential => "EmptyCredential",
            ErrorCode::RetryFailed => "RetryFailed",
            ErrorCode::UnhandledConnect => "UnhandledConnect",
            ErrorCode::SlotCreateFailed => "SlotCreateFailed",
            ErrorCode::UnhandledStartReplication => "UnhandledStartReplication",
            ErrorCode::StreamFailed => "StreamFailed",
        };
        f.write_str(name)
    }
}

/// A terminal failure of a session operation.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct SessionError {
    code: ErrorCode,
    message: String,
    #[source]
    cause: Option<TransportError>,
}

impl SessionError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(code: ErrorCode, message: impl Into<String>, cause: TransportError) -> Self {
        Self {
            code,
            message: message.into(),
            cause: Some(cause),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&TransportError> {
        self.cause.as_ref()
    }
}

impl From<ConfigError> for SessionError {
    fn from(err: ConfigError) -> Self {
        SessionError::new(ErrorCode::InvalidConfig, err.to_string())
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
