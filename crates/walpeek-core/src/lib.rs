pub mod auth;
pub mod config;
pub mod error;
pub mod filter;
pub mod lsn;
pub mod message;
pub mod mock;
pub mod report;
pub mod session;
pub mod slot;
pub mod transport;

pub use auth::{authenticate, default_protocol_version, OpenedSession};
pub use config::{
    ConnectParams, Credential, CredentialMode, SessionConfig, SlotIdentity, SlotOptions,
    SlotOrigin, SnapshotMode, SslMode, StreamOptions,
};
pub use error::{Cause, ConfigError, ErrorCode, SessionError, SessionResult, TransportError};
pub use filter::TransactionFilter;
pub use lsn::Lsn;
pub use message::{DataKind, ReplicationMessage};
pub use report::{describe, ExitStatus, ABORTED_STATUS};
pub use session::{ReplicationSession, Watermark};
pub use transport::{Connector, CredentialPrompt, MessageStream, ProtocolSession, SlotHandle};
