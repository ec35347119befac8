//! Contracts for the protocol-session library and the credential prompt.
//!
//! The core never talks to the network itself. `walpeek-pg` implements these
//! traits against a real server; [`crate::mock`] implements them for tests.

use crate::config::{ConnectParams, Credential, SlotOptions, StreamOptions};
use crate::error::TransportError;
use crate::lsn::Lsn;
use crate::message::ReplicationMessage;

/// Opens protocol sessions.
#[allow(async_fn_in_trait)]
pub trait Connector {
    type Session: ProtocolSession;

    /// Open a session.
    ///
    /// Fails with [`TransportError::AlternateSourceRequired`] when the server
    /// needs a credential source that is not enabled in `params`, and with
    /// [`TransportError::AuthenticationFailed`] when the credentials were
    /// rejected or missing.
    async fn open(&self, params: &ConnectParams) -> Result<Self::Session, TransportError>;
}

/// Result of a successful slot creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotHandle {
    pub name: String,
    pub consistent_point: Option<Lsn>,
}

/// An open, authenticated session.
#[allow(async_fn_in_trait)]
pub trait ProtocolSession {
    type Stream: MessageStream;

    /// Major version of the connected server, e.g. `16`.
    fn server_version_major(&self) -> u32;

    async fn create_slot(
        &mut self,
        name: &str,
        options: SlotOptions,
    ) -> Result<SlotHandle, TransportError>;

    /// Start streaming from `slot`.
    ///
    /// Fails with [`TransportError::SlotNotFound`] when no slot of that name
    /// exists.
    async fn start_streaming(
        &mut self,
        slot: &str,
        options: &StreamOptions,
    ) -> Result<Self::Stream, TransportError>;

    /// Release the connection. Called at most once.
    async fn close(&mut self);
}

/// A live replication stream.
#[allow(async_fn_in_trait)]
pub trait MessageStream {
    /// Advance to the next message.
    ///
    /// The returned message lives in the stream's receive buffer and is
    /// invalidated by the next call; clone it to keep it across an advance.
    /// `Ok(None)` means the stream ended.
    async fn next_message(&mut self) -> Result<Option<&ReplicationMessage>, TransportError>;

    /// Report the applied and flushed positions to the server.
    fn report_progress(&mut self, applied: Lsn, flushed: Lsn);
}

/// Interactive source of a password.
#[allow(async_fn_in_trait)]
pub trait CredentialPrompt {
    /// `None` when nothing was entered.
    async fn prompt(&mut self) -> Option<Credential>;
}

/// Tagged outcome of one transport attempt, dispatched on by the connection
/// and slot state machines.
#[derive(Debug)]
pub(crate) enum AttemptOutcome<T> {
    Ok(T),
    RequiresAlternateSource,
    RequiresCredential(TransportError),
    NotFound(TransportError),
    Failed(TransportError),
}

impl<T> From<Result<T, TransportError>> for AttemptOutcome<T> {
    fn from(result: Result<T, TransportError>) -> Self {
        match result {
            Ok(value) => AttemptOutcome::Ok(value),
            Err(TransportError::AlternateSourceRequired) => AttemptOutcome::RequiresAlternateSource,
            Err(err @ TransportError::AuthenticationFailed(_)) => {
                AttemptOutcome::RequiresCredential(err)
            }
            Err(err @ TransportError::SlotNotFound(_)) => AttemptOutcome::NotFound(err),
            Err(err) => AttemptOutcome::Failed(err),
        }
    }
}
