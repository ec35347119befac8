//! Replication session orchestration.

use tracing::{debug, info, warn};

use crate::auth::authenticate;
use crate::config::{SessionConfig, SlotIdentity, StreamOptions};
use crate::error::{ErrorCode, SessionError, SessionResult};
use crate::filter::TransactionFilter;
use crate::lsn::Lsn;
use crate::message::ReplicationMessage;
use crate::slot;
use crate::transport::{Connector, CredentialPrompt, MessageStream, ProtocolSession};

type SessionStream<C> = <<C as Connector>::Session as ProtocolSession>::Stream;

/// Applied and flushed positions last reported to the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Watermark {
    pub applied: Lsn,
    pub flushed: Lsn,
}

/// One diagnostic replication session: authenticate, resolve the slot, then
/// deliver the filtered stream and acknowledge what the caller processed.
pub struct ReplicationSession<C: Connector> {
    config: SessionConfig,
    slot: SlotIdentity,
    protocol_version: u32,
    handle: Option<C::Session>,
    stream: Option<TransactionFilter<SessionStream<C>>>,
    watermark: Watermark,
    delivered: Option<Lsn>,
    last_error: Option<ErrorCode>,
}

impl<C: Connector> ReplicationSession<C> {
    /// Validate `config` and open an authenticated session.
    pub async fn open<P: CredentialPrompt>(
        connector: &C,
        prompt: &mut P,
        config: SessionConfig,
    ) -> SessionResult<Self> {
        config.validate()?;

        let opened = authenticate(connector, prompt, &config).await?;
        let slot = config.slot_identity();

        Ok(Self {
            config,
            slot,
            protocol_version: opened.protocol_version,
            handle: Some(opened.session),
            stream: None,
            watermark: Watermark::default(),
            delivered: None,
            last_error: None,
        })
    }

    /// Resolve the slot and start the filtered stream.
    pub async fn start_streaming(&mut self) -> SessionResult<()> {
        self.last_error = None;

        let options = self.stream_options();
        let Some(handle) = self.handle.as_mut() else {
            return Err(self.fail(SessionError::new(
                ErrorCode::UnhandledStartReplication,
                "session is closed",
            )));
        };

        let resolved = slot::resolve(handle, &self.slot, &options).await;
        match resolved {
            Ok(stream) => {
                info!(
                    slot = %self.slot.name(),
                    publications = ?options.publications,
                    protocol_version = options.protocol_version,
                    keep_empty_transactions = self.config.keep_empty_transactions,
                    "Replication stream ready"
                );
                self.stream = Some(TransactionFilter::new(
                    stream,
                    self.config.keep_empty_transactions,
                ));
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Next filtered message. `None` when the stream ended.
    pub async fn next_message(&mut self) -> SessionResult<Option<ReplicationMessage>> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(self.fail(SessionError::new(
                ErrorCode::StreamFailed,
                "streaming has not been started",
            )));
        };

        let next = stream.next().await;
        match next {
            Ok(Some(message)) => {
                let position = message.position();
                self.delivered = Some(self.delivered.map_or(position, |d| d.max(position)));
                Ok(Some(message))
            }
            Ok(None) => {
                info!("Replication stream ended");
                Ok(None)
            }
            Err(cause) => Err(self.fail(SessionError::with_cause(
                ErrorCode::StreamFailed,
                "failed to receive the next replication message",
                cause,
            ))),
        }
    }

    /// Acknowledge that the message at `position` was fully processed.
    ///
    /// Moves both watermarks forward. Positions behind the current watermark
    /// or beyond the last delivered message are ignored.
    pub fn report_progress(&mut self, position: Lsn) {
        let Some(delivered) = self.delivered else {
            warn!(lsn = %position, "Ignoring progress report before any message was delivered");
            return;
        };
        if position > delivered {
            warn!(lsn = %position, delivered = %delivered, "Ignoring progress beyond delivered position");
            return;
        }
        if position <= self.watermark.flushed {
            return;
        }
        let Some(stream) = self.stream.as_mut() else {
            return;
        };

        debug!(lsn = %position, prev = %self.watermark.flushed, "Reporting progress");
        stream.get_mut().report_progress(position, position);
        self.watermark = Watermark {
            applied: position,
            flushed: position,
        };
    }

    /// Release the stream, then the connection.
    pub async fn close(mut self) {
        drop(self.stream.take());
        if let Some(mut handle) = self.handle.take() {
            handle.close().await;
        }
        debug!(slot = %self.slot.name(), "Session closed");
    }

    pub fn slot(&self) -> &SlotIdentity {
        &self.slot
    }

    pub fn protocol_version(&self) -> u32 {
        self.protocol_version
    }

    pub fn watermark(&self) -> Watermark {
        self.watermark
    }

    /// Code of the most recent terminal failure, cleared when an operation
    /// starts.
    pub fn last_error(&self) -> Option<ErrorCode> {
        self.last_error
    }

    fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            publications: self.config.publications.clone(),
            protocol_version: self.protocol_version,
            binary: self.config.binary,
            streaming: self.config.streaming,
        }
    }

    fn fail(&mut self, err: SessionError) -> SessionError {
        self.last_error = Some(err.code());
        err
    }
}
