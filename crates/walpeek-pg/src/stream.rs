//! Replication stream over the streaming replication protocol, using
//! pgwire-replication.
//!
//! The client negotiates `proto_version '1'` in text format, so binary
//! transfer and in-progress streaming are refused before connecting.
//! It also turns Begin/Commit XLogData into its own boundary events: a Begin
//! carries the last position seen on the stream, not its `final_lsn`.

use std::collections::BTreeSet;
use std::time::Duration;

use pgwire_replication::{
    Lsn as WireLsn, ReplicationClient, ReplicationConfig as PgwireConfig, ReplicationEvent,
    TlsConfig,
};
use tracing::{debug, info};
use walpeek_core::{
    ConnectParams, Lsn, MessageStream, ReplicationMessage, SslMode, StreamOptions, TransportError,
};

use crate::error::{PgError, PgResult};
use crate::pgoutput;

/// Interval between standby status updates sent by the client.
const STATUS_INTERVAL: Duration = Duration::from_secs(10);
const IDLE_WAKEUP_INTERVAL: Duration = Duration::from_secs(10);
const BUFFER_EVENTS: usize = 8192;

/// A live replication stream.
///
/// Keeps one decoded message in a reusable slot; [`MessageStream::next_message`]
/// overwrites it on every advance.
pub struct PgStream {
    client: ReplicationClient,
    current: Option<ReplicationMessage>,
    /// Highest position seen so far, used for protocol-level Begin events.
    last_position: Lsn,
}

impl PgStream {
    /// Open the replication connection and issue `START_REPLICATION`.
    pub(crate) async fn start(
        params: &ConnectParams,
        password: &str,
        slot: &str,
        options: &StreamOptions,
    ) -> Result<Self, TransportError> {
        check_options(options)?;

        let config = PgwireConfig {
            host: params.host.clone(),
            port: params.port,
            user: params.user.clone(),
            password: password.to_string(),
            database: params.database.clone(),
            slot: slot.to_string(),
            publication: publication_names(&options.publications),
            // Zero lets the server resume from the slot's confirmed position.
            start_lsn: WireLsn::from(0u64),
            stop_at_lsn: None,
            status_interval: STATUS_INTERVAL,
            idle_wakeup_interval: IDLE_WAKEUP_INTERVAL,
            buffer_events: BUFFER_EVENTS,
            tls: tls_config(params.ssl_mode),
        };

        debug!(
            host = %config.host,
            port = config.port,
            slot = %config.slot,
            publication = %config.publication,
            "Starting replication connection"
        );

        let client = ReplicationClient::connect(config)
            .await
            .map_err(|e| start_error(slot, e.to_string()))?;

        Ok(Self {
            client,
            current: None,
            last_position: Lsn::ZERO,
        })
    }
}

impl MessageStream for PgStream {
    async fn next_message(&mut self) -> Result<Option<&ReplicationMessage>, TransportError> {
        loop {
            let event = self
                .client
                .recv()
                .await
                .map_err(|e| PgError::Replication(e.to_string()))?;

            let Some(event) = event else {
                info!("Replication stream ended (recv returned None)");
                self.current = None;
                return Ok(None);
            };

            let message = match event {
                ReplicationEvent::XLogData { wal_end, data, .. } => {
                    pgoutput::decode(&data, Lsn(wal_end.into()))?
                }
                ReplicationEvent::KeepAlive {
                    wal_end,
                    reply_requested,
                    ..
                } => {
                    debug!(wal_end = %Lsn(wal_end.into()), reply_requested, "Keepalive");
                    continue;
                }
                ReplicationEvent::StoppedAt { reached } => {
                    info!(lsn = %Lsn(reached.into()), "Stream stopped");
                    self.current = None;
                    return Ok(None);
                }
                ReplicationEvent::Begin { xid, .. } => ReplicationMessage::Begin {
                    position: self.last_position,
                    xid,
                },
                ReplicationEvent::Commit { end_lsn, .. } => ReplicationMessage::Commit {
                    position: self.last_position.max(Lsn(end_lsn.into())),
                },
            };

            self.last_position = self.last_position.max(message.position());
            let message: &ReplicationMessage = self.current.insert(message);
            return Ok(Some(message));
        }
    }

    fn report_progress(&mut self, _applied: Lsn, flushed: Lsn) {
        // The client reports one position for write, flush and apply.
        self.client.update_applied_lsn(WireLsn::from(flushed.as_u64()));
    }
}

/// Reject options the transport cannot send.
///
/// Without in-progress streaming, versions above 1 deliver the same messages,
/// so a higher version is accepted and served as version 1.
fn check_options(options: &StreamOptions) -> PgResult<()> {
    if options.binary {
        return Err(PgError::UnsupportedStreamOption("binary"));
    }
    if options.streaming {
        return Err(PgError::UnsupportedStreamOption("streaming"));
    }
    if options.protocol_version > 1 {
        debug!(
            requested = options.protocol_version,
            "Serving protocol version 1; no in-progress streaming was requested"
        );
    }
    Ok(())
}

/// `publication_names` option value.
fn publication_names(publications: &BTreeSet<String>) -> String {
    publications
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

fn tls_config(mode: SslMode) -> TlsConfig {
    match mode {
        SslMode::Disable => TlsConfig::disabled(),
        SslMode::Require => TlsConfig::require(),
        SslMode::VerifyCa => TlsConfig::verify_ca(None),
        SslMode::VerifyFull => TlsConfig::verify_full(None),
    }
}

fn start_error(slot: &str, message: String) -> TransportError {
    if message.contains("does not exist") && message.contains(slot) {
        TransportError::SlotNotFound(slot.to_string())
    } else {
        PgError::Replication(message).into()
    }
}
