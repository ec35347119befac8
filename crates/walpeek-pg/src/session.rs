//! [`Connector`] and [`ProtocolSession`] for a PostgreSQL server.
//!
//! Two connections are used: a regular tokio-postgres client for control
//! plane work (server version, slot creation) and a pgwire-replication client
//! for the replication plane.

use tokio_postgres::error::SqlState;
use tokio_postgres::Client;
use tracing::{debug, info, warn};
use walpeek_core::{
    ConnectParams, Connector, ProtocolSession, SlotHandle, SlotOptions, SnapshotMode,
    StreamOptions, TransportError,
};

use crate::connect::connect_postgres;
use crate::error::PgError;
use crate::passfile;
use crate::slot::{create_slot, drop_slot, slot_exists};
use crate::stream::PgStream;

/// Opens sessions against a PostgreSQL server.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgConnector;

impl PgConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for PgConnector {
    type Session = PgSession;

    async fn open(&self, params: &ConnectParams) -> Result<PgSession, TransportError> {
        let password = resolve_password(params);

        let client = connect_postgres(params, password.as_deref())
            .await
            .map_err(|e| classify_connect_error(e, params))?;

        let version_num: i32 = client
            .query_one("SELECT current_setting('server_version_num')::int4", &[])
            .await
            .map_err(PgError::from)?
            .get(0);
        let server_major = u32::try_from(version_num / 10_000).unwrap_or(0);

        info!(host = %params.host, port = params.port, database = %params.database, server_major, "Control connection established");

        Ok(PgSession {
            client,
            params: params.clone(),
            password: password.unwrap_or_default(),
            server_major,
            temporary_slots: Vec::new(),
        })
    }
}

/// An open control connection plus what is needed to start streaming.
pub struct PgSession {
    client: Client,
    params: ConnectParams,
    password: String,
    server_major: u32,
    /// Slots requested as temporary, dropped on close.
    temporary_slots: Vec<String>,
}

impl ProtocolSession for PgSession {
    type Stream = PgStream;

    fn server_version_major(&self) -> u32 {
        self.server_major
    }

    async fn create_slot(
        &mut self,
        name: &str,
        options: SlotOptions,
    ) -> Result<SlotHandle, TransportError> {
        if options.snapshot == SnapshotMode::Export {
            return Err(PgError::UnsupportedSlotOption("exported snapshots").into());
        }

        let consistent_point = create_slot(&self.client, name).await?;
        // The slot is consumed from a second connection, so the server cannot
        // tie it to this session; it is dropped on close instead.
        if options.temporary {
            self.temporary_slots.push(name.to_string());
        }

        Ok(SlotHandle {
            name: name.to_string(),
            consistent_point,
        })
    }

    async fn start_streaming(
        &mut self,
        slot: &str,
        options: &StreamOptions,
    ) -> Result<PgStream, TransportError> {
        if !slot_exists(&self.client, slot).await? {
            return Err(TransportError::SlotNotFound(slot.to_string()));
        }

        PgStream::start(&self.params, &self.password, slot, options).await
    }

    async fn close(&mut self) {
        for slot in std::mem::take(&mut self.temporary_slots) {
            if let Err(e) = drop_slot(&self.client, &slot).await {
                warn!(slot = %slot, error = %e, "Failed to drop temporary replication slot");
            }
        }
        debug!("Control connection closing");
    }
}

/// Password for an attempt: explicit first, then the password file if enabled.
fn resolve_password(params: &ConnectParams) -> Option<String> {
    if let Some(credential) = &params.password {
        return Some(credential.expose().to_string());
    }
    if !params.use_passfile {
        return None;
    }

    let path = passfile::location()?;
    match passfile::lookup(&path, &params.host, params.port, &params.database, &params.user) {
        Ok(password) => password,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read password file");
            None
        }
    }
}

fn classify_connect_error(err: PgError, params: &ConnectParams) -> TransportError {
    let PgError::Connect(source) = &err else {
        return err.into();
    };

    if source.code() == Some(&SqlState::INVALID_PASSWORD) {
        return TransportError::authentication(err);
    }
    if is_password_missing(source) {
        if params.password.is_none() && !params.use_passfile && passfile::is_available() {
            return TransportError::AlternateSourceRequired;
        }
        return TransportError::authentication(err);
    }

    err.into()
}

/// tokio-postgres fails client-side when the server asks for a password and
/// none is configured.
fn is_password_missing(err: &tokio_postgres::Error) -> bool {
    err.to_string().contains("password missing")
}
