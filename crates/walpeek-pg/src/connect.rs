//! Control connection with TLS support.

use std::sync::Arc;

use rustls::ClientConfig;
use tokio_postgres::config::SslMode as PgSslMode;
use tokio_postgres::{Client, Config, NoTls};
use tokio_postgres_rustls_improved::MakeRustlsConnect;
use walpeek_core::{ConnectParams, SslMode};

use crate::error::{PgError, PgResult};

/// Connect to Postgres with the TLS mode from `params`.
/// Spawns the connection task and returns only the client.
pub(crate) async fn connect_postgres(params: &ConnectParams, password: Option<&str>) -> PgResult<Client> {
    let mut config = Config::new();
    config
        .host(&params.host)
        .port(params.port)
        .dbname(&params.database)
        .user(&params.user)
        .application_name(&params.application_name);
    if let Some(password) = password {
        config.password(password);
    }

    if requires_tls(params.ssl_mode) {
        config.ssl_mode(PgSslMode::Require);
        let connector = MakeRustlsConnect::new(tls_config()?);

        let (client, connection) = config.connect(connector).await.map_err(PgError::Connect)?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "Postgres connection error");
            }
        });

        Ok(client)
    } else {
        config.ssl_mode(PgSslMode::Disable);
        let (client, connection) = config.connect(NoTls).await.map_err(PgError::Connect)?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "Postgres connection error");
            }
        });

        Ok(client)
    }
}

fn tls_config() -> PgResult<ClientConfig> {
    Ok(
        ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(|e| PgError::Tls(e.to_string()))?
            .with_root_certificates(root_certs())
            .with_no_client_auth(),
    )
}

/// Get root certificates from webpki-roots.
fn root_certs() -> rustls::RootCertStore {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    roots
}

pub(crate) fn requires_tls(mode: SslMode) -> bool {
    !matches!(mode, SslMode::Disable)
}
