//! Session authentication.
//!
//! A bounded automaton: one plain attempt, then at most one retry after
//! enabling the password file or prompting for a password.

use tracing::{debug, info, warn};

use crate::config::{ConnectParams, CredentialMode, SessionConfig};
use crate::error::{ErrorCode, SessionError, SessionResult, TransportError};
use crate::transport::{AttemptOutcome, Connector, CredentialPrompt, ProtocolSession};

/// An authenticated session with its negotiated protocol version.
#[derive(Debug)]
pub struct OpenedSession<S> {
    pub session: S,
    pub protocol_version: u32,
}

/// Protocol version used when none was configured.
pub fn default_protocol_version(server_major: u32) -> u32 {
    if server_major > 13 {
        2
    } else {
        1
    }
}

/// Open an authenticated session, making at most two attempts.
pub async fn authenticate<C, P>(
    connector: &C,
    prompt: &mut P,
    config: &SessionConfig,
) -> SessionResult<OpenedSession<C::Session>>
where
    C: Connector,
    P: CredentialPrompt,
{
    let mut params = ConnectParams::from_config(config);

    if config.credential_mode == CredentialMode::ForcePrompt {
        params.password = Some(prompt.prompt().await.ok_or_else(empty_credential)?);
    }

    debug!(host = %params.host, port = params.port, user = %params.user, attempt = 1, "Connecting");
    match AttemptOutcome::from(connector.open(&params).await) {
        AttemptOutcome::Ok(session) => return Ok(opened(session, config)),
        AttemptOutcome::RequiresAlternateSource => {
            info!("Server requires a password; retrying with the password file");
            params.use_passfile = true;
        }
        AttemptOutcome::RequiresCredential(cause) => {
            if config.credential_mode == CredentialMode::NeverPrompt {
                return Err(SessionError::with_cause(
                    ErrorCode::MissingCredential,
                    format!(
                        "password authentication failed for user \"{}\" and prompting is disabled",
                        params.user
                    ),
                    cause,
                ));
            }
            warn!(error = %cause, "Authentication failed, prompting for password");
            params.password = Some(prompt.prompt().await.ok_or_else(empty_credential)?);
        }
        AttemptOutcome::NotFound(cause) | AttemptOutcome::Failed(cause) => {
            return Err(SessionError::with_cause(
                ErrorCode::UnhandledConnect,
                format!("could not connect to {}:{}", params.host, params.port),
                cause,
            ));
        }
    }

    debug!(host = %params.host, port = params.port, user = %params.user, attempt = 2, "Connecting");
    match AttemptOutcome::from(connector.open(&params).await) {
        AttemptOutcome::Ok(session) => Ok(opened(session, config)),
        AttemptOutcome::RequiresAlternateSource => Err(retry_failed(
            &params,
            TransportError::AlternateSourceRequired,
        )),
        AttemptOutcome::RequiresCredential(cause)
        | AttemptOutcome::NotFound(cause)
        | AttemptOutcome::Failed(cause) => Err(retry_failed(&params, cause)),
    }
}

fn opened<S: ProtocolSession>(session: S, config: &SessionConfig) -> OpenedSession<S> {
    let server_major = session.server_version_major();
    let protocol_version = config
        .protocol_version
        .unwrap_or_else(|| default_protocol_version(server_major));

    info!(server_major, protocol_version, "Connected");

    OpenedSession {
        session,
        protocol_version,
    }
}

fn empty_credential() -> SessionError {
    SessionError::new(ErrorCode::EmptyCredential, "no password was entered")
}

// The cause is kept as-is; a failed retry is not necessarily a credential problem.
fn retry_failed(params: &ConnectParams, cause: TransportError) -> SessionError {
    SessionError::with_cause(
        ErrorCode::RetryFailed,
        format!(
            "second connection attempt to {}:{} failed",
            params.host, params.port
        ),
        cause,
    )
}
