//! Open a session, print every delivered message and acknowledge it.

use std::future::Future;
use std::io::{self, Write};

use colored::Colorize;
use tracing::{info, warn};
use walpeek_core::{
    describe, Connector, CredentialPrompt, ErrorCode, ExitStatus, ReplicationMessage,
    ReplicationSession, SessionConfig, SessionError, TransportError,
};
use walpeek_pg::PgConnector;

use crate::cli::Cli;
use crate::prompt::TerminalPrompt;

/// Stream from the server described by `cli` until the stream ends, fails or
/// Ctrl-C is pressed.
pub async fn run(cli: &Cli) -> ExitStatus {
    let config = cli.session_config();
    let mut prompt = TerminalPrompt::new(config.user.clone());

    let cancel = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Could not listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    stream(
        &PgConnector::new(),
        &mut prompt,
        config,
        cli.show_lsn,
        &mut out,
        cancel,
    )
    .await
}

/// Drive one session end to end. Failures and cancellation are reported on
/// stderr; the session is closed on every path after it was opened.
pub async fn stream<C, P, W, F>(
    connector: &C,
    prompt: &mut P,
    config: SessionConfig,
    show_lsn: bool,
    out: &mut W,
    cancel: F,
) -> ExitStatus
where
    C: Connector,
    P: CredentialPrompt,
    W: Write,
    F: Future<Output = ()>,
{
    tokio::pin!(cancel);

    let opened = tokio::select! {
        opened = ReplicationSession::open(connector, prompt, config) => opened,
        _ = &mut cancel => {
            report_aborted();
            return ExitStatus::Aborted;
        }
    };
    let mut session = match opened {
        Ok(session) => session,
        Err(err) => return report_failure(&err),
    };

    let status = tokio::select! {
        status = consume(&mut session, show_lsn, out) => status,
        _ = &mut cancel => ExitStatus::Aborted,
    };

    session.close().await;
    if status == ExitStatus::Aborted {
        report_aborted();
    }
    status
}

async fn consume<C: Connector, W: Write>(
    session: &mut ReplicationSession<C>,
    show_lsn: bool,
    out: &mut W,
) -> ExitStatus {
    if let Err(err) = session.start_streaming().await {
        return report_failure(&err);
    }

    let mut count = 0u64;
    loop {
        let next = session.next_message().await;
        let message = match next {
            Ok(Some(message)) => message,
            Ok(None) => {
                info!(messages = count, "Stream finished");
                return ExitStatus::Success;
            }
            Err(err) => return report_failure(&err),
        };

        if let Err(e) = write_message(out, &message, show_lsn) {
            let err = SessionError::with_cause(
                ErrorCode::StreamFailed,
                "failed to write message output",
                TransportError::other(e),
            );
            return report_failure(&err);
        }
        count += 1;
        session.report_progress(message.position());
    }
}

fn write_message<W: Write>(out: &mut W, message: &ReplicationMessage, show_lsn: bool) -> io::Result<()> {
    if show_lsn {
        writeln!(out, "{} {}", message, message.position())?;
    } else {
        writeln!(out, "{}", message)?;
    }
    out.flush()
}

fn report_failure(err: &SessionError) -> ExitStatus {
    let mut lines = describe(err).into_iter();
    if let Some(first) = lines.next() {
        eprintln!("{}", format!("Error: {}", first).red());
    }
    for line in lines {
        eprintln!("  {}", line);
    }
    ExitStatus::from(err)
}

fn report_aborted() {
    eprintln!("{}", ExitStatus::Aborted.message().yellow());
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::time::Duration;

    use bytes::Bytes;
    use walpeek_core::mock::{Call, ScriptedConnector, ScriptedPrompt};
    use walpeek_core::{Credential, CredentialMode, DataKind, Lsn};

    use super::*;

    fn config(mode: CredentialMode) -> SessionConfig {
        SessionConfig {
            publications: BTreeSet::from(["orders".to_string()]),
            credential_mode: mode,
            ..Default::default()
        }
    }

    fn transaction(begin: u64) -> Vec<ReplicationMessage> {
        vec![
            ReplicationMessage::Begin {
                position: Lsn(begin),
                xid: 7,
            },
            ReplicationMessage::Data {
                position: Lsn(begin + 8),
                kind: DataKind::Insert,
                payload: Bytes::from_static(b"N"),
            },
            ReplicationMessage::Commit {
                position: Lsn(begin + 16),
            },
        ]
    }

    /// A prompt that never answers.
    struct StalledPrompt;

    impl CredentialPrompt for StalledPrompt {
        async fn prompt(&mut self) -> Option<Credential> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_prints_one_line_per_message() {
        let connector = ScriptedConnector::new();
        let mut messages = vec![
            ReplicationMessage::Begin {
                position: Lsn(0x10),
                xid: 6,
            },
            ReplicationMessage::Commit {
                position: Lsn(0x18),
            },
        ];
        messages.extend(transaction(0x16B3748));
        connector.push_start(Ok(messages));

        let mut prompt = ScriptedPrompt::default();
        let mut out = Vec::new();
        let status = stream(
            &connector,
            &mut prompt,
            config(CredentialMode::Auto),
            false,
            &mut out,
            std::future::pending(),
        )
        .await;

        assert_eq!(status, ExitStatus::Success);
        assert_eq!(String::from_utf8(out).unwrap(), "Begin\nInsert\nCommit\n");
        assert_eq!(connector.progress().last(), Some(&(Lsn(0x16B3758), Lsn(0x16B3758))));
        assert_eq!(connector.calls().last(), Some(&Call::Close));
    }

    #[tokio::test]
    async fn test_show_lsn_appends_position() {
        let connector = ScriptedConnector::new();
        connector.push_start(Ok(transaction(0x16B3740)));

        let mut prompt = ScriptedPrompt::default();
        let mut out = Vec::new();
        let status = stream(
            &connector,
            &mut prompt,
            config(CredentialMode::Auto),
            true,
            &mut out,
            std::future::pending(),
        )
        .await;

        assert_eq!(status, ExitStatus::Success);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Begin 0/16B3740\nInsert 0/16B3748\nCommit 0/16B3750\n"
        );
    }

    #[tokio::test]
    async fn test_connect_failure_maps_to_exit_status() {
        let connector = ScriptedConnector::new();
        connector.push_open(Err(TransportError::authentication("password authentication failed")));

        let mut prompt = ScriptedPrompt::default();
        let mut out = Vec::new();
        let status = stream(
            &connector,
            &mut prompt,
            config(CredentialMode::NeverPrompt),
            false,
            &mut out,
            std::future::pending(),
        )
        .await;

        assert_eq!(status, ExitStatus::Failed(ErrorCode::MissingCredential));
        assert_eq!(status.code(), 10);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_stream_failure_still_closes_session() {
        let connector = ScriptedConnector::new();
        connector.push_start_failing_after(transaction(0x100), TransportError::other("connection reset"));

        let mut prompt = ScriptedPrompt::default();
        let mut out = Vec::new();
        let status = stream(
            &connector,
            &mut prompt,
            config(CredentialMode::Auto),
            false,
            &mut out,
            std::future::pending(),
        )
        .await;

        assert_eq!(status, ExitStatus::Failed(ErrorCode::StreamFailed));
        assert_eq!(String::from_utf8(out).unwrap(), "Begin\nInsert\nCommit\n");
        assert_eq!(connector.calls().last(), Some(&Call::Close));
    }

    #[tokio::test]
    async fn test_cancel_while_streaming_closes_session() {
        let connector = ScriptedConnector::new();
        connector.push_start_pending(transaction(0x200));

        let mut prompt = ScriptedPrompt::default();
        let mut out = Vec::new();
        let status = stream(
            &connector,
            &mut prompt,
            config(CredentialMode::Auto),
            false,
            &mut out,
            tokio::time::sleep(Duration::from_millis(50)),
        )
        .await;

        assert_eq!(status, ExitStatus::Aborted);
        assert_eq!(String::from_utf8(out).unwrap(), "Begin\nInsert\nCommit\n");
        assert_eq!(connector.progress().last(), Some(&(Lsn(0x210), Lsn(0x210))));
        assert_eq!(connector.calls().last(), Some(&Call::Close));
    }

    #[tokio::test]
    async fn test_cancel_during_prompt_is_aborted() {
        let connector = ScriptedConnector::new();

        let mut prompt = StalledPrompt;
        let mut out = Vec::new();
        let status = stream(
            &connector,
            &mut prompt,
            config(CredentialMode::ForcePrompt),
            false,
            &mut out,
            async {},
        )
        .await;

        assert_eq!(status, ExitStatus::Aborted);
        assert_eq!(status.code(), 1);
        assert!(connector.open_attempts().is_empty());
    }
}
