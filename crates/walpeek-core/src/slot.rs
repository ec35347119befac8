//! Replication slot resolution.
//!
//! Generated slots are always created. User-supplied slots are streamed from
//! directly and created only when the server reports them missing, followed
//! by exactly one more start attempt.

use tracing::{info, warn};

use crate::config::{SlotIdentity, SlotOptions, SlotOrigin, SnapshotMode, StreamOptions};
use crate::error::{ErrorCode, SessionError, SessionResult, TransportError};
use crate::transport::{AttemptOutcome, ProtocolSession};

/// Only generated slots are temporary; a slot the user named outlives the
/// session.
fn slot_options(slot: &SlotIdentity) -> SlotOptions {
    SlotOptions {
        temporary: slot.origin() == SlotOrigin::Generated,
        snapshot: SnapshotMode::NoExport,
    }
}

/// Resolve `slot` and start streaming from it.
pub async fn resolve<S: ProtocolSession>(
    session: &mut S,
    slot: &SlotIdentity,
    options: &StreamOptions,
) -> SessionResult<S::Stream> {
    match slot.origin() {
        SlotOrigin::Generated => {
            create(session, slot).await?;
            start(session, slot, options).await
        }
        SlotOrigin::UserSupplied => {
            match AttemptOutcome::from(session.start_streaming(slot.name(), options).await) {
                AttemptOutcome::Ok(stream) => {
                    info!(slot = %slot.name(), "Streaming from existing replication slot");
                    Ok(stream)
                }
                AttemptOutcome::NotFound(cause) => {
                    warn!(slot = %slot.name(), error = %cause, "Replication slot missing, creating it");
                    create(session, slot).await?;
                    start(session, slot, options).await
                }
                AttemptOutcome::RequiresAlternateSource => {
                    Err(start_failed(slot, TransportError::AlternateSourceRequired))
                }
                AttemptOutcome::RequiresCredential(cause) | AttemptOutcome::Failed(cause) => {
                    Err(start_failed(slot, cause))
                }
            }
        }
    }
}

async fn create<S: ProtocolSession>(session: &mut S, slot: &SlotIdentity) -> SessionResult<()> {
    let handle = session
        .create_slot(slot.name(), slot_options(slot))
        .await
        .map_err(|cause| {
            SessionError::with_cause(
                ErrorCode::SlotCreateFailed,
                format!("failed to create replication slot '{}'", slot.name()),
                cause,
            )
        })?;

    match handle.consistent_point {
        Some(lsn) => info!(slot = %handle.name, consistent_point = %lsn, "Created replication slot"),
        None => info!(slot = %handle.name, "Created replication slot"),
    }
    Ok(())
}

async fn start<S: ProtocolSession>(
    session: &mut S,
    slot: &SlotIdentity,
    options: &StreamOptions,
) -> SessionResult<S::Stream> {
    let stream = session
        .start_streaming(slot.name(), options)
        .await
        .map_err(|cause| start_failed(slot, cause))?;

    info!(slot = %slot.name(), "Streaming started");
    Ok(stream)
}

fn start_failed(slot: &SlotIdentity, cause: TransportError) -> SessionError {
    SessionError::with_cause(
        ErrorCode::UnhandledStartReplication,
        format!("failed to start replication from slot '{}'", slot.name()),
        cause,
    )
}
