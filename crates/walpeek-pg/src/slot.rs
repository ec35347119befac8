//! Replication slot management over the control connection.

use std::time::Duration;

use tokio_postgres::error::SqlState;
use tokio_postgres::Client;
use tracing::{debug, info};
use walpeek_core::{Lsn, TransportError};

use crate::error::{PgError, PgResult};

/// Attempts to drop a slot that is still held by a closing walsender.
const DROP_ATTEMPTS: u32 = 10;
const DROP_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Check if a replication slot exists.
pub async fn slot_exists(client: &Client, slot_name: &str) -> PgResult<bool> {
    let exists: bool = client
        .query_one(
            "SELECT EXISTS(SELECT 1 FROM pg_replication_slots WHERE slot_name = $1)",
            &[&slot_name],
        )
        .await?
        .get(0);

    Ok(exists)
}

/// Create a logical replication slot with pgoutput.
///
/// Returns the slot's consistent point.
pub async fn create_slot(client: &Client, slot_name: &str) -> Result<Option<Lsn>, TransportError> {
    info!(slot = %slot_name, "Creating replication slot with pgoutput");
    let row = client
        .query_one(
            "SELECT lsn::text FROM pg_create_logical_replication_slot($1, 'pgoutput', false)",
            &[&slot_name],
        )
        .await
        .map_err(|e| {
            if e.code() == Some(&SqlState::DUPLICATE_OBJECT) {
                TransportError::SlotAlreadyExists(slot_name.to_string())
            } else {
                PgError::SlotCreationFailed(PgError::from(e).to_string()).into()
            }
        })?;

    let lsn: Option<String> = row.get(0);
    Ok(lsn.and_then(|l| l.parse().ok()))
}

/// Drop a replication slot, waiting for its last consumer to let go.
pub async fn drop_slot(client: &Client, slot_name: &str) -> PgResult<()> {
    for attempt in 1..=DROP_ATTEMPTS {
        match client
            .execute("SELECT pg_drop_replication_slot($1)", &[&slot_name])
            .await
        {
            Ok(_) => {
                info!(slot = %slot_name, "Dropped replication slot");
                return Ok(());
            }
            Err(e) if e.code() == Some(&SqlState::OBJECT_IN_USE) && attempt < DROP_ATTEMPTS => {
                debug!(slot = %slot_name, attempt, "Replication slot still active, retrying drop");
                tokio::time::sleep(DROP_RETRY_DELAY).await;
            }
            Err(e) => return Err(PgError::SlotDropFailed(PgError::from(e).to_string())),
        }
    }

    Err(PgError::SlotDropFailed(format!(
        "slot '{}' still active after {} attempts",
        slot_name, DROP_ATTEMPTS
    )))
}
