//! Decoding of pgoutput messages into [`ReplicationMessage`]s.
//!
//! Only transaction boundaries are decoded field by field; every other
//! message keeps its raw body.
//!
//! Reference: https://www.postgresql.org/docs/current/protocol-logicalrep-message-formats.html

use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt};
use bytes::Bytes;
use walpeek_core::{DataKind, Lsn, ReplicationMessage};

use crate::error::{PgError, PgResult};

/// Decode one XLogData payload observed at `position`.
pub fn decode(data: &[u8], position: Lsn) -> PgResult<ReplicationMessage> {
    let (&tag, body) = data
        .split_first()
        .ok_or_else(|| PgError::PgOutput("empty message".into()))?;

    match tag {
        b'B' => {
            let mut cursor = Cursor::new(body);
            let _final_lsn = cursor.read_u64::<BigEndian>()?;
            let _commit_time = cursor.read_i64::<BigEndian>()?;
            let xid = cursor.read_u32::<BigEndian>()?;
            Ok(ReplicationMessage::Begin { position, xid })
        }
        b'C' => {
            let mut cursor = Cursor::new(body);
            let _flags = cursor.read_u8()?;
            let _commit_lsn = cursor.read_u64::<BigEndian>()?;
            let _end_lsn = cursor.read_u64::<BigEndian>()?;
            let _commit_time = cursor.read_i64::<BigEndian>()?;
            Ok(ReplicationMessage::Commit { position })
        }
        other => Ok(ReplicationMessage::Data {
            position,
            kind: data_kind(other),
            payload: Bytes::copy_from_slice(body),
        }),
    }
}

fn data_kind(tag: u8) -> DataKind {
    match tag {
        b'R' => DataKind::Relation,
        b'Y' => DataKind::Type,
        b'I' => DataKind::Insert,
        b'U' => DataKind::Update,
        b'D' => DataKind::Delete,
        b'T' => DataKind::Truncate,
        b'O' => DataKind::Origin,
        b'M' => DataKind::Message,
        b'S' => DataKind::StreamStart,
        b'E' => DataKind::StreamStop,
        b'c' => DataKind::StreamCommit,
        b'A' => DataKind::StreamAbort,
        other => DataKind::Unknown(other),
    }
}
