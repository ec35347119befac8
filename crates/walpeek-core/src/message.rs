use std::fmt;

use bytes::Bytes;

use crate::lsn::Lsn;

/// Kind of a non-transaction-boundary message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    Relation,
    Type,
    Insert,
    Update,
    Delete,
    Truncate,
    Origin,
    Message,
    StreamStart,
    StreamStop,
    StreamCommit,
    StreamAbort,
    Unknown(u8),
}

impl DataKind {
    pub fn name(self) -> &'static str {
        match self {
            DataKind::Relation => "Relation",
            DataKind::Type => "Type",
            DataKind::Insert => "Insert",
            DataKind::Update => "Update",
            DataKind::Delete => "Delete",
            DataKind::Truncate => "Truncate",
            DataKind::Origin => "Origin",
            DataKind::Message => "Message",
            DataKind::StreamStart => "StreamStart",
            DataKind::StreamStop => "StreamStop",
            DataKind::StreamCommit => "StreamCommit",
            DataKind::StreamAbort => "StreamAbort",
            DataKind::Unknown(_) => "Unknown",
        }
    }
}

/// One logical replication message.
///
/// Positions are non-decreasing along a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationMessage {
    Begin {
        position: Lsn,
        xid: u32,
    },
    Commit {
        position: Lsn,
    },
    Data {
        position: Lsn,
        kind: DataKind,
        /// Raw message body, tag excluded.
        payload: Bytes,
    },
}

impl ReplicationMessage {
    pub fn position(&self) -> Lsn {
        match self {
            ReplicationMessage::Begin { position, .. }
            | ReplicationMessage::Commit { position }
            | ReplicationMessage::Data { position, .. } => *position,
        }
    }

    /// Variant name as printed per delivered message.
    pub fn name(&self) -> &'static str {
        match self {
            ReplicationMessage::Begin { .. } => "Begin",
            ReplicationMessage::Commit { .. } => "Commit",
            ReplicationMessage::Data { kind, .. } => kind.name(),
        }
    }

    pub fn is_begin(&self) -> bool {
        matches!(self, ReplicationMessage::Begin { .. })
    }

    pub fn is_commit(&self) -> bool {
        matches!(self, ReplicationMessage::Commit { .. })
    }
}

impl fmt::Display for ReplicationMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
