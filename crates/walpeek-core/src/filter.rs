//! Elision of empty transactions from a replication stream.

use tracing::trace;

use crate::error::TransportError;
use crate::message::ReplicationMessage;
use crate::transport::MessageStream;

/// Wraps a [`MessageStream`] and drops `Begin`/`Commit` pairs with nothing
/// between them.
///
/// Output order is input order minus the elided pairs. A `Begin` at the very
/// end of the stream is still yielded. Holds no state beyond one buffered
/// message, so restarting means restarting the underlying stream.
pub struct TransactionFilter<S> {
    source: S,
    keep_empty: bool,
    pending: Option<ReplicationMessage>,
}

impl<S: MessageStream> TransactionFilter<S> {
    pub fn new(source: S, keep_empty_transactions: bool) -> Self {
        Self {
            source,
            keep_empty: keep_empty_transactions,
            pending: None,
        }
    }

    /// Next message to deliver, or `None` when the source has ended.
    pub async fn next(&mut self) -> Result<Option<ReplicationMessage>, TransportError> {
        if let Some(message) = self.pending.take() {
            return Ok(Some(message));
        }

        let keep_empty = self.keep_empty;
        loop {
            // The source reuses its buffer on advance, so a Begin must be
            // copied out before looking at what follows it.
            let begin = match self.source.next_message().await? {
                None => return Ok(None),
                Some(message) if keep_empty || !message.is_begin() => {
                    return Ok(Some(message.clone()))
                }
                Some(begin) => begin.clone(),
            };

            match self.source.next_message().await? {
                None => return Ok(Some(begin)),
                Some(commit) if commit.is_commit() => {
                    trace!(begin = %begin.position(), commit = %commit.position(), "Skipping empty transaction");
                }
                Some(next) => {
                    self.pending = Some(next.clone());
                    return Ok(Some(begin));
                }
            }
        }
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::lsn::Lsn;
    use crate::message::DataKind;
    use crate::mock::ScriptedStream;

    fn begin(pos: u64) -> ReplicationMessage {
        ReplicationMessage::Begin {
            position: Lsn(pos),
            xid: pos as u32,
        }
    }

    fn commit(pos: u64) -> ReplicationMessage {
        ReplicationMessage::Commit { position: Lsn(pos) }
    }

    fn data(pos: u64, kind: DataKind) -> ReplicationMessage {
        ReplicationMessage::Data {
            position: Lsn(pos),
            kind,
            payload: Bytes::new(),
        }
    }

    async fn collect(input: Vec<ReplicationMessage>, keep_empty: bool) -> Vec<ReplicationMessage> {
        let mut filter = TransactionFilter::new(ScriptedStream::new(input), keep_empty);
        let mut out = Vec::new();
        while let Some(message) = filter.next().await.unwrap() {
            out.push(message);
        }
        out
    }

    fn mixed_input() -> Vec<ReplicationMessage> {
        vec![
            begin(1),
            commit(2),
            data(3, DataKind::Relation),
            begin(4),
            data(5, DataKind::Insert),
            data(6, DataKind::Update),
            commit(7),
            begin(8),
            commit(9),
            begin(10),
        ]
    }

    #[tokio::test]
    async fn test_keep_empty_is_identity() {
        let input = mixed_input();
        assert_eq!(collect(input.clone(), true).await, input);
    }

    #[tokio::test]
    async fn test_empty_transactions_are_elided() {
        let out = collect(mixed_input(), false).await;
        assert_eq!(
            out,
            vec![
                data(3, DataKind::Relation),
                begin(4),
                data(5, DataKind::Insert),
                data(6, DataKind::Update),
                commit(7),
                begin(10),
            ]
        );
    }

    #[tokio::test]
    async fn test_non_empty_transaction_is_preserved() {
        let input = vec![
            begin(1),
            data(2, DataKind::Insert),
            data(3, DataKind::Delete),
            commit(4),
        ];
        assert_eq!(collect(input.clone(), false).await, input);
    }

    #[tokio::test]
    async fn test_trailing_begin_is_flushed() {
        assert_eq!(collect(vec![begin(1)], false).await, vec![begin(1)]);
    }

    #[tokio::test]
    async fn test_consecutive_empty_transactions() {
        let input = vec![begin(1), commit(2), begin(3), commit(4), begin(5), commit(6)];
        assert!(collect(input, false).await.is_empty());
    }

    #[tokio::test]
    async fn test_begin_followed_by_begin_passes_both() {
        let input = vec![begin(1), begin(2), commit(3)];
        assert_eq!(collect(input, false).await, vec![begin(1), begin(2), commit(3)]);
    }

    #[tokio::test]
    async fn test_empty_source() {
        assert!(collect(vec![], false).await.is_empty());
    }

    #[tokio::test]
    async fn test_source_error_is_propagated() {
        let stream = ScriptedStream::failing_after(vec![begin(1)], TransportError::other("eof"));
        let mut filter = TransactionFilter::new(stream, false);
        assert!(filter.next().await.is_err());
    }
}
