//! Scripted collaborators for testing sessions without a server.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::config::{ConnectParams, Credential, SlotOptions, StreamOptions};
use crate::error::TransportError;
use crate::lsn::Lsn;
use crate::message::ReplicationMessage;
use crate::transport::{Connector, CredentialPrompt, MessageStream, ProtocolSession, SlotHandle};

/// Server major version reported when no open result was scripted.
const DEFAULT_SERVER_MAJOR: u32 = 16;

/// A recorded call against a scripted session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateSlot { name: String, options: SlotOptions },
    StartStreaming { slot: String, options: StreamOptions },
    Close,
}

#[derive(Debug, Default)]
struct MockState {
    /// Scripted open results: the server major version or a failure.
    open_results: VecDeque<Result<u32, TransportError>>,
    create_results: VecDeque<Result<(), TransportError>>,
    start_results: VecDeque<Result<ScriptedStream, TransportError>>,
    open_attempts: Vec<ConnectParams>,
    calls: Vec<Call>,
    progress: Vec<(Lsn, Lsn)>,
}

/// A connector whose sessions follow a script.
///
/// Unscripted operations succeed: opens report server version 16, slot
/// creation succeeds and streams are empty.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConnector {
    state: Arc<Mutex<MockState>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next open attempt.
    pub fn push_open(&self, result: Result<u32, TransportError>) {
        self.state.lock().unwrap().open_results.push_back(result);
    }

    /// Script the next slot creation.
    pub fn push_create(&self, result: Result<(), TransportError>) {
        self.state.lock().unwrap().create_results.push_back(result);
    }

    /// Script the next start of streaming.
    pub fn push_start(&self, result: Result<Vec<ReplicationMessage>, TransportError>) {
        let result = result.map(|messages| self.stream(ScriptedStream::new(messages)));
        self.state.lock().unwrap().start_results.push_back(result);
    }

    /// Script a stream that fails with `error` after delivering `messages`.
    pub fn push_start_failing_after(&self, messages: Vec<ReplicationMessage>, error: TransportError) {
        let stream = self.stream(ScriptedStream::failing_after(messages, error));
        self.state.lock().unwrap().start_results.push_back(Ok(stream));
    }

    /// Script a stream that delivers `messages` and then never ends.
    pub fn push_start_pending(&self, messages: Vec<ReplicationMessage>) {
        let stream = self.stream(ScriptedStream::stalling(messages));
        self.state.lock().unwrap().start_results.push_back(Ok(stream));
    }

    /// Parameters of every open attempt, in order.
    pub fn open_attempts(&self) -> Vec<ConnectParams> {
        self.state.lock().unwrap().open_attempts.clone()
    }

    /// Session calls, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Progress reports received by scripted streams, in order.
    pub fn progress(&self) -> Vec<(Lsn, Lsn)> {
        self.state.lock().unwrap().progress.clone()
    }

    fn stream(&self, mut stream: ScriptedStream) -> ScriptedStream {
        stream.state = Some(self.state.clone());
        stream
    }
}

impl Connector for ScriptedConnector {
    type Session = ScriptedSession;

    async fn open(&self, params: &ConnectParams) -> Result<ScriptedSession, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.open_attempts.push(params.clone());
        let server_major = state
            .open_results
            .pop_front()
            .unwrap_or(Ok(DEFAULT_SERVER_MAJOR))?;

        Ok(ScriptedSession {
            state: self.state.clone(),
            server_major,
        })
    }
}

#[derive(Debug)]
pub struct ScriptedSession {
    state: Arc<Mutex<MockState>>,
    server_major: u32,
}

impl ProtocolSession for ScriptedSession {
    type Stream = ScriptedStream;

    fn server_version_major(&self) -> u32 {
        self.server_major
    }

    async fn create_slot(
        &mut self,
        name: &str,
        options: SlotOptions,
    ) -> Result<SlotHandle, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::CreateSlot {
            name: name.to_string(),
            options,
        });
        state.create_results.pop_front().unwrap_or(Ok(()))?;

        Ok(SlotHandle {
            name: name.to_string(),
            consistent_point: None,
        })
    }

    async fn start_streaming(
        &mut self,
        slot: &str,
        options: &StreamOptions,
    ) -> Result<ScriptedStream, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::StartStreaming {
            slot: slot.to_string(),
            options: options.clone(),
        });
        match state.start_results.pop_front() {
            Some(result) => result,
            None => {
                let mut stream = ScriptedStream::new(vec![]);
                stream.state = Some(self.state.clone());
                Ok(stream)
            }
        }
    }

    async fn close(&mut self) {
        self.state.lock().unwrap().calls.push(Call::Close);
    }
}

/// A stream over a fixed list of messages.
///
/// Like a real receive buffer, the slot holding the current message is
/// overwritten on every advance.
#[derive(Debug)]
pub struct ScriptedStream {
    messages: VecDeque<ReplicationMessage>,
    current: Option<ReplicationMessage>,
    error: Option<TransportError>,
    /// Never end once the scripted messages are used up.
    stall: bool,
    state: Option<Arc<Mutex<MockState>>>,
}

impl ScriptedStream {
    pub fn new(messages: Vec<ReplicationMessage>) -> Self {
        Self {
            messages: messages.into(),
            current: None,
            error: None,
            stall: false,
            state: None,
        }
    }

    pub fn failing_after(messages: Vec<ReplicationMessage>, error: TransportError) -> Self {
        Self {
            error: Some(error),
            ..Self::new(messages)
        }
    }

    /// A stream that waits forever after delivering `messages`, like a live
    /// server with no new changes.
    pub fn stalling(messages: Vec<ReplicationMessage>) -> Self {
        Self {
            stall: true,
            ..Self::new(messages)
        }
    }
}

impl MessageStream for ScriptedStream {
    async fn next_message(&mut self) -> Result<Option<&ReplicationMessage>, TransportError> {
        self.current = self.messages.pop_front();
        if self.current.is_none() {
            if let Some(error) = self.error.take() {
                return Err(error);
            }
            if self.stall {
                std::future::pending::<()>().await;
            }
        }
        Ok(self.current.as_ref())
    }

    fn report_progress(&mut self, applied: Lsn, flushed: Lsn) {
        if let Some(state) = &self.state {
            state.lock().unwrap().progress.push((applied, flushed));
        }
    }
}

/// A prompt that replays scripted answers, then returns `None`.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: VecDeque<Option<Credential>>,
    calls: usize,
}

impl ScriptedPrompt {
    pub fn new<'a>(answers: impl IntoIterator<Item = Option<&'a str>>) -> Self {
        Self {
            answers: answers
                .into_iter()
                .map(|answer| answer.and_then(Credential::new))
                .collect(),
            calls: 0,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl CredentialPrompt for ScriptedPrompt {
    async fn prompt(&mut self) -> Option<Credential> {
        self.calls += 1;
        self.answers.pop_front().flatten()
    }
}
