//! In-memory broker doubles.
//!
//! Drive the consume loop, supervisor and failure routing without a broker.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::envelope::{Acknowledgement, InboundMessage, OutboundMessage, Position};
use crate::error::EventError;
use crate::source::{MessageSource, Publisher, SourceFactory};

/// Shared view of the offsets a [`MemorySource`] committed.
pub type CommitLog = Arc<Mutex<Vec<InboundMessage>>>;

/// Scripted message source.
///
/// Messages and faults are returned in push order. Once the script runs out,
/// `recv` reports [`EventError::StreamClosed`].
#[derive(Debug, Default)]
pub struct MemorySource {
    script: VecDeque<Result<InboundMessage, EventError>>,
    committed: CommitLog,
    commit_failure: Option<String>,
    next_offset: i64,
}

impl MemorySource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Source pre-loaded with `messages`.
    pub fn with_messages(messages: impl IntoIterator<Item = InboundMessage>) -> Self {
        let mut source = Self::new();
        for message in messages {
            source.push(message);
        }
        source
    }

    /// Queue a message. Messages without a position get partition 0 and the
    /// next free offset.
    pub fn push(&mut self, mut message: InboundMessage) {
        if message.position.is_none() {
            message.position = Some(Position {
                partition: 0,
                offset: self.next_offset,
            });
            self.next_offset += 1;
        }
        self.script.push_back(Ok(message));
    }

    /// Queue a receive fault.
    pub fn push_fault(&mut self, error: EventError) {
        self.script.push_back(Err(error));
    }

    /// Make every commit fail with `cause`.
    #[must_use]
    pub fn fail_commits(mut self, cause: impl Into<String>) -> Self {
        self.commit_failure = Some(cause.into());
        self
    }

    /// Share an existing commit log, e.g. across supervised sessions.
    #[must_use]
    pub fn with_commit_log(mut self, log: CommitLog) -> Self {
        self.committed = log;
        self
    }

    /// Handle to the commit log.
    pub fn commit_log(&self) -> CommitLog {
        Arc::clone(&self.committed)
    }

    /// Messages committed so far.
    pub fn committed(&self) -> Vec<InboundMessage> {
        self.committed.lock().expect("lock poisoned").clone()
    }

    /// Entries not yet received.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

#[async_trait]
impl MessageSource for MemorySource {
    async fn recv(&mut self) -> Result<InboundMessage, EventError> {
        self.script.pop_front().unwrap_or(Err(EventError::StreamClosed))
    }

    async fn commit(&mut self, message: &InboundMessage) -> Result<(), EventError> {
        if let Some(cause) = &self.commit_failure {
            let position = message.position.unwrap_or(Position {
                partition: -1,
                offset: -1,
            });
            return Err(EventError::CommitFailed {
                topic: message.topic.clone(),
                partition: position.partition,
                offset: position.offset,
                cause: cause.clone(),
            });
        }

        self.committed
            .lock()
            .expect("lock poisoned")
            .push(message.clone());
        Ok(())
    }
}

/// Hands out scripted sessions, one per `open`.
///
/// When no session is left, `open` fails with a connection error.
#[derive(Debug, Default)]
pub struct MemorySourceFactory {
    sessions: Mutex<VecDeque<MemorySource>>,
    opened: AtomicUsize,
}

impl MemorySourceFactory {
    pub fn new(sessions: impl IntoIterator<Item = MemorySource>) -> Self {
        Self {
            sessions: Mutex::new(sessions.into_iter().collect()),
            opened: AtomicUsize::new(0),
        }
    }

    /// Number of `open` calls, including failed ones.
    pub fn opens(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceFactory for MemorySourceFactory {
    type Source = MemorySource;

    async fn open(&self) -> Result<MemorySource, EventError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.sessions
            .lock()
            .expect("lock poisoned")
            .pop_front()
            .ok_or_else(|| EventError::ConnectionFailed {
                broker: "memory".to_string(),
                cause: "no session available".to_string(),
            })
    }
}

/// Publisher that records every message it accepts.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<OutboundMessage>>,
    failure: Mutex<Option<String>>,
}

impl RecordingPublisher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publisher that rejects every message with `cause`.
    pub fn failing(cause: impl Into<String>) -> Self {
        let publisher = Self::new();
        publisher.set_failure(Some(cause.into()));
        publisher
    }

    /// Start (`Some`) or stop (`None`) rejecting messages.
    pub fn set_failure(&self, cause: Option<String>) {
        *self.failure.lock().expect("lock poisoned") = cause;
    }

    /// All accepted messages, in publish order.
    pub fn published(&self) -> Vec<OutboundMessage> {
        self.published.lock().expect("lock poisoned").clone()
    }

    /// Accepted messages for one topic.
    pub fn published_to(&self, topic: &str) -> Vec<OutboundMessage> {
        self.published()
            .into_iter()
            .filter(|m| m.topic == topic)
            .collect()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, message: OutboundMessage) -> Result<Acknowledgement, EventError> {
        if let Some(cause) = self.failure.lock().expect("lock poisoned").clone() {
            return Err(EventError::PublishFailed {
                topic: message.topic,
                cause,
            });
        }

        let mut published = self.published.lock().expect("lock poisoned");
        let offset = i64::try_from(published.len()).unwrap_or(i64::MAX);
        published.push(message);
        Ok(Acknowledgement {
            partition: 0,
            offset,
        })
    }
}
