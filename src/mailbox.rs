//! Per-rank inbound message queues, matched by `(source, tag)`.

use crate::error::TransportError;
use bytes::Bytes;
use crossbeam_channel::Sender;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet, VecDeque};

/// A message waiting to be received.
#[derive(Debug)]
pub(crate) struct Envelope {
    pub(crate) payload: Bytes,
    /// Signalled once the message is received (synchronous sends only)
    pub(crate) ack: Option<Sender<()>>,
}

impl Envelope {
    pub(crate) fn new(payload: Bytes) -> Self {
        Envelope { payload, ack: None }
    }

    /// Consume the envelope, acknowledging the sender if it is waiting.
    pub(crate) fn open(self) -> Bytes {
        if let Some(ack) = self.ack {
            // Sender may have dropped its request; nothing to do then
            let _ = ack.send(());
        }
        self.payload
    }
}

#[derive(Debug, Default)]
struct State {
    queues: HashMap<(usize, u32), VecDeque<Envelope>>,
    disconnected: HashSet<usize>,
    closed: bool,
}

/// Inbound queues for one rank.
#[derive(Debug, Default)]
pub(crate) struct Mailbox {
    state: Mutex<State>,
    ready: Condvar,
}

impl Mailbox {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue a message from `source`.
    pub(crate) fn deliver(
        &self,
        source: usize,
        tag: u32,
        envelope: Envelope,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TransportError::Disconnected);
        }
        state
            .queues
            .entry((source, tag))
            .or_default()
            .push_back(envelope);
        self.ready.notify_all();
        Ok(())
    }

    /// Block until a message from `source` with `tag` is available.
    ///
    /// Messages already queued are still handed out after the source
    /// disconnects.
    pub(crate) fn take(&self, source: usize, tag: u32) -> Result<Envelope, TransportError> {
        let mut state = self.state.lock();
        loop {
            if let Some(envelope) = state
                .queues
                .get_mut(&(source, tag))
                .and_then(VecDeque::pop_front)
            {
                return Ok(envelope);
            }
            if state.closed {
                return Err(TransportError::Closed);
            }
            if state.disconnected.contains(&source) {
                return Err(TransportError::Disconnected);
            }
            self.ready.wait(&mut state);
        }
    }

    /// Mark `source` as gone, waking any receiver blocked on it.
    pub(crate) fn disconnect(&self, source: usize) {
        let mut state = self.state.lock();
        state.disconnected.insert(source);
        self.ready.notify_all();
    }

    /// Shut the mailbox down, dropping queued messages.
    ///
    /// Dropping the envelopes releases any synchronous sender waiting on them.
    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.queues.clear();
        self.ready.notify_all();
    }
}
