//! In-process transport: one thread per participant.
//!
//! [`LocalUniverse`] wires `size` [`LocalComm`] endpoints together. Each
//! endpoint owns a mailbox; sending deposits a message into the destination's
//! mailbox, receiving blocks on the caller's own. All endpoints share one
//! barrier, which breaks for everyone once any endpoint is dropped.

use crate::comm::{Communicator, check_target};
use crate::config::ExchangeConfig;
use crate::error::TransportError;
use crate::mailbox::{Envelope, Mailbox};
use crate::request::SendRequest;
use crate::status::Status;
use bytes::Bytes;
use crossbeam_channel::bounded;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread;

/// When a local send counts as complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendMode {
    /// Complete as soon as the message is queued at the destination
    #[default]
    Buffered,
    /// Complete only once the destination has received the message.
    ///
    /// Models a transport without buffering: a blocking send cannot return
    /// before the matching receive is posted.
    Synchronous,
}

/// Builder for a set of connected in-process endpoints.
///
/// # Example
///
/// ```
/// use torus_exchange::{Communicator, LocalUniverse, SendMode};
///
/// let ranks = LocalUniverse::new(4)
///     .send_mode(SendMode::Synchronous)
///     .run(|comm| comm.rank());
/// assert_eq!(ranks, vec![0, 1, 2, 3]);
/// ```
#[derive(Debug, Clone)]
pub struct LocalUniverse {
    size: usize,
    mode: SendMode,
    max_message_len: Option<usize>,
}

impl LocalUniverse {
    /// A universe of `size` participants with buffered sends and no size limit.
    pub fn new(size: usize) -> Self {
        LocalUniverse {
            size,
            mode: SendMode::Buffered,
            max_message_len: None,
        }
    }

    /// A universe of `config.size()` participants with the configured send
    /// mode and message limit.
    pub fn from_config(config: &ExchangeConfig) -> Self {
        LocalUniverse {
            size: config.size(),
            mode: config.send_mode,
            max_message_len: config.max_message_len,
        }
    }

    /// Choose when sends complete.
    pub fn send_mode(mut self, mode: SendMode) -> Self {
        self.mode = mode;
        self
    }

    /// Reject payloads longer than `limit` bytes.
    pub fn max_message_len(mut self, limit: usize) -> Self {
        self.max_message_len = Some(limit);
        self
    }

    /// Number of participants.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Create the endpoints, indexed by rank.
    pub fn communicators(self) -> Vec<LocalComm> {
        let shared = Arc::new(Shared {
            mailboxes: (0..self.size).map(|_| Mailbox::new()).collect(),
            barrier: LocalBarrier::new(self.size.max(1)),
            mode: self.mode,
            max_message_len: self.max_message_len,
        });
        (0..self.size)
            .map(|rank| LocalComm {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    /// Run `f` once per rank, each on its own thread, and collect the results
    /// in rank order.
    ///
    /// A panic on any rank is propagated to the caller.
    pub fn run<F, T>(self, f: F) -> Vec<T>
    where
        F: Fn(LocalComm) -> T + Sync,
        T: Send,
    {
        let comms = self.communicators();
        let f = &f;
        thread::scope(|scope| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| scope.spawn(move || f(comm)))
                .collect();
            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(value) => value,
                    Err(payload) => std::panic::resume_unwind(payload),
                })
                .collect()
        })
    }
}

#[derive(Debug)]
struct Shared {
    mailboxes: Vec<Mailbox>,
    barrier: LocalBarrier,
    mode: SendMode,
    max_message_len: Option<usize>,
}

#[derive(Debug, Default)]
struct BarrierState {
    arrived: usize,
    generation: u64,
    broken: bool,
}

/// Reusable barrier that fails once a participant has left.
#[derive(Debug)]
struct LocalBarrier {
    parties: usize,
    state: Mutex<BarrierState>,
    released: Condvar,
}

impl LocalBarrier {
    fn new(parties: usize) -> Self {
        LocalBarrier {
            parties,
            state: Mutex::new(BarrierState::default()),
            released: Condvar::new(),
        }
    }

    fn wait(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.broken {
            return Err(TransportError::Disconnected);
        }
        state.arrived += 1;
        if state.arrived == self.parties {
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            self.released.notify_all();
            return Ok(());
        }
        // A release wins over a later break
        let generation = state.generation;
        while state.generation == generation {
            if state.broken {
                return Err(TransportError::Disconnected);
            }
            self.released.wait(&mut state);
        }
        Ok(())
    }

    fn leave(&self) {
        let mut state = self.state.lock();
        state.broken = true;
        self.released.notify_all();
    }
}

/// One participant's endpoint in a [`LocalUniverse`].
///
/// Dropping an endpoint disconnects it: queued messages are discarded, sends
/// to it fail, peers blocked receiving from it are released with
/// [`TransportError::Disconnected`], and so is every barrier that cannot
/// complete without it.
#[derive(Debug)]
pub struct LocalComm {
    rank: usize,
    shared: Arc<Shared>,
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.mailboxes.len()
    }

    fn barrier(&self) -> Result<(), TransportError> {
        self.shared.barrier.wait()
    }

    fn isend(&self, dest: usize, tag: u32, payload: Bytes) -> Result<SendRequest, TransportError> {
        check_target(dest, self.size(), tag)?;
        if let Some(limit) = self.shared.max_message_len {
            if payload.len() > limit {
                return Err(TransportError::MessageTooLarge {
                    len: payload.len(),
                    limit,
                });
            }
        }

        tracing::trace!(
            rank = self.rank,
            dest,
            tag,
            len = payload.len(),
            "local send"
        );
        let mailbox = &self.shared.mailboxes[dest];
        match self.shared.mode {
            SendMode::Buffered => {
                mailbox.deliver(self.rank, tag, Envelope::new(payload))?;
                Ok(SendRequest::complete())
            }
            SendMode::Synchronous => {
                let (ack_tx, ack_rx) = bounded(1);
                let envelope = Envelope {
                    payload,
                    ack: Some(ack_tx),
                };
                mailbox.deliver(self.rank, tag, envelope)?;
                Ok(SendRequest::pending(ack_rx))
            }
        }
    }

    fn recv(&self, source: usize, tag: u32) -> Result<(Bytes, Status), TransportError> {
        check_target(source, self.size(), tag)?;
        let payload = self.shared.mailboxes[self.rank].take(source, tag)?.open();
        tracing::trace!(
            rank = self.rank,
            source,
            tag,
            len = payload.len(),
            "local recv"
        );
        let status = Status {
            source,
            tag,
            len: payload.len(),
        };
        Ok((payload, status))
    }
}

impl Drop for LocalComm {
    fn drop(&mut self) {
        tracing::debug!(rank = self.rank, "local endpoint leaving");
        self.shared.barrier.leave();
        self.shared.mailboxes[self.rank].close();
        for (rank, mailbox) in self.shared.mailboxes.iter().enumerate() {
            if rank != self.rank {
                mailbox.disconnect(self.rank);
            }
        }
    }
}
