//! Request handles for nonblocking sends.

use crate::error::TransportError;
#[cfg(feature = "mpi")]
use crate::mpi_comm::PendingSend;
use crossbeam_channel::{Receiver, TryRecvError};

/// A handle to an in-flight send.
///
/// Returned by [`Communicator::isend`](crate::Communicator::isend). A send on
/// a buffered transport is complete as soon as it is posted; on a synchronous
/// (rendezvous) transport it completes only after the destination has
/// received the message. An MPI send completes once MPI no longer needs the
/// payload, and dropping an incomplete MPI request waits for it. The exchange
/// posts all of its sends before it blocks on any receive, so no kind of send
/// can hold a round hostage.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use torus_exchange::{Communicator, LocalUniverse, SendMode};
///
/// let mut comms = LocalUniverse::new(1)
///     .send_mode(SendMode::Synchronous)
///     .communicators();
/// let comm = comms.remove(0);
///
/// let mut request = comm.isend(0, 1, Bytes::from_static(b"x")).unwrap();
/// // Nobody has received it yet
/// assert!(!request.test().unwrap());
///
/// comm.recv(0, 1).unwrap();
/// request.wait().unwrap();
/// ```
#[derive(Debug)]
pub struct SendRequest {
    pending: Pending,
}

#[derive(Debug)]
enum Pending {
    Done,
    Ack(Receiver<()>),
    #[cfg(feature = "mpi")]
    Mpi(PendingSend),
}

impl SendRequest {
    /// A request that is already complete.
    pub(crate) fn complete() -> Self {
        SendRequest {
            pending: Pending::Done,
        }
    }

    /// A request that completes when the receiver acknowledges.
    pub(crate) fn pending(ack: Receiver<()>) -> Self {
        SendRequest {
            pending: Pending::Ack(ack),
        }
    }

    /// A request backed by an in-flight MPI send.
    #[cfg(feature = "mpi")]
    pub(crate) fn mpi(send: PendingSend) -> Self {
        SendRequest {
            pending: Pending::Mpi(send),
        }
    }

    /// Check if this request has been completed.
    pub fn is_completed(&self) -> bool {
        matches!(self.pending, Pending::Done)
    }

    /// Wait for this send to complete.
    ///
    /// Fails with [`TransportError::Disconnected`] if the destination went
    /// away without receiving the message.
    pub fn wait(self) -> Result<(), TransportError> {
        match self.pending {
            Pending::Done => Ok(()),
            Pending::Ack(ack) => ack.recv().map_err(|_| TransportError::Disconnected),
            #[cfg(feature = "mpi")]
            Pending::Mpi(send) => {
                send.wait();
                Ok(())
            }
        }
    }

    /// Test if this send has completed without blocking.
    pub fn test(&mut self) -> Result<bool, TransportError> {
        let done = match &mut self.pending {
            Pending::Done => return Ok(true),
            Pending::Ack(ack) => match ack.try_recv() {
                Ok(()) => true,
                Err(TryRecvError::Empty) => false,
                Err(TryRecvError::Disconnected) => return Err(TransportError::Disconnected),
            },
            #[cfg(feature = "mpi")]
            Pending::Mpi(send) => send.test(),
        };
        if done {
            self.pending = Pending::Done;
        }
        Ok(done)
    }

    /// Wait for all requests, returning the first failure.
    ///
    /// Every request is waited on even after a failure.
    pub fn wait_all(requests: Vec<SendRequest>) -> Result<(), TransportError> {
        let mut first_err = None;
        for request in requests {
            if let Err(e) = request.wait() {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
