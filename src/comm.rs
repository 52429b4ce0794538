//! The communicator abstraction the exchange runs on.
//!
//! A [`Communicator`] is the explicit context object for one participant: it
//! knows its own rank, the number of participants, and how to reach each of
//! them. It is constructed once by the harness and passed by reference into
//! every operation that needs it.

use crate::error::TransportError;
use crate::request::SendRequest;
use crate::status::Status;
use bytes::Bytes;

/// Largest tag accepted by every transport.
///
/// MPI only guarantees tags up to 32767 (`MPI_TAG_UB`), so the in-process
/// transport enforces the same bound.
pub const MAX_TAG: u32 = 32767;

/// Point-to-point and collective primitives for one participant.
///
/// Messages between a given `(source, tag)` pair are delivered in the order
/// they were sent. Every primitive reports failure as a [`TransportError`].
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use torus_exchange::{Communicator, LocalUniverse};
///
/// let replies = LocalUniverse::new(4).run(|comm| {
///     let next = (comm.rank() + 1) % comm.size();
///     let prev = (comm.rank() + comm.size() - 1) % comm.size();
///
///     let request = comm.isend(next, 0, Bytes::from(vec![comm.rank() as u8])).unwrap();
///     let (payload, _) = comm.recv(prev, 0).unwrap();
///     request.wait().unwrap();
///     payload[0]
/// });
/// assert_eq!(replies, vec![3, 0, 1, 2]);
/// ```
pub trait Communicator {
    /// Get the rank of the calling participant.
    fn rank(&self) -> usize;

    /// Get the number of participants.
    fn size(&self) -> usize;

    /// Barrier synchronization.
    ///
    /// No participant returns until every participant has entered the barrier.
    fn barrier(&self) -> Result<(), TransportError>;

    /// Start sending `payload` to `dest`.
    ///
    /// Returns immediately; the returned request tracks completion.
    fn isend(&self, dest: usize, tag: u32, payload: Bytes) -> Result<SendRequest, TransportError>;

    /// Receive the next message from `source` carrying `tag`.
    ///
    /// Blocks until a matching message arrives or the source disconnects.
    fn recv(&self, source: usize, tag: u32) -> Result<(Bytes, Status), TransportError>;

    /// Blocking send.
    ///
    /// On a synchronous transport this does not return until the destination
    /// receives the message, so two peers calling `send` on each other
    /// before `recv` will deadlock. Use [`isend`](Self::isend) when the
    /// peer may be sending to the caller at the same time.
    fn send(&self, dest: usize, tag: u32, payload: Bytes) -> Result<(), TransportError> {
        self.isend(dest, tag, payload)?.wait()
    }
}

/// Reject peers outside `[0, size)` and tags above [`MAX_TAG`].
pub(crate) fn check_target(peer: usize, size: usize, tag: u32) -> Result<(), TransportError> {
    if peer >= size {
        return Err(TransportError::InvalidPeer { peer, size });
    }
    if tag > MAX_TAG {
        return Err(TransportError::InvalidTag(tag));
    }
    Ok(())
}
