//! Received message status information.
//!
//! This module provides the [`Status`] struct returned alongside every
//! payload delivered by [`Communicator::recv`](crate::Communicator::recv).

/// Metadata about a received message.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use torus_exchange::{Communicator, LocalUniverse};
///
/// let mut comms = LocalUniverse::new(1).communicators();
/// let comm = comms.remove(0);
///
/// comm.send(0, 7, Bytes::from_static(b"ping")).unwrap();
/// let (payload, status) = comm.recv(0, 7).unwrap();
/// assert_eq!(&payload[..], b"ping");
/// assert_eq!((status.source, status.tag, status.len), (0, 7, 4));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    /// Source rank of the message.
    pub source: usize,
    /// Tag of the message.
    pub tag: u32,
    /// Payload length in bytes.
    pub len: usize,
}
