//! One round of the torus neighbor exchange.
//!
//! Every participant runs the same protocol:
//!
//! 1. **Barrier**: nobody starts sending until everyone has computed its
//!    topology and prepared its send buffer.
//! 2. **Exchange**: post a nonblocking send of the full input to each of the
//!    four neighbors, then receive one chunk from each neighbor in the order
//!    left, right, up, down, then wait for the sends to complete.
//! 3. **Capacity check**: the caller's output must have room for all four
//!    chunks.
//! 4. **Barrier**: nobody reports success while a peer may still be
//!    transferring.
//! 5. **Copy-out**: the four chunks, concatenated in that order, are copied
//!    into the caller's output. Nothing is written before this point, so a
//!    failure in any earlier step leaves the output as the caller gave it.
//!
//! # Why every send is posted before any receive
//!
//! Each process sends to and receives from the same four neighbors at the
//! same time. With a transport that does not buffer, a blocking
//! "send, then receive" per neighbor deadlocks as soon as two adjacent
//! processes both sit in `send` waiting for the other to post its receive.
//! An even/odd rank rule does not rescue it either: on a torus with an odd
//! side length, ranks `0` and `side - 1` are adjacent across the wrap and can
//! share a parity. Posting all sends first lets them progress independently
//! of this process's receives, so every receive finds its matching send
//! already posted. On a 1x1 torus the four sends go to the caller itself and
//! are picked up by its own receives.
//!
//! Sends travel on the tag of the direction they leave in. The message this
//! process wants from its left neighbor is the one that neighbor sent to
//! *its* right, so receives use the tag of the opposite direction.

use crate::comm::Communicator;
use crate::error::{BufferError, BufferSide, Error, Result, TransportError};
use crate::request::SendRequest;
use crate::topology::{Direction, NEIGHBOR_COUNT, Neighbors, TorusTopology};
use bytes::Bytes;

/// Phase of an exchange round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    /// No round has started
    Idle,
    /// Waiting for every participant before communicating
    Barrier1,
    /// Sending to and receiving from neighbors
    Exchanging,
    /// Waiting for every participant before copy-out
    Barrier2,
    /// Round completed and output written
    Done,
    /// Round aborted; output untouched
    Failed,
}

/// Summary of a completed round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeReport {
    /// Neighbors the chunks came from
    pub neighbors: Neighbors,
    /// Bytes per chunk
    pub chunk_len: usize,
    /// Bytes written to the output (`4 * chunk_len`)
    pub bytes_written: usize,
    /// Point-to-point messages posted by this process
    pub messages: usize,
}

/// Runs exchange rounds for one participant.
///
/// # Example
///
/// ```
/// use torus_exchange::{LocalUniverse, RoundState, TopologyExchange};
///
/// let outputs = LocalUniverse::new(4).run(|comm| {
///     let mut exchange = TopologyExchange::new(&comm).unwrap();
///     let input = [exchange.topology().rank() as u8; 2];
///     let mut output = [0u8; 8];
///     exchange.run(&input, &mut output).unwrap();
///     assert_eq!(exchange.state(), RoundState::Done);
///     output
/// });
///
/// // On a 2x2 torus rank 0 has rank 1 on both sides and rank 2 above and below
/// assert_eq!(outputs[0], [1, 1, 1, 1, 2, 2, 2, 2]);
/// ```
#[derive(Debug)]
pub struct TopologyExchange<'c, C: Communicator> {
    comm: &'c C,
    topology: TorusTopology,
    state: RoundState,
}

impl<'c, C: Communicator> TopologyExchange<'c, C> {
    /// Prepare an exchange on `comm`.
    ///
    /// Fails if the communicator size is not a perfect square.
    pub fn new(comm: &'c C) -> Result<Self> {
        let topology = TorusTopology::new(comm.rank(), comm.size())?;
        Ok(TopologyExchange {
            comm,
            topology,
            state: RoundState::Idle,
        })
    }

    /// Position of this participant.
    pub fn topology(&self) -> &TorusTopology {
        &self.topology
    }

    /// Current phase.
    pub fn state(&self) -> RoundState {
        self.state
    }

    /// Return to [`RoundState::Idle`] after a failed round.
    pub fn reset(&mut self) {
        self.state = RoundState::Idle;
    }

    /// Run one round, sending `input` to all four neighbors and writing the
    /// four received chunks into the front of `output`.
    ///
    /// `output` is written only when the whole round succeeds; on any error
    /// it is left exactly as it was.
    pub fn run(&mut self, input: &[u8], output: &mut [u8]) -> Result<ExchangeReport> {
        if !matches!(self.state, RoundState::Idle | RoundState::Done) {
            return Err(Error::RoundFailed);
        }
        if input.is_empty() {
            self.state = RoundState::Failed;
            return Err(BufferError::Empty {
                side: BufferSide::Input,
                index: 0,
            }
            .into());
        }

        let rank = self.topology.rank();
        let neighbors = self.topology.neighbors();
        tracing::debug!(
            rank,
            size = self.topology.size(),
            chunk_len = input.len(),
            ?neighbors,
            "starting exchange round"
        );

        self.state = RoundState::Barrier1;
        self.comm.barrier().map_err(|e| self.fail(Error::Barrier(e)))?;

        self.state = RoundState::Exchanging;
        let (combined, messages) = self
            .exchange_chunks(&neighbors, input)
            .map_err(|e| self.fail(e))?;

        let required = combined.len();
        let capacity = output.len();
        if capacity < required {
            return Err(self.fail(Error::Capacity { required, capacity }));
        }

        self.state = RoundState::Barrier2;
        self.comm.barrier().map_err(|e| self.fail(Error::Barrier(e)))?;

        output[..required].copy_from_slice(&combined);
        self.state = RoundState::Done;
        tracing::debug!(rank, bytes = required, "exchange round complete");
        Ok(ExchangeReport {
            neighbors,
            chunk_len: input.len(),
            bytes_written: required,
            messages,
        })
    }

    /// Send to and receive from every neighbor, returning the concatenated
    /// chunks in exchange order and the number of messages posted.
    fn exchange_chunks(&self, neighbors: &Neighbors, input: &[u8]) -> Result<(Vec<u8>, usize)> {
        let chunk_len = input.len();
        let payload = Bytes::copy_from_slice(input);

        let mut pending: Vec<(Direction, usize, SendRequest)> = Vec::with_capacity(NEIGHBOR_COUNT);
        for (direction, peer) in neighbors.iter() {
            let request = self
                .comm
                .isend(peer, direction.tag(), payload.clone())
                .map_err(|source| transport(peer, direction, source))?;
            pending.push((direction, peer, request));
        }

        let mut combined = Vec::with_capacity(chunk_len * NEIGHBOR_COUNT);
        for (direction, peer) in neighbors.iter() {
            let (chunk, _status) = self
                .comm
                .recv(peer, direction.opposite().tag())
                .map_err(|source| transport(peer, direction, source))?;
            if chunk.len() != chunk_len {
                return Err(transport(
                    peer,
                    direction,
                    TransportError::LengthMismatch {
                        expected: chunk_len,
                        actual: chunk.len(),
                    },
                ));
            }
            combined.extend_from_slice(&chunk);
        }

        let messages = pending.len() + combined.len() / chunk_len;
        for (direction, peer, request) in pending {
            request
                .wait()
                .map_err(|source| transport(peer, direction, source))?;
        }
        Ok((combined, messages))
    }

    fn fail(&mut self, error: Error) -> Error {
        tracing::warn!(
            rank = self.topology.rank(),
            state = ?self.state,
            %error,
            "exchange round failed"
        );
        self.state = RoundState::Failed;
        error
    }
}

fn transport(peer: usize, direction: Direction, source: TransportError) -> Error {
    Error::Transport {
        peer,
        direction,
        source,
    }
}
