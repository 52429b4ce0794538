//! Multi-process transport over MPI.
//!
//! One OS process per rank, started by `mpiexec` or `srun`. Rank and size
//! are those of `MPI_COMM_WORLD`; nothing is read from the environment.
//!
//! MPI's default error handler aborts the whole job on a communication
//! failure, so the errors this backend returns are the argument checks made
//! before calling into MPI: peer and tag range, and the optional message
//! limit.

use crate::comm::{Communicator, check_target};
use crate::error::{Error, Result, TransportError};
use crate::request::SendRequest;
use crate::status::Status;
use bytes::Bytes;
use mpi::environment::Universe;
use mpi::request::{Request, StaticScope};
use mpi::topology::SimpleCommunicator;
use mpi::traits::{Communicator as _, CommunicatorCollectives as _, Destination as _, Source as _};
use std::fmt;

/// An endpoint on `MPI_COMM_WORLD`.
///
/// Owns the MPI environment: MPI is finalized when this is dropped, so
/// complete every [`SendRequest`] it returned before dropping it.
///
/// # Example
///
/// ```no_run
/// use torus_exchange::{MpiComm, TopologyExchange};
///
/// fn main() -> Result<(), torus_exchange::Error> {
///     let comm = MpiComm::init()?;
///     let mut exchange = TopologyExchange::new(&comm)?;
///
///     let input = [exchange.topology().rank() as u8; 64];
///     let mut output = [0u8; 256];
///     exchange.run(&input, &mut output)?;
///     Ok(())
/// }
/// ```
pub struct MpiComm {
    world: SimpleCommunicator,
    max_message_len: Option<usize>,
    // Dropped last: finalizes MPI
    _universe: Universe,
}

impl MpiComm {
    /// Initialize MPI and wrap the world communicator.
    ///
    /// Fails with [`Error::Init`] if MPI was already initialized in this
    /// process.
    pub fn init() -> Result<Self> {
        let universe = mpi::initialize().ok_or(Error::Init)?;
        let world = universe.world();
        tracing::debug!(
            rank = world.rank(),
            size = world.size(),
            "MPI initialized"
        );
        Ok(MpiComm {
            world,
            max_message_len: None,
            _universe: universe,
        })
    }

    /// Reject payloads longer than `limit` bytes before handing them to MPI.
    pub fn max_message_len(mut self, limit: usize) -> Self {
        self.max_message_len = Some(limit);
        self
    }

    /// Name of the processor this rank runs on.
    pub fn processor_name(&self) -> Option<String> {
        mpi::environment::processor_name().ok()
    }

    fn check_len(&self, len: usize) -> std::result::Result<(), TransportError> {
        match self.max_message_len {
            Some(limit) if len > limit => Err(TransportError::MessageTooLarge { len, limit }),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for MpiComm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MpiComm")
            .field("rank", &self.world.rank())
            .field("size", &self.world.size())
            .field("max_message_len", &self.max_message_len)
            .finish()
    }
}

impl Communicator for MpiComm {
    fn rank(&self) -> usize {
        self.world.rank() as usize
    }

    fn size(&self) -> usize {
        self.world.size() as usize
    }

    fn barrier(&self) -> std::result::Result<(), TransportError> {
        self.world.barrier();
        Ok(())
    }

    fn isend(
        &self,
        dest: usize,
        tag: u32,
        payload: Bytes,
    ) -> std::result::Result<SendRequest, TransportError> {
        check_target(dest, self.size(), tag)?;
        self.check_len(payload.len())?;

        tracing::trace!(
            rank = self.world.rank(),
            dest,
            tag,
            len = payload.len(),
            "mpi send"
        );
        let buffer: &'static [u8] = Box::leak(payload.to_vec().into_boxed_slice());
        let request = self
            .world
            .process_at_rank(dest as i32)
            .immediate_send_with_tag(StaticScope, buffer, tag as i32);
        Ok(SendRequest::mpi(PendingSend {
            request: Some(request),
            buffer: std::ptr::from_ref(buffer),
        }))
    }

    fn recv(
        &self,
        source: usize,
        tag: u32,
    ) -> std::result::Result<(Bytes, Status), TransportError> {
        check_target(source, self.size(), tag)?;
        let (payload, status) = self
            .world
            .process_at_rank(source as i32)
            .receive_vec_with_tag::<u8>(tag as i32);
        tracing::trace!(
            rank = self.world.rank(),
            source,
            tag,
            len = payload.len(),
            "mpi recv"
        );
        let status = Status {
            source: status.source_rank() as usize,
            tag: status.tag() as u32,
            len: payload.len(),
        };
        Ok((Bytes::from(payload), status))
    }
}

/// An in-flight `MPI_Isend` and the copy of the payload it reads from.
///
/// The copy is leaked when the send is posted and reclaimed once the send
/// has completed.
pub(crate) struct PendingSend {
    request: Option<Request<'static, [u8], StaticScope>>,
    buffer: *const [u8],
}

impl PendingSend {
    pub(crate) fn wait(mut self) {
        if let Some(request) = self.request.take() {
            request.wait();
        }
    }

    pub(crate) fn test(&mut self) -> bool {
        let Some(request) = self.request.take() else {
            return true;
        };
        match request.test() {
            Ok(_) => true,
            Err(request) => {
                self.request = Some(request);
                false
            }
        }
    }
}

impl fmt::Debug for PendingSend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingSend")
            .field("len", &self.buffer.len())
            .field("completed", &self.request.is_none())
            .finish()
    }
}

impl Drop for PendingSend {
    fn drop(&mut self) {
        if let Some(request) = self.request.take() {
            request.wait();
        }
        // SAFETY: `buffer` was leaked from a `Box<[u8]>` in `isend`, and the
        // only other reader, the MPI request, has completed.
        drop(unsafe { Box::from_raw(self.buffer.cast_mut()) });
    }
}
