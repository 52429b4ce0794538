//! Error types for torus-exchange

use crate::topology::Direction;
use thiserror::Error;

/// Result type for exchange operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for topology, buffer, and exchange operations
#[derive(Error, Debug)]
pub enum Error {
    /// Process count does not form a square torus
    #[error("process count {0} is not a positive perfect square")]
    Topology(usize),

    /// Rank outside `[0, size)`
    #[error("invalid rank {rank} for a topology of {size} processes")]
    InvalidRank {
        /// Offending rank
        rank: usize,
        /// Number of processes in the topology
        size: usize,
    },

    /// Malformed input or output buffers
    #[error("invalid buffer: {0}")]
    Buffer(#[from] BufferError),

    /// Combined result does not fit the caller's output buffer
    #[error("combined result of {required} bytes exceeds output capacity of {capacity} bytes")]
    Capacity {
        /// Bytes the combined result needs (`4 * n`)
        required: usize,
        /// Bytes the caller provided
        capacity: usize,
    },

    /// Point-to-point communication with one neighbor failed
    #[error("communication with {direction} neighbor (rank {peer}) failed: {source}")]
    Transport {
        /// Neighbor rank
        peer: usize,
        /// Which neighbor slot the peer occupies
        direction: Direction,
        /// Underlying transport failure
        #[source]
        source: TransportError,
    },

    /// A collective barrier failed
    #[error("barrier failed: {0}")]
    Barrier(#[source] TransportError),

    /// A previous round failed and the exchange was not reset
    #[error("previous round failed; reset the exchange before starting a new round")]
    RoundFailed,

    /// Run configuration could not be resolved
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// MPI could not be initialized, or was initialized already
    #[error("MPI initialization failed")]
    Init,
}

/// Broad categories of [`Error`], one per failure domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Process count is not a perfect square, or a rank is out of range
    Topology,
    /// Missing, empty, or mismatched buffers
    Buffer,
    /// Output buffer too small for the combined result
    Capacity,
    /// Send, receive, barrier, or transport start-up failure
    Transport,
    /// API misuse, such as running a failed round again
    Usage,
    /// Run configuration problems
    Config,
}

impl Error {
    /// Classify this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Topology(_) | Error::InvalidRank { .. } => ErrorClass::Topology,
            Error::Buffer(_) => ErrorClass::Buffer,
            Error::Capacity { .. } => ErrorClass::Capacity,
            Error::Transport { .. } | Error::Barrier(_) | Error::Init => ErrorClass::Transport,
            Error::RoundFailed => ErrorClass::Usage,
            Error::Config(_) => ErrorClass::Config,
        }
    }
}

/// Which buffer list a [`BufferError`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferSide {
    /// Buffers sent to the neighbors
    Input,
    /// Buffers receiving the combined result
    Output,
}

impl std::fmt::Display for BufferSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BufferSide::Input => "input",
            BufferSide::Output => "output",
        })
    }
}

/// Buffer well-formedness failures, caught before any communication.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// No input buffers were provided
    #[error("no input buffers")]
    NoInputs,

    /// No output buffers were provided
    #[error("no output buffers")]
    NoOutputs,

    /// Buffer list and count list disagree in length
    #[error("{buffers} {side} buffers but {counts} declared counts")]
    CountListMismatch {
        /// Which list the buffer belongs to
        side: BufferSide,
        /// Number of buffers
        buffers: usize,
        /// Number of declared counts
        counts: usize,
    },

    /// A buffer entry is absent
    #[error("{side} buffer {index} is missing")]
    Missing {
        /// Which list the buffer belongs to
        side: BufferSide,
        /// Position in the list
        index: usize,
    },

    /// A buffer has a declared length of zero
    #[error("{side} buffer {index} has zero length")]
    Empty {
        /// Which list the buffer belongs to
        side: BufferSide,
        /// Position in the list
        index: usize,
    },

    /// Declared length is larger than the memory behind it
    #[error("{side} buffer {index} declares {declared} bytes but holds {actual}")]
    DeclaredLengthExceedsBuffer {
        /// Which list the buffer belongs to
        side: BufferSide,
        /// Position in the list
        index: usize,
        /// Declared length
        declared: usize,
        /// Actual slice length
        actual: usize,
    },

    /// Per-process chunk size differs between input and output
    #[error("input chunk length {input} does not match output chunk length {output}")]
    ChunkLengthMismatch {
        /// `inputs_count[0]`
        input: usize,
        /// `outputs_count[0]`
        output: usize,
    },
}

/// Failures reported by point-to-point and collective primitives.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The peer endpoint is gone
    #[error("peer disconnected")]
    Disconnected,

    /// The local endpoint has been shut down
    #[error("local endpoint closed")]
    Closed,

    /// Peer rank outside the communicator
    #[error("invalid peer rank {peer} for communicator of size {size}")]
    InvalidPeer {
        /// Requested peer
        peer: usize,
        /// Communicator size
        size: usize,
    },

    /// Tag above [`MAX_TAG`](crate::MAX_TAG)
    #[error("tag {0} is out of range")]
    InvalidTag(u32),

    /// Payload exceeds the transport's message limit
    #[error("message of {len} bytes exceeds limit of {limit} bytes")]
    MessageTooLarge {
        /// Payload length
        len: usize,
        /// Configured limit
        limit: usize,
    },

    /// Received payload has an unexpected length
    #[error("expected {expected} bytes, received {actual}")]
    LengthMismatch {
        /// Expected length
        expected: usize,
        /// Received length
        actual: usize,
    },
}

/// Run configuration failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable is set but does not parse
    #[error("invalid value {value:?} for {key}")]
    Invalid {
        /// Variable name
        key: &'static str,
        /// Raw value
        value: String,
    },

    /// A setting that must be positive is zero
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}
