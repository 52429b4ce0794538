//! # torus-exchange
//!
//! Neighbor exchange on a 2-D toroidal process grid.
//!
//! A square number of cooperating processes is laid out on a wrap-around
//! grid. In one exchange round every process sends the same buffer to its
//! four grid neighbors, receives one equal-sized buffer from each of them,
//! and writes the four received buffers, in the order left, right, up,
//! down, into a caller-supplied output buffer.
//!
//! The crate provides:
//! - Rank-to-grid addressing with wrap-around neighbors ([`TorusTopology`], [`neighbors`])
//! - Admission checks for topology and buffers ([`validate`])
//! - The deadlock-free exchange round itself ([`TopologyExchange`])
//! - A harness-facing task with boolean lifecycle steps ([`TorusExchangeTask`])
//! - Transports behind the [`Communicator`] trait: in-process threads
//!   ([`LocalUniverse`]) and one process per rank over MPI (`MpiComm`, `mpi` feature)
//! - Run parameters from the environment ([`ExchangeConfig`])
//!
//! ## Quick Start
//!
//! ```
//! use torus_exchange::{LocalUniverse, TopologyExchange};
//!
//! fn main() -> Result<(), torus_exchange::Error> {
//!     // Nine participants on a 3x3 torus, one thread each
//!     let outputs = LocalUniverse::new(9).run(|comm| {
//!         let mut exchange = TopologyExchange::new(&comm)?;
//!         let rank = exchange.topology().rank();
//!
//!         let input = vec![rank as u8; 4];
//!         let mut output = vec![0u8; 16];
//!         exchange.run(&input, &mut output)?;
//!         Ok::<_, torus_exchange::Error>(output)
//!     });
//!
//!     // Rank 4 sits in the middle: left 3, right 5, up 1, down 7
//!     let center = outputs.into_iter().nth(4).unwrap()?;
//!     assert_eq!(center, [3, 3, 3, 3, 5, 5, 5, 5, 1, 1, 1, 1, 7, 7, 7, 7]);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description | Default |
//! |---------|-------------|---------|
//! | `mpi`   | Multi-process transport over MPI (needs an MPI library) | no |
//!
//! ## Failure model
//!
//! A round either writes the complete combined result or leaves the output
//! untouched. There is no retry and no timeout: a failed send, receive, or
//! barrier aborts the round, and a peer that never shows up blocks the round.
//! Callers decide whether to start a fresh round.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]

mod buffer;
mod comm;
mod config;
mod error;
mod exchange;
mod local;
mod mailbox;
#[cfg(feature = "mpi")]
mod mpi_comm;
mod request;
mod status;
mod task;
mod topology;
mod validate;

pub use buffer::{BufferContract, TaskData};
pub use comm::{Communicator, MAX_TAG};
pub use config::ExchangeConfig;
pub use error::{BufferError, BufferSide, ConfigError, Error, ErrorClass, Result, TransportError};
pub use exchange::{ExchangeReport, RoundState, TopologyExchange};
pub use local::{LocalComm, LocalUniverse, SendMode};
#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;
pub use request::SendRequest;
pub use status::Status;
pub use task::{OutputCheck, TorusExchangeTask, reject_all_zero};
pub use topology::{
    Direction, NEIGHBOR_COUNT, Neighbors, TorusTopology, grid_side, isqrt, neighbors,
};
pub use validate::{is_valid, validate, validate_buffers};
