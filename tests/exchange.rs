//! Multi-rank exchange rounds on in-process transports.
//!
//! Each test runs one thread per rank through `LocalUniverse::run`, the same
//! way a launcher would start one process per rank.

use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use torus_exchange::{
    Communicator, Direction, Error, ErrorClass, LocalComm, LocalUniverse, RoundState, SendMode,
    SendRequest, Status, TaskData, TopologyExchange, TorusExchangeTask, TransportError, neighbors,
};

const SENTINEL: u8 = 0xA5;

/// Payload that identifies its sender: every byte is the rank, except the
/// last which encodes the chunk length so truncation is caught too.
fn payload_for(rank: usize, len: usize) -> Vec<u8> {
    let mut payload = vec![rank as u8; len];
    if let Some(last) = payload.last_mut() {
        *last = (rank as u8).wrapping_mul(31).wrapping_add(len as u8);
    }
    payload
}

fn expected_output(rank: usize, size: usize, len: usize) -> Vec<u8> {
    let n = neighbors(rank, size).unwrap();
    [n.left, n.right, n.up, n.down]
        .into_iter()
        .flat_map(|peer| payload_for(peer, len))
        .collect()
}

#[test]
fn every_rank_receives_neighbors_in_order() {
    for side in 1..=3 {
        let size = side * side;
        for mode in [SendMode::Buffered, SendMode::Synchronous] {
            for len in [1, 7, 64] {
                let outputs = LocalUniverse::new(size).send_mode(mode).run(|comm| {
                    let mut exchange = TopologyExchange::new(&comm).unwrap();
                    let input = payload_for(comm.rank(), len);
                    let mut output = vec![SENTINEL; 4 * len];
                    let report = exchange.run(&input, &mut output).unwrap();
                    assert_eq!(report.bytes_written, 4 * len);
                    output
                });

                for (rank, output) in outputs.iter().enumerate() {
                    assert_eq!(
                        output,
                        &expected_output(rank, size, len),
                        "rank {rank}, {side}x{side}, {mode:?}, len {len}"
                    );
                }
            }
        }
    }
}

#[test]
fn message_count_does_not_grow_with_the_grid() {
    for side in 1..=3 {
        let reports = LocalUniverse::new(side * side)
            .send_mode(SendMode::Synchronous)
            .run(|comm| {
                let mut exchange = TopologyExchange::new(&comm).unwrap();
                let mut output = [0u8; 8];
                exchange.run(&[1, 2], &mut output).unwrap()
            });
        for report in reports {
            assert_eq!(report.messages, 8, "{side}x{side}");
        }
    }
}

#[test]
fn undersized_outputs_fail_and_stay_untouched() {
    let outputs = LocalUniverse::new(4).run(|comm| {
        let mut exchange = TopologyExchange::new(&comm).unwrap();
        let mut output = vec![SENTINEL; 4 * 3 - 1];
        let err = exchange.run(&[comm.rank() as u8; 3], &mut output).unwrap_err();
        assert!(matches!(
            err,
            Error::Capacity {
                required: 12,
                capacity: 11
            }
        ));
        assert_eq!(exchange.state(), RoundState::Failed);
        output
    });
    for output in outputs {
        assert!(output.iter().all(|&b| b == SENTINEL));
    }
}

#[test]
fn consecutive_rounds_reuse_the_communicator() {
    let outputs = LocalUniverse::new(9).run(|comm| {
        let mut exchange = TopologyExchange::new(&comm).unwrap();
        let mut last = Vec::new();
        for round in 0..3u8 {
            let input = [comm.rank() as u8 + round * 10; 2];
            let mut output = [0u8; 8];
            exchange.run(&input, &mut output).unwrap();
            last = output.to_vec();
        }
        last
    });
    // Rank 0 on 3x3: left 2, right 1, up 6, down 3; last round adds 20
    assert_eq!(outputs[0], [22, 22, 21, 21, 26, 26, 23, 23]);
}

#[test]
fn oversize_payload_fails_every_rank_without_writing() {
    let results = LocalUniverse::new(4).max_message_len(4).run(|comm| {
        let mut exchange = TopologyExchange::new(&comm).unwrap();
        let mut output = vec![SENTINEL; 32];
        let err = exchange.run(&[1u8; 8], &mut output).unwrap_err();
        (err, output)
    });
    for (err, output) in results {
        assert!(matches!(
            err,
            Error::Transport {
                direction: Direction::Left,
                source: TransportError::MessageTooLarge { len: 8, limit: 4 },
                ..
            }
        ));
        assert!(output.iter().all(|&b| b == SENTINEL));
    }
}

/// Wraps a communicator and fails the n-th send or receive.
struct Flaky<'a> {
    inner: &'a LocalComm,
    fail_at: usize,
    calls: AtomicUsize,
}

impl Flaky<'_> {
    fn tick(&self) -> Result<(), TransportError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == self.fail_at {
            Err(TransportError::Disconnected)
        } else {
            Ok(())
        }
    }
}

impl Communicator for Flaky<'_> {
    fn rank(&self) -> usize {
        self.inner.rank()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn barrier(&self) -> Result<(), TransportError> {
        self.inner.barrier()
    }

    fn isend(&self, dest: usize, tag: u32, payload: Bytes) -> Result<SendRequest, TransportError> {
        self.tick()?;
        self.inner.isend(dest, tag, payload)
    }

    fn recv(&self, source: usize, tag: u32) -> Result<(Bytes, Status), TransportError> {
        self.tick()?;
        self.inner.recv(source, tag)
    }
}

#[test]
fn failure_with_any_neighbor_aborts_the_round() {
    // Calls 0..4 are the sends, 4..8 the receives
    let expected = [
        Direction::Left,
        Direction::Right,
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
        Direction::Up,
        Direction::Down,
    ];
    for (fail_at, direction) in expected.into_iter().enumerate() {
        let mut comms = LocalUniverse::new(1).communicators();
        let comm = comms.pop().unwrap();
        let flaky = Flaky {
            inner: &comm,
            fail_at,
            calls: AtomicUsize::new(0),
        };
        let mut exchange = TopologyExchange::new(&flaky).unwrap();
        let mut output = [SENTINEL; 8];

        let err = exchange.run(&[1, 2], &mut output).unwrap_err();
        assert!(
            matches!(err, Error::Transport { peer: 0, direction: d, .. } if d == direction),
            "call {fail_at}: {err}"
        );
        assert_eq!(output, [SENTINEL; 8]);
        assert_eq!(exchange.state(), RoundState::Failed);
    }
}

/// Delivers a chunk one byte short from every neighbor.
struct Truncating<'a>(&'a LocalComm);

impl Communicator for Truncating<'_> {
    fn rank(&self) -> usize {
        self.0.rank()
    }

    fn size(&self) -> usize {
        self.0.size()
    }

    fn barrier(&self) -> Result<(), TransportError> {
        self.0.barrier()
    }

    fn isend(&self, dest: usize, tag: u32, payload: Bytes) -> Result<SendRequest, TransportError> {
        self.0.isend(dest, tag, payload.slice(1..))
    }

    fn recv(&self, source: usize, tag: u32) -> Result<(Bytes, Status), TransportError> {
        self.0.recv(source, tag)
    }
}

#[test]
fn short_chunk_is_a_transport_error() {
    let mut comms = LocalUniverse::new(1).communicators();
    let comm = comms.pop().unwrap();
    let truncating = Truncating(&comm);
    let mut exchange = TopologyExchange::new(&truncating).unwrap();

    let mut output = [SENTINEL; 12];
    let err = exchange.run(&[1, 2, 3], &mut output).unwrap_err();
    assert!(matches!(
        err,
        Error::Transport {
            source: TransportError::LengthMismatch {
                expected: 3,
                actual: 2
            },
            ..
        }
    ));
    assert_eq!(err.class(), ErrorClass::Transport);
    assert_eq!(output, [SENTINEL; 12]);
}

/// Local endpoint whose barrier fails from the n-th call on.
struct BrokenBarrier {
    inner: LocalComm,
    fail_from: usize,
    calls: AtomicUsize,
}

impl Communicator for BrokenBarrier {
    fn rank(&self) -> usize {
        self.inner.rank()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn barrier(&self) -> Result<(), TransportError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.fail_from {
            return Err(TransportError::Disconnected);
        }
        self.inner.barrier()
    }

    fn isend(&self, dest: usize, tag: u32, payload: Bytes) -> Result<SendRequest, TransportError> {
        self.inner.isend(dest, tag, payload)
    }

    fn recv(&self, source: usize, tag: u32) -> Result<(Bytes, Status), TransportError> {
        self.inner.recv(source, tag)
    }
}

#[test]
fn closing_barrier_failure_on_every_rank_writes_nothing() {
    // Each rank passes the opening barrier and completes its exchange, then
    // the closing barrier fails
    let results = LocalUniverse::new(9).run(|comm| {
        let comm = BrokenBarrier {
            inner: comm,
            fail_from: 1,
            calls: AtomicUsize::new(0),
        };
        let mut exchange = TopologyExchange::new(&comm).unwrap();
        let mut output = vec![SENTINEL; 12];
        let err = exchange.run(&[comm.rank() as u8; 3], &mut output).unwrap_err();
        (err, exchange.state(), output)
    });
    for (rank, (err, state, output)) in results.into_iter().enumerate() {
        assert!(
            matches!(err, Error::Barrier(TransportError::Disconnected)),
            "rank {rank}: {err}"
        );
        assert_eq!(state, RoundState::Failed);
        assert!(output.iter().all(|&b| b == SENTINEL), "rank {rank}");
    }
}

#[test]
fn departed_rank_fails_the_round_everywhere_else() {
    const GONE: usize = 4;
    let results = LocalUniverse::new(9).run(|comm| {
        if comm.rank() == GONE {
            // Join the opening barrier, then leave without exchanging
            comm.barrier().unwrap();
            drop(comm);
            return None;
        }
        let mut exchange = TopologyExchange::new(&comm).unwrap();
        let mut output = vec![SENTINEL; 8];
        let err = exchange.run(&[comm.rank() as u8; 2], &mut output).unwrap_err();
        Some((err, exchange.state(), output))
    });

    let gone_neighbors = neighbors(GONE, 9).unwrap();
    for (rank, result) in results.into_iter().enumerate() {
        let Some((err, state, output)) = result else {
            assert_eq!(rank, GONE);
            continue;
        };
        if gone_neighbors.iter().any(|(_, peer)| peer == rank) {
            // Never receives its chunk from the departed rank
            assert!(matches!(err, Error::Transport { .. }), "rank {rank}: {err}");
        }
        assert_eq!(err.class(), ErrorClass::Transport, "rank {rank}");
        assert_eq!(state, RoundState::Failed);
        assert!(output.iter().all(|&b| b == SENTINEL), "rank {rank}");
    }
}

#[test]
fn task_lifecycle_on_a_full_torus() {
    let results = LocalUniverse::new(16)
        .send_mode(SendMode::Synchronous)
        .run(|comm| {
            let input = payload_for(comm.rank(), 5);
            let mut output = vec![0u8; 20];
            let data = TaskData::new()
                .with_input(&input)
                .with_output(&mut output, 5);
            let mut task = TorusExchangeTask::new(&comm, data);
            let ok = task.validate() && task.run_exchange() && task.finalize();
            assert_eq!(task.state(), RoundState::Done);
            drop(task);
            (ok, output)
        });
    for (rank, (ok, output)) in results.into_iter().enumerate() {
        assert!(ok, "rank {rank}");
        assert_eq!(output, expected_output(rank, 16, 5), "rank {rank}");
    }
}

#[test]
fn task_rejects_non_square_world_before_communicating() {
    let results = LocalUniverse::new(5).run(|comm| {
        let input = [1u8; 2];
        let mut output = [0u8; 8];
        let data = TaskData::new().with_input(&input).with_output(&mut output, 2);
        let mut task = TorusExchangeTask::new(&comm, data);
        let validated = task.validate();
        let class = task.last_error().map(Error::class);
        let ran = task.run_exchange();
        (validated, class, ran, task.last_error().map(Error::class))
    });
    for result in results {
        assert_eq!(
            result,
            (
                false,
                Some(ErrorClass::Topology),
                false,
                Some(ErrorClass::Topology)
            )
        );
    }
}
