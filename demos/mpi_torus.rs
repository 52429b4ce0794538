//! Torus neighbor exchange with one MPI process per rank.
//!
//! Every rank sends a payload derived from its rank to its four neighbors,
//! then checks that each chunk it received came from the right neighbor.
//! The process count must be a perfect square. Chunk size and round count
//! come from `TORUS_CHUNK_BYTES` and `TORUS_ROUNDS`.
//!
//! Run with: mpiexec -n 9 ./target/debug/examples/mpi_torus

use torus_exchange::{
    Communicator, Direction, ExchangeConfig, MpiComm, TaskData, TorusExchangeTask, neighbors,
};
use tracing_subscriber::EnvFilter;

fn payload_for(rank: usize, round: usize, len: usize) -> Vec<u8> {
    (0..len).map(|i| (rank * 31 + round * 7 + i) as u8).collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = ExchangeConfig::from_env()?;
    let mut comm = MpiComm::init()?;
    if let Some(limit) = config.max_message_len {
        comm = comm.max_message_len(limit);
    }
    let (rank, size) = (comm.rank(), comm.size());
    let host = comm.processor_name().unwrap_or_default();
    let n = neighbors(rank, size)?;
    if rank == 0 {
        println!(
            "Torus exchange: {size} ranks, {} rounds of {} bytes",
            config.rounds, config.chunk_len
        );
    }

    for round in 0..config.rounds {
        let input = payload_for(rank, round, config.chunk_len);
        let mut output = vec![0u8; config.output_len()];
        let data = TaskData::new()
            .with_input(&input)
            .with_output(&mut output, config.chunk_len);
        let mut task = TorusExchangeTask::new(&comm, data);
        if !(task.validate() && task.run_exchange() && task.finalize()) {
            let reason = task
                .last_error()
                .map_or_else(|| "unknown".to_string(), ToString::to_string);
            eprintln!("FAIL: rank {rank} round {round}: {reason}");
            std::process::exit(1);
        }
        drop(task);

        for (slot, direction) in Direction::ALL.into_iter().enumerate() {
            let peer = n.get(direction);
            let chunk = &output[slot * config.chunk_len..(slot + 1) * config.chunk_len];
            if chunk != payload_for(peer, round, config.chunk_len).as_slice() {
                eprintln!("FAIL: rank {rank} round {round}: wrong {direction} chunk from {peer}");
                std::process::exit(1);
            }
        }
    }

    println!(
        "Rank {rank} on {host}: left={} right={} up={} down={} ok",
        n.left, n.right, n.up, n.down
    );
    comm.barrier()?;
    if rank == 0 {
        println!("PASS: all ranks received every neighbor chunk");
    }
    Ok(())
}
