//! Torus neighbor exchange with one thread per rank.
//!
//! Each rank fills its send buffer with its own rank number, exchanges with
//! its four neighbors, and prints what arrived from each direction.
//!
//! Run with: cargo run --example local_torus -- 3
//! (the argument is the grid side and overrides `TORUS_SIDE`; chunk size and
//! send mode come from `TORUS_CHUNK_BYTES` and `TORUS_SEND_MODE`)

use torus_exchange::{
    Communicator, Direction, ExchangeConfig, LocalUniverse, Result, TaskData, TorusExchangeTask,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut config = ExchangeConfig::from_env()?;
    let side_arg = std::env::args()
        .nth(1)
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|&side| side > 0);
    if let Some(side) = side_arg {
        config.side = side;
    }
    let (side, chunk_len) = (config.side, config.chunk_len);
    println!(
        "Running a {side}x{side} torus exchange on {} threads ({:?} sends)",
        config.size(),
        config.send_mode
    );

    let lines = LocalUniverse::from_config(&config).run(|comm| {
        let rank = comm.rank();
        let input = vec![rank as u8; chunk_len];
        let mut output = vec![0u8; 4 * chunk_len];

        let data = TaskData::new()
            .with_input(&input)
            .with_output(&mut output, chunk_len);
        let mut task = TorusExchangeTask::new(&comm, data);
        if !(task.validate() && task.run_exchange() && task.finalize()) {
            let reason = task
                .last_error()
                .map_or_else(|| "unknown".to_string(), ToString::to_string);
            return format!("Rank {rank}: exchange failed: {reason}");
        }
        drop(task);

        let received: Vec<String> = Direction::ALL
            .iter()
            .zip(output.chunks(chunk_len))
            .map(|(direction, chunk)| format!("{direction}={}", chunk[0]))
            .collect();
        format!("Rank {rank}: {}", received.join(" "))
    });

    for line in lines {
        println!("{line}");
    }
    Ok(())
}
