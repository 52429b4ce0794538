//! Harness-facing task with a boolean result per lifecycle step.
//!
//! [`TorusExchangeTask`] ties a [`Communicator`] to a caller's [`TaskData`]
//! and exposes `validate`, `run_exchange` and `finalize`. Errors stop at this
//! boundary: each step logs what went wrong, records it for
//! [`last_error`](TorusExchangeTask::last_error), and returns `false`.

use crate::buffer::{BufferContract, TaskData};
use crate::comm::Communicator;
use crate::error::{BufferError, BufferSide, Error, Result};
use crate::exchange::{ExchangeReport, RoundState, TopologyExchange};
use crate::validate::{first_input, validate};

/// Caller-supplied sanity check run by [`TorusExchangeTask::finalize`].
pub type OutputCheck = fn(&[u8]) -> bool;

/// Reject an output made entirely of zero bytes.
///
/// Zero is a valid payload byte, so this is only meaningful for harnesses
/// that know their inputs are never all zero. It is not installed by default.
pub fn reject_all_zero(output: &[u8]) -> bool {
    output.iter().any(|&b| b != 0)
}

/// One participant's exchange task.
///
/// # Example
///
/// ```
/// use torus_exchange::{LocalUniverse, TaskData, TorusExchangeTask};
///
/// let ok = LocalUniverse::new(9).run(|comm| {
///     let input = [0xC0u8; 16];
///     let mut output = [0u8; 64];
///     let data = TaskData::new().with_input(&input).with_output(&mut output, 16);
///
///     let mut task = TorusExchangeTask::new(&comm, data);
///     task.validate() && task.run_exchange() && task.finalize()
/// });
/// assert!(ok.into_iter().all(|ok| ok));
/// ```
pub struct TorusExchangeTask<'a, 'c, C: Communicator> {
    comm: &'c C,
    data: TaskData<'a>,
    exchange: Option<TopologyExchange<'c, C>>,
    output_check: Option<OutputCheck>,
    report: Option<ExchangeReport>,
    last_error: Option<Error>,
}

impl<'a, 'c, C: Communicator> TorusExchangeTask<'a, 'c, C> {
    /// Bind `data` to `comm`.
    pub fn new(comm: &'c C, data: TaskData<'a>) -> Self {
        TorusExchangeTask {
            comm,
            data,
            exchange: None,
            output_check: None,
            report: None,
            last_error: None,
        }
    }

    /// Install a check for [`finalize`](Self::finalize) to run over the output.
    pub fn with_output_check(mut self, check: OutputCheck) -> Self {
        self.output_check = Some(check);
        self
    }

    /// Check topology and buffers without communicating.
    pub fn validate(&mut self) -> bool {
        let result = validate(self.comm.size(), &self.data);
        self.record(result).is_some()
    }

    /// Run one exchange round.
    ///
    /// Re-checks the topology and the input on its own, so it is safe to call
    /// without [`validate`](Self::validate). Mutates the output only on success.
    pub fn run_exchange(&mut self) -> bool {
        self.report = None;
        let result = self.try_run_exchange();
        self.report = self.record(result);
        self.report.is_some()
    }

    /// Run the installed output check, if any.
    ///
    /// Fails unless the most recent [`run_exchange`](Self::run_exchange)
    /// succeeded.
    pub fn finalize(&mut self) -> bool {
        let Some(report) = self.report.as_ref() else {
            tracing::warn!(rank = self.comm.rank(), "finalize called before a completed round");
            return false;
        };
        let Some(check) = self.output_check else {
            return true;
        };
        let written = report.bytes_written;
        let passed = self
            .data
            .output_buffer()
            .and_then(|out| out.get(..written))
            .is_some_and(check);
        if !passed {
            tracing::warn!(rank = self.comm.rank(), "output check rejected the result");
        }
        passed
    }

    /// Phase of the underlying exchange.
    pub fn state(&self) -> RoundState {
        self.exchange
            .as_ref()
            .map_or(RoundState::Idle, TopologyExchange::state)
    }

    /// Report of the most recent round, if it succeeded.
    pub fn report(&self) -> Option<&ExchangeReport> {
        self.report.as_ref()
    }

    /// The error behind the most recent `false`.
    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    /// Give the buffers back to the caller.
    pub fn into_data(self) -> TaskData<'a> {
        self.data
    }

    fn try_run_exchange(&mut self) -> Result<ExchangeReport> {
        if self.exchange.is_none() {
            self.exchange = Some(TopologyExchange::new(self.comm)?);
        }
        let input = first_input(&self.data)?.to_vec();
        let output = match self.data.outputs.first_mut() {
            Some(Some(output)) => &mut **output,
            Some(None) => {
                return Err(BufferError::Missing {
                    side: BufferSide::Output,
                    index: 0,
                }
                .into());
            }
            None => return Err(BufferError::NoOutputs.into()),
        };
        match self.exchange.as_mut() {
            Some(exchange) => exchange.run(&input, output),
            None => Err(Error::RoundFailed),
        }
    }

    fn record<T>(&mut self, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => {
                self.last_error = None;
                Some(value)
            }
            Err(error) => {
                tracing::error!(rank = self.comm.rank(), %error, "exchange task step failed");
                self.last_error = Some(error);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorClass, TransportError};
    use crate::local::{LocalComm, LocalUniverse};
    use crate::request::SendRequest;
    use crate::status::Status;
    use bytes::Bytes;
    use std::cell::Cell;

    #[test]
    fn all_zero_check_is_opt_in() {
        assert!(!reject_all_zero(&[0, 0, 0]));
        assert!(reject_all_zero(&[0, 1, 0]));

        let mut comms = LocalUniverse::new(1).communicators();
        let comm = comms.pop().unwrap();
        let input = [0u8; 4];
        let mut output = [0xFFu8; 16];

        let data = TaskData::new().with_input(&input).with_output(&mut output, 4);
        let mut task = TorusExchangeTask::new(&comm, data);
        assert!(task.run_exchange());
        assert!(task.finalize());

        let data = task.into_data();
        let mut task = TorusExchangeTask::new(&comm, data).with_output_check(reject_all_zero);
        assert!(task.run_exchange());
        assert!(!task.finalize());
    }

    #[test]
    fn finalize_before_run_fails() {
        let mut comms = LocalUniverse::new(1).communicators();
        let comm = comms.pop().unwrap();
        let input = [1u8; 4];
        let mut output = [0u8; 16];
        let data = TaskData::new().with_input(&input).with_output(&mut output, 4);
        let mut task = TorusExchangeTask::new(&comm, data);
        assert!(!task.finalize());
    }

    /// Local endpoint whose barrier starts failing after `healthy` calls.
    struct FailingBarrier {
        inner: LocalComm,
        healthy: usize,
        calls: Cell<usize>,
    }

    impl Communicator for FailingBarrier {
        fn rank(&self) -> usize {
            self.inner.rank()
        }

        fn size(&self) -> usize {
            self.inner.size()
        }

        fn barrier(&self) -> std::result::Result<(), TransportError> {
            let call = self.calls.get();
            self.calls.set(call + 1);
            if call >= self.healthy {
                return Err(TransportError::Disconnected);
            }
            self.inner.barrier()
        }

        fn isend(
            &self,
            dest: usize,
            tag: u32,
            payload: Bytes,
        ) -> std::result::Result<SendRequest, TransportError> {
            self.inner.isend(dest, tag, payload)
        }

        fn recv(
            &self,
            source: usize,
            tag: u32,
        ) -> std::result::Result<(Bytes, Status), TransportError> {
            self.inner.recv(source, tag)
        }
    }

    #[test]
    fn finalize_fails_after_a_failed_round() {
        let comm = FailingBarrier {
            inner: LocalUniverse::new(1).communicators().remove(0),
            healthy: 2,
            calls: Cell::new(0),
        };
        let input = [3u8; 2];
        let mut output = [0u8; 8];
        let data = TaskData::new().with_input(&input).with_output(&mut output, 2);
        let mut task = TorusExchangeTask::new(&comm, data);

        assert!(task.run_exchange());
        assert!(task.finalize());

        // Second round dies in its opening barrier
        assert!(!task.run_exchange());
        assert!(task.report().is_none());
        assert!(!task.finalize());
        assert!(matches!(task.last_error(), Some(Error::Barrier(_))));
    }

    #[test]
    fn overlong_input_is_reported_as_such() {
        let mut comms = LocalUniverse::new(1).communicators();
        let comm = comms.pop().unwrap();
        let input = [1u8; 2];
        let mut output = [0u8; 16];
        let mut data = TaskData::new().with_output(&mut output, 4);
        data.push_input(Some(&input), 4);

        let mut task = TorusExchangeTask::new(&comm, data);
        assert!(!task.run_exchange());
        assert!(matches!(
            task.last_error(),
            Some(Error::Buffer(BufferError::DeclaredLengthExceedsBuffer {
                side: BufferSide::Input,
                declared: 4,
                actual: 2,
                ..
            }))
        ));
    }

    #[test]
    fn missing_output_is_reported() {
        let mut comms = LocalUniverse::new(1).communicators();
        let comm = comms.pop().unwrap();
        let input = [1u8; 2];
        let mut data = TaskData::new().with_input(&input);
        data.push_output(None, 2);

        let mut task = TorusExchangeTask::new(&comm, data);
        assert!(!task.run_exchange());
        assert!(matches!(
            task.last_error(),
            Some(Error::Buffer(BufferError::Missing {
                side: BufferSide::Output,
                index: 0
            }))
        ));
    }

    #[test]
    fn errors_are_recorded() {
        let mut comms = LocalUniverse::new(1).communicators();
        let comm = comms.pop().unwrap();
        let input = [1u8; 4];
        let mut output = [0u8; 8];
        let data = TaskData::new().with_input(&input).with_output(&mut output, 3);

        let mut task = TorusExchangeTask::new(&comm, data);
        assert!(!task.validate());
        assert_eq!(task.last_error().map(Error::class), Some(ErrorClass::Buffer));

        assert!(!task.run_exchange());
        assert_eq!(
            task.last_error().map(Error::class),
            Some(ErrorClass::Capacity)
        );
        assert_eq!(task.state(), RoundState::Failed);
    }
}
