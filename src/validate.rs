//! Admission checks run before an exchange.
//!
//! Everything here is local and cheap; it rejects malformed topologies and
//! buffer descriptions before any process touches the network. Passing the
//! gate is advisory: [`TopologyExchange`](crate::TopologyExchange) re-checks
//! what it depends on, since callers may run it without validating first.

use crate::buffer::TaskData;
use crate::error::{BufferError, BufferSide, Result};
use crate::topology::grid_side;

/// Check that the buffer lists are non-empty, present, non-zero, consistent
/// with their declared counts, and that the input and output agree on the
/// per-process chunk length.
pub fn validate_buffers(data: &TaskData<'_>) -> Result<()> {
    if data.inputs.is_empty() || data.inputs_count.is_empty() {
        return Err(BufferError::NoInputs.into());
    }
    if data.outputs.is_empty() || data.outputs_count.is_empty() {
        return Err(BufferError::NoOutputs.into());
    }

    let inputs = data.inputs.iter().map(|b| b.map(<[u8]>::len));
    check_side(BufferSide::Input, inputs, &data.inputs_count)?;
    let outputs = data.outputs.iter().map(|b| b.as_deref().map(<[u8]>::len));
    check_side(BufferSide::Output, outputs, &data.outputs_count)?;

    let (input, output) = (data.inputs_count[0], data.outputs_count[0]);
    if input != output {
        return Err(BufferError::ChunkLengthMismatch { input, output }.into());
    }
    Ok(())
}

fn check_side(
    side: BufferSide,
    lengths: impl ExactSizeIterator<Item = Option<usize>>,
    counts: &[usize],
) -> Result<()> {
    if lengths.len() != counts.len() {
        return Err(BufferError::CountListMismatch {
            side,
            buffers: lengths.len(),
            counts: counts.len(),
        }
        .into());
    }
    for (index, (actual, &declared)) in lengths.zip(counts).enumerate() {
        let Some(actual) = actual else {
            return Err(BufferError::Missing { side, index }.into());
        };
        if declared == 0 {
            return Err(BufferError::Empty { side, index }.into());
        }
        // Outputs declare a chunk length, not their capacity
        if side == BufferSide::Input && declared > actual {
            return Err(BufferError::DeclaredLengthExceedsBuffer {
                side,
                index,
                declared,
                actual,
            }
            .into());
        }
        if actual == 0 {
            return Err(BufferError::Empty { side, index }.into());
        }
    }
    Ok(())
}

/// The first input cut to its declared length, or the reason it cannot be
/// sent.
pub(crate) fn first_input<'d>(data: &'d TaskData<'_>) -> Result<&'d [u8]> {
    let (Some(entry), Some(&declared)) = (data.inputs.first(), data.inputs_count.first()) else {
        return Err(BufferError::NoInputs.into());
    };
    let Some(input) = *entry else {
        return Err(BufferError::Missing {
            side: BufferSide::Input,
            index: 0,
        }
        .into());
    };
    input.get(..declared).ok_or_else(|| {
        BufferError::DeclaredLengthExceedsBuffer {
            side: BufferSide::Input,
            index: 0,
            declared,
            actual: input.len(),
        }
        .into()
    })
}

/// Full admission check for a communicator of `size` processes.
///
/// Buffers are checked first, then the topology.
///
/// # Example
///
/// ```
/// use torus_exchange::{validate, TaskData};
///
/// let input = [1u8; 4];
/// let mut output = [0u8; 16];
/// let data = TaskData::new().with_input(&input).with_output(&mut output, 4);
///
/// assert!(validate(9, &data).is_ok());
/// assert!(validate(12, &data).is_err());
/// ```
pub fn validate(size: usize, data: &TaskData<'_>) -> Result<()> {
    validate_buffers(data)?;
    grid_side(size)?;
    Ok(())
}

/// Boolean form of [`validate`].
pub fn is_valid(size: usize, data: &TaskData<'_>) -> bool {
    validate(size, data).is_ok()
}
