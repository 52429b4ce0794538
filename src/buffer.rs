//! Caller-owned buffers the exchange reads from and writes into.
//!
//! The harness allocates every buffer; the exchange only borrows them for the
//! duration of one call. [`TaskData`] carries the buffer lists together with
//! their declared counts, so that malformed descriptions can be rejected
//! before any communication starts.

/// Access to the buffers of one participant.
pub trait BufferContract {
    /// Bytes to send to every neighbor, already cut to the declared length.
    ///
    /// `None` when no usable input buffer is present.
    fn input_buffer(&self) -> Option<&[u8]>;

    /// Destination for the combined result, spanning its full capacity.
    fn output_buffer(&mut self) -> Option<&mut [u8]>;

    /// Bytes available in the output buffer.
    fn output_capacity(&self) -> usize;
}

/// Buffer lists and declared counts supplied by the harness.
///
/// `inputs_count[i]` is the number of meaningful bytes in `inputs[i]`.
/// `outputs_count[i]` is the per-neighbor chunk length the caller expects to
/// receive into `outputs[i]`; the capacity of an output is its slice length
/// and must hold one chunk from each of the four neighbors. An absent entry
/// stands for a buffer the harness failed to provide.
///
/// # Example
///
/// ```
/// use torus_exchange::{BufferContract, TaskData};
///
/// let input = [7u8; 8];
/// let mut output = [0u8; 32];
/// let mut data = TaskData::new().with_input(&input).with_output(&mut output, 8);
///
/// assert_eq!(data.input_buffer(), Some(&input[..]));
/// assert_eq!(data.output_capacity(), 32);
/// ```
#[derive(Debug, Default)]
pub struct TaskData<'a> {
    /// Input buffers
    pub inputs: Vec<Option<&'a [u8]>>,
    /// Declared input lengths
    pub inputs_count: Vec<usize>,
    /// Output buffers
    pub outputs: Vec<Option<&'a mut [u8]>>,
    /// Declared per-neighbor chunk lengths for each output
    pub outputs_count: Vec<usize>,
}

impl<'a> TaskData<'a> {
    /// Empty buffer lists.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an input whose declared length is its full length.
    pub fn with_input(mut self, input: &'a [u8]) -> Self {
        self.inputs_count.push(input.len());
        self.inputs.push(Some(input));
        self
    }

    /// Append an output expecting chunks of `chunk_len` bytes.
    pub fn with_output(mut self, output: &'a mut [u8], chunk_len: usize) -> Self {
        self.outputs.push(Some(output));
        self.outputs_count.push(chunk_len);
        self
    }

    /// Append an input entry with an explicit declared length.
    pub fn push_input(&mut self, input: Option<&'a [u8]>, count: usize) {
        self.inputs.push(input);
        self.inputs_count.push(count);
    }

    /// Append an output entry with an explicit declared chunk length.
    pub fn push_output(&mut self, output: Option<&'a mut [u8]>, count: usize) {
        self.outputs.push(output);
        self.outputs_count.push(count);
    }
}

impl BufferContract for TaskData<'_> {
    fn input_buffer(&self) -> Option<&[u8]> {
        let input = self.inputs.first().copied().flatten()?;
        let len = *self.inputs_count.first()?;
        input.get(..len)
    }

    fn output_buffer(&mut self) -> Option<&mut [u8]> {
        self.outputs.first_mut()?.as_deref_mut()
    }

    fn output_capacity(&self) -> usize {
        self.outputs
            .first()
            .and_then(Option::as_deref)
            .map_or(0, <[u8]>::len)
    }
}
