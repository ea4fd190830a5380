//! # Delayed Buffer (Block-Shifted Latency Compensation)
//!
//! Keeps the most recent `block_size + latency` samples of every channel
//! and hands back audio that lags the input by exactly `latency` samples.
//! Processors that need to see the future (a lookahead gate, for example)
//! analyse the undelayed block and apply the result to the delayed one, so
//! both line up in time.
//!
//! ## Layout
//!
//! ```text
//!   oldest                                     newest
//!   [ delayed block ........ | ...... latency window ]
//!   0                    block_size          block_size + latency
//! ```
//!
//! Every [`fill_buffer()`](DelayedBuffer::fill_buffer) shifts the window
//! left by one block and appends the new block at the tail. That is an
//! O(window) copy per block, which is cheap next to the per-sample work of
//! any processor using it, and it keeps the delayed block contiguous.

/// Multi-channel block delay with a fixed latency.
#[derive(Debug, Clone)]
pub struct DelayedBuffer {
    /// One window of `block_size + latency_size` samples per channel.
    buffer: Vec<Vec<f32>>,
    block_size: usize,
    latency_size: usize,
}

impl DelayedBuffer {
    /// Allocates a zero-filled window for each channel. Call this while
    /// preparing, never from the audio thread.
    pub fn new(num_channels: usize, block_size: usize, latency_samples: usize) -> Self {
        Self {
            buffer: vec![vec![0.0; block_size + latency_samples]; num_channels],
            block_size,
            latency_size: latency_samples,
        }
    }

    pub fn num_channels(&self) -> usize {
        self.buffer.len()
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn latency_size(&self) -> usize {
        self.latency_size
    }

    /// Length of each channel's retained window.
    pub fn len(&self) -> usize {
        self.block_size + self.latency_size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pushes one block of input into the window.
    ///
    /// The oldest `n` samples of every channel are dropped and the input's
    /// `n` samples are appended, where `n` is the input length capped at
    /// `block_size`. Full blocks are the normal case; shorter ones are
    /// accepted so hosts with varying block sizes still get a constant
    /// delay. Channels the input does not cover are fed silence.
    pub fn fill_buffer<S: AsRef<[f32]>>(&mut self, input: &[S]) {
        let len = self.len();
        let block_size = self.block_size;

        for (channel, window) in self.buffer.iter_mut().enumerate() {
            let samples = input.get(channel).map(|s| s.as_ref());
            let n = samples
                .map(|s| s.len())
                .unwrap_or(block_size)
                .min(block_size);

            window.copy_within(n.., 0);
            match samples {
                Some(samples) => window[len - n..].copy_from_slice(&samples[..n]),
                None => window[len - n..].fill(0.0),
            }
        }
    }

    /// Copies the delayed audio into `output`, channel for channel.
    ///
    /// Each output channel receives `n` samples (its length, capped at
    /// `block_size`) that end exactly `latency_size` samples before the
    /// newest input. For a full block that is the oldest `block_size`
    /// samples of the window.
    pub fn set_buffer_to_delayed_buffer<S: AsMut<[f32]>>(&self, output: &mut [S]) {
        let len = self.len();

        for (window, out) in self.buffer.iter().zip(output.iter_mut()) {
            let out = out.as_mut();
            let n = out.len().min(self.block_size);
            let start = len - self.latency_size - n;
            out[..n].copy_from_slice(&window[start..start + n]);
        }
    }

    /// The full retained window of every channel, oldest sample first.
    pub fn get_buffer(&self) -> &[Vec<f32>] {
        &self.buffer
    }

    /// Back to silence.
    pub fn clear(&mut self) {
        for window in &mut self.buffer {
            window.fill(0.0);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// The delayed block is the window's oldest block: first silence, then
    /// the first input once a second block has pushed it forward.
    #[test]
    fn test_delays_by_one_block() {
        let mut db = DelayedBuffer::new(1, 4, 4);
        let mut out = [vec![9.0; 4]];

        db.fill_buffer(&[[1.0, 2.0, 3.0, 4.0]]);
        db.set_buffer_to_delayed_buffer(&mut out);
        assert_eq!(out[0], vec![0.0, 0.0, 0.0, 0.0]);

        db.fill_buffer(&[[5.0, 6.0, 7.0, 8.0]]);
        db.set_buffer_to_delayed_buffer(&mut out);
        assert_eq!(out[0], vec![1.0, 2.0, 3.0, 4.0]);

        assert_eq!(db.get_buffer()[0], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
    }

    /// Latency shorter than the block: the delay is still `latency` samples.
    #[test]
    fn test_latency_shorter_than_block() {
        let mut db = DelayedBuffer::new(1, 4, 2);
        let mut out = [vec![0.0; 4]];

        db.fill_buffer(&[[1.0, 2.0, 3.0, 4.0]]);
        db.set_buffer_to_delayed_buffer(&mut out);
        assert_eq!(out[0], vec![0.0, 0.0, 1.0, 2.0]);

        db.fill_buffer(&[[5.0, 6.0, 7.0, 8.0]]);
        db.set_buffer_to_delayed_buffer(&mut out);
        assert_eq!(out[0], vec![3.0, 4.0, 5.0, 6.0]);
    }

    /// Zero latency degenerates into a plain copy.
    #[test]
    fn test_zero_latency_is_passthrough() {
        let mut db = DelayedBuffer::new(2, 3, 0);
        let mut out = [vec![0.0; 3], vec![0.0; 3]];

        db.fill_buffer(&[[1.0, 2.0, 3.0], [-1.0, -2.0, -3.0]]);
        db.set_buffer_to_delayed_buffer(&mut out);
        assert_eq!(out[0], vec![1.0, 2.0, 3.0]);
        assert_eq!(out[1], vec![-1.0, -2.0, -3.0]);
    }

    /// Short blocks keep the same constant delay.
    #[test]
    fn test_partial_blocks_keep_constant_delay() {
        let mut db = DelayedBuffer::new(1, 4, 3);
        let mut collected = Vec::new();

        let input: Vec<f32> = (1..=10).map(|i| i as f32).collect();
        for chunk in input.chunks(3) {
            let mut out = [vec![0.0; chunk.len()]];
            db.fill_buffer(&[chunk]);
            db.set_buffer_to_delayed_buffer(&mut out);
            collected.extend_from_slice(&out[0]);
        }

        // Three samples of silence, then the input.
        assert_eq!(
            collected,
            vec![0.0, 0.0, 0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]
        );
    }

    #[test]
    fn test_channels_stay_independent() {
        let mut db = DelayedBuffer::new(2, 2, 2);
        let mut out = [vec![0.0; 2], vec![0.0; 2]];

        db.fill_buffer(&[[1.0, 1.0], [2.0, 2.0]]);
        db.fill_buffer(&[[3.0, 3.0], [4.0, 4.0]]);
        db.set_buffer_to_delayed_buffer(&mut out);
        assert_eq!(out[0], vec![1.0, 1.0]);
        assert_eq!(out[1], vec![2.0, 2.0]);
    }

    /// A missing input channel is treated as silence.
    #[test]
    fn test_missing_input_channel_reads_as_silence() {
        let mut db = DelayedBuffer::new(2, 2, 0);
        let mut out = [vec![5.0; 2], vec![5.0; 2]];

        db.fill_buffer(&[[1.0, 1.0]]);
        db.set_buffer_to_delayed_buffer(&mut out);
        assert_eq!(out[1], vec![0.0, 0.0]);
    }

    #[test]
    fn test_clear() {
        let mut db = DelayedBuffer::new(1, 2, 2);
        db.fill_buffer(&[[1.0, 1.0]]);
        db.clear();
        assert!(db.get_buffer()[0].iter().all(|&s| s == 0.0));
        assert_eq!(db.len(), 4);
    }
}
