//! # DSP Primitives
//!
//! - **`ring_buffer`**: circular buffer with a movable pivot. Rotating the
//!   pivot turns it into a delay line or a sliding window in O(1).
//!
//! - **`delayed_buffer`**: block-shifted multi-channel delay that lines a
//!   signal up with a processor's lookahead latency.
//!
//! - **`filter`**: one-pole smoother for control signals such as gate gain.

pub mod delayed_buffer;
pub mod filter;
pub mod ring_buffer;
