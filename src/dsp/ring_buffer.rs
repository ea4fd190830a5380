//! # Ring Buffer with a Movable Pivot
//!
//! A fixed-capacity circular buffer whose logical start (the "pivot") can
//! be moved without touching the stored data. Delay lines and sliding
//! windows are built on it: instead of shifting every element one slot to
//! make room for a new sample, we move the pivot one slot backward and
//! overwrite the slot it now points at.
//!
//! ## Relative vs. absolute indices
//!
//! Storage is a plain `Vec<T>` addressed by *absolute* indices
//! `0..capacity`. Callers address it through *relative* indices, counted
//! from the pivot:
//!
//! ```text
//! absolute = (start_index + relative) % capacity
//! ```
//!
//! The logical window can be shorter than the storage
//! ([`set_relative_size`](RingBuffer::set_relative_size)). Relative
//! indices past the window fall back to the slot at the pivot. That
//! fallback is a safety net, not an error.
//!
//! ## Rotating instead of shifting
//!
//! [`insert_and_pop`](RingBuffer::insert_and_pop) is the workhorse:
//!
//! ```text
//! before:  pivot → [a, b, c, d]        (relative order)
//! insert e: pops d, pivot moves back one slot, e lands at relative 0
//! after:   pivot → [e, a, b, c]
//! ```
//!
//! Each call is O(1) and the value it returns is the one inserted
//! `relative_size` calls earlier, which makes the buffer a delay line of
//! exactly `relative_size` samples.

use std::num::NonZeroUsize;

use nih_plug::nih_warn;
use thiserror::Error;

/// Returned by [`RingBuffer::set_relative_size`] when the requested window
/// does not fit and no fallback was requested. The window is left as it
/// was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("relative size {size} exceeds the ring buffer capacity {capacity}")]
pub struct RelativeSizeOutOfRange {
    pub size: usize,
    pub capacity: usize,
}

/// A circular buffer with a logical start index and window length.
///
/// All storage is allocated in [`new()`](Self::new). None of the other
/// methods allocate, so the buffer is safe to use on the audio thread.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    buffer: Vec<T>,

    /// The logical pivot. Not wrapped when set directly; every read and
    /// write applies the modulo instead.
    start_index: usize,

    /// Length of the logical window, `<= capacity`.
    relative_size: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Creates a buffer with `capacity` default-initialized slots. The
    /// window spans the whole capacity and the pivot sits at slot 0.
    ///
    /// `NonZeroUsize` keeps the modulo arithmetic free of division by zero.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            buffer: vec![T::default(); capacity.get()],
            start_index: 0,
            relative_size: capacity.get(),
        }
    }

    /// The number of slots in storage.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// The length of the logical window.
    pub fn size(&self) -> usize {
        self.relative_size
    }

    pub fn start_index(&self) -> usize {
        self.start_index
    }

    /// Moves the pivot. The index is stored as given: keeping it below
    /// [`capacity()`](Self::capacity) is up to the caller.
    pub fn set_start_index(&mut self, index: usize) {
        self.start_index = index;
    }

    /// Sets the window length counted from the pivot.
    ///
    /// With `use_capacity` set, the window always spans the whole buffer
    /// and `size` is ignored. Otherwise `size` is applied if it fits, and
    /// an oversized request leaves the window untouched and is reported.
    pub fn set_relative_size(
        &mut self,
        size: usize,
        use_capacity: bool,
    ) -> Result<(), RelativeSizeOutOfRange> {
        if use_capacity {
            self.relative_size = self.capacity();
            return Ok(());
        }

        if size > self.capacity() {
            nih_warn!(
                "Ring buffer size {size} is out of range, keeping {}",
                self.relative_size
            );
            return Err(RelativeSizeOutOfRange {
                size,
                capacity: self.capacity(),
            });
        }

        self.relative_size = size;
        Ok(())
    }

    /// Maps a relative index onto storage. Indices outside the window land
    /// on the pivot slot.
    fn absolute_index(&self, index: usize) -> usize {
        if index < self.relative_size {
            (self.start_index + index) % self.capacity()
        } else {
            self.start_index % self.capacity()
        }
    }

    pub fn get_from_relative_index(&self, index: usize) -> T {
        self.buffer[self.absolute_index(index)]
    }

    pub fn get_mut_from_relative_index(&mut self, index: usize) -> &mut T {
        let absolute = self.absolute_index(index);
        &mut self.buffer[absolute]
    }

    pub fn set_at_relative_index(&mut self, index: usize, value: T) {
        let absolute = self.absolute_index(index);
        self.buffer[absolute] = value;
    }

    /// Pushes `value` onto the head of the window and returns the element
    /// that was at its tail.
    ///
    /// Only the pivot moves: it steps back one slot (wrapping from 0 to
    /// `capacity - 1`) and the new head overwrites the slot the old tail
    /// occupied when the window spans the whole buffer.
    pub fn insert_and_pop(&mut self, value: T) -> T {
        let popped = self.get_from_relative_index(self.relative_size.saturating_sub(1));

        self.start_index = if self.start_index < 1 {
            self.capacity() - 1
        } else {
            self.start_index - 1
        };

        self.set_at_relative_index(0, value);

        popped
    }

    /// Copies `samples` into storage starting at absolute slot 0. Does
    /// nothing and returns `false` if `samples` is longer than the
    /// capacity. There is no partial fill.
    pub fn fill_absolute(&mut self, samples: &[T]) -> bool {
        if samples.len() > self.capacity() {
            return false;
        }

        self.buffer[..samples.len()].copy_from_slice(samples);
        true
    }

    /// Writes `samples` at relative indices `0..samples.len()`. Same
    /// capacity guard as [`fill_absolute()`](Self::fill_absolute). Entries
    /// past the window all land on the pivot slot, so the last of them wins.
    pub fn fill_relative(&mut self, samples: &[T]) -> bool {
        if samples.len() > self.capacity() {
            return false;
        }

        for (index, &sample) in samples.iter().enumerate() {
            self.set_at_relative_index(index, sample);
        }
        true
    }

    /// Iterates the logical window from the pivot onward.
    pub fn iter_relative(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.relative_size).map(move |index| self.get_from_relative_index(index))
    }

    /// The raw storage in absolute order.
    pub fn as_absolute_slice(&self) -> &[T] {
        &self.buffer
    }

    /// Resets every slot to the default value and the pivot to 0. The
    /// window length is kept.
    pub fn clear(&mut self) {
        self.buffer.fill(T::default());
        self.start_index = 0;
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────
