//! # Engine Slot
//!
//! The handoff point between the control path (prepare, teardown,
//! parameter pushes) and the real-time path (process).
//!
//! The slot holds at most one [`EngineEntry`] behind an atomic pointer.
//! The audio thread claims the entry by raising a `processing` flag; the
//! control thread replaces the entry by swapping the pointer and then
//! waiting for the block in flight to finish before it frees the old one.
//! Neither side ever blocks the audio thread: if it finds the flag already
//! raised it gives up with [`PluginError::ProcessBusy`] instead of waiting.
//!
//! ```text
//!   control thread                         audio thread
//!   ──────────────                         ────────────
//!   swap(current, new) ──► old             processing: false → true
//!   note completed blocks                  load(current) ─► run block
//!   spin until a block completes           completed += 1
//!     or processing is low                 processing: true → false
//!   drop(old)
//! ```
//!
//! Only the block in flight at swap time can still hold `old`, so the
//! control thread waits for one block to complete rather than for the
//! flag to be low. A process loop that never pauses cannot starve it.
//!
//! An `Arc` swap (as `ArcSwap` does for phonon's graph handoff) would drop
//! the last reference on whichever thread happens to hold it, which can be
//! the audio thread. Here the old engine is always freed by the control
//! thread.
//!
//! Only one control-path caller may touch the slot at a time. The façade
//! enforces that with its control lock, which is why the control-side
//! methods are `unsafe`.

use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, Ordering};

use super::{AuraEngine, EngineControls};
use crate::error::PluginError;

/// An engine together with the controls it reads from.
pub struct EngineEntry {
    controls: EngineControls,
    engine: UnsafeCell<AuraEngine>,
}

// SAFETY: `controls` is all atomics. `engine` is only reached through
// `EngineSlot::with_engine()`, which hands it to one thread at a time.
unsafe impl Sync for EngineEntry {}

impl EngineEntry {
    pub fn new(controls: EngineControls, engine: AuraEngine) -> Self {
        Self {
            controls,
            engine: UnsafeCell::new(engine),
        }
    }

    pub fn controls(&self) -> &EngineControls {
        &self.controls
    }

    /// Unwraps the entry once it has left the slot.
    pub fn into_engine(self) -> AuraEngine {
        self.engine.into_inner()
    }
}

#[derive(Debug)]
pub struct EngineSlot {
    current: AtomicPtr<EngineEntry>,
    processing: AtomicBool,
    /// Blocks finished so far. Bumped before `processing` drops.
    completed: AtomicU64,
}

impl Default for EngineSlot {
    fn default() -> Self {
        Self {
            current: AtomicPtr::new(ptr::null_mut()),
            processing: AtomicBool::new(false),
            completed: AtomicU64::new(0),
        }
    }
}

/// Counts the block and lowers the processing flag when it is done, even
/// if the engine panicked.
struct ProcessingGuard<'a>(&'a EngineSlot);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.completed.fetch_add(1, Ordering::SeqCst);
        self.0.processing.store(false, Ordering::SeqCst);
    }
}

impl EngineSlot {
    /// Number of blocks that have run to completion (or were refused for
    /// lack of an engine) since the slot was created.
    pub fn completed_blocks(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn is_installed(&self) -> bool {
        !self.current.load(Ordering::SeqCst).is_null()
    }

    /// Runs `f` on the installed engine. Never blocks.
    pub fn with_engine<R>(
        &self,
        f: impl FnOnce(&mut AuraEngine, &EngineControls) -> R,
    ) -> Result<R, PluginError> {
        if self
            .processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PluginError::ProcessBusy);
        }
        let _guard = ProcessingGuard(self);

        let entry = self.current.load(Ordering::SeqCst);
        if entry.is_null() {
            return Err(PluginError::NotPrepared);
        }

        // SAFETY: `install()` and `take()` wait for the block in flight to
        // complete before freeing the entry they retired, so `entry` stays alive
        // until the guard is gone. The flag also keeps a second audio
        // thread from aliasing the engine.
        let entry = unsafe { &*entry };
        let engine = unsafe { &mut *entry.engine.get() };
        Ok(f(engine, &entry.controls))
    }

    /// The installed entry's controls.
    ///
    /// # Safety
    ///
    /// The caller must hold the control lock for as long as the returned
    /// reference lives, so no `install()` or `take()` can free the entry.
    pub unsafe fn controls(&self) -> Option<&EngineControls> {
        let entry = self.current.load(Ordering::SeqCst);
        // SAFETY: see above.
        unsafe { entry.as_ref() }.map(EngineEntry::controls)
    }

    /// Installs `entry` and returns whatever it replaced, once the audio
    /// thread is guaranteed to be done with it.
    ///
    /// # Safety
    ///
    /// The caller must hold the control lock.
    pub unsafe fn install(&self, entry: EngineEntry) -> Option<EngineEntry> {
        let new = Box::into_raw(Box::new(entry));
        unsafe { self.retire(self.current.swap(new, Ordering::SeqCst)) }
    }

    /// Empties the slot.
    ///
    /// # Safety
    ///
    /// The caller must hold the control lock.
    pub unsafe fn take(&self) -> Option<EngineEntry> {
        unsafe { self.retire(self.current.swap(ptr::null_mut(), Ordering::SeqCst)) }
    }

    /// Waits out any block still running on `old`, then reclaims it.
    unsafe fn retire(&self, old: *mut EngineEntry) -> Option<EngineEntry> {
        if old.is_null() {
            return None;
        }

        // `old` is already unlinked, so any block claimed from here on
        // loads the new pointer. Only the block holding the flag right now
        // can still see `old`, and its guard bumps `completed` on exit.
        let seen = self.completed.load(Ordering::SeqCst);
        while self.processing.load(Ordering::SeqCst)
            && self.completed.load(Ordering::SeqCst) == seen
        {
            std::hint::spin_loop();
            std::thread::yield_now();
        }

        // SAFETY: `old` came from `Box::into_raw()` in `install()`, has
        // been unlinked from the slot, and no block is reading it anymore.
        Some(*unsafe { Box::from_raw(old) })
    }
}

impl Drop for EngineSlot {
    fn drop(&mut self) {
        // `&mut self` rules out any concurrent caller.
        if let Some(entry) = unsafe { self.take() } {
            entry.into_engine().release_resources();
        }
    }
}
