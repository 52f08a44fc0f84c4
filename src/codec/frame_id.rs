//! Frame id allocation.
//!
//! Ids run 1..=255 and wrap back to 1; id 0 tells the radio not to answer,
//! so it is never handed out. Each allocation is a [`FrameIdLease`] that
//! returns the id to the pool when dropped, and the allocator skips ids that
//! are still leased. Two requests pending at the same moment therefore never
//! share an id.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Result, XBeeError};

/// Number of usable frame ids.
pub const FRAME_ID_COUNT: usize = 255;

struct IdState {
    /// Last id handed out (0 before the first allocation).
    last: u8,
    /// Leased flags indexed by id.
    leased: [bool; 256],
    in_flight: usize,
}

/// Allocator of correlation ids, one per client.
#[derive(Clone)]
pub struct FrameIdAllocator {
    state: Arc<Mutex<IdState>>,
}

impl FrameIdAllocator {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(IdState {
                last: 0,
                leased: [false; 256],
                in_flight: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, IdState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Lease the next free id after the last one handed out.
    ///
    /// # Errors
    ///
    /// Returns `FrameIdsExhausted` if all 255 ids are leased.
    pub fn next_id(&self) -> Result<FrameIdLease> {
        let mut state = self.lock();
        let mut candidate = state.last;

        for _ in 0..FRAME_ID_COUNT {
            candidate = if candidate == u8::MAX { 1 } else { candidate + 1 };
            if !state.leased[candidate as usize] {
                state.leased[candidate as usize] = true;
                state.last = candidate;
                state.in_flight += 1;
                return Ok(FrameIdLease {
                    id: candidate,
                    state: self.state.clone(),
                });
            }
        }

        Err(XBeeError::FrameIdsExhausted)
    }

    /// Number of ids currently leased.
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }
}

impl Default for FrameIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// A leased frame id. Released on drop.
pub struct FrameIdLease {
    id: u8,
    state: Arc<Mutex<IdState>>,
}

impl FrameIdLease {
    #[inline]
    pub fn id(&self) -> u8 {
        self.id
    }
}

impl std::fmt::Debug for FrameIdLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FrameIdLease").field(&self.id).finish()
    }
}

impl Drop for FrameIdLease {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.leased[self.id as usize] = false;
        state.in_flight -= 1;
    }
}
