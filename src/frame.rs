//! Frame lifecycle
//!
//! A [`FrameClock`] is the single owner of frame counting. The render loop
//! advances it once per submitted frame and reports retirement once the
//! GPU fence for a frame has signalled:
//!
//! ```text
//! frame 0 ──advance()──▶ frame 1 ──advance()──▶ frame 2
//!    │                      │
//!    └── fence signalled ───┴──▶ retire(0) ──▶ release_stale(0)
//! ```
//!
//! Descriptor allocators never read a global frame counter. Freed ranges are
//! stamped with a marker passed explicitly, or read from the clock that was
//! handed to the allocator at construction.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Monotonic identifier for one unit of submitted GPU work
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FrameMarker(pub u64);

impl FrameMarker {
    pub const ZERO: FrameMarker = FrameMarker(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    /// The marker that follows this one
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl From<u64> for FrameMarker {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for FrameMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({})", self.0)
    }
}

/// Frame counter shared between the render loop and descriptor allocators
///
/// `current` is the frame being recorded. `retired` is the newest frame whose
/// GPU work is known to be complete; it only moves forward.
#[derive(Debug, Default)]
pub struct FrameClock {
    current: AtomicU64,
    retired: AtomicU64,
    any_retired: AtomicBool,
}

impl FrameClock {
    /// Create a clock positioned at frame 0 with nothing retired
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clock positioned at an arbitrary frame
    pub fn starting_at(frame: FrameMarker) -> Self {
        Self {
            current: AtomicU64::new(frame.0),
            ..Self::default()
        }
    }

    /// The frame currently being recorded
    pub fn current(&self) -> FrameMarker {
        FrameMarker(self.current.load(Ordering::Acquire))
    }

    /// End the current frame and start the next one
    ///
    /// Returns the marker of the frame that just ended.
    pub fn advance(&self) -> FrameMarker {
        FrameMarker(self.current.fetch_add(1, Ordering::AcqRel))
    }

    /// Record that all GPU work up to and including `frame` has finished
    ///
    /// Retirement never moves backwards; the effective retired marker is
    /// returned.
    pub fn retire(&self, frame: FrameMarker) -> FrameMarker {
        self.any_retired.store(true, Ordering::Release);
        let previous = self.retired.fetch_max(frame.0, Ordering::AcqRel);
        FrameMarker(previous.max(frame.0))
    }

    /// Newest retired frame, if any frame has been retired yet
    pub fn last_retired(&self) -> Option<FrameMarker> {
        if self.any_retired.load(Ordering::Acquire) {
            Some(FrameMarker(self.retired.load(Ordering::Acquire)))
        } else {
            None
        }
    }
}
