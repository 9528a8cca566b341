//! Resume-cursor tracking.

use parking_lot::{Mutex, RwLock};

/// The last fully dispatched sequence number.
///
/// Single writer (the session's decode/dispatch path), any number of
/// readers (status reporting, persistence side-channels). The cursor
/// only moves forward: redelivered or out-of-order sequences never pull
/// it back.
#[derive(Debug, Default)]
pub struct Cursor {
    value: RwLock<Option<u64>>,
}

impl Cursor {
    /// Creates a cursor with no position yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cursor starting at the given sequence.
    pub fn starting_at(sequence: u64) -> Self {
        Self {
            value: RwLock::new(Some(sequence)),
        }
    }

    /// The current position, or `None` before the first dispatch.
    pub fn get(&self) -> Option<u64> {
        *self.value.read()
    }

    /// Advance to `sequence` if it is not behind the current position.
    ///
    /// Returns true if the cursor moved (or was first set).
    pub fn advance_to(&self, sequence: u64) -> bool {
        let mut guard = self.value.write();
        match *guard {
            Some(current) if sequence < current => false,
            _ => {
                *guard = Some(sequence);
                true
            }
        }
    }
}

/// Caller-owned persistence for the cursor, so a restart can resume
/// where the previous process stopped.
pub trait CursorStore: Send + Sync {
    /// Load the persisted cursor, if any.
    fn load(&self) -> Option<u64>;

    /// Persist the cursor after a fully dispatched event.
    fn save(&self, sequence: u64);
}

/// An in-memory cursor store, for tests and single-process use.
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    value: Mutex<Option<u64>>,
}

impl MemoryCursorStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CursorStore for MemoryCursorStore {
    fn load(&self) -> Option<u64> {
        *self.value.lock()
    }

    fn save(&self, sequence: u64) {
        *self.value.lock() = Some(sequence);
    }
}
