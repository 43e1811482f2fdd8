use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

/// Source of netlink message sequence numbers
///
/// Every request built with the same counter gets a distinct sequence
/// number, also when requests are built from several threads. The counter
/// wraps silently at `u32::MAX`.
#[derive(Debug, Default)]
pub struct SequenceCounter {
    last: AtomicU32,
}

impl SequenceCounter {
    /// Create a counter whose first sequence number is 1
    pub const fn new() -> SequenceCounter {
        SequenceCounter::starting_at(1)
    }

    /// Create a counter whose first sequence number is `first`
    pub const fn starting_at(first: u32) -> SequenceCounter {
        SequenceCounter { last: AtomicU32::new(first.wrapping_sub(1)) }
    }

    /// The counter shared by the whole process
    pub fn shared() -> Arc<SequenceCounter> {
        static SHARED: OnceLock<Arc<SequenceCounter>> = OnceLock::new();
        SHARED.get_or_init(|| Arc::new(SequenceCounter::new())).clone()
    }

    /// Take the next sequence number
    pub fn next(&self) -> u32 {
        self.last.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }
}
