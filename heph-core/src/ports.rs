use std::collections::BTreeSet;

use parking_lot::Mutex;
use thiserror::Error;

/// Default host port range for allocations.
pub const DEFAULT_MIN_PORT: u16 = 10_000;
pub const DEFAULT_MAX_PORT: u16 = 19_999;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("port range exhausted")]
pub struct PortsExhausted;

struct AllocatorState {
    next: u16,
    used: BTreeSet<u16>,
}

/// Assigns unique host ports from an inclusive range. Safe for concurrent
/// use; a returned port is never handed out again until `reset`.
pub struct PortAllocator {
    min: u16,
    max: u16,
    state: Mutex<AllocatorState>,
}

impl PortAllocator {
    pub fn new(min: u16, max: u16) -> Self {
        Self {
            min,
            max,
            state: Mutex::new(AllocatorState {
                next: min,
                used: BTreeSet::new(),
            }),
        }
    }

    /// Allocator over the default [10000, 19999] range.
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_MIN_PORT, DEFAULT_MAX_PORT)
    }

    fn allocate_locked(&self, state: &mut AllocatorState) -> Result<u16, PortsExhausted> {
        let range = (self.max - self.min) as usize + 1;
        for _ in 0..range {
            let port = state.next;
            state.next = if port == self.max { self.min } else { port + 1 };
            if state.used.insert(port) {
                return Ok(port);
            }
        }
        Err(PortsExhausted)
    }

    /// Returns the next available port as a decimal string.
    pub fn allocate(&self) -> Result<String, PortsExhausted> {
        let mut state = self.state.lock();
        self.allocate_locked(&mut state).map(|p| p.to_string())
    }

    /// Atomically allocates `n` distinct ports. If the range cannot satisfy
    /// all of them, nothing is consumed and prior allocations are preserved.
    pub fn allocate_n(&self, n: usize) -> Result<Vec<String>, PortsExhausted> {
        let mut state = self.state.lock();

        let mut allocated = Vec::with_capacity(n);
        for _ in 0..n {
            match self.allocate_locked(&mut state) {
                Ok(port) => allocated.push(port),
                Err(e) => {
                    for port in &allocated {
                        state.used.remove(port);
                    }
                    return Err(e);
                }
            }
        }

        Ok(allocated.into_iter().map(|p| p.to_string()).collect())
    }

    /// Clears all allocations and rewinds the cursor to the range start.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.next = self.min;
        state.used.clear();
    }
}
