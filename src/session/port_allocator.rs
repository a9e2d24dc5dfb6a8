//! Port allocation for engine servers.

use crate::config::{DEFAULT_BASE_PORT, DEFAULT_MAX_PORT};
use std::sync::Mutex;

/// Hands out strictly increasing ports; a port is never issued twice.
pub struct PortAllocator {
    /// First port (inclusive).
    base_port: u16,
    /// Last port (inclusive).
    max_port: u16,
    /// Next port to issue. Wider than `u16` so exhaustion past 65535 is representable.
    next: Mutex<u32>,
}

impl PortAllocator {
    /// Create a new port allocator issuing `base_port..=max_port`.
    pub fn new(base_port: u16, max_port: u16) -> Self {
        Self {
            base_port,
            max_port,
            next: Mutex::new(u32::from(base_port)),
        }
    }

    /// Allocate the next port.
    ///
    /// Returns `None` once the range is exhausted.
    pub fn allocate(&self) -> Option<u16> {
        let mut next = self.next.lock().unwrap_or_else(|e| e.into_inner());
        if *next > u32::from(self.max_port) {
            return None;
        }
        let port = u16::try_from(*next).ok()?;
        *next += 1;
        Some(port)
    }

    /// The port the next call to [`allocate`](Self::allocate) would return.
    pub fn peek(&self) -> Option<u16> {
        let next = self.next.lock().unwrap_or_else(|e| e.into_inner());
        if *next > u32::from(self.max_port) {
            return None;
        }
        u16::try_from(*next).ok()
    }

    /// Get the number of ports issued so far.
    pub fn allocated_count(&self) -> usize {
        let next = self.next.lock().unwrap_or_else(|e| e.into_inner());
        (*next - u32::from(self.base_port)) as usize
    }

    /// Get the number of ports left in the range.
    pub fn available_count(&self) -> usize {
        let total = (u32::from(self.max_port) + 1).saturating_sub(u32::from(self.base_port)) as usize;
        total.saturating_sub(self.allocated_count())
    }
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_PORT, DEFAULT_MAX_PORT)
    }
}
