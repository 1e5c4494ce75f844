//! ONVIF port allocation.
//!
//! Hands out the lowest free port in a fixed pool, skipping ports the
//! rest of the gateway already occupies (RTSP, HLS, control API, web
//! UI). Assignments are persisted by the caller through the config
//! store, so allocation after a restart is deterministic.

use std::collections::BTreeSet;
use std::ops::RangeInclusive;

use thiserror::Error;

/// Pool of ports available for ONVIF endpoints.
pub const ONVIF_PORT_RANGE: RangeInclusive<u16> = 8001..=8100;

#[derive(Debug, Error)]
pub enum PortAllocError {
    #[error("no free ONVIF port left in {}..={}", ONVIF_PORT_RANGE.start(), ONVIF_PORT_RANGE.end())]
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct PortAllocator {
    reserved: BTreeSet<u16>,
}

impl PortAllocator {
    /// Build an allocator around a reserved set the pool must avoid.
    pub fn new(reserved: impl IntoIterator<Item = u16>) -> Self {
        Self {
            reserved: reserved.into_iter().collect(),
        }
    }

    /// Lowest free port given the ports already assigned to cameras.
    pub fn allocate(&self, in_use: &[u16]) -> Result<u16, PortAllocError> {
        let in_use: BTreeSet<u16> = in_use.iter().copied().collect();
        ONVIF_PORT_RANGE
            .clone()
            .find(|p| !in_use.contains(p) && !self.reserved.contains(p))
            .ok_or(PortAllocError::Exhausted)
    }

    /// Whether a caller-chosen port is acceptable for a new assignment.
    pub fn is_available(&self, port: u16, in_use: &[u16]) -> bool {
        !self.reserved.contains(&port) && !in_use.contains(&port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocates_lowest_free() {
        let alloc = PortAllocator::new([8554, 8888, 9997, 5552]);
        assert_eq!(alloc.allocate(&[]).unwrap(), 8001);
        assert_eq!(alloc.allocate(&[8001]).unwrap(), 8002);
        assert_eq!(alloc.allocate(&[8001, 8003]).unwrap(), 8002);
    }

    #[test]
    fn test_skips_reserved() {
        let alloc = PortAllocator::new([8001, 8002]);
        assert_eq!(alloc.allocate(&[]).unwrap(), 8003);
    }

    #[test]
    fn test_exhaustion() {
        let alloc = PortAllocator::new([]);
        let all: Vec<u16> = ONVIF_PORT_RANGE.collect();
        assert!(matches!(
            alloc.allocate(&all),
            Err(PortAllocError::Exhausted)
        ));
    }

    #[test]
    fn test_allocation_is_injective() {
        let alloc = PortAllocator::new([8554]);
        let mut assigned = Vec::new();
        for _ in 0..100 {
            let port = alloc.allocate(&assigned).unwrap();
            assert!(!assigned.contains(&port));
            assert_ne!(port, 8554);
            assigned.push(port);
        }
        assert!(matches!(
            alloc.allocate(&assigned),
            Err(PortAllocError::Exhausted)
        ));
    }

    #[test]
    fn test_is_available() {
        let alloc = PortAllocator::new([8554]);
        assert!(alloc.is_available(8010, &[8001]));
        assert!(!alloc.is_available(8001, &[8001]));
        assert!(!alloc.is_available(8554, &[]));
    }
}
