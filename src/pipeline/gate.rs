//! Counting admission gate
//!
//! Bounds how many image workers run their fan-out at the same time. A
//! permit is released when it is dropped.

use parking_lot::{Condvar, Mutex};

use crate::error::{MosaicError, Result};

#[derive(Debug, Default)]
struct GateState {
    in_flight: usize,
    peak: usize,
}

/// A counting semaphore with peak instrumentation
#[derive(Debug)]
pub struct AdmissionGate {
    capacity: usize,
    state: Mutex<GateState>,
    released: Condvar,
}

impl AdmissionGate {
    /// Create a gate admitting at most `capacity` holders at once
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a capacity of zero, which would never admit anyone.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(MosaicError::InvalidArgument(
                "admission gate capacity must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            capacity,
            state: Mutex::new(GateState::default()),
            released: Condvar::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Block until a slot is free and take it
    pub fn acquire(&self) -> AdmissionPermit<'_> {
        let mut state = self.state.lock();
        while state.in_flight >= self.capacity {
            self.released.wait(&mut state);
        }
        state.in_flight += 1;
        state.peak = state.peak.max(state.in_flight);
        AdmissionPermit { gate: self }
    }

    /// Number of permits currently held
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }

    /// Highest number of permits ever held at once
    pub fn peak_in_flight(&self) -> usize {
        self.state.lock().peak
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        drop(state);
        self.released.notify_one();
    }
}

/// Slot held in an [`AdmissionGate`]; released on drop
#[derive(Debug)]
pub struct AdmissionPermit<'a> {
    gate: &'a AdmissionGate,
}

impl Drop for AdmissionPermit<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}
