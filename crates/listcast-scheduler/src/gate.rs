//! Single-slot admission gate.
//!
//! The gate holds at most one job. Admission hands out a [`Ticket`], and only
//! that ticket can put state into the slot or clear it again.

use listcast_core::{Error, JobId, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

struct Occupant<T> {
    job_id: JobId,
    value: Option<T>,
}

/// Tracks whether the job slot is occupied.
///
/// `T` is whatever the owner attaches to the slot so that other callers can
/// reach the running job (the orchestrator attaches its job runtime).
pub struct AdmissionGate<T> {
    slot: Arc<Mutex<Option<Occupant<T>>>>,
}

impl<T> Clone for AdmissionGate<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

impl<T> Default for AdmissionGate<T> {
    fn default() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }
}

impl<T: Clone> AdmissionGate<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Occupant<T>>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claim the slot for `job_id`, or fail with [`Error::Busy`].
    pub fn try_acquire(&self, job_id: JobId) -> Result<Ticket<T>> {
        let mut slot = self.lock();
        if slot.is_some() {
            return Err(Error::Busy);
        }
        *slot = Some(Occupant {
            job_id,
            value: None,
        });

        Ok(Ticket {
            job_id,
            gate: self.clone(),
            released: AtomicBool::new(false),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.lock().is_some()
    }

    /// Id of the job currently holding the slot.
    pub fn active_job(&self) -> Option<JobId> {
        self.lock().as_ref().map(|o| o.job_id)
    }

    /// The value attached by the current occupant, if any.
    pub fn active(&self) -> Option<T> {
        self.lock().as_ref().and_then(|o| o.value.clone())
    }
}

/// Exclusive ownership of the occupied slot.
///
/// Releasing is idempotent, and dropping an unreleased ticket releases it.
pub struct Ticket<T: Clone> {
    job_id: JobId,
    gate: AdmissionGate<T>,
    released: AtomicBool,
}

impl<T: Clone> Ticket<T> {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Attach `value` to the slot while this ticket still owns it.
    pub fn attach(&self, value: T) -> bool {
        let mut slot = self.gate.lock();
        match slot.as_mut() {
            Some(occupant) if occupant.job_id == self.job_id => {
                occupant.value = Some(value);
                true
            }
            _ => false,
        }
    }

    /// Clear the slot. Returns `true` only for the call that freed it.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }

        let mut slot = self.gate.lock();
        match slot.as_ref() {
            Some(occupant) if occupant.job_id == self.job_id => {
                // Take the attached value out before dropping it outside the lock.
                let occupant = slot.take();
                drop(slot);
                drop(occupant);
                true
            }
            _ => false,
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl<T: Clone> Drop for Ticket<T> {
    fn drop(&mut self) {
        self.release();
    }
}
