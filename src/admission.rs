//! Single-slot admission control for the backend
//!
//! The backend cannot serve concurrent inference, so every synthesis call
//! holds an [`AdmissionPermit`] for its whole lifetime. The slot is handed
//! back when the permit is dropped, which covers success, errors, cancelled
//! futures and abandoned streams alike. Waiters are served in arrival order
//! (tokio's semaphore is fair).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{GateError, GateResult};

const SLOT_CAPACITY: usize = 1;

#[derive(Debug, Default)]
struct AdmissionCounters {
    acquired: AtomicU64,
    released: AtomicU64,
    waiting: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdmissionStats {
    pub in_flight: u64,
    pub waiting: u64,
    pub acquired: u64,
    pub released: u64,
}

#[derive(Debug, Clone)]
pub struct AdmissionGate {
    slot: Arc<Semaphore>,
    counters: Arc<AdmissionCounters>,
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl AdmissionGate {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Semaphore::new(SLOT_CAPACITY)),
            counters: Arc::new(AdmissionCounters::default()),
        }
    }

    /// Wait for the slot and take it.
    ///
    /// Dropping the returned future before it resolves leaves the slot
    /// untouched.
    pub async fn acquire(&self) -> GateResult<AdmissionPermit> {
        let waiting = WaitingGuard::enter(&self.counters);
        let permit = self
            .slot
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| GateError::Unexpected("admission slot closed".to_string()))?;
        drop(waiting);

        let acquired = self.counters.acquired.fetch_add(1, Ordering::SeqCst) + 1;
        log::debug!("Admission slot acquired (#{})", acquired);
        Ok(AdmissionPermit {
            _permit: permit,
            counters: self.counters.clone(),
        })
    }

    pub fn in_flight(&self) -> u64 {
        (SLOT_CAPACITY - self.slot.available_permits()) as u64
    }

    pub fn waiting(&self) -> u64 {
        self.counters.waiting.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> AdmissionStats {
        AdmissionStats {
            in_flight: self.in_flight(),
            waiting: self.waiting(),
            acquired: self.counters.acquired.load(Ordering::SeqCst),
            released: self.counters.released.load(Ordering::SeqCst),
        }
    }
}

/// Proof that the caller holds the backend slot.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
    counters: Arc<AdmissionCounters>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        let released = self.counters.released.fetch_add(1, Ordering::SeqCst) + 1;
        log::debug!("Admission slot released (#{})", released);
    }
}

struct WaitingGuard<'a>(&'a AdmissionCounters);

impl<'a> WaitingGuard<'a> {
    fn enter(counters: &'a AdmissionCounters) -> Self {
        counters.waiting.fetch_add(1, Ordering::SeqCst);
        Self(counters)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.waiting.fetch_sub(1, Ordering::SeqCst);
    }
}
