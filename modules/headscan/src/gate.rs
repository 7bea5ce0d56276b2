use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{PipelineError, Result};

/// Counting admission gate bounding how many extraction units run at once.
///
/// Cloning shares the same slots. Waiters are admitted in arrival order.
/// A slot is released when its [`GatePermit`] drops, on every exit path.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    slots: Arc<Semaphore>,
    capacity: usize,
}

/// One occupied slot.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionGate {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(PipelineError::Gate("capacity must be at least 1".into()));
        }
        if capacity > Semaphore::MAX_PERMITS {
            return Err(PipelineError::Gate(format!(
                "capacity {capacity} exceeds {}",
                Semaphore::MAX_PERMITS
            )));
        }
        Ok(Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently held.
    pub fn in_use(&self) -> usize {
        self.capacity - self.slots.available_permits()
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> Result<GatePermit> {
        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PipelineError::Gate("gate closed".into()))?;
        Ok(GatePermit { _permit: permit })
    }

    /// Stop admitting. Pending and future `acquire` calls fail.
    pub fn close(&self) {
        self.slots.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(AdmissionGate::new(0), Err(PipelineError::Gate(_))));
    }

    #[tokio::test]
    async fn permits_release_on_drop() {
        let gate = AdmissionGate::new(2).unwrap();
        assert_eq!(gate.capacity(), 2);
        let a = gate.acquire().await.unwrap();
        let _b = gate.acquire().await.unwrap();
        assert_eq!(gate.in_use(), 2);

        drop(a);
        assert_eq!(gate.in_use(), 1);
    }

    #[tokio::test]
    async fn clones_share_slots() {
        let gate = AdmissionGate::new(1).unwrap();
        let other = gate.clone();
        let _held = gate.acquire().await.unwrap();
        assert_eq!(other.in_use(), 1);

        let pending = tokio::time::timeout(std::time::Duration::from_millis(20), other.acquire()).await;
        assert!(pending.is_err(), "second acquire should wait while the slot is held");
    }

    #[tokio::test]
    async fn closed_gate_refuses_admission() {
        let gate = AdmissionGate::new(1).unwrap();
        gate.close();
        assert!(matches!(gate.acquire().await, Err(PipelineError::Gate(_))));
    }
}
