//! Fault injection for atomicity testing.
//!
//! [`FailpointStore`] wraps any [`ReservationStore`] and makes exactly the
//! armed ledger operation fail with
//! [`SchedulerError::StorageUnavailable`]. Tests arm one step of a booking
//! or cancellation, run the call, and assert the post-state of all three
//! ledgers equals the pre-state exactly.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only happens after a panic elsewhere

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::{Arc, Mutex};
use vaxsched_core::error::{Result, SchedulerError};
use vaxsched_core::ledger::{
    AppointmentLedger, AvailabilitySet, InventoryLedger, ReservationStore, UnitOfWork,
};
use vaxsched_core::session::Role;
use vaxsched_core::types::{Appointment, AppointmentId, CaregiverId, VaccineName, VaccineStock};

/// A ledger operation that can be made to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailOp {
    /// Inventory decrement (booking step 1).
    DecrementDoses,
    /// Inventory increment (cancellation step 3).
    IncrementDoses,
    /// Availability claim (booking step 2).
    ClaimSlot,
    /// Availability release (cancellation step 3).
    ReleaseSlot,
    /// Identifier allocation (booking step 3).
    NextAppointmentId,
    /// Appointment insert (booking step 4).
    InsertAppointment,
    /// Appointment lookup (cancellation step 1).
    FindAppointment,
    /// Appointment delete (cancellation step 3).
    DeleteAppointment,
    /// The commit itself (booking/cancellation step 5).
    Commit,
}

/// Shared switch deciding which operation fails.
#[derive(Clone, Debug, Default)]
pub struct Failpoint {
    armed: Arc<Mutex<Option<FailOp>>>,
}

impl Failpoint {
    /// Create a disarmed failpoint.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `op` fail until [`disarm`](Self::disarm) is called.
    pub fn arm(&self, op: FailOp) {
        *self.armed.lock().unwrap() = Some(op);
    }

    /// Stop injecting failures.
    pub fn disarm(&self) {
        *self.armed.lock().unwrap() = None;
    }

    fn trip(&self, op: FailOp) -> Result<()> {
        if *self.armed.lock().unwrap() == Some(op) {
            return Err(SchedulerError::StorageUnavailable(format!(
                "injected failure at {op:?}"
            )));
        }
        Ok(())
    }
}

/// Store wrapper injecting failures at armed ledger operations.
#[derive(Clone, Debug)]
pub struct FailpointStore<S> {
    inner: S,
    failpoint: Failpoint,
}

impl<S> FailpointStore<S> {
    /// Wrap a store with a disarmed failpoint.
    #[must_use]
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failpoint: Failpoint::new(),
        }
    }

    /// Handle used to arm and disarm the injected failure.
    #[must_use]
    pub const fn failpoint(&self) -> &Failpoint {
        &self.failpoint
    }

    /// The wrapped store.
    pub const fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: ReservationStore> ReservationStore for FailpointStore<S> {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let inner = self.inner.begin().await?;
        Ok(Box::new(FailpointUnitOfWork {
            inner,
            failpoint: self.failpoint.clone(),
        }))
    }

    async fn list_appointments(&self, identity: &str, role: Role) -> Result<Vec<Appointment>> {
        self.inner.list_appointments(identity, role).await
    }

    async fn available_caregivers(&self, date: NaiveDate) -> Result<Vec<CaregiverId>> {
        self.inner.available_caregivers(date).await
    }

    async fn vaccine_stock(&self) -> Result<Vec<VaccineStock>> {
        self.inner.vaccine_stock().await
    }

    async fn add_doses(&self, vaccine: &VaccineName, n: u32) -> Result<()> {
        self.inner.add_doses(vaccine, n).await
    }

    async fn upload_availability(&self, caregiver: &CaregiverId, date: NaiveDate) -> Result<()> {
        self.inner.upload_availability(caregiver, date).await
    }
}

struct FailpointUnitOfWork {
    inner: Box<dyn UnitOfWork>,
    failpoint: Failpoint,
}

#[async_trait]
impl InventoryLedger for FailpointUnitOfWork {
    async fn decrement_doses(&mut self, vaccine: &VaccineName, n: u32) -> Result<()> {
        self.failpoint.trip(FailOp::DecrementDoses)?;
        self.inner.decrement_doses(vaccine, n).await
    }

    async fn increment_doses(&mut self, vaccine: &VaccineName, n: u32) -> Result<()> {
        self.failpoint.trip(FailOp::IncrementDoses)?;
        self.inner.increment_doses(vaccine, n).await
    }
}

#[async_trait]
impl AvailabilitySet for FailpointUnitOfWork {
    async fn claim_slot(&mut self, date: NaiveDate) -> Result<CaregiverId> {
        self.failpoint.trip(FailOp::ClaimSlot)?;
        self.inner.claim_slot(date).await
    }

    async fn release_slot(&mut self, caregiver: &CaregiverId, date: NaiveDate) -> Result<()> {
        self.failpoint.trip(FailOp::ReleaseSlot)?;
        self.inner.release_slot(caregiver, date).await
    }
}

#[async_trait]
impl AppointmentLedger for FailpointUnitOfWork {
    async fn next_appointment_id(&mut self) -> Result<AppointmentId> {
        self.failpoint.trip(FailOp::NextAppointmentId)?;
        self.inner.next_appointment_id().await
    }

    async fn insert_appointment(&mut self, appointment: &Appointment) -> Result<()> {
        self.failpoint.trip(FailOp::InsertAppointment)?;
        self.inner.insert_appointment(appointment).await
    }

    async fn find_appointment(&mut self, id: AppointmentId) -> Result<Appointment> {
        self.failpoint.trip(FailOp::FindAppointment)?;
        self.inner.find_appointment(id).await
    }

    async fn delete_appointment(&mut self, id: AppointmentId) -> Result<()> {
        self.failpoint.trip(FailOp::DeleteAppointment)?;
        self.inner.delete_appointment(id).await
    }
}

#[async_trait]
impl UnitOfWork for FailpointUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<()> {
        self.failpoint.trip(FailOp::Commit)?;
        self.inner.commit().await
    }
}
