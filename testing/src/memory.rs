//! In-memory reservation store with optimistic-concurrency commit.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only happens after a panic elsewhere

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use vaxsched_core::error::{Result, SchedulerError};
use vaxsched_core::ledger::{
    AppointmentLedger, AvailabilitySet, InventoryLedger, ReservationStore, UnitOfWork,
};
use vaxsched_core::session::Role;
use vaxsched_core::types::{Appointment, AppointmentId, CaregiverId, VaccineName, VaccineStock};

/// The three ledgers as plain collections.
///
/// Slots are keyed (date, caregiver) so that for a given date the first
/// entry in iteration order is the minimum caregiver identifier, which is
/// the deterministic claim tie-break.
#[derive(Clone, Debug)]
struct Ledgers {
    vaccines: BTreeMap<VaccineName, u32>,
    slots: BTreeSet<(NaiveDate, CaregiverId)>,
    appointments: BTreeMap<AppointmentId, Appointment>,
    next_id: i64,
}

impl Default for Ledgers {
    fn default() -> Self {
        Self {
            vaccines: BTreeMap::new(),
            slots: BTreeSet::new(),
            appointments: BTreeMap::new(),
            next_id: 1,
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    ledgers: Ledgers,
    version: u64,
}

/// In-memory [`ReservationStore`] for fast, deterministic testing.
///
/// A unit of work stages a copy of the ledgers and commits it only if no
/// other transaction committed in between; the loser gets
/// [`SchedulerError::TransactionConflict`] and the coordinator's retry loop
/// re-reads fresh state. This mirrors the optimistic-concurrency behavior of
/// the PostgreSQL backend closely enough to exercise every concurrency
/// property without a database.
///
/// Cloning is cheap and every clone shares the same ledgers.
///
/// # Example
///
/// ```
/// use vaxsched_testing::MemoryStore;
/// use vaxsched_core::{ReservationStore, VaccineName};
///
/// # async fn example() -> vaxsched_core::Result<()> {
/// let store = MemoryStore::new();
/// store.add_doses(&VaccineName::new("Pfizer"), 10).await?;
/// assert_eq!(store.doses(&VaccineName::new("Pfizer")), Some(10));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Shared>>,
}

impl MemoryStore {
    /// Create a new store with empty ledgers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining doses of a vaccine, or `None` if it has no catalog row.
    #[must_use]
    pub fn doses(&self, vaccine: &VaccineName) -> Option<u32> {
        self.inner.lock().unwrap().ledgers.vaccines.get(vaccine).copied()
    }

    /// Whether the (caregiver, date) slot is currently offered.
    #[must_use]
    pub fn has_slot(&self, caregiver: &CaregiverId, date: NaiveDate) -> bool {
        self.inner
            .lock()
            .unwrap()
            .ledgers
            .slots
            .contains(&(date, caregiver.clone()))
    }

    /// Number of outstanding appointments.
    #[must_use]
    pub fn appointment_count(&self) -> usize {
        self.inner.lock().unwrap().ledgers.appointments.len()
    }

    /// Every outstanding appointment, ordered by identifier ascending.
    #[must_use]
    pub fn appointments(&self) -> Vec<Appointment> {
        self.inner
            .lock()
            .unwrap()
            .ledgers
            .appointments
            .values()
            .cloned()
            .collect()
    }

    /// Number of offered slots.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.inner.lock().unwrap().ledgers.slots.len()
    }

    /// Drop all ledger state (for test isolation).
    pub fn clear(&self) {
        let mut shared = self.inner.lock().unwrap();
        shared.ledgers = Ledgers::default();
        shared.version += 1;
    }
}

#[async_trait]
impl ReservationStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let shared = self.inner.lock().unwrap();
        Ok(Box::new(MemoryUnitOfWork {
            store: Arc::clone(&self.inner),
            staged: shared.ledgers.clone(),
            base_version: shared.version,
        }))
    }

    async fn list_appointments(&self, identity: &str, role: Role) -> Result<Vec<Appointment>> {
        let shared = self.inner.lock().unwrap();
        // BTreeMap iteration yields ascending identifiers.
        Ok(shared
            .ledgers
            .appointments
            .values()
            .filter(|a| match role {
                Role::Patient => a.patient.as_str() == identity,
                Role::Caregiver => a.caregiver.as_str() == identity,
            })
            .cloned()
            .collect())
    }

    async fn available_caregivers(&self, date: NaiveDate) -> Result<Vec<CaregiverId>> {
        let shared = self.inner.lock().unwrap();
        Ok(shared
            .ledgers
            .slots
            .iter()
            .filter(|(d, _)| *d == date)
            .map(|(_, caregiver)| caregiver.clone())
            .collect())
    }

    async fn vaccine_stock(&self) -> Result<Vec<VaccineStock>> {
        let shared = self.inner.lock().unwrap();
        Ok(shared
            .ledgers
            .vaccines
            .iter()
            .map(|(name, doses)| VaccineStock {
                name: name.clone(),
                doses: *doses,
            })
            .collect())
    }

    async fn add_doses(&self, vaccine: &VaccineName, n: u32) -> Result<()> {
        let mut shared = self.inner.lock().unwrap();
        *shared.ledgers.vaccines.entry(vaccine.clone()).or_insert(0) += n;
        shared.version += 1;
        Ok(())
    }

    async fn upload_availability(&self, caregiver: &CaregiverId, date: NaiveDate) -> Result<()> {
        let mut shared = self.inner.lock().unwrap();
        if !shared.ledgers.slots.insert((date, caregiver.clone())) {
            return Err(SchedulerError::SlotAlreadyPresent);
        }
        shared.version += 1;
        Ok(())
    }
}

/// A staged copy of the ledgers plus the version it was taken at.
#[derive(Debug)]
struct MemoryUnitOfWork {
    store: Arc<Mutex<Shared>>,
    staged: Ledgers,
    base_version: u64,
}

#[async_trait]
impl InventoryLedger for MemoryUnitOfWork {
    async fn decrement_doses(&mut self, vaccine: &VaccineName, n: u32) -> Result<()> {
        match self.staged.vaccines.get_mut(vaccine) {
            None => Err(SchedulerError::UnknownVaccine {
                vaccine: vaccine.clone(),
            }),
            Some(doses) if *doses < n => Err(SchedulerError::OutOfStock {
                vaccine: vaccine.clone(),
            }),
            Some(doses) => {
                *doses -= n;
                Ok(())
            }
        }
    }

    async fn increment_doses(&mut self, vaccine: &VaccineName, n: u32) -> Result<()> {
        match self.staged.vaccines.get_mut(vaccine) {
            None => Err(SchedulerError::UnknownVaccine {
                vaccine: vaccine.clone(),
            }),
            Some(doses) => {
                *doses += n;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl AvailabilitySet for MemoryUnitOfWork {
    async fn claim_slot(&mut self, date: NaiveDate) -> Result<CaregiverId> {
        let start = (date, CaregiverId::new(""));
        let found = self
            .staged
            .slots
            .range(start..)
            .next()
            .filter(|slot| slot.0 == date)
            .cloned();
        match found {
            Some(slot) => {
                self.staged.slots.remove(&slot);
                Ok(slot.1)
            }
            None => Err(SchedulerError::NoSuchSlot { date }),
        }
    }

    async fn release_slot(&mut self, caregiver: &CaregiverId, date: NaiveDate) -> Result<()> {
        if !self.staged.slots.insert((date, caregiver.clone())) {
            return Err(SchedulerError::SlotAlreadyPresent);
        }
        Ok(())
    }
}

#[async_trait]
impl AppointmentLedger for MemoryUnitOfWork {
    async fn next_appointment_id(&mut self) -> Result<AppointmentId> {
        // Allocated from the staged snapshot: if another transaction commits
        // first, this one conflicts at commit and re-allocates on retry, so
        // committed identifiers never collide.
        let id = self.staged.next_id;
        self.staged.next_id += 1;
        Ok(AppointmentId::from_i64(id))
    }

    async fn insert_appointment(&mut self, appointment: &Appointment) -> Result<()> {
        if self.staged.appointments.contains_key(&appointment.id) {
            return Err(SchedulerError::DuplicateId { id: appointment.id });
        }
        self.staged
            .appointments
            .insert(appointment.id, appointment.clone());
        Ok(())
    }

    async fn find_appointment(&mut self, id: AppointmentId) -> Result<Appointment> {
        self.staged
            .appointments
            .get(&id)
            .cloned()
            .ok_or(SchedulerError::AppointmentNotFound { id })
    }

    async fn delete_appointment(&mut self, id: AppointmentId) -> Result<()> {
        self.staged
            .appointments
            .remove(&id)
            .map(|_| ())
            .ok_or(SchedulerError::AppointmentNotFound { id })
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<()> {
        let mut shared = self.store.lock().unwrap();
        if shared.version != self.base_version {
            return Err(SchedulerError::TransactionConflict);
        }
        shared.ledgers = self.staged;
        shared.version += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn claim_picks_minimum_caregiver() {
        let store = MemoryStore::new();
        let day = date("2024-07-01");
        store
            .upload_availability(&CaregiverId::new("bob"), day)
            .await
            .unwrap();
        store
            .upload_availability(&CaregiverId::new("alice"), day)
            .await
            .unwrap();

        let mut uow = store.begin().await.unwrap();
        let claimed = uow.claim_slot(day).await.unwrap();
        uow.commit().await.unwrap();

        assert_eq!(claimed, CaregiverId::new("alice"));
        assert!(store.has_slot(&CaregiverId::new("bob"), day));
        assert!(!store.has_slot(&CaregiverId::new("alice"), day));
    }

    #[tokio::test]
    async fn claim_ignores_other_dates() {
        let store = MemoryStore::new();
        store
            .upload_availability(&CaregiverId::new("alice"), date("2024-07-02"))
            .await
            .unwrap();

        let mut uow = store.begin().await.unwrap();
        let err = uow.claim_slot(date("2024-07-01")).await.unwrap_err();
        assert_eq!(
            err,
            SchedulerError::NoSuchSlot {
                date: date("2024-07-01")
            }
        );
    }

    #[tokio::test]
    async fn decrement_rejects_rather_than_clamps() {
        let store = MemoryStore::new();
        let pfizer = VaccineName::new("Pfizer");
        store.add_doses(&pfizer, 1).await.unwrap();

        let mut uow = store.begin().await.unwrap();
        let err = uow.decrement_doses(&pfizer, 2).await.unwrap_err();
        assert_eq!(
            err,
            SchedulerError::OutOfStock {
                vaccine: pfizer.clone()
            }
        );
        // The staged ledger is untouched by the rejected decrement.
        drop(uow);
        assert_eq!(store.doses(&pfizer), Some(1));
    }

    #[tokio::test]
    async fn concurrent_commit_conflicts() {
        let store = MemoryStore::new();
        let pfizer = VaccineName::new("Pfizer");
        store.add_doses(&pfizer, 5).await.unwrap();

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        first.decrement_doses(&pfizer, 1).await.unwrap();
        second.decrement_doses(&pfizer, 1).await.unwrap();

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert_eq!(err, SchedulerError::TransactionConflict);
        assert_eq!(store.doses(&pfizer), Some(4));
    }

    #[tokio::test]
    async fn dropped_unit_of_work_leaves_no_trace() {
        let store = MemoryStore::new();
        let pfizer = VaccineName::new("Pfizer");
        store.add_doses(&pfizer, 3).await.unwrap();

        let mut uow = store.begin().await.unwrap();
        uow.decrement_doses(&pfizer, 3).await.unwrap();
        drop(uow);

        assert_eq!(store.doses(&pfizer), Some(3));
    }

    #[tokio::test]
    async fn duplicate_upload_is_rejected() {
        let store = MemoryStore::new();
        let alice = CaregiverId::new("alice");
        let day = date("2024-07-01");
        store.upload_availability(&alice, day).await.unwrap();
        let err = store.upload_availability(&alice, day).await.unwrap_err();
        assert_eq!(err, SchedulerError::SlotAlreadyPresent);
    }
}
