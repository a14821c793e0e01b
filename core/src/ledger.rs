//! Ledger traits and the store abstraction.
//!
//! # Design
//!
//! Three ledgers own the scheduler's mutable state: inventory (per-vaccine
//! dose counters), availability (the set of offered slots), and appointments
//! (booked records keyed by unique identifier). All three are mutated only
//! inside a [`UnitOfWork`], one atomic transaction spanning the ledgers,
//! obtained from a [`ReservationStore`]. Dropping a unit of work without
//! committing discards every mutation staged in it.
//!
//! Read paths and the collaborator write paths (catalog top-ups, availability
//! uploads) live on the store itself: they are single-statement operations
//! that never span more than one ledger.
//!
//! # Implementations
//!
//! - `PostgresStore` (in `vaxsched-postgres`): serializable transactions on
//!   PostgreSQL, sequence-backed identifier allocation.
//! - `MemoryStore` (in `vaxsched-testing`): staged-copy transactions with
//!   optimistic-concurrency commit, for tests and demos.

use crate::error::Result;
use crate::session::Role;
use crate::types::{Appointment, AppointmentId, CaregiverId, VaccineName, VaccineStock};
use async_trait::async_trait;
use chrono::NaiveDate;

/// Per-vaccine dose counters.
#[async_trait]
pub trait InventoryLedger: Send {
    /// Consume `n` doses of a vaccine.
    ///
    /// # Errors
    ///
    /// [`OutOfStock`](crate::SchedulerError::OutOfStock) if fewer than `n`
    /// doses remain, [`UnknownVaccine`](crate::SchedulerError::UnknownVaccine)
    /// if the vaccine has no catalog row. The check and the write happen
    /// inside the open transaction; other transactions never observe a
    /// read-then-later-write gap.
    async fn decrement_doses(&mut self, vaccine: &VaccineName, n: u32) -> Result<()>;

    /// Return `n` doses of a vaccine.
    ///
    /// # Errors
    ///
    /// [`UnknownVaccine`](crate::SchedulerError::UnknownVaccine) if the
    /// vaccine has no catalog row; creating one is a catalog concern, not a
    /// ledger concern.
    async fn increment_doses(&mut self, vaccine: &VaccineName, n: u32) -> Result<()>;
}

/// The set of (caregiver, date) slots currently offered.
#[async_trait]
pub trait AvailabilitySet: Send {
    /// Atomically remove and return one slot for `date`.
    ///
    /// When multiple caregivers offer the date, the minimum caregiver
    /// identifier in ascending lexical order is selected, the same order the
    /// read-only schedule listing uses, so a prior availability query is
    /// consistent with who actually gets booked.
    ///
    /// # Errors
    ///
    /// [`NoSuchSlot`](crate::SchedulerError::NoSuchSlot) if no caregiver
    /// offers the date.
    async fn claim_slot(&mut self, date: NaiveDate) -> Result<CaregiverId>;

    /// Re-insert a previously claimed slot.
    ///
    /// # Errors
    ///
    /// [`SlotAlreadyPresent`](crate::SchedulerError::SlotAlreadyPresent) if
    /// the identical pair is already offered, which indicates a broken
    /// claim/release pairing.
    async fn release_slot(&mut self, caregiver: &CaregiverId, date: NaiveDate) -> Result<()>;
}

/// Booked appointments keyed by unique identifier.
#[async_trait]
pub trait AppointmentLedger: Send {
    /// Allocate an identifier unique against every identifier ever issued.
    ///
    /// Implementations must not read a maximum and add one outside the
    /// transaction: two concurrent bookings would read the same maximum and
    /// collide. Either a transactionally safe sequence primitive or an
    /// atomic, retry-on-conflict read-modify-insert is required.
    ///
    /// # Errors
    ///
    /// [`StorageUnavailable`](crate::SchedulerError::StorageUnavailable) if
    /// the allocation primitive fails.
    async fn next_appointment_id(&mut self) -> Result<AppointmentId>;

    /// Insert a new appointment record.
    ///
    /// # Errors
    ///
    /// [`DuplicateId`](crate::SchedulerError::DuplicateId) if the identifier
    /// already exists (unreachable given [`next_appointment_id`], so an
    /// internal invariant violation).
    ///
    /// [`next_appointment_id`]: AppointmentLedger::next_appointment_id
    async fn insert_appointment(&mut self, appointment: &Appointment) -> Result<()>;

    /// Look up an appointment by identifier.
    ///
    /// # Errors
    ///
    /// [`AppointmentNotFound`](crate::SchedulerError::AppointmentNotFound) if
    /// absent.
    async fn find_appointment(&mut self, id: AppointmentId) -> Result<Appointment>;

    /// Remove an appointment by identifier.
    ///
    /// # Errors
    ///
    /// [`AppointmentNotFound`](crate::SchedulerError::AppointmentNotFound) if
    /// absent.
    async fn delete_appointment(&mut self, id: AppointmentId) -> Result<()>;
}

/// One atomic transaction spanning all three ledgers.
///
/// Obtained from [`ReservationStore::begin`]. Either [`commit`] publishes
/// every staged mutation together, or the unit of work is dropped and none of
/// them apply; there is no partial outcome.
///
/// [`commit`]: UnitOfWork::commit
#[async_trait]
pub trait UnitOfWork: InventoryLedger + AvailabilitySet + AppointmentLedger + Send {
    /// Commit every mutation staged in this unit of work.
    ///
    /// # Errors
    ///
    /// [`TransactionConflict`](crate::SchedulerError::TransactionConflict) if
    /// a concurrent transaction won a conflicting write (retry the whole
    /// call), or [`StorageUnavailable`](crate::SchedulerError::StorageUnavailable)
    /// for storage-level failures. Either way no staged mutation applies.
    async fn commit(self: Box<Self>) -> Result<()>;
}

/// Storage backend: transactions plus the read and collaborator paths.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one store is shared by every
/// concurrent caller session.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Open a unit of work spanning the three ledgers.
    ///
    /// # Errors
    ///
    /// [`StorageUnavailable`](crate::SchedulerError::StorageUnavailable) if a
    /// transaction cannot be started.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;

    /// All appointments where `identity` matches the patient (for
    /// [`Role::Patient`]) or the caregiver (for [`Role::Caregiver`]), ordered
    /// by identifier ascending.
    ///
    /// # Errors
    ///
    /// [`StorageUnavailable`](crate::SchedulerError::StorageUnavailable) on
    /// query failure.
    async fn list_appointments(&self, identity: &str, role: Role) -> Result<Vec<Appointment>>;

    /// Caregivers offering `date`, in ascending lexical order.
    ///
    /// # Errors
    ///
    /// [`StorageUnavailable`](crate::SchedulerError::StorageUnavailable) on
    /// query failure.
    async fn available_caregivers(&self, date: NaiveDate) -> Result<Vec<CaregiverId>>;

    /// The full vaccine catalog with remaining dose counts, ascending by
    /// name.
    ///
    /// # Errors
    ///
    /// [`StorageUnavailable`](crate::SchedulerError::StorageUnavailable) on
    /// query failure.
    async fn vaccine_stock(&self) -> Result<Vec<VaccineStock>>;

    /// Catalog top-up: add `n` doses, creating the stock row if the vaccine
    /// is new. Runs outside of booking transactions.
    ///
    /// # Errors
    ///
    /// [`StorageUnavailable`](crate::SchedulerError::StorageUnavailable) on
    /// write failure.
    async fn add_doses(&self, vaccine: &VaccineName, n: u32) -> Result<()>;

    /// Publish a (caregiver, date) slot.
    ///
    /// # Errors
    ///
    /// [`SlotAlreadyPresent`](crate::SchedulerError::SlotAlreadyPresent) if
    /// the caregiver already offers that date, or
    /// [`StorageUnavailable`](crate::SchedulerError::StorageUnavailable) on
    /// write failure.
    async fn upload_availability(&self, caregiver: &CaregiverId, date: NaiveDate) -> Result<()>;
}
