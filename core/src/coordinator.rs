//! The reservation coordinator.
//!
//! Orchestrates a single atomic transaction across the three ledgers to
//! realize booking and cancellation. This is the component that guarantees
//! concurrent callers never observe or produce an inconsistent cross-ledger
//! state: either every effect of a call commits together, or none of them
//! apply.

use crate::error::{Result, SchedulerError};
use crate::ledger::ReservationStore;
use crate::session::{Role, Session};
use crate::types::{Appointment, AppointmentId, Booking, PatientId, VaccineName};
use chrono::NaiveDate;

/// How many times a conflicted transaction is retried before the retryable
/// error surfaces to the caller.
pub const DEFAULT_RETRY_BUDGET: u32 = 5;

/// Executes book and cancel as single atomic, multi-ledger transactions.
///
/// The coordinator owns the retry loop for optimistic-concurrency conflicts;
/// callers observe only final success or a terminal error, never a partial
/// result.
#[derive(Clone, Debug)]
pub struct ReservationCoordinator<S> {
    store: S,
    retry_budget: u32,
}

impl<S: ReservationStore> ReservationCoordinator<S> {
    /// Create a coordinator over a store with the default retry budget.
    #[must_use]
    pub const fn new(store: S) -> Self {
        Self {
            store,
            retry_budget: DEFAULT_RETRY_BUDGET,
        }
    }

    /// Override the conflict retry budget.
    #[must_use]
    pub const fn with_retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = budget;
        self
    }

    /// Access the underlying store (read paths, collaborator operations).
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Book an appointment for a patient: consume one dose of `vaccine`,
    /// claim the minimum available caregiver for `date`, and record the
    /// appointment under a freshly allocated identifier, all in one
    /// transaction.
    ///
    /// The session layer has already established that the caller is an
    /// authenticated patient; the session's identity becomes the appointment
    /// owner.
    ///
    /// # Errors
    ///
    /// [`UnknownVaccine`], [`OutOfStock`] (inventory is checked first),
    /// [`NoSuchSlot`], [`TransactionConflict`] once the retry budget is
    /// exhausted, or [`StorageUnavailable`]. On any error the store is
    /// exactly as it was before the call.
    ///
    /// [`UnknownVaccine`]: SchedulerError::UnknownVaccine
    /// [`OutOfStock`]: SchedulerError::OutOfStock
    /// [`NoSuchSlot`]: SchedulerError::NoSuchSlot
    /// [`TransactionConflict`]: SchedulerError::TransactionConflict
    /// [`StorageUnavailable`]: SchedulerError::StorageUnavailable
    #[tracing::instrument(skip(self, session), fields(patient = %session.identity, %date, %vaccine))]
    pub async fn book(
        &self,
        session: &Session,
        date: NaiveDate,
        vaccine: &VaccineName,
    ) -> Result<Booking> {
        let mut attempt = 0;
        loop {
            match self.try_book(session, date, vaccine).await {
                Err(err) if err.is_retryable() && attempt < self.retry_budget => {
                    attempt += 1;
                    tracing::warn!(attempt, "booking transaction conflicted, retrying");
                }
                outcome => return outcome,
            }
        }
    }

    /// Cancel an appointment: delete the record, release the slot back into
    /// the availability set, and return the dose to inventory, all in one
    /// transaction, the mirror image of [`book`](Self::book).
    ///
    /// # Errors
    ///
    /// [`AppointmentNotFound`], [`NotAuthorized`] if the session is neither
    /// the owning patient nor the owning caregiver, [`TransactionConflict`]
    /// once the retry budget is exhausted, or [`StorageUnavailable`]. On any
    /// error none of the three effects apply.
    ///
    /// [`AppointmentNotFound`]: SchedulerError::AppointmentNotFound
    /// [`NotAuthorized`]: SchedulerError::NotAuthorized
    /// [`TransactionConflict`]: SchedulerError::TransactionConflict
    /// [`StorageUnavailable`]: SchedulerError::StorageUnavailable
    #[tracing::instrument(skip(self, session), fields(requester = %session.identity, role = %session.role, %id))]
    pub async fn cancel(&self, session: &Session, id: AppointmentId) -> Result<()> {
        let mut attempt = 0;
        loop {
            match self.try_cancel(session, id).await {
                Err(err) if err.is_retryable() && attempt < self.retry_budget => {
                    attempt += 1;
                    tracing::warn!(attempt, "cancellation transaction conflicted, retrying");
                }
                outcome => return outcome,
            }
        }
    }

    /// All appointments the session's identity is party to, ordered by
    /// identifier ascending.
    ///
    /// # Errors
    ///
    /// [`StorageUnavailable`](SchedulerError::StorageUnavailable) on query
    /// failure.
    pub async fn list_appointments(&self, session: &Session) -> Result<Vec<Appointment>> {
        self.store
            .list_appointments(&session.identity, session.role)
            .await
    }

    async fn try_book(
        &self,
        session: &Session,
        date: NaiveDate,
        vaccine: &VaccineName,
    ) -> Result<Booking> {
        let mut uow = self.store.begin().await?;
        // Inventory is the first check: a dose shortage reports OutOfStock
        // even when the date also has no slot left.
        uow.decrement_doses(vaccine, 1).await?;
        let caregiver = uow.claim_slot(date).await?;
        let id = uow.next_appointment_id().await?;
        let appointment = Appointment {
            id,
            patient: PatientId::new(session.identity.clone()),
            caregiver: caregiver.clone(),
            vaccine: vaccine.clone(),
            date,
        };
        uow.insert_appointment(&appointment).await?;
        uow.commit().await?;
        tracing::info!(appointment = %id, caregiver = %caregiver, "appointment booked");
        Ok(Booking {
            appointment_id: id,
            caregiver,
        })
    }

    async fn try_cancel(&self, session: &Session, id: AppointmentId) -> Result<()> {
        let mut uow = self.store.begin().await?;
        let appointment = uow.find_appointment(id).await?;
        let authorized = match session.role {
            Role::Patient => appointment.patient.as_str() == session.identity,
            Role::Caregiver => appointment.caregiver.as_str() == session.identity,
        };
        if !authorized {
            return Err(SchedulerError::NotAuthorized);
        }
        uow.delete_appointment(id).await?;
        uow.release_slot(&appointment.caregiver, appointment.date)
            .await?;
        uow.increment_doses(&appointment.vaccine, 1).await?;
        uow.commit().await?;
        tracing::info!(appointment = %id, "appointment cancelled");
        Ok(())
    }
}
