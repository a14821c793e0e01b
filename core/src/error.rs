//! Error taxonomy for scheduler operations.

use crate::types::{AppointmentId, VaccineName};
use chrono::NaiveDate;
use thiserror::Error;

/// Result type alias for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Failure taxonomy for ledger operations and coordinator calls.
///
/// Every ledger-level failure propagates up through the coordinator as a
/// single terminal outcome for the whole book/cancel call; partial success is
/// never reported and no kind is silently swallowed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    // ═══════════════════════════════════════════════════════════
    // Inventory
    // ═══════════════════════════════════════════════════════════

    /// Not enough remaining doses of the requested vaccine.
    #[error("not enough available doses of {vaccine}")]
    OutOfStock {
        /// Vaccine whose stock was exhausted.
        vaccine: VaccineName,
    },

    /// The vaccine does not exist in the catalog.
    #[error("no such vaccine: {vaccine}")]
    UnknownVaccine {
        /// Name that matched no catalog row.
        vaccine: VaccineName,
    },

    // ═══════════════════════════════════════════════════════════
    // Availability
    // ═══════════════════════════════════════════════════════════

    /// No caregiver offers a slot for the requested date.
    #[error("no caregiver is available on {date}")]
    NoSuchSlot {
        /// Date with no remaining availability.
        date: NaiveDate,
    },

    /// The identical (caregiver, date) pair is already offered.
    ///
    /// On the release path this is an invariant violation: a slot is claimed
    /// at most once before being released at most once.
    #[error("slot already present")]
    SlotAlreadyPresent,

    // ═══════════════════════════════════════════════════════════
    // Appointments
    // ═══════════════════════════════════════════════════════════

    /// An appointment with this identifier already exists.
    ///
    /// Unreachable given the identifier allocation guarantee; treated as an
    /// internal invariant violation if it ever surfaces.
    #[error("duplicate appointment id {id}")]
    DuplicateId {
        /// The colliding identifier.
        id: AppointmentId,
    },

    /// No appointment with this identifier exists.
    #[error("appointment {id} does not exist")]
    AppointmentNotFound {
        /// The identifier that matched nothing.
        id: AppointmentId,
    },

    /// The requester is neither the owning patient nor the owning caregiver.
    #[error("not authorized to cancel this appointment")]
    NotAuthorized,

    // ═══════════════════════════════════════════════════════════
    // Storage
    // ═══════════════════════════════════════════════════════════

    /// The transaction lost a conflict with a concurrent one. Retryable.
    #[error("transaction conflict, try again")]
    TransactionConflict,

    /// The storage layer failed. Fatal to the call, not to the process.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl SchedulerError {
    /// Returns `true` if retrying the whole call may succeed.
    ///
    /// # Examples
    ///
    /// ```
    /// # use vaxsched_core::SchedulerError;
    /// assert!(SchedulerError::TransactionConflict.is_retryable());
    /// assert!(!SchedulerError::NotAuthorized.is_retryable());
    /// ```
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransactionConflict)
    }

    /// Returns `true` if this kind indicates a broken internal invariant
    /// rather than a condition callers can provoke.
    #[must_use]
    pub const fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::DuplicateId { .. } | Self::SlotAlreadyPresent)
    }
}
