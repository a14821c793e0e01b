//! Domain types for the vaccine appointment scheduler.
//!
//! This module contains the value objects and entities shared by every
//! backend: identifiers for patients, caregivers and vaccines, the three
//! ledger records (stock, slot, appointment), and the result of a successful
//! booking.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for an appointment.
///
/// Wraps the integral value allocated by the storage layer's sequence.
/// Uniqueness across the ledger's lifetime is the hard invariant; ascending
/// allocation is provided by the backends but not relied upon.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AppointmentId(i64);

impl AppointmentId {
    /// Create an `AppointmentId` from a raw sequence value.
    #[must_use]
    pub const fn from_i64(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner value.
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for AppointmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a registered patient.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PatientId(String);

impl PatientId {
    /// Create a `PatientId` from a username.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the username as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a registered caregiver.
///
/// Ordering is the ascending lexical order used both by the schedule listing
/// and by the availability claim tie-break, so what a client sees in a prior
/// availability query is consistent with who actually gets booked.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CaregiverId(String);

impl CaregiverId {
    /// Create a `CaregiverId` from a username.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the username as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CaregiverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of a vaccine in the catalog (unique key).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VaccineName(String);

impl VaccineName {
    /// Create a `VaccineName`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VaccineName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Ledger records
// ============================================================================

/// Per-vaccine dose counter owned by the inventory ledger.
///
/// `doses` is unsigned: a decrement below zero is rejected by the ledger,
/// never clamped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaccineStock {
    /// Vaccine name (unique key).
    pub name: VaccineName,
    /// Remaining dose count.
    pub doses: u32,
}

/// An offered (caregiver, date) pairing available for booking.
///
/// Created by a caregiver's upload, consumed by a successful booking, and
/// re-created by a successful cancellation. Uniqueness on the pair.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    /// Caregiver offering the slot.
    pub caregiver: CaregiverId,
    /// Calendar date of the slot.
    pub date: NaiveDate,
}

/// A booked appointment.
///
/// Created only inside a successful booking transaction; destroyed only
/// inside a successful cancellation transaction by its owning patient or
/// caregiver.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    /// Unique appointment identifier.
    pub id: AppointmentId,
    /// Patient who holds the appointment.
    pub patient: PatientId,
    /// Caregiver assigned to the appointment.
    pub caregiver: CaregiverId,
    /// Vaccine whose dose the appointment consumes.
    pub vaccine: VaccineName,
    /// Calendar date of the appointment.
    pub date: NaiveDate,
}

// ============================================================================
// Call results
// ============================================================================

/// Result of a successful booking: the allocated appointment identifier and
/// the caregiver the patient was matched with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Allocated appointment identifier.
    pub appointment_id: AppointmentId,
    /// Caregiver whose slot was claimed.
    pub caregiver: CaregiverId,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn caregiver_ordering_is_lexical() {
        let alice = CaregiverId::new("alice");
        let bob = CaregiverId::new("bob");
        assert!(alice < bob);
    }

    #[test]
    fn slot_ordering_breaks_ties_by_caregiver() {
        let date = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        let a = AvailabilitySlot { caregiver: CaregiverId::new("alice"), date };
        let b = AvailabilitySlot { caregiver: CaregiverId::new("bob"), date };
        assert!(a < b);
    }

    #[test]
    fn appointment_id_display_is_the_raw_value() {
        assert_eq!(AppointmentId::from_i64(42).to_string(), "42");
    }
}
