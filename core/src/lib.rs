//! # Vaxsched Core
//!
//! Domain types, ledger traits, and the reservation coordinator for the
//! vaccine appointment scheduler.
//!
//! ## Core Concepts
//!
//! - **Ledger**: an owned collection of records subject to atomic mutation:
//!   inventory ([`InventoryLedger`]), availability ([`AvailabilitySet`]), and
//!   appointments ([`AppointmentLedger`]).
//! - **Unit of work**: one atomic transaction spanning all three ledgers
//!   ([`UnitOfWork`]), obtained from a [`ReservationStore`] backend.
//! - **Coordinator**: [`ReservationCoordinator`] executes booking and
//!   cancellation as mirror-image three-way atomic transactions, with a
//!   bounded retry budget for optimistic-concurrency conflicts.
//! - **Session**: every call carries an explicit [`Session`] naming the
//!   caller and role; there is no process-global "current user".
//!
//! ## Example
//!
//! ```ignore
//! use vaxsched_core::{ReservationCoordinator, Session, VaccineName};
//!
//! async fn example<S: vaxsched_core::ReservationStore>(store: S) {
//!     let coordinator = ReservationCoordinator::new(store);
//!     let session = Session::patient("p1");
//!     let date = "2024-07-01".parse().unwrap();
//!
//!     match coordinator.book(&session, date, &VaccineName::new("Pfizer")).await {
//!         Ok(booking) => println!(
//!             "Appointment ID {}, Caregiver username {}",
//!             booking.appointment_id, booking.caregiver
//!         ),
//!         Err(err) => println!("{err}"),
//!     }
//! }
//! ```

pub mod coordinator;
pub mod error;
pub mod ledger;
pub mod session;
pub mod types;

pub use coordinator::{DEFAULT_RETRY_BUDGET, ReservationCoordinator};
pub use error::{Result, SchedulerError};
pub use ledger::{
    AppointmentLedger, AvailabilitySet, InventoryLedger, ReservationStore, UnitOfWork,
};
pub use session::{Role, Session};
pub use types::{
    Appointment, AppointmentId, AvailabilitySlot, Booking, CaregiverId, PatientId, VaccineName,
    VaccineStock,
};
