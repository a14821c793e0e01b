//! # Vaxsched Testing
//!
//! Testing utilities for the vaccine scheduler.
//!
//! This crate provides:
//! - [`MemoryStore`]: a deterministic in-memory `ReservationStore` with
//!   optimistic-concurrency commit
//! - [`FailpointStore`]: a wrapper that injects a storage failure at a chosen
//!   ledger operation, for atomicity tests
//!
//! The memory store is a real backend, not only a test double: the CLI runs
//! on it when no `DATABASE_URL` is configured.
//!
//! ## Example
//!
//! ```
//! use vaxsched_core::{
//!     ReservationCoordinator, ReservationStore, SchedulerError, Session, VaccineName,
//! };
//! use vaxsched_testing::MemoryStore;
//!
//! # async fn example() -> vaxsched_core::Result<()> {
//! let store = MemoryStore::new();
//! store.add_doses(&VaccineName::new("Pfizer"), 1).await?;
//!
//! let coordinator = ReservationCoordinator::new(store);
//! let err = coordinator
//!     .book(&Session::patient("p1"), "2024-07-01".parse().unwrap(), &VaccineName::new("Pfizer"))
//!     .await
//!     .unwrap_err();
//! // One dose, but nobody offers the date.
//! assert!(matches!(err, SchedulerError::NoSuchSlot { .. }));
//! # Ok(())
//! # }
//! ```

pub mod failpoint;
pub mod memory;

pub use failpoint::{FailOp, Failpoint, FailpointStore};
pub use memory::MemoryStore;
