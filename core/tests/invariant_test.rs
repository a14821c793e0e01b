//! Property test for the cross-ledger invariant.
//!
//! For every committed state reached by an arbitrary interleaving of catalog
//! top-ups, availability uploads, bookings and cancellations:
//!
//! - doses added to a vaccine == remaining doses + outstanding appointments
//!   consuming it (dose conservation),
//! - no outstanding appointment's (caregiver, date) pair is simultaneously
//!   present in the availability set,
//! - all outstanding appointment identifiers are pairwise distinct.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use chrono::NaiveDate;
use proptest::prelude::*;
use std::collections::HashMap;
use vaxsched_core::{
    AppointmentId, CaregiverId, ReservationCoordinator, ReservationStore, Session, VaccineName,
};
use vaxsched_testing::MemoryStore;

#[derive(Clone, Debug)]
enum Op {
    AddDoses { vaccine: u8, n: u32 },
    Upload { caregiver: u8, day: u8 },
    Book { patient: u8, day: u8, vaccine: u8 },
    Cancel { patient: u8, id: i64 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..3_u8, 1..5_u32).prop_map(|(vaccine, n)| Op::AddDoses { vaccine, n }),
        (0..3_u8, 0..3_u8).prop_map(|(caregiver, day)| Op::Upload { caregiver, day }),
        (0..3_u8, 0..3_u8, 0..3_u8)
            .prop_map(|(patient, day, vaccine)| Op::Book { patient, day, vaccine }),
        (0..3_u8, 1..20_i64).prop_map(|(patient, id)| Op::Cancel { patient, id }),
    ]
}

fn vaccine(i: u8) -> VaccineName {
    VaccineName::new(format!("vaccine-{i}"))
}

fn caregiver(i: u8) -> CaregiverId {
    CaregiverId::new(format!("caregiver-{i}"))
}

fn day(i: u8) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 7, 1 + u32::from(i)).unwrap()
}

async fn check_invariants(store: &MemoryStore, added: &HashMap<VaccineName, u32>) {
    let appointments = store.appointments();

    // Dose conservation per vaccine.
    let stock = store.vaccine_stock().await.unwrap();
    for entry in &stock {
        let outstanding = appointments
            .iter()
            .filter(|a| a.vaccine == entry.name)
            .count() as u32;
        let total = added.get(&entry.name).copied().unwrap_or(0);
        assert_eq!(
            entry.doses + outstanding,
            total,
            "dose conservation violated for {}",
            entry.name
        );
    }

    // A booked pair is never simultaneously offered.
    for a in &appointments {
        assert!(
            !store.has_slot(&a.caregiver, a.date),
            "appointment {} and the availability set both hold ({}, {})",
            a.id,
            a.caregiver,
            a.date
        );
    }

    // Identifiers are pairwise distinct.
    let mut ids: Vec<AppointmentId> = appointments.iter().map(|a| a.id).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), appointments.len(), "identifier issued twice");
}

async fn run_ops(ops: Vec<Op>) {
    let store = MemoryStore::new();
    let coordinator = ReservationCoordinator::new(store.clone());
    let mut added: HashMap<VaccineName, u32> = HashMap::new();

    for op in ops {
        match op {
            Op::AddDoses { vaccine: v, n } => {
                store.add_doses(&vaccine(v), n).await.unwrap();
                *added.entry(vaccine(v)).or_insert(0) += n;
            }
            Op::Upload { caregiver: c, day: d } => {
                // Re-offering a pair that currently has an outstanding
                // appointment would legitimately re-create it; skip those so
                // the disjointness assertion stays meaningful. Duplicate
                // offers of a live pair are rejected by the store.
                let booked = store
                    .appointments()
                    .iter()
                    .any(|a| a.caregiver == caregiver(c) && a.date == day(d));
                if !booked {
                    let _ = store.upload_availability(&caregiver(c), day(d)).await;
                }
            }
            Op::Book { patient, day: d, vaccine: v } => {
                // Failures (no dose, no slot) are expected outcomes; the
                // invariant must hold either way.
                let _ = coordinator
                    .book(&Session::patient(format!("patient-{patient}")), day(d), &vaccine(v))
                    .await;
            }
            Op::Cancel { patient, id } => {
                let _ = coordinator
                    .cancel(
                        &Session::patient(format!("patient-{patient}")),
                        AppointmentId::from_i64(id),
                    )
                    .await;
            }
        }
        check_invariants(&store, &added).await;
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn cross_ledger_invariant_holds(ops in prop::collection::vec(op_strategy(), 1..40)) {
        futures::executor::block_on(run_ops(ops));
    }
}
