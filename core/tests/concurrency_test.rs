//! Concurrency tests.
//!
//! Race conditions between concurrent bookings and cancellations: oversell,
//! double-booking, and identifier collisions. Every task shares one store;
//! the optimistic commit in the memory backend forces the same conflict
//! handling the PostgreSQL backend exercises under serializable isolation.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use chrono::NaiveDate;
use std::collections::HashSet;
use vaxsched_core::{
    CaregiverId, ReservationCoordinator, ReservationStore, SchedulerError, Session, VaccineName,
};
use vaxsched_testing::MemoryStore;

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

/// With D doses and more contenders than doses, exactly D bookings succeed
/// and the rest observe `OutOfStock`.
#[tokio::test]
async fn concurrent_bookings_never_oversell() {
    let store = MemoryStore::new();
    let pfizer = VaccineName::new("Pfizer");
    let day = date("2024-07-01");
    let doses = 4_u32;
    let contenders = 12_u32;

    store.add_doses(&pfizer, doses).await.unwrap();
    for i in 0..contenders {
        store
            .upload_availability(&CaregiverId::new(format!("cg-{i:02}")), day)
            .await
            .unwrap();
    }

    // Every contender can lose a commit race to every other one, so the
    // retry budget covers the full field.
    let coordinator = ReservationCoordinator::new(store.clone()).with_retry_budget(contenders);
    let mut handles = Vec::new();
    for i in 0..contenders {
        let coordinator = coordinator.clone();
        let pfizer = pfizer.clone();
        handles.push(tokio::spawn(async move {
            coordinator
                .book(&Session::patient(format!("p{i}")), day, &pfizer)
                .await
        }));
    }

    let mut successes = 0_u32;
    for handle in handles {
        match handle.await.expect("task should not panic") {
            Ok(_) => successes += 1,
            Err(err) => assert_eq!(
                err,
                SchedulerError::OutOfStock {
                    vaccine: pfizer.clone()
                }
            ),
        }
    }

    assert_eq!(successes, doses);
    assert_eq!(store.doses(&pfizer), Some(0));
    assert_eq!(store.appointment_count(), doses as usize);
}

/// Two concurrent bookings for a date with a single slot: one wins, the
/// loser aborts cleanly.
#[tokio::test]
async fn concurrent_bookings_never_double_book_a_slot() {
    let store = MemoryStore::new();
    let pfizer = VaccineName::new("Pfizer");
    let day = date("2024-07-01");
    let contenders = 8_u32;

    // Plenty of doses, exactly one slot: availability is the serialization
    // point under test.
    store.add_doses(&pfizer, contenders).await.unwrap();
    store
        .upload_availability(&CaregiverId::new("alice"), day)
        .await
        .unwrap();

    let coordinator = ReservationCoordinator::new(store.clone()).with_retry_budget(contenders);
    let mut handles = Vec::new();
    for i in 0..contenders {
        let coordinator = coordinator.clone();
        let pfizer = pfizer.clone();
        handles.push(tokio::spawn(async move {
            coordinator
                .book(&Session::patient(format!("p{i}")), day, &pfizer)
                .await
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        match handle.await.expect("task should not panic") {
            Ok(booking) => winners.push(booking),
            Err(err) => assert_eq!(err, SchedulerError::NoSuchSlot { date: day }),
        }
    }

    assert_eq!(winners.len(), 1);
    assert_eq!(winners[0].caregiver, CaregiverId::new("alice"));
    assert_eq!(store.appointment_count(), 1);
    assert_eq!(store.doses(&pfizer), Some(contenders - 1));
}

/// All identifiers returned by concurrent successful bookings are pairwise
/// distinct.
#[tokio::test]
async fn concurrent_bookings_allocate_distinct_identifiers() {
    let store = MemoryStore::new();
    let pfizer = VaccineName::new("Pfizer");
    let bookings = 10_u32;

    store.add_doses(&pfizer, bookings).await.unwrap();
    for i in 0..bookings {
        store
            .upload_availability(
                &CaregiverId::new(format!("cg-{i:02}")),
                date("2024-07-01"),
            )
            .await
            .unwrap();
    }

    let coordinator = ReservationCoordinator::new(store.clone()).with_retry_budget(bookings);
    let mut handles = Vec::new();
    for i in 0..bookings {
        let coordinator = coordinator.clone();
        let pfizer = pfizer.clone();
        handles.push(tokio::spawn(async move {
            coordinator
                .book(&Session::patient(format!("p{i}")), date("2024-07-01"), &pfizer)
                .await
        }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        let booking = handle
            .await
            .expect("task should not panic")
            .expect("every contender has a dose and a slot");
        assert!(
            ids.insert(booking.appointment_id),
            "identifier {} issued twice",
            booking.appointment_id
        );
    }

    assert_eq!(ids.len(), bookings as usize);
}

/// A booking and a cancellation racing over the same dose stay consistent:
/// whatever interleaving wins, doses + outstanding appointments balance.
#[tokio::test]
async fn racing_book_and_cancel_keep_ledgers_balanced() {
    let store = MemoryStore::new();
    let pfizer = VaccineName::new("Pfizer");
    let day = date("2024-07-01");

    store.add_doses(&pfizer, 1).await.unwrap();
    store
        .upload_availability(&CaregiverId::new("alice"), day)
        .await
        .unwrap();
    store
        .upload_availability(&CaregiverId::new("bob"), day)
        .await
        .unwrap();

    let coordinator = ReservationCoordinator::new(store.clone()).with_retry_budget(8);
    let p1 = Session::patient("p1");
    let booking = coordinator.book(&p1, day, &pfizer).await.unwrap();

    let cancel_task = {
        let coordinator = coordinator.clone();
        let p1 = p1.clone();
        tokio::spawn(async move { coordinator.cancel(&p1, booking.appointment_id).await })
    };
    let book_task = {
        let coordinator = coordinator.clone();
        let pfizer = pfizer.clone();
        tokio::spawn(async move {
            coordinator
                .book(&Session::patient("p2"), day, &pfizer)
                .await
        })
    };

    let cancel_result = cancel_task.await.expect("task should not panic");
    let book_result = book_task.await.expect("task should not panic");

    assert!(cancel_result.is_ok());
    // p2 either found the freed dose or lost the race; both end states are
    // consistent.
    let outstanding = store.appointment_count() as u32;
    let remaining = store.doses(&pfizer).unwrap();
    assert_eq!(outstanding + remaining, 1);
    match book_result {
        Ok(_) => assert_eq!(outstanding, 1),
        Err(err) => {
            assert_eq!(
                err,
                SchedulerError::OutOfStock {
                    vaccine: pfizer.clone()
                }
            );
            assert_eq!(outstanding, 0);
        }
    }
}
