//! `PostgreSQL` reservation store for the vaccine scheduler.
//!
//! This crate provides the production implementation of the `ReservationStore`
//! trait from `vaxsched-core`. It uses sqlx with runtime-checked queries and
//! supports:
//!
//! - Serializable transactions spanning the three ledgers
//! - Sequence-backed appointment identifier allocation
//! - Connection pooling
//!
//! Serialization failures (SQLSTATE 40001/40P01) surface as
//! `TransactionConflict`, which the coordinator retries within its budget.
//!
//! # Example
//!
//! ```ignore
//! use vaxsched_postgres::PostgresStore;
//!
//! async fn example() -> vaxsched_core::Result<()> {
//!     let store = PostgresStore::connect("postgres://localhost/vaxsched").await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use vaxsched_core::error::{Result, SchedulerError};
use vaxsched_core::ledger::{
    AppointmentLedger, AvailabilitySet, InventoryLedger, ReservationStore, UnitOfWork,
};
use vaxsched_core::session::Role;
use vaxsched_core::types::{
    Appointment, AppointmentId, CaregiverId, PatientId, VaccineName, VaccineStock,
};

/// Default maximum number of pooled connections.
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// PostgreSQL-backed [`ReservationStore`].
///
/// Every unit of work runs at SERIALIZABLE isolation: the availability claim,
/// the inventory decrement, and the identifier allocation are serialization
/// points, so conflicting concurrent bookings abort cleanly instead of
/// double-booking or overselling.
#[derive(Clone, Debug)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a store over an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the database and create a pooled store.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::StorageUnavailable`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect(url)
            .await
            .map_err(storage_err)?;
        Ok(Self::new(pool))
    }

    /// Create the schema if it does not exist: the appointment identifier
    /// sequence and the three ledger tables.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::StorageUnavailable`] if any statement fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query("CREATE SEQUENCE IF NOT EXISTS appointment_ids")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS vaccines (
                name TEXT PRIMARY KEY,
                doses BIGINT NOT NULL CHECK (doses >= 0)
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS availabilities (
                caregiver TEXT NOT NULL,
                day DATE NOT NULL,
                PRIMARY KEY (caregiver, day)
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS appointments (
                id BIGINT PRIMARY KEY,
                patient TEXT NOT NULL,
                caregiver TEXT NOT NULL,
                vaccine TEXT NOT NULL,
                day DATE NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_appointments_patient ON appointments(patient)")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_appointments_caregiver ON appointments(caregiver)",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }
}

#[async_trait]
impl ReservationStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        // Must be the first statement of the transaction.
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        Ok(Box::new(PostgresUnitOfWork { tx }))
    }

    #[tracing::instrument(skip(self))]
    async fn list_appointments(&self, identity: &str, role: Role) -> Result<Vec<Appointment>> {
        let query = match role {
            Role::Patient => {
                "SELECT id, patient, caregiver, vaccine, day
                 FROM appointments WHERE patient = $1 ORDER BY id ASC"
            }
            Role::Caregiver => {
                "SELECT id, patient, caregiver, vaccine, day
                 FROM appointments WHERE caregiver = $1 ORDER BY id ASC"
            }
        };
        let rows: Vec<AppointmentRow> = sqlx::query_as(query)
            .bind(identity)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(rows.into_iter().map(AppointmentRow::into_appointment).collect())
    }

    async fn available_caregivers(&self, date: NaiveDate) -> Result<Vec<CaregiverId>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT caregiver FROM availabilities WHERE day = $1 ORDER BY caregiver ASC",
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(rows.into_iter().map(|(name,)| CaregiverId::new(name)).collect())
    }

    async fn vaccine_stock(&self) -> Result<Vec<VaccineStock>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT name, doses FROM vaccines ORDER BY name ASC")
                .fetch_all(&self.pool)
                .await
                .map_err(storage_err)?;
        rows.into_iter()
            .map(|(name, doses)| {
                Ok(VaccineStock {
                    name: VaccineName::new(name),
                    doses: doses_from_row(doses)?,
                })
            })
            .collect()
    }

    #[tracing::instrument(skip(self), fields(%vaccine))]
    async fn add_doses(&self, vaccine: &VaccineName, n: u32) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO vaccines (name, doses) VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET doses = vaccines.doses + EXCLUDED.doses
            ",
        )
        .bind(vaccine.as_str())
        .bind(i64::from(n))
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(%caregiver, %date))]
    async fn upload_availability(&self, caregiver: &CaregiverId, date: NaiveDate) -> Result<()> {
        sqlx::query("INSERT INTO availabilities (caregiver, day) VALUES ($1, $2)")
            .bind(caregiver.as_str())
            .bind(date)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    SchedulerError::SlotAlreadyPresent
                } else {
                    storage_err(e)
                }
            })?;
        Ok(())
    }
}

/// One open SERIALIZABLE transaction over the three ledger tables.
///
/// Dropping it without committing rolls every staged statement back.
struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl InventoryLedger for PostgresUnitOfWork {
    async fn decrement_doses(&mut self, vaccine: &VaccineName, n: u32) -> Result<()> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT doses FROM vaccines WHERE name = $1")
            .bind(vaccine.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(storage_err)?;
        let doses = row.ok_or_else(|| SchedulerError::UnknownVaccine {
            vaccine: vaccine.clone(),
        })?;
        if doses.0 < i64::from(n) {
            return Err(SchedulerError::OutOfStock {
                vaccine: vaccine.clone(),
            });
        }
        sqlx::query("UPDATE vaccines SET doses = doses - $2 WHERE name = $1")
            .bind(vaccine.as_str())
            .bind(i64::from(n))
            .execute(&mut *self.tx)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn increment_doses(&mut self, vaccine: &VaccineName, n: u32) -> Result<()> {
        let updated = sqlx::query("UPDATE vaccines SET doses = doses + $2 WHERE name = $1")
            .bind(vaccine.as_str())
            .bind(i64::from(n))
            .execute(&mut *self.tx)
            .await
            .map_err(storage_err)?;
        if updated.rows_affected() == 0 {
            return Err(SchedulerError::UnknownVaccine {
                vaccine: vaccine.clone(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl AvailabilitySet for PostgresUnitOfWork {
    async fn claim_slot(&mut self, date: NaiveDate) -> Result<CaregiverId> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT caregiver FROM availabilities WHERE day = $1 ORDER BY caregiver ASC LIMIT 1",
        )
        .bind(date)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(storage_err)?;
        let (caregiver,) = row.ok_or(SchedulerError::NoSuchSlot { date })?;
        sqlx::query("DELETE FROM availabilities WHERE caregiver = $1 AND day = $2")
            .bind(&caregiver)
            .bind(date)
            .execute(&mut *self.tx)
            .await
            .map_err(storage_err)?;
        Ok(CaregiverId::new(caregiver))
    }

    async fn release_slot(&mut self, caregiver: &CaregiverId, date: NaiveDate) -> Result<()> {
        sqlx::query("INSERT INTO availabilities (caregiver, day) VALUES ($1, $2)")
            .bind(caregiver.as_str())
            .bind(date)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    SchedulerError::SlotAlreadyPresent
                } else {
                    storage_err(e)
                }
            })?;
        Ok(())
    }
}

#[async_trait]
impl AppointmentLedger for PostgresUnitOfWork {
    async fn next_appointment_id(&mut self) -> Result<AppointmentId> {
        // The sequence is the storage layer's transactionally safe allocator:
        // concurrent callers each draw a distinct value.
        let (id,): (i64,) = sqlx::query_as("SELECT nextval('appointment_ids')")
            .fetch_one(&mut *self.tx)
            .await
            .map_err(storage_err)?;
        Ok(AppointmentId::from_i64(id))
    }

    async fn insert_appointment(&mut self, appointment: &Appointment) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO appointments (id, patient, caregiver, vaccine, day)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(appointment.id.as_i64())
        .bind(appointment.patient.as_str())
        .bind(appointment.caregiver.as_str())
        .bind(appointment.vaccine.as_str())
        .bind(appointment.date)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                SchedulerError::DuplicateId { id: appointment.id }
            } else {
                storage_err(e)
            }
        })?;
        Ok(())
    }

    async fn find_appointment(&mut self, id: AppointmentId) -> Result<Appointment> {
        let row: Option<AppointmentRow> = sqlx::query_as(
            "SELECT id, patient, caregiver, vaccine, day FROM appointments WHERE id = $1",
        )
        .bind(id.as_i64())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(storage_err)?;
        row.map(AppointmentRow::into_appointment)
            .ok_or(SchedulerError::AppointmentNotFound { id })
    }

    async fn delete_appointment(&mut self, id: AppointmentId) -> Result<()> {
        let deleted = sqlx::query("DELETE FROM appointments WHERE id = $1")
            .bind(id.as_i64())
            .execute(&mut *self.tx)
            .await
            .map_err(storage_err)?;
        if deleted.rows_affected() == 0 {
            return Err(SchedulerError::AppointmentNotFound { id });
        }
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(storage_err)
    }
}

/// Row shape shared by the appointment queries.
#[derive(sqlx::FromRow)]
struct AppointmentRow {
    id: i64,
    patient: String,
    caregiver: String,
    vaccine: String,
    day: NaiveDate,
}

impl AppointmentRow {
    fn into_appointment(self) -> Appointment {
        Appointment {
            id: AppointmentId::from_i64(self.id),
            patient: PatientId::new(self.patient),
            caregiver: CaregiverId::new(self.caregiver),
            vaccine: VaccineName::new(self.vaccine),
            date: self.day,
        }
    }
}

fn doses_from_row(doses: i64) -> Result<u32> {
    u32::try_from(doses)
        .map_err(|_| SchedulerError::StorageUnavailable("dose count out of range".to_string()))
}

/// Map a sqlx error, surfacing serialization failures as retryable conflicts.
fn storage_err(err: sqlx::Error) -> SchedulerError {
    if is_serialization_failure(&err) {
        SchedulerError::TransactionConflict
    } else {
        SchedulerError::StorageUnavailable(err.to_string())
    }
}

/// SQLSTATE 40001 (serialization_failure) or 40P01 (deadlock_detected).
fn is_serialization_failure(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if matches!(db.code().as_deref(), Some("40001" | "40P01"))
    )
}

/// SQLSTATE 23505 (unique_violation).
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505")
    )
}
