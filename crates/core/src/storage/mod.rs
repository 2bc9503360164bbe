//! The storage contract the engine requires from its persistence
//! collaborator.
//!
//! The engine performs no concurrency control of its own; it relies on the
//! guarantees spelled out here: versioned conditional writes, a guarded
//! appointment insert that re-validates overlap at commit time, a serialised
//! recalculation scope, and a transactional scope with rollback for the
//! check-in flow. [`MemoryStore`] is the reference implementation used in
//! tests and small deployments; a database-backed implementation satisfies
//! the same contract with its native transactions.

mod memory;

pub use memory::MemoryStore;

use crate::error::{FlowError, FlowResult};
use crate::ids::{AppointmentId, PatientId, QueueEntryId, StaffId, VisitId};
use crate::queue::{QueueEntry, QueueStatus};
use crate::records::{Patient, Staff, Visit};
use crate::scheduling::Appointment;
use chrono::{DateTime, Utc};

/// Errors surfaced by a storage implementation.
///
/// `LostUpdate` is the optimistic-concurrency signal: the caller's read is
/// stale and the write was refused. Everything else is unexpected and treated
/// as fatal for the current request.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("lost update on {kind} {id}: version {expected} is stale")]
    LostUpdate {
        kind: &'static str,
        id: String,
        expected: u64,
    },
    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },
    #[error("{kind} does not exist: {id}")]
    Missing { kind: &'static str, id: String },
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Maps a refused conditional write to the engine's concurrency error;
/// anything else stays a storage failure.
pub(crate) fn lost_update_to_concurrency(err: StorageError) -> FlowError {
    match err {
        StorageError::LostUpdate { .. } => FlowError::Concurrency(err.to_string()),
        other => FlowError::Storage(other),
    }
}

/// Outcome of a guarded appointment write.
#[derive(Debug)]
pub enum CommitCheck {
    /// The write committed; the stored appointment carries its new version.
    Stored(Appointment),
    /// The write was refused: it would overlap these active appointments.
    Overlaps(Vec<AppointmentId>),
}

/// Persistence operations the engine consumes.
///
/// All record-returning writes hand back the stored form (version bumped by
/// the store). Versioned updates compare the caller's `version` field
/// against the stored one and refuse stale writes with
/// [`StorageError::LostUpdate`].
pub trait Storage: Send + Sync {
    // ---- patients ----

    /// Inserts or replaces a patient record by id.
    fn upsert_patient(&self, patient: Patient) -> Result<Patient, StorageError>;
    fn patient(&self, id: PatientId) -> Result<Option<Patient>, StorageError>;

    // ---- staff ----

    fn insert_staff(&self, staff: Staff) -> Result<(), StorageError>;
    fn staff(&self, id: StaffId) -> Result<Option<Staff>, StorageError>;

    /// Staff lookup with the doctor-role filter applied: returns the record
    /// only when it is an active doctor.
    fn doctor(&self, id: StaffId) -> Result<Option<Staff>, StorageError> {
        Ok(self.staff(id)?.filter(|s| s.is_active_doctor()))
    }

    // ---- visits ----

    fn insert_visit(&self, visit: Visit) -> Result<Visit, StorageError>;
    fn visit(&self, id: VisitId) -> Result<Option<Visit>, StorageError>;

    // ---- queue ----

    fn insert_queue_entry(&self, entry: QueueEntry) -> Result<QueueEntry, StorageError>;
    fn queue_entry(&self, id: QueueEntryId) -> Result<Option<QueueEntry>, StorageError>;

    /// The entry referencing `visit`, if one exists. A visit has at most one
    /// queue entry, ever.
    fn queue_entry_for_visit(&self, visit: VisitId) -> Result<Option<QueueEntry>, StorageError>;

    /// All entries currently in `waiting` status, in unspecified order.
    fn waiting_entries(&self) -> Result<Vec<QueueEntry>, StorageError>;

    fn count_queue_by_status(&self, status: QueueStatus) -> Result<usize, StorageError>;

    /// Versioned conditional write. This is the claim primitive: two callers
    /// racing to move the same entry cannot both succeed.
    fn update_queue_entry(&self, entry: QueueEntry) -> Result<QueueEntry, StorageError>;

    // ---- appointments ----

    fn appointment(&self, id: AppointmentId) -> Result<Option<Appointment>, StorageError>;

    /// All appointments for `doctor` whose status is in the active set.
    fn active_appointments_for_doctor(
        &self,
        doctor: StaffId,
    ) -> Result<Vec<Appointment>, StorageError>;

    /// Appointments (any status) for `doctor` whose occupied interval
    /// intersects `[from, to)`.
    fn appointments_for_doctor_in_range(
        &self,
        doctor: StaffId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, StorageError>;

    /// Inserts an appointment unless it would overlap an existing active
    /// appointment for the same doctor *at commit time*. Closes the race
    /// between an unsynchronised conflict check and the write.
    fn insert_appointment_checked(
        &self,
        appointment: Appointment,
    ) -> Result<CommitCheck, StorageError>;

    /// Versioned conditional update with the same commit-time overlap guard,
    /// the appointment's own id excluded.
    fn update_appointment_checked(
        &self,
        appointment: Appointment,
    ) -> Result<CommitCheck, StorageError>;

    // ---- scopes ----

    /// Runs `f` as one atomic unit: if it returns an error, every write it
    /// performed is rolled back. Used only by the check-in flow.
    fn in_transaction<T, F>(&self, f: F) -> FlowResult<T>
    where
        F: FnOnce() -> FlowResult<T>,
        Self: Sized,
    {
        f()
    }

    /// Serialises position recalculation per clinic: two concurrent
    /// recalculations must not interleave their read-compute-write
    /// sequences.
    fn recalculate_scope<T, F>(&self, f: F) -> FlowResult<T>
    where
        F: FnOnce() -> FlowResult<T>,
        Self: Sized,
    {
        f()
    }
}
