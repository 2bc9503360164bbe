//! The check-in flow.
//!
//! Walk-in check-in is the one place in the engine that writes several
//! record families in a single step: the patient upsert, the visit, and the
//! queue entry, plus the tracking token handed back to the patient. The
//! whole flow runs inside the storage transaction scope so a failure at any
//! step leaves nothing behind.

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::{FlowError, FlowResult};
use crate::ids::{PatientId, TrackingToken, VisitId};
use crate::queue::{QueueCoordinator, QueueEntry, QueueStatus};
use crate::records::{Patient, Visit};
use crate::storage::Storage;
use crate::triage::{TriageResult, TriageScorer, Vitals};
use crate::wait::estimate_wait;
use chrono::NaiveDate;
use flow_types::NonEmptyText;
use std::sync::Arc;
use tracing::debug;

/// Demographics captured on the check-in form.
///
/// `id` is set when the front desk matched an existing record; otherwise a
/// fresh patient record is created.
#[derive(Debug, Clone)]
pub struct PatientDetails {
    pub id: Option<PatientId>,
    pub given_names: Vec<String>,
    pub family_name: String,
    pub birth_date: Option<NaiveDate>,
}

/// One walk-in check-in.
#[derive(Debug, Clone)]
pub struct CheckInRequest {
    pub patient: PatientDetails,
    pub vitals: Vitals,
    /// Free-text symptom description as entered at the desk.
    pub symptoms: String,
    /// Stated reason for the visit, when one was given.
    pub reason: Option<NonEmptyText>,
}

/// Everything the front desk needs after a successful check-in.
#[derive(Debug, Clone)]
pub struct CheckInOutcome {
    pub patient: PatientId,
    pub visit: VisitId,
    pub triage: TriageResult,
    pub queue_entry: QueueEntry,
    /// Printed on the check-in slip; lets the patient query their own
    /// position without authenticating.
    pub tracking_token: TrackingToken,
    pub estimated_wait_minutes: u32,
}

/// Orchestrates triage scoring, record creation and queue insertion for
/// walk-in patients.
pub struct CheckInService<S, C> {
    store: Arc<S>,
    clock: Arc<C>,
    cfg: Arc<EngineConfig>,
    queue: QueueCoordinator<S, C>,
}

impl<S, C> CheckInService<S, C>
where
    S: Storage,
    C: Clock,
{
    pub fn new(store: Arc<S>, clock: Arc<C>, cfg: Arc<EngineConfig>) -> Self {
        let queue = QueueCoordinator::new(store.clone(), clock.clone());
        Self {
            store,
            clock,
            cfg,
            queue,
        }
    }

    /// Checks a walk-in patient into today's queue.
    ///
    /// Scores triage, upserts the patient, records the visit with its vitals
    /// and triage snapshot, estimates the wait from the current queue depth,
    /// enqueues with the priority derived from the triage level, and issues
    /// a tracking token. Runs as one atomic unit: if any step fails, every
    /// prior write in the flow is rolled back.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Validation`] if the name fields are blank, or
    /// any error from the queue insertion and storage writes.
    pub fn check_in(&self, request: CheckInRequest) -> FlowResult<CheckInOutcome> {
        if request.patient.family_name.trim().is_empty() {
            return Err(FlowError::Validation("family name is required".into()));
        }
        if request
            .patient
            .given_names
            .iter()
            .all(|name| name.trim().is_empty())
        {
            return Err(FlowError::Validation(
                "at least one given name is required".into(),
            ));
        }

        let triage = TriageScorer::score(&request.vitals, &request.symptoms);
        let now = self.clock.now();

        self.store.in_transaction(|| {
            let patient_id = request.patient.id.unwrap_or_else(PatientId::generate);
            let created_at = self
                .store
                .patient(patient_id)?
                .map(|existing| existing.created_at)
                .unwrap_or(now);
            self.store.upsert_patient(Patient {
                id: patient_id,
                given_names: request.patient.given_names.clone(),
                family_name: request.patient.family_name.clone(),
                birth_date: request.patient.birth_date,
                created_at,
            })?;

            let visit = self.store.insert_visit(Visit {
                id: VisitId::generate(),
                patient: patient_id,
                reason: request.reason.clone(),
                symptoms: request.symptoms.clone(),
                vitals: request.vitals.clone(),
                triage_score: triage.score,
                triage_level: triage.level,
                created_at: now,
            })?;

            let ahead = self.store.count_queue_by_status(QueueStatus::Waiting)? as u32;
            let estimated_wait_minutes = estimate_wait(ahead, self.cfg.default_consult_minutes());

            let queue_entry = self.queue.enqueue(
                visit.id,
                patient_id,
                triage.level.into(),
                estimated_wait_minutes,
            )?;

            let tracking_token = TrackingToken::issue();
            debug!(
                visit = %visit.id,
                level = %triage.level,
                position = queue_entry.position,
                "walk-in checked in"
            );

            Ok(CheckInOutcome {
                patient: patient_id,
                visit: visit.id,
                triage: triage.clone(),
                queue_entry,
                tracking_token,
                estimated_wait_minutes,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::ids::{AppointmentId, QueueEntryId, StaffId};
    use crate::queue::Priority;
    use crate::records::Staff;
    use crate::scheduling::Appointment;
    use crate::storage::{CommitCheck, MemoryStore, StorageError};
    use chrono::{DateTime, TimeZone, Utc};

    fn service() -> (Arc<MemoryStore>, CheckInService<MemoryStore, FixedClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::at(
            Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap(),
        ));
        let service = CheckInService::new(store.clone(), clock, Arc::new(EngineConfig::default()));
        (store, service)
    }

    fn walk_in(symptoms: &str, vitals: Vitals) -> CheckInRequest {
        CheckInRequest {
            patient: PatientDetails {
                id: None,
                given_names: vec!["Sarah".into()],
                family_name: "Williams".into(),
                birth_date: None,
            },
            vitals,
            symptoms: symptoms.into(),
            reason: None,
        }
    }

    #[test]
    fn check_in_creates_patient_visit_and_queue_entry() {
        let (store, service) = service();

        let outcome = service
            .check_in(walk_in("routine check-up", Vitals::default()))
            .expect("check in");

        assert!(store.patient(outcome.patient).expect("read").is_some());
        let visit = store.visit(outcome.visit).expect("read").expect("exists");
        assert_eq!(visit.triage_level, outcome.triage.level);
        assert_eq!(outcome.queue_entry.status, QueueStatus::Waiting);
        assert_eq!(outcome.queue_entry.position, 1);
        // Front of the queue is still quoted one consult interval.
        assert_eq!(outcome.estimated_wait_minutes, 15);
    }

    #[test]
    fn critical_vitals_enter_the_queue_as_high_priority() {
        let (_, service) = service();
        let vitals = Vitals {
            temperature_f: Some(104.5),
            heart_rate_bpm: Some(130),
            systolic_mmhg: Some(180),
            diastolic_mmhg: Some(110),
            pain_level: Some(9),
        };

        let outcome = service
            .check_in(walk_in("chest pain and difficulty breathing", vitals))
            .expect("check in");

        assert_eq!(outcome.queue_entry.priority, Priority::High);
        assert!(outcome.triage.score >= 60);
    }

    #[test]
    fn quoted_wait_grows_with_queue_depth() {
        let (_, service) = service();
        let first = service
            .check_in(walk_in("routine check-up", Vitals::default()))
            .expect("first");
        let second = service
            .check_in(walk_in("routine check-up", Vitals::default()))
            .expect("second");
        let third = service
            .check_in(walk_in("routine check-up", Vitals::default()))
            .expect("third");

        assert_eq!(first.estimated_wait_minutes, 15);
        assert_eq!(second.estimated_wait_minutes, 15);
        assert_eq!(third.estimated_wait_minutes, 30);
    }

    #[test]
    fn blank_names_are_rejected_before_any_write() {
        let (store, service) = service();
        let mut request = walk_in("routine check-up", Vitals::default());
        request.patient.family_name = "   ".into();

        let err = service.check_in(request).expect_err("blank family name");
        assert!(matches!(err, FlowError::Validation(_)));
        assert_eq!(
            store
                .count_queue_by_status(QueueStatus::Waiting)
                .expect("count"),
            0
        );
    }

    #[test]
    fn returning_patient_keeps_their_original_creation_time() {
        let (store, service) = service();
        let first = service
            .check_in(walk_in("routine check-up", Vitals::default()))
            .expect("first visit");
        let original = store
            .patient(first.patient)
            .expect("read")
            .expect("exists")
            .created_at;

        let mut request = walk_in("headache", Vitals::default());
        request.patient.id = Some(first.patient);
        let second = service.check_in(request).expect("second visit");

        assert_eq!(second.patient, first.patient);
        let after = store
            .patient(first.patient)
            .expect("read")
            .expect("exists")
            .created_at;
        assert_eq!(after, original);
        // Two separate visits, two separate queue entries.
        assert_ne!(second.visit, first.visit);
    }

    /// Storage wrapper that fails queue insertion, simulating a backend
    /// outage partway through the flow.
    struct QueueInsertFails {
        inner: MemoryStore,
    }

    impl Storage for QueueInsertFails {
        fn upsert_patient(&self, patient: Patient) -> Result<Patient, StorageError> {
            self.inner.upsert_patient(patient)
        }
        fn patient(&self, id: PatientId) -> Result<Option<Patient>, StorageError> {
            self.inner.patient(id)
        }
        fn insert_staff(&self, staff: Staff) -> Result<(), StorageError> {
            self.inner.insert_staff(staff)
        }
        fn staff(&self, id: StaffId) -> Result<Option<Staff>, StorageError> {
            self.inner.staff(id)
        }
        fn insert_visit(&self, visit: Visit) -> Result<Visit, StorageError> {
            self.inner.insert_visit(visit)
        }
        fn visit(&self, id: VisitId) -> Result<Option<Visit>, StorageError> {
            self.inner.visit(id)
        }
        fn insert_queue_entry(&self, _entry: QueueEntry) -> Result<QueueEntry, StorageError> {
            Err(StorageError::Unavailable("queue table is down".into()))
        }
        fn queue_entry(&self, id: QueueEntryId) -> Result<Option<QueueEntry>, StorageError> {
            self.inner.queue_entry(id)
        }
        fn queue_entry_for_visit(
            &self,
            visit: VisitId,
        ) -> Result<Option<QueueEntry>, StorageError> {
            self.inner.queue_entry_for_visit(visit)
        }
        fn waiting_entries(&self) -> Result<Vec<QueueEntry>, StorageError> {
            self.inner.waiting_entries()
        }
        fn count_queue_by_status(&self, status: QueueStatus) -> Result<usize, StorageError> {
            self.inner.count_queue_by_status(status)
        }
        fn update_queue_entry(&self, entry: QueueEntry) -> Result<QueueEntry, StorageError> {
            self.inner.update_queue_entry(entry)
        }
        fn appointment(&self, id: AppointmentId) -> Result<Option<Appointment>, StorageError> {
            self.inner.appointment(id)
        }
        fn active_appointments_for_doctor(
            &self,
            doctor: StaffId,
        ) -> Result<Vec<Appointment>, StorageError> {
            self.inner.active_appointments_for_doctor(doctor)
        }
        fn appointments_for_doctor_in_range(
            &self,
            doctor: StaffId,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> Result<Vec<Appointment>, StorageError> {
            self.inner.appointments_for_doctor_in_range(doctor, from, to)
        }
        fn insert_appointment_checked(
            &self,
            appointment: Appointment,
        ) -> Result<CommitCheck, StorageError> {
            self.inner.insert_appointment_checked(appointment)
        }
        fn update_appointment_checked(
            &self,
            appointment: Appointment,
        ) -> Result<CommitCheck, StorageError> {
            self.inner.update_appointment_checked(appointment)
        }
        fn in_transaction<T, F>(&self, f: F) -> FlowResult<T>
        where
            F: FnOnce() -> FlowResult<T>,
        {
            self.inner.in_transaction(f)
        }
        fn recalculate_scope<T, F>(&self, f: F) -> FlowResult<T>
        where
            F: FnOnce() -> FlowResult<T>,
        {
            self.inner.recalculate_scope(f)
        }
    }

    #[test]
    fn late_failure_rolls_back_the_patient_and_visit() {
        let store = Arc::new(QueueInsertFails {
            inner: MemoryStore::new(),
        });
        let clock = Arc::new(FixedClock::at(
            Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap(),
        ));
        let service = CheckInService::new(store.clone(), clock, Arc::new(EngineConfig::default()));

        let mut request = walk_in("routine check-up", Vitals::default());
        let patient_id = PatientId::generate();
        request.patient.id = Some(patient_id);

        let err = service.check_in(request).expect_err("queue insert fails");
        assert!(matches!(err, FlowError::Storage(_)));

        // The patient upsert and visit insert happened before the failure;
        // the transaction must have unwound both.
        assert!(store.inner.patient(patient_id).expect("read").is_none());
    }
}
