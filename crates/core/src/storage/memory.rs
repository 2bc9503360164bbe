//! In-memory reference implementation of the storage contract.
//!
//! All records live behind one mutex, which makes every individual operation
//! atomic. The transactional scope is snapshot-and-restore and is serialised
//! by its own gate, so a rolled-back check-in can never clobber writes from
//! a concurrent one. Intended for tests and single-process deployments.

use super::{CommitCheck, Storage, StorageError};
use crate::error::{FlowError, FlowResult};
use crate::ids::{AppointmentId, PatientId, QueueEntryId, StaffId, VisitId};
use crate::queue::{QueueEntry, QueueStatus};
use crate::records::{Patient, Staff, Visit};
use crate::scheduling::Appointment;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default, Clone)]
struct State {
    patients: HashMap<PatientId, Patient>,
    staff: HashMap<StaffId, Staff>,
    visits: HashMap<VisitId, Visit>,
    queue: HashMap<QueueEntryId, QueueEntry>,
    appointments: HashMap<AppointmentId, Appointment>,
}

/// Mutex-guarded store holding every record family in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    tx_gate: Mutex<()>,
    recalc_gate: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, StorageError> {
        self.state
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store mutex poisoned".into()))
    }

    /// Active appointments of `doctor` overlapping `[start, end)`, ordered
    /// by start time. Shared by both guarded writes.
    fn overlapping_ids(
        state: &State,
        doctor: StaffId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<AppointmentId>,
    ) -> Vec<AppointmentId> {
        let mut hits: Vec<&Appointment> = state
            .appointments
            .values()
            .filter(|a| a.doctor == doctor && a.status.is_active())
            .filter(|a| Some(a.id) != exclude)
            .filter(|a| a.overlaps_window(start, end))
            .collect();
        hits.sort_by_key(|a| a.scheduled_time);
        hits.into_iter().map(|a| a.id).collect()
    }
}

impl Storage for MemoryStore {
    fn upsert_patient(&self, patient: Patient) -> Result<Patient, StorageError> {
        let mut state = self.state()?;
        state.patients.insert(patient.id, patient.clone());
        Ok(patient)
    }

    fn patient(&self, id: PatientId) -> Result<Option<Patient>, StorageError> {
        Ok(self.state()?.patients.get(&id).cloned())
    }

    fn insert_staff(&self, staff: Staff) -> Result<(), StorageError> {
        let mut state = self.state()?;
        if state.staff.contains_key(&staff.id) {
            return Err(StorageError::AlreadyExists {
                kind: "staff",
                id: staff.id.to_string(),
            });
        }
        state.staff.insert(staff.id, staff);
        Ok(())
    }

    fn staff(&self, id: StaffId) -> Result<Option<Staff>, StorageError> {
        Ok(self.state()?.staff.get(&id).cloned())
    }

    fn insert_visit(&self, visit: Visit) -> Result<Visit, StorageError> {
        let mut state = self.state()?;
        if state.visits.contains_key(&visit.id) {
            return Err(StorageError::AlreadyExists {
                kind: "visit",
                id: visit.id.to_string(),
            });
        }
        state.visits.insert(visit.id, visit.clone());
        Ok(visit)
    }

    fn visit(&self, id: VisitId) -> Result<Option<Visit>, StorageError> {
        Ok(self.state()?.visits.get(&id).cloned())
    }

    fn insert_queue_entry(&self, entry: QueueEntry) -> Result<QueueEntry, StorageError> {
        let mut state = self.state()?;
        if state.queue.contains_key(&entry.id) {
            return Err(StorageError::AlreadyExists {
                kind: "queue entry",
                id: entry.id.to_string(),
            });
        }
        if state.queue.values().any(|e| e.visit == entry.visit) {
            return Err(StorageError::AlreadyExists {
                kind: "queue entry for visit",
                id: entry.visit.to_string(),
            });
        }

        let mut stored = entry;
        stored.version = 1;
        state.queue.insert(stored.id, stored.clone());
        Ok(stored)
    }

    fn queue_entry(&self, id: QueueEntryId) -> Result<Option<QueueEntry>, StorageError> {
        Ok(self.state()?.queue.get(&id).cloned())
    }

    fn queue_entry_for_visit(&self, visit: VisitId) -> Result<Option<QueueEntry>, StorageError> {
        Ok(self
            .state()?
            .queue
            .values()
            .find(|e| e.visit == visit)
            .cloned())
    }

    fn waiting_entries(&self) -> Result<Vec<QueueEntry>, StorageError> {
        Ok(self
            .state()?
            .queue
            .values()
            .filter(|e| e.status == QueueStatus::Waiting)
            .cloned()
            .collect())
    }

    fn count_queue_by_status(&self, status: QueueStatus) -> Result<usize, StorageError> {
        Ok(self
            .state()?
            .queue
            .values()
            .filter(|e| e.status == status)
            .count())
    }

    fn update_queue_entry(&self, entry: QueueEntry) -> Result<QueueEntry, StorageError> {
        let mut state = self.state()?;
        let current = state.queue.get(&entry.id).ok_or(StorageError::Missing {
            kind: "queue entry",
            id: entry.id.to_string(),
        })?;
        if current.version != entry.version {
            return Err(StorageError::LostUpdate {
                kind: "queue entry",
                id: entry.id.to_string(),
                expected: entry.version,
            });
        }

        let mut stored = entry;
        stored.version += 1;
        state.queue.insert(stored.id, stored.clone());
        Ok(stored)
    }

    fn appointment(&self, id: AppointmentId) -> Result<Option<Appointment>, StorageError> {
        Ok(self.state()?.appointments.get(&id).cloned())
    }

    fn active_appointments_for_doctor(
        &self,
        doctor: StaffId,
    ) -> Result<Vec<Appointment>, StorageError> {
        Ok(self
            .state()?
            .appointments
            .values()
            .filter(|a| a.doctor == doctor && a.status.is_active())
            .cloned()
            .collect())
    }

    fn appointments_for_doctor_in_range(
        &self,
        doctor: StaffId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, StorageError> {
        Ok(self
            .state()?
            .appointments
            .values()
            .filter(|a| a.doctor == doctor)
            .filter(|a| a.scheduled_time < to && from < a.end_time())
            .cloned()
            .collect())
    }

    fn insert_appointment_checked(
        &self,
        appointment: Appointment,
    ) -> Result<CommitCheck, StorageError> {
        let mut state = self.state()?;
        if state.appointments.contains_key(&appointment.id) {
            return Err(StorageError::AlreadyExists {
                kind: "appointment",
                id: appointment.id.to_string(),
            });
        }

        let overlaps = Self::overlapping_ids(
            &state,
            appointment.doctor,
            appointment.scheduled_time,
            appointment.end_time(),
            None,
        );
        if !overlaps.is_empty() {
            return Ok(CommitCheck::Overlaps(overlaps));
        }

        let mut stored = appointment;
        stored.version = 1;
        state.appointments.insert(stored.id, stored.clone());
        Ok(CommitCheck::Stored(stored))
    }

    fn update_appointment_checked(
        &self,
        appointment: Appointment,
    ) -> Result<CommitCheck, StorageError> {
        let mut state = self.state()?;
        let current = state
            .appointments
            .get(&appointment.id)
            .ok_or(StorageError::Missing {
                kind: "appointment",
                id: appointment.id.to_string(),
            })?;
        if current.version != appointment.version {
            return Err(StorageError::LostUpdate {
                kind: "appointment",
                id: appointment.id.to_string(),
                expected: appointment.version,
            });
        }

        // A write that leaves the appointment inactive cannot create a
        // calendar overlap.
        if appointment.status.is_active() {
            let overlaps = Self::overlapping_ids(
                &state,
                appointment.doctor,
                appointment.scheduled_time,
                appointment.end_time(),
                Some(appointment.id),
            );
            if !overlaps.is_empty() {
                return Ok(CommitCheck::Overlaps(overlaps));
            }
        }

        let mut stored = appointment;
        stored.version += 1;
        state.appointments.insert(stored.id, stored.clone());
        Ok(CommitCheck::Stored(stored))
    }

    fn in_transaction<T, F>(&self, f: F) -> FlowResult<T>
    where
        F: FnOnce() -> FlowResult<T>,
    {
        let _gate = self.tx_gate.lock().map_err(|_| {
            FlowError::Storage(StorageError::Unavailable("transaction gate poisoned".into()))
        })?;

        let snapshot = self.state().map_err(FlowError::Storage)?.clone();
        match f() {
            Ok(value) => Ok(value),
            Err(err) => {
                let mut state = match self.state.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                *state = snapshot;
                Err(err)
            }
        }
    }

    fn recalculate_scope<T, F>(&self, f: F) -> FlowResult<T>
    where
        F: FnOnce() -> FlowResult<T>,
    {
        let _gate = self.recalc_gate.lock().map_err(|_| {
            FlowError::Storage(StorageError::Unavailable(
                "recalculation gate poisoned".into(),
            ))
        })?;
        f()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Priority;
    use crate::records::StaffRole;
    use crate::scheduling::AppointmentType;
    use chrono::{Duration, TimeZone};
    use flow_types::{Minutes, NonEmptyText};

    fn ten_am() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 10, 0, 0).unwrap()
    }

    fn sample_entry() -> QueueEntry {
        QueueEntry {
            id: QueueEntryId::generate(),
            visit: VisitId::generate(),
            patient: PatientId::generate(),
            doctor: None,
            room: None,
            position: 0,
            status: QueueStatus::Waiting,
            priority: Priority::Medium,
            check_in_time: ten_am(),
            called_time: None,
            consultation_start: None,
            consultation_end: None,
            estimated_wait_minutes: 15,
            actual_wait_minutes: None,
            cancellation_note: None,
            version: 0,
        }
    }

    fn sample_appointment(doctor: StaffId, at: DateTime<Utc>, length: u32) -> Appointment {
        Appointment::new(
            PatientId::generate(),
            doctor,
            at,
            Minutes::new(length).expect("non-zero"),
            AppointmentType::Consultation,
            None,
            None,
        )
        .expect("valid appointment")
    }

    #[test]
    fn stale_queue_write_is_refused() {
        let store = MemoryStore::new();
        let stored = store.insert_queue_entry(sample_entry()).expect("insert");
        assert_eq!(stored.version, 1);

        // First writer wins.
        let mut first = stored.clone();
        first.position = 1;
        let after_first = store.update_queue_entry(first).expect("fresh write");
        assert_eq!(after_first.version, 2);

        // Second writer still holds version 1 and must lose.
        let mut second = stored;
        second.position = 2;
        let err = store.update_queue_entry(second).expect_err("stale write");
        assert!(matches!(err, StorageError::LostUpdate { expected: 1, .. }));
    }

    #[test]
    fn second_queue_entry_for_the_same_visit_is_refused() {
        let store = MemoryStore::new();
        let entry = sample_entry();
        let visit = entry.visit;
        store.insert_queue_entry(entry).expect("insert");

        let mut duplicate = sample_entry();
        duplicate.visit = visit;
        let err = store.insert_queue_entry(duplicate).expect_err("duplicate visit");
        assert!(matches!(err, StorageError::AlreadyExists { .. }));
    }

    #[test]
    fn commit_time_overlap_guard_refuses_the_second_booking() {
        let store = MemoryStore::new();
        let doctor = StaffId::generate();

        // Both bookings passed a read-only conflict check against an empty
        // calendar; only one may commit.
        let first = sample_appointment(doctor, ten_am(), 30);
        let second = sample_appointment(doctor, ten_am() + Duration::minutes(15), 30);

        let stored = match store.insert_appointment_checked(first).expect("first insert") {
            CommitCheck::Stored(a) => a,
            CommitCheck::Overlaps(ids) => panic!("unexpected overlap with {ids:?}"),
        };

        match store.insert_appointment_checked(second).expect("second insert") {
            CommitCheck::Overlaps(ids) => assert_eq!(ids, vec![stored.id]),
            CommitCheck::Stored(a) => panic!("double booking committed: {}", a.id),
        }
    }

    #[test]
    fn inactive_write_skips_the_overlap_guard() {
        let store = MemoryStore::new();
        let doctor = StaffId::generate();
        let first = sample_appointment(doctor, ten_am(), 30);
        let stored = match store.insert_appointment_checked(first).expect("insert") {
            CommitCheck::Stored(a) => a,
            CommitCheck::Overlaps(_) => panic!("calendar was empty"),
        };

        // Cancelling must succeed even though the interval is occupied by
        // the appointment itself.
        let mut cancelled = stored;
        cancelled.status = crate::scheduling::AppointmentStatus::Cancelled;
        cancelled.cancellation_reason = Some(NonEmptyText::new("no longer needed").unwrap());
        match store.update_appointment_checked(cancelled).expect("update") {
            CommitCheck::Stored(a) => assert_eq!(a.version, 2),
            CommitCheck::Overlaps(ids) => panic!("unexpected overlap with {ids:?}"),
        }
    }

    #[test]
    fn range_query_uses_interval_intersection() {
        let store = MemoryStore::new();
        let doctor = StaffId::generate();
        let appointment = sample_appointment(doctor, ten_am(), 30);
        store
            .insert_appointment_checked(appointment)
            .expect("insert");

        // A window starting mid-appointment intersects it.
        let mid = store
            .appointments_for_doctor_in_range(
                doctor,
                ten_am() + Duration::minutes(15),
                ten_am() + Duration::hours(1),
            )
            .expect("range query");
        assert_eq!(mid.len(), 1);

        // A window starting exactly at the end does not (half-open).
        let after = store
            .appointments_for_doctor_in_range(
                doctor,
                ten_am() + Duration::minutes(30),
                ten_am() + Duration::hours(1),
            )
            .expect("range query");
        assert!(after.is_empty());
    }

    #[test]
    fn doctor_lookup_applies_the_role_filter() {
        let store = MemoryStore::new();
        let doctor_id = StaffId::generate();
        let nurse_id = StaffId::generate();
        store
            .insert_staff(Staff {
                id: doctor_id,
                display_name: NonEmptyText::new("Dr Whitfield").unwrap(),
                role: StaffRole::Doctor,
                active: true,
            })
            .expect("seed doctor");
        store
            .insert_staff(Staff {
                id: nurse_id,
                display_name: NonEmptyText::new("Sister Hale").unwrap(),
                role: StaffRole::Nurse,
                active: true,
            })
            .expect("seed nurse");

        assert!(store.doctor(doctor_id).expect("lookup").is_some());
        assert!(store.doctor(nurse_id).expect("lookup").is_none());
    }

    #[test]
    fn failed_transaction_rolls_back_every_write() {
        let store = MemoryStore::new();
        let patient_id = PatientId::generate();

        let result: FlowResult<()> = store.in_transaction(|| {
            store
                .upsert_patient(Patient {
                    id: patient_id,
                    given_names: vec!["Sarah".into()],
                    family_name: "Williams".into(),
                    birth_date: None,
                    created_at: ten_am(),
                })
                .map_err(FlowError::Storage)?;
            store
                .insert_queue_entry(sample_entry())
                .map_err(FlowError::Storage)?;
            Err(FlowError::Validation("simulated late failure".into()))
        });

        assert!(result.is_err());
        assert!(store.patient(patient_id).expect("read").is_none());
        assert_eq!(
            store
                .count_queue_by_status(QueueStatus::Waiting)
                .expect("count"),
            0
        );
    }

    #[test]
    fn successful_transaction_keeps_its_writes() {
        let store = MemoryStore::new();
        let patient_id = PatientId::generate();

        store
            .in_transaction(|| {
                store
                    .upsert_patient(Patient {
                        id: patient_id,
                        given_names: vec!["Sarah".into()],
                        family_name: "Williams".into(),
                        birth_date: None,
                        created_at: ten_am(),
                    })
                    .map_err(FlowError::Storage)?;
                Ok(())
            })
            .expect("transaction succeeds");

        assert!(store.patient(patient_id).expect("read").is_some());
    }
}
