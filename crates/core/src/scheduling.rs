//! Appointment scheduling: conflict detection and slot search.
//!
//! A doctor's calendar may never contain two active appointments with
//! overlapping `[start, start + duration)` intervals. Conflict detection is
//! read-only and may run unsynchronised; the appointment write re-validates
//! inside the store so two bookings that both passed the read-only check
//! cannot both commit.

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::{FlowError, FlowResult};
use crate::ids::{AppointmentId, PatientId, StaffId, VisitId};
use crate::storage::{CommitCheck, Storage};
use chrono::{DateTime, Days, Duration, TimeZone, Timelike, Utc};
use flow_types::{Minutes, NonEmptyText};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Hard bounds on the appointment record itself. The service-level bounds in
/// [`EngineConfig`] are narrower; both apply, see the open-questions section
/// of DESIGN.md.
const ENTITY_MIN_DURATION_MINUTES: u32 = 5;
const ENTITY_MAX_DURATION_MINUTES: u32 = 240;

/// Lifecycle status of an appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    CheckedIn,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// Whether this status occupies calendar time and therefore participates
    /// in conflict detection.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            AppointmentStatus::Scheduled
                | AppointmentStatus::Confirmed
                | AppointmentStatus::CheckedIn
                | AppointmentStatus::InProgress
        )
    }

    /// Wire/storage representation.
    pub fn as_wire(self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::CheckedIn => "checked-in",
            AppointmentStatus::InProgress => "in-progress",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no-show",
        }
    }

    /// Parses the wire representation.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(AppointmentStatus::Scheduled),
            "confirmed" => Some(AppointmentStatus::Confirmed),
            "checked-in" => Some(AppointmentStatus::CheckedIn),
            "in-progress" => Some(AppointmentStatus::InProgress),
            "completed" => Some(AppointmentStatus::Completed),
            "cancelled" => Some(AppointmentStatus::Cancelled),
            "no-show" => Some(AppointmentStatus::NoShow),
            _ => None,
        }
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_wire())
    }
}

/// Kind of encounter being booked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppointmentType {
    Consultation,
    CheckUp,
    FollowUp,
    Procedure,
    Emergency,
}

impl AppointmentType {
    /// Wire/storage representation.
    pub fn as_wire(self) -> &'static str {
        match self {
            AppointmentType::Consultation => "consultation",
            AppointmentType::CheckUp => "check-up",
            AppointmentType::FollowUp => "follow-up",
            AppointmentType::Procedure => "procedure",
            AppointmentType::Emergency => "emergency",
        }
    }

    /// Parses the wire representation.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "consultation" => Some(AppointmentType::Consultation),
            "check-up" => Some(AppointmentType::CheckUp),
            "follow-up" => Some(AppointmentType::FollowUp),
            "procedure" => Some(AppointmentType::Procedure),
            "emergency" => Some(AppointmentType::Emergency),
            _ => None,
        }
    }
}

/// A scheduled future encounter between one patient and one doctor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: AppointmentId,
    pub patient: PatientId,
    pub doctor: StaffId,
    pub scheduled_time: DateTime<Utc>,
    pub duration: Minutes,
    pub status: AppointmentStatus,
    pub appointment_type: AppointmentType,
    pub reason: Option<NonEmptyText>,
    pub notes: Option<String>,
    /// Required exactly when `status == Cancelled`.
    pub cancellation_reason: Option<NonEmptyText>,
    /// Set when the patient walks in and the appointment becomes a visit.
    pub visit: Option<VisitId>,
    /// Optimistic-concurrency version, bumped by the store on every write.
    pub version: u64,
}

impl Appointment {
    /// Builds a new appointment in `scheduled` status.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Validation`] if the duration falls outside the
    /// entity-level bound of 5-240 minutes.
    pub fn new(
        patient: PatientId,
        doctor: StaffId,
        scheduled_time: DateTime<Utc>,
        duration: Minutes,
        appointment_type: AppointmentType,
        reason: Option<NonEmptyText>,
        notes: Option<String>,
    ) -> FlowResult<Self> {
        if duration.get() < ENTITY_MIN_DURATION_MINUTES
            || duration.get() > ENTITY_MAX_DURATION_MINUTES
        {
            return Err(FlowError::Validation(format!(
                "appointment duration of {duration} is outside the {ENTITY_MIN_DURATION_MINUTES}-{ENTITY_MAX_DURATION_MINUTES} minute record bound"
            )));
        }

        Ok(Self {
            id: AppointmentId::generate(),
            patient,
            doctor,
            scheduled_time,
            duration,
            status: AppointmentStatus::Scheduled,
            appointment_type,
            reason,
            notes,
            cancellation_reason: None,
            visit: None,
            version: 0,
        })
    }

    /// Exclusive end of the occupied interval.
    pub fn end_time(&self) -> DateTime<Utc> {
        self.scheduled_time + Duration::minutes(i64::from(self.duration.get()))
    }

    /// Half-open interval overlap: `[self.start, self.end)` intersects
    /// `[start, end)`. Back-to-back appointments do not overlap.
    pub fn overlaps_window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.scheduled_time < end && start < self.end_time()
    }
}

/// Request payload for booking a new appointment.
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub patient: PatientId,
    pub doctor: StaffId,
    pub scheduled_time: DateTime<Utc>,
    pub duration: Minutes,
    pub appointment_type: AppointmentType,
    pub reason: Option<NonEmptyText>,
    pub notes: Option<String>,
}

/// Result of an availability check.
///
/// `suggested_times` is always present; it is empty when the requested slot
/// is free or when no alternative exists inside the search horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityReport {
    pub available: bool,
    pub conflicts: Vec<Appointment>,
    pub suggested_times: Vec<DateTime<Utc>>,
}

/// Stateful scheduler over a doctor's appointment calendar.
pub struct AppointmentScheduler<S, C> {
    store: Arc<S>,
    clock: Arc<C>,
    cfg: Arc<EngineConfig>,
}

impl<S, C> AppointmentScheduler<S, C>
where
    S: Storage,
    C: Clock,
{
    pub fn new(store: Arc<S>, clock: Arc<C>, cfg: Arc<EngineConfig>) -> Self {
        Self { store, clock, cfg }
    }

    /// Returns the active appointments of `doctor` that overlap the window
    /// `[start, start + duration)`, in chronological order.
    ///
    /// `exclude` removes one appointment from consideration so an update can
    /// check against all *other* appointments without conflicting with
    /// itself.
    pub fn find_conflicts(
        &self,
        doctor: StaffId,
        start: DateTime<Utc>,
        duration: Minutes,
        exclude: Option<AppointmentId>,
    ) -> FlowResult<Vec<Appointment>> {
        let end = start + Duration::minutes(i64::from(duration.get()));
        let mut conflicts: Vec<Appointment> = self
            .store
            .active_appointments_for_doctor(doctor)?
            .into_iter()
            .filter(|a| Some(a.id) != exclude)
            .filter(|a| a.overlaps_window(start, end))
            .collect();
        conflicts.sort_by_key(|a| a.scheduled_time);
        Ok(conflicts)
    }

    /// The business-hours gate, independent of conflict detection.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Validation`] naming the violated rule if the
    /// start is not in the future, falls outside business hours, gives less
    /// than the minimum lead time, or the duration is outside the
    /// service-level bound.
    pub fn validate_scheduling_rules(
        &self,
        start: DateTime<Utc>,
        duration: Minutes,
    ) -> FlowResult<()> {
        let now = self.clock.now();

        if start <= now {
            return Err(FlowError::Validation(
                "appointment must be scheduled in the future".into(),
            ));
        }

        let local_hour = start.with_timezone(&self.cfg.clinic_offset()).hour();
        if local_hour < self.cfg.opening_hour() || local_hour >= self.cfg.closing_hour() {
            return Err(FlowError::Validation(format!(
                "appointments must start between {:02}:00 and {:02}:00",
                self.cfg.opening_hour(),
                self.cfg.closing_hour()
            )));
        }

        let lead = start - now;
        if lead < Duration::minutes(i64::from(self.cfg.min_lead_time_minutes())) {
            return Err(FlowError::Validation(format!(
                "appointments require at least {} minutes notice",
                self.cfg.min_lead_time_minutes()
            )));
        }

        if duration < self.cfg.min_service_duration() || duration > self.cfg.max_service_duration()
        {
            return Err(FlowError::Validation(format!(
                "appointment duration must be between {} and {}",
                self.cfg.min_service_duration(),
                self.cfg.max_service_duration()
            )));
        }

        Ok(())
    }

    /// Greedy search for free slots near a preferred time.
    ///
    /// Walks day offsets 0..horizon from the preferred date, and within each
    /// day walks business hours in slot-increment steps, collecting free
    /// candidates in chronological order until the suggestion quota is met.
    /// Candidates at or before "now" are skipped. Returns an empty list (never
    /// an error) when the horizon holds no free slot.
    ///
    /// The doctor's active appointments are fetched once for the whole
    /// horizon and scanned in memory; the outcome is identical to running a
    /// full conflict query per candidate.
    pub fn suggest_alternative_slots(
        &self,
        doctor: StaffId,
        preferred_start: DateTime<Utc>,
        duration: Minutes,
    ) -> FlowResult<Vec<DateTime<Utc>>> {
        let now = self.clock.now();
        let offset = self.cfg.clinic_offset();
        let horizon_days = self.cfg.suggestion_horizon_days();
        let step = self.cfg.slot_increment_minutes();
        let quota = self.cfg.suggestion_limit();

        // One fetch covers every candidate the walk below can produce.
        let window_start = now - Duration::minutes(i64::from(ENTITY_MAX_DURATION_MINUTES));
        let window_end = preferred_start + Duration::days(i64::from(horizon_days) + 1);
        let booked: Vec<Appointment> = self
            .store
            .appointments_for_doctor_in_range(doctor, window_start, window_end)?
            .into_iter()
            .filter(|a| a.status.is_active())
            .collect();

        let slot_length = Duration::minutes(i64::from(duration.get()));
        let preferred_local = preferred_start.with_timezone(&offset);
        let mut slots = Vec::new();

        'days: for day in 0..horizon_days {
            let Some(date) = preferred_local
                .date_naive()
                .checked_add_days(Days::new(u64::from(day)))
            else {
                break;
            };

            for hour in self.cfg.opening_hour()..self.cfg.closing_hour() {
                let mut minute = 0;
                while minute < 60 {
                    let Some(naive) = date.and_hms_opt(hour, minute, 0) else {
                        minute += step;
                        continue;
                    };
                    minute += step;

                    let Some(local) = offset.from_local_datetime(&naive).single() else {
                        continue;
                    };
                    let candidate = local.with_timezone(&Utc);
                    if candidate <= now {
                        continue;
                    }

                    let end = candidate + slot_length;
                    if booked.iter().any(|a| a.overlaps_window(candidate, end)) {
                        continue;
                    }

                    slots.push(candidate);
                    if slots.len() >= quota {
                        break 'days;
                    }
                }
            }
        }

        debug!(
            doctor = %doctor,
            found = slots.len(),
            "alternative slot search finished"
        );
        Ok(slots)
    }

    /// Checks whether a slot is bookable, returning the conflicts and (when
    /// the slot is taken) up to the configured number of alternatives.
    pub fn check_availability(
        &self,
        doctor: StaffId,
        start: DateTime<Utc>,
        duration: Minutes,
        exclude: Option<AppointmentId>,
    ) -> FlowResult<AvailabilityReport> {
        let conflicts = self.find_conflicts(doctor, start, duration, exclude)?;
        let available = conflicts.is_empty();
        let suggested_times = if available {
            Vec::new()
        } else {
            self.suggest_alternative_slots(doctor, start, duration)?
        };

        Ok(AvailabilityReport {
            available,
            conflicts,
            suggested_times,
        })
    }

    /// Books a new appointment.
    ///
    /// Runs the business-hours gate, validates the doctor and patient
    /// references, checks for conflicts, and writes through the store's
    /// guarded insert, which re-validates the overlap at commit time so a
    /// concurrent booking cannot slip in between check and write.
    pub fn create_appointment(&self, request: NewAppointment) -> FlowResult<Appointment> {
        self.validate_scheduling_rules(request.scheduled_time, request.duration)?;

        let doctor = self
            .store
            .doctor(request.doctor)?
            .ok_or(FlowError::NotFound {
                kind: "doctor",
                id: request.doctor.to_string(),
            })?;
        if self.store.patient(request.patient)?.is_none() {
            return Err(FlowError::NotFound {
                kind: "patient",
                id: request.patient.to_string(),
            });
        }

        let conflicts = self.find_conflicts(
            doctor.id,
            request.scheduled_time,
            request.duration,
            None,
        )?;
        if !conflicts.is_empty() {
            return Err(FlowError::Conflict {
                conflicts: conflicts.into_iter().map(|a| a.id).collect(),
            });
        }

        let appointment = Appointment::new(
            request.patient,
            doctor.id,
            request.scheduled_time,
            request.duration,
            request.appointment_type,
            request.reason,
            request.notes,
        )?;

        match self.store.insert_appointment_checked(appointment)? {
            CommitCheck::Stored(stored) => {
                debug!(appointment = %stored.id, doctor = %stored.doctor, "booked appointment");
                Ok(stored)
            }
            // A concurrent booking won the race between our read-only check
            // and the write.
            CommitCheck::Overlaps(conflicts) => Err(FlowError::Conflict { conflicts }),
        }
    }

    /// Cancels an appointment with a mandatory reason. Terminal.
    pub fn cancel(&self, id: AppointmentId, reason: NonEmptyText) -> FlowResult<Appointment> {
        let mut appointment = self.require_appointment(id)?;
        if !appointment.status.is_active() {
            return Err(FlowError::Validation(format!(
                "cannot cancel an appointment that is {}",
                appointment.status
            )));
        }

        appointment.status = AppointmentStatus::Cancelled;
        appointment.cancellation_reason = Some(reason);
        self.write_update(appointment)
    }

    /// Moves an appointment to a new slot.
    ///
    /// Rescheduling is modelled as update-then-reconflict-check: the rules
    /// gate and the conflict check both run against the new slot, with the
    /// appointment's own id excluded so it never conflicts with itself.
    pub fn update_time(
        &self,
        id: AppointmentId,
        new_start: DateTime<Utc>,
        new_duration: Minutes,
    ) -> FlowResult<Appointment> {
        self.validate_scheduling_rules(new_start, new_duration)?;

        let mut appointment = self.require_appointment(id)?;
        if !appointment.status.is_active() {
            return Err(FlowError::Validation(format!(
                "cannot reschedule an appointment that is {}",
                appointment.status
            )));
        }

        let conflicts =
            self.find_conflicts(appointment.doctor, new_start, new_duration, Some(id))?;
        if !conflicts.is_empty() {
            return Err(FlowError::Conflict {
                conflicts: conflicts.into_iter().map(|a| a.id).collect(),
            });
        }

        appointment.scheduled_time = new_start;
        appointment.duration = new_duration;
        self.write_update(appointment)
    }

    /// Marks an appointment as checked in and links the visit created at the
    /// front desk. Allowed from `scheduled` or `confirmed` only.
    pub fn mark_checked_in(&self, id: AppointmentId, visit: VisitId) -> FlowResult<Appointment> {
        let mut appointment = self.require_appointment(id)?;
        if !matches!(
            appointment.status,
            AppointmentStatus::Scheduled | AppointmentStatus::Confirmed
        ) {
            return Err(FlowError::Validation(format!(
                "cannot check in an appointment that is {}",
                appointment.status
            )));
        }

        appointment.status = AppointmentStatus::CheckedIn;
        appointment.visit = Some(visit);
        self.write_update(appointment)
    }

    fn require_appointment(&self, id: AppointmentId) -> FlowResult<Appointment> {
        self.store.appointment(id)?.ok_or(FlowError::NotFound {
            kind: "appointment",
            id: id.to_string(),
        })
    }

    fn write_update(&self, appointment: Appointment) -> FlowResult<Appointment> {
        match self.store.update_appointment_checked(appointment) {
            Ok(CommitCheck::Stored(stored)) => Ok(stored),
            Ok(CommitCheck::Overlaps(conflicts)) => Err(FlowError::Conflict { conflicts }),
            Err(err) => Err(crate::storage::lost_update_to_concurrency(err)),
        }
    }
}
