//! Waiting-queue coordination.
//!
//! Owns today's physical queue: entry creation, the visit-status state
//! machine, position assignment and call-next selection. Positions among
//! waiting entries always form a contiguous 1..N sequence ordered by
//! (priority desc, check-in asc); any mutation that can change the waiting
//! set triggers a full recomputation rather than an incremental patch, run
//! inside the store's recalculation scope so two recomputations never
//! interleave.

use crate::clock::Clock;
use crate::error::{FlowError, FlowResult};
use crate::ids::{PatientId, QueueEntryId, StaffId, VisitId};
use crate::storage::{lost_update_to_concurrency, Storage, StorageError};
use crate::triage::TriageLevel;
use chrono::{DateTime, Utc};
use flow_types::NonEmptyText;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Queue priority, assigned from the triage level at creation and immutable
/// thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Sort rank: lower sorts earlier in the queue.
    fn rank(self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }

    /// Wire/storage representation.
    pub fn as_wire(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    /// Parses the wire representation.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "high" => Some(Priority::High),
            "medium" => Some(Priority::Medium),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }
}

impl From<TriageLevel> for Priority {
    fn from(level: TriageLevel) -> Self {
        match level {
            TriageLevel::High => Priority::High,
            TriageLevel::Medium => Priority::Medium,
            TriageLevel::Low => Priority::Low,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_wire())
    }
}

/// Lifecycle status of a queue entry.
///
/// `completed` is terminal. `cancelled` is semi-terminal: a cancelled entry
/// can be re-admitted to `waiting`, and entries are never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueStatus {
    Waiting,
    InProgress,
    Completed,
    Cancelled,
}

impl QueueStatus {
    /// Wire/storage representation.
    pub fn as_wire(self) -> &'static str {
        match self {
            QueueStatus::Waiting => "waiting",
            QueueStatus::InProgress => "in-progress",
            QueueStatus::Completed => "completed",
            QueueStatus::Cancelled => "cancelled",
        }
    }

    /// Parses the wire representation.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(QueueStatus::Waiting),
            "in-progress" => Some(QueueStatus::InProgress),
            "completed" => Some(QueueStatus::Completed),
            "cancelled" => Some(QueueStatus::Cancelled),
            _ => None,
        }
    }

    /// The static transition table. Anything not listed here is rejected at
    /// the boundary with an invalid-transition error.
    pub fn can_transition_to(self, target: QueueStatus) -> bool {
        use QueueStatus::*;
        matches!(
            (self, target),
            (Waiting, InProgress)
                | (Waiting, Cancelled)
                | (InProgress, Completed)
                | (InProgress, Cancelled)
                | (InProgress, Waiting)
                | (Cancelled, Waiting)
        )
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_wire())
    }
}

/// One patient's place in today's queue. References exactly one visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub id: QueueEntryId,
    pub visit: VisitId,
    pub patient: PatientId,
    /// Assigned when the patient is called.
    pub doctor: Option<StaffId>,
    pub room: Option<NonEmptyText>,
    /// 1-based rank among waiting entries; meaningful only while
    /// `status == Waiting`.
    pub position: u32,
    pub status: QueueStatus,
    pub priority: Priority,
    pub check_in_time: DateTime<Utc>,
    pub called_time: Option<DateTime<Utc>>,
    pub consultation_start: Option<DateTime<Utc>>,
    pub consultation_end: Option<DateTime<Utc>>,
    pub estimated_wait_minutes: u32,
    /// Minutes between check-in and being called; set at completion.
    pub actual_wait_minutes: Option<i64>,
    /// Note recorded when the entry was cancelled.
    pub cancellation_note: Option<NonEmptyText>,
    /// Optimistic-concurrency version, bumped by the store on every write.
    pub version: u64,
}

impl QueueEntry {
    /// Ordering key for position recomputation: priority first, then
    /// first-come-first-served within a priority band.
    fn recalc_key(&self) -> (u8, DateTime<Utc>) {
        (self.priority.rank(), self.check_in_time)
    }

    /// Ordering key for call-next selection.
    fn call_key(&self) -> (u8, u32, DateTime<Utc>) {
        (self.priority.rank(), self.position, self.check_in_time)
    }
}

/// Optional context accompanying a status transition.
#[derive(Debug, Clone, Default)]
pub struct TransitionContext {
    /// Doctor taking over the consultation.
    pub doctor: Option<StaffId>,
    /// Room the patient is being called to.
    pub room: Option<NonEmptyText>,
    /// Reason for a cancellation.
    pub note: Option<NonEmptyText>,
}

/// Stateful coordinator for the waiting queue.
///
/// Performs no concurrency control of its own beyond what the storage
/// contract provides: versioned conditional writes for claims and a
/// serialised scope for position recomputation.
pub struct QueueCoordinator<S, C> {
    store: Arc<S>,
    clock: Arc<C>,
}

impl<S, C> QueueCoordinator<S, C>
where
    S: Storage,
    C: Clock,
{
    pub fn new(store: Arc<S>, clock: Arc<C>) -> Self {
        Self { store, clock }
    }

    /// Adds a visit to the queue.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::DuplicateQueueEntry`] if the visit is already
    /// queued; a visit has at most one queue entry, ever.
    pub fn enqueue(
        &self,
        visit: VisitId,
        patient: PatientId,
        priority: Priority,
        estimated_wait_minutes: u32,
    ) -> FlowResult<QueueEntry> {
        if let Some(existing) = self.store.queue_entry_for_visit(visit)? {
            debug!(entry = %existing.id, %visit, "rejected duplicate enqueue");
            return Err(FlowError::DuplicateQueueEntry { visit });
        }

        let entry = QueueEntry {
            id: QueueEntryId::generate(),
            visit,
            patient,
            doctor: None,
            room: None,
            position: 0,
            status: QueueStatus::Waiting,
            priority,
            check_in_time: self.clock.now(),
            called_time: None,
            consultation_start: None,
            consultation_end: None,
            estimated_wait_minutes,
            actual_wait_minutes: None,
            cancellation_note: None,
            version: 0,
        };

        let stored = self.store.insert_queue_entry(entry)?;
        self.recalculate_positions()?;

        debug!(entry = %stored.id, %priority, "enqueued visit");
        self.reread(stored.id)
    }

    /// Applies a status transition from the table in [`QueueStatus`].
    ///
    /// On an illegal transition the entry is left untouched and
    /// [`FlowError::InvalidTransition`] is returned with the current and
    /// attempted statuses.
    pub fn transition(
        &self,
        id: QueueEntryId,
        target: QueueStatus,
        ctx: TransitionContext,
    ) -> FlowResult<QueueEntry> {
        let entry = self.require_entry(id)?;
        if !entry.status.can_transition_to(target) {
            return Err(FlowError::InvalidTransition {
                from: entry.status,
                to: target,
            });
        }

        let previous = entry.status;
        let updated = apply_transition(entry, target, &ctx, self.clock.now());
        let stored = self
            .store
            .update_queue_entry(updated)
            .map_err(lost_update_to_concurrency)?;

        debug!(entry = %id, from = %previous, to = %target, "queue transition");

        // Membership or ordering of the waiting set changed: recompute.
        if previous == QueueStatus::Waiting || target == QueueStatus::Waiting {
            self.recalculate_positions()?;
            return self.reread(id);
        }

        Ok(stored)
    }

    /// Calls the next waiting patient for a doctor.
    ///
    /// Selection order is (priority desc, position asc, check-in asc). The
    /// claim is a conditional versioned write: if another doctor claims the
    /// same entry first, the write is lost and the selection is retried once
    /// against the fresh waiting set before giving up with
    /// [`FlowError::Concurrency`].
    pub fn call_next(
        &self,
        doctor: StaffId,
        room: Option<NonEmptyText>,
    ) -> FlowResult<QueueEntry> {
        let staff = self
            .store
            .staff(doctor)?
            .filter(|s| s.is_active_doctor())
            .ok_or(FlowError::NotFound {
                kind: "doctor",
                id: doctor.to_string(),
            })?;

        const CLAIM_ATTEMPTS: usize = 2;
        for attempt in 0..CLAIM_ATTEMPTS {
            let mut waiting = self.store.waiting_entries()?;
            if waiting.is_empty() {
                return Err(FlowError::EmptyQueue);
            }
            waiting.sort_by_key(QueueEntry::call_key);
            let candidate = waiting.remove(0);
            let candidate_id = candidate.id;

            let claimed = apply_transition(
                candidate,
                QueueStatus::InProgress,
                &TransitionContext {
                    doctor: Some(staff.id),
                    room: room.clone(),
                    note: None,
                },
                self.clock.now(),
            );

            match self.store.update_queue_entry(claimed) {
                Ok(stored) => {
                    self.recalculate_positions()?;
                    debug!(entry = %stored.id, doctor = %staff.id, "claimed next patient");
                    return Ok(stored);
                }
                Err(StorageError::LostUpdate { .. }) => {
                    warn!(
                        entry = %candidate_id,
                        doctor = %staff.id,
                        attempt,
                        "claim lost to a concurrent caller, reselecting"
                    );
                    continue;
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(FlowError::Concurrency(
            "could not claim a waiting entry after retry".into(),
        ))
    }

    /// Cancels an entry with a mandatory reason and recomputes positions.
    ///
    /// Equivalent to a `waiting|in-progress -> cancelled` transition; the
    /// entry is retained with its note, never deleted.
    pub fn remove_from_queue(
        &self,
        id: QueueEntryId,
        reason: NonEmptyText,
    ) -> FlowResult<QueueEntry> {
        self.transition(
            id,
            QueueStatus::Cancelled,
            TransitionContext {
                note: Some(reason),
                ..TransitionContext::default()
            },
        )
    }

    /// Recomputes positions 1..N for all waiting entries.
    ///
    /// Runs as a full recompute inside the store's recalculation scope: read
    /// every waiting entry, sort by (priority desc, check-in asc), write the
    /// positions back. Returns the number of waiting entries.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Concurrency`] if a waiting entry was claimed
    /// between the read and the write-back; callers should retry once.
    pub fn recalculate_positions(&self) -> FlowResult<usize> {
        self.store.recalculate_scope(|| {
            let mut waiting = self.store.waiting_entries()?;
            waiting.sort_by_key(QueueEntry::recalc_key);

            let count = waiting.len();
            for (index, mut entry) in waiting.into_iter().enumerate() {
                let position = (index + 1) as u32;
                if entry.position != position {
                    entry.position = position;
                    self.store
                        .update_queue_entry(entry)
                        .map_err(lost_update_to_concurrency)?;
                }
            }

            debug!(waiting = count, "recalculated queue positions");
            Ok(count)
        })
    }

    fn require_entry(&self, id: QueueEntryId) -> FlowResult<QueueEntry> {
        self.store.queue_entry(id)?.ok_or(FlowError::NotFound {
            kind: "queue entry",
            id: id.to_string(),
        })
    }

    fn reread(&self, id: QueueEntryId) -> FlowResult<QueueEntry> {
        self.require_entry(id)
    }
}

/// Applies the side effects of a legal transition. Callers must have checked
/// the transition table first.
fn apply_transition(
    mut entry: QueueEntry,
    target: QueueStatus,
    ctx: &TransitionContext,
    now: DateTime<Utc>,
) -> QueueEntry {
    match (entry.status, target) {
        (QueueStatus::Waiting, QueueStatus::InProgress) => {
            entry.called_time = Some(now);
            entry.consultation_start = Some(now);
            if ctx.doctor.is_some() {
                entry.doctor = ctx.doctor;
            }
            if ctx.room.is_some() {
                entry.room = ctx.room.clone();
            }
        }
        (QueueStatus::Waiting, QueueStatus::Cancelled)
        | (QueueStatus::InProgress, QueueStatus::Cancelled) => {
            entry.cancellation_note = ctx.note.clone();
        }
        (QueueStatus::InProgress, QueueStatus::Completed) => {
            entry.consultation_end = Some(now);
            entry.actual_wait_minutes = entry
                .called_time
                .map(|called| (called - entry.check_in_time).num_minutes());
        }
        (QueueStatus::InProgress, QueueStatus::Waiting)
        | (QueueStatus::Cancelled, QueueStatus::Waiting) => {
            // Re-entering the waiting set: clear the assignment so the entry
            // is indistinguishable from a fresh one apart from its original
            // check-in time.
            entry.doctor = None;
            entry.room = None;
            entry.called_time = None;
            entry.consultation_start = None;
            entry.consultation_end = None;
            entry.cancellation_note = None;
        }
        _ => {}
    }

    entry.status = target;
    entry
}
