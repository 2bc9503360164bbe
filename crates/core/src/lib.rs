//! # Flow Core
//!
//! Core engine for the patient-flow prioritisation system: the subsystem
//! that turns raw check-in data and scheduling requests into an ordered,
//! continuously-consistent waiting queue and a conflict-free appointment
//! calendar.
//!
//! Four cooperating components:
//! - [`triage::TriageScorer`] - pure, deterministic scoring of vitals and
//!   symptom text into a priority level;
//! - [`wait::estimate_wait`] - queue depth into a quoted wait;
//! - [`queue::QueueCoordinator`] - position ordering and the visit-status
//!   state machine under concurrent updates;
//! - [`scheduling::AppointmentScheduler`] - time-overlap conflict detection
//!   and alternative-slot search.
//!
//! [`checkin::CheckInService`] ties the first three together for walk-in
//! check-in, as a single transactional unit over the [`storage::Storage`]
//! contract.
//!
//! **No API concerns**: HTTP routing, request validation schemas,
//! authentication and persistence technology belong to the surrounding
//! application, not this crate.

pub mod checkin;
pub mod clock;
pub mod config;
pub mod error;
pub mod ids;
pub mod queue;
pub mod records;
pub mod scheduling;
pub mod storage;
pub mod triage;
pub mod wait;

pub use checkin::{CheckInOutcome, CheckInRequest, CheckInService, PatientDetails};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::EngineConfig;
pub use error::{FlowError, FlowResult};
pub use ids::{AppointmentId, PatientId, QueueEntryId, StaffId, TrackingToken, VisitId};
pub use queue::{Priority, QueueCoordinator, QueueEntry, QueueStatus, TransitionContext};
pub use records::{Patient, Staff, StaffRole, Visit};
pub use scheduling::{
    Appointment, AppointmentScheduler, AppointmentStatus, AppointmentType, AvailabilityReport,
    NewAppointment,
};
pub use storage::{CommitCheck, MemoryStore, Storage, StorageError};
pub use triage::{TriageLevel, TriageResult, TriageScorer, Vitals};
pub use wait::estimate_wait;
