//! Patient, staff and visit records.
//!
//! These are the minimal record shapes the engine needs to coordinate flow.
//! Full demographic management is a separate concern; the engine only ever
//! upserts the fields captured on the check-in form and reads the staff
//! role/active flag when a doctor reference must be validated.

use crate::ids::{PatientId, StaffId, VisitId};
use crate::triage::{TriageLevel, Vitals};
use chrono::{DateTime, NaiveDate, Utc};
use flow_types::NonEmptyText;
use serde::{Deserialize, Serialize};

/// A patient demographic record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: PatientId,
    /// Given names in order (first name, middle names).
    pub given_names: Vec<String>,
    /// Family name (surname).
    pub family_name: String,
    /// Date of birth, when known.
    pub birth_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

/// Professional role of a staff member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StaffRole {
    Doctor,
    Nurse,
    Reception,
    Admin,
}

impl StaffRole {
    /// Wire/storage representation.
    pub fn as_wire(self) -> &'static str {
        match self {
            StaffRole::Doctor => "doctor",
            StaffRole::Nurse => "nurse",
            StaffRole::Reception => "reception",
            StaffRole::Admin => "admin",
        }
    }

    /// Parses the wire representation.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "doctor" => Some(StaffRole::Doctor),
            "nurse" => Some(StaffRole::Nurse),
            "reception" => Some(StaffRole::Reception),
            "admin" => Some(StaffRole::Admin),
            _ => None,
        }
    }
}

impl std::fmt::Display for StaffRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_wire())
    }
}

/// A staff member record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Staff {
    pub id: StaffId,
    pub display_name: NonEmptyText,
    pub role: StaffRole,
    /// Inactive staff keep their record but can no longer be assigned
    /// patients or appointments.
    pub active: bool,
}

impl Staff {
    /// True when this staff member may be assigned patients as a doctor.
    pub fn is_active_doctor(&self) -> bool {
        self.active && self.role == StaffRole::Doctor
    }
}

/// One clinical visit, created at check-in.
///
/// The visit snapshots what was known at the door: the vitals reading, the
/// symptom text and the triage outcome. Later edits to the patient record
/// never rewrite history here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visit {
    pub id: VisitId,
    pub patient: PatientId,
    /// Stated reason for the visit, when one was given.
    pub reason: Option<NonEmptyText>,
    /// Free-text symptom description as entered at the desk.
    pub symptoms: String,
    pub vitals: Vitals,
    pub triage_score: u32,
    pub triage_level: TriageLevel,
    pub created_at: DateTime<Utc>,
}
