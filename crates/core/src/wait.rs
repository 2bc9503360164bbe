//! Quoted wait-time estimation.
//!
//! A deliberately simple model: each patient ahead costs one average
//! consultation interval, and even the patient at the front of the queue is
//! quoted one full interval rather than zero. The estimate is a courtesy
//! figure for the waiting room display, not a guarantee.

use flow_types::Minutes;

/// Estimates the wait in minutes for a patient with `patients_ahead` people
/// in front of them, given the clinic's average consultation length.
///
/// The floor is one consultation interval: `estimate(0, 15) == 15`.
///
/// A negative queue depth is unrepresentable (`u32`), and a zero-length
/// average consultation is rejected at the [`Minutes`] boundary, so this
/// function itself cannot fail.
pub fn estimate_wait(patients_ahead: u32, avg_consult: Minutes) -> u32 {
    let per_patient = avg_consult.get();
    patients_ahead.saturating_mul(per_patient).max(per_patient)
}
