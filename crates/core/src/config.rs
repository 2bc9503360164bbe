//! Engine runtime configuration.
//!
//! Configuration is resolved once at process startup and passed into the
//! services behind an `Arc`. Nothing in the engine reads environment
//! variables during request handling; inconsistent mid-request behaviour in
//! multi-threaded runtimes and test harnesses is exactly what this layout
//! avoids.

use crate::error::{FlowError, FlowResult};
use chrono::FixedOffset;
use flow_types::Minutes;

/// Scheduling and queueing parameters for one clinic.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    opening_hour: u32,
    closing_hour: u32,
    slot_increment_minutes: u32,
    min_lead_time_minutes: u32,
    min_service_duration: Minutes,
    max_service_duration: Minutes,
    default_consult_minutes: Minutes,
    suggestion_limit: usize,
    suggestion_horizon_days: u32,
    clinic_utc_offset_minutes: i32,
}

impl EngineConfig {
    /// Creates a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Validation`] if:
    /// - the business-hours window is empty or extends past midnight,
    /// - the slot increment is zero or does not divide a whole hour,
    /// - the service duration bounds are inverted,
    /// - the clinic UTC offset is outside ±14 hours.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        opening_hour: u32,
        closing_hour: u32,
        slot_increment_minutes: u32,
        min_lead_time_minutes: u32,
        min_service_duration: Minutes,
        max_service_duration: Minutes,
        default_consult_minutes: Minutes,
        suggestion_limit: usize,
        suggestion_horizon_days: u32,
        clinic_utc_offset_minutes: i32,
    ) -> FlowResult<Self> {
        if opening_hour >= closing_hour || closing_hour > 24 {
            return Err(FlowError::Validation(format!(
                "business hours [{opening_hour}, {closing_hour}) do not form a valid window"
            )));
        }
        if slot_increment_minutes == 0 || 60 % slot_increment_minutes != 0 {
            return Err(FlowError::Validation(format!(
                "slot increment of {slot_increment_minutes} minutes must evenly divide an hour"
            )));
        }
        if min_service_duration > max_service_duration {
            return Err(FlowError::Validation(format!(
                "service duration bounds are inverted: {min_service_duration} > {max_service_duration}"
            )));
        }
        if clinic_utc_offset_minutes.abs() > 14 * 60 {
            return Err(FlowError::Validation(format!(
                "clinic UTC offset of {clinic_utc_offset_minutes} minutes is outside +/-14 hours"
            )));
        }

        Ok(Self {
            opening_hour,
            closing_hour,
            slot_increment_minutes,
            min_lead_time_minutes,
            min_service_duration,
            max_service_duration,
            default_consult_minutes,
            suggestion_limit,
            suggestion_horizon_days,
            clinic_utc_offset_minutes,
        })
    }

    /// First hour of the business day (inclusive), in clinic local time.
    pub fn opening_hour(&self) -> u32 {
        self.opening_hour
    }

    /// Hour the clinic closes (exclusive), in clinic local time.
    pub fn closing_hour(&self) -> u32 {
        self.closing_hour
    }

    /// Granularity of the alternative-slot search.
    pub fn slot_increment_minutes(&self) -> u32 {
        self.slot_increment_minutes
    }

    /// Minimum notice required before an appointment may start.
    pub fn min_lead_time_minutes(&self) -> u32 {
        self.min_lead_time_minutes
    }

    /// Shortest bookable appointment at the service level.
    pub fn min_service_duration(&self) -> Minutes {
        self.min_service_duration
    }

    /// Longest bookable appointment at the service level.
    pub fn max_service_duration(&self) -> Minutes {
        self.max_service_duration
    }

    /// Average consultation length used when quoting wait times.
    pub fn default_consult_minutes(&self) -> Minutes {
        self.default_consult_minutes
    }

    /// Maximum number of alternative slots returned per availability check.
    pub fn suggestion_limit(&self) -> usize {
        self.suggestion_limit
    }

    /// Number of days the alternative-slot search looks ahead.
    pub fn suggestion_horizon_days(&self) -> u32 {
        self.suggestion_horizon_days
    }

    /// The clinic's fixed offset from UTC, used to interpret business hours.
    pub fn clinic_offset(&self) -> FixedOffset {
        // Validated to be within +/-14h in `new`, so this cannot fail.
        FixedOffset::east_opt(self.clinic_utc_offset_minutes * 60)
            .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is always valid"))
    }
}

impl Default for EngineConfig {
    /// Standard clinic profile: 09:00-17:00 business hours, 30-minute slots,
    /// one hour of lead time, 15-120 minute bookings, 15-minute average
    /// consultations, three suggestions over a three-day horizon, UTC clinic
    /// time.
    fn default() -> Self {
        Self {
            opening_hour: 9,
            closing_hour: 17,
            slot_increment_minutes: 30,
            min_lead_time_minutes: 60,
            min_service_duration: Minutes::new(15).expect("non-zero"),
            max_service_duration: Minutes::new(120).expect("non-zero"),
            default_consult_minutes: Minutes::new(15).expect("non-zero"),
            suggestion_limit: 3,
            suggestion_horizon_days: 3,
            clinic_utc_offset_minutes: 0,
        }
    }
}
