//! Validated primitive types shared across the patient-flow workspace.
//!
//! These wrappers exist so that invalid values are rejected once, at the
//! boundary where a string or number enters the system, rather than being
//! re-checked in every service that touches them.

/// Errors that can occur when constructing validated primitive types.
#[derive(Debug, thiserror::Error)]
pub enum PrimitiveError {
    /// The input text was empty or contained only whitespace.
    #[error("text cannot be empty")]
    EmptyText,
    /// A minute count of zero was supplied where a real duration is required.
    #[error("duration must be at least one minute")]
    ZeroMinutes,
}

/// A string type that guarantees non-empty, trimmed content.
///
/// Used wherever free text carries meaning the engine must not lose: room
/// labels, cancellation reasons, visit reasons. Leading and trailing
/// whitespace is removed during construction; an input that trims to nothing
/// is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText`, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`PrimitiveError::EmptyText`] if the trimmed input is empty.
    pub fn new(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(PrimitiveError::EmptyText);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the wrapper and returns the inner `String`.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// A duration expressed in whole minutes, guaranteed to be at least one.
///
/// Consultation lengths and appointment durations are clinic-facing values
/// quoted in minutes; sub-minute precision is never meaningful here, and a
/// zero-length duration is always a caller mistake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Minutes(u32);

impl Minutes {
    /// Creates a new `Minutes` value.
    ///
    /// # Errors
    ///
    /// Returns [`PrimitiveError::ZeroMinutes`] if `value` is zero.
    pub fn new(value: u32) -> Result<Self, PrimitiveError> {
        if value == 0 {
            return Err(PrimitiveError::ZeroMinutes);
        }
        Ok(Self(value))
    }

    /// Returns the minute count.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for Minutes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} min", self.0)
    }
}

impl serde::Serialize for Minutes {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u32(self.0)
    }
}

impl<'de> serde::Deserialize<'de> for Minutes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = u32::deserialize(deserializer)?;
        Minutes::new(value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_text_trims_whitespace() {
        let text = NonEmptyText::new("  Room 4  ").expect("valid text");
        assert_eq!(text.as_str(), "Room 4");
    }

    #[test]
    fn non_empty_text_rejects_whitespace_only() {
        let err = NonEmptyText::new("   \t").expect_err("should reject");
        assert!(matches!(err, PrimitiveError::EmptyText));
    }

    #[test]
    fn minutes_rejects_zero() {
        let err = Minutes::new(0).expect_err("should reject zero");
        assert!(matches!(err, PrimitiveError::ZeroMinutes));
    }

    #[test]
    fn minutes_round_trips_through_serde() {
        let minutes = Minutes::new(30).expect("valid minutes");
        let json = serde_json::to_string(&minutes).expect("serialise");
        assert_eq!(json, "30");
        let back: Minutes = serde_json::from_str(&json).expect("deserialise");
        assert_eq!(back, minutes);
    }

    #[test]
    fn minutes_deserialisation_rejects_zero() {
        let result: Result<Minutes, _> = serde_json::from_str("0");
        assert!(result.is_err());
    }
}
