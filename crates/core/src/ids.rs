//! Typed identifiers for the records the engine coordinates.
//!
//! Every record family gets its own newtype over a v4 UUID so a doctor id
//! can never be passed where a patient id is expected. The wire form is the
//! hyphenated lowercase UUID string.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Allocates a fresh random identifier.
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parses an identifier from its string form.
            pub fn parse(input: &str) -> Result<Self, uuid::Error> {
                Ok(Self(Uuid::parse_str(input)?))
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Identifier of a patient record.
    PatientId
);
define_id!(
    /// Identifier of a staff member (doctor, nurse, reception, admin).
    StaffId
);
define_id!(
    /// Identifier of a visit created at check-in.
    VisitId
);
define_id!(
    /// Identifier of an entry in the waiting queue.
    QueueEntryId
);
define_id!(
    /// Identifier of a scheduled appointment.
    AppointmentId
);

/// Opaque token issued at check-in so a patient can query their own queue
/// position without authenticating.
///
/// The token is an unguessable random value, rendered without hyphens to
/// keep it short enough to print on a check-in slip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingToken(Uuid);

impl TrackingToken {
    /// Issues a fresh tracking token.
    pub fn issue() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a token from its printed form.
    pub fn parse(input: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(input)?))
    }
}

impl std::fmt::Display for TrackingToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}
