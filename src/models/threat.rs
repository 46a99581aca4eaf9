use std::fmt;

use serde::{Deserialize, Serialize};

/// Result of the admission pipeline for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Admission {
    /// Request may proceed to middleware and routing.
    Pass,
    /// Client is serving a suspension.
    Suspended,
    /// Client's token bucket is empty.
    Throttled,
}

impl Admission {
    pub fn is_pass(&self) -> bool {
        matches!(self, Admission::Pass)
    }

    /// Fixed body sent with the 429 for a rejected admission.
    pub fn rejection_message(&self) -> Option<&'static str> {
        match self {
            Admission::Pass => None,
            Admission::Suspended => Some("client suspended"),
            Admission::Throttled => Some("rate limit exceeded"),
        }
    }
}

/// Which behavior detector flagged a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Detection {
    /// Too many 404s inside the window.
    NotFoundFlood,
    /// Near-constant request cadence.
    UniformCadence,
}

impl fmt::Display for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Detection::NotFoundFlood => write!(f, "not_found_flood"),
            Detection::UniformCadence => write!(f, "uniform_cadence"),
        }
    }
}

/// Final outcome of a dispatched request, as written to the access log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Served,
    NotFound,
    Suspended,
    Throttled,
    MiddlewareFailed,
    /// Body exceeded `server.max_body_size`.
    BodyTooLarge,
    /// Body could not be read.
    BadBody,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Served => "served",
            Outcome::NotFound => "not_found",
            Outcome::Suspended => "suspended",
            Outcome::Throttled => "throttled",
            Outcome::MiddlewareFailed => "middleware_failed",
            Outcome::BodyTooLarge => "body_too_large",
            Outcome::BadBody => "bad_body",
        }
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, Outcome::Suspended | Outcome::Throttled)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Admission> for Outcome {
    fn from(admission: Admission) -> Self {
        match admission {
            Admission::Pass => Outcome::Served,
            Admission::Suspended => Outcome::Suspended,
            Admission::Throttled => Outcome::Throttled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_messages() {
        assert_eq!(Admission::Pass.rejection_message(), None);
        assert_eq!(Admission::Suspended.rejection_message(), Some("client suspended"));
        assert_eq!(Admission::Throttled.rejection_message(), Some("rate limit exceeded"));
    }

    #[test]
    fn test_outcome_serializes_snake_case() {
        let json = serde_json::to_string(&Outcome::MiddlewareFailed).unwrap();
        assert_eq!(json, "\"middleware_failed\"");
        assert!(Outcome::from(Admission::Throttled).is_rejection());
        assert!(!Outcome::NotFound.is_rejection());
        assert_eq!(
            serde_json::to_string(&Outcome::BodyTooLarge).unwrap(),
            format!("\"{}\"", Outcome::BodyTooLarge.as_str())
        );
    }
}
