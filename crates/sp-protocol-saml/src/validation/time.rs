//! Validity windows.
//!
//! A window `[not_before, not_on_or_after)` is widened by the clock skew on
//! both ends. The lower bound is inclusive and the upper bound exclusive, so
//! a message is rejected at the exact instant it expires.

use chrono::{DateTime, Duration, Utc};

use crate::error::{SamlError, SamlResult};
use crate::types::format_instant;

/// Returns true if `now` is at or after `not_before - skew`.
#[must_use]
pub fn not_before_valid(not_before: DateTime<Utc>, now: DateTime<Utc>, skew: Duration) -> bool {
    not_before - skew <= now
}

/// Returns true if `now` is strictly before `not_on_or_after + skew`.
#[must_use]
pub fn not_on_or_after_valid(
    not_on_or_after: DateTime<Utc>,
    now: DateTime<Utc>,
    skew: Duration,
) -> bool {
    now < not_on_or_after + skew
}

/// Checks an optional window; absent bounds do not restrict.
///
/// # Errors
///
/// Returns [`SamlError::NotYetValid`] or [`SamlError::Expired`] naming
/// `element`.
pub fn validate_time_window(
    element: &'static str,
    not_before: Option<DateTime<Utc>>,
    not_on_or_after: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    skew: Duration,
) -> SamlResult<()> {
    if let Some(not_before) = not_before {
        if !not_before_valid(not_before, now, skew) {
            return Err(SamlError::NotYetValid {
                element,
                not_before: format_instant(&not_before),
            });
        }
    }
    if let Some(not_on_or_after) = not_on_or_after {
        if !not_on_or_after_valid(not_on_or_after, now, skew) {
            return Err(SamlError::Expired {
                element,
                not_on_or_after: format_instant(&not_on_or_after),
            });
        }
    }
    Ok(())
}

/// Requires `not_before` to strictly precede `not_on_or_after` when both are
/// present.
pub(crate) fn require_ordered(
    element: &str,
    not_before: Option<DateTime<Utc>>,
    not_on_or_after: Option<DateTime<Utc>>,
) -> SamlResult<()> {
    match (not_before, not_on_or_after) {
        (Some(start), Some(end)) if start >= end => Err(SamlError::SchemaViolation(format!(
            "{element}: NotBefore must be earlier than NotOnOrAfter"
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lower_bound_is_inclusive() {
        let now = Utc::now();
        assert!(not_before_valid(now, now, Duration::zero()));
        assert!(!not_before_valid(now + Duration::seconds(1), now, Duration::zero()));
        assert!(not_before_valid(now + Duration::seconds(30), now, Duration::seconds(30)));
    }

    #[test]
    fn upper_bound_is_exclusive() {
        let now = Utc::now();
        assert!(!not_on_or_after_valid(now, now, Duration::zero()));
        assert!(not_on_or_after_valid(now + Duration::milliseconds(1), now, Duration::zero()));
        assert!(not_on_or_after_valid(now, now, Duration::seconds(1)));
        assert!(!not_on_or_after_valid(now - Duration::seconds(1), now, Duration::seconds(1)));
    }

    #[test]
    fn window_reports_which_bound_failed() {
        let now = Utc::now();
        let hour = Duration::hours(1);
        assert!(validate_time_window("Conditions", Some(now - hour), Some(now + hour), now, Duration::zero()).is_ok());
        assert!(validate_time_window("Conditions", None, None, now, Duration::zero()).is_ok());
        assert!(matches!(
            validate_time_window("Conditions", Some(now + hour), None, now, Duration::zero()),
            Err(SamlError::NotYetValid { element: "Conditions", .. })
        ));
        assert!(matches!(
            validate_time_window("SubjectConfirmationData", None, Some(now), now, Duration::zero()),
            Err(SamlError::Expired { element: "SubjectConfirmationData", .. })
        ));
    }

    #[test]
    fn ordering() {
        let now = Utc::now();
        assert!(require_ordered("Conditions", Some(now), Some(now + Duration::seconds(1))).is_ok());
        assert!(require_ordered("Conditions", Some(now), Some(now)).is_err());
        assert!(require_ordered("Conditions", None, Some(now)).is_ok());
    }
}
