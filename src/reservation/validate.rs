use crate::limits::*;
use crate::model::*;

use super::ValidationError;

/// A request that passed every rule; the span is guaranteed non-empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedBooking {
    pub user_id: UserId,
    pub room_id: RoomId,
    pub span: Span,
}

fn well_formed(t: Option<Ms>) -> Option<Ms> {
    t.filter(|t| (MIN_VALID_TIMESTAMP_MS..=MAX_VALID_TIMESTAMP_MS).contains(t))
}

/// Check a booking request against `now`. Stops at the first broken rule.
pub fn validate(params: &NewBookingParams, now: Ms) -> Result<ValidatedBooking, ValidationError> {
    let user_id = params.user_id.ok_or(ValidationError::MissingUser)?;
    let room_id = params.room_id.ok_or(ValidationError::MissingRoom)?;
    let from = well_formed(params.from_date).ok_or(ValidationError::MalformedFromDate)?;
    let till = well_formed(params.till_date).ok_or(ValidationError::MalformedTillDate)?;
    if till <= from {
        return Err(ValidationError::EmptyInterval);
    }
    if from < now {
        return Err(ValidationError::StartsInPast);
    }
    if till - from > MAX_STAY_MS {
        return Err(ValidationError::StayTooLong);
    }
    Ok(ValidatedBooking {
        user_id,
        room_id,
        span: Span::new(from, till),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    const NOW: Ms = 1_735_689_600_000; // 2025-01-01T00:00Z
    const DAY: Ms = 86_400_000;

    fn ok_params() -> NewBookingParams {
        NewBookingParams::new(Ulid::new(), Ulid::new(), NOW + DAY, NOW + 3 * DAY)
    }

    fn rejects(params: NewBookingParams, expected: ValidationError) {
        assert_eq!(validate(&params, NOW), Err(expected));
    }

    #[test]
    fn valid_request_passes() {
        let params = ok_params();
        let v = validate(&params, NOW).unwrap();
        assert_eq!(Some(v.user_id), params.user_id);
        assert_eq!(Some(v.room_id), params.room_id);
        assert_eq!(v.span, Span::new(NOW + DAY, NOW + 3 * DAY));
    }

    #[test]
    fn missing_user() {
        rejects(NewBookingParams { user_id: None, ..ok_params() }, ValidationError::MissingUser);
    }

    #[test]
    fn missing_room() {
        rejects(NewBookingParams { room_id: None, ..ok_params() }, ValidationError::MissingRoom);
    }

    #[test]
    fn missing_or_out_of_range_from_date() {
        rejects(NewBookingParams { from_date: None, ..ok_params() }, ValidationError::MalformedFromDate);
        rejects(NewBookingParams { from_date: Some(-1), ..ok_params() }, ValidationError::MalformedFromDate);
    }

    #[test]
    fn missing_or_out_of_range_till_date() {
        rejects(NewBookingParams { till_date: None, ..ok_params() }, ValidationError::MalformedTillDate);
        rejects(
            NewBookingParams { till_date: Some(MAX_VALID_TIMESTAMP_MS + 1), ..ok_params() },
            ValidationError::MalformedTillDate,
        );
    }

    #[test]
    fn till_must_be_strictly_after_from() {
        let from = NOW + DAY;
        rejects(
            NewBookingParams { from_date: Some(from), till_date: Some(from), ..ok_params() },
            ValidationError::EmptyInterval,
        );
        rejects(
            NewBookingParams { from_date: Some(from), till_date: Some(from - 1), ..ok_params() },
            ValidationError::EmptyInterval,
        );
    }

    #[test]
    fn from_in_the_past() {
        rejects(
            NewBookingParams { from_date: Some(NOW - 1), ..ok_params() },
            ValidationError::StartsInPast,
        );
        // Starting exactly now is allowed.
        let params = NewBookingParams { from_date: Some(NOW), ..ok_params() };
        assert!(validate(&params, NOW).is_ok());
    }

    #[test]
    fn stay_too_long() {
        let params = NewBookingParams {
            till_date: Some(NOW + DAY + MAX_STAY_MS + 1),
            ..ok_params()
        };
        rejects(params, ValidationError::StayTooLong);
    }

    #[test]
    fn rules_apply_in_order() {
        // Everything wrong: the user rule is reported first.
        rejects(NewBookingParams::default(), ValidationError::MissingUser);
        let params = NewBookingParams {
            user_id: Some(Ulid::new()),
            ..NewBookingParams::default()
        };
        rejects(params, ValidationError::MissingRoom);
        // Empty interval that is also in the past reports the interval.
        let params = NewBookingParams {
            from_date: Some(NOW - DAY),
            till_date: Some(NOW - 2 * DAY),
            ..ok_params()
        };
        rejects(params, ValidationError::EmptyInterval);
    }
}
