use crate::model::Ms;

pub const DAY_MS: Ms = 86_400_000;

/// Earliest accepted timestamp (Unix epoch).
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;

/// Latest accepted timestamp (2100-01-01T00:00:00Z).
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// Longest single stay a booking may cover.
pub const MAX_STAY_MS: Ms = 366 * DAY_MS;

/// Max length of a user name or room number.
pub const MAX_NAME_LEN: usize = 256;
