use ulid::Ulid;

use crate::model::{BookingId, RoomId};
use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    User,
    Room,
    Booking,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entity::User => f.write_str("user"),
            Entity::Room => f.write_str("room"),
            Entity::Booking => f.write_str("booking"),
        }
    }
}

/// The first rule a booking request broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    MissingUser,
    MissingRoom,
    MalformedFromDate,
    MalformedTillDate,
    /// `till_date <= from_date`
    EmptyInterval,
    StartsInPast,
    StayTooLong,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            ValidationError::MissingUser => "user_id is required",
            ValidationError::MissingRoom => "room_id is required",
            ValidationError::MalformedFromDate => "from_date is required and must be a valid timestamp",
            ValidationError::MalformedTillDate => "till_date is required and must be a valid timestamp",
            ValidationError::EmptyInterval => "till_date must be after from_date",
            ValidationError::StartsInPast => "from_date must not be in the past",
            ValidationError::StayTooLong => "stay exceeds the maximum length",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for ValidationError {}

/// Coarse classification for callers that map errors onto a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    AlreadyCanceled,
    AlreadyExists,
    Internal,
}

#[derive(Debug, PartialEq, Eq)]
pub enum BookingError {
    Validation(ValidationError),
    NotFound(Entity, Ulid),
    /// The room already has an active booking overlapping the request.
    Conflict {
        room_id: RoomId,
        existing: BookingId,
    },
    AlreadyCanceled(BookingId),
    AlreadyExists(Entity, Ulid),
    LimitExceeded(&'static str),
    /// Storage failed. The only error worth retrying.
    Internal(StoreError),
}

impl BookingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BookingError::Validation(_) | BookingError::LimitExceeded(_) => ErrorKind::Validation,
            BookingError::NotFound(..) => ErrorKind::NotFound,
            BookingError::Conflict { .. } => ErrorKind::Conflict,
            BookingError::AlreadyCanceled(_) => ErrorKind::AlreadyCanceled,
            BookingError::AlreadyExists(..) => ErrorKind::AlreadyExists,
            BookingError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Internal
    }
}

impl From<ValidationError> for BookingError {
    fn from(e: ValidationError) -> Self {
        BookingError::Validation(e)
    }
}

impl From<StoreError> for BookingError {
    fn from(e: StoreError) -> Self {
        BookingError::Internal(e)
    }
}

impl std::fmt::Display for BookingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingError::Validation(e) => write!(f, "invalid booking: {e}"),
            BookingError::NotFound(entity, id) => write!(f, "{entity} not found: {id}"),
            BookingError::Conflict { room_id, existing } => {
                write!(
                    f,
                    "room {room_id} is already booked for the requested dates (booking {existing})"
                )
            }
            BookingError::AlreadyCanceled(id) => write!(f, "booking {id} is already canceled"),
            BookingError::AlreadyExists(entity, id) => write!(f, "{entity} already exists: {id}"),
            BookingError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            BookingError::Internal(e) => write!(f, "storage failure: {e}"),
        }
    }
}

impl std::error::Error for BookingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BookingError::Validation(e) => Some(e),
            BookingError::Internal(e) => Some(e),
            _ => None,
        }
    }
}
