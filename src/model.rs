use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. The only time type.
pub type Ms = i64;

pub type UserId = Ulid;
pub type RoomId = Ulid;
pub type BookingId = Ulid;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Touching spans (`a.end == b.start`) do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    /// Reserved: nothing in this crate moves a booking into it yet.
    Confirmed,
    Canceled,
}

impl BookingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Canceled)
    }

    /// Pending → Canceled and Confirmed → Canceled are the only transitions.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Canceled)
                | (BookingStatus::Confirmed, BookingStatus::Canceled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
}

/// A room as seen by the reservation core. Owned by the hotel side; the core
/// only ever flips `occupied`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub hotel_id: Option<Ulid>,
    pub number: String,
    pub occupied: bool,
}

impl Room {
    pub fn new(id: RoomId, number: impl Into<String>) -> Self {
        Self {
            id,
            hotel_id: None,
            number: number.into(),
            occupied: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub user_id: UserId,
    pub room_id: RoomId,
    /// `[from_date, till_date)`
    pub span: Span,
    pub status: BookingStatus,
}

impl Booking {
    pub fn from_date(&self) -> Ms {
        self.span.start
    }

    pub fn till_date(&self) -> Ms {
        self.span.end
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// A booking before the store has assigned it an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub user_id: UserId,
    pub room_id: RoomId,
    pub span: Span,
    pub status: BookingStatus,
}

impl NewBooking {
    pub fn with_id(self, id: BookingId) -> Booking {
        Booking {
            id,
            user_id: self.user_id,
            room_id: self.room_id,
            span: self.span,
            status: self.status,
        }
    }
}

/// Raw booking request. Every field is optional because the caller may not
/// have supplied it; the validator reports which one is missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewBookingParams {
    pub user_id: Option<UserId>,
    pub room_id: Option<RoomId>,
    pub from_date: Option<Ms>,
    pub till_date: Option<Ms>,
}

impl NewBookingParams {
    pub fn new(user_id: UserId, room_id: RoomId, from_date: Ms, till_date: Ms) -> Self {
        Self {
            user_id: Some(user_id),
            room_id: Some(room_id),
            from_date: Some(from_date),
            till_date: Some(till_date),
        }
    }
}

/// Flat event list. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    UserCreated {
        id: UserId,
        name: String,
    },
    RoomCreated {
        id: RoomId,
        hotel_id: Option<Ulid>,
        number: String,
        occupied: bool,
    },
    RoomOccupancyChanged {
        id: RoomId,
        occupied: bool,
    },
    BookingInserted {
        id: BookingId,
        user_id: UserId,
        room_id: RoomId,
        span: Span,
        status: BookingStatus,
    },
    BookingDeleted {
        id: BookingId,
    },
    BookingStatusChanged {
        id: BookingId,
        status: BookingStatus,
    },
}

impl Event {
    pub fn booking_inserted(booking: &Booking) -> Self {
        Event::BookingInserted {
            id: booking.id,
            user_id: booking.user_id,
            room_id: booking.room_id,
            span: booking.span,
            status: booking.status,
        }
    }

    pub fn room_created(room: &Room) -> Self {
        Event::RoomCreated {
            id: room.id,
            hotel_id: room.hotel_id,
            number: room.number.clone(),
            occupied: room.occupied,
        }
    }
}
