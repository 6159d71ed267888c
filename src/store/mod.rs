//! Storage capabilities consumed by the reservation core.
//!
//! The core never talks to a concrete store. It receives one `Arc<dyn _>` per
//! capability it needs, so a workflow that only cancels bookings cannot touch
//! rooms or users.

mod memory;
mod tables;
mod wal_store;

pub use memory::InMemoryStore;
pub use wal_store::WalStore;

use async_trait::async_trait;
use ulid::Ulid;

use crate::model::*;

/// Identifies a store operation, for error reporting and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    GetUser,
    InsertUser,
    GetRoom,
    InsertRoom,
    UpdateRoomOccupancy,
    ListRooms,
    FindOverlappingBooking,
    InsertBooking,
    DeleteBooking,
    GetBooking,
    UpdateBookingStatus,
    ListBookings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A write targeted a record that does not exist.
    NotFound(Ulid),
    /// An insert reused an existing id.
    Duplicate(Ulid),
    Wal(String),
    /// Injected failure (in-memory store only).
    Faulted(StoreOp),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "record not found: {id}"),
            StoreError::Duplicate(id) => write!(f, "duplicate record: {id}"),
            StoreError::Wal(e) => write!(f, "WAL error: {e}"),
            StoreError::Faulted(op) => write!(f, "injected failure in {op:?}"),
        }
    }
}

impl std::error::Error for StoreError {}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError>;
    async fn insert_user(&self, user: User) -> Result<User, StoreError>;
}

#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn get_room(&self, id: RoomId) -> Result<Option<Room>, StoreError>;
    async fn insert_room(&self, room: Room) -> Result<Room, StoreError>;
    async fn update_room_occupancy(&self, id: RoomId, occupied: bool) -> Result<(), StoreError>;
    async fn list_rooms(&self) -> Result<Vec<Room>, StoreError>;
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Any booking on `room_id` that is not canceled and whose span overlaps
    /// `span` under half-open semantics.
    async fn find_overlapping_booking(
        &self,
        room_id: RoomId,
        span: Span,
    ) -> Result<Option<Booking>, StoreError>;
    /// Persist a new booking, assigning its id.
    async fn insert_booking(&self, booking: NewBooking) -> Result<Booking, StoreError>;
    /// Remove a booking outright. Only used to undo a half-finished reservation.
    async fn delete_booking(&self, id: BookingId) -> Result<(), StoreError>;
    async fn get_booking(&self, id: BookingId) -> Result<Option<Booking>, StoreError>;
    async fn update_booking_status(
        &self,
        id: BookingId,
        status: BookingStatus,
    ) -> Result<(), StoreError>;
    /// All bookings, oldest first.
    async fn list_bookings(&self) -> Result<Vec<Booking>, StoreError>;
    async fn list_bookings_by_user(&self, user_id: UserId) -> Result<Vec<Booking>, StoreError>;
}
