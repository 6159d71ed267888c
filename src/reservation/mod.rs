mod cancel;
pub(crate) mod conflict;
mod coordinator;
mod error;
mod locks;
mod validate;

pub use cancel::CancellationWorkflow;
pub use conflict::{blocks, ConflictDetector};
pub use coordinator::ReservationCoordinator;
pub use error::{BookingError, Entity, ErrorKind, ValidationError};
pub use locks::RoomLocks;
pub use validate::{validate, ValidatedBooking};

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::limits::MAX_NAME_LEN;
use crate::model::*;
use crate::store::{BookingStore, RoomStore, StoreError, UserStore};

/// Source of "now" for the not-in-the-past rule.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> Ms;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> Ms {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as Ms)
    }
}

/// A clock that only moves when told to.
pub struct FixedClock(AtomicI64);

impl FixedClock {
    pub fn new(now: Ms) -> Self {
        Self(AtomicI64::new(now))
    }

    pub fn set(&self, now: Ms) {
        self.0.store(now, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_ms(&self) -> Ms {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a request handler can ask of the reservation core.
pub struct Reservations {
    users: Arc<dyn UserStore>,
    rooms: Arc<dyn RoomStore>,
    bookings: Arc<dyn BookingStore>,
    coordinator: ReservationCoordinator,
    cancellation: CancellationWorkflow,
}

impl Reservations {
    pub fn new(
        users: Arc<dyn UserStore>,
        rooms: Arc<dyn RoomStore>,
        bookings: Arc<dyn BookingStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let locks = Arc::new(RoomLocks::new());
        Self {
            coordinator: ReservationCoordinator::new(
                users.clone(),
                rooms.clone(),
                bookings.clone(),
                locks.clone(),
                clock,
            ),
            cancellation: CancellationWorkflow::new(bookings.clone(), locks),
            users,
            rooms,
            bookings,
        }
    }

    /// Wire every capability to the same backing store.
    pub fn with_store<S>(store: Arc<S>, clock: Arc<dyn Clock>) -> Self
    where
        S: UserStore + RoomStore + BookingStore + 'static,
    {
        Self::new(store.clone(), store.clone(), store, clock)
    }

    pub async fn create_booking(&self, params: NewBookingParams) -> Result<BookingId, BookingError> {
        self.coordinator.create_booking(params).await
    }

    pub async fn cancel_booking(&self, id: BookingId) -> Result<(), BookingError> {
        self.cancellation.cancel(id).await
    }

    pub async fn get_booking(&self, id: BookingId) -> Result<Booking, BookingError> {
        self.bookings
            .get_booking(id)
            .await?
            .ok_or(BookingError::NotFound(Entity::Booking, id))
    }

    pub async fn list_bookings(&self) -> Result<Vec<Booking>, BookingError> {
        Ok(self.bookings.list_bookings().await?)
    }

    pub async fn list_user_bookings(&self, user_id: UserId) -> Result<Vec<Booking>, BookingError> {
        Ok(self.bookings.list_bookings_by_user(user_id).await?)
    }

    pub async fn register_user(&self, user: User) -> Result<User, BookingError> {
        if user.name.len() > MAX_NAME_LEN {
            return Err(BookingError::LimitExceeded("user name too long"));
        }
        let user = self
            .users
            .insert_user(user)
            .await
            .map_err(|e| duplicate_as(Entity::User, e))?;
        info!("user {} registered", user.id);
        Ok(user)
    }

    pub async fn register_room(&self, room: Room) -> Result<Room, BookingError> {
        if room.number.len() > MAX_NAME_LEN {
            return Err(BookingError::LimitExceeded("room number too long"));
        }
        let room = self
            .rooms
            .insert_room(room)
            .await
            .map_err(|e| duplicate_as(Entity::Room, e))?;
        info!("room {} ({}) registered", room.id, room.number);
        Ok(room)
    }

    pub async fn list_rooms(&self) -> Result<Vec<Room>, BookingError> {
        Ok(self.rooms.list_rooms().await?)
    }
}

fn duplicate_as(entity: Entity, e: StoreError) -> BookingError {
    match e {
        StoreError::Duplicate(id) => BookingError::AlreadyExists(entity, id),
        other => BookingError::Internal(other),
    }
}
