use async_trait::async_trait;
use dashmap::DashSet;

use crate::model::*;

use super::tables::Tables;
use super::{BookingStore, RoomStore, StoreError, StoreOp, UserStore};

/// Volatile store for tests and embedding. Operations can be made to fail on
/// demand with [`InMemoryStore::fail_on`].
#[derive(Default)]
pub struct InMemoryStore {
    tables: Tables,
    faults: DashSet<StoreOp>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every subsequent call of `op` fails with `StoreError::Faulted(op)`.
    pub fn fail_on(&self, op: StoreOp) {
        self.faults.insert(op);
    }

    pub fn heal(&self, op: StoreOp) {
        self.faults.remove(&op);
    }

    fn check(&self, op: StoreOp) -> Result<(), StoreError> {
        if self.faults.contains(&op) {
            return Err(StoreError::Faulted(op));
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        self.check(StoreOp::GetUser)?;
        Ok(self.tables.get_user(&id))
    }

    async fn insert_user(&self, user: User) -> Result<User, StoreError> {
        self.check(StoreOp::InsertUser)?;
        if !self.tables.claim_user(user.id) {
            return Err(StoreError::Duplicate(user.id));
        }
        self.tables.apply(&Event::UserCreated {
            id: user.id,
            name: user.name.clone(),
        });
        Ok(user)
    }
}

#[async_trait]
impl RoomStore for InMemoryStore {
    async fn get_room(&self, id: RoomId) -> Result<Option<Room>, StoreError> {
        self.check(StoreOp::GetRoom)?;
        Ok(self.tables.get_room(&id))
    }

    async fn insert_room(&self, room: Room) -> Result<Room, StoreError> {
        self.check(StoreOp::InsertRoom)?;
        if !self.tables.claim_room(room.id) {
            return Err(StoreError::Duplicate(room.id));
        }
        self.tables.apply(&Event::room_created(&room));
        Ok(room)
    }

    async fn update_room_occupancy(&self, id: RoomId, occupied: bool) -> Result<(), StoreError> {
        self.check(StoreOp::UpdateRoomOccupancy)?;
        if !self.tables.contains_room(&id) {
            return Err(StoreError::NotFound(id));
        }
        self.tables.apply(&Event::RoomOccupancyChanged { id, occupied });
        Ok(())
    }

    async fn list_rooms(&self) -> Result<Vec<Room>, StoreError> {
        self.check(StoreOp::ListRooms)?;
        Ok(self.tables.list_rooms())
    }
}

#[async_trait]
impl BookingStore for InMemoryStore {
    async fn find_overlapping_booking(
        &self,
        room_id: RoomId,
        span: Span,
    ) -> Result<Option<Booking>, StoreError> {
        self.check(StoreOp::FindOverlappingBooking)?;
        Ok(self.tables.find_overlapping(&room_id, &span))
    }

    async fn insert_booking(&self, booking: NewBooking) -> Result<Booking, StoreError> {
        self.check(StoreOp::InsertBooking)?;
        let booking = booking.with_id(self.tables.next_id());
        self.tables.apply(&Event::booking_inserted(&booking));
        Ok(booking)
    }

    async fn delete_booking(&self, id: BookingId) -> Result<(), StoreError> {
        self.check(StoreOp::DeleteBooking)?;
        if !self.tables.contains_booking(&id) {
            return Err(StoreError::NotFound(id));
        }
        self.tables.apply(&Event::BookingDeleted { id });
        Ok(())
    }

    async fn get_booking(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        self.check(StoreOp::GetBooking)?;
        Ok(self.tables.get_booking(&id))
    }

    async fn update_booking_status(
        &self,
        id: BookingId,
        status: BookingStatus,
    ) -> Result<(), StoreError> {
        self.check(StoreOp::UpdateBookingStatus)?;
        if !self.tables.contains_booking(&id) {
            return Err(StoreError::NotFound(id));
        }
        self.tables.apply(&Event::BookingStatusChanged { id, status });
        Ok(())
    }

    async fn list_bookings(&self) -> Result<Vec<Booking>, StoreError> {
        self.check(StoreOp::ListBookings)?;
        Ok(self.tables.list_bookings(None))
    }

    async fn list_bookings_by_user(&self, user_id: UserId) -> Result<Vec<Booking>, StoreError> {
        self.check(StoreOp::ListBookings)?;
        Ok(self.tables.list_bookings(Some(&user_id)))
    }
}
