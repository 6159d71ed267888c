use std::sync::Arc;

use tracing::{error, info, warn};

use crate::model::*;
use crate::observability::{
    BOOKINGS_CREATED_TOTAL, BOOKING_CONFLICTS_TOTAL, BOOKING_ROLLBACKS_TOTAL,
    ORPHANED_BOOKINGS_TOTAL,
};
use crate::store::{BookingStore, RoomStore, UserStore};

use super::conflict::ConflictDetector;
use super::locks::RoomLocks;
use super::validate::validate;
use super::{BookingError, Clock, Entity, ValidationError};

/// Creates bookings: resolve references, validate, check for conflicts,
/// insert, mark the room occupied.
///
/// Insert and occupancy update are two separate writes. If the second fails
/// the booking is deleted again before the error is returned. The room lock
/// is held from the conflict check until both writes (or the undo) are done,
/// so two overlapping requests for one room can never both get through.
pub struct ReservationCoordinator {
    users: Arc<dyn UserStore>,
    rooms: Arc<dyn RoomStore>,
    bookings: Arc<dyn BookingStore>,
    conflicts: ConflictDetector,
    locks: Arc<RoomLocks>,
    clock: Arc<dyn Clock>,
}

impl ReservationCoordinator {
    pub fn new(
        users: Arc<dyn UserStore>,
        rooms: Arc<dyn RoomStore>,
        bookings: Arc<dyn BookingStore>,
        locks: Arc<RoomLocks>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            rooms,
            conflicts: ConflictDetector::new(bookings.clone()),
            bookings,
            locks,
            clock,
        }
    }

    pub async fn create_booking(&self, params: NewBookingParams) -> Result<BookingId, BookingError> {
        let user_id = params.user_id.ok_or(ValidationError::MissingUser)?;
        if self.users.get_user(user_id).await?.is_none() {
            return Err(BookingError::NotFound(Entity::User, user_id));
        }
        let room_id = params.room_id.ok_or(ValidationError::MissingRoom)?;
        if self.rooms.get_room(room_id).await?.is_none() {
            return Err(BookingError::NotFound(Entity::Room, room_id));
        }
        let request = validate(&params, self.clock.now_ms())?;

        let _room = self.locks.lock(room_id).await;

        if let Some(existing) = self.conflicts.find_conflict(room_id, request.span).await? {
            warn!(
                "room {room_id} unavailable for [{}, {}): held by booking {}",
                request.span.start, request.span.end, existing.id
            );
            metrics::counter!(BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(BookingError::Conflict {
                room_id,
                existing: existing.id,
            });
        }

        let booking = self
            .bookings
            .insert_booking(NewBooking {
                user_id: request.user_id,
                room_id,
                span: request.span,
                status: BookingStatus::Pending,
            })
            .await?;

        if let Err(e) = self.rooms.update_room_occupancy(room_id, true).await {
            self.undo_insert(&booking).await;
            return Err(BookingError::Internal(e));
        }

        info!(
            "booking {} created: user {user_id} room {room_id} [{}, {})",
            booking.id, booking.span.start, booking.span.end
        );
        metrics::counter!(BOOKINGS_CREATED_TOTAL).increment(1);
        Ok(booking.id)
    }

    /// Best effort. A failed delete leaves an orphaned booking behind; it is
    /// logged and counted, never reported in place of the original error.
    async fn undo_insert(&self, booking: &Booking) {
        metrics::counter!(BOOKING_ROLLBACKS_TOTAL).increment(1);
        match self.bookings.delete_booking(booking.id).await {
            Ok(()) => warn!(
                "rolled back booking {} after occupancy update failed on room {}",
                booking.id, booking.room_id
            ),
            Err(e) => {
                metrics::counter!(ORPHANED_BOOKINGS_TOTAL).increment(1);
                error!(
                    "booking {} on room {} orphaned: rollback delete failed: {e}",
                    booking.id, booking.room_id
                );
            }
        }
    }
}
