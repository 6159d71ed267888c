use std::sync::Arc;

use tracing::info;

use crate::model::*;
use crate::observability::BOOKINGS_CANCELED_TOTAL;
use crate::store::BookingStore;

use super::locks::RoomLocks;
use super::{BookingError, Entity};

/// Moves a booking to `Canceled`. Canceling twice is an error, not a no-op.
///
/// Room occupancy is left as it is.
pub struct CancellationWorkflow {
    bookings: Arc<dyn BookingStore>,
    locks: Arc<RoomLocks>,
}

impl CancellationWorkflow {
    pub fn new(bookings: Arc<dyn BookingStore>, locks: Arc<RoomLocks>) -> Self {
        Self { bookings, locks }
    }

    pub async fn cancel(&self, id: BookingId) -> Result<(), BookingError> {
        let room_id = self.fetch(id).await?.room_id;

        // Re-read under the room lock: a concurrent cancel may have won, or a
        // reservation rollback may have deleted the booking.
        let _room = self.locks.lock(room_id).await;
        let booking = self.fetch(id).await?;
        if !booking.status.can_transition_to(BookingStatus::Canceled) {
            return Err(BookingError::AlreadyCanceled(id));
        }

        self.bookings
            .update_booking_status(id, BookingStatus::Canceled)
            .await?;
        info!("booking {id} canceled (was {})", booking.status);
        metrics::counter!(BOOKINGS_CANCELED_TOTAL).increment(1);
        Ok(())
    }

    async fn fetch(&self, id: BookingId) -> Result<Booking, BookingError> {
        self.bookings
            .get_booking(id)
            .await?
            .ok_or(BookingError::NotFound(Entity::Booking, id))
    }
}
