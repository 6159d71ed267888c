use std::sync::Arc;

use crate::model::*;
use crate::store::{BookingStore, StoreError};

/// An existing booking blocks `candidate` when it is still active and the two
/// half-open spans intersect: `s < till && t > from`. A checkout at the same
/// instant as the next check-in is fine.
pub fn blocks(existing: &Booking, candidate: &Span) -> bool {
    existing.is_active() && existing.span.overlaps(candidate)
}

pub fn first_blocking<'a>(
    bookings: impl IntoIterator<Item = &'a Booking>,
    candidate: &Span,
) -> Option<&'a Booking> {
    bookings.into_iter().find(|b| blocks(b, candidate))
}

/// Answers "is this room free for this span?" against the booking store.
pub struct ConflictDetector {
    bookings: Arc<dyn BookingStore>,
}

impl ConflictDetector {
    pub fn new(bookings: Arc<dyn BookingStore>) -> Self {
        Self { bookings }
    }

    /// Some booking that blocks the request, or `None` if the room is free.
    /// Any of them may come back when several block.
    pub async fn find_conflict(
        &self,
        room_id: RoomId,
        span: Span,
    ) -> Result<Option<Booking>, StoreError> {
        let found = self.bookings.find_overlapping_booking(room_id, span).await?;
        debug_assert!(found.as_ref().is_none_or(|b| b.room_id == room_id && blocks(b, &span)));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn booking(start: Ms, end: Ms, status: BookingStatus) -> Booking {
        Booking {
            id: Ulid::new(),
            user_id: Ulid::new(),
            room_id: Ulid::new(),
            span: Span::new(start, end),
            status,
        }
    }

    #[test]
    fn overlapping_active_booking_blocks() {
        let b = booking(100, 200, BookingStatus::Pending);
        assert!(blocks(&b, &Span::new(150, 250)));
        assert!(blocks(&b, &Span::new(50, 150)));
        assert!(blocks(&b, &Span::new(120, 180)));
        assert!(blocks(&b, &Span::new(0, 1000)));
        assert!(blocks(&booking(100, 200, BookingStatus::Confirmed), &Span::new(150, 250)));
    }

    #[test]
    fn touching_boundaries_do_not_block() {
        let b = booking(100, 200, BookingStatus::Pending);
        assert!(!blocks(&b, &Span::new(200, 300)));
        assert!(!blocks(&b, &Span::new(0, 100)));
    }

    #[test]
    fn canceled_booking_never_blocks() {
        let b = booking(100, 200, BookingStatus::Canceled);
        assert!(!blocks(&b, &Span::new(100, 200)));
    }

    #[test]
    fn first_blocking_skips_free_entries() {
        let list = [
            booking(0, 100, BookingStatus::Pending),
            booking(100, 200, BookingStatus::Canceled),
            booking(150, 300, BookingStatus::Pending),
        ];
        let hit = first_blocking(&list, &Span::new(100, 160)).unwrap();
        assert_eq!(hit.id, list[2].id);
        assert!(first_blocking(&list, &Span::new(300, 400)).is_none());
    }
}
