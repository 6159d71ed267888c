use std::sync::Mutex;

use dashmap::{DashMap, DashSet};
use ulid::{Generator, Ulid};

use crate::model::*;
use crate::reservation::conflict::first_blocking;

/// Current state of users, rooms and bookings. Both stores keep one of these;
/// the WAL store additionally logs every event before applying it.
pub(super) struct Tables {
    users: DashMap<UserId, User>,
    rooms: DashMap<RoomId, Room>,
    bookings: DashMap<BookingId, Booking>,
    /// room → ids of every booking ever made on it (canceled included).
    room_bookings: DashMap<RoomId, Vec<BookingId>>,
    /// Ids taken by an existing or in-flight registration. Inserting here is
    /// the atomic "is this id free" check for users and rooms.
    claimed_users: DashSet<UserId>,
    claimed_rooms: DashSet<RoomId>,
    /// Monotonic so that id order is insertion order, even within one ms.
    ids: Mutex<Generator>,
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            users: DashMap::new(),
            rooms: DashMap::new(),
            bookings: DashMap::new(),
            room_bookings: DashMap::new(),
            claimed_users: DashSet::new(),
            claimed_rooms: DashSet::new(),
            ids: Mutex::new(Generator::new()),
        }
    }
}

impl Tables {
    pub fn next_id(&self) -> Ulid {
        let mut ids = self.ids.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // Overflow needs 2^80 ids in one millisecond.
        ids.generate().unwrap_or_else(|_| Ulid::new())
    }

    /// True for exactly one caller per id. Pair with `release_user` if the
    /// registration is abandoned.
    pub fn claim_user(&self, id: UserId) -> bool {
        self.claimed_users.insert(id)
    }

    pub fn release_user(&self, id: &UserId) {
        if !self.users.contains_key(id) {
            self.claimed_users.remove(id);
        }
    }

    pub fn claim_room(&self, id: RoomId) -> bool {
        self.claimed_rooms.insert(id)
    }

    pub fn release_room(&self, id: &RoomId) {
        if !self.rooms.contains_key(id) {
            self.claimed_rooms.remove(id);
        }
    }

    pub fn get_user(&self, id: &UserId) -> Option<User> {
        self.users.get(id).map(|e| e.value().clone())
    }

    pub fn get_room(&self, id: &RoomId) -> Option<Room> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub fn contains_room(&self, id: &RoomId) -> bool {
        self.rooms.contains_key(id)
    }

    pub fn get_booking(&self, id: &BookingId) -> Option<Booking> {
        self.bookings.get(id).map(|e| e.value().clone())
    }

    pub fn contains_booking(&self, id: &BookingId) -> bool {
        self.bookings.contains_key(id)
    }

    pub fn find_overlapping(&self, room_id: &RoomId, span: &Span) -> Option<Booking> {
        let ids = self
            .room_bookings
            .get(room_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        let candidates: Vec<Booking> = ids.iter().filter_map(|id| self.get_booking(id)).collect();
        first_blocking(candidates.iter(), span).cloned()
    }

    pub fn list_rooms(&self) -> Vec<Room> {
        let mut rooms: Vec<Room> = self.rooms.iter().map(|e| e.value().clone()).collect();
        rooms.sort_by_key(|r| r.id);
        rooms
    }

    pub fn list_bookings(&self, user: Option<&UserId>) -> Vec<Booking> {
        let mut out: Vec<Booking> = self
            .bookings
            .iter()
            .filter(|e| user.is_none_or(|u| e.value().user_id == *u))
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|b| b.id);
        out
    }

    pub fn apply(&self, event: &Event) {
        match event {
            Event::UserCreated { id, name } => {
                self.claimed_users.insert(*id);
                self.users
                    .entry(*id)
                    .or_insert_with(|| User { id: *id, name: name.clone() });
            }
            Event::RoomCreated {
                id,
                hotel_id,
                number,
                occupied,
            } => {
                // Never replaces a live row: that would reset its occupancy.
                self.claimed_rooms.insert(*id);
                self.rooms.entry(*id).or_insert_with(|| Room {
                    id: *id,
                    hotel_id: *hotel_id,
                    number: number.clone(),
                    occupied: *occupied,
                });
            }
            Event::RoomOccupancyChanged { id, occupied } => {
                if let Some(mut room) = self.rooms.get_mut(id) {
                    room.occupied = *occupied;
                }
            }
            Event::BookingInserted {
                id,
                user_id,
                room_id,
                span,
                status,
            } => {
                self.bookings.insert(
                    *id,
                    Booking {
                        id: *id,
                        user_id: *user_id,
                        room_id: *room_id,
                        span: *span,
                        status: *status,
                    },
                );
                self.room_bookings.entry(*room_id).or_default().push(*id);
            }
            Event::BookingDeleted { id } => {
                if let Some((_, booking)) = self.bookings.remove(id)
                    && let Some(mut ids) = self.room_bookings.get_mut(&booking.room_id)
                {
                    ids.retain(|b| b != id);
                }
            }
            Event::BookingStatusChanged { id, status } => {
                if let Some(mut booking) = self.bookings.get_mut(id) {
                    booking.status = *status;
                }
            }
        }
    }

    /// Minimal event list that rebuilds the current state.
    pub fn snapshot(&self) -> Vec<Event> {
        let mut users: Vec<User> = self.users.iter().map(|e| e.value().clone()).collect();
        users.sort_by_key(|u| u.id);

        let mut events: Vec<Event> = users
            .into_iter()
            .map(|u| Event::UserCreated { id: u.id, name: u.name })
            .collect();
        events.extend(self.list_rooms().iter().map(Event::room_created));
        events.extend(self.list_bookings(None).iter().map(Event::booking_inserted));
        events
    }
}
