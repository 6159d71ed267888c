use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::model::RoomId;

/// One async mutex per room. Whoever holds a room's guard is the only party
/// checking for conflicts on, or writing bookings for, that room.
#[derive(Default)]
pub struct RoomLocks {
    locks: DashMap<RoomId, Arc<Mutex<()>>>,
}

impl RoomLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, room_id: RoomId) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(room_id).or_default().value().clone();
        lock.lock_owned().await
    }
}
