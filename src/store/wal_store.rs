use std::io;
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::info;

use crate::model::*;
use crate::wal::Wal;

use super::tables::Tables;
use super::{BookingStore, RoomStore, StoreError, UserStore};

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type Pending = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the WAL. Blocks for one append, then drains whatever else is already
/// queued so the whole batch shares a single fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }

        commit_batch(&mut wal, batch);
        if let Some(other) = deferred {
            handle_non_append(&mut wal, other);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: Vec<Pending>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();

    let appended = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so half-written bytes do not leak
    // into the next batch.
    let flushed = wal.flush_sync();
    let result = appended.and(flushed);

    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    for (_, tx) in batch {
        let reply = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(reply);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => commit_batch(wal, vec![(event, response)]),
    }
}

/// Durable store: state lives in memory and every change is written to the
/// WAL before it is applied. Reopening the same path replays the log.
pub struct WalStore {
    tables: Tables,
    wal_tx: mpsc::Sender<WalCommand>,
    /// Writers hold it shared across append + apply; compaction holds it
    /// exclusively so the snapshot cannot miss an event that is in flight.
    compaction_gate: RwLock<()>,
}

impl WalStore {
    /// Must be called from within a tokio runtime: it spawns the writer task.
    pub fn open(path: &Path) -> io::Result<Self> {
        let events = Wal::replay(path)?;
        let wal = Wal::open(path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let tables = Tables::default();
        for event in &events {
            tables.apply(event);
        }
        info!("replayed {} events from {}", events.len(), path.display());

        Ok(Self {
            tables,
            wal_tx,
            compaction_gate: RwLock::new(()),
        })
    }

    async fn wal_append(&self, event: &Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| StoreError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Wal(e.to_string()))
    }

    /// Log then apply. Nothing is applied if the log write fails.
    async fn commit(&self, event: Event) -> Result<(), StoreError> {
        let _gate = self.compaction_gate.read().await;
        self.wal_append(&event).await?;
        self.tables.apply(&event);
        Ok(())
    }

    pub async fn appends_since_compact(&self) -> Result<u64, StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .map_err(|_| StoreError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Wal("WAL writer dropped response".into()))
    }

    /// Rewrite the log as the minimal event list for the current state.
    pub async fn compact(&self) -> Result<usize, StoreError> {
        let _gate = self.compaction_gate.write().await;
        let events = self.tables.snapshot();
        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Wal(e.to_string()))?;
        Ok(count)
    }
}

#[async_trait]
impl UserStore for WalStore {
    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.tables.get_user(&id))
    }

    async fn insert_user(&self, user: User) -> Result<User, StoreError> {
        if !self.tables.claim_user(user.id) {
            return Err(StoreError::Duplicate(user.id));
        }
        let event = Event::UserCreated {
            id: user.id,
            name: user.name.clone(),
        };
        if let Err(e) = self.commit(event).await {
            self.tables.release_user(&user.id);
            return Err(e);
        }
        Ok(user)
    }
}

#[async_trait]
impl RoomStore for WalStore {
    async fn get_room(&self, id: RoomId) -> Result<Option<Room>, StoreError> {
        Ok(self.tables.get_room(&id))
    }

    async fn insert_room(&self, room: Room) -> Result<Room, StoreError> {
        if !self.tables.claim_room(room.id) {
            return Err(StoreError::Duplicate(room.id));
        }
        if let Err(e) = self.commit(Event::room_created(&room)).await {
            self.tables.release_room(&room.id);
            return Err(e);
        }
        Ok(room)
    }

    async fn update_room_occupancy(&self, id: RoomId, occupied: bool) -> Result<(), StoreError> {
        if !self.tables.contains_room(&id) {
            return Err(StoreError::NotFound(id));
        }
        self.commit(Event::RoomOccupancyChanged { id, occupied }).await
    }

    async fn list_rooms(&self) -> Result<Vec<Room>, StoreError> {
        Ok(self.tables.list_rooms())
    }
}

#[async_trait]
impl BookingStore for WalStore {
    async fn find_overlapping_booking(
        &self,
        room_id: RoomId,
        span: Span,
    ) -> Result<Option<Booking>, StoreError> {
        Ok(self.tables.find_overlapping(&room_id, &span))
    }

    async fn insert_booking(&self, booking: NewBooking) -> Result<Booking, StoreError> {
        let booking = booking.with_id(self.tables.next_id());
        self.commit(Event::booking_inserted(&booking)).await?;
        Ok(booking)
    }

    async fn delete_booking(&self, id: BookingId) -> Result<(), StoreError> {
        if !self.tables.contains_booking(&id) {
            return Err(StoreError::NotFound(id));
        }
        self.commit(Event::BookingDeleted { id }).await
    }

    async fn get_booking(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        Ok(self.tables.get_booking(&id))
    }

    async fn update_booking_status(
        &self,
        id: BookingId,
        status: BookingStatus,
    ) -> Result<(), StoreError> {
        if !self.tables.contains_booking(&id) {
            return Err(StoreError::NotFound(id));
        }
        self.commit(Event::BookingStatusChanged { id, status }).await
    }

    async fn list_bookings(&self) -> Result<Vec<Booking>, StoreError> {
        Ok(self.tables.list_bookings(None))
    }

    async fn list_bookings_by_user(&self, user_id: UserId) -> Result<Vec<Booking>, StoreError> {
        Ok(self.tables.list_bookings(Some(&user_id)))
    }
}
