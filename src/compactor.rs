use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::observability::WAL_COMPACTIONS_TOTAL;
use crate::store::{StoreError, WalStore};

/// Background task that rewrites the WAL once enough appends pile up.
pub async fn run_compactor(store: Arc<WalStore>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        if let Err(e) = compact_if_due(&store, threshold).await {
            warn!("compaction skipped: {e}");
        }
    }
}

/// Returns the snapshot size if a compaction ran.
pub async fn compact_if_due(store: &WalStore, threshold: u64) -> Result<Option<usize>, StoreError> {
    let appends = store.appends_since_compact().await?;
    if appends < threshold {
        debug!("{appends} appends since last compaction, threshold {threshold}");
        return Ok(None);
    }
    let kept = store.compact().await?;
    metrics::counter!(WAL_COMPACTIONS_TOTAL).increment(1);
    info!("compacted WAL: {appends} appends down to {kept} events");
    Ok(Some(kept))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use crate::store::{RoomStore, UserStore};
    use std::path::PathBuf;
    use ulid::Ulid;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("innkeep_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let path = test_wal_path("threshold.wal");
        let store = WalStore::open(&path).unwrap();

        store
            .insert_user(User { id: Ulid::new(), name: "dora".into() })
            .await
            .unwrap();
        let room = Ulid::new();
        store.insert_room(Room::new(room, "7")).await.unwrap();
        for i in 0..8 {
            store.update_room_occupancy(room, i % 2 == 0).await.unwrap();
        }

        assert_eq!(compact_if_due(&store, 100).await.unwrap(), None);
        assert_eq!(compact_if_due(&store, 10).await.unwrap(), Some(2));
        assert_eq!(store.appends_since_compact().await.unwrap(), 0);
        assert_eq!(compact_if_due(&store, 10).await.unwrap(), None);
    }
}
