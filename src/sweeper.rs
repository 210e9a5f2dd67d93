use crate::logs::ArchiveStore;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Periodically deletes archives of guilds the bot left or that outlived the
/// retention window. `known_guilds` lists the guilds the bot is currently in.
pub async fn start_sweep_task<F>(store: Arc<ArchiveStore>, interval_secs: u64, known_guilds: F)
where
    F: Fn() -> HashSet<u64> + Send + 'static,
{
    info!("Starting archive sweep task (every {}s)", interval_secs);
    let mut ticker = interval(Duration::from_secs(interval_secs.max(60)));
    // The first tick fires immediately, before the guild cache is filled.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        sweep_once(&store, known_guilds()).await;
    }
}

/// One sweep pass. An empty guild list means the cache is not ready yet.
pub async fn sweep_once(store: &ArchiveStore, known_guilds: HashSet<u64>) -> usize {
    if known_guilds.is_empty() {
        debug!("No guild known yet, skipping archive sweep");
        return 0;
    }
    match store.sweep(known_guilds).await {
        Ok(removed) => removed,
        Err(e) => {
            warn!("Archive sweep error: {}", e);
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::{StoreConfig, SyncRegistry};

    #[tokio::test]
    async fn test_sweep_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::new(StoreConfig::new(dir.path()), Arc::new(SyncRegistry::new()));
        store.init(1).await.unwrap();
        store.init(2).await.unwrap();

        assert_eq!(sweep_once(&store, HashSet::new()).await, 0);
        assert!(store.exists(2).await);

        assert_eq!(sweep_once(&store, HashSet::from([1])).await, 1);
        assert!(store.exists(1).await);
        assert!(!store.exists(2).await);
    }
}
