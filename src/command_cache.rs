use crate::commands::scan::ScanArgs;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(256) {
    Some(capacity) => capacity,
    None => unreachable!(),
};

/// Last scan run in each Discord channel, for `/repeat`.
#[derive(Clone)]
pub struct CommandCache {
    cache: Arc<Mutex<LruCache<u64, ScanArgs>>>,
}

impl CommandCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(DEFAULT_CAPACITY);
        Self {
            cache: Arc::new(Mutex::new(LruCache::new(cap))),
        }
    }

    pub fn remember(&self, channel_id: u64, args: ScanArgs) {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.put(channel_id, args);
    }

    pub fn last(&self, channel_id: u64) -> Option<ScanArgs> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.get(&channel_id).cloned()
    }
}
