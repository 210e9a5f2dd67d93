use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Proof of holding the sync slot of one guild.
///
/// The generation distinguishes successive holders, so a stale ticket can
/// neither release nor observe the slot of a later sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTicket {
    guild_id: u64,
    generation: u64,
}

impl SyncTicket {
    pub fn guild_id(&self) -> u64 {
        self.guild_id
    }
}

#[derive(Debug, Default)]
struct Slots {
    running: HashMap<u64, u64>,
    next_generation: u64,
}

/// At most one sync per guild. Cancelling a guild frees its slot; the
/// holder notices through `is_cancelled` at its next checkpoint.
#[derive(Debug, Default)]
pub struct SyncRegistry {
    slots: Mutex<Slots>,
}

impl SyncRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claims the slot of `guild_id`, or returns `None` when a sync is running.
    pub fn acquire(&self, guild_id: u64) -> Option<SyncTicket> {
        let mut slots = self.slots();
        if slots.running.contains_key(&guild_id) {
            return None;
        }
        slots.next_generation += 1;
        let generation = slots.next_generation;
        slots.running.insert(guild_id, generation);
        debug!("Sync slot of guild {} taken (generation {})", guild_id, generation);
        Some(SyncTicket {
            guild_id,
            generation,
        })
    }

    /// Frees the slot if `ticket` still holds it. Safe to call repeatedly.
    pub fn release(&self, ticket: &SyncTicket) {
        let mut slots = self.slots();
        if slots.running.get(&ticket.guild_id) == Some(&ticket.generation) {
            slots.running.remove(&ticket.guild_id);
            debug!("Sync slot of guild {} released", ticket.guild_id);
        }
    }

    /// True once the slot of `ticket` was cancelled or handed to someone else.
    pub fn is_cancelled(&self, ticket: &SyncTicket) -> bool {
        self.slots().running.get(&ticket.guild_id) != Some(&ticket.generation)
    }

    /// Requests cancellation of the running sync of `guild_id`.
    /// Returns false when nothing was running.
    pub fn cancel(&self, guild_id: u64) -> bool {
        let cancelled = self.slots().running.remove(&guild_id).is_some();
        if cancelled {
            debug!("Sync of guild {} cancelled", guild_id);
        }
        cancelled
    }

    /// Runs `commit` only while `ticket` still holds its slot. Cancellation
    /// waits until `commit` returns.
    pub fn while_held<R>(&self, ticket: &SyncTicket, commit: impl FnOnce() -> R) -> Option<R> {
        let slots = self.slots();
        if slots.running.get(&ticket.guild_id) != Some(&ticket.generation) {
            return None;
        }
        Some(commit())
    }

    pub fn is_running(&self, guild_id: u64) -> bool {
        self.slots().running.contains_key(&guild_id)
    }
}

/// Releases its ticket when dropped, whatever path the sync leaves through.
pub struct SyncGuard {
    registry: Arc<SyncRegistry>,
    ticket: SyncTicket,
}

impl SyncGuard {
    pub fn acquire(registry: &Arc<SyncRegistry>, guild_id: u64) -> Option<Self> {
        registry.acquire(guild_id).map(|ticket| Self {
            registry: Arc::clone(registry),
            ticket,
        })
    }

    pub fn ticket(&self) -> &SyncTicket {
        &self.ticket
    }

    pub fn is_cancelled(&self) -> bool {
        self.registry.is_cancelled(&self.ticket)
    }
}

impl Drop for SyncGuard {
    fn drop(&mut self) {
        self.registry.release(&self.ticket);
    }
}
