use crate::logs::channel::ChannelLog;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A channel targeted by a request, as currently named on Discord.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelRef {
    pub id: u64,
    pub name: String,
}

impl ChannelRef {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Every archived channel of one guild. Persisted as a single file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GuildArchive {
    #[serde(rename = "guild")]
    pub guild_id: u64,
    pub channels: BTreeMap<u64, ChannelLog>,
}

impl GuildArchive {
    pub fn new(guild_id: u64) -> Self {
        Self {
            guild_id,
            channels: BTreeMap::new(),
        }
    }

    pub fn channel(&self, channel_id: u64) -> Option<&ChannelLog> {
        self.channels.get(&channel_id)
    }

    /// Returns the log for `channel`, creating an empty one on first reference.
    pub fn get_or_insert(&mut self, channel: &ChannelRef) -> &mut ChannelLog {
        self.channels
            .entry(channel.id)
            .or_insert_with(|| ChannelLog::new(channel.id, channel.name.clone()))
    }

    pub fn holds_all(&self, channels: &[ChannelRef]) -> bool {
        channels.iter().all(|c| self.channels.contains_key(&c.id))
    }

    pub fn all_backfilled(&self, channels: &[ChannelRef]) -> bool {
        channels
            .iter()
            .all(|c| self.channels.get(&c.id).is_some_and(ChannelLog::is_backfilled))
    }

    /// Messages held across `channels`.
    pub fn message_count(&self, channels: &[ChannelRef]) -> usize {
        channels
            .iter()
            .filter_map(|c| self.channels.get(&c.id))
            .map(ChannelLog::len)
            .sum()
    }
}
