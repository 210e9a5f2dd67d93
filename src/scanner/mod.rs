//! Single-pass aggregation over an archive.

pub mod builtin;
pub mod counter;
pub mod report;
pub mod text;

use crate::logs::{ChannelLog, GuildArchive, MessageRecord};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::debug;

pub use builtin::{
    ChannelsScanner, EmojisScanner, MentionedScanner, MentionsScanner, MessagesScanner,
    ReactionsScanner, WordsScanner,
};
pub use counter::{Counter, CounterMap, Weights};
pub use report::{RankedEntry, Report};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MemberFilter {
    #[default]
    All,
    Only(BTreeSet<u64>),
}

impl MemberFilter {
    pub fn from_members(members: impl IntoIterator<Item = u64>) -> Self {
        let members: BTreeSet<u64> = members.into_iter().collect();
        if members.is_empty() {
            MemberFilter::All
        } else {
            MemberFilter::Only(members)
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, MemberFilter::All)
    }

    pub fn contains(&self, member_id: u64) -> bool {
        match self {
            MemberFilter::All => true,
            MemberFilter::Only(members) => members.contains(&member_id),
        }
    }

    /// Explicitly selected, as opposed to matched by default.
    pub fn selects(&self, member_id: u64) -> bool {
        match self {
            MemberFilter::All => false,
            MemberFilter::Only(members) => members.contains(&member_id),
        }
    }
}

/// What a scan walks over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanScope {
    pub channels: Vec<u64>,
    pub members: MemberFilter,
    pub start_date: Option<DateTime<Utc>>,
    pub stop_date: Option<DateTime<Utc>>,
}

impl ScanScope {
    pub fn new(channels: Vec<u64>) -> Self {
        Self {
            channels,
            members: MemberFilter::All,
            start_date: None,
            stop_date: None,
        }
    }

    /// Fits the date range to the archive: a start date older than anything
    /// held moves up to the oldest held message, and a start date without a
    /// stop date scans up to `now`.
    pub fn resolve(mut self, archive: &GuildArchive, now: DateTime<Utc>) -> Self {
        if let Some(start) = self.start_date {
            let oldest_held = self
                .channels
                .iter()
                .filter_map(|id| archive.channel(*id)?.start_date())
                .min();
            if let Some(oldest) = oldest_held {
                self.start_date = Some(start.max(oldest));
            }
            self.stop_date.get_or_insert(now);
        }
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Messages at least one visit reported as impacted.
    pub matched_messages: usize,
    /// Messages held by the scoped channels, regardless of dates.
    pub total_messages: usize,
    /// Scoped channels with at least one matched message.
    pub matched_channels: usize,
}

/// Per-message visitor with its own accumulator.
pub trait Scanner: Send {
    /// Returns whether `message` counts toward the matched total.
    fn visit(&mut self, channel: &ChannelLog, message: &MessageRecord, members: &MemberFilter)
        -> bool;

    fn report(&self, summary: &ScanSummary, now: DateTime<Utc>) -> Report;
}

/// Feeds every in-scope, in-range message to `scanner` once.
pub fn run_scan(archive: &GuildArchive, scope: &ScanScope, scanner: &mut dyn Scanner) -> ScanSummary {
    let started = Instant::now();
    let mut summary = ScanSummary::default();
    let mut seen = BTreeSet::new();
    for channel_id in &scope.channels {
        if !seen.insert(*channel_id) {
            continue;
        }
        let Some(log) = archive.channel(*channel_id) else {
            continue;
        };
        let mut matched = 0;
        for message in log.messages_between(scope.start_date, scope.stop_date) {
            if scanner.visit(log, message, &scope.members) {
                matched += 1;
            }
        }
        summary.total_messages += log.len();
        summary.matched_messages += matched;
        if matched > 0 {
            summary.matched_channels += 1;
        }
    }
    debug!(
        "Scanned guild {} in {:?}: {} matched of {} messages",
        archive.guild_id,
        started.elapsed(),
        summary.matched_messages,
        summary.total_messages
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::message::tests::record_at;
    use crate::logs::ChannelRef;
    use chrono::Duration;

    fn archive(now: DateTime<Utc>) -> GuildArchive {
        let mut archive = GuildArchive::new(1);
        for (channel, days) in [(10u64, [1i64, 2, 3]), (11, [5, 6, 7])] {
            let log = archive.get_or_insert(&ChannelRef::new(channel, "c"));
            for (i, d) in days.iter().enumerate() {
                log.insert(record_at(now - Duration::days(*d), channel, 100 + i as u64));
            }
        }
        archive
    }

    #[test]
    fn test_resolve_clamps_start_to_oldest_held() {
        let now = Utc::now();
        let archive = archive(now);
        let scope = ScanScope {
            start_date: Some(now - Duration::days(30)),
            ..ScanScope::new(vec![10])
        }
        .resolve(&archive, now);

        assert_eq!(scope.start_date, Some(now - Duration::days(3)));
        assert_eq!(scope.stop_date, Some(now));

        let untouched = ScanScope::new(vec![10]).resolve(&archive, now);
        assert_eq!(untouched.start_date, None);
        assert_eq!(untouched.stop_date, None);
    }

    #[test]
    fn test_run_scan_counts_scope() {
        let now = Utc::now();
        let archive = archive(now);
        let scope = ScanScope {
            start_date: Some(now - Duration::days(5)),
            stop_date: Some(now - Duration::days(2)),
            ..ScanScope::new(vec![10, 11, 10, 99])
        };
        let mut scanner = MessagesScanner::new(10, false);

        let summary = run_scan(&archive, &scope, &mut scanner);

        assert_eq!(summary.matched_messages, 3);
        assert_eq!(summary.total_messages, 6);
        assert_eq!(summary.matched_channels, 2);
    }

    #[test]
    fn test_member_filter() {
        assert!(MemberFilter::All.contains(5));
        assert!(!MemberFilter::All.selects(5));
        let only = MemberFilter::from_members([5]);
        assert!(only.contains(5) && only.selects(5));
        assert!(!only.contains(6));
        assert_eq!(MemberFilter::from_members([]), MemberFilter::All);
    }
}
