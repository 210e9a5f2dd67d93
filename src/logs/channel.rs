use crate::logs::error::FetchError;
use crate::logs::message::{snowflake_time, MessageRecord};
use crate::logs::source::MessageSource;
use crate::logs::FORMAT_VERSION;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Archived history of one channel plus the cursors bounding what was synced.
///
/// `first_message_id == None` means the history is fully back-filled and
/// `Some(id)` marks the oldest message fetched so far. A channel holding no
/// cursor at all is only back-filled once `synced` is set, which happens when
/// a sync found it empty or unreadable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelLog {
    #[serde(rename = "id")]
    pub channel_id: u64,
    #[serde(rename = "name")]
    pub channel_name: String,
    #[serde(rename = "format")]
    pub format_version: u32,
    pub first_message_id: Option<u64>,
    pub last_message_id: Option<u64>,
    #[serde(default)]
    pub synced: bool,
    #[serde(with = "message_list")]
    pub messages: BTreeMap<u64, MessageRecord>,
}

impl ChannelLog {
    pub fn new(channel_id: u64, channel_name: impl Into<String>) -> Self {
        Self {
            channel_id,
            channel_name: channel_name.into(),
            format_version: FORMAT_VERSION,
            first_message_id: None,
            last_message_id: None,
            synced: false,
            messages: BTreeMap::new(),
        }
    }

    /// Never went through a sync.
    pub fn is_new(&self) -> bool {
        self.last_message_id.is_none() && !self.synced
    }

    pub fn is_backfilled(&self) -> bool {
        self.first_message_id.is_none() && (self.last_message_id.is_some() || self.synced)
    }

    /// Creation time of the oldest held message.
    pub fn start_date(&self) -> Option<DateTime<Utc>> {
        self.messages.values().next().map(|m| m.created_at)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Inserts or refreshes a record. Returns true when the id was not held yet.
    pub fn insert(&mut self, record: MessageRecord) -> bool {
        self.messages.insert(record.id, record).is_none()
    }

    /// Messages created within `[start, stop]`, oldest first.
    pub fn messages_between(
        &self,
        start: Option<DateTime<Utc>>,
        stop: Option<DateTime<Utc>>,
    ) -> impl Iterator<Item = &MessageRecord> {
        self.messages.values().filter(move |m| {
            start.map_or(true, |s| m.created_at >= s) && stop.map_or(true, |s| m.created_at <= s)
        })
    }
}

/// Date bounds and page size for one incremental load.
#[derive(Debug, Clone, Copy)]
pub struct LoadScope {
    pub start_date: Option<DateTime<Utc>>,
    pub stop_date: Option<DateTime<Utc>>,
    pub chunk_size: usize,
}

impl LoadScope {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            start_date: None,
            stop_date: None,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn with_dates(
        mut self,
        start_date: Option<DateTime<Utc>>,
        stop_date: Option<DateTime<Utc>>,
    ) -> Self {
        self.start_date = start_date;
        self.stop_date = stop_date;
        self
    }
}

/// Result of one loader step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Pending { messages: usize },
    Done { messages: usize },
    /// The remote source refused a page. Already fetched messages are kept.
    Failed,
}

impl Progress {
    pub fn is_done(&self) -> bool {
        !matches!(self, Progress::Pending { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Peek,
    Backward { before: Option<u64> },
    Forward,
    Done,
}

/// Drives a `ChannelLog` up to date one remote page at a time.
///
/// New channels are first checked for at least one message, then paged backward from
/// the newest message. Partially back-filled channels resume backward from
/// `first_message_id` when the requested start date needs older history.
/// Every channel holding messages is then paged forward from `last_message_id`.
#[derive(Debug)]
pub struct ChannelLoader {
    scope: LoadScope,
    phase: Phase,
    queried: usize,
}

impl ChannelLoader {
    pub fn new(log: &ChannelLog, scope: LoadScope) -> Self {
        let phase = if log.last_message_id.is_none() {
            Phase::Peek
        } else if needs_backfill(log, &scope) {
            Phase::Backward {
                before: log.first_message_id,
            }
        } else {
            Phase::Forward
        };
        Self {
            scope,
            phase,
            queried: 0,
        }
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    /// Messages inserted by this loader that were not held before.
    pub fn queried(&self) -> usize {
        self.queried
    }

    pub async fn step(&mut self, log: &mut ChannelLog, source: &dyn MessageSource) -> Progress {
        if self.is_done() {
            return Progress::Done {
                messages: log.len(),
            };
        }
        match self.advance(log, source).await {
            Ok(()) if self.is_done() => {
                log.synced = true;
                Progress::Done {
                    messages: log.len(),
                }
            }
            Ok(()) => Progress::Pending {
                messages: log.len(),
            },
            Err(e) => {
                warn!("Channel {} sync aborted: {}", log.channel_id, e);
                // Unreadable channels have nothing to wait for; remote faults may clear.
                if matches!(e, FetchError::Forbidden(_) | FetchError::NotFound(_)) {
                    log.synced = true;
                }
                self.phase = Phase::Done;
                Progress::Failed
            }
        }
    }

    async fn advance(
        &mut self,
        log: &mut ChannelLog,
        source: &dyn MessageSource,
    ) -> Result<(), FetchError> {
        match self.phase {
            Phase::Peek => {
                let newest = source.fetch_before(log.channel_id, None, 1).await?;
                self.phase = if newest.is_empty() {
                    debug!("Channel {} has no accessible messages", log.channel_id);
                    Phase::Done
                } else {
                    Phase::Backward { before: None }
                };
            }
            Phase::Backward { before } => {
                let chunk = source
                    .fetch_before(log.channel_id, before, self.scope.chunk_size)
                    .await?;
                let full = chunk.len() >= self.scope.chunk_size;
                let mut cut = false;
                let mut oldest = None;
                for record in chunk {
                    if self.scope.start_date.is_some_and(|s| record.created_at < s) {
                        cut = true;
                        break;
                    }
                    oldest = Some(record.id);
                    self.accept(log, record);
                }

                let Some(oldest) = oldest else {
                    // Nothing in range: a channel without cursors stays so, one
                    // holding messages keeps its cursor unless the bottom was hit.
                    let held = log.last_message_id.is_some();
                    if held && !cut {
                        log.first_message_id = None;
                    }
                    self.phase = if !held {
                        Phase::Done
                    } else {
                        Phase::Forward
                    };
                    return Ok(());
                };

                if cut || full {
                    log.first_message_id = Some(oldest);
                } else {
                    log.first_message_id = None;
                }
                self.phase = if cut || !full {
                    Phase::Forward
                } else {
                    Phase::Backward {
                        before: Some(oldest),
                    }
                };
            }
            Phase::Forward => {
                let Some(after) = log.last_message_id else {
                    self.phase = Phase::Done;
                    return Ok(());
                };
                if self
                    .scope
                    .stop_date
                    .is_some_and(|s| snowflake_time(after) >= s)
                {
                    self.phase = Phase::Done;
                    return Ok(());
                }
                let chunk = source
                    .fetch_after(log.channel_id, after, self.scope.chunk_size)
                    .await?;
                let full = chunk.len() >= self.scope.chunk_size;
                let mut cut = false;
                for record in chunk {
                    if self.scope.stop_date.is_some_and(|s| record.created_at > s) {
                        cut = true;
                        break;
                    }
                    self.accept(log, record);
                }
                if cut || !full {
                    self.phase = Phase::Done;
                }
            }
            Phase::Done => {}
        }
        Ok(())
    }

    fn accept(&mut self, log: &mut ChannelLog, record: MessageRecord) {
        if log.last_message_id.map_or(true, |last| record.id > last) {
            log.last_message_id = Some(record.id);
        }
        if log.insert(record) {
            self.queried += 1;
        }
    }
}

fn needs_backfill(log: &ChannelLog, scope: &LoadScope) -> bool {
    if log.first_message_id.is_none() {
        return false;
    }
    match (scope.start_date, log.start_date()) {
        (None, _) => true,
        (Some(_), None) => true,
        (Some(wanted), Some(held)) => wanted < held,
    }
}

/// Stores the message map as a plain list; ids are already inside each record.
mod message_list {
    use super::MessageRecord;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(
        messages: &BTreeMap<u64, MessageRecord>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(messages.values())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<u64, MessageRecord>, D::Error> {
        let list = Vec::<MessageRecord>::deserialize(deserializer)?;
        Ok(list.into_iter().map(|m| (m.id, m)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::message::tests::record_at;
    use crate::logs::source::fake::FakeSource;
    use chrono::{Duration, TimeZone};

    const CHANNEL: u64 = 10;

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
    }

    fn source_with(days: &[i64]) -> (FakeSource, Vec<MessageRecord>) {
        let source = FakeSource::new();
        source.add_channel(CHANNEL);
        let records: Vec<_> = days.iter().map(|d| record_at(day(*d), 0, 1)).collect();
        for r in &records {
            source.push(CHANNEL, r.clone());
        }
        (source, records)
    }

    async fn run(log: &mut ChannelLog, source: &FakeSource, scope: LoadScope) -> (Vec<Progress>, usize) {
        let mut loader = ChannelLoader::new(log, scope);
        let mut steps = Vec::new();
        while !loader.is_done() {
            steps.push(loader.step(log, source).await);
        }
        (steps, loader.queried())
    }

    #[tokio::test]
    async fn test_first_load_backfills_everything() {
        let (source, records) = source_with(&[0, 1, 2, 3, 4]);
        let mut log = ChannelLog::new(CHANNEL, "general");

        let (steps, queried) = run(&mut log, &source, LoadScope::new(2)).await;

        assert_eq!(queried, 5);
        assert_eq!(log.len(), 5);
        assert!(log.is_backfilled());
        assert_eq!(log.last_message_id, Some(records[4].id));
        assert_eq!(log.start_date(), Some(day(0)));
        assert!(matches!(steps.first(), Some(Progress::Pending { .. })));
        assert_eq!(steps.last(), Some(&Progress::Done { messages: 5 }));
    }

    #[tokio::test]
    async fn test_empty_channel_is_done_without_cursors() {
        let (source, _) = source_with(&[]);
        let mut log = ChannelLog::new(CHANNEL, "empty");

        let (steps, queried) = run(&mut log, &source, LoadScope::new(10)).await;

        assert_eq!(steps, vec![Progress::Done { messages: 0 }]);
        assert_eq!(queried, 0);
        assert!(!log.is_new());
        assert!(log.is_backfilled());
        assert_eq!(log.last_message_id, None);
        assert_eq!(source.call_count(), 1);

        // Messages posted later are still picked up.
        let posted = record_at(day(3), 0, 1);
        source.push(CHANNEL, posted.clone());
        let (_, queried) = run(&mut log, &source, LoadScope::new(10)).await;
        assert_eq!(queried, 1);
        assert_eq!(log.last_message_id, Some(posted.id));
        assert!(log.is_backfilled());
    }

    #[tokio::test]
    async fn test_start_date_stops_backward_phase() {
        let (source, records) = source_with(&[0, 1, 2]);
        let mut log = ChannelLog::new(CHANNEL, "general");
        let scope = LoadScope::new(10).with_dates(Some(day(1)), None);

        run(&mut log, &source, scope).await;

        assert_eq!(log.len(), 2);
        assert!(!log.messages.contains_key(&records[0].id));
        assert_eq!(log.first_message_id, Some(records[1].id));
        assert_eq!(log.last_message_id, Some(records[2].id));

        // Widening the scope later resumes from the cursor.
        let (_, queried) = run(&mut log, &source, LoadScope::new(10)).await;
        assert_eq!(queried, 1);
        assert!(log.is_backfilled());
    }

    #[tokio::test]
    async fn test_forward_phase_appends_new_messages() {
        let (source, _) = source_with(&[0, 1]);
        let mut log = ChannelLog::new(CHANNEL, "general");
        run(&mut log, &source, LoadScope::new(10)).await;

        let newer: Vec<_> = (2..6).map(|d| record_at(day(d), 0, 2)).collect();
        for r in &newer {
            source.push(CHANNEL, r.clone());
        }
        let (_, queried) = run(&mut log, &source, LoadScope::new(3)).await;

        assert_eq!(queried, 4);
        assert_eq!(log.len(), 6);
        assert_eq!(log.last_message_id, Some(newer[3].id));
    }

    #[tokio::test]
    async fn test_stop_date_bounds_forward_phase() {
        let (source, _) = source_with(&[0]);
        let mut log = ChannelLog::new(CHANNEL, "general");
        run(&mut log, &source, LoadScope::new(10)).await;

        let newer: Vec<_> = (1..4).map(|d| record_at(day(d), 0, 2)).collect();
        for r in &newer {
            source.push(CHANNEL, r.clone());
        }
        let scope = LoadScope::new(10).with_dates(None, Some(day(2)));
        run(&mut log, &source, scope).await;

        assert_eq!(log.len(), 3);
        assert_eq!(log.last_message_id, Some(newer[1].id));
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let (source, _) = source_with(&[0, 1, 2, 3]);
        let mut log = ChannelLog::new(CHANNEL, "general");
        run(&mut log, &source, LoadScope::new(3)).await;
        let before = log.clone();

        let (_, queried) = run(&mut log, &source, LoadScope::new(3)).await;

        assert_eq!(queried, 0);
        assert_eq!(log, before);
    }

    #[tokio::test]
    async fn test_fetch_error_keeps_existing_messages() {
        let (source, _) = source_with(&[0, 1]);
        let mut log = ChannelLog::new(CHANNEL, "general");
        run(&mut log, &source, LoadScope::new(10)).await;
        let before = log.clone();

        source.fail(CHANNEL);
        let (steps, _) = run(&mut log, &source, LoadScope::new(10)).await;

        assert_eq!(steps, vec![Progress::Failed]);
        assert_eq!(log, before);
    }

    #[tokio::test]
    async fn test_unreadable_channel_counts_as_synced() {
        let (source, _) = source_with(&[]);
        source.fail(CHANNEL);
        let mut log = ChannelLog::new(CHANNEL, "secret");

        let (steps, _) = run(&mut log, &source, LoadScope::new(10)).await;

        assert_eq!(steps, vec![Progress::Failed]);
        assert!(log.is_empty());
        assert!(log.is_backfilled());
    }

    #[test]
    fn test_logs_without_sync_marker_still_decode() {
        let json = r#"{"id":10,"name":"general","format":4,"first_message_id":null,"last_message_id":null,"messages":[]}"#;
        let log: ChannelLog = serde_json::from_str(json).unwrap();
        assert!(log.is_new());
        assert!(!log.is_backfilled());
    }

    #[test]
    fn test_messages_between_is_inclusive() {
        let mut log = ChannelLog::new(CHANNEL, "general");
        for d in 0..5 {
            log.insert(record_at(day(d), 0, 1));
        }
        let count = log.messages_between(Some(day(1)), Some(day(3))).count();
        assert_eq!(count, 3);
        assert_eq!(log.messages_between(None, None).count(), 5);
    }
}
