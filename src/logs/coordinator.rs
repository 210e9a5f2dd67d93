use crate::logs::channel::{ChannelLoader, ChannelLog, LoadScope, Progress};
use crate::logs::error::ArchiveError;
use crate::logs::registry::{SyncRegistry, SyncTicket};
use crate::logs::source::MessageSource;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// One channel to bring up to date. The worker owns the log until it is done.
#[derive(Debug)]
pub struct SyncJob {
    pub log: ChannelLog,
    pub scope: LoadScope,
}

/// Counters of one worker. Each field is written by its worker only.
#[derive(Debug, Default)]
struct WorkerState {
    queried: AtomicUsize,
    total: AtomicUsize,
    done: AtomicBool,
    failed: AtomicBool,
}

/// Combined progress published while a sync runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncProgress {
    pub queried: usize,
    pub total: usize,
    pub channels_done: usize,
    pub channels_total: usize,
    pub new_channels: usize,
}

#[derive(Debug)]
pub enum SyncOutcome {
    Completed {
        logs: Vec<ChannelLog>,
        synced_channels: usize,
        failed_channels: Vec<u64>,
        queried: usize,
    },
    Cancelled,
}

/// Runs one worker per channel and supervises them on a fixed tick.
#[derive(Debug, Clone)]
pub struct SyncCoordinator {
    interval: Duration,
}

impl SyncCoordinator {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    pub async fn run(
        &self,
        jobs: Vec<SyncJob>,
        source: Arc<dyn MessageSource>,
        registry: &SyncRegistry,
        ticket: &SyncTicket,
        progress: Option<&watch::Sender<SyncProgress>>,
    ) -> Result<SyncOutcome, ArchiveError> {
        let started = Instant::now();
        let stop = Arc::new(AtomicBool::new(false));
        let new_channels = jobs.iter().filter(|j| j.log.is_new()).count();

        let mut workers: Vec<(u64, Arc<WorkerState>, JoinHandle<ChannelLog>)> =
            Vec::with_capacity(jobs.len());
        for job in jobs {
            let channel_id = job.log.channel_id;
            let state = Arc::new(WorkerState::default());
            state.total.store(job.log.len(), Ordering::Relaxed);
            let handle = tokio::spawn(drive(
                job,
                Arc::clone(&source),
                Arc::clone(&state),
                Arc::clone(&stop),
            ));
            workers.push((channel_id, state, handle));
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if registry.is_cancelled(ticket) {
                stop.store(true, Ordering::Relaxed);
                info!(
                    "Sync of guild {} cancelled after {:?}",
                    ticket.guild_id(),
                    started.elapsed()
                );
                return Ok(SyncOutcome::Cancelled);
            }
            let snapshot = summarize(&workers, new_channels);
            if let Some(tx) = progress {
                tx.send_replace(snapshot);
            }
            if snapshot.channels_done == snapshot.channels_total {
                break;
            }
        }

        let mut logs = Vec::with_capacity(workers.len());
        let mut failed_channels = Vec::new();
        let mut queried = 0;
        for (channel_id, state, handle) in workers {
            logs.push(handle.await?);
            queried += state.queried.load(Ordering::Relaxed);
            if state.failed.load(Ordering::Relaxed) {
                failed_channels.push(channel_id);
            }
        }
        let synced_channels = logs.len() - failed_channels.len();

        let elapsed = started.elapsed().as_secs_f64();
        info!(
            "Guild {}: queried {} messages in {:.2}s ({:.0} m/s), {} channels synced, {} failed",
            ticket.guild_id(),
            queried,
            elapsed,
            queried as f64 / elapsed.max(f64::EPSILON),
            synced_channels,
            failed_channels.len()
        );

        Ok(SyncOutcome::Completed {
            logs,
            synced_channels,
            failed_channels,
            queried,
        })
    }
}

async fn drive(
    mut job: SyncJob,
    source: Arc<dyn MessageSource>,
    state: Arc<WorkerState>,
    stop: Arc<AtomicBool>,
) -> ChannelLog {
    let mut loader = ChannelLoader::new(&job.log, job.scope);
    while !loader.is_done() {
        if stop.load(Ordering::Relaxed) {
            debug!("Worker of channel {} stopped", job.log.channel_id);
            break;
        }
        match loader.step(&mut job.log, source.as_ref()).await {
            Progress::Pending { messages } | Progress::Done { messages } => {
                state.total.store(messages, Ordering::Relaxed);
                state.queried.store(loader.queried(), Ordering::Relaxed);
            }
            Progress::Failed => {
                warn!("Channel {} excluded from this sync", job.log.channel_id);
                state.failed.store(true, Ordering::Relaxed);
            }
        }
    }
    state.queried.store(loader.queried(), Ordering::Relaxed);
    state.total.store(job.log.len(), Ordering::Relaxed);
    state.done.store(true, Ordering::Release);
    job.log
}

fn summarize(
    workers: &[(u64, Arc<WorkerState>, JoinHandle<ChannelLog>)],
    new_channels: usize,
) -> SyncProgress {
    let mut progress = SyncProgress {
        channels_total: workers.len(),
        new_channels,
        ..SyncProgress::default()
    };
    for (_, state, _) in workers {
        progress.queried += state.queried.load(Ordering::Relaxed);
        progress.total += state.total.load(Ordering::Relaxed);
        if state.done.load(Ordering::Acquire) {
            progress.channels_done += 1;
        }
    }
    progress
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::message::tests::record_at;
    use crate::logs::source::fake::FakeSource;
    use chrono::{Duration as ChronoDuration, Utc};
    use tokio::sync::Semaphore;

    const GUILD: u64 = 1;

    fn job(channel_id: u64) -> SyncJob {
        SyncJob {
            log: ChannelLog::new(channel_id, format!("channel-{}", channel_id)),
            scope: LoadScope::new(2),
        }
    }

    fn seeded_source(channels: &[(u64, usize)]) -> FakeSource {
        let source = FakeSource::new();
        let now = Utc::now();
        for (channel_id, count) in channels {
            source.add_channel(*channel_id);
            for i in 0..*count {
                let at = now - ChronoDuration::hours(i as i64 + 1);
                source.push(*channel_id, record_at(at, *channel_id, 1));
            }
        }
        source
    }

    #[tokio::test]
    async fn test_all_workers_complete() {
        let source: Arc<dyn MessageSource> = Arc::new(seeded_source(&[(10, 5), (11, 3)]));
        let registry = SyncRegistry::new();
        let ticket = registry.acquire(GUILD).unwrap();
        let (tx, rx) = watch::channel(SyncProgress::default());

        let outcome = SyncCoordinator::new(Duration::from_millis(5))
            .run(vec![job(10), job(11)], source, &registry, &ticket, Some(&tx))
            .await
            .unwrap();

        let SyncOutcome::Completed {
            logs,
            synced_channels,
            failed_channels,
            queried,
        } = outcome
        else {
            panic!("sync was not completed");
        };
        assert_eq!(synced_channels, 2);
        assert!(failed_channels.is_empty());
        assert_eq!(queried, 8);
        assert_eq!(logs.iter().map(ChannelLog::len).sum::<usize>(), 8);
        assert!(logs.iter().all(ChannelLog::is_backfilled));

        let last = *rx.borrow();
        assert_eq!(last.channels_done, 2);
        assert_eq!(last.channels_total, 2);
        assert_eq!(last.new_channels, 2);
        assert_eq!(last.total, 8);
    }

    #[tokio::test]
    async fn test_failing_channel_does_not_abort_siblings() {
        let fake = seeded_source(&[(10, 3), (11, 3)]);
        fake.fail(11);
        let source: Arc<dyn MessageSource> = Arc::new(fake);
        let registry = SyncRegistry::new();
        let ticket = registry.acquire(GUILD).unwrap();

        let outcome = SyncCoordinator::new(Duration::from_millis(5))
            .run(vec![job(10), job(11)], source, &registry, &ticket, None)
            .await
            .unwrap();

        let SyncOutcome::Completed {
            logs,
            synced_channels,
            failed_channels,
            ..
        } = outcome
        else {
            panic!("sync was not completed");
        };
        assert_eq!(synced_channels, 1);
        assert_eq!(failed_channels, vec![11]);
        assert_eq!(logs.len(), 2);
        let failed = logs.iter().find(|l| l.channel_id == 11).unwrap();
        assert!(failed.is_empty());
        assert!(failed.synced);
    }

    #[tokio::test]
    async fn test_cancel_stops_workers_without_joining() {
        let gate = Arc::new(Semaphore::new(0));
        let fake = Arc::new(FakeSource::gated(Arc::clone(&gate)));
        for channel_id in [10, 11] {
            fake.add_channel(channel_id);
            fake.push(channel_id, record_at(Utc::now(), 0, 1));
        }
        let source: Arc<dyn MessageSource> = fake.clone();
        let registry = Arc::new(SyncRegistry::new());
        let ticket = registry.acquire(GUILD).unwrap();

        let canceller = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                registry.cancel(GUILD)
            })
        };

        let outcome = SyncCoordinator::new(Duration::from_millis(5))
            .run(vec![job(10), job(11)], source, &registry, &ticket, None)
            .await
            .unwrap();

        assert!(matches!(outcome, SyncOutcome::Cancelled));
        assert!(canceller.await.unwrap());

        // Workers blocked mid-fetch finish that page, then issue nothing more.
        assert_eq!(fake.call_count(), 2);
        gate.add_permits(10);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(fake.call_count(), 2);
    }
}
