use crate::logs::archive::{ChannelRef, GuildArchive};
use crate::logs::channel::{ChannelLog, LoadScope};
use crate::logs::codec::ArchiveCodec;
use crate::logs::coordinator::{SyncCoordinator, SyncJob, SyncOutcome, SyncProgress};
use crate::logs::error::ArchiveError;
use crate::logs::registry::{SyncGuard, SyncRegistry};
use crate::logs::source::{MessageSource, MAX_PAGE_SIZE};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tempfile::NamedTempFile;
use tokio::sync::watch;
use tracing::{debug, info, warn};

const ARCHIVE_EXTENSION: &str = "logz";

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub dir: PathBuf,
    pub passphrase: Option<String>,
    /// Archives untouched for longer than this are swept.
    pub retention: Duration,
    /// An archive written more recently than this may be trusted without syncing.
    pub fast_threshold: Duration,
    pub progress_interval: Duration,
    pub chunk_size: usize,
    /// When set, guilds must opt in before anything is archived.
    pub require_opt_in: bool,
}

impl StoreConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            passphrase: None,
            retention: Duration::from_secs(90 * 24 * 3600),
            fast_threshold: Duration::from_secs(3600),
            progress_interval: Duration::from_millis(500),
            chunk_size: MAX_PAGE_SIZE,
            require_opt_in: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub guild_id: u64,
    pub channels: Vec<ChannelRef>,
    pub start_date: Option<DateTime<Utc>>,
    pub stop_date: Option<DateTime<Utc>>,
    /// Trust the archive when it already holds every requested channel.
    pub fast: bool,
    /// Drop the requested channels' history and fetch it again.
    pub fresh: bool,
}

impl LoadRequest {
    pub fn new(guild_id: u64, channels: Vec<ChannelRef>) -> Self {
        Self {
            guild_id,
            channels,
            start_date: None,
            stop_date: None,
            fast: false,
            fresh: false,
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

    pub fn fast(mut self, fast: bool) -> Self {
        self.fast = fast;
        self
    }

    pub fn fresh(mut self, fresh: bool) -> Self {
        self.fresh = fresh;
        self
    }

    fn has_dates(&self) -> bool {
        self.start_date.is_some() || self.stop_date.is_some()
    }
}

#[derive(Debug)]
pub struct LoadedArchive {
    pub archive: GuildArchive,
    pub total_messages: usize,
    pub total_channels: usize,
}

#[derive(Debug)]
pub enum LoadOutcome {
    Ready(LoadedArchive),
    AlreadyRunning,
    Cancelled,
    /// No usable archive and the request may not create one.
    NoFile,
}

enum FastPath {
    Hit(LoadedArchive),
    Missing,
    Miss,
}

/// Owns the archive directory: one file per guild.
pub struct ArchiveStore {
    config: StoreConfig,
    codec: ArchiveCodec,
    registry: Arc<SyncRegistry>,
    coordinator: SyncCoordinator,
}

impl ArchiveStore {
    pub fn new(config: StoreConfig, registry: Arc<SyncRegistry>) -> Self {
        let codec = ArchiveCodec::from_passphrase(config.passphrase.as_deref());
        info!(
            "Archives stored in {:?} ({})",
            config.dir,
            if codec.is_encrypted() {
                "encrypted"
            } else {
                "not encrypted"
            }
        );
        let coordinator = SyncCoordinator::new(config.progress_interval);
        Self {
            config,
            codec,
            registry,
            coordinator,
        }
    }

    pub fn registry(&self) -> &Arc<SyncRegistry> {
        &self.registry
    }

    pub fn path(&self, guild_id: u64) -> PathBuf {
        self.config
            .dir
            .join(format!("{}.{}", guild_id, ARCHIVE_EXTENSION))
    }

    pub async fn exists(&self, guild_id: u64) -> bool {
        tokio::fs::try_exists(self.path(guild_id))
            .await
            .unwrap_or(false)
    }

    /// Brings the requested channels up to date and returns the archive.
    pub async fn load(
        &self,
        request: LoadRequest,
        source: Arc<dyn MessageSource>,
        progress: Option<&watch::Sender<SyncProgress>>,
    ) -> Result<LoadOutcome, ArchiveError> {
        match self.try_fast_path(&request).await? {
            FastPath::Hit(loaded) => {
                debug!(
                    "Guild {}: fast path, {} messages in {} channels",
                    request.guild_id, loaded.total_messages, loaded.total_channels
                );
                return Ok(LoadOutcome::Ready(loaded));
            }
            FastPath::Missing if request.fast || self.config.require_opt_in => {
                return Ok(LoadOutcome::NoFile);
            }
            FastPath::Missing | FastPath::Miss => {}
        }

        let Some(guard) = SyncGuard::acquire(&self.registry, request.guild_id) else {
            info!("Guild {}: sync already running", request.guild_id);
            return Ok(LoadOutcome::AlreadyRunning);
        };
        self.sync(request, source, progress, &guard).await
    }

    async fn try_fast_path(&self, request: &LoadRequest) -> Result<FastPath, ArchiveError> {
        let path = self.path(request.guild_id);
        let modified = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata.modified().ok(),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(FastPath::Missing),
            Err(e) => {
                warn!("Cannot stat archive {:?}: {}", path, e);
                return Ok(FastPath::Missing);
            }
        };

        let recent = modified
            .and_then(|m| m.elapsed().ok())
            .is_some_and(|age| age < self.config.fast_threshold);
        let trusted = !request.fresh && !request.has_dates() && recent;
        if !request.fast && !trusted {
            return Ok(FastPath::Miss);
        }

        let Some(bytes) = self.read_bytes(request.guild_id).await else {
            return Ok(FastPath::Missing);
        };
        let Some(archive) = self.decode(request.guild_id, bytes).await? else {
            return Ok(FastPath::Missing);
        };

        let hit = (request.fast && archive.holds_all(&request.channels))
            || (trusted && archive.all_backfilled(&request.channels));
        if !hit {
            return Ok(FastPath::Miss);
        }
        let total_channels = request
            .channels
            .iter()
            .filter(|c| archive.channel(c.id).is_some())
            .count();
        Ok(FastPath::Hit(LoadedArchive {
            total_messages: archive.message_count(&request.channels),
            total_channels,
            archive,
        }))
    }

    async fn sync(
        &self,
        request: LoadRequest,
        source: Arc<dyn MessageSource>,
        progress: Option<&watch::Sender<SyncProgress>>,
        guard: &SyncGuard,
    ) -> Result<LoadOutcome, ArchiveError> {
        let guild_id = request.guild_id;
        if guard.is_cancelled() {
            return Ok(LoadOutcome::Cancelled);
        }

        let started = Instant::now();
        let bytes = self.read_bytes(guild_id).await;
        if guard.is_cancelled() {
            return Ok(LoadOutcome::Cancelled);
        }
        let existing = match bytes {
            Some(bytes) => self.decode(guild_id, bytes).await?,
            None => None,
        };
        if guard.is_cancelled() {
            return Ok(LoadOutcome::Cancelled);
        }
        let mut archive = existing.unwrap_or_else(|| GuildArchive::new(guild_id));
        archive.guild_id = guild_id;
        debug!("Guild {}: archive read in {:?}", guild_id, started.elapsed());

        let scope = LoadScope::new(self.config.chunk_size)
            .with_dates(request.start_date, request.stop_date);
        let mut jobs = Vec::with_capacity(request.channels.len());
        for channel in &request.channels {
            let mut log = archive
                .channels
                .remove(&channel.id)
                .filter(|_| !request.fresh)
                .unwrap_or_else(|| ChannelLog::new(channel.id, channel.name.clone()));
            log.channel_name = channel.name.clone();
            jobs.push(SyncJob { log, scope });
        }

        let outcome = self
            .coordinator
            .run(jobs, source, &self.registry, guard.ticket(), progress)
            .await?;
        let SyncOutcome::Completed {
            logs,
            synced_channels,
            ..
        } = outcome
        else {
            return Ok(LoadOutcome::Cancelled);
        };
        for log in logs {
            archive.channels.insert(log.channel_id, log);
        }
        if guard.is_cancelled() {
            return Ok(LoadOutcome::Cancelled);
        }

        let started = Instant::now();
        let codec = self.codec.clone();
        let (archive, bytes) = tokio::task::spawn_blocking(move || {
            let bytes = codec.encode(&archive);
            (archive, bytes)
        })
        .await?;
        let bytes = bytes?;
        if guard.is_cancelled() {
            return Ok(LoadOutcome::Cancelled);
        }
        let dir = self.config.dir.clone();
        let path = self.path(guild_id);
        let registry = Arc::clone(&self.registry);
        let ticket = guard.ticket().clone();
        let written = tokio::task::spawn_blocking(move || -> Result<bool, ArchiveError> {
            let staged = stage(&dir, &bytes)?;
            // A revoke racing this write either lands first or waits for it.
            match registry.while_held(&ticket, move || staged.persist(&path)) {
                Some(persisted) => {
                    persisted?;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
        .await??;
        if !written {
            return Ok(LoadOutcome::Cancelled);
        }
        debug!("Guild {}: archive written in {:?}", guild_id, started.elapsed());

        Ok(LoadOutcome::Ready(LoadedArchive {
            total_messages: archive.message_count(&request.channels),
            total_channels: synced_channels,
            archive,
        }))
    }

    async fn read_bytes(&self, guild_id: u64) -> Option<Vec<u8>> {
        let path = self.path(guild_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Cannot read archive {:?}, treating as absent: {}", path, e);
                None
            }
        }
    }

    async fn decode(
        &self,
        guild_id: u64,
        bytes: Vec<u8>,
    ) -> Result<Option<GuildArchive>, ArchiveError> {
        let codec = self.codec.clone();
        let decoded = tokio::task::spawn_blocking(move || codec.decode(&bytes)).await?;
        match decoded {
            Ok(archive) => Ok(Some(archive)),
            Err(e) => {
                warn!("Archive of guild {} is unusable, resyncing: {}", guild_id, e);
                Ok(None)
            }
        }
    }

    /// Requests cancellation of the running sync of `guild_id`.
    pub fn cancel(&self, guild_id: u64) -> bool {
        self.registry.cancel(guild_id)
    }

    /// Opts a guild in by writing an empty archive. Returns false when one exists.
    pub async fn init(&self, guild_id: u64) -> Result<bool, ArchiveError> {
        if self.exists(guild_id).await {
            return Ok(false);
        }
        let bytes = self.codec.encode(&GuildArchive::new(guild_id))?;
        let dir = self.config.dir.clone();
        let path = self.path(guild_id);
        tokio::task::spawn_blocking(move || write_atomic(&dir, &path, &bytes)).await??;
        info!("Guild {}: archiving enabled", guild_id);
        Ok(true)
    }

    /// Opts a guild out: stops any running sync and deletes its archive.
    pub async fn remove(&self, guild_id: u64) -> Result<bool, ArchiveError> {
        self.registry.cancel(guild_id);
        match tokio::fs::remove_file(self.path(guild_id)).await {
            Ok(()) => {
                info!("Guild {}: archive removed", guild_id);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes archives of guilds not in `known_guilds` or untouched for longer
    /// than the retention window. Guilds with a sync in flight are skipped.
    pub async fn sweep(&self, known_guilds: HashSet<u64>) -> Result<usize, ArchiveError> {
        let dir = self.config.dir.clone();
        let retention = self.config.retention;
        let registry = Arc::clone(&self.registry);
        let removed = tokio::task::spawn_blocking(move || {
            sweep_dir(&dir, retention, &known_guilds, &registry)
        })
        .await??;
        if removed > 0 {
            info!("Swept {} archives", removed);
        }
        Ok(removed)
    }
}

/// Writes `bytes` to a synced temporary file next to the archives.
fn stage(dir: &Path, bytes: &[u8]) -> Result<NamedTempFile, ArchiveError> {
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    Ok(tmp)
}

fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> Result<(), ArchiveError> {
    stage(dir, bytes)?.persist(path)?;
    Ok(())
}

fn sweep_dir(
    dir: &Path,
    retention: Duration,
    known_guilds: &HashSet<u64>,
    registry: &SyncRegistry,
) -> Result<usize, ArchiveError> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
        return Ok(0);
    }

    let threshold = SystemTime::now()
        .checked_sub(retention)
        .unwrap_or(SystemTime::UNIX_EPOCH);
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(guild_id) = archive_guild(&path) else {
            continue;
        };
        if registry.is_running(guild_id) {
            continue;
        }
        let stale = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .map(|modified| modified <= threshold)
            .unwrap_or(false);
        if known_guilds.contains(&guild_id) && !stale {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!("Swept archive {:?}", path);
                removed += 1;
            }
            Err(e) => warn!("Failed to delete archive {:?}: {}", path, e),
        }
    }
    Ok(removed)
}

fn archive_guild(path: &Path) -> Option<u64> {
    if path.extension()? != ARCHIVE_EXTENSION {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}
