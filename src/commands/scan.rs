use crate::logs::{
    ChannelRef, LoadOutcome, LoadRequest, MessageSource, SerenitySource, SyncProgress,
};
use crate::scanner::report::{plural, MESSAGE_LIMIT};
use crate::scanner::{
    run_scan, ChannelsScanner, EmojisScanner, MemberFilter, MentionedScanner, MentionsScanner,
    MessagesScanner, ReactionsScanner, ScanScope, Scanner, Weights, WordsScanner,
};
use crate::{Context, Error};
use chrono::{DateTime, NaiveDate, Utc};
use poise::serenity_prelude as serenity;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info};

const DEFAULT_TOP: usize = 10;
const DEFAULT_EMOJIS_TOP: usize = 20;

pub const NO_ARCHIVE_TEXT: &str = "This server has not agreed to message archiving yet. \
Run `/archive info` to read what is stored, then `/archive agree` to enable analysis.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    Messages,
    Channels,
    Reactions,
    Mentions,
    Mentioned,
    Emojis,
    Words,
}

/// How `/emojis` weighs usages against reactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, poise::ChoiceParameter)]
pub enum EmojiOrder {
    #[name = "Usages and reactions"]
    Both,
    #[name = "Usages"]
    Usages,
    #[name = "Reactions"]
    Reactions,
}

impl Default for EmojiOrder {
    fn default() -> Self {
        EmojiOrder::Both
    }
}

impl EmojiOrder {
    fn weights(self) -> Weights {
        match self {
            EmojiOrder::Both => Weights::default(),
            EmojiOrder::Usages => Weights::USAGES_ONLY,
            EmojiOrder::Reactions => Weights::REACTIONS_ONLY,
        }
    }
}

/// Everything needed to run (or repeat) one scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanArgs {
    pub kind: ScanKind,
    pub top: usize,
    /// `None` scans every text channel of the guild.
    pub channel: Option<ChannelRef>,
    pub member: Option<u64>,
    pub start_date: Option<DateTime<Utc>>,
    pub stop_date: Option<DateTime<Utc>>,
    pub fast: bool,
    pub fresh: bool,
    /// Include bots, or every kind of mention for `/mentions`.
    pub everyone: bool,
    /// Rank Unicode emojis next to the guild's own.
    pub all_emojis: bool,
    pub order: EmojiOrder,
}

impl ScanArgs {
    pub fn new(kind: ScanKind) -> Self {
        Self {
            kind,
            top: DEFAULT_TOP,
            channel: None,
            member: None,
            start_date: None,
            stop_date: None,
            fast: false,
            fresh: false,
            everyone: false,
            all_emojis: false,
            order: EmojiOrder::default(),
        }
    }

    /// Fresh scanner for these arguments. `guild_emojis` only matters to `/emojis`.
    pub fn scanner(&self, guild_emojis: BTreeSet<String>) -> Box<dyn Scanner> {
        match self.kind {
            ScanKind::Messages => Box::new(MessagesScanner::new(self.top, self.everyone)),
            ScanKind::Channels => Box::new(ChannelsScanner::new(self.top, self.everyone)),
            ScanKind::Reactions => Box::new(ReactionsScanner::new(self.top)),
            ScanKind::Mentions => Box::new(MentionsScanner::new(self.top, self.everyone)),
            ScanKind::Mentioned => Box::new(MentionedScanner::new(self.top, self.everyone)),
            ScanKind::Words => Box::new(WordsScanner::new(self.top, self.everyone)),
            ScanKind::Emojis => Box::new(
                EmojisScanner::new(self.top, guild_emojis)
                    .include_bots(self.everyone)
                    .all_emojis(self.all_emojis)
                    .weights(self.order.weights())
                    .list_unused(self.channel.is_none() && self.member.is_none()),
            ),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DateError {
    #[error("`{0}` is neither a date (YYYY-MM-DD) nor a duration (7days, 12h)")]
    Invalid(String),
    #[error("Start date is after today")]
    InFuture,
}

/// Parses `YYYY-MM-DD` (midnight UTC) or a duration meaning "that long ago".
pub fn parse_date(raw: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, DateError> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    let ago = humantime::parse_duration(raw).map_err(|_| DateError::Invalid(raw.to_string()))?;
    let ago = chrono::Duration::from_std(ago).map_err(|_| DateError::Invalid(raw.to_string()))?;
    now.checked_sub_signed(ago)
        .ok_or_else(|| DateError::Invalid(raw.to_string()))
}

/// Orders the two optional bounds and rejects a range starting in the future.
pub fn date_range(
    from: Option<&str>,
    to: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>), DateError> {
    let mut dates = Vec::with_capacity(2);
    for raw in [from, to].into_iter().flatten() {
        dates.push(parse_date(raw, now)?);
    }
    dates.sort();
    let (start, stop) = match dates.as_slice() {
        [] => (None, None),
        [only] => (Some(*only), None),
        [start, stop, ..] => (Some(*start), Some(*stop)),
    };
    if start.is_some_and(|s| s > now) {
        return Err(DateError::InFuture);
    }
    Ok((start, stop))
}

fn progress_text(progress: &SyncProgress) -> String {
    format!(
        "```Reading history: {} ({} new), {}/{} channels done```",
        plural(progress.total as u64, "message"),
        progress.queried,
        progress.channels_done,
        progress.channels_total
    )
}

async fn target_channels(
    ctx: Context<'_>,
    guild_id: serenity::GuildId,
    args: &ScanArgs,
) -> Result<Vec<ChannelRef>, Error> {
    if let Some(channel) = &args.channel {
        return Ok(vec![channel.clone()]);
    }
    let mut channels: Vec<ChannelRef> = guild_id
        .channels(ctx.http())
        .await?
        .into_values()
        .filter(|c| matches!(c.kind, serenity::ChannelType::Text | serenity::ChannelType::News))
        .map(|c| ChannelRef::new(c.id.get(), c.name))
        .collect();
    channels.sort_by_key(|c| c.id);
    Ok(channels)
}

/// Loads the archive, scans it and replies with the ranked report.
pub async fn run(ctx: Context<'_>, args: ScanArgs) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    ctx.defer().await?;

    let channels = target_channels(ctx, guild_id, &args).await?;
    let request = LoadRequest::new(guild_id.get(), channels.clone())
        .with_dates(args.start_date, args.stop_date)
        .fast(args.fast)
        .fresh(args.fresh);
    let source: Arc<dyn MessageSource> =
        Arc::new(SerenitySource::new(Arc::clone(&ctx.serenity_context().http)));
    let store = Arc::clone(&ctx.data().store);

    let reply = ctx.say("```Starting analysis...```").await?;
    let (tx, mut rx) = watch::channel(SyncProgress::default());
    let load = store.load(request, source, Some(&tx));
    tokio::pin!(load);
    let outcome = loop {
        tokio::select! {
            outcome = &mut load => break outcome,
            changed = rx.changed() => {
                if changed.is_ok() {
                    let text = progress_text(&rx.borrow_and_update());
                    let _ = reply.edit(ctx, poise::CreateReply::default().content(text)).await;
                }
            }
        }
    };

    let loaded = match outcome {
        Ok(LoadOutcome::Ready(loaded)) => loaded,
        Ok(LoadOutcome::AlreadyRunning) => {
            let text = "An analysis is already running on this server, please be patient.";
            reply.edit(ctx, poise::CreateReply::default().content(text)).await?;
            return Ok(());
        }
        Ok(LoadOutcome::Cancelled) => {
            let text = "Operation cancelled by user";
            reply.edit(ctx, poise::CreateReply::default().content(text)).await?;
            return Ok(());
        }
        Ok(LoadOutcome::NoFile) => {
            reply.edit(ctx, poise::CreateReply::default().content(NO_ARCHIVE_TEXT)).await?;
            return Ok(());
        }
        Err(e) => {
            error!("Guild {}: load failed: {}", guild_id, e);
            let text = "An unexpected error happened while computing your command, we're sorry for the inconvenience.";
            reply.edit(ctx, poise::CreateReply::default().content(text)).await?;
            return Ok(());
        }
    };

    let now = Utc::now();
    let scope = ScanScope {
        channels: channels.iter().map(|c| c.id).collect(),
        members: MemberFilter::from_members(args.member),
        start_date: args.start_date,
        stop_date: args.stop_date,
    }
    .resolve(&loaded.archive, now);
    let guild_emojis = if args.kind == ScanKind::Emojis {
        guild_id
            .emojis(ctx.http())
            .await?
            .iter()
            .map(ToString::to_string)
            .collect()
    } else {
        BTreeSet::new()
    };
    let mut scanner = args.scanner(guild_emojis);
    let archive = loaded.archive;
    let (summary, report) = tokio::task::spawn_blocking(move || {
        let summary = run_scan(&archive, &scope, scanner.as_mut());
        (summary, scanner.report(&summary, now))
    })
    .await?;
    info!(
        "Guild {}: {:?} scan matched {} of {} messages",
        guild_id, args.kind, summary.matched_messages, summary.total_messages
    );

    if summary.matched_messages == 0 {
        let text = "There are no messages found matching the filters";
        reply.edit(ctx, poise::CreateReply::default().content(text)).await?;
        return Ok(());
    }

    let mut chunks = report.render_chunks(now, MESSAGE_LIMIT).into_iter();
    if let Some(first) = chunks.next() {
        reply.edit(ctx, poise::CreateReply::default().content(first)).await?;
    }
    for chunk in chunks {
        ctx.say(chunk).await?;
    }
    ctx.data().command_cache.remember(ctx.channel_id().get(), args);
    Ok(())
}

async fn scan_command(
    ctx: Context<'_>,
    args: ScanArgs,
    from: Option<String>,
    to: Option<String>,
) -> Result<(), Error> {
    let (start_date, stop_date) = match date_range(from.as_deref(), to.as_deref(), Utc::now()) {
        Ok(range) => range,
        Err(e) => {
            ctx.say(format!("❌ {}", e)).await?;
            return Ok(());
        }
    };
    run(
        ctx,
        ScanArgs {
            start_date,
            stop_date,
            ..args
        },
    )
    .await
}

fn channel_ref(channel: serenity::GuildChannel) -> ChannelRef {
    ChannelRef::new(channel.id.get(), channel.name)
}

/// Rank members by messages written
#[poise::command(slash_command, guild_only)]
pub async fn messages(
    ctx: Context<'_>,
    #[description = "Number of entries"]
    #[min = 1]
    #[max = 50]
    top: Option<usize>,
    #[description = "Only this channel"] channel: Option<serenity::GuildChannel>,
    #[description = "Only this member"] member: Option<serenity::User>,
    #[description = "From date (YYYY-MM-DD or 7days)"] from: Option<String>,
    #[description = "To date (YYYY-MM-DD or 7days)"] to: Option<String>,
    #[description = "Trust the archive, skip syncing"] fast: Option<bool>,
    #[description = "Fetch the history again"] fresh: Option<bool>,
    #[description = "Include bots"] everyone: Option<bool>,
) -> Result<(), Error> {
    let args = ScanArgs {
        top: top.unwrap_or(DEFAULT_TOP),
        channel: channel.map(channel_ref),
        member: member.map(|m| m.id.get()),
        fast: fast.unwrap_or(false),
        fresh: fresh.unwrap_or(false),
        everyone: everyone.unwrap_or(false),
        ..ScanArgs::new(ScanKind::Messages)
    };
    scan_command(ctx, args, from, to).await
}

/// Rank channels by messages
#[poise::command(slash_command, guild_only)]
pub async fn channels(
    ctx: Context<'_>,
    #[description = "Number of entries"]
    #[min = 1]
    #[max = 50]
    top: Option<usize>,
    #[description = "Only this channel"] channel: Option<serenity::GuildChannel>,
    #[description = "Only this member"] member: Option<serenity::User>,
    #[description = "From date (YYYY-MM-DD or 7days)"] from: Option<String>,
    #[description = "To date (YYYY-MM-DD or 7days)"] to: Option<String>,
    #[description = "Trust the archive, skip syncing"] fast: Option<bool>,
    #[description = "Fetch the history again"] fresh: Option<bool>,
    #[description = "Include bots"] everyone: Option<bool>,
) -> Result<(), Error> {
    let args = ScanArgs {
        top: top.unwrap_or(DEFAULT_TOP),
        channel: channel.map(channel_ref),
        member: member.map(|m| m.id.get()),
        fast: fast.unwrap_or(false),
        fresh: fresh.unwrap_or(false),
        everyone: everyone.unwrap_or(false),
        ..ScanArgs::new(ScanKind::Channels)
    };
    scan_command(ctx, args, from, to).await
}

/// Rank members by reactions given
#[poise::command(slash_command, guild_only)]
pub async fn reactions(
    ctx: Context<'_>,
    #[description = "Number of entries"]
    #[min = 1]
    #[max = 50]
    top: Option<usize>,
    #[description = "Only this channel"] channel: Option<serenity::GuildChannel>,
    #[description = "Only this member"] member: Option<serenity::User>,
    #[description = "From date (YYYY-MM-DD or 7days)"] from: Option<String>,
    #[description = "To date (YYYY-MM-DD or 7days)"] to: Option<String>,
    #[description = "Trust the archive, skip syncing"] fast: Option<bool>,
    #[description = "Fetch the history again"] fresh: Option<bool>,
) -> Result<(), Error> {
    let args = ScanArgs {
        top: top.unwrap_or(DEFAULT_TOP),
        channel: channel.map(channel_ref),
        member: member.map(|m| m.id.get()),
        fast: fast.unwrap_or(false),
        fresh: fresh.unwrap_or(false),
        ..ScanArgs::new(ScanKind::Reactions)
    };
    scan_command(ctx, args, from, to).await
}

/// Rank mentions by usage
#[poise::command(slash_command, guild_only)]
pub async fn mentions(
    ctx: Context<'_>,
    #[description = "Number of entries"]
    #[min = 1]
    #[max = 50]
    top: Option<usize>,
    #[description = "Only this channel"] channel: Option<serenity::GuildChannel>,
    #[description = "Only this author"] member: Option<serenity::User>,
    #[description = "From date (YYYY-MM-DD or 7days)"] from: Option<String>,
    #[description = "To date (YYYY-MM-DD or 7days)"] to: Option<String>,
    #[description = "Trust the archive, skip syncing"] fast: Option<bool>,
    #[description = "Fetch the history again"] fresh: Option<bool>,
    #[description = "Also rank roles, channels, @everyone and @here"] everyone: Option<bool>,
) -> Result<(), Error> {
    let args = ScanArgs {
        top: top.unwrap_or(DEFAULT_TOP),
        channel: channel.map(channel_ref),
        member: member.map(|m| m.id.get()),
        fast: fast.unwrap_or(false),
        fresh: fresh.unwrap_or(false),
        everyone: everyone.unwrap_or(false),
        ..ScanArgs::new(ScanKind::Mentions)
    };
    scan_command(ctx, args, from, to).await
}

/// Rank who mentions a member
#[poise::command(slash_command, guild_only)]
pub async fn mentioned(
    ctx: Context<'_>,
    #[description = "Mentioned member"] member: serenity::User,
    #[description = "Number of entries"]
    #[min = 1]
    #[max = 50]
    top: Option<usize>,
    #[description = "Only this channel"] channel: Option<serenity::GuildChannel>,
    #[description = "From date (YYYY-MM-DD or 7days)"] from: Option<String>,
    #[description = "To date (YYYY-MM-DD or 7days)"] to: Option<String>,
    #[description = "Trust the archive, skip syncing"] fast: Option<bool>,
    #[description = "Fetch the history again"] fresh: Option<bool>,
    #[description = "Include mentions by bots"] everyone: Option<bool>,
) -> Result<(), Error> {
    let args = ScanArgs {
        top: top.unwrap_or(DEFAULT_TOP),
        channel: channel.map(channel_ref),
        member: Some(member.id.get()),
        fast: fast.unwrap_or(false),
        fresh: fresh.unwrap_or(false),
        everyone: everyone.unwrap_or(false),
        ..ScanArgs::new(ScanKind::Mentioned)
    };
    scan_command(ctx, args, from, to).await
}

/// Rank this server's emojis by usage
#[poise::command(slash_command, guild_only)]
pub async fn emojis(
    ctx: Context<'_>,
    #[description = "Number of entries"]
    #[min = 1]
    #[max = 50]
    top: Option<usize>,
    #[description = "Only this channel"] channel: Option<serenity::GuildChannel>,
    #[description = "Only this member"] member: Option<serenity::User>,
    #[description = "From date (YYYY-MM-DD or 7days)"] from: Option<String>,
    #[description = "To date (YYYY-MM-DD or 7days)"] to: Option<String>,
    #[description = "Trust the archive, skip syncing"] fast: Option<bool>,
    #[description = "Fetch the history again"] fresh: Option<bool>,
    #[description = "Include bots"] everyone: Option<bool>,
    #[description = "Also rank Unicode emojis"] all: Option<bool>,
    #[description = "Ranking order"] sort: Option<EmojiOrder>,
) -> Result<(), Error> {
    let args = ScanArgs {
        top: top.unwrap_or(DEFAULT_EMOJIS_TOP),
        channel: channel.map(channel_ref),
        member: member.map(|m| m.id.get()),
        fast: fast.unwrap_or(false),
        fresh: fresh.unwrap_or(false),
        everyone: everyone.unwrap_or(false),
        all_emojis: all.unwrap_or(false),
        order: sort.unwrap_or_default(),
        ..ScanArgs::new(ScanKind::Emojis)
    };
    scan_command(ctx, args, from, to).await
}

/// Rank words by usage
#[poise::command(slash_command, guild_only)]
pub async fn words(
    ctx: Context<'_>,
    #[description = "Number of entries"]
    #[min = 1]
    #[max = 50]
    top: Option<usize>,
    #[description = "Only this channel"] channel: Option<serenity::GuildChannel>,
    #[description = "Only this member"] member: Option<serenity::User>,
    #[description = "From date (YYYY-MM-DD or 7days)"] from: Option<String>,
    #[description = "To date (YYYY-MM-DD or 7days)"] to: Option<String>,
    #[description = "Trust the archive, skip syncing"] fast: Option<bool>,
    #[description = "Fetch the history again"] fresh: Option<bool>,
    #[description = "Include bots"] everyone: Option<bool>,
) -> Result<(), Error> {
    let args = ScanArgs {
        top: top.unwrap_or(DEFAULT_TOP),
        channel: channel.map(channel_ref),
        member: member.map(|m| m.id.get()),
        fast: fast.unwrap_or(false),
        fresh: fresh.unwrap_or(false),
        everyone: everyone.unwrap_or(false),
        ..ScanArgs::new(ScanKind::Words)
    };
    scan_command(ctx, args, from, to).await
}

/// Repeat the last analysis of this channel from the archive
#[poise::command(slash_command, guild_only)]
pub async fn repeat(ctx: Context<'_>) -> Result<(), Error> {
    let Some(mut args) = ctx.data().command_cache.last(ctx.channel_id().get()) else {
        ctx.say("No command to repeat on this channel").await?;
        return Ok(());
    };
    info!("Repeating {:?} in channel {}", args.kind, ctx.channel_id());
    args.fast = true;
    args.fresh = false;
    run(ctx, args).await
}
