use chrono::{DateTime, TimeZone, Utc};
use poise::serenity_prelude as serenity;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

/// Milliseconds between the unix epoch and the first Discord snowflake.
const DISCORD_EPOCH_MS: i64 = 1_420_070_400_000;

const IMAGE_EXTENSIONS: [&str; 7] = ["gif", "gifv", "png", "jpg", "jpeg", "bmp", "webp"];
const IMAGE_EMBED_KINDS: [&str; 2] = ["image", "gifv"];

/// Reaction key (emoji as rendered by Discord) to the users who reacted.
pub type Reactions = BTreeMap<String, BTreeSet<u64>>;

/// Immutable snapshot of one Discord message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: u64,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub author_id: u64,
    pub is_bot: bool,
    pub pinned: bool,
    pub tts: bool,
    pub mention_everyone: bool,
    pub content: String,
    pub user_mentions: Vec<u64>,
    pub role_mentions: Vec<u64>,
    pub channel_mentions: Vec<u64>,
    pub reply_target_id: Option<u64>,
    pub has_attachment: bool,
    pub has_embed: bool,
    pub has_image: bool,
    #[serde(default)]
    pub reactions: Reactions,
}

impl MessageRecord {
    /// Captures a message freshly fetched from Discord. Reactor ids are
    /// collected separately since the gateway payload only carries counts.
    pub fn from_remote(message: &serenity::Message, reactions: Reactions) -> Self {
        let id = message.id.get();
        let created_at = unix_to_utc(message.timestamp.unix_timestamp())
            .unwrap_or_else(|| snowflake_time(id));
        let edited_at = message
            .edited_timestamp
            .as_ref()
            .and_then(|ts| unix_to_utc(ts.unix_timestamp()));

        let mut user_mentions = raw_user_mentions(&message.content);
        if let Some(replied) = &message.referenced_message {
            user_mentions.push(replied.author.id.get());
        }

        let has_image = message
            .attachments
            .iter()
            .any(|a| is_image_file(&a.filename))
            || message
                .embeds
                .iter()
                .any(|e| e.kind.as_deref().is_some_and(is_image_embed));

        Self {
            id,
            created_at,
            edited_at,
            author_id: message.author.id.get(),
            is_bot: message.author.bot || message.author.system,
            pinned: message.pinned,
            tts: message.tts,
            mention_everyone: message.mention_everyone,
            content: message.content.clone(),
            user_mentions,
            role_mentions: raw_role_mentions(&message.content),
            channel_mentions: raw_channel_mentions(&message.content),
            reply_target_id: message
                .message_reference
                .as_ref()
                .and_then(|r| r.message_id)
                .map(|id| id.get()),
            has_attachment: !message.attachments.is_empty(),
            has_embed: !message.embeds.is_empty(),
            has_image,
            reactions,
        }
    }

    /// Total number of reactions on this message across all keys.
    pub fn reaction_count(&self) -> usize {
        self.reactions.values().map(BTreeSet::len).sum()
    }
}

/// Creation time encoded in a snowflake id.
pub fn snowflake_time(id: u64) -> DateTime<Utc> {
    let ms = DISCORD_EPOCH_MS + (id >> 22) as i64;
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

/// Smallest snowflake id that can have been created at `date`.
pub fn snowflake_at(date: DateTime<Utc>) -> u64 {
    let ms = (date.timestamp_millis() - DISCORD_EPOCH_MS).max(0) as u64;
    ms << 22
}

fn unix_to_utc(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

fn is_image_file(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_image_embed(kind: &str) -> bool {
    IMAGE_EMBED_KINDS.contains(&kind)
}

fn capture_ids(regex: &Regex, content: &str) -> Vec<u64> {
    regex
        .captures_iter(content)
        .filter_map(|c| c.get(1)?.as_str().parse().ok())
        .collect()
}

fn raw_user_mentions(content: &str) -> Vec<u64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"<@!?(\d+)>").expect("valid user mention regex"));
    capture_ids(re, content)
}

fn raw_role_mentions(content: &str) -> Vec<u64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"<@&(\d+)>").expect("valid role mention regex"));
    capture_ids(re, content)
}

fn raw_channel_mentions(content: &str) -> Vec<u64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"<#(\d+)>").expect("valid channel mention regex"));
    capture_ids(re, content)
}
