use crate::logs::error::FetchError;
use crate::logs::message::{MessageRecord, Reactions};
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Discord refuses pages larger than this.
pub const MAX_PAGE_SIZE: usize = 100;

/// Paginated read access to a community's channels.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Up to `limit` messages strictly older than `before` (or the newest
    /// messages when `before` is `None`), newest first.
    async fn fetch_before(
        &self,
        channel_id: u64,
        before: Option<u64>,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, FetchError>;

    /// Up to `limit` messages strictly newer than `after`, oldest first.
    async fn fetch_after(
        &self,
        channel_id: u64,
        after: u64,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, FetchError>;
}

/// `MessageSource` backed by the Discord HTTP API.
pub struct SerenitySource {
    http: Arc<serenity::Http>,
}

impl SerenitySource {
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }

    async fn capture(
        &self,
        messages: Vec<serenity::Message>,
    ) -> Result<Vec<MessageRecord>, FetchError> {
        let mut records = Vec::with_capacity(messages.len());
        for message in &messages {
            let reactions = self.reactors(message).await?;
            records.push(MessageRecord::from_remote(message, reactions));
        }
        Ok(records)
    }

    async fn reactors(&self, message: &serenity::Message) -> Result<Reactions, FetchError> {
        let mut reactions = Reactions::new();
        for reaction in &message.reactions {
            let mut users = BTreeSet::new();
            let mut after: Option<serenity::UserId> = None;
            loop {
                let page = message
                    .channel_id
                    .reaction_users(
                        &*self.http,
                        message.id,
                        reaction.reaction_type.clone(),
                        Some(MAX_PAGE_SIZE as u8),
                        after,
                    )
                    .await
                    .map_err(|e| map_http_error(message.channel_id.get(), e))?;
                let full = page.len() == MAX_PAGE_SIZE;
                after = page.last().map(|u| u.id);
                users.extend(page.iter().map(|u| u.id.get()));
                if !full {
                    break;
                }
            }
            reactions.insert(reaction.reaction_type.to_string(), users);
        }
        Ok(reactions)
    }
}

#[async_trait]
impl MessageSource for SerenitySource {
    async fn fetch_before(
        &self,
        channel_id: u64,
        before: Option<u64>,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, FetchError> {
        let mut builder = serenity::GetMessages::new().limit(page_limit(limit));
        if let Some(before) = before {
            builder = builder.before(serenity::MessageId::new(before));
        }
        let mut messages = serenity::ChannelId::new(channel_id)
            .messages(&*self.http, builder)
            .await
            .map_err(|e| map_http_error(channel_id, e))?;
        messages.sort_by(|a, b| b.id.cmp(&a.id));
        debug!(
            "Fetched {} messages before {:?} in channel {}",
            messages.len(),
            before,
            channel_id
        );
        self.capture(messages).await
    }

    async fn fetch_after(
        &self,
        channel_id: u64,
        after: u64,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, FetchError> {
        let builder = serenity::GetMessages::new()
            .after(serenity::MessageId::new(after))
            .limit(page_limit(limit));
        let mut messages = serenity::ChannelId::new(channel_id)
            .messages(&*self.http, builder)
            .await
            .map_err(|e| map_http_error(channel_id, e))?;
        messages.sort_by(|a, b| a.id.cmp(&b.id));
        debug!(
            "Fetched {} messages after {} in channel {}",
            messages.len(),
            after,
            channel_id
        );
        self.capture(messages).await
    }
}

fn page_limit(limit: usize) -> u8 {
    limit.clamp(1, MAX_PAGE_SIZE) as u8
}

fn map_http_error(channel_id: u64, error: serenity::Error) -> FetchError {
    if let serenity::Error::Http(http) = &error {
        match http.status_code().map(|s| s.as_u16()) {
            Some(403) => return FetchError::Forbidden(channel_id),
            Some(404) => return FetchError::NotFound(channel_id),
            _ => {}
        }
    }
    FetchError::Remote(error.to_string())
}
