pub mod command_cache;
pub mod commands;
pub mod config;
pub mod logs;
pub mod scanner;
pub mod sweeper;

use std::sync::Arc;

/// Custom data passed to all commands
pub struct Data {
    pub config: config::Config,
    pub store: Arc<logs::ArchiveStore>,
    pub command_cache: command_cache::CommandCache,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
