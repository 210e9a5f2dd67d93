use crate::{Context, Error};
use tracing::info;

fn terms(retention: std::time::Duration) -> String {
    format!(
        "__**About message archiving**__\n\
**Data collection**: when an analysis is requested, the history of the visible text channels \
is stored: channel names, and for each message its dates, author, content, mentions and reactions. \
Attachments and embeds themselves are not stored.\n\
**Processing**: the archive is only used to compute the reports you request.\n\
**Retention**: archives are deleted after {} without use, when the bot leaves the server, \
or on request with `/archive revoke`.\n\
**Sharing**: nothing is shared with any third party.\n\
Run `/archive agree` to enable analysis on this server.",
        retention_days(retention)
    )
}

fn retention_days(retention: std::time::Duration) -> String {
    match retention.as_secs() / 86_400 {
        0 => humantime::format_duration(retention).to_string(),
        1 => "1 day".to_string(),
        days => format!("{} days", days),
    }
}

/// Message archiving of this server
#[poise::command(slash_command, guild_only, subcommands("info", "agree", "revoke"))]
pub async fn archive(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// What is stored and for how long
#[poise::command(slash_command)]
pub async fn info(ctx: Context<'_>) -> Result<(), Error> {
    ctx.say(terms(ctx.data().config.archive_retention)).await?;
    Ok(())
}

/// Agree to message archiving on this server
#[poise::command(slash_command, required_permissions = "MANAGE_GUILD")]
pub async fn agree(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let created = ctx.data().store.init(guild_id.get()).await?;
    info!(
        "Archive agreement in guild {} by {} (new: {})",
        guild_id,
        ctx.author().name,
        created
    );
    ctx.say("✅ Thanks for agreeing to these terms, you can now run analyses on this server.")
        .await?;
    Ok(())
}

/// Delete this server's archive
#[poise::command(slash_command, required_permissions = "MANAGE_GUILD")]
pub async fn revoke(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let removed = ctx.data().store.remove(guild_id.get()).await?;
    info!("Archive of guild {} revoked (existed: {})", guild_id, removed);
    ctx.say("🗑️ This server's data has been deleted. Agree to the terms again to run new analyses.")
        .await?;
    Ok(())
}

/// Cancel the analysis running on this server
#[poise::command(slash_command, guild_only)]
pub async fn cancel(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    if ctx.data().store.cancel(guild_id.get()) {
        info!("Sync of guild {} cancelled by {}", guild_id, ctx.author().name);
        ctx.say("Cancelling the running analysis...").await?;
    } else {
        ctx.say("No analysis is running on this server.").await?;
    }
    Ok(())
}
