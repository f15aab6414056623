//! Login, logout, status and link commands

use colored::Colorize;
use prettytable::{format, row, Table};

use super::{today, CommandContext};
use crate::auth::SessionStatus;
use crate::error::Result;
use crate::session::SessionConfig;

/// Sign in and record the identity keys
pub async fn login(ctx: &CommandContext, email: &str, password: &str) -> Result<()> {
    let group = ctx.auth_service()?.login(email, password, today()).await?;
    println!(
        "{}",
        format!("Logged in as {} ({})", email.trim(), group).green()
    );
    Ok(())
}

/// Sign out
pub fn logout(ctx: &CommandContext) -> Result<()> {
    ctx.require_session()?;
    ctx.auth_service()?.logout()?;
    println!("{}", "Logged out".green());
    Ok(())
}

/// Show the login and debug-mode status
pub fn status(ctx: &CommandContext) -> Result<()> {
    match ctx.auth_service()?.check(today())? {
        SessionStatus::Missing => println!("{}", "Not logged in".yellow()),
        SessionStatus::Expired => println!("{}", "Session expired, please log in again".yellow()),
        SessionStatus::Valid { user_id, group } => {
            println!("Logged in as {} ({})", user_id.cyan(), group);
        }
    }

    let session = SessionConfig::init(
        ctx.config.debug.always,
        ctx.debug_signal,
        ctx.stores.session.clone(),
    )?;
    let mode = if session.is_always_debug() {
        "always on".to_string()
    } else if session.is_debug_mode() {
        "on".to_string()
    } else {
        "off".to_string()
    };
    println!("Debug mode: {}", mode);
    Ok(())
}

/// Print the links offered to the user's group
pub async fn links(ctx: &CommandContext) -> Result<()> {
    let (_, group) = ctx.require_session()?;
    let links = ctx.auth_service()?.external_links(&group).await?;

    if links.is_empty() {
        println!("{}", "No links available.".yellow());
        return Ok(());
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(row!["Name".bold(), "URL".bold()]);
    for link in links {
        table.add_row(row![link.name, link.url.cyan()]);
    }
    table.printstd();
    Ok(())
}
