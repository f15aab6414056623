//! App listing command

use colored::Colorize;
use prettytable::{format, row, Table};

use super::{print_notices, CommandContext};
use crate::catalog::DisplayPolicy;
use crate::error::Result;
use crate::models::AppDescriptor;

/// List the apps available to the signed-in user
///
/// # Arguments
///
/// * `ctx` - command context
/// * `all` - also list disabled apps
pub async fn list_apps(ctx: &CommandContext, all: bool) -> Result<()> {
    let (workspace, mut notices) = ctx.workspace()?;
    let policy = if all {
        DisplayPolicy::IncludeDisabled
    } else {
        DisplayPolicy::SelectableOnly
    };

    tracing::info!(?policy, debug = workspace.session().is_debug_mode(), "Listing apps");
    let result = workspace.resolver().resolve(policy).await;
    print_notices(&mut notices);
    let apps = result?;

    if apps.is_empty() {
        println!("{}", "No available apps".yellow());
        return Ok(());
    }

    output_apps_table(&apps);
    Ok(())
}

fn output_apps_table(apps: &[AppDescriptor]) {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(row![
        "ID".bold(),
        "Name".bold(),
        "Mode".bold(),
        "Tags".bold(),
        "Status".bold()
    ]);

    for app in apps {
        let (mode, tags) = match &app.info {
            Some(info) if !info.tags.is_empty() => (info.mode_label(), info.tags.join(", ")),
            Some(info) => (info.mode_label(), "-".to_string()),
            None => ("-", "-".to_string()),
        };
        let status = if app.is_disabled() {
            "disabled".dimmed()
        } else if app.is_enabled() {
            "enabled".green()
        } else {
            "unchecked".yellow()
        };
        table.add_row(row![app.id.cyan(), app.display_name(), mode, tags, status]);
    }

    println!("\nAvailable apps:\n");
    table.printstd();
    println!();
}
