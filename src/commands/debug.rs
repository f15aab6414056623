//! Debug-app commands

use colored::Colorize;

use super::CommandContext;
use crate::cli::DebugCommand;
use crate::error::{DifyChatError, Result};
use crate::overrides::{LocalOverrideStore, SaveOutcome};

/// Handle debug commands
pub async fn handle_debug(ctx: &CommandContext, command: DebugCommand) -> Result<()> {
    if let DebugCommand::Template = command {
        println!("{}", LocalOverrideStore::example_template());
        return Ok(());
    }

    let (workspace, _notices) = ctx.workspace()?;
    let overrides = workspace.overrides();

    match command {
        DebugCommand::Show => {
            if !overrides.is_debug_mode() {
                println!(
                    "{}",
                    "Debug mode is off; start with --debug to enter it.".yellow()
                );
            }
            let apps = overrides.stored_debug_apps()?;
            if apps.is_empty() {
                println!("{}", "No debug apps imported.".yellow());
            } else {
                println!("{}", serde_json::to_string_pretty(&apps)?);
            }
        }
        DebugCommand::Save { file } => {
            if !workspace.session().debug_editor_visible() {
                return Err(DifyChatError::Validation(
                    "Debug apps can only be edited in a session started with --debug".into(),
                )
                .into());
            }
            let text = std::fs::read_to_string(&file)?;
            match overrides.save_debug_apps(&text).await? {
                SaveOutcome::Cleared => println!("{}", "Debug apps cleared".green()),
                SaveOutcome::Saved(apps) => {
                    println!("{}", format!("Saved {} debug app(s)", apps.len()).green());
                    for app in apps {
                        println!("  {} {}", app.id.cyan(), app.display_name());
                    }
                }
            }
        }
        DebugCommand::Exit => {
            if overrides.exit_debug_mode()? {
                println!("{}", "Debug apps cleared; debug mode is pinned on".yellow());
            } else {
                println!("{}", "Left debug mode".green());
            }
        }
        DebugCommand::Template => {}
    }

    Ok(())
}
