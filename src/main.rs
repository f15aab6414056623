//! DifyChat - multi-app chat client
//!
#![doc = "DifyChat - multi-app chat client"]
#![doc = "Main entry point for the DifyChat command-line client."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use difychat::cli::{Cli, Commands};
use difychat::commands::{self, CommandContext};
use difychat::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    init_tracing(cli.verbose);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    let ctx = CommandContext::open(config, cli.debug)?;

    match cli.command {
        Commands::Login { email, password } => {
            tracing::info!("Starting login");
            commands::auth::login(&ctx, &email, &password).await
        }
        Commands::Logout => commands::auth::logout(&ctx),
        Commands::Status => commands::auth::status(&ctx),
        Commands::Apps { all } => {
            tracing::info!("Starting app listing");
            commands::apps::list_apps(&ctx, all).await
        }
        Commands::Conversations { command } => {
            commands::conversations::handle_conversations(&ctx, command).await
        }
        Commands::Debug { command } => commands::debug::handle_debug(&ctx, command).await,
        Commands::Upload { app, file } => {
            tracing::debug!("Uploading {} to {}", file.display(), app);
            commands::media::upload(&ctx, &app, &file).await
        }
        Commands::Transcribe { app, file } => {
            tracing::debug!("Transcribing {} with {}", file.display(), app);
            commands::media::transcribe(&ctx, &app, &file).await
        }
        Commands::Links => commands::auth::links(&ctx).await,
    }
}

/// Initialize tracing subscriber with environment filter
fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        "difychat=debug"
    } else {
        "difychat=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
