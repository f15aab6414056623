//! Command-line interface definition for DifyChat
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for signing in, browsing apps and conversations,
//! managing debug apps, and sending attachments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// DifyChat - multi-app chat client for Dify backends
///
/// Resolves the apps a user may talk to, manages their conversations and
/// imports private debug apps.
#[derive(Parser, Debug, Clone)]
#[command(name = "difychat")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Enter debug mode for this session
    #[arg(long)]
    pub debug: bool,

    /// Override the local store location
    #[arg(long, env = "DIFYCHAT_STORE_PATH")]
    pub storage_path: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for DifyChat
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Sign in with an email and passphrase
    Login {
        /// Email address
        #[arg(short, long)]
        email: String,

        /// Passphrase
        #[arg(short, long)]
        password: String,
    },

    /// Sign out and clear the session
    Logout,

    /// Show the login and debug-mode status
    Status,

    /// List the apps available to the signed-in user
    Apps {
        /// Include disabled apps
        #[arg(short, long)]
        all: bool,
    },

    /// Manage the conversations of an app
    Conversations {
        /// Conversation subcommand
        #[command(subcommand)]
        command: ConversationCommand,
    },

    /// Manage debug-mode apps
    Debug {
        /// Debug subcommand
        #[command(subcommand)]
        command: DebugCommand,
    },

    /// Upload a file to an app
    Upload {
        /// App id
        #[arg(short, long)]
        app: String,

        /// File to upload
        file: PathBuf,
    },

    /// Transcribe an audio file with an app's speech-to-text
    Transcribe {
        /// App id
        #[arg(short, long)]
        app: String,

        /// Audio file
        file: PathBuf,
    },

    /// Show the links offered to internal groups
    Links,
}

/// Conversation subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConversationCommand {
    /// List conversations
    List {
        /// App id; the first available app when omitted
        #[arg(short, long)]
        app: Option<String>,
    },

    /// Rename a conversation
    Rename {
        /// App id
        #[arg(short, long)]
        app: String,

        /// Conversation id
        #[arg(short, long)]
        id: String,

        /// New name
        #[arg(short, long)]
        name: String,
    },

    /// Delete a conversation
    Delete {
        /// App id
        #[arg(short, long)]
        app: String,

        /// Conversation id
        #[arg(short, long)]
        id: String,
    },
}

/// Debug-app subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum DebugCommand {
    /// Print the imported debug apps
    Show,

    /// Import debug apps from a JSON file
    Save {
        /// JSON array of app descriptors; an empty file clears the apps
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Remove the imported apps and leave debug mode
    Exit,

    /// Print an example import payload
    Template,
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
