use clap::{Parser, Subcommand};

use tgrelay_core::{config::parse_csv_lower, directory::ChatSelector};

#[derive(Parser, Debug)]
#[command(name = "tgrelay")]
#[command(version, about = "Relay text messages from one Telegram chat to another")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List chats the bot has seen and write the listing file
    Chats,

    /// Start forwarding from SOURCE to DESTINATION (chat id or #index)
    Forward {
        #[arg(long, short)]
        source: ChatSelector,

        #[arg(long, short)]
        destination: ChatSelector,

        /// Comma separated keywords; empty forwards everything
        #[arg(long, short, default_value = "")]
        keywords: String,
    },

    /// Resume forwarding for the last used chat pair
    Resume {
        /// Comma separated keywords; empty forwards everything
        #[arg(long, short, default_value = "")]
        keywords: String,
    },

    /// Manage text replacements applied before forwarding
    #[command(subcommand)]
    Replace(ReplaceCommand),
}

#[derive(Subcommand, Debug)]
pub enum ReplaceCommand {
    /// Add or overwrite a replacement (pattern is matched case-insensitively)
    Add {
        pattern: String,
        /// Use an empty string to drop the matched text
        replacement: String,
    },

    /// Remove a replacement
    Remove { pattern: String },

    /// List replacements in the order they are applied
    List,
}

pub fn keywords(raw: &str) -> Vec<String> {
    parse_csv_lower(Some(raw))
}
