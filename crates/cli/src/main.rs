//! Lorekeeper CLI — the main entry point.
//!
//! Commands:
//! - `init`      — Write a default config
//! - `append`    — Record a turn and advance the tiers
//! - `status`    — Show engine statistics
//! - `show`      — Print the compacted context
//! - `segments`, `small-summaries`, `mode` — Tune the tiers
//! - `regenerate`, `clear`, `refresh` — Maintenance
//! - `enable`, `disable` — Open or close the world book sync gate

use clap::{Parser, Subcommand};
use lorekeeper_core::context::ContextMode;
use lorekeeper_core::record::Role;

mod commands;

#[derive(Parser)]
#[command(
    name = "lorekeeper",
    about = "Lorekeeper — tiered context compaction for long story sessions",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config to ~/.lorekeeper
    Init,

    /// Record a turn
    Append {
        /// Who produced the turn (user, assistant, system)
        #[arg(short, long, default_value = "user")]
        role: Role,

        /// Raw turn text
        text: String,
    },

    /// Show engine statistics
    Status,

    /// Print the compacted context
    Show {
        /// Print the stored world book entries instead
        #[arg(long)]
        entries: bool,
    },

    /// Set how many recent records stay verbatim
    Segments {
        #[arg(allow_negative_numbers = true)]
        count: i64,
    },

    /// Set how many records the small summary tier covers
    SmallSummaries {
        #[arg(allow_negative_numbers = true)]
        count: i64,
    },

    /// Switch between segmented and full context
    Mode { mode: ContextMode },

    /// Rebuild every tier from history and rewrite the world book
    Regenerate,

    /// Wipe history and tiers
    Clear {
        /// Delete world book tier entries even while sync is disabled
        #[arg(long)]
        force: bool,
    },

    /// Start mirroring tiers into the world book
    Enable,

    /// Stop mirroring tiers into the world book
    Disable,

    /// Re-read the world book and resync local state
    Refresh,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Init => commands::init::run().await?,
        Commands::Append { role, text } => commands::append::run(role, text).await?,
        Commands::Status => commands::status::run().await?,
        Commands::Show { entries } => commands::status::show(entries).await?,
        Commands::Segments { count } => commands::tune::segments(count).await?,
        Commands::SmallSummaries { count } => commands::tune::small_summaries(count).await?,
        Commands::Mode { mode } => commands::tune::mode(mode).await?,
        Commands::Regenerate => commands::maintain::regenerate().await?,
        Commands::Clear { force } => commands::maintain::clear(force).await?,
        Commands::Enable => commands::tune::enabled(true).await?,
        Commands::Disable => commands::tune::enabled(false).await?,
        Commands::Refresh => commands::maintain::refresh().await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_parses_role() {
        let cli = Cli::try_parse_from(["lorekeeper", "append", "--role", "ai", "The gate opens."]).unwrap();
        match cli.command {
            Commands::Append { role, text } => {
                assert_eq!(role, Role::Assistant);
                assert_eq!(text, "The gate opens.");
            }
            _ => panic!("expected append"),
        }
    }

    #[test]
    fn negative_counts_reach_validation() {
        let cli = Cli::try_parse_from(["lorekeeper", "segments", "-1"]).unwrap();
        assert!(matches!(cli.command, Commands::Segments { count: -1 }));
    }

    #[test]
    fn mode_parses() {
        let cli = Cli::try_parse_from(["lorekeeper", "mode", "full"]).unwrap();
        assert!(matches!(cli.command, Commands::Mode { mode: ContextMode::Full }));
        assert!(Cli::try_parse_from(["lorekeeper", "mode", "sideways"]).is_err());
    }

    #[test]
    fn clear_force_flag() {
        let cli = Cli::try_parse_from(["lorekeeper", "clear", "--force", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Clear { force: true }));
    }
}
