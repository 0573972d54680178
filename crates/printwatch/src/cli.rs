//! CLI argument definitions.

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    name = "printwatch",
    version,
    about = "Relay 3D-printer telemetry from a home-automation hub to mobile clients",
    propagate_version = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Output format.
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,

    /// Operate on one configured hub (default: all for `run`,
    /// required when several are configured otherwise).
    #[arg(long, global = true)]
    pub hub: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Yaml,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the relay daemon until interrupted.
    Run,

    /// Show current printer state from a hub snapshot.
    Status(StatusArgs),

    /// Query the print-history log.
    History(HistoryArgs),

    /// Manage registered push recipients.
    #[command(subcommand)]
    Recipients(RecipientsCommand),

    /// Inspect or edit configuration.
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Show one printer prefix only.
    pub prefix: Option<String>,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// Filter by printer prefix.
    pub prefix: Option<String>,

    /// Maximum records to show.
    #[arg(short = 'n', long, default_value_t = 20)]
    pub limit: usize,
}

#[derive(Debug, Subcommand)]
pub enum RecipientsCommand {
    /// List registered recipients.
    List,

    /// Register a recipient for a printer prefix.
    Add(AddRecipientArgs),

    /// Remove all recipients for a printer prefix.
    Remove(RemoveRecipientArgs),
}

#[derive(Debug, Args)]
pub struct AddRecipientArgs {
    /// Printer prefix to watch.
    #[arg(long)]
    pub prefix: String,

    /// Device push token.
    #[arg(long)]
    pub push_token: String,

    /// Disable the print-started notification.
    #[arg(long)]
    pub no_start: bool,

    /// Disable the print-complete notification.
    #[arg(long)]
    pub no_complete: bool,

    /// Disable the print-failed notification.
    #[arg(long)]
    pub no_failed: bool,

    /// Disable the print-paused notification.
    #[arg(long)]
    pub no_paused: bool,

    /// Disable progress milestone notifications.
    #[arg(long)]
    pub no_milestone: bool,
}

#[derive(Debug, Args)]
pub struct RemoveRecipientArgs {
    /// Printer prefix to unregister.
    pub prefix: String,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration (tokens redacted).
    Show,

    /// Print the config file path.
    Path,

    /// Store a hub access token in the system keyring.
    SetToken(SetTokenArgs),
}

#[derive(Debug, Args)]
pub struct SetTokenArgs {
    /// Hub profile name.
    pub hub: String,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for.
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
