use clap::Subcommand;

use crate::provider_commands::ProviderCommand;
use crate::rule_commands::RuleCommand;

/// Top-level commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Manage tool provider configurations
    Provider {
        #[command(subcommand)]
        command: ProviderCommand,
    },

    /// Manage auto-approve permission rules
    Rule {
        #[command(subcommand)]
        command: RuleCommand,
    },

    /// Start the enabled providers and list the aggregated tool catalog
    Tools {
        /// Only show tools of this provider (name or ID)
        #[arg(long)]
        provider: Option<String>,
    },

    /// Call a tool through the permission and approval gate
    Call {
        /// Catalog name of the tool
        tool: String,

        /// Tool arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,

        /// Session the call is attributed to
        #[arg(long, default_value = "cli")]
        session: String,
    },

    /// Show recent tool invocations
    History {
        /// Only show invocations of this session
        #[arg(long)]
        session: Option<String>,

        /// Maximum number of entries
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },

    /// Show where toolgate keeps its data
    Paths,
}
