use clap::{Subcommand, ValueEnum};

/// Outcome a rule assigns to the calls it matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RuleDecision {
    /// Run matching calls without asking
    Allow,
    /// Always ask before running matching calls
    Deny,
}

impl RuleDecision {
    pub const fn auto_approve(self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Permission rule subcommands.
#[derive(Subcommand)]
pub enum RuleCommand {
    /// List rules in evaluation order
    List,

    /// Add a rule; without --tool or --pattern it matches every tool
    Add {
        /// allow or deny
        decision: RuleDecision,

        /// Exact tool name
        #[arg(long, conflicts_with = "pattern")]
        tool: Option<String>,

        /// Wildcard pattern (`*` and `?`)
        #[arg(long)]
        pattern: Option<String>,

        /// Restrict the rule to one provider (name or ID)
        #[arg(long)]
        provider: Option<String>,

        /// Higher priorities are evaluated first
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        priority: i64,
    },

    /// Remove one rule, or all of them with --all
    Remove {
        /// Rule ID
        #[arg(required_unless_present = "all")]
        id: Option<i64>,

        /// Remove every rule
        #[arg(long, conflicts_with = "id")]
        all: bool,

        /// Skip the confirmation prompt for --all
        #[arg(short, long)]
        force: bool,
    },

    /// Show how a call would be decided
    Check {
        /// Provider name or ID
        provider: String,

        /// Provider-side tool name
        tool: String,
    },
}
