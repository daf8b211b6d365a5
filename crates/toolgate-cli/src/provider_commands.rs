use clap::Subcommand;

/// Provider management subcommands.
#[derive(Subcommand)]
pub enum ProviderCommand {
    /// List configured providers
    List,

    /// Add a provider; it is started once to verify the configuration
    ///
    /// Example: toolgate provider add --env TOKEN=abc fs npx -y @scope/fs-server
    Add {
        /// Unique display name
        name: String,

        /// Executable to launch (no arguments)
        command: String,

        /// Arguments passed to the executable
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,

        /// Environment override, repeatable
        #[arg(long = "env", value_name = "KEY=VALUE")]
        env: Vec<String>,

        /// Absolute working directory for the process
        #[arg(long)]
        cwd: Option<String>,

        /// Store the provider without enabling it
        #[arg(long)]
        disabled: bool,

        /// Expose the provider's resources alongside its tools
        #[arg(long)]
        include_resources: bool,
    },

    /// Remove a provider
    Remove {
        /// Provider name or ID
        provider: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Enable a provider
    Enable {
        /// Provider name or ID
        provider: String,
    },

    /// Disable a provider
    Disable {
        /// Provider name or ID
        provider: String,
    },

    /// Start a provider and report what it exposes
    Test {
        /// Provider name or ID
        provider: String,
    },
}
