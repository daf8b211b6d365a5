//! CLI entry point - the composition root.
//!
//! This is the ONLY place where infrastructure is wired together via bootstrap.
//! Command dispatch routes to handlers, which only see a `CliContext`.

use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use toolgate_cli::handlers::{call, history, paths, provider, rule, tools};
use toolgate_cli::{
    Cli, CliConfig, CliError, Commands, ProviderCommand, RuleCommand, bootstrap,
};

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let config = CliConfig::with_defaults(cli.data_dir.as_deref())?;
    let ctx = bootstrap(config).await?;

    match command {
        Commands::Provider { command } => match command {
            ProviderCommand::List => provider::list(&ctx).await,
            ProviderCommand::Add {
                name,
                command,
                args,
                env,
                cwd,
                disabled,
                include_resources,
            } => {
                provider::add(
                    &ctx,
                    provider::AddArgs {
                        name,
                        command,
                        args,
                        env,
                        cwd,
                        disabled,
                        include_resources,
                    },
                )
                .await
            }
            ProviderCommand::Remove { provider, force } => {
                provider::remove(&ctx, &provider, force).await
            }
            ProviderCommand::Enable { provider } => provider::set_enabled(&ctx, &provider, true).await,
            ProviderCommand::Disable { provider } => {
                provider::set_enabled(&ctx, &provider, false).await
            }
            ProviderCommand::Test { provider } => provider::test(&ctx, &provider).await,
        },
        Commands::Rule { command } => match command {
            RuleCommand::List => rule::list(&ctx).await,
            RuleCommand::Add {
                decision,
                tool,
                pattern,
                provider,
                priority,
            } => rule::add(
                &ctx,
                rule::AddArgs {
                    decision,
                    tool,
                    pattern,
                    provider,
                    priority,
                },
            )
            .await
            .map(|_| ()),
            RuleCommand::Remove { id, all, force } => rule::remove(&ctx, id, all, force).await,
            RuleCommand::Check { provider, tool } => {
                rule::check(&ctx, &provider, &tool).await.map(|_| ())
            }
        },
        Commands::Tools { provider } => tools::execute(&ctx, provider.as_deref()).await,
        Commands::Call {
            tool,
            args,
            session,
        } => call::execute(&ctx, &tool, &args, &session).await,
        Commands::History { session, limit } => {
            history::execute(&ctx, session.as_deref(), limit).await
        }
        Commands::Paths => paths::execute(&ctx),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            let code = e.downcast_ref::<CliError>().map_or(1, CliError::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}
