//! toolgate CLI library.
//!
//! Exposes the argument parser, bootstrap and handlers so that `main.rs`
//! stays a thin composition root and the pieces can be tested in isolation.

pub mod bootstrap;
pub mod commands;
pub mod emitter;
pub mod error;
pub mod handlers;
pub mod parser;
pub mod presentation;
pub mod provider_commands;
pub mod rule_commands;
pub mod utils;

pub use bootstrap::{CliConfig, CliContext, bootstrap};
pub use commands::Commands;
pub use error::CliError;
pub use parser::Cli;
pub use provider_commands::ProviderCommand;
pub use rule_commands::{RuleCommand, RuleDecision};
