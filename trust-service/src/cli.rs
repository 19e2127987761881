use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the HTTP service (default).
    Serve,
    /// Print a fresh hex-encoded master key.
    GenerateKey,
    /// Re-encrypt JSON-lines sealed secrets from stdin under the active key.
    /// Requires VAULT_PREVIOUS_MASTER_KEY.
    RotateSecrets,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }
}
