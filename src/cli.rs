//! Control surface (§6): three operation modes on top of the shared config
//! overrides in [`crate::config::ConfigArgs`].

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "docflow", about = "Document filing pipeline")]
pub struct Cli {
    #[command(flatten)]
    pub config: crate::config::ConfigArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Continuous loop (default if no subcommand is given).
    Run,
    /// Drain the current queue once and exit.
    RunOnce,
    /// Reprocess a single document id, ignoring its current status gate.
    ProcessOne {
        #[arg(value_name = "DOCUMENT_ID")]
        document_id: i64,
    },
}

impl Command {
    pub fn into_mode(self) -> crate::orchestrator::Mode {
        match self {
            Command::Run => crate::orchestrator::Mode::Run,
            Command::RunOnce => crate::orchestrator::Mode::RunOnce,
            Command::ProcessOne { document_id } => crate::orchestrator::Mode::ProcessOne(document_id),
        }
    }
}
