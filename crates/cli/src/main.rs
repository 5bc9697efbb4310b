// SPDX-License-Identifier: MIT

//! `peftctl`: the command-line client for `peftd` (§6). Every subcommand
//! opens one connection to the daemon's Unix socket, sends a single
//! framed request, and prints the response — mirroring the teacher's
//! `oj` CLI's `DaemonClient` pattern, minus the attach/session machinery
//! that belongs to a much broader tool.

mod client;
mod commands;
mod output;

use client::DaemonClient;
use clap::{Parser, Subcommand};
use commands::{connector::ConnectorCommand, job::JobCommand, run::RunCommand};
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "peftctl", version, about = "Control-plane client for peftd")]
struct Cli {
    /// Path to the daemon's Unix domain socket. Defaults to
    /// `$PEFT_SOCKET_PATH` or the platform state dir.
    #[arg(long, global = true)]
    socket: Option<std::path::PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: TopCommand,
}

#[derive(Subcommand)]
enum TopCommand {
    /// Job lifecycle operations (§6 `create_job`..`cleanup`).
    #[command(subcommand)]
    Job(JobCommand),
    /// Connector credential management (§4.A).
    #[command(subcommand)]
    Connector(ConnectorCommand),
    /// Multi-run queries (§4.H).
    #[command(subcommand)]
    Run(RunCommand),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let socket_path = cli.socket.unwrap_or_else(client::default_socket_path);
    let client = DaemonClient::new(socket_path);

    let result = match cli.command {
        TopCommand::Job(command) => commands::job::run(&client, command).await,
        TopCommand::Connector(command) => commands::connector::run(&client, command).await,
        TopCommand::Run(command) => commands::run::run(&client, command, cli.format).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
