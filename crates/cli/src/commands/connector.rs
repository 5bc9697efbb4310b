// SPDX-License-Identifier: MIT

//! `peftctl connector ...` (§4.A: connect, disconnect, list).

use crate::client::{expect_ok, reject, DaemonClient};
use crate::output::print_json;
use anyhow::{Context, Result};
use clap::Subcommand;
use peft_wire::{Request, Response};
use std::collections::HashMap;

#[derive(Subcommand)]
pub enum ConnectorCommand {
    /// Bind credentials to a registered connector and verify connectivity.
    Connect {
        name: String,
        /// `key=value` credential pairs, repeatable.
        #[arg(long = "cred", value_parser = parse_credential)]
        credentials: Vec<(String, String)>,
    },
    /// Drop a connector's cached credentials and connection.
    Disconnect { name: String },
    /// List every registered connector and its capability flags.
    List,
}

fn parse_credential(s: &str) -> Result<(String, String), String> {
    s.split_once('=').map(|(k, v)| (k.to_string(), v.to_string())).ok_or_else(|| format!("expected key=value, got '{s}'"))
}

pub async fn run(client: &DaemonClient, command: ConnectorCommand) -> Result<()> {
    match command {
        ConnectorCommand::Connect { name, credentials } => {
            let credentials: HashMap<String, String> = credentials.into_iter().collect();
            expect_ok(client.send(&Request::ConnectorConnect { name, credentials }).await?).context("connecting connector")
        }
        ConnectorCommand::Disconnect { name } => expect_ok(client.send(&Request::ConnectorDisconnect { name }).await?),
        ConnectorCommand::List => {
            let response = client.send(&Request::ConnectorList).await?;
            match response {
                Response::Connectors { connectors } => print_json(&connectors),
                other => Err(reject(other)),
            }
        }
    }
}
