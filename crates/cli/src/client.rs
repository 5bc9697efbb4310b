// SPDX-License-Identifier: MIT

//! Thin client over the `peftd` Unix domain socket (§6). One connection
//! per request; the two subscription requests keep reading frames off
//! the same connection until a `StreamEnded` sentinel or disconnect.

use anyhow::{bail, Context, Result};
use peft_wire::{Request, Response};
use std::path::{Path, PathBuf};
use tokio::net::UnixStream;

pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self { socket_path: socket_path.into() }
    }

    async fn connect(&self) -> Result<UnixStream> {
        UnixStream::connect(&self.socket_path)
            .await
            .with_context(|| format!("could not connect to peftd at {}; is the daemon running?", self.socket_path.display()))
    }

    /// Send one request and read back exactly one response frame.
    pub async fn send(&self, request: &Request) -> Result<Response> {
        let mut stream = self.connect().await?;
        let bytes = peft_wire::encode(request)?;
        peft_wire::write_message(&mut stream, &bytes).await?;
        let reply = peft_wire::read_message(&mut stream).await?;
        Ok(peft_wire::decode(&reply)?)
    }

    /// Send a subscription request and invoke `on_frame` for every
    /// response until the daemon sends `StreamEnded` or the connection
    /// closes.
    pub async fn subscribe(&self, request: &Request, mut on_frame: impl FnMut(Response) -> Result<()>) -> Result<()> {
        let mut stream = self.connect().await?;
        let bytes = peft_wire::encode(request)?;
        peft_wire::write_message(&mut stream, &bytes).await?;
        loop {
            let reply = match peft_wire::read_message(&mut stream).await {
                Ok(reply) => reply,
                Err(_) => return Ok(()),
            };
            let response: Response = peft_wire::decode(&reply)?;
            let is_end = matches!(response, Response::StreamEnded { .. });
            on_frame(response)?;
            if is_end {
                return Ok(());
            }
        }
    }
}

/// Translate an `Error` response into a process-ending `anyhow::Error`
/// with the daemon's suggested actions folded into the message.
pub fn reject(response: Response) -> anyhow::Error {
    match response {
        Response::Error { kind, message, suggested_actions, help_link } => {
            let mut text = format!("{kind}: {message}");
            for action in suggested_actions {
                text.push_str(&format!("\n  - {}", action.description));
            }
            if let Some(link) = help_link {
                text.push_str(&format!("\n  see: {link}"));
            }
            anyhow::anyhow!(text)
        }
        other => anyhow::anyhow!("unexpected response from daemon: {other:?}"),
    }
}

pub fn expect_ok(response: Response) -> Result<()> {
    match response {
        Response::Ok => Ok(()),
        other => bail!(reject(other)),
    }
}

pub fn default_socket_path() -> PathBuf {
    socket_path_for(&state_dir())
}

fn state_dir() -> PathBuf {
    dirs::data_local_dir().unwrap_or_else(std::env::temp_dir).join("peft")
}

fn socket_path_for(base: &Path) -> PathBuf {
    std::env::var("PEFT_SOCKET_PATH").map(PathBuf::from).unwrap_or_else(|_| base.join("peftd.sock"))
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
