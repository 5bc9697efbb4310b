// SPDX-License-Identifier: MIT

//! Request dispatch for one accepted connection (§6). Grounded on the
//! teacher's `oj-daemon::listener` module: accept loop spawns a task per
//! connection, each task reads one length-prefixed frame, dispatches it
//! against shared state, and writes back a response frame. Unlike the
//! teacher this protocol has no multiplexed request/response pairing
//! beyond one-shot request/response and the two open-ended subscription
//! streams, so a connection either completes after one reply or keeps
//! streaming until the job terminates or the peer disconnects.

use peft_connectors::{ConnectorManager, DesktopNotifyAdapter};
use peft_core::{CoreError, JobId, JobState, SystemClock};
use peft_engine::manager::RunFilter;
use peft_engine::Orchestrator;
use peft_wire::{HistoryFilter, ProtocolError, Request, Response};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio::net::UnixStream;

/// Concrete façade type this daemon binary wires up: real wall clock,
/// real desktop notifications, shared for both the notify and DND roles
/// since [`DesktopNotifyAdapter`] implements both traits.
pub type ProdOrchestrator = Orchestrator<SystemClock, DesktopNotifyAdapter, DesktopNotifyAdapter>;

/// Everything a connection handler needs: the façade plus the connector
/// manager it was built with, since [`ProdOrchestrator`] only exposes
/// the operations in §6's table and keeps its `ConnectorManager` private.
#[derive(Clone)]
pub struct DaemonCtx {
    pub orchestrator: Arc<ProdOrchestrator>,
    pub connectors: Arc<ConnectorManager>,
}

fn to_run_filter(filter: HistoryFilter) -> RunFilter {
    RunFilter {
        statuses: (!filter.statuses.is_empty()).then(|| filter.statuses.into_iter().collect::<HashSet<JobState>>()),
        providers: (!filter.providers.is_empty()).then(|| filter.providers.into_iter().collect::<HashSet<String>>()),
        started_from_ms: filter.started_from_ms,
        started_to_ms: filter.started_to_ms,
        model_contains: filter.model_contains,
        job_ids: (!filter.job_ids.is_empty()).then(|| filter.job_ids.into_iter().collect::<HashSet<JobId>>()),
    }
}

/// Accept loop: one task per connection, errors logged and dropped (a
/// malformed or disconnecting peer must never bring down the daemon).
pub async fn accept_loop(listener: tokio::net::UnixListener, ctx: DaemonCtx) {
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, ctx).await {
                        tracing::debug!(error = %e, "connection ended");
                    }
                });
            }
            Err(e) => tracing::error!(error = %e, "accept failed"),
        }
    }
}

async fn handle_connection(stream: UnixStream, ctx: DaemonCtx) -> Result<(), ProtocolError> {
    let (mut reader, mut writer) = stream.into_split();
    let request = peft_wire::read_request(&mut reader).await?;
    tracing::info!(request = ?request, "received request");

    match request {
        Request::SubscribeMetrics { job_id } => {
            stream_metrics(&mut writer, &ctx.orchestrator, job_id).await
        }
        Request::SubscribeNotifications { job_id } => {
            stream_notifications(&mut writer, &ctx.orchestrator, job_id).await
        }
        other => {
            let response = dispatch_request(&ctx, other).await;
            peft_wire::write_response(&mut writer, &response).await
        }
    }
}

async fn stream_metrics<W: AsyncWrite + Unpin>(writer: &mut W, orchestrator: &Arc<ProdOrchestrator>, job_id: String) -> Result<(), ProtocolError> {
    let mut rx = orchestrator.subscribe_metrics(&JobId::new(job_id.clone()));
    while let Some(update) = rx.recv().await {
        let response = Response::MetricsSample { job_id: job_id.clone(), sample: update.sample };
        peft_wire::write_response(writer, &response).await?;
    }
    peft_wire::write_response(writer, &Response::StreamEnded { job_id }).await
}

async fn stream_notifications<W: AsyncWrite + Unpin>(writer: &mut W, orchestrator: &Arc<ProdOrchestrator>, job_id: String) -> Result<(), ProtocolError> {
    let mut rx = orchestrator.subscribe_notifications(&JobId::new(job_id.clone()));
    while let Some(notification) = rx.recv().await {
        let response = Response::NotificationSent { job_id: job_id.clone(), notification };
        peft_wire::write_response(writer, &response).await?;
    }
    peft_wire::write_response(writer, &Response::StreamEnded { job_id }).await
}

/// Dispatch every request except the two subscription streams, which
/// `handle_connection` routes separately since they never produce a
/// single terminal `Response`.
async fn dispatch_request(ctx: &DaemonCtx, request: Request) -> Response {
    let result = dispatch_inner(ctx, request).await;
    match result {
        Ok(response) => response,
        Err(e) => Response::from(e),
    }
}

async fn dispatch_inner(ctx: &DaemonCtx, request: Request) -> Result<Response, CoreError> {
    let orchestrator = &ctx.orchestrator;
    match request {
        Request::CreateJob { job_id, config } => {
            let job = orchestrator.create_job(JobId::new(job_id), config)?;
            Ok(Response::Job { job })
        }
        Request::Start { job_id } => {
            orchestrator.start(&job_id).await?;
            Ok(Response::Ok)
        }
        Request::Pause { job_id } => {
            let checkpoint = orchestrator.pause(&job_id).await?;
            Ok(Response::Checkpoint { checkpoint })
        }
        Request::Resume { job_id } => {
            orchestrator.resume(&job_id).await?;
            Ok(Response::Ok)
        }
        Request::Stop { job_id } => {
            orchestrator.stop(&job_id).await;
            Ok(Response::Ok)
        }
        Request::Status { job_id } => {
            let job = orchestrator.status(&job_id)?;
            Ok(Response::Job { job })
        }
        Request::GetArtifact { job_id } => {
            let artifact = orchestrator.get_artifact(&job_id)?;
            Ok(Response::Artifact { artifact })
        }
        Request::Cleanup { job_id } => {
            orchestrator.cleanup(&job_id);
            Ok(Response::Ok)
        }
        Request::Active => {
            let jobs = orchestrator.manager().active().iter().map(peft_wire::JobSummary::from).collect();
            Ok(Response::JobSummaries { jobs })
        }
        Request::History { filter, limit, offset } => {
            let jobs = orchestrator
                .manager()
                .history(&to_run_filter(filter), limit, offset)
                .iter()
                .map(peft_wire::JobSummary::from)
                .collect();
            Ok(Response::JobSummaries { jobs })
        }
        Request::Stats => {
            let stats = orchestrator.manager().stats();
            Ok(Response::Stats {
                stats: peft_wire::RunStatsDto {
                    running: stats.running,
                    paused: stats.paused,
                    completed: stats.completed,
                    failed: stats.failed,
                    per_provider_active: stats.per_provider_active,
                },
            })
        }
        Request::ConnectorConnect { name, credentials } => {
            ctx.connectors.connect(&name, credentials).await?;
            Ok(Response::Ok)
        }
        Request::ConnectorDisconnect { name } => {
            ctx.connectors.disconnect(&name).await?;
            Ok(Response::Ok)
        }
        Request::ConnectorList => {
            let connectors = ctx.connectors.registry().list_all();
            Ok(Response::Connectors { connectors })
        }
        Request::SubscribeMetrics { .. } | Request::SubscribeNotifications { .. } => {
            unreachable!("routed separately in handle_connection")
        }
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
