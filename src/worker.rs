use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::{ServiceResult, UpstreamError};
use crate::identity::CallerIdentity;
use crate::model::{Language, SnippetStatus, StatusEvent};
use crate::queue::{FORMAT_QUEUE, ListStore, SCA_QUEUE, SCA_UNIQUE_QUEUE};
use crate::rules::RuleSet;
use crate::service::SnippetService;
use crate::status::StatusReporter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Format,
    Sca,
    /// Analysis with the owner's stored rules.
    ScaUnique,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [Self::Format, Self::Sca, Self::ScaUnique];

    pub fn default_queue(self) -> &'static str {
        match self {
            Self::Format => FORMAT_QUEUE,
            Self::Sca => SCA_QUEUE,
            Self::ScaUnique => SCA_UNIQUE_QUEUE,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct QueueEnvelope<J> {
    pub job: J,
    pub caller_identity: CallerIdentity,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RulesJob {
    pub snippet_id: u64,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub rules: RuleSet,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SnippetRef {
    pub snippet_id: u64,
    #[serde(default)]
    pub language: Language,
}

/// Shared handles every consumer needs.
#[derive(Clone)]
pub struct ConsumerContext {
    pub service: Arc<SnippetService>,
    pub store: Arc<dyn ListStore>,
    pub reporter: Arc<dyn StatusReporter>,
}

#[derive(Debug)]
pub enum PollOutcome {
    Empty,
    /// The message could not be decoded and is lost.
    Dropped,
    /// The job ran; persistence and reporting continue on this task.
    Dispatched(JoinHandle<()>),
}

fn decode<J: DeserializeOwned>(key: &str, payload: &str) -> Option<QueueEnvelope<J>> {
    match serde_json::from_str(payload) {
        Ok(envelope) => Some(envelope),
        Err(e) => {
            log::error!("Dropping malformed message from {key}: {e}");
            None
        }
    }
}

/// Pops at most one message from `key` and processes it.
///
/// Processing is at-most-once: whatever happens after the pop, the message is
/// never put back.
pub async fn poll_once(
    kind: JobKind,
    key: &str,
    ctx: &ConsumerContext,
) -> Result<PollOutcome, UpstreamError> {
    // 1. Non-blocking pop
    let Some(payload) = ctx.store.pop(key).await? else {
        return Ok(PollOutcome::Empty);
    };

    // 2. Decode and run the job up to its result
    let handle = match kind {
        JobKind::Format => {
            let Some(envelope) = decode::<RulesJob>(key, &payload) else {
                return Ok(PollOutcome::Dropped);
            };
            let QueueEnvelope { job, caller_identity } = envelope;
            log::info!("Got format job for snippet {} from {key}", job.snippet_id);

            let result = ctx
                .service
                .format_with_rules(job.snippet_id, job.language, &job.rules)
                .await;

            // 3. Persist and report off the polling task
            tokio::spawn(finish_format(ctx.clone(), job.snippet_id, caller_identity, result))
        }
        JobKind::Sca => {
            let Some(envelope) = decode::<RulesJob>(key, &payload) else {
                return Ok(PollOutcome::Dropped);
            };
            let QueueEnvelope { job, caller_identity } = envelope;
            log::info!("Got sca job for snippet {} from {key}", job.snippet_id);

            let result = ctx
                .service
                .analyze_with_rules(job.snippet_id, job.language, &job.rules)
                .await;
            tokio::spawn(finish_analysis(ctx.clone(), job.snippet_id, caller_identity, result))
        }
        JobKind::ScaUnique => {
            let Some(envelope) = decode::<SnippetRef>(key, &payload) else {
                return Ok(PollOutcome::Dropped);
            };
            let QueueEnvelope { job, caller_identity } = envelope;
            log::info!("Got sca job with stored rules for snippet {} from {key}", job.snippet_id);

            let result = ctx
                .service
                .analyze(job.snippet_id, job.language, &caller_identity)
                .await;
            tokio::spawn(finish_analysis(ctx.clone(), job.snippet_id, caller_identity, result))
        }
    };

    Ok(PollOutcome::Dispatched(handle))
}

async fn finish_format(
    ctx: ConsumerContext,
    snippet_id: u64,
    caller: CallerIdentity,
    result: ServiceResult<String>,
) {
    let status = match result {
        Ok(formatted) => match ctx.service.save(snippet_id, &formatted).await {
            Ok(()) => SnippetStatus::Compliant,
            Err(e) => {
                log::error!("Failed to save formatted snippet {snippet_id}: {e}");
                SnippetStatus::NotCompliant
            }
        },
        Err(_) => SnippetStatus::NotCompliant,
    };

    ctx.reporter
        .report(StatusEvent::new(snippet_id, status, caller.email_or_default()))
        .await;
}

async fn finish_analysis(
    ctx: ConsumerContext,
    snippet_id: u64,
    caller: CallerIdentity,
    result: ServiceResult<String>,
) {
    let status = match result {
        Ok(report) => {
            if !report.trim().is_empty() {
                log::info!("Analysis of snippet {snippet_id} reported: {report}");
            }
            SnippetStatus::Compliant
        }
        Err(_) => SnippetStatus::NotCompliant,
    };

    ctx.reporter
        .report(StatusEvent::new(snippet_id, status, caller.email_or_default()))
        .await;
}

/// Polls `key` every `poll_interval` until `token` is cancelled.
pub async fn consumer(
    kind: JobKind,
    key: String,
    poll_interval: Duration,
    ctx: ConsumerContext,
    token: CancellationToken,
) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut in_flight: Vec<JoinHandle<()>> = Vec::new();
    log::info!("Consumer for {key} started, polling every {}ms", poll_interval.as_millis());

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                log::info!("Consumer for {key} received shutdown signal, stopping");
                break;
            }

            _ = ticker.tick() => {
                match poll_once(kind, &key, &ctx).await {
                    Ok(PollOutcome::Dispatched(handle)) => in_flight.push(handle),
                    Ok(PollOutcome::Empty | PollOutcome::Dropped) => {}
                    Err(e) => log::error!("Failed to poll {key}: {e}"),
                }
                in_flight.retain(|handle| !handle.is_finished());
            }
        }
    }

    // Let started jobs finish reporting
    for handle in in_flight {
        if let Err(e) = handle.await {
            log::error!("Job task of {key} finished with error: {e:?}");
        }
    }

    log::info!("Consumer for {key} has shut down gracefully");
    Ok(())
}
