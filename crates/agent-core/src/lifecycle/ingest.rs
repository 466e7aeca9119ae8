use std::time::Duration;

use anyhow::{Context, Result};
use message_queue::MessageId;
use pipeline::{EscalationPipeline, ProcessingOutcome, Submission};
use protocol::Message;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::IngestConfig;

/// Counts for one pass over the input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub lines: u64,
    pub malformed: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub threats: u64,
    pub clean: u64,
    pub failed: u64,
    /// Verdicts still pending when the drain timeout ran out.
    pub unresolved: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VerdictKind {
    Threat,
    Clean,
    Failed,
    Lost,
}

#[derive(Debug, PartialEq, Eq)]
pub(super) enum LineRead {
    Eof,
    Line,
    /// Longer than the limit; the rest of the line was discarded unread.
    Oversized(usize),
}

/// Buffers at most `max + 1` bytes of a line. Anything past that is skipped
/// up to and including the next newline.
pub(super) async fn read_bounded_line<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max: usize,
) -> std::io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    let limit = u64::try_from(max).unwrap_or(u64::MAX).saturating_add(1);
    let read = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
    if read == 0 {
        return Ok(LineRead::Eof);
    }
    if buf.len() > max && buf.last() != Some(&b'\n') {
        let skipped = skip_past_newline(reader).await?;
        return Ok(LineRead::Oversized(read + skipped));
    }
    Ok(LineRead::Line)
}

async fn skip_past_newline<R>(reader: &mut R) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut skipped = 0;
    loop {
        let (consumed, done) = {
            let chunk = reader.fill_buf().await?;
            if chunk.is_empty() {
                return Ok(skipped);
            }
            match chunk.iter().position(|byte| *byte == b'\n') {
                Some(pos) => (pos + 1, true),
                None => (chunk.len(), false),
            }
        };
        reader.consume(consumed);
        skipped += consumed;
        if done {
            return Ok(skipped);
        }
    }
}

/// Submits every newline-delimited JSON message from `reader`, then waits up
/// to `drain_timeout_ms` for the verdicts of accepted ones.
pub async fn ingest_lines<R>(
    pipeline: &EscalationPipeline,
    mut reader: R,
    limits: &IngestConfig,
) -> Result<IngestSummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut summary = IngestSummary::default();
    let mut verdicts: JoinSet<VerdictKind> = JoinSet::new();
    let mut buf = Vec::new();
    let mut line_no = 0u64;

    loop {
        buf.clear();
        let read = read_bounded_line(&mut reader, &mut buf, limits.max_line_bytes)
            .await
            .context("failed reading ingest input")?;
        let oversized = match read {
            LineRead::Eof => break,
            LineRead::Line => None,
            LineRead::Oversized(bytes) => Some(bytes),
        };
        line_no += 1;

        let line = trim_line(&buf);
        if line.is_empty() && oversized.is_none() {
            continue;
        }
        summary.lines += 1;

        let too_long =
            oversized.or_else(|| (line.len() > limits.max_line_bytes).then_some(line.len()));
        if let Some(bytes) = too_long {
            summary.malformed += 1;
            warn!(
                line = line_no,
                bytes,
                limit = limits.max_line_bytes,
                "ingest line too long; skipped"
            );
            continue;
        }
        let message: Message = match serde_json::from_slice(line) {
            Ok(message) => message,
            Err(err) => {
                summary.malformed += 1;
                warn!(line = line_no, error = %err, "malformed message skipped");
                continue;
            }
        };

        let message_id = message.id().to_string();
        let sender = message.sender().to_string();
        match pipeline.submit_with_backpressure(message).await {
            Submission::Accepted { id, verdict, .. } => {
                summary.accepted += 1;
                verdicts.spawn(async move {
                    let outcome = verdict.outcome().await;
                    report_outcome(id, &message_id, &sender, outcome)
                });
            }
            Submission::Rejected(rejection) => {
                summary.rejected += 1;
                debug!(
                    line = line_no,
                    message_id = %message_id,
                    sender = %sender,
                    class = %rejection.class(),
                    codes = ?rejection.codes(),
                    "submission rejected"
                );
            }
        }

        while let Some(joined) = verdicts.try_join_next() {
            tally(&mut summary, joined);
        }
    }

    let drain = Duration::from_millis(limits.drain_timeout_ms);
    let drained = tokio::time::timeout(drain, async {
        while let Some(joined) = verdicts.join_next().await {
            tally(&mut summary, joined);
        }
    })
    .await;
    if drained.is_err() {
        summary.unresolved = verdicts.len() as u64;
        warn!(
            unresolved = summary.unresolved,
            timeout_ms = limits.drain_timeout_ms,
            "verdicts still pending at end of input"
        );
    }

    Ok(summary)
}

fn trim_line(raw: &[u8]) -> &[u8] {
    let start = raw
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(raw.len());
    let end = raw
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &raw[start..end]
}

fn tally(summary: &mut IngestSummary, joined: Result<VerdictKind, tokio::task::JoinError>) {
    match joined {
        Ok(VerdictKind::Threat) => summary.threats += 1,
        Ok(VerdictKind::Clean) => summary.clean += 1,
        Ok(VerdictKind::Failed) | Ok(VerdictKind::Lost) => summary.failed += 1,
        Err(err) => {
            summary.failed += 1;
            warn!(error = %err, "verdict task join failed");
        }
    }
}

fn report_outcome(
    id: MessageId,
    message_id: &str,
    sender: &str,
    outcome: Option<ProcessingOutcome>,
) -> VerdictKind {
    match outcome {
        Some(ProcessingOutcome::Completed(verdict)) => {
            let stages: Vec<&str> = verdict.stages().collect();
            if verdict.threat_detected {
                warn!(
                    queue_id = %id,
                    message_id,
                    sender,
                    threat_type = verdict.threat_type.as_deref().unwrap_or("unclassified"),
                    confidence = verdict.confidence,
                    stages = ?stages,
                    recommendations = ?verdict.recommendations,
                    "threat verdict"
                );
            } else {
                info!(
                    queue_id = %id,
                    message_id,
                    sender,
                    confidence = verdict.confidence,
                    stages = ?stages,
                    "clean verdict"
                );
            }
            debug!(
                queue_id = %id,
                evidence = %serde_json::Value::Object(verdict.evidence.clone()),
                "verdict evidence"
            );
            if verdict.threat_detected {
                VerdictKind::Threat
            } else {
                VerdictKind::Clean
            }
        }
        Some(ProcessingOutcome::Failed { error, attempts }) => {
            warn!(
                queue_id = %id,
                message_id,
                sender,
                class = %error.class,
                attempts,
                reason = %error,
                "no verdict; message failed"
            );
            VerdictKind::Failed
        }
        None => {
            warn!(queue_id = %id, message_id, sender, "pipeline dropped verdict channel");
            VerdictKind::Lost
        }
    }
}
