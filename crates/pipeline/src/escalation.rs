use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use admission::{MessageValidator, SecurityGate, ValidationError};
use detection::{
    combine, AnalysisInput, HistoryConfig, OracleScore, RecommendationTemplates, ScoringOracle,
    SenderRegistry, SenderState, SequenceInput, StageOutputs, Verdict,
};
use message_queue::{
    CompletionOutcome, Delivery, FailureOutcome, MessageId, MessageState, PriorityQueue,
    QueueConfig, QueueError, SharedQueue,
};
use protocol::{Clock, Message, Priority};
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::errors::{PipelineError, PipelineResult, ProcessingError, Rejection, Stage};
use crate::oracles::Oracles;
use crate::priority::derive_priority;
use crate::status::{StatusSnapshot, SweepReport};
use crate::submission::{ProcessingOutcome, Submission, VerdictHandle, Waiters};

/// Everything needed to assemble a pipeline.
pub struct PipelineParts {
    pub config: PipelineConfig,
    pub queue: QueueConfig,
    pub history: HistoryConfig,
    pub validator: MessageValidator,
    pub gate: SecurityGate,
    pub oracles: Oracles,
    pub templates: RecommendationTemplates,
    pub clock: Arc<dyn Clock>,
}

struct Admission {
    validator: MessageValidator,
    gate: SecurityGate,
}

/// What a worker did with one delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Completed(Verdict),
    Retrying { retries: u32, error: ProcessingError },
    Failed { attempts: u32, error: ProcessingError },
    /// The attempt lost its lease to a stuck-message sweep; its result was
    /// discarded.
    Superseded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub id: MessageId,
    pub sender_id: String,
    pub outcome: StepOutcome,
}

/// Validation, security, queueing and staged scoring for admitted messages.
pub struct EscalationPipeline {
    config: PipelineConfig,
    admission: Mutex<Admission>,
    queue: Arc<SharedQueue>,
    registry: SenderRegistry,
    oracles: Oracles,
    templates: RecommendationTemplates,
    waiters: Mutex<Waiters>,
    clock: Arc<dyn Clock>,
}

impl EscalationPipeline {
    pub fn new(parts: PipelineParts) -> Self {
        let queue = Arc::new(SharedQueue::new(
            PriorityQueue::new(parts.queue),
            Arc::clone(&parts.clock),
        ));
        Self {
            config: parts.config,
            admission: Mutex::new(Admission {
                validator: parts.validator,
                gate: parts.gate,
            }),
            queue,
            registry: SenderRegistry::new(parts.history),
            oracles: parts.oracles,
            templates: parts.templates,
            waiters: Mutex::new(Waiters::default()),
            clock: parts.clock,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<SharedQueue> {
        &self.queue
    }

    pub fn registry(&self) -> &SenderRegistry {
        &self.registry
    }

    /// Validates, authorizes and enqueues `message`. A full priority class
    /// rejects immediately with `QUEUE_FULL`.
    pub fn submit(&self, message: Message) -> Submission {
        let message = Arc::new(message);
        let admitted = self.lock_for_admission().and_then(|mut admission| {
            let now = self.clock.now_ms();
            let priority = screen(&mut admission, &message, now)?;
            let id = self.enqueue_screened(&mut admission, &message, priority, now)?;
            Ok((id, priority))
        });
        match admitted {
            Ok((id, priority)) => self.accept(&message, id, priority),
            Err(rejection) => Submission::Rejected(rejection),
        }
    }

    /// Like [`submit`](Self::submit), but waits up to `enqueue_wait_ms` for
    /// room in a full class before rejecting.
    pub async fn submit_with_backpressure(&self, message: Message) -> Submission {
        let message = Arc::new(message);
        let deadline = tokio::time::Instant::now() + self.config.enqueue_wait();
        let screened = self.lock_for_admission().and_then(|mut admission| {
            screen(&mut admission, &message, self.clock.now_ms())
        });
        let priority = match screened {
            Ok(priority) => priority,
            Err(rejection) => return Submission::Rejected(rejection),
        };

        let mut waited_out = false;
        loop {
            // The lock is released before any wait below.
            let attempt = self.lock_for_admission().and_then(|mut admission| {
                let now = self.clock.now_ms();
                self.enqueue_screened(&mut admission, &message, priority, now)
            });
            match attempt {
                Ok(id) => return self.accept(&message, id, priority),
                Err(Rejection::QueueFull { .. }) if !waited_out => {
                    waited_out = !self.queue.wait_for_space(priority, deadline).await;
                }
                Err(rejection) => return Submission::Rejected(rejection),
            }
        }
    }

    fn lock_for_admission(&self) -> Result<MutexGuard<'_, Admission>, Rejection> {
        self.lock_admission()
            .map_err(|err| Rejection::Unavailable(err.to_string()))
    }

    /// Enqueues a message that already passed [`screen`], re-checking the
    /// validator first since other submissions may have been admitted in the
    /// meantime. Validator state is only committed once the queue took the
    /// message.
    fn enqueue_screened(
        &self,
        admission: &mut Admission,
        message: &Arc<Message>,
        priority: Priority,
        now: i64,
    ) -> Result<MessageId, Rejection> {
        admission
            .validator
            .check(message, now)
            .map_err(|err| validation_rejection(message, err))?;
        match self.queue.enqueue(Arc::clone(message), priority) {
            Ok(id) => {
                admission.validator.commit(message, now);
                Ok(id)
            }
            Err(QueueError::Full { priority, capacity }) => {
                warn!(
                    message_id = message.id(),
                    sender = message.sender(),
                    priority = %priority,
                    capacity,
                    "priority class full; submission rejected"
                );
                Err(Rejection::QueueFull { priority, capacity })
            }
            Err(err) => Err(Rejection::Unavailable(err.to_string())),
        }
    }

    fn accept(&self, message: &Message, id: MessageId, priority: Priority) -> Submission {
        let rx = match self.waiters.lock() {
            Ok(mut waiters) => waiters.register(id),
            Err(_) => {
                // Accepted, but nobody can be told the outcome.
                warn!(message_id = %id, "verdict waiters lock poisoned");
                tokio::sync::oneshot::channel::<ProcessingOutcome>().1
            }
        };
        debug!(
            queue_id = %id,
            message_id = message.id(),
            sender = message.sender(),
            priority = %priority,
            "message admitted"
        );
        Submission::Accepted {
            id,
            priority,
            verdict: VerdictHandle::new(id, rx),
        }
    }

    pub fn message_state(&self, id: MessageId) -> PipelineResult<Option<MessageState>> {
        Ok(self.queue.state(id)?)
    }

    /// Dequeues the most urgent message and runs it through the stages.
    /// `None` when the queue stayed empty for `wait`.
    pub async fn process_next(&self, wait: Duration) -> PipelineResult<Option<StepReport>> {
        let Some(delivery) = self.queue.dequeue_timeout(wait).await? else {
            return Ok(None);
        };
        self.process_delivery(delivery).await.map(Some)
    }

    pub async fn process_delivery(&self, delivery: Delivery) -> PipelineResult<StepReport> {
        let handle = self.registry.handle(delivery.message.sender())?;
        let scored = {
            // One message per sender at a time.
            let mut sender = handle.lock().await;
            self.run_stages(&mut sender, &delivery).await
        };

        let outcome = match scored {
            Ok(outputs) => {
                let verdict = combine(&outputs, self.config.threat_threshold, &self.templates);
                self.complete(&delivery, verdict)?
            }
            Err(err) => self.fail(&delivery, err)?,
        };
        Ok(StepReport {
            id: delivery.id(),
            sender_id: delivery.message.sender().to_string(),
            outcome,
        })
    }

    async fn run_stages(
        &self,
        sender: &mut SenderState,
        delivery: &Delivery,
    ) -> Result<StageOutputs, ProcessingError> {
        let message = &delivery.message;
        let now = self.clock.now_ms();
        sender.observe(message, now);
        let features = sender.history.features();

        let detection = self
            .run_oracle(
                Stage::Detection,
                Arc::clone(&self.oracles.detector),
                features.clone(),
            )
            .await?;
        sender.history.annotate(message, detection.score);

        let mut outputs = StageOutputs {
            detection,
            analysis: None,
            transform: None,
        };
        if outputs.detection.score <= self.config.analysis_threshold {
            return Ok(outputs);
        }

        let input = AnalysisInput {
            message: Arc::clone(message),
            features,
            window: sender.history.observations().cloned().collect(),
            detection: outputs.detection.clone(),
        };
        let analysis = self
            .run_oracle(Stage::Analysis, Arc::clone(&self.oracles.analyzer), input)
            .await?;
        let anomaly_score = analysis.score;
        outputs.analysis = Some(analysis);
        if anomaly_score <= self.config.transform_threshold {
            return Ok(outputs);
        }

        let session = sender.session_or_seed(now);
        let input = SequenceInput {
            sender_id: message.sender().to_string(),
            messages: session.messages(),
            session_started_ms: session.started_ms(),
            detection_score: outputs.detection.score,
            anomaly_score,
        };
        outputs.transform = Some(
            self.run_oracle(Stage::Transform, Arc::clone(&self.oracles.transform), input)
                .await?,
        );
        Ok(outputs)
    }

    /// Runs one oracle on the blocking pool, bounded by `oracle_timeout_ms`.
    /// A timed-out computation is abandoned, not interrupted.
    async fn run_oracle<I>(
        &self,
        stage: Stage,
        oracle: Arc<dyn ScoringOracle<I>>,
        input: I,
    ) -> Result<OracleScore, ProcessingError>
    where
        I: Send + 'static,
    {
        let name = oracle.name().to_string();
        let task = tokio::task::spawn_blocking(move || oracle.score(&input));
        let score = match tokio::time::timeout(self.config.oracle_timeout(), task).await {
            Err(_) => {
                return Err(ProcessingError::timeout(
                    Some(stage),
                    format!(
                        "oracle {name} exceeded {}ms",
                        self.config.oracle_timeout_ms
                    ),
                ))
            }
            Ok(Err(join)) => {
                return Err(ProcessingError::processing(
                    stage,
                    format!("oracle {name} aborted: {join}"),
                ))
            }
            Ok(Ok(Err(err))) => return Err(ProcessingError::processing(stage, err.to_string())),
            Ok(Ok(Ok(score))) => score,
        };
        if !(0.0..=1.0).contains(&score.score) {
            return Err(ProcessingError::processing(
                stage,
                format!("oracle {name} returned score {} outside [0, 1]", score.score),
            ));
        }
        Ok(score)
    }

    fn complete(&self, delivery: &Delivery, verdict: Verdict) -> PipelineResult<StepOutcome> {
        match self.queue.mark_completed(delivery.lease) {
            Ok(CompletionOutcome::Completed { duration_ms }) => {
                if verdict.threat_detected {
                    info!(
                        message_id = delivery.message.id(),
                        queue_id = %delivery.id(),
                        sender = delivery.message.sender(),
                        threat_type = verdict.threat_type.as_deref().unwrap_or("unclassified"),
                        confidence = verdict.confidence,
                        stages = verdict.evidence.len(),
                        duration_ms,
                        "threat detected"
                    );
                } else {
                    debug!(
                        message_id = delivery.message.id(),
                        queue_id = %delivery.id(),
                        confidence = verdict.confidence,
                        stages = verdict.evidence.len(),
                        duration_ms,
                        "message scored clean"
                    );
                }
                self.resolve(delivery.id(), ProcessingOutcome::Completed(verdict.clone()))?;
                Ok(StepOutcome::Completed(verdict))
            }
            Ok(CompletionOutcome::AlreadyCompleted) => Ok(StepOutcome::Superseded),
            Err(err) => self.superseded(delivery, err),
        }
    }

    fn fail(&self, delivery: &Delivery, err: ProcessingError) -> PipelineResult<StepOutcome> {
        let stage = err.stage.map(Stage::as_str).unwrap_or("queue");
        match self.queue.mark_failed(delivery.lease, &err.to_string()) {
            Ok(FailureOutcome::Requeued { retries }) => {
                warn!(
                    message_id = delivery.message.id(),
                    queue_id = %delivery.id(),
                    sender = delivery.message.sender(),
                    stage,
                    retries,
                    error = %err,
                    "processing attempt failed; message requeued"
                );
                Ok(StepOutcome::Retrying {
                    retries,
                    error: err,
                })
            }
            Ok(FailureOutcome::Failed { attempts, .. }) => {
                error!(
                    message_id = delivery.message.id(),
                    queue_id = %delivery.id(),
                    sender = delivery.message.sender(),
                    stage,
                    attempts,
                    reason = %err,
                    "message failed permanently"
                );
                self.resolve(
                    delivery.id(),
                    ProcessingOutcome::Failed {
                        error: err.clone(),
                        attempts,
                    },
                )?;
                Ok(StepOutcome::Failed {
                    attempts,
                    error: err,
                })
            }
            Err(queue_err) => self.superseded(delivery, queue_err),
        }
    }

    fn superseded(&self, delivery: &Delivery, err: QueueError) -> PipelineResult<StepOutcome> {
        match err {
            QueueError::StaleLease { .. }
            | QueueError::UnknownMessage(_)
            | QueueError::InvalidTransition { .. } => {
                debug!(
                    queue_id = %delivery.id(),
                    error = %err,
                    "attempt superseded; result discarded"
                );
                Ok(StepOutcome::Superseded)
            }
            other => Err(other.into()),
        }
    }

    fn resolve(&self, id: MessageId, outcome: ProcessingOutcome) -> PipelineResult<()> {
        self.lock_waiters()?.resolve(id, outcome);
        Ok(())
    }

    fn lock_waiters(&self) -> PipelineResult<MutexGuard<'_, Waiters>> {
        self.waiters
            .lock()
            .map_err(|_| PipelineError::LockPoisoned("verdict waiters"))
    }

    fn lock_admission(&self) -> PipelineResult<MutexGuard<'_, Admission>> {
        self.admission
            .lock()
            .map_err(|_| PipelineError::LockPoisoned("admission"))
    }

    /// Stuck-message recovery, retention purge and eviction of idle sender,
    /// duplicate-id and rate state.
    pub fn sweep(&self) -> PipelineResult<SweepReport> {
        let now = self.clock.now_ms();
        let mut report = SweepReport::default();

        for recovery in self.queue.sweep_stuck()? {
            report.recovered += 1;
            match recovery.outcome {
                FailureOutcome::Requeued { retries } => warn!(
                    queue_id = %recovery.id,
                    sender = %recovery.sender_id,
                    retries,
                    "stuck message requeued"
                ),
                FailureOutcome::Failed { attempts, error } => {
                    report.failed_permanently += 1;
                    let err = ProcessingError::timeout(None, error);
                    error!(
                        queue_id = %recovery.id,
                        sender = %recovery.sender_id,
                        stage = "queue",
                        attempts,
                        reason = %err,
                        "message failed permanently"
                    );
                    self.resolve(recovery.id, ProcessingOutcome::Failed { error: err, attempts })?;
                }
            }
        }

        report.purged = self.queue.purge_expired()?;
        report.sessions_closed = self.registry.evict_idle_sessions(now)?;
        {
            let mut admission = self.lock_admission()?;
            report.message_ids_evicted = admission.validator.sweep(now);
            report.rate_windows_evicted = admission.gate.sweep(now);
        }

        let queue = &self.queue;
        self.lock_waiters()?
            .retain_early(|id| matches!(queue.state(id), Ok(Some(_))));
        Ok(report)
    }

    pub fn status(&self) -> PipelineResult<StatusSnapshot> {
        let queue = self.queue.snapshot()?;
        let health = self.queue.health()?;
        let (tracked_message_ids, rate_tracked_senders) = {
            let admission = self.lock_admission()?;
            (
                admission.validator.tracked_ids(),
                admission.gate.tracked_senders(),
            )
        };
        Ok(StatusSnapshot {
            queue,
            health,
            tracked_senders: self.registry.len(),
            open_sessions: self.registry.open_sessions(),
            tracked_message_ids,
            rate_tracked_senders,
            pending_verdicts: self.lock_waiters()?.pending(),
        })
    }
}

/// Read-only validation followed by the security gate. Nothing is recorded
/// in the validator until the message is enqueued, so a rejected or forged
/// message cannot claim an id or a sequence number.
fn screen(
    admission: &mut Admission,
    message: &Message,
    now: i64,
) -> Result<Priority, Rejection> {
    admission
        .validator
        .check(message, now)
        .map_err(|err| validation_rejection(message, err))?;
    admission
        .gate
        .authorize(message, now)
        .map_err(Rejection::Security)?;
    Ok(derive_priority(message))
}

fn validation_rejection(message: &Message, err: ValidationError) -> Rejection {
    info!(
        message_id = message.id(),
        sender = message.sender(),
        codes = ?err.codes(),
        reason = %err.reason(),
        "message rejected by validator"
    );
    Rejection::Validation(err)
}
