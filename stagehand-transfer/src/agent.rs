//! File transfer agent — the orchestration state machine.
//!
//! An execution runs PARSE and PREPARE once, then drives an explicit wave
//! machine: DISPATCH → EVALUATE → {DONE | RENEW} → RETRY → final EVALUATE
//! → DONE. Renewal is reachable only from the first evaluation, so "at
//! most one renewal per execution" is a property of the state graph rather
//! than of a flag.

use crate::config::TransferConfig;
use crate::error::{AgentResult, TransferError};
use crate::job::{self, TransferJob};
use crate::prepare::{self, FinishedFile};
use crate::resolver::StatementResolver;
use crate::result::{TransferEntry, TransferResult, TransferStatus};
use stagehand_storage::{StorageClient, StorageClientFactory};
use stagehand_types::{CommandType, StageInfo, TransferOutcome};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Wave-machine states. `Renew` has a single inbound edge (the first
/// `Evaluate`) and `FinalEvaluate` has no edge back, so a second renewal
/// is unrepresentable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AgentState {
    Dispatch,
    Evaluate,
    Renew,
    Retry,
    FinalEvaluate,
    Done,
}

/// Whether the single renewal cycle is still available.
#[derive(Clone, Copy)]
enum Renewal {
    Available,
    Spent,
}

/// Orchestrates transfer commands end to end.
///
/// Owns the storage client factory (explicit dependency injection — test
/// doubles go through [`StorageClientFactory::inject`], never through
/// shared globals) and the command resolver collaborator.
pub struct FileTransferAgent {
    resolver: Arc<dyn StatementResolver>,
    factory: StorageClientFactory,
    config: TransferConfig,
}

impl FileTransferAgent {
    pub fn new(resolver: Arc<dyn StatementResolver>) -> Self {
        Self::with_config(resolver, TransferConfig::default())
    }

    pub fn with_config(resolver: Arc<dyn StatementResolver>, config: TransferConfig) -> Self {
        Self::with_factory(resolver, StorageClientFactory::new(), config)
    }

    /// Full wiring, used by tests to pass a factory with an injected
    /// client double.
    pub fn with_factory(
        resolver: Arc<dyn StatementResolver>,
        factory: StorageClientFactory,
        config: TransferConfig,
    ) -> Self {
        Self {
            resolver,
            factory,
            config,
        }
    }

    /// Drives one transfer command to completion and returns the result
    /// stream with exactly one terminal entry per input file.
    pub async fn execute(&self, command: &str) -> AgentResult<TransferResult> {
        if command.trim().is_empty() {
            return Err(TransferError::EmptyCommand);
        }

        // PARSE
        let response = self.resolver.parse(command).await?;
        let parallel = response.parallel.max(1);
        info!(
            "transfer parsed: {:?} of {} file(s), parallel={parallel}",
            response.command,
            response.src_locations.len()
        );

        // One live storage client per execution; rebuilt only at renewal.
        let client = self.factory.build(&response.stage_info, parallel)?;

        // PREPARE
        let prepared = prepare::prepare_jobs(&response, &self.config).await;

        let execution = Execution {
            agent: self,
            command,
            stage: response.stage_info,
            parallel,
            client,
            pending: prepared.pending,
            finished: prepared.failed,
        };
        execution.drive().await
    }
}

/// Mutable state of one `execute` call.
struct Execution<'a> {
    agent: &'a FileTransferAgent,
    command: &'a str,
    stage: StageInfo,
    parallel: usize,
    client: Arc<dyn StorageClient>,
    pending: Vec<TransferJob>,
    finished: Vec<FinishedFile>,
}

impl Execution<'_> {
    async fn drive(mut self) -> AgentResult<TransferResult> {
        let mut state = AgentState::Dispatch;
        let mut wave: Vec<(TransferJob, TransferOutcome)> = Vec::new();
        let mut expired: Vec<TransferJob> = Vec::new();

        loop {
            state = match state {
                AgentState::Dispatch => {
                    let pending = std::mem::take(&mut self.pending);
                    wave = self.run_wave(pending).await;
                    AgentState::Evaluate
                }
                AgentState::Evaluate => {
                    expired = self.settle(std::mem::take(&mut wave), Renewal::Available);
                    if expired.is_empty() {
                        AgentState::Done
                    } else {
                        AgentState::Renew
                    }
                }
                AgentState::Renew => {
                    self.renew(&mut expired).await?;
                    AgentState::Retry
                }
                AgentState::Retry => {
                    wave = self.run_wave(std::mem::take(&mut expired)).await;
                    AgentState::FinalEvaluate
                }
                AgentState::FinalEvaluate => {
                    let leftover = self.settle(std::mem::take(&mut wave), Renewal::Spent);
                    debug_assert!(leftover.is_empty());
                    AgentState::Done
                }
                AgentState::Done => break,
            };
        }

        Ok(self.into_result())
    }

    /// Dispatches one wave over the bounded pool and joins it completely —
    /// a partial expiry never cancels sibling jobs.
    async fn run_wave(&self, jobs: Vec<TransferJob>) -> Vec<(TransferJob, TransferOutcome)> {
        if jobs.is_empty() {
            return Vec::new();
        }
        debug!("dispatching wave of {} job(s)", jobs.len());

        let pool = Arc::new(Semaphore::new(self.parallel));
        let mut set = JoinSet::new();
        for transfer_job in jobs {
            set.spawn(job::run(
                transfer_job,
                Arc::clone(&self.client),
                Arc::clone(&pool),
                self.agent.config.clone(),
            ));
        }

        let mut results = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(pair) => results.push(pair),
                Err(e) => error!("transfer job task failed: {e}"),
            }
        }
        results
    }

    /// Records terminal outcomes and regroups expiry-flagged jobs. With
    /// the renewal spent, an expiry is terminal for that job alone.
    fn settle(
        &mut self,
        wave: Vec<(TransferJob, TransferOutcome)>,
        renewal: Renewal,
    ) -> Vec<TransferJob> {
        let mut expired = Vec::new();
        for (transfer_job, outcome) in wave {
            match (outcome, renewal) {
                (TransferOutcome::CredentialExpired, Renewal::Available) => {
                    expired.push(transfer_job);
                }
                (TransferOutcome::CredentialExpired, Renewal::Spent) => {
                    self.finished.push(FinishedFile {
                        index: transfer_job.index,
                        meta: transfer_job.meta,
                        outcome: TransferOutcome::Failure(
                            "staging credentials expired again after renewal".to_string(),
                        ),
                    });
                }
                (outcome, _) => {
                    self.finished.push(FinishedFile {
                        index: transfer_job.index,
                        meta: transfer_job.meta,
                        outcome,
                    });
                }
            }
        }

        if !expired.is_empty() {
            warn!(
                "{} job(s) reported expired staging credentials",
                expired.len()
            );
        }
        expired
    }

    /// RENEW: the second and final parse. Stage, encryption material, and
    /// storage client swap as one unit; jobs that already finished are
    /// untouched, and retried jobs observe only the new set.
    async fn renew(&mut self, expired: &mut Vec<TransferJob>) -> AgentResult<()> {
        info!(
            "renewing staging credentials for {} job(s)",
            expired.len()
        );
        let renewed = self.agent.resolver.parse(self.command).await?;
        let parallel = renewed.parallel.max(1);

        self.client = self.agent.factory.build(&renewed.stage_info, parallel)?;
        self.parallel = parallel;
        self.stage = renewed.stage_info;

        let mut retry = Vec::with_capacity(expired.len());
        for mut transfer_job in expired.drain(..) {
            match transfer_job.refresh(
                &self.stage,
                renewed.encryption_material.get(transfer_job.index),
            ) {
                Ok(()) => retry.push(transfer_job),
                Err(reason) => {
                    warn!(
                        "renewal rebind failed for {}: {reason}",
                        transfer_job.meta.src_file_name
                    );
                    self.finished.push(FinishedFile {
                        index: transfer_job.index,
                        meta: transfer_job.meta,
                        outcome: TransferOutcome::Failure(reason),
                    });
                }
            }
        }
        *expired = retry;
        Ok(())
    }

    /// Builds the result stream, one entry per input file in input order.
    fn into_result(mut self) -> TransferResult {
        self.finished.sort_by_key(|f| f.index);

        let succeeded = self
            .finished
            .iter()
            .filter(|f| f.outcome.is_success())
            .count();
        info!(
            "transfer complete: {succeeded} succeeded, {} failed",
            self.finished.len() - succeeded
        );

        let entries = self
            .finished
            .into_iter()
            .map(|f| {
                let (status, detail) = match f.outcome {
                    TransferOutcome::Success => (TransferStatus::Succeed, String::new()),
                    TransferOutcome::Failure(reason) => (TransferStatus::Failed, reason),
                    TransferOutcome::CredentialExpired => (
                        // Settle never records a bare expiry, but the entry
                        // must still read as a failure if it ever did.
                        TransferStatus::Failed,
                        "staging credentials expired".to_string(),
                    ),
                };
                let target = match f.meta.command {
                    CommandType::Upload => f.meta.remote_path,
                    CommandType::Download => f
                        .meta
                        .local_path
                        .map(|p| p.display().to_string())
                        .unwrap_or_default(),
                };
                TransferEntry {
                    src: f.meta.src_file_name,
                    target,
                    size: f.meta.src_size,
                    status,
                    detail,
                }
            })
            .collect();

        TransferResult::new(entries)
    }
}
