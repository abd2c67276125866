//! Cleanup job orchestration.
//!
//! One `CleanupOrchestrator::run` call is one job: enumerate the account's
//! dialogs, fan targets into the bounded pools (history before leave, per
//! target), delete contacts, archive what remains, write the report. The
//! report is written even when the job is cancelled or aborted early.

use std::{path::PathBuf, sync::Arc};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    client::{AccountClient, ClientError},
    config::CleanupConfig,
    domain::{DialogKind, DialogTarget},
    enumerate::DialogEnumerator,
    errors::Error,
    executor::ExecutorContext,
    limiter::{PacingConfig, RateLimiter},
    pool::ConcurrencyPool,
    report::{write_artifacts, CleanupReport, ProgressSink, ReportAggregator},
    retry::Disposition,
    Result,
};

/// Job-level phase. Advances linearly; `Finalized` is reached only after
/// the report artifacts are on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobPhase {
    Enumerating,
    ProcessingDialogs,
    DeletingContacts,
    ArchivingRemainder,
    Finalized,
}

/// Result of one cleanup run.
#[derive(Debug)]
pub struct CleanupOutcome {
    pub report: CleanupReport,
    pub csv_path: PathBuf,
    pub json_path: PathBuf,
    /// Set when the job ended early: account unusable, or the dialog list
    /// could not be fetched at all.
    pub job_error: Option<String>,
    /// The external cancellation signal fired before all work was dispatched.
    pub cancelled: bool,
}

/// First abort reason wins; tripping stops all further dispatch.
#[derive(Clone)]
struct AbortFlag {
    token: CancellationToken,
    reason: Arc<std::sync::Mutex<Option<String>>>,
}

impl AbortFlag {
    fn new(token: CancellationToken) -> Self {
        Self {
            token,
            reason: Arc::new(std::sync::Mutex::new(None)),
        }
    }

    fn trip(&self, reason: String) {
        let mut guard = self.reason.lock().expect("abort flag lock");
        if guard.is_none() {
            *guard = Some(reason);
        }
        drop(guard);
        self.token.cancel();
    }

    fn reason(&self) -> Option<String> {
        self.reason.lock().expect("abort flag lock").clone()
    }
}

/// Drives one cleanup job over a provided, already-authenticated client.
pub struct CleanupOrchestrator {
    client: Arc<dyn AccountClient>,
    cfg: CleanupConfig,
    progress: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
}

impl CleanupOrchestrator {
    pub fn new(
        client: Arc<dyn AccountClient>,
        cfg: CleanupConfig,
        progress: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            client,
            cfg,
            progress,
            cancel,
        })
    }

    pub async fn run(&self, account: &str) -> Result<CleanupOutcome> {
        let started_at = Utc::now();
        let t0 = Instant::now();

        // Dispatch stops on external cancellation or on a job-level abort;
        // in-flight platform calls always finish.
        let dispatch = self.cancel.child_token();
        let abort = AbortFlag::new(dispatch.clone());

        let limiter = Arc::new(RateLimiter::new(PacingConfig::from(&self.cfg)));
        let exec = Arc::new(ExecutorContext::new(
            self.client.clone(),
            limiter,
            &self.cfg,
        ));
        let aggregator = Arc::new(ReportAggregator::new(self.progress.clone()));

        info!(account, phase = ?JobPhase::Enumerating, dry_run = self.cfg.dry_run, "cleanup job started");
        let targets = match self.enumerate(&exec).await {
            Ok(targets) => targets,
            Err(err) => {
                warn!(error = %err, "enumeration failed, finalizing empty report");
                return self
                    .finalize(account, started_at, t0, &aggregator, Some(err.to_string()))
                    .await;
            }
        };
        aggregator.set_targets_total(targets.len() as u64).await;

        info!(targets = targets.len(), phase = ?JobPhase::ProcessingDialogs, "processing dialogs");
        let mut processed = self
            .process_dialogs(targets, &exec, &aggregator, &dispatch, &abort)
            .await;

        if !dispatch.is_cancelled() {
            info!(phase = ?JobPhase::DeletingContacts, "deleting contacts");
            self.delete_contacts(&exec, &aggregator, &dispatch, &abort)
                .await;
        }

        if !dispatch.is_cancelled() {
            info!(phase = ?JobPhase::ArchivingRemainder, "archiving remainder");
            self.archive_remainder(&mut processed, &exec, &aggregator, &dispatch, &abort)
                .await;
        }

        self.finalize(account, started_at, t0, &aggregator, abort.reason())
            .await
    }

    /// Fetch the dialog list, retrying transient transport failures.
    async fn enumerate(&self, exec: &ExecutorContext) -> Result<Vec<DialogTarget>> {
        let enumerator = DialogEnumerator::new(self.client.clone());
        let policy = exec.policy();
        let mut attempt = 1u32;

        loop {
            match enumerator.list_targets().await {
                Ok(targets) => return Ok(targets),
                Err(err) => match policy.classify_enumeration(&err, attempt) {
                    Disposition::WaitAndRetry { wait, reason } => {
                        warn!(%reason, attempt, "dialog enumeration will retry");
                        tokio::time::sleep(wait).await;
                        attempt += 1;
                    }
                    _ => return Err(Error::Enumeration(err)),
                },
            }
        }
    }

    /// Fan targets through the history and leave pools.
    ///
    /// Every target passes through history deletion first; groups and
    /// channels are then handed to the leave pool, while private chats get
    /// their no-op leave record in place. The pools run concurrently, so a
    /// slow history queue never starves leaves that are already eligible.
    async fn process_dialogs(
        &self,
        targets: Vec<DialogTarget>,
        exec: &Arc<ExecutorContext>,
        aggregator: &Arc<ReportAggregator>,
        dispatch: &CancellationToken,
        abort: &AbortFlag,
    ) -> Vec<DialogTarget> {
        let history_pool =
            ConcurrencyPool::new("delete_history", self.cfg.delete_history_concurrency);
        let leave_pool = ConcurrencyPool::new("leave", self.cfg.leave_concurrency);

        let (leave_tx, leave_rx) = mpsc::channel::<DialogTarget>(targets.len().max(1));

        let history_fut = {
            let exec = Arc::clone(exec);
            let aggregator = Arc::clone(aggregator);
            let abort = abort.clone();
            let leave_tx = leave_tx.clone();
            history_pool.run_all(targets, dispatch, move |mut target: DialogTarget| {
                let exec = Arc::clone(&exec);
                let aggregator = Arc::clone(&aggregator);
                let abort = abort.clone();
                let leave_tx = leave_tx.clone();
                async move {
                    match exec.delete_history(&mut target).await {
                        Ok(record) => aggregator.append(&record).await,
                        Err(err) => abort.trip(err.to_string()),
                    }

                    if matches!(target.kind, DialogKind::Group | DialogKind::Channel) {
                        match leave_tx.send(target).await {
                            Ok(()) => None,
                            // Leave stage already gone; keep the target for bookkeeping.
                            Err(send_err) => Some(send_err.0),
                        }
                    } else {
                        match exec.leave(&mut target).await {
                            Ok(record) => aggregator.append(&record).await,
                            Err(err) => abort.trip(err.to_string()),
                        }
                        Some(target)
                    }
                }
            })
        };
        drop(leave_tx);

        let leave_fut = {
            let exec = Arc::clone(exec);
            let aggregator = Arc::clone(aggregator);
            let abort = abort.clone();
            leave_pool.run_stream(leave_rx, dispatch, move |mut target: DialogTarget| {
                let exec = Arc::clone(&exec);
                let aggregator = Arc::clone(&aggregator);
                let abort = abort.clone();
                async move {
                    match exec.leave(&mut target).await {
                        Ok(record) => aggregator.append(&record).await,
                        Err(err) => abort.trip(err.to_string()),
                    }
                    target
                }
            })
        };

        let (kept, left) = tokio::join!(history_fut, leave_fut);
        kept.into_iter().flatten().chain(left).collect()
    }

    async fn delete_contacts(
        &self,
        exec: &Arc<ExecutorContext>,
        aggregator: &Arc<ReportAggregator>,
        dispatch: &CancellationToken,
        abort: &AbortFlag,
    ) {
        let contacts = match self.client.contacts().await {
            Ok(contacts) => contacts,
            Err(ClientError::Unauthorized(reason)) => {
                abort.trip(Error::AccountInvalid(reason).to_string());
                return;
            }
            Err(err) => {
                warn!(error = %err, "contact list unavailable, skipping contact deletion");
                return;
            }
        };
        if contacts.is_empty() {
            return;
        }

        let pool = ConcurrencyPool::new("delete_contacts", self.cfg.delete_contacts_concurrency);
        let exec = Arc::clone(exec);
        let aggregator = Arc::clone(aggregator);
        let abort = abort.clone();
        pool.run_all(contacts, dispatch, move |contact| {
            let exec = Arc::clone(&exec);
            let aggregator = Arc::clone(&aggregator);
            let abort = abort.clone();
            async move {
                match exec.delete_contact(&contact).await {
                    Ok(record) => aggregator.append(&record).await,
                    Err(err) => abort.trip(err.to_string()),
                }
            }
        })
        .await;
    }

    /// Best-effort archiving of everything the account is still in.
    async fn archive_remainder(
        &self,
        processed: &mut [DialogTarget],
        exec: &Arc<ExecutorContext>,
        aggregator: &Arc<ReportAggregator>,
        dispatch: &CancellationToken,
        abort: &AbortFlag,
    ) {
        for target in processed.iter_mut() {
            if dispatch.is_cancelled() {
                break;
            }
            if target.closed || target.archived {
                continue;
            }
            match exec.archive(target).await {
                Ok(record) => aggregator.append(&record).await,
                Err(err) => {
                    abort.trip(err.to_string());
                    break;
                }
            }
        }
    }

    async fn finalize(
        &self,
        account: &str,
        started_at: DateTime<Utc>,
        t0: Instant,
        aggregator: &ReportAggregator,
        job_error: Option<String>,
    ) -> Result<CleanupOutcome> {
        let elapsed = t0.elapsed().as_secs_f64();
        let report = aggregator.finalize(account, started_at, elapsed).await;
        let (csv_path, json_path) = write_artifacts(&report, &self.cfg.report_dir)?;

        match &job_error {
            Some(reason) => error!(account, %reason, "cleanup job aborted"),
            None => info!(
                account,
                elapsed_seconds = report.elapsed_seconds,
                phase = ?JobPhase::Finalized,
                "cleanup job finished"
            ),
        }

        Ok(CleanupOutcome {
            report,
            csv_path,
            json_path,
            job_error,
            cancelled: self.cancel.is_cancelled(),
        })
    }
}
