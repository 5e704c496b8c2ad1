//! Orchestrator (§4.G): the long-running, single-process cooperative
//! scheduler. Ties the State Store's pending/stuck queries to the flows
//! that drive individual documents and files forward.

use crate::models::{DocumentStatus, FileStatus};
use crate::stages::StageContext;
use crate::{flows, models};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy)]
pub enum Mode {
    /// Continuous loop, ticking every `poll_interval_secs` until cancelled.
    Run,
    /// Drains the current queue once and exits (§6 "run-once").
    RunOnce,
    /// Targeted reprocessing of a single document id (§6 "process-one").
    ProcessOne(i64),
}

pub struct Orchestrator {
    ctx: StageContext,
}

impl Orchestrator {
    pub fn new(ctx: StageContext) -> Self {
        Self { ctx }
    }

    pub async fn run(&self, mode: Mode, cancel: CancellationToken) -> anyhow::Result<()> {
        match mode {
            Mode::ProcessOne(document_id) => {
                self.ctx.documents.reset_for_reprocessing(document_id).await?;
                flows::document_flow(&self.ctx, document_id, &cancel).await;
                Ok(())
            },
            Mode::RunOnce => self.drain(&cancel).await,
            Mode::Run => {
                let poll_interval = Duration::from_secs(self.ctx.config.orchestrator.poll_interval_secs);
                loop {
                    if cancel.is_cancelled() {
                        tracing::info!("orchestrator received shutdown signal, stopping");
                        break;
                    }

                    if let Err(e) = self.tick(&cancel).await {
                        tracing::error!(error = %e, "orchestrator tick failed");
                    }

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            tracing::info!("orchestrator received shutdown signal, stopping");
                            break;
                        }
                        _ = tokio::time::sleep(poll_interval) => {}
                    }
                }
                Ok(())
            },
        }
    }

    /// One orchestrator tick (§4.G.1): launch pending work non-blockingly,
    /// then sweep stuck rows.
    async fn tick(&self, cancel: &CancellationToken) -> anyhow::Result<()> {
        self.launch_pending_documents(cancel).await?;
        self.launch_pending_files(cancel).await?;
        self.sweep_stuck_documents().await?;
        self.sweep_stuck_classification_branch().await?;
        self.sweep_stuck_files().await?;
        Ok(())
    }

    /// `run-once` (§6): drains the current queue and exits, rather than
    /// firing-and-forgetting into background tasks like the continuous
    /// loop does. Runs until a pass finds no pending work.
    async fn drain(&self, cancel: &CancellationToken) -> anyhow::Result<()> {
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            let batch_limit_documents = self.ctx.config.orchestrator.batch_limit_documents;
            let batch_limit_files = self.ctx.config.orchestrator.batch_limit_files;
            let documents = self.ctx.documents.list_by_status(DocumentStatus::Pending, batch_limit_documents).await?;
            let files = self
                .ctx
                .files
                .list_by_statuses(&[FileStatus::Pending, FileStatus::Outdated], batch_limit_files)
                .await?;

            if documents.is_empty() && files.is_empty() {
                break;
            }

            let mut handles = Vec::with_capacity(documents.len() + files.len());
            for doc in documents {
                let ctx = self.ctx.clone();
                let cancel = cancel.clone();
                handles.push(tokio::spawn(async move { flows::document_flow(&ctx, doc.id, &cancel).await }));
            }
            for file in files {
                let ctx = self.ctx.clone();
                let cancel = cancel.clone();
                handles.push(tokio::spawn(async move { flows::file_flow(&ctx, file.id, &cancel).await }));
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::error!(error = %e, "flow task panicked during drain");
                }
            }
        }

        self.sweep_stuck_documents().await?;
        self.sweep_stuck_classification_branch().await?;
        self.sweep_stuck_files().await?;
        Ok(())
    }

    async fn launch_pending_documents(&self, cancel: &CancellationToken) -> anyhow::Result<()> {
        let batch_limit = self.ctx.config.orchestrator.batch_limit_documents;
        let pending = self.ctx.documents.list_by_status(DocumentStatus::Pending, batch_limit).await?;

        // Non-blocking per §4.G.1a: each document flow is spawned as its
        // own task rather than awaited here.
        for doc in pending {
            let ctx = self.ctx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { flows::document_flow(&ctx, doc.id, &cancel).await });
        }
        Ok(())
    }

    async fn launch_pending_files(&self, cancel: &CancellationToken) -> anyhow::Result<()> {
        let batch_limit = self.ctx.config.orchestrator.batch_limit_files;
        let pending =
            self.ctx.files.list_by_statuses(&[FileStatus::Pending, FileStatus::Outdated], batch_limit).await?;

        for file in pending {
            let ctx = self.ctx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { flows::file_flow(&ctx, file.id, &cancel).await });
        }
        Ok(())
    }

    /// §4.G.1c: documents whose status has gone stale in a progressing
    /// state get bumped back to their retry predecessor, or escalated to
    /// `permanently_failed` at the retry ceiling.
    async fn sweep_stuck_documents(&self) -> anyhow::Result<()> {
        let threshold = self.ctx.config.orchestrator.stuck_threshold_secs as i64;
        let stuck = self.ctx.documents.list_stuck(threshold).await?;
        for doc in stuck {
            let Some(predecessor) = doc.status()?.retry_predecessor() else {
                continue;
            };
            let escalated = self
                .ctx
                .documents
                .record_retry_or_fail(doc.id, predecessor, "stuck: stage did not complete before threshold")
                .await?;
            if escalated {
                tracing::warn!(document_id = doc.id, "document escalated to permanently_failed by stuck sweep");
            } else {
                tracing::info!(document_id = doc.id, reset_to = %predecessor, "document reset by stuck sweep");
            }
        }
        Ok(())
    }

    /// §4.G.1c companion sweep: the classification branch's own status
    /// column advances independently of `documents.status` (fan-out into
    /// Score-Classification ∥ Summarize), so a hang there is invisible to
    /// `sweep_stuck_documents` above and needs its own pass.
    async fn sweep_stuck_classification_branch(&self) -> anyhow::Result<()> {
        let threshold = self.ctx.config.orchestrator.stuck_threshold_secs as i64;
        let stuck = self.ctx.documents.list_stuck_classification_branch(threshold).await?;
        for doc in stuck {
            let Some(predecessor) = doc.classification_stage_status()?.retry_predecessor() else {
                continue;
            };
            let escalated = self
                .ctx
                .documents
                .record_classification_branch_retry_or_fail(
                    doc.id,
                    predecessor,
                    "stuck: classification branch did not complete before threshold",
                )
                .await?;
            if escalated {
                tracing::warn!(document_id = doc.id, "document escalated to permanently_failed by classification branch stuck sweep");
            } else {
                tracing::info!(document_id = doc.id, reset_to = %predecessor, "classification branch reset by stuck sweep");
            }
        }
        Ok(())
    }

    async fn sweep_stuck_files(&self) -> anyhow::Result<()> {
        let threshold = self.ctx.config.orchestrator.stuck_threshold_secs as i64;
        let stuck = self.ctx.files.list_stuck(threshold).await?;
        for file in stuck {
            let status: models::FileStatus = file.status()?;
            let Some(predecessor) = status.retry_predecessor() else {
                continue;
            };
            let escalated = self
                .ctx
                .files
                .record_retry_or_fail(file.id, predecessor, "stuck: stage did not complete before threshold")
                .await?;
            if escalated {
                tracing::warn!(file_id = file.id, "file escalated to permanently_failed by stuck sweep");
            } else {
                tracing::info!(file_id = file.id, reset_to = %predecessor, "file reset by stuck sweep");
            }
        }
        Ok(())
    }
}
