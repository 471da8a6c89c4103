//! Cron scheduler for the full membership sweep

use std::sync::Arc;

use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::config::Config;
use crate::reconciler::Reconciler;
use crate::store::{MembershipStore, SnapshotProvider};

/// Scheduler that periodically re-evaluates every user against every auto squad,
/// correcting anything a missed or failed change event left behind
pub struct SweepScheduler<P, M> {
    config: Arc<Config>,
    reconciler: Arc<Reconciler<P, M>>,
    scheduler: JobScheduler,
}

impl<P, M> SweepScheduler<P, M>
where
    P: SnapshotProvider + 'static,
    M: MembershipStore + 'static,
{
    /// Create a new sweep scheduler
    pub async fn new(config: Arc<Config>, reconciler: Arc<Reconciler<P, M>>) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            config,
            reconciler,
            scheduler,
        })
    }

    /// Add the sweep job to the scheduler
    pub async fn setup_jobs(&mut self) -> Result<()> {
        let reconciler = self.reconciler.clone();
        let cron_expr = self.config.sweep_cron.clone();

        tracing::info!("Adding membership sweep job: {}", cron_expr);

        let job = Job::new_async(cron_expr.as_str(), move |_uuid, _lock| {
            let reconciler = reconciler.clone();

            Box::pin(async move {
                tracing::info!("Running membership sweep");

                match reconciler.sweep().await {
                    Ok(report) => {
                        tracing::info!(
                            "Membership sweep: added={}, removed={}, unchanged={}, failed_squads={}, errors={}",
                            report.added,
                            report.removed,
                            report.unchanged,
                            report.failed,
                            report.errors
                        );
                    }
                    Err(e) => {
                        tracing::error!("Membership sweep failed: {}", e);
                    }
                }
            })
        })?;

        self.scheduler.add(job).await?;
        Ok(())
    }

    /// Start the scheduler
    pub async fn start(&self) -> Result<()> {
        self.scheduler.start().await?;
        Ok(())
    }

    /// Shutdown the scheduler gracefully
    pub async fn shutdown(&mut self) -> Result<()> {
        self.scheduler.shutdown().await?;
        Ok(())
    }
}
