//! Priority dispatcher for the ingestion queue
//!
//! Each run claims a bounded batch of pending queue jobs ordered by
//! priority (then age) and executes them concurrently, never exceeding the
//! batch size so provider rate limits hold. Daily counters are reset once
//! per date change and then incremented atomically after the batch.

use anyhow::Result;
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info};

use super::processor::JobProcessor;
use crate::database::Database;
use crate::models::{JobStatus, TriggerSummary};

pub struct QueueDispatcher {
    database: Database,
    processor: Arc<JobProcessor>,
    batch_size: usize,
}

impl QueueDispatcher {
    pub fn new(database: Database, processor: Arc<JobProcessor>, batch_size: usize) -> Self {
        Self {
            database,
            processor,
            batch_size,
        }
    }

    pub async fn run(&self) -> Result<TriggerSummary> {
        let candidates = self.database.list_pending_queue_jobs(self.batch_size).await?;

        if candidates.is_empty() {
            debug!("Dispatcher run found no pending queue jobs");
            return Ok(TriggerSummary::empty());
        }

        // Claim each candidate; anything claimed by a concurrent dispatcher
        // in the meantime is simply skipped.
        let mut claimed = Vec::new();
        for job in candidates {
            if self.database.claim_queue_job(job.id).await? {
                claimed.push(job);
            } else {
                debug!("Queue job {} already claimed elsewhere", job.id);
            }
        }

        if claimed.is_empty() {
            return Ok(TriggerSummary::empty());
        }

        info!(
            "Dispatching batch of {} queue job(s) (batch size {})",
            claimed.len(),
            self.batch_size
        );

        // At most batch_size jobs run concurrently because only that many
        // were claimed.
        let results = join_all(
            claimed
                .iter()
                .map(|job| self.processor.process_queue_job(job)),
        )
        .await;

        let succeeded = results
            .iter()
            .filter(|r| r.status == JobStatus::Completed)
            .count() as i64;
        let failed = results.len() as i64 - succeeded;

        self.database
            .reset_stats_if_stale(Utc::now().date_naive())
            .await?;
        self.database.apply_stats_delta(succeeded, failed).await?;

        Ok(TriggerSummary::from_results(results))
    }
}
