//! Time-window scheduler for publish jobs
//!
//! Each run gathers pending publish jobs around the current time, groups
//! them into 5-minute buckets and processes every bucket that has fully
//! elapsed. A job is claimed before any side-effecting call, so
//! overlapping runs (internal ticker plus an external trigger, or two
//! processes) can never double-publish it.

use anyhow::Result;
use chrono::{DateTime, Duration, Timelike, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::processor::JobProcessor;
use crate::database::Database;
use crate::models::{PublishJob, TriggerSummary};

/// Width of a scheduling bucket in minutes.
pub const BUCKET_MINUTES: i64 = 5;

/// Floor a timestamp to its 5-minute bucket boundary.
pub fn bucket_floor(t: DateTime<Utc>) -> DateTime<Utc> {
    let minute = t.minute() - (t.minute() % BUCKET_MINUTES as u32);
    t.with_minute(minute)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

/// A bucket is due once it has fully elapsed: its boundary plus the bucket
/// width is not in the future. Jobs are therefore processed at most one
/// bucket width after their scheduled time and never before it.
pub fn bucket_is_due(boundary: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    boundary + Duration::minutes(BUCKET_MINUTES) <= now
}

pub struct PublishScheduler {
    database: Database,
    processor: Arc<JobProcessor>,
    window_hours: i64,
}

impl PublishScheduler {
    pub fn new(database: Database, processor: Arc<JobProcessor>, window_hours: i64) -> Self {
        Self {
            database,
            processor,
            window_hours,
        }
    }

    pub async fn run(&self) -> Result<TriggerSummary> {
        self.run_at(Utc::now()).await
    }

    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<TriggerSummary> {
        // No look-back limit: a pending job stays eligible however long
        // ago it was scheduled (missed runs, late reprocessed failures).
        // The due-bucket filter below is what prevents early execution.
        let to = now + Duration::hours(self.window_hours);

        let jobs = self
            .database
            .list_pending_publish_jobs_before(to)
            .await?;

        if jobs.is_empty() {
            debug!("Scheduler run found no pending publish jobs");
            return Ok(TriggerSummary::empty());
        }

        let mut buckets: BTreeMap<DateTime<Utc>, Vec<PublishJob>> = BTreeMap::new();
        for job in jobs {
            buckets
                .entry(bucket_floor(job.scheduled_at))
                .or_default()
                .push(job);
        }

        info!(
            "Scheduler run at {} found {} bucket(s) with pending jobs",
            now.format("%Y-%m-%d %H:%M:%S UTC"),
            buckets.len()
        );

        let mut results = Vec::new();

        for (boundary, bucket_jobs) in buckets {
            if !bucket_is_due(boundary, now) {
                debug!(
                    "Skipping bucket {} with {} job(s): not yet due",
                    boundary.format("%H:%M"),
                    bucket_jobs.len()
                );
                continue;
            }

            info!(
                "Processing bucket {} with {} job(s)",
                boundary.format("%Y-%m-%d %H:%M UTC"),
                bucket_jobs.len()
            );

            for job in bucket_jobs {
                // Claim before any side-effecting call; a lost claim means
                // another scheduler run owns this job.
                if !self.database.claim_publish_job(job.id).await? {
                    debug!("Publish job {} already claimed elsewhere", job.id);
                    continue;
                }

                results.push(self.processor.process_publish_job(&job).await);
            }
        }

        Ok(TriggerSummary::from_results(results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_bucket_floor_rounds_down_to_five_minutes() {
        assert_eq!(bucket_floor(at(10, 2)), at(10, 0));
        assert_eq!(bucket_floor(at(10, 4)), at(10, 0));
        assert_eq!(bucket_floor(at(10, 7)), at(10, 5));
        assert_eq!(bucket_floor(at(10, 5)), at(10, 5));
        assert_eq!(bucket_floor(at(10, 59)), at(10, 55));
    }

    #[test]
    fn test_run_at_1005_selects_only_the_elapsed_bucket() {
        // Jobs at 10:02 and 10:04 fall into bucket [10:00, 10:05), which
        // has fully elapsed at a 10:05 run; the 10:07 job's bucket has not.
        let now = at(10, 5);

        assert!(bucket_is_due(bucket_floor(at(10, 2)), now));
        assert!(bucket_is_due(bucket_floor(at(10, 4)), now));
        assert!(!bucket_is_due(bucket_floor(at(10, 7)), now));
    }

    #[test]
    fn test_bucket_never_due_before_scheduled_time() {
        // A job at 10:04 must not run at 10:03
        assert!(!bucket_is_due(bucket_floor(at(10, 4)), at(10, 3)));
        // ...but is due once its bucket closes at 10:05
        assert!(bucket_is_due(bucket_floor(at(10, 4)), at(10, 5)));
    }

    #[test]
    fn test_old_buckets_are_due() {
        assert!(bucket_is_due(bucket_floor(at(8, 17)), at(10, 5)));
    }
}
