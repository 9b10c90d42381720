//! Integration tests for the job store: claim semantics, lifecycle
//! transitions, dispatch ordering, daily counters and token upserts.

use chrono::{Duration, Utc};
use uuid::Uuid;

use vidqueue::database::Database;
use vidqueue::models::{JobStatus, PublishJobCreateRequest, QueueJobCreateRequest};

async fn setup_database() -> Database {
    let database = Database::new_in_memory().await.unwrap();
    database.migrate().await.unwrap();
    database
}

fn publish_request(owner: &str) -> PublishJobCreateRequest {
    PublishJobCreateRequest {
        owner: owner.to_string(),
        account_id: None,
        source_file_id: "file-abc".to_string(),
        source_file_name: "clip.mp4".to_string(),
        title: "Morning clip".to_string(),
        description: None,
        scheduled_at: Utc::now() + Duration::hours(1),
    }
}

fn queue_request(owner: &str, url: &str, priority: i64) -> QueueJobCreateRequest {
    QueueJobCreateRequest {
        owner: owner.to_string(),
        account_id: None,
        source_url: url.to_string(),
        priority,
    }
}

#[tokio::test]
async fn test_claim_has_exactly_one_winner() {
    let db = setup_database().await;
    let job = db.create_publish_job(&publish_request("alice")).await.unwrap();

    let (first, second) = tokio::join!(db.claim_publish_job(job.id), db.claim_publish_job(job.id));

    let wins = [first.unwrap(), second.unwrap()]
        .iter()
        .filter(|w| **w)
        .count();
    assert_eq!(wins, 1);

    let stored = db.get_publish_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Processing);
    assert!(stored.processing_started_at.is_some());
}

#[tokio::test]
async fn test_complete_requires_processing_state() {
    let db = setup_database().await;
    let job = db.create_publish_job(&publish_request("alice")).await.unwrap();

    // Still pending, completion must not apply
    assert!(!db
        .complete_publish_job(job.id, "vid-1", "https://example.com/watch?v=vid-1")
        .await
        .unwrap());

    assert!(db.claim_publish_job(job.id).await.unwrap());
    assert!(db
        .complete_publish_job(job.id, "vid-1", "https://example.com/watch?v=vid-1")
        .await
        .unwrap());

    // Terminal state, nothing else applies
    assert!(!db.fail_publish_job(job.id, "boom").await.unwrap());
    assert!(!db.claim_publish_job(job.id).await.unwrap());

    let stored = db.get_publish_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.result_asset_id.as_deref(), Some("vid-1"));
}

#[tokio::test]
async fn test_reprocess_only_applies_to_failed_jobs() {
    let db = setup_database().await;
    let job = db.create_publish_job(&publish_request("alice")).await.unwrap();

    assert!(!db.reprocess_publish_job(job.id).await.unwrap());

    assert!(db.claim_publish_job(job.id).await.unwrap());
    assert!(!db.reprocess_publish_job(job.id).await.unwrap());

    assert!(db.fail_publish_job(job.id, "upload failed").await.unwrap());
    assert!(db.reprocess_publish_job(job.id).await.unwrap());

    let stored = db.get_publish_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Pending);
    assert!(stored.error_message.is_none());
    assert!(stored.processing_started_at.is_none());
}

#[tokio::test]
async fn test_cancel_only_applies_to_pending_jobs() {
    let db = setup_database().await;
    let job = db.create_publish_job(&publish_request("alice")).await.unwrap();

    assert!(db.claim_publish_job(job.id).await.unwrap());
    assert!(!db.cancel_publish_job(job.id).await.unwrap());

    let other = db.create_publish_job(&publish_request("alice")).await.unwrap();
    assert!(db.cancel_publish_job(other.id).await.unwrap());
    assert!(db.get_publish_job(other.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_cancel_unknown_job_reports_no_effect() {
    let db = setup_database().await;
    assert!(!db.cancel_publish_job(Uuid::new_v4()).await.unwrap());
    assert!(!db.cancel_queue_job(Uuid::new_v4()).await.unwrap());
}

#[tokio::test]
async fn test_pending_selection_has_no_lookback_limit() {
    let db = setup_database().await;
    let now = Utc::now();

    // Far overdue: must still be selected no matter how old
    let mut overdue = publish_request("alice");
    overdue.scheduled_at = now - Duration::days(40);
    let overdue = db.create_publish_job(&overdue).await.unwrap();

    let mut recent = publish_request("alice");
    recent.scheduled_at = now - Duration::hours(2);
    let recent = db.create_publish_job(&recent).await.unwrap();

    let mut future = publish_request("alice");
    future.scheduled_at = now + Duration::hours(48);
    db.create_publish_job(&future).await.unwrap();

    let mut claimed = publish_request("alice");
    claimed.scheduled_at = now - Duration::hours(1);
    let claimed = db.create_publish_job(&claimed).await.unwrap();
    assert!(db.claim_publish_job(claimed.id).await.unwrap());

    let due = db
        .list_pending_publish_jobs_before(now + Duration::hours(24))
        .await
        .unwrap();

    let ids: Vec<_> = due.iter().map(|j| j.id).collect();
    assert_eq!(ids, vec![overdue.id, recent.id]);
}

#[tokio::test]
async fn test_reprocessed_job_stays_eligible_after_long_delay() {
    let db = setup_database().await;
    let now = Utc::now();

    // Job failed weeks ago, then manually reprocessed
    let mut req = publish_request("alice");
    req.scheduled_at = now - Duration::days(30);
    let job = db.create_publish_job(&req).await.unwrap();
    assert!(db.claim_publish_job(job.id).await.unwrap());
    assert!(db.fail_publish_job(job.id, "upload failed").await.unwrap());
    assert!(db.reprocess_publish_job(job.id).await.unwrap());

    let due = db
        .list_pending_publish_jobs_before(now + Duration::hours(24))
        .await
        .unwrap();

    assert_eq!(due.len(), 1);
    assert_eq!(due[0].id, job.id);
}

#[tokio::test]
async fn test_queue_dispatch_order_is_priority_then_age() {
    let db = setup_database().await;

    let low = db
        .create_queue_job(&queue_request("alice", "https://example.com/a", 1))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let high_old = db
        .create_queue_job(&queue_request("alice", "https://example.com/b", 9))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let high_new = db
        .create_queue_job(&queue_request("alice", "https://example.com/c", 9))
        .await
        .unwrap();

    let batch = db.list_pending_queue_jobs(8).await.unwrap();
    let ids: Vec<_> = batch.iter().map(|j| j.id).collect();
    assert_eq!(ids, vec![high_old.id, high_new.id, low.id]);

    // Claimed jobs leave the dispatch set
    assert!(db.claim_queue_job(high_old.id).await.unwrap());
    let batch = db.list_pending_queue_jobs(8).await.unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0].id, high_new.id);
}

#[tokio::test]
async fn test_queue_batch_respects_limit() {
    let db = setup_database().await;
    for i in 0..12 {
        db.create_queue_job(&queue_request(
            "alice",
            &format!("https://example.com/{i}"),
            0,
        ))
        .await
        .unwrap();
    }

    let batch = db.list_pending_queue_jobs(8).await.unwrap();
    assert_eq!(batch.len(), 8);
}

#[tokio::test]
async fn test_stats_reset_happens_once_per_date_change() {
    let db = setup_database().await;

    db.apply_stats_delta(5, 2).await.unwrap();
    let stats = db.read_stats().await.unwrap();
    assert_eq!(stats.processed_today, 5);
    assert_eq!(stats.failed_today, 2);

    // Same date: no reset
    let today = Utc::now().date_naive();
    assert!(!db.reset_stats_if_stale(today).await.unwrap());
    let stats = db.read_stats().await.unwrap();
    assert_eq!(stats.processed_today, 5);

    // Date change: reset applies exactly once
    let tomorrow = today + Duration::days(1);
    assert!(db.reset_stats_if_stale(tomorrow).await.unwrap());
    assert!(!db.reset_stats_if_stale(tomorrow).await.unwrap());

    let stats = db.read_stats().await.unwrap();
    assert_eq!(stats.processed_today, 0);
    assert_eq!(stats.failed_today, 0);
    assert_eq!(stats.last_reset_date, tomorrow);
}

#[tokio::test]
async fn test_token_upsert_keeps_single_row_per_account() {
    let db = setup_database().await;
    let expires = Utc::now() + Duration::hours(1);

    db.save_token("alice", "acct-1", "token-a", "refresh-a", expires)
        .await
        .unwrap();
    db.save_token("alice", "acct-1", "token-b", "refresh-b", expires)
        .await
        .unwrap();

    let token = db.get_token("alice", "acct-1").await.unwrap().unwrap();
    assert_eq!(token.access_token, "token-b");
    assert_eq!(token.refresh_token, "refresh-b");
    assert!(token.is_valid);
}

#[tokio::test]
async fn test_default_token_skips_invalidated_accounts() {
    let db = setup_database().await;
    let expires = Utc::now() + Duration::hours(1);

    db.save_token("alice", "acct-1", "token-1", "refresh-1", expires)
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    db.save_token("alice", "acct-2", "token-2", "refresh-2", expires)
        .await
        .unwrap();

    // Earliest valid account wins
    let token = db.get_default_token("alice").await.unwrap().unwrap();
    assert_eq!(token.account_id, "acct-1");

    db.invalidate_token("alice", "acct-1", "refresh rejected: HTTP 400")
        .await
        .unwrap();

    let token = db.get_default_token("alice").await.unwrap().unwrap();
    assert_eq!(token.account_id, "acct-2");

    let invalid = db.get_token("alice", "acct-1").await.unwrap().unwrap();
    assert!(!invalid.is_valid);
    assert!(invalid.last_network_error.is_some());
}

#[tokio::test]
async fn test_audit_entries_are_recorded_newest_first() {
    let db = setup_database().await;
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();

    db.append_audit_entry(first, "alice", Some("https://example.com/1"), JobStatus::Completed, None)
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    db.append_audit_entry(second, "alice", None, JobStatus::Failed, Some("no valid token"))
        .await
        .unwrap();

    let entries = db.list_recent_audit_entries(10).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].job_id, second);
    assert_eq!(entries[0].status, JobStatus::Failed);
    assert_eq!(entries[1].job_id, first);
    assert_eq!(entries[1].result_ref.as_deref(), Some("https://example.com/1"));
}

#[tokio::test]
async fn test_owner_filter_on_listings() {
    let db = setup_database().await;

    db.create_publish_job(&publish_request("alice")).await.unwrap();
    db.create_publish_job(&publish_request("bob")).await.unwrap();
    db.create_queue_job(&queue_request("alice", "https://example.com/a", 0))
        .await
        .unwrap();

    let alice_jobs = db.list_publish_jobs(Some("alice")).await.unwrap();
    assert_eq!(alice_jobs.len(), 1);
    assert_eq!(alice_jobs[0].owner, "alice");

    let all_jobs = db.list_publish_jobs(None).await.unwrap();
    assert_eq!(all_jobs.len(), 2);

    let bob_queue = db.list_queue_jobs(Some("bob")).await.unwrap();
    assert!(bob_queue.is_empty());
}
