//! End-to-end job pipeline: source file → snapshot → dedupe → enrich → store.
//!
//! Drives one cleaning job through its lifecycle
//! (`pending → in_progress → {completed, failed}`). Job rows are mutated only
//! at stage boundaries; every unhandled error lands the job in `failed` with
//! a human-readable message. Already-written contact rows are never rolled
//! back — a failed job keeps its at-least-partial effects.

use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use contactscrub_clean::{deduplicate, enrich_record};
use contactscrub_inference::InferenceClient;
use contactscrub_shared::{ContactScrubError, JobId, JobStatus, JobSummary, Result};
use contactscrub_storage::Storage;

/// Result of a completed pipeline run.
#[derive(Debug)]
pub struct JobOutcome {
    /// The job that ran.
    pub job_id: JobId,
    /// Row count of the source table.
    pub total_rows: u64,
    /// Records that survived deduplication and were enriched.
    pub cleaned_rows: u64,
    /// Success summary, as persisted on the job.
    pub summary: JobSummary,
    /// Total elapsed time.
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each record is enriched and persisted.
    fn record_enriched(&self, current: usize, total: usize);
    /// Called when the pipeline completes.
    fn done(&self, outcome: &JobOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn record_enriched(&self, _current: usize, _total: usize) {}
    fn done(&self, _outcome: &JobOutcome) {}
}

/// Pipeline entry point, invoked once per dispatched job.
///
/// On error the job is marked `failed` with the error's display message and
/// the error still propagates to the caller. There are no retries at this
/// layer.
#[instrument(skip_all, fields(job_id = %job_id, source = %source_path.display()))]
pub async fn process_job(
    job_id: &JobId,
    source_path: &Path,
    storage: &Storage,
    client: &InferenceClient,
    progress: &dyn ProgressReporter,
) -> Result<JobOutcome> {
    match run_stages(job_id, source_path, storage, client, progress).await {
        Ok(outcome) => {
            progress.done(&outcome);
            info!(
                total_rows = outcome.total_rows,
                cleaned_rows = outcome.cleaned_rows,
                inference_fields_populated = outcome.summary.inference_fields_populated,
                inference_degraded = outcome.summary.inference_degraded,
                elapsed_ms = outcome.elapsed.as_millis(),
                "job completed"
            );
            Ok(outcome)
        }
        Err(e) => {
            let message = e.to_string();
            warn!(error = %message, "job failed");
            if let Err(store_err) = storage.fail_job(job_id, &message).await {
                warn!(error = %store_err, "could not record job failure");
            }
            Err(e)
        }
    }
}

async fn run_stages(
    job_id: &JobId,
    source_path: &Path,
    storage: &Storage,
    client: &InferenceClient,
    progress: &dyn ProgressReporter,
) -> Result<JobOutcome> {
    let start = Instant::now();

    let job = storage
        .get_job(job_id)
        .await?
        .ok_or_else(|| ContactScrubError::validation(format!("job {job_id} not found")))?;
    if job.status.is_terminal() {
        // Duplicate dispatch: harmless apart from duplicate cleaned rows.
        warn!(status = %job.status, "re-running a job already in a terminal status");
    }

    // --- Phase 1: Read source ---
    progress.phase("Reading source table");
    storage.set_job_status(job_id, JobStatus::InProgress).await?;

    let records = contactscrub_table::read_records(source_path)?;
    let total_rows = records.len() as u64;
    storage.set_job_total_rows(job_id, total_rows).await?;

    // --- Phase 2: Snapshot raw records ---
    // Durability checkpoint: every source row is persisted before cleaning.
    progress.phase("Snapshotting raw records");
    for (seq, record) in records.iter().enumerate() {
        storage.append_raw_contact(job_id, seq as u64, record).await?;
    }

    // --- Phase 3: Deduplicate ---
    progress.phase("Deduplicating");
    let deduped = deduplicate(&records);
    info!(
        input = records.len(),
        kept = deduped.len(),
        "deduplication complete"
    );

    // --- Phase 4: Enrich and persist ---
    progress.phase("Enriching records");
    let total = deduped.len();
    let mut populated = 0u64;
    for (seq, record) in deduped.iter().enumerate() {
        let enriched = enrich_record(record, client).await;
        populated += enriched.inference_fields_populated;
        storage
            .append_cleaned_contact(job_id, seq as u64, &enriched.record)
            .await?;
        progress.record_enriched(seq + 1, total);
    }

    // --- Phase 5: Complete ---
    progress.phase("Completing job");
    let summary = JobSummary {
        cleaned_rows: total as u64,
        inference_fields_populated: populated,
        inference_degraded: !client.is_enabled(),
    };
    storage
        .complete_job(job_id, summary.cleaned_rows, &summary)
        .await?;

    Ok(JobOutcome {
        job_id: job_id.clone(),
        total_rows,
        cleaned_rows: total as u64,
        summary,
        elapsed: start.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    use contactscrub_inference::InferenceConfig;
    use uuid::Uuid;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("cs_pipeline_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn write_source(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("cs_source_{}.csv", Uuid::now_v7()));
        std::fs::write(&path, contents).expect("write source");
        path
    }

    fn client_for(base_url: &str, api_key: Option<&str>) -> InferenceClient {
        InferenceClient::new(InferenceConfig {
            api_key: api_key.map(String::from),
            base_url: base_url.to_string(),
            model: "test-model".into(),
            timeout: Duration::from_secs(5),
        })
        .expect("client")
    }

    /// Client with the capability disabled from the start (no key configured).
    fn disabled_client() -> InferenceClient {
        client_for("http://127.0.0.1:9", None)
    }

    fn completion_body(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })
    }

    #[tokio::test]
    async fn dedupes_and_attaches_deterministic_fields() {
        let storage = test_storage().await;
        let source = write_source(
            "name,email\n\
             Ada Lovelace,ada@example.com\n\
             Ada L,ADA@Example.com\n\
             Grace Hopper,grace@example.com\n",
        );
        let client = disabled_client();
        let job = storage.create_job("contacts.csv").await.unwrap();

        let outcome = process_job(&job.id, &source, &storage, &client, &SilentProgress)
            .await
            .expect("pipeline");

        assert_eq!(outcome.total_rows, 3);
        assert_eq!(outcome.cleaned_rows, 2);

        let loaded = storage.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Completed);
        assert_eq!(loaded.total_rows, 3);
        assert_eq!(loaded.processed, 2);
        assert!(loaded.processed <= loaded.total_rows);
        assert!(loaded.error.is_none());

        let raw = storage.list_raw_contacts(&job.id).await.unwrap();
        assert_eq!(raw.len(), 3);

        let cleaned = storage.list_cleaned_contacts(&job.id).await.unwrap();
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned[0].get("name"), "Ada Lovelace");
        assert_eq!(cleaned[1].get("name"), "Grace Hopper");
        for record in &cleaned {
            assert_eq!(record.get("email_valid"), "true");
            assert!(!record.get("name_normalized").is_empty());
        }
    }

    #[tokio::test]
    async fn unreadable_source_fails_job_before_any_snapshot() {
        let storage = test_storage().await;
        let missing = std::env::temp_dir().join(format!("cs_missing_{}.csv", Uuid::now_v7()));
        let client = disabled_client();
        let job = storage.create_job("missing.csv").await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);

        let result = process_job(&job.id, &missing, &storage, &client, &SilentProgress).await;
        assert!(result.is_err());

        let loaded = storage.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Failed);
        assert!(!loaded.error.as_deref().unwrap_or("").is_empty());
        assert!(loaded.result.is_none());

        assert!(storage.list_raw_contacts(&job.id).await.unwrap().is_empty());
        assert!(storage.list_cleaned_contacts(&job.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn capability_disabled_from_start_completes_degraded() {
        let storage = test_storage().await;
        let source = write_source(
            "name,email,note\n\
             Ada Lovelace,ada@example.com,Asked for pricing\n\
             Grace Hopper,grace@example.com,Wants a demo\n",
        );
        let client = disabled_client();
        let job = storage.create_job("contacts.csv").await.unwrap();

        let outcome = process_job(&job.id, &source, &storage, &client, &SilentProgress)
            .await
            .expect("pipeline");

        // No duplicates, so every source row survives.
        assert_eq!(outcome.cleaned_rows, outcome.total_rows);
        assert!(outcome.summary.inference_degraded);
        assert_eq!(outcome.summary.inference_fields_populated, 0);

        let loaded = storage.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Completed);
        assert_eq!(loaded.processed, loaded.total_rows);

        // Cleaned rows carry only the deterministic fields.
        let cleaned = storage.list_cleaned_contacts(&job.id).await.unwrap();
        for record in &cleaned {
            assert!(record.contains("name_normalized"));
            assert!(record.contains("email_valid"));
            assert!(!record.contains("sentiment"));
            assert!(!record.contains("note_summary"));
        }
    }

    #[tokio::test]
    async fn backend_populates_inference_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Positive")))
            .mount(&server)
            .await;

        let storage = test_storage().await;
        let source = write_source(
            "name,email,note\nAda Lovelace,ada@example.com,Loved the onboarding call\n",
        );
        let client = client_for(&server.uri(), Some("sk-test"));
        let job = storage.create_job("contacts.csv").await.unwrap();

        let outcome = process_job(&job.id, &source, &storage, &client, &SilentProgress)
            .await
            .expect("pipeline");

        assert!(!outcome.summary.inference_degraded);
        assert!(outcome.summary.inference_fields_populated > 0);

        let cleaned = storage.list_cleaned_contacts(&job.id).await.unwrap();
        assert_eq!(cleaned[0].get("sentiment"), "Positive");
        assert_eq!(cleaned[0].get("note_summary"), "Positive");
    }

    #[tokio::test]
    async fn mid_job_circuit_trip_still_completes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .expect(1)
            .mount(&server)
            .await;

        let storage = test_storage().await;
        let source = write_source(
            "name,email,note\n\
             Ada Lovelace,ada@example.com,Asked for pricing\n\
             Grace Hopper,grace@example.com,Wants a demo\n",
        );
        let client = client_for(&server.uri(), Some("sk-test"));
        let job = storage.create_job("contacts.csv").await.unwrap();

        let outcome = process_job(&job.id, &source, &storage, &client, &SilentProgress)
            .await
            .expect("pipeline");

        // The first record's first prompt trips the circuit; the job still
        // completes, flagged as degraded.
        assert_eq!(outcome.cleaned_rows, 2);
        assert!(outcome.summary.inference_degraded);
        assert!(!client.is_enabled());

        let loaded = storage.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Completed);

        let cleaned = storage.list_cleaned_contacts(&job.id).await.unwrap();
        // First record was mid-enrichment when the circuit tripped: fields
        // attached but empty. Later records skip attachment entirely.
        assert!(cleaned[0].contains("sentiment"));
        assert_eq!(cleaned[0].get("sentiment"), "");
        assert!(!cleaned[1].contains("sentiment"));
    }

    #[tokio::test]
    async fn empty_source_completes_with_zero_rows() {
        let storage = test_storage().await;
        let source = write_source("name,email\n");
        let client = disabled_client();
        let job = storage.create_job("empty.csv").await.unwrap();

        let outcome = process_job(&job.id, &source, &storage, &client, &SilentProgress)
            .await
            .expect("pipeline");
        assert_eq!(outcome.total_rows, 0);
        assert_eq!(outcome.cleaned_rows, 0);

        let loaded = storage.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Completed);
    }
}
