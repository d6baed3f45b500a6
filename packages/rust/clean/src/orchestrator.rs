//! Enrichment orchestrator: applies deterministic enrichers unconditionally
//! and the inference-backed table conditionally to one deduplicated record.

use tracing::debug;

use contactscrub_inference::InferenceClient;
use contactscrub_shared::Record;

use crate::enrichers::{ai_enrichers, email_is_valid, normalize_name, normalize_response};

/// One enriched record plus its degradation marker.
#[derive(Debug)]
pub struct EnrichedRecord {
    /// Field-superset of the input record.
    pub record: Record,
    /// Inference-backed fields that received a non-empty value from an
    /// actual backend response.
    pub inference_fields_populated: u64,
}

/// Enrich one record, returning a new record with derived fields attached.
///
/// Deterministic fields are always computed. Inference-backed fields are
/// attached only when the client is enabled at the moment this record is
/// processed; once the circuit trips, later records carry only the
/// deterministic fields — an intentional partial-degradation outcome, not a
/// failure. Records are enriched strictly sequentially within a job, so the
/// table's field order resolves the department→persona dependency.
pub async fn enrich_record(record: &Record, client: &InferenceClient) -> EnrichedRecord {
    let mut enriched = record.clone();

    let email_valid = email_is_valid(record.get("email"));
    enriched.set("email_valid", if email_valid { "true" } else { "false" });
    enriched.set("name_normalized", normalize_name(record.get("name")));

    let mut populated = 0;
    if client.is_enabled() {
        for enricher in ai_enrichers() {
            let value = match (enricher.prompt)(&enriched) {
                // Empty required input: nothing to infer, no wasted call.
                None => enricher.empty_default.to_string(),
                Some(prompt) => {
                    let raw = client.infer(&prompt).await;
                    let value = normalize_response(&raw, enricher.shape);
                    if !value.is_empty() {
                        populated += 1;
                    }
                    value
                }
            };
            enriched.set(enricher.field, value);
        }
    } else {
        debug!("inference disabled; attaching deterministic fields only");
    }

    EnrichedRecord {
        record: enriched,
        inference_fields_populated: populated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use contactscrub_inference::InferenceConfig;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record(pairs: &[(&str, &str)]) -> Record {
        pairs.iter().copied().collect()
    }

    fn client_for(server_url: &str, api_key: Option<&str>) -> InferenceClient {
        InferenceClient::new(InferenceConfig {
            api_key: api_key.map(String::from),
            base_url: server_url.to_string(),
            model: "test-model".into(),
            timeout: Duration::from_secs(5),
        })
        .expect("client")
    }

    fn completion_body(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })
    }

    #[tokio::test]
    async fn disabled_client_attaches_deterministic_fields_only() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("x")))
            .expect(0)
            .mount(&server)
            .await;

        let input = record(&[
            ("name", "ada lovelace"),
            ("email", "ada@example.com"),
            ("note", "Asked for pricing"),
        ]);
        let client = client_for(&server.uri(), None);
        let enriched = enrich_record(&input, &client).await;

        assert_eq!(enriched.record.get("name_normalized"), "Ada Lovelace");
        assert_eq!(enriched.record.get("email_valid"), "true");
        assert!(!enriched.record.contains("sentiment"));
        assert!(!enriched.record.contains("intent"));
        assert_eq!(enriched.inference_fields_populated, 0);
        assert_eq!(enriched.record.len(), input.len() + 2);
    }

    #[tokio::test]
    async fn empty_inputs_cause_zero_backend_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("x")))
            .expect(0)
            .mount(&server)
            .await;

        // Every inference input (note, job_title, company, ...) is empty, so
        // every enricher falls back to its default without a call.
        let input = record(&[("name", ""), ("email", ""), ("note", ""), ("job_title", "")]);
        let client = client_for(&server.uri(), Some("sk-test"));
        let enriched = enrich_record(&input, &client).await;

        assert_eq!(enriched.record.get("intent"), "Other");
        assert_eq!(enriched.record.get("timezone"), "Unknown");
        assert_eq!(enriched.record.get("email_type"), "Unknown");
        assert_eq!(enriched.record.get("churn_risk"), "Unknown");
        assert_eq!(enriched.record.get("note_summary"), "");
        assert!(enriched.record.contains("note_summary"));
        assert_eq!(enriched.record.get("sentiment"), "");
        // Defaults are not backend-populated fields.
        assert_eq!(enriched.inference_fields_populated, 0);
        assert!(client.is_enabled());
    }

    #[tokio::test]
    async fn enabled_client_attaches_inference_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Engineering")))
            .mount(&server)
            .await;

        let input = record(&[
            ("name", "grace hopper"),
            ("email", "grace@navy.mil"),
            ("job_title", "Rear Admiral"),
            ("note", "Wants a demo next week"),
        ]);
        let client = client_for(&server.uri(), Some("sk-test"));
        let enriched = enrich_record(&input, &client).await;

        // Free-text fields keep the response verbatim.
        assert_eq!(enriched.record.get("department"), "Engineering");
        assert_eq!(enriched.record.get("note_summary"), "Engineering");
        // Closed-set fields reject a non-member answer.
        assert_eq!(enriched.record.get("sentiment"), "Unknown");
        assert_eq!(enriched.record.get("meeting_date"), "None");
        // Bool-shaped name_valid cannot use "Engineering".
        assert_eq!(enriched.record.get("name_valid"), "");
        assert!(enriched.inference_fields_populated > 0);

        // The input record is a strict field-subset of the enriched one.
        for (name, value) in input.iter() {
            assert_eq!(enriched.record.get(name), value);
        }
    }

    #[tokio::test]
    async fn backend_rejection_degrades_mid_record() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let input = record(&[
            ("name", "ada lovelace"),
            ("job_title", "Analyst"),
            ("note", "Call back Monday"),
        ]);
        let client = client_for(&server.uri(), Some("sk-bad"));
        let enriched = enrich_record(&input, &client).await;

        // The first prompt trips the circuit; every later field degrades to
        // its no-response value without further backend traffic.
        assert!(!client.is_enabled());
        assert_eq!(enriched.record.get("job_title_normalized"), "");
        assert_eq!(enriched.record.get("sentiment"), "");
        assert!(enriched.record.contains("churn_risk"));
        assert_eq!(enriched.record.get("name_normalized"), "Ada Lovelace");
    }
}
