//! Field enrichers: deterministic string functions and the table of
//! inference-backed derived fields.
//!
//! Each inference-backed field is one table entry carrying its prompt
//! builder, the value used when a required input is empty (no backend call
//! is made for incomplete records), and the expected response shape used to
//! post-validate whatever the backend returns. Adding or removing a field
//! means editing the table, not the orchestrator.

use std::sync::LazyLock;

use regex::Regex;

use contactscrub_shared::Record;

// ---------------------------------------------------------------------------
// Deterministic enrichers
// ---------------------------------------------------------------------------

/// Capitalize each whitespace-separated token of a name.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(token: &str) -> String {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

/// Syntactic validity check against the standard address grammar.
pub fn email_is_valid(email: &str) -> bool {
    static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
        // addr-spec approximation: dot-atom local part, dotted domain with a TLD
        Regex::new(
            r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$",
        )
        .expect("valid regex")
    });
    EMAIL_RE.is_match(email.trim())
}

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

/// Expected shape of a backend response, used to post-validate it instead of
/// trusting free text verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// Short free text, kept verbatim after trimming.
    Free,
    /// One of a closed label set; non-members fall back to `"Unknown"`.
    Label(&'static [&'static str]),
    /// A yes/no answer, mapped to `"true"`/`"false"`; unusable answers map
    /// to the empty string.
    Bool,
    /// An ISO date (`YYYY-MM-DD`) or `"None"`.
    IsoDate,
}

/// Map a non-empty backend response onto its expected shape.
///
/// An empty response (disabled capability or per-call failure) stays empty
/// so degraded fields remain distinguishable from validated ones.
pub fn normalize_response(raw: &str, shape: ResponseShape) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    match shape {
        ResponseShape::Free => trimmed.to_string(),
        ResponseShape::Label(labels) => {
            let candidate = trimmed.trim_matches(|c: char| "\"'.`!".contains(c)).trim();
            labels
                .iter()
                .find(|label| label_matches(label, candidate))
                .map(|label| (*label).to_string())
                .unwrap_or_else(|| "Unknown".to_string())
        }
        ResponseShape::Bool => {
            let lower = trimmed.to_lowercase();
            if lower.starts_with('y') {
                "true".to_string()
            } else if lower.starts_with('n') {
                "false".to_string()
            } else {
                String::new()
            }
        }
        ResponseShape::IsoDate => {
            static DATE_RE: LazyLock<Regex> =
                LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid regex"));
            if DATE_RE.is_match(trimmed) {
                trimmed.to_string()
            } else {
                "None".to_string()
            }
        }
    }
}

/// Case-insensitive label match, tolerating answers that drop a label's
/// parenthetical (e.g. `Small` for `Small (1-50)`).
fn label_matches(label: &str, candidate: &str) -> bool {
    if label.eq_ignore_ascii_case(candidate) {
        return true;
    }
    match (label.split_whitespace().next(), candidate.split_whitespace().next()) {
        (Some(l), Some(c)) => l.eq_ignore_ascii_case(c),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Inference-backed field table
// ---------------------------------------------------------------------------

/// One inference-backed derived field.
pub struct AiEnricher {
    /// Name of the derived field attached to the record.
    pub field: &'static str,
    /// Expected response shape for post-validation.
    pub shape: ResponseShape,
    /// Value used when a required input is empty; the backend is not called.
    pub empty_default: &'static str,
    /// Build the prompt from the (partially enriched) record, or `None` when
    /// a required input is empty.
    pub prompt: fn(&Record) -> Option<String>,
}

/// All inference-backed fields, in application order.
///
/// Order matters in exactly one place: `department` precedes `persona`,
/// whose prompt reads the already-attached department value.
pub fn ai_enrichers() -> &'static [AiEnricher] {
    &AI_ENRICHERS
}

static AI_ENRICHERS: [AiEnricher; 27] = [
    AiEnricher {
        field: "job_title_normalized",
        shape: ResponseShape::Free,
        empty_default: "",
        prompt: |r| {
            let title = nonempty(r, "job_title")?;
            Some(format!(
                "Normalize this job title: '{title}'. Only return the cleaned job title."
            ))
        },
    },
    AiEnricher {
        field: "company_normalized",
        shape: ResponseShape::Free,
        empty_default: "",
        prompt: |r| {
            let company = nonempty(r, "company")?;
            Some(format!(
                "Clean and standardize this company name: '{company}'. Only return the corrected name."
            ))
        },
    },
    AiEnricher {
        field: "department",
        shape: ResponseShape::Free,
        empty_default: "",
        prompt: |r| {
            let title = nonempty(r, "job_title")?;
            let name = r.get("name");
            Some(format!(
                "Guess the department of a person named '{name}' with the title '{title}'. Only return the department."
            ))
        },
    },
    AiEnricher {
        field: "intent",
        shape: ResponseShape::Label(&["Inquiry", "Complaint", "Follow-up", "Unsubscribe", "Other"]),
        empty_default: "Other",
        prompt: |r| {
            let note = nonempty(r, "note")?;
            Some(format!(
                "What is the intent of this CRM note: '{note}'? Return only one of: Inquiry, Complaint, Follow-up, Unsubscribe, Other."
            ))
        },
    },
    AiEnricher {
        field: "name_valid",
        shape: ResponseShape::Bool,
        empty_default: "",
        prompt: |r| {
            let name = nonempty(r, "name")?;
            Some(format!(
                "Is '{name}' a valid full name? Reply only with 'yes' or 'no'."
            ))
        },
    },
    AiEnricher {
        field: "note_summary",
        shape: ResponseShape::Free,
        empty_default: "",
        prompt: |r| {
            let note = nonempty(r, "note")?;
            Some(format!("Rephrase this CRM note professionally: '{note}'"))
        },
    },
    AiEnricher {
        field: "note_language",
        shape: ResponseShape::Free,
        empty_default: "",
        prompt: |r| {
            let note = nonempty(r, "note")?;
            Some(format!(
                "What language is this text written in: '{note}'? Return only the language name."
            ))
        },
    },
    AiEnricher {
        field: "note_translated",
        shape: ResponseShape::Free,
        empty_default: "",
        prompt: |r| {
            let note = nonempty(r, "note")?;
            Some(format!("Translate this to English: '{note}'"))
        },
    },
    AiEnricher {
        field: "seniority",
        shape: ResponseShape::Label(&["Entry-level", "Mid", "Senior", "Executive", "Unknown"]),
        empty_default: "",
        prompt: |r| {
            let title = nonempty(r, "job_title")?;
            Some(format!(
                "What is the seniority level in this job title: '{title}'? Reply with one of: Entry-level, Mid, Senior, Executive, Unknown."
            ))
        },
    },
    AiEnricher {
        field: "industry",
        shape: ResponseShape::Free,
        empty_default: "",
        prompt: |r| {
            let company = nonempty(r, "company")?;
            let title = r.get("job_title");
            Some(format!(
                "Based on the company name '{company}' and job title '{title}', what is the likely industry? Return a single industry name like 'Healthcare', 'Tech', 'Finance', etc."
            ))
        },
    },
    AiEnricher {
        field: "phone_cleaned",
        shape: ResponseShape::Free,
        empty_default: "",
        prompt: |r| {
            let phone = nonempty(r, "phone")?;
            Some(format!(
                "Standardize this phone number: '{phone}'. Use international E.164 format if possible. Only return the cleaned number."
            ))
        },
    },
    AiEnricher {
        field: "location",
        shape: ResponseShape::Free,
        empty_default: "",
        prompt: |r| {
            let note = nonempty(r, "note")?;
            Some(format!(
                "Extract the geographic location (e.g., city or country) mentioned in this CRM note: '{note}'. Return only the location or 'Unknown'."
            ))
        },
    },
    AiEnricher {
        field: "next_action",
        shape: ResponseShape::Free,
        empty_default: "",
        prompt: |r| {
            let note = nonempty(r, "note")?;
            Some(format!(
                "Based on this CRM note: '{note}', suggest a follow-up action (e.g., Call, Email, Close, Escalate). Return only the suggested action."
            ))
        },
    },
    AiEnricher {
        field: "lead_stage",
        shape: ResponseShape::Label(&["Cold", "Warm", "Hot", "Closed", "Nurturing"]),
        empty_default: "",
        prompt: |r| {
            let note = nonempty(r, "note")?;
            let title = r.get("job_title");
            Some(format!(
                "Given the note: '{note}', and job title: '{title}', classify the lead stage. Reply with one of: Cold, Warm, Hot, Closed, Nurturing."
            ))
        },
    },
    AiEnricher {
        field: "persona",
        shape: ResponseShape::Label(&[
            "Decision Maker",
            "Influencer",
            "Champion",
            "Gatekeeper",
            "User",
            "Unknown",
        ]),
        empty_default: "",
        prompt: |r| {
            let title = nonempty(r, "job_title")?;
            // Reads the department attached earlier in table order.
            let department = r.get("department");
            let company_size = r.get("company_size_guess");
            Some(format!(
                "What buyer persona does this describe? Title: '{title}', Department: '{department}', Company size: '{company_size}'. Return one persona like 'Decision Maker', 'Influencer', 'Champion', 'Gatekeeper', 'User', or 'Unknown'."
            ))
        },
    },
    AiEnricher {
        field: "lead_quality",
        shape: ResponseShape::Label(&["High", "Medium", "Low"]),
        empty_default: "",
        prompt: |r| {
            let title = nonempty(r, "job_title")?;
            let company = r.get("company");
            let note = r.get("note");
            Some(format!(
                "Based on job title '{title}', company '{company}', and CRM note '{note}', how would you rate the lead quality? Reply with: High, Medium, or Low."
            ))
        },
    },
    AiEnricher {
        field: "meeting_date",
        shape: ResponseShape::IsoDate,
        empty_default: "",
        prompt: |r| {
            let note = nonempty(r, "note")?;
            Some(format!(
                "Does this note contain a meeting or call date? If yes, extract the date in ISO format (YYYY-MM-DD), otherwise return 'None'. Note: '{note}'"
            ))
        },
    },
    AiEnricher {
        field: "sentiment",
        shape: ResponseShape::Label(&["Positive", "Neutral", "Negative"]),
        empty_default: "",
        prompt: |r| {
            let note = nonempty(r, "note")?;
            Some(format!(
                "What is the sentiment of this CRM note: '{note}'? Return: Positive, Neutral, or Negative."
            ))
        },
    },
    AiEnricher {
        field: "interest",
        shape: ResponseShape::Free,
        empty_default: "",
        prompt: |r| {
            let note = nonempty(r, "note")?;
            Some(format!(
                "Based on this CRM note: '{note}', what product or service is the person showing interest in? Return a short answer like 'CRM software', 'Pricing plan', 'Training', or 'Unknown'."
            ))
        },
    },
    AiEnricher {
        field: "skills",
        shape: ResponseShape::Free,
        empty_default: "",
        prompt: |r| {
            let note = nonempty(r, "note")?;
            Some(format!(
                "What job-related skills or keywords are mentioned or implied in this note: '{note}'? Return a comma-separated list of 1-5 concise skills."
            ))
        },
    },
    AiEnricher {
        field: "email_type",
        shape: ResponseShape::Label(&["Corporate", "Personal"]),
        empty_default: "Unknown",
        prompt: |r| {
            let email = nonempty(r, "email")?;
            Some(format!(
                "Is this email address '{email}' corporate or personal? Reply with: Corporate or Personal."
            ))
        },
    },
    AiEnricher {
        field: "company_size_guess",
        shape: ResponseShape::Label(&["Small (1-50)", "Medium (51-500)", "Large (500+)", "Unknown"]),
        empty_default: "Unknown",
        prompt: |r| {
            let company = nonempty(r, "company")?;
            Some(format!(
                "Based on the company name '{company}', what is the most likely size? Reply with: Small (1-50), Medium (51-500), Large (500+), or Unknown."
            ))
        },
    },
    AiEnricher {
        field: "hiring_intent",
        shape: ResponseShape::Label(&["Yes", "No", "Unclear"]),
        empty_default: "Unknown",
        prompt: |r| {
            let note = nonempty(r, "note")?;
            let title = r.get("job_title");
            Some(format!(
                "Does this CRM note and job title indicate a potential hiring or recruitment need? Note: '{note}', Title: '{title}'. Reply with: Yes, No, or Unclear."
            ))
        },
    },
    AiEnricher {
        field: "churn_risk",
        shape: ResponseShape::Label(&["High", "Medium", "Low"]),
        empty_default: "Unknown",
        prompt: |r| {
            let note = nonempty(r, "note")?;
            Some(format!(
                "Based on this note, how likely is this contact to stop engaging with us or churn? Note: '{note}'. Reply with: High, Medium, Low."
            ))
        },
    },
    AiEnricher {
        field: "geo_match",
        shape: ResponseShape::Label(&["Likely", "Unlikely", "Unknown"]),
        empty_default: "Unknown",
        prompt: |r| {
            let company = nonempty(r, "company")?;
            let city = nonempty(r, "city")?;
            Some(format!(
                "Is it common or expected for the company '{company}' to operate in the city '{city}'? Reply with: Likely, Unlikely, or Unknown."
            ))
        },
    },
    AiEnricher {
        field: "domain_category",
        shape: ResponseShape::Free,
        empty_default: "Unknown",
        prompt: |r| {
            let website = nonempty(r, "website")?;
            Some(format!(
                "What is the category or industry of this website: '{website}'? Return a single word like 'Tech', 'Retail', 'Education', etc."
            ))
        },
    },
    AiEnricher {
        field: "timezone",
        shape: ResponseShape::Free,
        empty_default: "Unknown",
        prompt: |r| {
            let city = nonempty(r, "city")?;
            Some(format!(
                "What is the time zone for the city '{city}'? Return only the time zone name like 'PST', 'EST', 'CET', etc."
            ))
        },
    },
];

/// A required input: `None` when the field is empty, so the enricher can
/// fall back to its default without a backend call.
fn nonempty<'a>(record: &'a Record, field: &str) -> Option<&'a str> {
    let value = record.get(field).trim();
    if value.is_empty() { None } else { Some(value) }
}
