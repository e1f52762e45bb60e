//! Prescription analysis agent.
//!
//! One schema-constrained model call over the document's full text, then
//! local post-processing: lenient projection of each medication entry and
//! deterministic end-date computation.

use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::Value;
use tracing::{info, warn};

use super::dates::{compute_end_date, parse_date_lenient};
use super::{parse_json_response, value_to_page_number, value_to_text, AnalysisError, PageText};
use crate::llm::ModelGateway;

pub const PRESCRIPTION_SYSTEM_PROMPT: &str =
    "You are a medical prescription analyzer. Extract structured information from prescriptions.";

/// One medication as extracted and post-processed. Everything but the name
/// is optional: absent or unparseable fields degrade to `None`.
#[derive(Debug, Clone)]
pub struct MedicationFinding {
    pub name: String,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub start_date: Option<NaiveDate>,
    /// Normalized duration (trimmed, lowercase).
    pub duration: Option<String>,
    /// The duration exactly as the model returned it.
    pub duration_raw: Option<String>,
    /// Computed locally from start date + duration.
    pub end_date: Option<NaiveDate>,
    pub instructions: Option<String>,
    pub page_number: Option<i64>,
}

pub struct PrescriptionAgent {
    gateway: Arc<ModelGateway>,
}

impl PrescriptionAgent {
    pub fn new(gateway: Arc<ModelGateway>) -> Self {
        Self { gateway }
    }

    /// Extract the medications described across the given pages.
    ///
    /// A response that is not a JSON object with a `medications` array is a
    /// `SchemaViolation`; individual entries without a usable name are
    /// skipped rather than failing the call.
    pub async fn analyze(&self, pages: &[PageText]) -> Result<Vec<MedicationFinding>, AnalysisError> {
        if pages.is_empty() {
            return Err(AnalysisError::NoPageText);
        }

        let prompt = build_prescription_prompt(pages);
        let response = self
            .gateway
            .complete_json(PRESCRIPTION_SYSTEM_PROMPT, &prompt)
            .await?;

        let value = parse_json_response(&response)?;
        let medications = value
            .get("medications")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                AnalysisError::SchemaViolation("missing \"medications\" array".into())
            })?;

        let mut findings = Vec::new();
        for item in medications {
            match project_medication(item) {
                Some(finding) => findings.push(finding),
                None => warn!("Skipping medication entry without a name"),
            }
        }

        info!(medications = findings.len(), "Prescription analysis complete");
        Ok(findings)
    }
}

fn build_prescription_prompt(pages: &[PageText]) -> String {
    let pages_info = serde_json::to_string_pretty(pages).unwrap_or_default();
    let full_text = pages
        .iter()
        .map(|p| p.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Analyze this prescription and return ONLY a JSON object with this exact structure:
{{
    "medications": [
        {{
            "name": "medication name",
            "dosage": "dosage information",
            "frequency": "how often to take",
            "start_date": "YYYY-MM-DD format",
            "duration": "duration in format: X days/weeks/months",
            "instructions": "additional instructions",
            "page_number": "page number where this medication was found (integer)"
        }}
    ]
}}

For each medication you find, determine which page it appears on from this page information:
{pages_info}

Prescription text:
{full_text}"#
    )
}

/// Project one medication entry field-by-field. `None` only when the entry
/// has no usable name.
fn project_medication(item: &Value) -> Option<MedicationFinding> {
    let name = item.get("name").and_then(value_to_text)?;

    let start_date_raw = field_text(item, "start_date");
    let duration_raw = field_text(item, "duration");

    let end_date = match (&start_date_raw, &duration_raw) {
        (Some(start), Some(duration)) => compute_end_date(start, duration),
        _ => None,
    };

    Some(MedicationFinding {
        name,
        dosage: field_text(item, "dosage"),
        frequency: field_text(item, "frequency"),
        start_date: start_date_raw.as_deref().and_then(parse_date_lenient),
        duration: duration_raw.as_ref().map(|d| d.trim().to_lowercase()),
        duration_raw,
        end_date,
        instructions: field_text(item, "instructions"),
        page_number: item.get("page_number").and_then(value_to_page_number),
    })
}

fn field_text(item: &Value, key: &str) -> Option<String> {
    item.get(key).and_then(value_to_text)
}
