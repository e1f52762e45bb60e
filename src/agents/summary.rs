//! Category-based summary agent.
//!
//! One model call per supported template category. Categories fail
//! independently: a model error or malformed response skips that category
//! and the rest still run.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::dates::parse_date_lenient;
use super::template::{ExtractionTemplate, TemplateCategory, SUPPORTED_TEMPLATE_VERSION};
use super::{parse_json_response, value_to_page_number, value_to_text, AnalysisError, PageText};
use crate::llm::ModelGateway;

pub const SUMMARY_SYSTEM_PROMPT: &str =
    "You are a medical document analyzer. Extract structured information from medical documents.";

/// One surviving extraction item.
#[derive(Debug, Clone)]
pub struct SummaryFinding {
    pub category: String,
    pub field: String,
    pub value: String,
    pub page_number: Option<i64>,
    pub associated_date: Option<NaiveDate>,
}

/// All categories' surviving items plus the batch timestamp.
#[derive(Debug, Clone)]
pub struct SummaryBatch {
    pub findings: Vec<SummaryFinding>,
    pub extracted_at: NaiveDateTime,
}

pub struct SummaryAgent {
    gateway: Arc<ModelGateway>,
    template: ExtractionTemplate,
    template_version: String,
}

impl SummaryAgent {
    pub fn new(gateway: Arc<ModelGateway>, template: ExtractionTemplate) -> Self {
        Self {
            gateway,
            template,
            template_version: SUPPORTED_TEMPLATE_VERSION.to_string(),
        }
    }

    /// Run every supported category over the document text.
    pub async fn analyze(&self, pages: &[PageText]) -> Result<SummaryBatch, AnalysisError> {
        if pages.is_empty() {
            return Err(AnalysisError::NoPageText);
        }

        let tagged_text = page_tagged_text(pages);
        let pages_info = serde_json::to_string_pretty(pages).unwrap_or_default();

        let mut findings = Vec::new();
        for category in self.template.supported_categories(&self.template_version) {
            let prompt = build_category_prompt(category, &tagged_text, &pages_info);

            let response = match self
                .gateway
                .complete_json(SUMMARY_SYSTEM_PROMPT, &prompt)
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    warn!(category = %category.category, error = %e, "Category call failed, skipping");
                    continue;
                }
            };

            let value = match parse_json_response(&response) {
                Ok(value) => value,
                Err(e) => {
                    warn!(category = %category.category, error = %e, "Category response unparseable, skipping");
                    continue;
                }
            };

            let Some(items) = as_extraction_array(&value) else {
                warn!(category = %category.category, "Category response is not a JSON array, skipping");
                continue;
            };

            let before = findings.len();
            for item in items {
                if let Some(finding) = project_finding(category, item) {
                    findings.push(finding);
                }
            }
            debug!(
                category = %category.category,
                kept = findings.len() - before,
                returned = items.len(),
                "Category processed"
            );
        }

        info!(extractions = findings.len(), "Summary analysis complete");
        Ok(SummaryBatch {
            findings,
            extracted_at: Utc::now().naive_utc(),
        })
    }
}

/// The document text with explicit page boundaries, so the model can
/// attribute findings to pages.
fn page_tagged_text(pages: &[PageText]) -> String {
    pages
        .iter()
        .map(|p| {
            format!(
                "[PAGE {n} START]\n{content}\n[PAGE {n} END]",
                n = p.page_number,
                content = p.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn build_category_prompt(
    category: &TemplateCategory,
    tagged_text: &str,
    pages_info: &str,
) -> String {
    let fields_description = category
        .fields
        .iter()
        .map(|f| format!("- {}: {} (Example: {})", f.field, f.description, f.example))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Analyze this medical document and extract information according to these fields:

{fields_description}

Use the field names above verbatim; they are case-sensitive. Never invent field names that are not listed. If you cannot find a field's value with confidence, omit it entirely rather than guessing.

Document content (each page bracketed by its page markers):
{tagged_text}

For each piece of information you find, determine which page it appears on from this page information:
{pages_info}

Return ONLY a JSON array using this structure:
[
    {{
        "field": "Field Name",
        "value": "Extracted Value",
        "page_number": page_number,
        "associated_date": "YYYY-MM-DD" // if applicable
    }}
]"#
    )
}

/// Accept a bare array, or an object wrapping one under "extractions"
/// (json-object response modes cannot always emit a top-level array).
fn as_extraction_array(value: &Value) -> Option<&Vec<Value>> {
    value
        .as_array()
        .or_else(|| value.get("extractions").and_then(Value::as_array))
}

/// Validate and normalize one returned item. `None` drops the item:
/// no value, or a field name outside the category's template set.
fn project_finding(category: &TemplateCategory, item: &Value) -> Option<SummaryFinding> {
    let field = item.get("field").and_then(Value::as_str)?.to_string();
    if !category.contains_field(&field) {
        debug!(category = %category.category, field = %field, "Dropping unknown field name");
        return None;
    }

    let value = item.get("value").and_then(value_to_text)?;

    Some(SummaryFinding {
        category: category.category.clone(),
        field,
        value,
        page_number: item.get("page_number").and_then(value_to_page_number),
        associated_date: item
            .get("associated_date")
            .and_then(Value::as_str)
            .and_then(parse_date_lenient),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::llm::{GatewayError, MockModelClient, ModelClient, RateLimiter};
    use std::time::Duration;

    const TEMPLATE: &str = r#"[
        {
            "category": "Patient Information",
            "version": "1",
            "fields": [
                {"Field": "Patient Name", "Description": "Full name of the patient", "Example": "Jane Doe"},
                {"Field": "Date of Birth", "Description": "Patient's date of birth", "Example": "1975-04-12"}
            ]
        },
        {
            "category": "Allergies",
            "version": "1",
            "fields": [
                {"Field": "Allergen", "Description": "Substance the patient reacts to", "Example": "Penicillin"}
            ]
        },
        {
            "category": "Legacy Section",
            "version": "0",
            "fields": [
                {"Field": "Old Field", "Description": "No longer extracted", "Example": "n/a"}
            ]
        }
    ]"#;

    fn agent(mock: Arc<MockModelClient>) -> SummaryAgent {
        let mut config = GatewayConfig::new("http://localhost:9", "test-key");
        config.call_delay = Duration::ZERO;
        let gateway = Arc::new(ModelGateway::new(
            mock as Arc<dyn ModelClient>,
            Arc::new(RateLimiter::unthrottled()),
            config,
        ));
        SummaryAgent::new(gateway, ExtractionTemplate::from_json(TEMPLATE).unwrap())
    }

    fn pages() -> Vec<PageText> {
        vec![
            PageText {
                page_number: 1,
                content: "Patient: Jane Doe, born 1975-04-12".into(),
            },
            PageText {
                page_number: 2,
                content: "Known allergy to penicillin since 2010".into(),
            },
        ]
    }

    #[tokio::test]
    async fn one_call_per_supported_category() {
        let mock = Arc::new(MockModelClient::new("[]"));
        let batch = agent(Arc::clone(&mock)).analyze(&pages()).await.unwrap();
        assert!(batch.findings.is_empty());
        // Two v1 categories; the v0 category must not trigger a call
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn collects_findings_across_categories() {
        let mock = Arc::new(MockModelClient::new("[]"));
        mock.push_response(Ok(r#"[
            {"field": "Patient Name", "value": "Jane Doe", "page_number": 1},
            {"field": "Date of Birth", "value": "1975-04-12", "page_number": 1, "associated_date": "1975-04-12"}
        ]"#
        .into()));
        mock.push_response(Ok(r#"[
            {"field": "Allergen", "value": "Penicillin", "page_number": 2, "associated_date": "2010"}
        ]"#
        .into()));

        let batch = agent(mock).analyze(&pages()).await.unwrap();
        assert_eq!(batch.findings.len(), 3);

        assert_eq!(batch.findings[0].category, "Patient Information");
        assert_eq!(batch.findings[0].field, "Patient Name");
        assert_eq!(batch.findings[0].value, "Jane Doe");
        assert_eq!(batch.findings[0].page_number, Some(1));

        assert_eq!(
            batch.findings[1].associated_date,
            NaiveDate::from_ymd_opt(1975, 4, 12)
        );

        let allergen = &batch.findings[2];
        assert_eq!(allergen.category, "Allergies");
        assert!(
            allergen.associated_date.is_none(),
            "unparseable date dropped, item kept"
        );
    }

    #[tokio::test]
    async fn unknown_fields_and_empty_values_dropped() {
        let mock = Arc::new(MockModelClient::new("[]"));
        mock.push_response(Ok(r#"[
            {"field": "Patient Name", "value": "Jane Doe"},
            {"field": "patient name", "value": "case mismatch"},
            {"field": "Invented Field", "value": "hallucinated"},
            {"field": "Date of Birth", "value": ""},
            {"field": "Date of Birth"}
        ]"#
        .into()));

        let batch = agent(mock).analyze(&pages()).await.unwrap();
        assert_eq!(batch.findings.len(), 1);
        assert_eq!(batch.findings[0].field, "Patient Name");
    }

    #[tokio::test]
    async fn composite_values_are_serialized() {
        let mock = Arc::new(MockModelClient::new("[]"));
        mock.push_response(Ok(r#"[
            {"field": "Patient Name", "value": ["Jane", "Doe"]}
        ]"#
        .into()));

        let batch = agent(mock).analyze(&pages()).await.unwrap();
        assert_eq!(batch.findings[0].value, r#"["Jane","Doe"]"#);
    }

    #[tokio::test]
    async fn failed_category_skipped_others_survive() {
        let mock = Arc::new(MockModelClient::new("[]"));
        mock.push_response(Err(GatewayError::Api {
            status: 500,
            body: "broken".into(),
        }));
        mock.push_response(Ok(
            r#"[{"field": "Allergen", "value": "Penicillin"}]"#.into()
        ));

        let batch = agent(Arc::clone(&mock)).analyze(&pages()).await.unwrap();
        assert_eq!(batch.findings.len(), 1);
        assert_eq!(batch.findings[0].category, "Allergies");
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn malformed_category_json_skipped() {
        let mock = Arc::new(MockModelClient::new("[]"));
        mock.push_response(Ok("no json at all".into()));
        mock.push_response(Ok(
            r#"[{"field": "Allergen", "value": "Penicillin"}]"#.into()
        ));

        let batch = agent(mock).analyze(&pages()).await.unwrap();
        assert_eq!(batch.findings.len(), 1);
    }

    #[tokio::test]
    async fn object_wrapped_array_accepted() {
        let mock = Arc::new(MockModelClient::new("[]"));
        mock.push_response(Ok(
            r#"{"extractions": [{"field": "Patient Name", "value": "Jane Doe"}]}"#.into(),
        ));

        let batch = agent(mock).analyze(&pages()).await.unwrap();
        assert_eq!(batch.findings.len(), 1);
    }

    #[tokio::test]
    async fn prompt_lists_fields_and_tags_pages() {
        let mock = Arc::new(MockModelClient::new("[]"));
        agent(Arc::clone(&mock)).analyze(&pages()).await.unwrap();

        let requests = mock.requests();
        let first = serde_json::to_value(&requests[0]).unwrap();
        let user = first["messages"][1]["content"].as_str().unwrap();
        assert!(user.contains("- Patient Name: Full name of the patient (Example: Jane Doe)"));
        assert!(user.contains("[PAGE 1 START]"));
        assert!(user.contains("[PAGE 2 END]"));
        assert!(user.contains("case-sensitive"));
        assert!(
            !user.contains("Allergen"),
            "prompt must list only that category's fields"
        );
    }

    #[tokio::test]
    async fn empty_pages_is_no_page_text() {
        let mock = Arc::new(MockModelClient::new("[]"));
        let err = agent(Arc::clone(&mock)).analyze(&[]).await.unwrap_err();
        assert!(matches!(err, AnalysisError::NoPageText));
        assert_eq!(mock.call_count(), 0);
    }
}
