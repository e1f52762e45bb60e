use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Derived category-based summary; at most one per document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: Uuid,
    pub document_id: Uuid,
    pub analysis_date: NaiveDateTime,
}

/// One extracted field value belonging to a document summary.
///
/// `field` always belongs to the field set of `category` in the extraction
/// template that was active when the summary was produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryExtraction {
    pub id: Uuid,
    pub summary_id: Uuid,
    pub category: String,
    pub field: String,
    pub value: String,
    pub page_number: Option<i64>,
    pub associated_date: Option<NaiveDate>,
    pub extraction_date: NaiveDateTime,
}
