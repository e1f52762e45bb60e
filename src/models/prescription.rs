use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Derived prescription analysis; at most one per document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptionAnalysis {
    pub id: Uuid,
    pub document_id: Uuid,
    pub analysis_date: NaiveDateTime,
}

/// One medication extracted from a prescription.
///
/// Only `name` is required. The model may omit anything else, and date
/// parsing failures degrade to `None` rather than failing the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Medication {
    pub id: Uuid,
    pub analysis_id: Uuid,
    pub name: String,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub start_date: Option<NaiveDate>,
    /// Normalized duration (trimmed, lowercase), e.g. "10 days".
    pub duration: Option<String>,
    /// The duration string exactly as the model returned it.
    pub duration_raw: Option<String>,
    /// Computed from `start_date` + `duration`, never asked of the model.
    pub end_date: Option<NaiveDate>,
    pub instructions: Option<String>,
    pub page_number: Option<i64>,
}
