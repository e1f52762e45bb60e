use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A scanned source document. Immutable once all pages are processed,
/// except for the append of derived analyses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub filename: String,
    pub upload_date: NaiveDateTime,
    pub total_pages: i64,
}

/// One page of a document: OCR text plus the encoded page image.
///
/// Page numbers are 1-based and contiguous within a document; a page whose
/// OCR failed still gets a row, with `content` holding an error marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: Uuid,
    pub document_id: Uuid,
    pub page_number: i64,
    pub content: String,
    /// Base64-encoded PNG of the rendered page.
    pub image_data: Option<String>,
}
