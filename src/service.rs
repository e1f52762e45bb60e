//! The surface the surrounding web/CRUD layer calls.
//!
//! Owns the page pipeline and both analysis agents. Analyses are
//! idempotent at the document level: an existing stored analysis is
//! returned verbatim without touching the model.

use std::sync::Arc;

use base64::Engine as _;
use chrono::{NaiveDateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::agents::{
    AnalysisError, ExtractionTemplate, PageText, PrescriptionAgent, SummaryAgent,
};
use crate::config::GatewayConfig;
use crate::db::{repository, DatabaseError};
use crate::llm::{HttpModelClient, ModelClient, ModelGateway, RateLimiter};
use crate::models::{
    Document, DocumentSummary, Medication, Page, PrescriptionAnalysis, SummaryExtraction,
};
use crate::pipeline::{PagePipeline, PdfiumRenderer, PipelineError, ProcessOutcome};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("invalid upload: {0}")]
    InvalidFile(String),

    #[error("stored page image is corrupt: {0}")]
    CorruptImage(String),

    #[error("page {page_number} of document {document_id} has no stored image")]
    NoPageImage {
        document_id: Uuid,
        page_number: i64,
    },

    #[error("Processing failed: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Stored prescription analysis, as returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct PrescriptionReport {
    pub analysis_id: Uuid,
    pub document_id: Uuid,
    pub analysis_date: NaiveDateTime,
    pub medications: Vec<Medication>,
}

/// Stored summary, as returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryReport {
    pub summary_id: Uuid,
    pub document_id: Uuid,
    pub analysis_date: NaiveDateTime,
    pub extractions: Vec<SummaryExtraction>,
}

pub struct DocumentService {
    pipeline: PagePipeline,
    prescription: PrescriptionAgent,
    summary: SummaryAgent,
}

impl DocumentService {
    pub fn new(
        pipeline: PagePipeline,
        prescription: PrescriptionAgent,
        summary: SummaryAgent,
    ) -> Self {
        Self {
            pipeline,
            prescription,
            summary,
        }
    }

    /// Wire the production stack: PDFium renderer, HTTP model client, one
    /// shared rate limiter. Create one service per process so every
    /// document shares the same capacity budget.
    pub fn from_config(
        config: GatewayConfig,
        template: ExtractionTemplate,
    ) -> Result<Self, PipelineError> {
        let limiter = Arc::new(RateLimiter::new(
            config.max_concurrent_calls,
            config.call_delay,
        ));
        let client: Arc<dyn ModelClient> = Arc::new(HttpModelClient::new(&config));
        let gateway = Arc::new(ModelGateway::new(client, limiter, config));
        let renderer = Arc::new(PdfiumRenderer::new()?);

        Ok(Self::new(
            PagePipeline::new(renderer, Arc::clone(&gateway)),
            PrescriptionAgent::new(Arc::clone(&gateway)),
            SummaryAgent::new(gateway, template),
        ))
    }

    /// Ingest one uploaded PDF: rasterize, OCR, persist pages.
    pub async fn process_document(
        &self,
        conn: &Connection,
        pdf_bytes: Vec<u8>,
        filename: &str,
    ) -> Result<ProcessOutcome, ServiceError> {
        if filename.trim().is_empty() {
            return Err(ServiceError::InvalidFile("no file selected".into()));
        }
        if !filename.to_lowercase().ends_with(".pdf") {
            return Err(ServiceError::InvalidFile("file must be a PDF".into()));
        }

        Ok(self.pipeline.process(conn, pdf_bytes, filename).await?)
    }

    /// Analyze a document's prescription. At most once per document: a
    /// pre-existing analysis short-circuits without a model call.
    pub async fn analyze_prescription(
        &self,
        conn: &mut Connection,
        document_id: &Uuid,
    ) -> Result<PrescriptionReport, ServiceError> {
        if let Some((analysis, medications)) = repository::get_prescription(conn, document_id)? {
            info!(document_id = %document_id, "Returning stored prescription analysis");
            return Ok(PrescriptionReport {
                analysis_id: analysis.id,
                document_id: analysis.document_id,
                analysis_date: analysis.analysis_date,
                medications,
            });
        }

        let pages = load_page_text(conn, document_id)?;
        let findings = self.prescription.analyze(&pages).await?;

        let analysis = PrescriptionAnalysis {
            id: Uuid::new_v4(),
            document_id: *document_id,
            analysis_date: Utc::now().naive_utc(),
        };
        let medications: Vec<Medication> = findings
            .into_iter()
            .map(|f| Medication {
                id: Uuid::new_v4(),
                analysis_id: analysis.id,
                name: f.name,
                dosage: f.dosage,
                frequency: f.frequency,
                start_date: f.start_date,
                duration: f.duration,
                duration_raw: f.duration_raw,
                end_date: f.end_date,
                instructions: f.instructions,
                page_number: f.page_number,
            })
            .collect();

        repository::insert_prescription(conn, &analysis, &medications)?;

        Ok(PrescriptionReport {
            analysis_id: analysis.id,
            document_id: *document_id,
            analysis_date: analysis.analysis_date,
            medications,
        })
    }

    /// Analyze a document against the extraction template. Same at-most-once
    /// behavior as prescriptions.
    pub async fn analyze_summary(
        &self,
        conn: &mut Connection,
        document_id: &Uuid,
    ) -> Result<SummaryReport, ServiceError> {
        if let Some((summary, extractions)) = repository::get_summary(conn, document_id)? {
            info!(document_id = %document_id, "Returning stored summary");
            return Ok(SummaryReport {
                summary_id: summary.id,
                document_id: summary.document_id,
                analysis_date: summary.analysis_date,
                extractions,
            });
        }

        let pages = load_page_text(conn, document_id)?;
        let batch = self.summary.analyze(&pages).await?;

        let summary = DocumentSummary {
            id: Uuid::new_v4(),
            document_id: *document_id,
            analysis_date: batch.extracted_at,
        };
        let extractions: Vec<SummaryExtraction> = batch
            .findings
            .into_iter()
            .map(|f| SummaryExtraction {
                id: Uuid::new_v4(),
                summary_id: summary.id,
                category: f.category,
                field: f.field,
                value: f.value,
                page_number: f.page_number,
                associated_date: f.associated_date,
                extraction_date: batch.extracted_at,
            })
            .collect();

        repository::insert_summary(conn, &summary, &extractions)?;

        Ok(SummaryReport {
            summary_id: summary.id,
            document_id: *document_id,
            analysis_date: summary.analysis_date,
            extractions,
        })
    }

    pub fn list_documents(&self, conn: &Connection) -> Result<Vec<Document>, ServiceError> {
        Ok(repository::list_documents(conn)?)
    }

    pub fn get_document(
        &self,
        conn: &Connection,
        document_id: &Uuid,
    ) -> Result<(Document, Vec<Page>), ServiceError> {
        let document = repository::get_document(conn, document_id)?;
        let pages = repository::get_pages(conn, document_id)?;
        Ok((document, pages))
    }

    /// Delete a document; pages and analyses cascade with it.
    pub fn delete_document(
        &self,
        conn: &Connection,
        document_id: &Uuid,
    ) -> Result<(), ServiceError> {
        Ok(repository::delete_document(conn, document_id)?)
    }

    /// Delete a document's summary so it can be re-analyzed.
    pub fn delete_summary(
        &self,
        conn: &Connection,
        document_id: &Uuid,
    ) -> Result<bool, ServiceError> {
        Ok(repository::delete_summary(conn, document_id)?)
    }

    /// Decode a page's stored image back to PNG bytes. Tolerates a
    /// data-URL prefix in the stored payload.
    pub fn page_image_png(
        &self,
        conn: &Connection,
        document_id: &Uuid,
        page_number: i64,
    ) -> Result<Vec<u8>, ServiceError> {
        let page = repository::get_page(conn, document_id, page_number)?;
        let Some(image_data) = page.image_data else {
            return Err(ServiceError::NoPageImage {
                document_id: *document_id,
                page_number,
            });
        };

        let encoded = image_data
            .split_once(',')
            .map_or(image_data.as_str(), |(_, rest)| rest);

        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| ServiceError::CorruptImage(e.to_string()))
    }
}

fn load_page_text(conn: &Connection, document_id: &Uuid) -> Result<Vec<PageText>, ServiceError> {
    // Surface a NotFound for unknown documents before asking for pages
    repository::get_document(conn, document_id)?;
    let pages = repository::get_pages(conn, document_id)?;
    Ok(pages
        .into_iter()
        .map(|p| PageText {
            page_number: p.page_number,
            content: p.content,
        })
        .collect())
}
