//! Page Pipeline: fans a document's pages out to the model gateway under a
//! bounded worker pool and persists each page as soon as it completes.
//!
//! Completion order is arbitrary; page numbers are assigned before dispatch
//! and each page row commits before the next completion is handled, so a
//! crash loses at most the in-flight pages. A page whose OCR call fails is
//! still recorded with an error marker, keeping page numbers contiguous.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use super::encode::encode_page_image;
use super::render::{PageRenderer, RasterPage};
use super::PipelineError;
use crate::db::repository;
use crate::llm::ModelGateway;
use crate::models::{Document, Page};

/// Per-page result in a processing run. Partial success is first-class:
/// callers always get the full tally.
#[derive(Debug, Clone, Serialize)]
pub struct PageOutcome {
    pub page_number: u32,
    pub content: String,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutcome {
    pub document_id: Uuid,
    pub total_pages: usize,
    pub pages: Vec<PageOutcome>,
    pub success_count: usize,
}

pub struct PagePipeline {
    renderer: Arc<dyn PageRenderer>,
    gateway: Arc<ModelGateway>,
}

impl PagePipeline {
    pub fn new(renderer: Arc<dyn PageRenderer>, gateway: Arc<ModelGateway>) -> Self {
        Self { renderer, gateway }
    }

    /// Rasterize, OCR, and persist every page of one document.
    pub async fn process(
        &self,
        conn: &Connection,
        pdf_bytes: Vec<u8>,
        filename: &str,
    ) -> Result<ProcessOutcome, PipelineError> {
        // Rasterize once, off the async runtime.
        let renderer = Arc::clone(&self.renderer);
        let rasters = tokio::task::spawn_blocking(move || renderer.render_document(&pdf_bytes))
            .await
            .map_err(|e| PipelineError::WorkerPanic(e.to_string()))??;

        let total_pages = rasters.len();
        let document = Document {
            id: Uuid::new_v4(),
            filename: filename.to_string(),
            upload_date: Utc::now().naive_utc(),
            total_pages: total_pages as i64,
        };
        repository::insert_document(conn, &document)?;
        info!(
            document_id = %document.id,
            total_pages,
            "Document registered, dispatching page OCR"
        );

        let worker_cap = self.gateway.concurrency().max(1);
        let mut queue = rasters.into_iter();
        let mut workers: JoinSet<PageWork> = JoinSet::new();
        let mut outcomes: Vec<PageOutcome> = Vec::with_capacity(total_pages);

        loop {
            while workers.len() < worker_cap {
                let Some(raster) = queue.next() else { break };
                workers.spawn(ocr_page(Arc::clone(&self.gateway), raster));
            }

            let Some(joined) = workers.join_next().await else {
                break;
            };
            let work = joined.map_err(|e| PipelineError::WorkerPanic(e.to_string()))?;

            // One insert, one implicit transaction, committed before the
            // next completion is processed.
            let page = Page {
                id: Uuid::new_v4(),
                document_id: document.id,
                page_number: work.page_number as i64,
                content: work.content.clone(),
                image_data: work.image_data,
            };
            repository::insert_page(conn, &page)?;

            outcomes.push(PageOutcome {
                page_number: work.page_number,
                content: work.content,
                success: work.success,
            });
        }

        let success_count = outcomes.iter().filter(|o| o.success).count();
        if success_count == 0 {
            warn!(document_id = %document.id, failed = total_pages, "Every page failed OCR");
            return Err(PipelineError::NoPagesSucceeded {
                failed: total_pages,
            });
        }

        outcomes.sort_by_key(|o| o.page_number);
        info!(
            document_id = %document.id,
            success_count,
            total_pages,
            "Document processing complete"
        );

        Ok(ProcessOutcome {
            document_id: document.id,
            total_pages,
            pages: outcomes,
            success_count,
        })
    }
}

struct PageWork {
    page_number: u32,
    content: String,
    image_data: Option<String>,
    success: bool,
}

/// OCR one page. Never returns an error: failures become error-marker
/// content so the page row still gets written.
async fn ocr_page(gateway: Arc<ModelGateway>, raster: RasterPage) -> PageWork {
    let page_number = raster.page_number;

    let image = raster.image;
    let encoded = match tokio::task::spawn_blocking(move || encode_page_image(&image)).await {
        Ok(Ok(encoded)) => encoded,
        Ok(Err(e)) => {
            warn!(page = page_number, error = %e, "Page image encoding failed");
            return PageWork {
                page_number,
                content: format!("Error processing page {page_number}: {e}"),
                image_data: None,
                success: false,
            };
        }
        Err(e) => {
            warn!(page = page_number, error = %e, "Page encode task crashed");
            return PageWork {
                page_number,
                content: format!("Error processing page {page_number}: {e}"),
                image_data: None,
                success: false,
            };
        }
    };

    match gateway.extract_page_text(&encoded, page_number).await {
        Ok(text) => PageWork {
            page_number,
            content: text,
            image_data: Some(encoded),
            success: true,
        },
        Err(e) => {
            warn!(page = page_number, error = %e, "Page OCR failed");
            PageWork {
                page_number,
                content: format!("Error processing page {page_number}: {e}"),
                image_data: Some(encoded),
                success: false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GatewayConfig, RetryConfig};
    use crate::db::sqlite::open_memory_database;
    use crate::llm::{GatewayError, MockModelClient, ModelClient, RateLimiter};
    use crate::pipeline::render::MockPageRenderer;
    use std::time::Duration;

    fn test_gateway(mock: Arc<MockModelClient>) -> Arc<ModelGateway> {
        let mut config = GatewayConfig::new("http://localhost:9", "test-key");
        config.call_delay = Duration::ZERO;
        config.retry = RetryConfig {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            jitter: 0.0,
        };
        Arc::new(ModelGateway::new(
            mock as Arc<dyn ModelClient>,
            Arc::new(RateLimiter::unthrottled()),
            config,
        ))
    }

    fn pipeline(pages: usize, mock: Arc<MockModelClient>) -> PagePipeline {
        PagePipeline::new(
            Arc::new(MockPageRenderer::new(pages)),
            test_gateway(mock),
        )
    }

    #[tokio::test]
    async fn processes_all_pages() {
        let conn = open_memory_database().unwrap();
        let mock = Arc::new(MockModelClient::new("extracted text"));
        let pipe = pipeline(3, Arc::clone(&mock));

        let outcome = pipe.process(&conn, vec![1, 2, 3], "scan.pdf").await.unwrap();

        assert_eq!(outcome.total_pages, 3);
        assert_eq!(outcome.success_count, 3);
        let numbers: Vec<u32> = outcome.pages.iter().map(|p| p.page_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(mock.call_count(), 3);

        let pages = repository::get_pages(&conn, &outcome.document_id).unwrap();
        assert_eq!(pages.len(), 3);
        assert!(pages.iter().all(|p| p.content == "extracted text"));
        assert!(pages.iter().all(|p| p.image_data.is_some()));

        let doc = repository::get_document(&conn, &outcome.document_id).unwrap();
        assert_eq!(doc.total_pages, 3);
        assert_eq!(doc.filename, "scan.pdf");
    }

    #[tokio::test]
    async fn partial_failure_is_success_with_tally() {
        let conn = open_memory_database().unwrap();
        let mock = Arc::new(MockModelClient::new("good text"));
        // One non-retryable failure; the mock serves it to whichever worker
        // calls first. The tally is what matters, not which page fails.
        mock.push_response(Err(GatewayError::Api {
            status: 500,
            body: "boom".into(),
        }));
        let pipe = pipeline(3, Arc::clone(&mock));

        let outcome = pipe.process(&conn, vec![], "scan.pdf").await.unwrap();

        assert_eq!(outcome.success_count, 2);
        assert_eq!(outcome.pages.len(), 3);
        let failed: Vec<_> = outcome.pages.iter().filter(|p| !p.success).collect();
        assert_eq!(failed.len(), 1);
        assert!(failed[0]
            .content
            .starts_with(&format!("Error processing page {}", failed[0].page_number)));

        // Failed page is still recorded, so contiguity holds
        let pages = repository::get_pages(&conn, &outcome.document_id).unwrap();
        let numbers: Vec<i64> = pages.iter().map(|p| p.page_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn all_pages_failed_is_fatal() {
        let conn = open_memory_database().unwrap();
        let mock = Arc::new(MockModelClient::new("unused"));
        for _ in 0..2 {
            mock.push_response(Err(GatewayError::Api {
                status: 500,
                body: "down".into(),
            }));
        }
        let pipe = pipeline(2, Arc::clone(&mock));

        let err = pipe.process(&conn, vec![], "scan.pdf").await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::NoPagesSucceeded { failed: 2 }
        ));

        // Pages were still persisted with error markers before the failure
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM pages", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn unrenderable_pdf_writes_nothing() {
        let conn = open_memory_database().unwrap();
        let mock = Arc::new(MockModelClient::new("unused"));
        let pipe = PagePipeline::new(
            Arc::new(MockPageRenderer::new(0)),
            test_gateway(Arc::clone(&mock)),
        );

        let err = pipe.process(&conn, vec![], "empty.pdf").await.unwrap_err();
        assert!(matches!(err, PipelineError::NoPagesExtracted));
        assert_eq!(mock.call_count(), 0);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0, "no document row for an unrenderable PDF");
    }

    #[tokio::test]
    async fn rate_limited_page_retries_and_succeeds() {
        let conn = open_memory_database().unwrap();
        let mock = Arc::new(MockModelClient::new("recovered text"));
        mock.push_response(Err(GatewayError::RateLimited("429".into())));
        let pipe = pipeline(1, Arc::clone(&mock));

        let outcome = pipe.process(&conn, vec![], "scan.pdf").await.unwrap();
        assert_eq!(outcome.success_count, 1);
        assert_eq!(outcome.pages[0].content, "recovered text");
        assert_eq!(mock.call_count(), 2, "one rate-limited call plus one retry");
    }

    #[tokio::test]
    async fn load_failure_propagates() {
        let conn = open_memory_database().unwrap();
        let mock = Arc::new(MockModelClient::new("unused"));
        let pipe = PagePipeline::new(
            Arc::new(MockPageRenderer::failing()),
            test_gateway(mock),
        );

        let err = pipe.process(&conn, vec![], "bad.pdf").await.unwrap_err();
        assert!(matches!(err, PipelineError::PdfLoad(_)));
    }

    #[tokio::test]
    async fn many_pages_with_small_worker_pool() {
        // Worker cap is 2 (gateway concurrency); 7 pages must still all land.
        let conn = open_memory_database().unwrap();
        let mock = Arc::new(MockModelClient::new("text"));
        let pipe = pipeline(7, Arc::clone(&mock));

        let outcome = pipe.process(&conn, vec![], "long.pdf").await.unwrap();
        assert_eq!(outcome.success_count, 7);
        let numbers: Vec<u32> = outcome.pages.iter().map(|p| p.page_number).collect();
        assert_eq!(numbers, (1..=7).collect::<Vec<u32>>());
    }
}
