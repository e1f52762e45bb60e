pub mod encode;
pub mod processor;
pub mod render;

pub use encode::*;
pub use processor::*;
pub use render::*;

use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("PDFium library unavailable: {0}")]
    RendererInit(String),

    #[error("failed to open PDF: {0}")]
    PdfLoad(String),

    #[error("PDF is password-protected")]
    PdfEncrypted,

    #[error("no pages could be rendered from the PDF")]
    NoPagesExtracted,

    #[error("all {failed} pages failed OCR")]
    NoPagesSucceeded { failed: usize },

    #[error("image encoding failed: {0}")]
    Encoding(String),

    #[error("page worker crashed: {0}")]
    WorkerPanic(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}
