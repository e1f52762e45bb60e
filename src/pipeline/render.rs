//! PDF page rendering via Google PDFium.
//!
//! Renders every page of a scanned document to an in-memory raster for
//! vision OCR. PDFium handles the PDF complexities that matter for medical
//! scans: CIDFont encodings, embedded fonts, form fields, transparency.
//!
//! `PdfiumRenderer` is stateless (`Send + Sync`). Each operation creates
//! a fresh `Pdfium` instance because the upstream type is `!Send`.
//! The OS caches `dlopen`/`LoadLibrary` calls, so repeat loads are near-free.

use image::{DynamicImage, GenericImageView};
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use super::PipelineError;

/// Maximum dimension (width or height) for rendered page images.
/// Prevents OOM on extremely large pages or absurd DPI settings.
const MAX_DIMENSION_PX: u32 = 4096;

/// Default rendering DPI: 2x the 72-point PDF unit grid. Enough detail for
/// vision OCR without inflating the request payload.
pub const DEFAULT_RENDER_DPI: u32 = 144;

/// PDF points per inch (standard PDF unit).
const POINTS_PER_INCH: f32 = 72.0;

/// One rendered page, numbered 1-based after unrenderable pages are
/// dropped, so numbering is always contiguous.
#[derive(Debug)]
pub struct RasterPage {
    pub page_number: u32,
    pub image: DynamicImage,
}

/// PDF rasterization abstraction (allows mocking)
pub trait PageRenderer: Send + Sync {
    /// Render every page of the document. Pages that fail to render or
    /// come out empty are skipped; zero surviving pages is an error.
    fn render_document(&self, pdf_bytes: &[u8]) -> Result<Vec<RasterPage>, PipelineError>;
}

/// Renders PDF pages with Google PDFium at a fixed DPI.
pub struct PdfiumRenderer {
    dpi: u32,
}

impl PdfiumRenderer {
    /// Create a renderer, verifying the PDFium library is loadable
    /// (fail-fast at construction).
    pub fn new() -> Result<Self, PipelineError> {
        let _ = load_pdfium()?;
        Ok(Self {
            dpi: DEFAULT_RENDER_DPI,
        })
    }

    pub fn with_dpi(dpi: u32) -> Result<Self, PipelineError> {
        let _ = load_pdfium()?;
        Ok(Self { dpi })
    }
}

impl PageRenderer for PdfiumRenderer {
    fn render_document(&self, pdf_bytes: &[u8]) -> Result<Vec<RasterPage>, PipelineError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;

        let mut images: Vec<DynamicImage> = Vec::new();

        for (index, page) in document.pages().iter().enumerate() {
            let (target_w, target_h) =
                compute_render_dimensions(page.width().value, page.height().value, self.dpi);

            let config = PdfRenderConfig::new()
                .set_target_width(target_w as i32)
                .set_maximum_height(target_h as i32);

            match page.render_with_config(&config) {
                Ok(bitmap) => {
                    let image = bitmap.as_image();
                    if image.width() == 0 || image.height() == 0 {
                        warn!(page = index + 1, "Rendered page is empty, skipping");
                        continue;
                    }
                    debug!(
                        page = index + 1,
                        width = image.width(),
                        height = image.height(),
                        "Rendered PDF page"
                    );
                    images.push(image);
                }
                Err(e) => {
                    warn!(page = index + 1, error = %e, "Failed to render page, skipping");
                    continue;
                }
            }
        }

        // Document handle (and the PDFium instance) released here,
        // success or partial failure alike.
        drop(document);

        if images.is_empty() {
            return Err(PipelineError::NoPagesExtracted);
        }

        Ok(images
            .into_iter()
            .enumerate()
            .map(|(i, image)| RasterPage {
                page_number: (i + 1) as u32,
                image,
            })
            .collect())
    }
}

/// Load the PDFium dynamic library.
///
/// Discovery order:
/// 1. `PDFIUM_DYNAMIC_LIB_PATH` env var (explicit path to library file)
/// 2. Alongside the running executable
/// 3. System library search paths
fn load_pdfium() -> Result<Pdfium, PipelineError> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        debug!(path = %path, "Loading PDFium from env var");
        let bindings = Pdfium::bind_to_library(&path).map_err(|e| {
            PipelineError::RendererInit(format!("Failed to load PDFium from {path}: {e}"))
        })?;
        return Ok(Pdfium::new(bindings));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(exe_dir) = exe.parent() {
            let lib_path =
                Pdfium::pdfium_platform_library_name_at_path(exe_dir.to_string_lossy().as_ref());
            if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
                debug!(dir = %exe_dir.display(), "Loaded PDFium from executable directory");
                return Ok(Pdfium::new(bindings));
            }
        }
    }

    let bindings = Pdfium::bind_to_system_library().map_err(|e| {
        PipelineError::RendererInit(format!(
            "PDFium library not found. Set PDFIUM_DYNAMIC_LIB_PATH or install PDFium: {e}"
        ))
    })?;
    Ok(Pdfium::new(bindings))
}

/// Map PDF load errors — detect encrypted PDFs for clearer messaging.
fn map_load_error(e: PdfiumError) -> PipelineError {
    let msg = format!("{e}");
    if load_error_is_encrypted(&msg) {
        PipelineError::PdfEncrypted
    } else {
        PipelineError::PdfLoad(msg)
    }
}

fn load_error_is_encrypted(msg: &str) -> bool {
    let lower = msg.to_lowercase();
    lower.contains("password") || lower.contains("encrypt")
}

/// Compute pixel dimensions for rendering, applying the dimension guard.
///
/// Returns (width_px, height_px), both clamped to [1, MAX_DIMENSION_PX].
/// Preserves aspect ratio when capping.
fn compute_render_dimensions(width_points: f32, height_points: f32, dpi: u32) -> (u32, u32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let raw_w = (width_points * scale).max(1.0);
    let raw_h = (height_points * scale).max(1.0);

    let max_dim = raw_w.max(raw_h);
    if max_dim > MAX_DIMENSION_PX as f32 {
        let ratio = MAX_DIMENSION_PX as f32 / max_dim;
        let w = ((raw_w * ratio) as u32).max(1).min(MAX_DIMENSION_PX);
        let h = ((raw_h * ratio) as u32).max(1).min(MAX_DIMENSION_PX);
        (w, h)
    } else {
        (raw_w as u32, raw_h as u32)
    }
}

// ── Mock for testing ──────────────────────────────────────

/// Mock page renderer returning a tiny solid raster per page.
///
/// Used by pipeline and service tests that need a PageRenderer without
/// the actual PDFium binary.
pub struct MockPageRenderer {
    page_count: usize,
    fail_load: bool,
}

impl MockPageRenderer {
    pub fn new(page_count: usize) -> Self {
        Self {
            page_count,
            fail_load: false,
        }
    }

    /// A renderer whose document always fails to open.
    pub fn failing() -> Self {
        Self {
            page_count: 0,
            fail_load: true,
        }
    }
}

impl PageRenderer for MockPageRenderer {
    fn render_document(&self, _pdf_bytes: &[u8]) -> Result<Vec<RasterPage>, PipelineError> {
        if self.fail_load {
            return Err(PipelineError::PdfLoad("mock load failure".into()));
        }
        if self.page_count == 0 {
            return Err(PipelineError::NoPagesExtracted);
        }
        Ok((1..=self.page_count)
            .map(|n| RasterPage {
                page_number: n as u32,
                image: DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
                    4,
                    4,
                    image::Rgb([255u8, 255, 255]),
                )),
            })
            .collect())
    }
}
