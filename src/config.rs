use std::path::PathBuf;
use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "Medscribe";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default OCR prompt sent with every page image.
/// `{page}` is replaced with the 1-based page number.
pub const DEFAULT_OCR_PROMPT: &str = "Extract all text from this image of page {page}. \
     Return only the extracted text, no additional commentary.";

/// Get the application data directory
/// ~/Medscribe/ on all platforms (user-visible)
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join(APP_NAME)
}

/// Default SQLite database path
pub fn database_path() -> PathBuf {
    app_data_dir().join("medscribe.db")
}

pub fn default_log_filter() -> String {
    "info,medscribe=debug".to_string()
}

/// Backoff policy for rate-limited model calls.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Symmetric jitter fraction applied to each delay (0.10 = ±10%).
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 4,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            jitter: 0.10,
        }
    }
}

/// Everything the model gateway needs to talk to the provider.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_key: String,
    /// Vision model for page OCR.
    pub ocr_model: String,
    /// Text model for structured JSON extraction.
    pub extraction_model: String,
    /// Low sampling settings bias toward literal extraction over generation.
    pub temperature: f32,
    pub top_p: f32,
    /// Process-wide cap on in-flight model calls.
    pub max_concurrent_calls: usize,
    /// Minimum delay after each call before its capacity slot is released.
    pub call_delay: Duration,
    pub request_timeout: Duration,
    pub ocr_prompt: String,
    pub retry: RetryConfig,
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            ocr_model: "pixtral-large-latest".to_string(),
            extraction_model: "mistral-large-latest".to_string(),
            temperature: 0.1,
            top_p: 0.1,
            max_concurrent_calls: 2,
            call_delay: Duration::from_secs(1),
            request_timeout: Duration::from_secs(120),
            ocr_prompt: DEFAULT_OCR_PROMPT.to_string(),
            retry: RetryConfig::default(),
        }
    }

    /// Build from `MEDSCRIBE_API_URL` / `MEDSCRIBE_API_KEY`, with an optional
    /// `MEDSCRIBE_CALL_DELAY_MS` override. Returns None if the key is unset.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("MEDSCRIBE_API_KEY").ok()?;
        let base_url = std::env::var("MEDSCRIBE_API_URL")
            .unwrap_or_else(|_| "https://api.mistral.ai".to_string());

        let mut config = Self::new(base_url, api_key);
        config.call_delay = delay_from_env("MEDSCRIBE_CALL_DELAY_MS", 1000);
        Some(config)
    }
}

/// Get delay from environment variable, with default fallback.
fn delay_from_env(env_var: &str, default_ms: u64) -> Duration {
    std::env::var(env_var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_millis(default_ms))
}
