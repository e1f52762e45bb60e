//! Field-extraction template: versioned categories of expected fields.
//!
//! The template is external configuration (a JSON document maintained
//! alongside deployment config), read once and passed into the summary
//! agent's constructor, never loaded behind its back.

use serde::{Deserialize, Serialize};

/// Template version the summary agent currently understands. Categories
/// tagged with any other version are ignored.
pub const SUPPORTED_TEMPLATE_VERSION: &str = "1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateField {
    #[serde(rename = "Field")]
    pub field: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Example")]
    pub example: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateCategory {
    pub category: String,
    #[serde(default = "default_template_version")]
    pub version: String,
    pub fields: Vec<TemplateField>,
}

fn default_template_version() -> String {
    SUPPORTED_TEMPLATE_VERSION.to_string()
}

impl TemplateCategory {
    /// Field-name membership is exact and case-sensitive; the prompt
    /// instructs the model to use the listed names verbatim.
    pub fn contains_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.field == name)
    }
}

/// The whole category→field-list document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractionTemplate {
    pub categories: Vec<TemplateCategory>,
}

impl ExtractionTemplate {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Categories tagged with the given version, in template order.
    pub fn supported_categories<'a>(
        &'a self,
        version: &'a str,
    ) -> impl Iterator<Item = &'a TemplateCategory> {
        self.categories.iter().filter(move |c| c.version == version)
    }
}
