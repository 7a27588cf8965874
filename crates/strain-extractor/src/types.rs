//! Core types: extraction request, output record, and errors.

use serde::{Deserialize, Serialize};

/// Slug used when the caller does not name a strain.
pub const DEFAULT_SLUG: &str = "blue-dream";

/// A request to extract one strain, identified by its slug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    slug: String,
}

impl ExtractionRequest {
    /// Create a request. The slug must be non-empty; nothing else is checked.
    pub fn new(slug: impl Into<String>) -> ExtractResult<Self> {
        let slug = slug.into();
        if slug.is_empty() {
            return Err(ExtractError::InvalidRequest(
                "strain slug must not be empty".to_string(),
            ));
        }
        Ok(Self { slug })
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// The product page for this strain: `<base>/strains/<slug>`.
    pub fn target_url(&self, base_url: &str) -> String {
        format!("{}/strains/{}", base_url.trim_end_matches('/'), self.slug)
    }
}

/// Normalized strain details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrainRecord {
    /// Display name; falls back to the request slug.
    pub name: String,
    /// Strain category (e.g. "Hybrid").
    #[serde(rename = "type")]
    pub kind: String,
    /// Formatted THC level (e.g. "18%").
    pub thc: String,
    pub description: String,
    /// Primary effect labels, in payload order.
    pub effects: Vec<String>,
    /// The page the record was extracted from.
    pub url: String,
}

/// Errors that can occur during an extraction.
#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// A matching response body was not valid JSON. Reported, never terminal.
    #[error("Malformed payload from {url}: {source}")]
    PayloadDecode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("No strain data captured from {url}")]
    MissingData { url: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type ExtractResult<T> = Result<T, ExtractError>;
