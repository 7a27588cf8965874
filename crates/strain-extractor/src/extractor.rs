//! The extraction entry point: session, capture, normalize.

use crate::config::ExtractorConfig;
use crate::normalize::normalize;
use crate::renderer::Launcher;
use crate::session::Session;
use crate::types::{ExtractResult, ExtractionRequest, StrainRecord};
use tracing::info;

/// Extracts strain records, one browser session per call.
pub struct StrainExtractor<L: Launcher> {
    launcher: L,
    config: ExtractorConfig,
}

impl<L: Launcher> StrainExtractor<L> {
    pub fn new(launcher: L, config: ExtractorConfig) -> Self {
        Self { launcher, config }
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Extract the record for `slug`.
    ///
    /// The browser is released before this returns, whatever the outcome.
    /// There is no retry: a single attempt either succeeds or fails.
    pub async fn extract(&self, slug: &str) -> ExtractResult<StrainRecord> {
        let request = ExtractionRequest::new(slug)?;
        let url = request.target_url(&self.config.base_url);
        info!(slug = request.slug(), %url, "extracting strain");

        let mut session = Session::open(&self.launcher).await?;
        let captured = session.capture(&url, &self.config).await;
        session.close().await;

        let record = normalize(captured?.as_ref(), &request, &url)?;
        info!(name = %record.name, effects = record.effects.len(), "strain extracted");
        Ok(record)
    }
}
