//! One browser session per extraction.
//!
//! A session owns the browser, its single page and the capture state for
//! that page. Opening acquires all three; [`Session::close`] consumes the
//! session and releases page then browser, so release happens exactly once.

use crate::capture::{CaptureCell, ResponseInterceptor};
use crate::config::{ExtractorConfig, SettleStrategy};
use crate::renderer::{Launcher, RenderContext, Renderer};
use crate::types::{ExtractError, ExtractResult};
use anyhow::anyhow;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A live browser page plus the payload captured from it.
pub struct Session {
    renderer: Box<dyn Renderer>,
    context: Box<dyn RenderContext>,
    capture: Arc<CaptureCell>,
}

impl Session {
    /// Launch a browser and open one page.
    ///
    /// If the page cannot be created the browser is shut down before the
    /// error is returned.
    pub async fn open(launcher: &dyn Launcher) -> ExtractResult<Self> {
        let renderer = launcher
            .launch()
            .await
            .map_err(|e| ExtractError::Browser(format!("{e:#}")))?;

        let context = match renderer.new_context().await {
            Ok(context) => context,
            Err(e) => {
                if let Err(shutdown_err) = renderer.shutdown().await {
                    warn!("failed to shut down browser: {shutdown_err:#}");
                }
                return Err(ExtractError::Browser(format!("{e:#}")));
            }
        };
        debug!("browser session opened");

        Ok(Self {
            renderer,
            context,
            capture: Arc::new(CaptureCell::new()),
        })
    }

    /// Load `url` and return the payload captured by the end of the settle phase.
    ///
    /// The interceptor is subscribed before navigation starts and stopped
    /// right after the snapshot, so later responses cannot change the result.
    pub async fn capture(
        &mut self,
        url: &str,
        config: &ExtractorConfig,
    ) -> ExtractResult<Option<Value>> {
        let responses = self
            .context
            .watch_responses(&config.api_pattern)
            .await
            .map_err(|e| ExtractError::Browser(format!("{e:#}")))?;
        let interceptor =
            ResponseInterceptor::new(config.api_pattern.clone(), Arc::clone(&self.capture));
        let intercept_task = tokio::spawn(interceptor.run(responses));

        if let Err(e) = self.navigate(url, config).await {
            intercept_task.abort();
            return Err(e);
        }

        self.settle(config.settle).await;
        let payload = self.capture.snapshot();
        intercept_task.abort();

        let stats = self.capture.stats();
        info!(
            matched = stats.matched,
            decoded = stats.decoded,
            rejected = stats.rejected,
            captured = payload.is_some(),
            "capture window closed"
        );
        Ok(payload)
    }

    async fn navigate(&mut self, url: &str, config: &ExtractorConfig) -> ExtractResult<()> {
        let navigation = self.context.navigate(url, config.wait_until);
        let outcome = match config.navigation_timeout {
            Some(limit) => match tokio::time::timeout(limit, navigation).await {
                Ok(outcome) => outcome,
                Err(_) => Err(anyhow!("timed out after {}ms", limit.as_millis())),
            },
            None => navigation.await,
        };
        outcome.map_err(|e| ExtractError::Navigation {
            url: url.to_string(),
            reason: format!("{e:#}"),
        })
    }

    async fn settle(&self, strategy: SettleStrategy) {
        match strategy {
            SettleStrategy::FixedDelay(window) => tokio::time::sleep(window).await,
            SettleStrategy::UntilCaptured { timeout } => {
                if !self.capture.wait_captured(timeout).await {
                    debug!("no payload within {}ms", timeout.as_millis());
                }
            }
        }
    }

    /// Close the page, then the browser. Failures are logged, not returned.
    pub async fn close(self) {
        let Session {
            renderer, context, ..
        } = self;
        if let Err(e) = context.close().await {
            warn!("failed to close page: {e:#}");
        }
        if let Err(e) = renderer.shutdown().await {
            warn!("failed to shut down browser: {e:#}");
        }
        debug!("browser session closed");
    }
}
