//! Response interception and the per-session payload slot.
//!
//! The interceptor runs as its own task beside navigation. It decodes every
//! matching response body and overwrites a single-slot [`CaptureCell`]; the
//! session reads the slot once after the settle phase.

use crate::renderer::{InterceptedResponse, ResponseStream};
use crate::types::{ExtractError, ExtractResult};
use futures::StreamExt;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Counters describing what the interceptor saw during one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Responses whose URL matched the API pattern.
    pub matched: usize,
    /// Matching responses decoded and stored.
    pub decoded: usize,
    /// Matching responses with a missing or malformed body.
    pub rejected: usize,
}

/// Single-slot, overwrite-on-write holder for the captured payload.
pub struct CaptureCell {
    slot: watch::Sender<Option<Value>>,
    matched: AtomicUsize,
    decoded: AtomicUsize,
    rejected: AtomicUsize,
}

impl CaptureCell {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            slot,
            matched: AtomicUsize::new(0),
            decoded: AtomicUsize::new(0),
            rejected: AtomicUsize::new(0),
        }
    }

    /// Replace the current payload. The latest write wins.
    pub fn store(&self, payload: Value) {
        self.decoded.fetch_add(1, Ordering::Relaxed);
        self.slot.send_replace(Some(payload));
    }

    /// Copy of the current payload, if any.
    pub fn snapshot(&self) -> Option<Value> {
        self.slot.borrow().clone()
    }

    /// Wait until a payload is present or `timeout` elapses.
    pub async fn wait_captured(&self, timeout: Duration) -> bool {
        let mut rx = self.slot.subscribe();
        let found = tokio::time::timeout(timeout, rx.wait_for(Option::is_some))
            .await
            .is_ok_and(|changed| changed.is_ok());
        found
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            matched: self.matched.load(Ordering::Relaxed),
            decoded: self.decoded.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

impl Default for CaptureCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Filters responses by URL substring and decodes matching bodies as JSON.
pub struct ResponseInterceptor {
    pattern: String,
    cell: Arc<CaptureCell>,
}

impl ResponseInterceptor {
    pub fn new(pattern: impl Into<String>, cell: Arc<CaptureCell>) -> Self {
        Self {
            pattern: pattern.into(),
            cell,
        }
    }

    /// Process one response. Returns whether it was stored.
    ///
    /// A matching response whose body is not JSON yields
    /// [`ExtractError::PayloadDecode`] and leaves the slot untouched.
    pub fn handle(&self, response: InterceptedResponse) -> ExtractResult<bool> {
        if !response.url.contains(&self.pattern) {
            return Ok(false);
        }
        self.cell.matched.fetch_add(1, Ordering::Relaxed);
        debug!(url = %response.url, status = response.status, "intercepted strain API response");

        let body = match response.body {
            Ok(body) => body,
            Err(e) => {
                self.cell.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(url = %response.url, "response body unavailable: {e:#}");
                return Ok(false);
            }
        };

        match serde_json::from_str::<Value>(&body) {
            Ok(payload) => {
                self.cell.store(payload);
                Ok(true)
            }
            Err(source) => {
                self.cell.rejected.fetch_add(1, Ordering::Relaxed);
                Err(ExtractError::PayloadDecode {
                    url: response.url,
                    source,
                })
            }
        }
    }

    /// Drain the response stream until it ends. Decode failures are logged.
    pub async fn run(self, mut responses: ResponseStream) {
        while let Some(response) = responses.next().await {
            if let Err(e) = self.handle(response) {
                warn!("{e}");
            }
        }
    }
}
