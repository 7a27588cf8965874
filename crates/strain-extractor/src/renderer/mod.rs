//! Renderer abstraction for browser-based page loading.
//!
//! Defines the `Launcher`, `Renderer` and `RenderContext` traits that abstract
//! over the browser engine (Chromium via chromiumoxide in production, a
//! scripted in-process engine in tests).

pub mod chromium;
pub mod idle;
pub mod scripted;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::time::Duration;

/// A network response observed by a page, with its body already retrieved.
#[derive(Debug)]
pub struct InterceptedResponse {
    /// URL of the request that produced this response.
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    /// Response body as text, or why the engine could not deliver it.
    pub body: Result<String>,
}

/// Stream of responses whose URL passed the subscription filter.
pub type ResponseStream = BoxStream<'static, InterceptedResponse>;

/// When navigation counts as finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    /// The page load event fired.
    Load,
    /// At most `max_inflight` requests pending for a continuous `quiet` window.
    NetworkIdle {
        max_inflight: usize,
        quiet: Duration,
    },
}

impl WaitUntil {
    /// No request in flight for 500 ms.
    pub const NETWORK_IDLE_0: WaitUntil = WaitUntil::NetworkIdle {
        max_inflight: 0,
        quiet: Duration::from_millis(500),
    };

    /// At most two requests in flight for 500 ms.
    pub const NETWORK_IDLE_2: WaitUntil = WaitUntil::NetworkIdle {
        max_inflight: 2,
        quiet: Duration::from_millis(500),
    };
}

impl Default for WaitUntil {
    fn default() -> Self {
        WaitUntil::NETWORK_IDLE_2
    }
}

/// Starts browser instances. One launch per extraction.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Launch an isolated browser instance.
    async fn launch(&self) -> Result<Box<dyn Renderer>>;
}

/// A running browser that can create rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new browser context (tab).
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine. Consumes the handle.
    async fn shutdown(self: Box<Self>) -> Result<()>;
}

/// A single browser context (tab).
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Subscribe to responses whose URL contains `url_pattern`.
    ///
    /// Responses are only delivered once this call has returned, so it must
    /// be awaited before [`RenderContext::navigate`].
    async fn watch_responses(&self, url_pattern: &str) -> Result<ResponseStream>;
    /// Navigate to a URL and wait until the page settles per `wait_until`.
    async fn navigate(&mut self, url: &str, wait_until: WaitUntil) -> Result<()>;
    /// Close this context. Consumes the handle.
    async fn close(self: Box<Self>) -> Result<()>;
}
