//! Chromium-based renderer using chromiumoxide.

use super::idle::{self, InflightTracker};
use super::{InterceptedResponse, Launcher, RenderContext, Renderer, ResponseStream, WaitUntil};
use crate::config::ExtractorConfig;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent, EventResponseReceived,
    GetResponseBodyParams, RequestId,
};
use chromiumoxide::page::Page;
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, warn};

/// CDP command timeout used when navigation is unbounded.
const UNBOUNDED_COMMAND_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Find the Chromium binary path.
pub fn find_chromium(explicit: Option<&Path>) -> Option<PathBuf> {
    // 1. Explicit path (STRAIN_CHROMIUM_PATH)
    if let Some(path) = explicit {
        if path.exists() {
            return Some(path.to_path_buf());
        }
        warn!("configured Chromium path {} does not exist", path.display());
    }

    // 2. Per-user cache directory
    if let Some(cache) = dirs::cache_dir() {
        let root = cache.join("strain-extractor/chromium");
        let candidates = if cfg!(target_os = "macos") {
            vec![
                root.join("chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                root.join("chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                root.join("chrome"),
            ]
        } else {
            vec![root.join("chrome-linux64/chrome"), root.join("chrome")]
        };
        if let Some(found) = candidates.into_iter().find(|c| c.exists()) {
            return Some(found);
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Launches one headless Chromium per extraction.
pub struct ChromiumLauncher {
    chromium_path: Option<PathBuf>,
    headful: bool,
    command_timeout: Duration,
}

impl ChromiumLauncher {
    pub fn new(config: &ExtractorConfig) -> Self {
        Self {
            chromium_path: find_chromium(config.browser.chromium_path.as_deref()),
            headful: config.browser.headful,
            command_timeout: config
                .navigation_timeout
                .unwrap_or(UNBOUNDED_COMMAND_TIMEOUT),
        }
    }
}

#[async_trait]
impl Launcher for ChromiumLauncher {
    async fn launch(&self) -> Result<Box<dyn Renderer>> {
        let mut builder = BrowserConfig::builder()
            .request_timeout(self.command_timeout)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions");
        builder = if self.headful {
            builder.with_head()
        } else {
            builder.arg("--headless=new")
        };
        if let Some(path) = &self.chromium_path {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {e}. Set STRAIN_CHROMIUM_PATH."))?;

        let (browser, handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler_task = tokio::spawn(drain_handler(handler));

        Ok(Box::new(ChromiumRenderer {
            browser,
            handler_task,
        }))
    }
}

/// A running Chromium instance.
pub struct ChromiumRenderer {
    browser: Browser,
    handler_task: JoinHandle<usize>,
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        let (inflight, tracker_task) = spawn_inflight_tracker(&page).await?;

        Ok(Box::new(ChromiumContext {
            page,
            inflight,
            tasks: Mutex::new(vec![tracker_task]),
        }))
    }

    async fn shutdown(self: Box<Self>) -> Result<()> {
        let ChromiumRenderer {
            mut browser,
            handler_task,
        } = *self;
        let closed = browser.close().await.context("failed to close Chromium");
        if closed.is_ok() {
            let _ = browser.wait().await;
        }
        handler_task.abort();
        closed.map(|_| ())
    }
}

/// Keep an in-flight request count for the page, for network-idle waits.
async fn spawn_inflight_tracker(
    page: &Page,
) -> Result<(watch::Receiver<usize>, JoinHandle<()>)> {
    let mut started = page.event_listener::<EventRequestWillBeSent>().await?;
    let mut finished = page.event_listener::<EventLoadingFinished>().await?;
    let mut failed = page.event_listener::<EventLoadingFailed>().await?;
    let (mut tracker, inflight) = InflightTracker::new();

    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(event) = started.next() => tracker.started(event.request_id.inner()),
                Some(event) = finished.next() => tracker.finished(event.request_id.inner()),
                Some(event) = failed.next() => tracker.finished(event.request_id.inner()),
                else => break,
            }
        }
    });

    Ok((inflight, task))
}

/// A single Chromium page context.
pub struct ChromiumContext {
    page: Page,
    inflight: watch::Receiver<usize>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn watch_responses(&self, url_pattern: &str) -> Result<ResponseStream> {
        let mut received = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .context("failed to subscribe to responses")?;
        let mut finished = self.page.event_listener::<EventLoadingFinished>().await?;
        let mut failed = self.page.event_listener::<EventLoadingFailed>().await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let page = self.page.clone();
        let pattern = url_pattern.to_string();

        // The body is only complete once loading finishes, so matching
        // responses wait here until their LoadingFinished/LoadingFailed event.
        let task = tokio::spawn(async move {
            let mut pending: HashMap<String, (RequestId, String, u16)> = HashMap::new();
            loop {
                let response = tokio::select! {
                    Some(event) = received.next() => {
                        if event.response.url.contains(&pattern) {
                            debug!(url = %event.response.url, "matched response");
                            pending.insert(
                                event.request_id.inner().clone(),
                                (
                                    event.request_id.clone(),
                                    event.response.url.clone(),
                                    status_code(event.response.status),
                                ),
                            );
                        }
                        continue;
                    }
                    Some(event) = finished.next() => {
                        let Some((id, url, status)) = pending.remove(event.request_id.inner()) else {
                            continue;
                        };
                        let body = fetch_body(&page, id).await;
                        InterceptedResponse { url, status, body }
                    }
                    Some(event) = failed.next() => {
                        let Some((_, url, status)) = pending.remove(event.request_id.inner()) else {
                            continue;
                        };
                        let body = Err(anyhow!("loading failed: {}", event.error_text));
                        InterceptedResponse { url, status, body }
                    }
                    else => break,
                };
                if tx.send(response).is_err() {
                    break;
                }
            }
        });

        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(task);
        }

        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn navigate(&mut self, url: &str, wait_until: WaitUntil) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("failed to load {url}"))?;

        if let WaitUntil::NetworkIdle {
            max_inflight,
            quiet,
        } = wait_until
        {
            idle::wait_for_idle(self.inflight.clone(), max_inflight, quiet).await;
        }
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let ChromiumContext { page, tasks, .. } = *self;
        if let Ok(tasks) = tasks.into_inner() {
            for task in tasks {
                task.abort();
            }
        }
        page.close().await.context("failed to close page")?;
        Ok(())
    }
}

/// Drive the CDP handler until the connection closes. A single bad message
/// (e.g. an event this chromiumoxide version cannot deserialize) must not stop
/// event delivery for the rest of the session.
async fn drain_handler<S, E>(mut events: S) -> usize
where
    S: Stream<Item = std::result::Result<(), E>> + Unpin,
    E: std::fmt::Display,
{
    let mut errors = 0;
    while let Some(event) = events.next().await {
        if let Err(e) = event {
            errors += 1;
            debug!(error = %e, "browser handler error");
        }
    }
    if errors > 0 {
        warn!(errors, "browser handler reported errors");
    }
    errors
}

/// HTTP status from the CDP `Response.status` field; out-of-range values map to 0.
fn status_code(status: i64) -> u16 {
    u16::try_from(status).unwrap_or_default()
}

async fn fetch_body(page: &Page, request_id: RequestId) -> Result<String> {
    let returns = page
        .execute(GetResponseBodyParams::new(request_id))
        .await
        .context("failed to fetch response body")?
        .result;

    if returns.base64_encoded {
        let bytes = BASE64
            .decode(returns.body.as_bytes())
            .context("response body is not valid base64")?;
        String::from_utf8(bytes).context("response body is not UTF-8")
    } else {
        Ok(returns.body)
    }
}
