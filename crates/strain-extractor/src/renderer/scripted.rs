//! An in-process renderer that replays a fixed script of network responses.
//!
//! Used to run the whole extraction pipeline without a browser. Responses
//! are emitted on a timeline relative to the start of navigation, and only
//! reach subscribers that exist at emission time, the same way a real page
//! drops events nobody listens for.

use super::{InterceptedResponse, Launcher, RenderContext, Renderer, ResponseStream, WaitUntil};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// One response the scripted page will produce.
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    /// Delay after navigation starts.
    pub after: Duration,
    pub url: String,
    pub status: u16,
    /// Body text, or the reason the body cannot be delivered.
    pub body: std::result::Result<String, String>,
}

impl ScriptedResponse {
    /// A 200 response with the given body.
    pub fn ok(after: Duration, url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            after,
            url: url.into(),
            status: 200,
            body: Ok(body.into()),
        }
    }

    /// A JSON response.
    pub fn json(after: Duration, url: impl Into<String>, body: &serde_json::Value) -> Self {
        Self::ok(after, url, body.to_string())
    }

    /// A response whose body the engine cannot deliver.
    pub fn failed(after: Duration, url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            after,
            url: url.into(),
            status: 0,
            body: Err(reason.into()),
        }
    }
}

/// Everything the scripted browser will do.
#[derive(Debug, Clone, Default)]
pub struct Script {
    responses: Vec<ScriptedResponse>,
    navigation_time: Duration,
    navigation_error: Option<String>,
    launch_error: Option<String>,
    context_error: Option<String>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, response: ScriptedResponse) -> Self {
        self.responses.push(response);
        self
    }

    /// How long `navigate` takes to report completion.
    pub fn navigation_time(mut self, time: Duration) -> Self {
        self.navigation_time = time;
        self
    }

    /// Make `navigate` fail after `navigation_time`.
    pub fn fail_navigation(mut self, reason: impl Into<String>) -> Self {
        self.navigation_error = Some(reason.into());
        self
    }

    pub fn fail_launch(mut self, reason: impl Into<String>) -> Self {
        self.launch_error = Some(reason.into());
        self
    }

    pub fn fail_context(mut self, reason: impl Into<String>) -> Self {
        self.context_error = Some(reason.into());
        self
    }
}

/// Lifecycle counters, for checking that resources are released.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptStats {
    pub launches: usize,
    pub shutdowns: usize,
    pub contexts_opened: usize,
    pub contexts_closed: usize,
    pub navigations: usize,
}

#[derive(Default)]
struct Counters {
    launches: AtomicUsize,
    shutdowns: AtomicUsize,
    contexts_opened: AtomicUsize,
    contexts_closed: AtomicUsize,
    navigations: AtomicUsize,
}

/// Launches scripted browsers.
pub struct ScriptedLauncher {
    script: Script,
    counters: Arc<Counters>,
}

impl ScriptedLauncher {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn stats(&self) -> ScriptStats {
        let c = &self.counters;
        ScriptStats {
            launches: c.launches.load(Ordering::SeqCst),
            shutdowns: c.shutdowns.load(Ordering::SeqCst),
            contexts_opened: c.contexts_opened.load(Ordering::SeqCst),
            contexts_closed: c.contexts_closed.load(Ordering::SeqCst),
            navigations: c.navigations.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl Launcher for ScriptedLauncher {
    async fn launch(&self) -> Result<Box<dyn Renderer>> {
        if let Some(reason) = &self.script.launch_error {
            bail!("failed to launch browser: {reason}");
        }
        self.counters.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedRenderer {
            script: self.script.clone(),
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct ScriptedRenderer {
    script: Script,
    counters: Arc<Counters>,
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        if let Some(reason) = &self.script.context_error {
            bail!("failed to create new page: {reason}");
        }
        self.counters.contexts_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedContext {
            script: self.script.clone(),
            counters: Arc::clone(&self.counters),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            emitter: None,
        }))
    }

    async fn shutdown(self: Box<Self>) -> Result<()> {
        self.counters.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

type Subscribers = Arc<Mutex<Vec<(String, mpsc::UnboundedSender<InterceptedResponse>)>>>;

struct ScriptedContext {
    script: Script,
    counters: Arc<Counters>,
    subscribers: Subscribers,
    emitter: Option<JoinHandle<()>>,
}

#[async_trait]
impl RenderContext for ScriptedContext {
    async fn watch_responses(&self, url_pattern: &str) -> Result<ResponseStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .map_err(|_| anyhow!("subscriber list poisoned"))?
            .push((url_pattern.to_string(), tx));
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn navigate(&mut self, url: &str, _wait_until: WaitUntil) -> Result<()> {
        self.counters.navigations.fetch_add(1, Ordering::SeqCst);
        let start = Instant::now();

        let mut responses = self.script.responses.clone();
        responses.sort_by_key(|r| r.after);
        let subscribers = Arc::clone(&self.subscribers);
        self.emitter = Some(tokio::spawn(async move {
            for response in responses {
                tokio::time::sleep_until(start + response.after).await;
                emit(&subscribers, &response);
            }
        }));

        tokio::time::sleep(self.script.navigation_time).await;
        match &self.script.navigation_error {
            Some(reason) => bail!("failed to load {url}: {reason}"),
            None => Ok(()),
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        if let Some(emitter) = &self.emitter {
            emitter.abort();
        }
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.clear();
        }
        self.counters.contexts_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn emit(subscribers: &Subscribers, response: &ScriptedResponse) {
    let Ok(subscribers) = subscribers.lock() else {
        return;
    };
    for (pattern, tx) in subscribers.iter() {
        if !response.url.contains(pattern.as_str()) {
            continue;
        }
        let _ = tx.send(InterceptedResponse {
            url: response.url.clone(),
            status: response.status,
            body: response.body.clone().map_err(|reason| anyhow!(reason)),
        });
    }
}
