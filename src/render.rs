use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::error::CdpError;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domain::Identifier;
use crate::fetcher::Transport;
use crate::retry::TransportError;

pub const MARKER_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// Launch parameters for an isolated rendering session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Chromium binary; auto-detected when unset.
    pub executable: Option<PathBuf>,
    pub headless: bool,
    pub viewport: Viewport,
    pub args: Vec<String>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            viewport: Viewport::default(),
            args: Vec::new(),
        }
    }
}

/// A live rendering session. Exclusive to one fetch.
#[async_trait]
pub trait RenderSession: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), TransportError>;
    /// Whether `selector` currently matches an element. `Ok(false)` means
    /// "not yet"; errors mean the session itself is unusable.
    async fn marker_present(&mut self, selector: &str) -> Result<bool, TransportError>;
    async fn page_source(&mut self) -> Result<String, TransportError>;
    async fn close(&mut self) -> Result<(), TransportError>;
}

#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn RenderSession>, TransportError>;
}

/// Polls for `selector` until it appears or `timeout` elapses. Session errors
/// end the wait at once.
pub async fn wait_for_marker(
    session: &mut dyn RenderSession,
    selector: &str,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<(), TransportError> {
    let deadline = Instant::now() + timeout;
    loop {
        if session.marker_present(selector).await? {
            return Ok(());
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(TransportError::Timeout(format!(
                "marker `{selector}` not present after {}s",
                timeout.as_secs()
            )));
        }
        tokio::time::sleep(poll_interval.min(deadline - now)).await;
    }
}

/// Render-and-wait transport: navigate to `<base_url><identifier>`, wait
/// for the structural marker, capture the markup. The session is closed on
/// every exit path; close failures are logged only.
pub struct RenderedTransport<L: SessionLauncher> {
    launcher: L,
    base_url: String,
    marker_selector: String,
    wait_timeout: Duration,
}

impl<L: SessionLauncher> RenderedTransport<L> {
    pub fn new(
        launcher: L,
        base_url: impl Into<String>,
        marker_selector: impl Into<String>,
        wait_timeout: Duration,
    ) -> Self {
        Self {
            launcher,
            base_url: base_url.into(),
            marker_selector: marker_selector.into(),
            wait_timeout,
        }
    }

    pub fn page_url(&self, identifier: &Identifier) -> String {
        format!("{}{}", self.base_url, identifier.as_str())
    }

    async fn capture(
        &self,
        session: &mut dyn RenderSession,
        url: &str,
    ) -> Result<String, TransportError> {
        session.navigate(url).await?;
        wait_for_marker(
            session,
            &self.marker_selector,
            self.wait_timeout,
            MARKER_POLL_INTERVAL,
        )
        .await?;
        session.page_source().await
    }
}

#[async_trait]
impl<L: SessionLauncher> Transport for RenderedTransport<L> {
    fn name(&self) -> &'static str {
        "rendered"
    }

    async fn fetch_once(&self, identifier: &Identifier) -> Result<Vec<u8>, TransportError> {
        let url = self.page_url(identifier);
        let mut session = self.launcher.launch().await?;
        debug!(identifier = %identifier, url = %url, "rendering session launched");
        let captured = self.capture(session.as_mut(), &url).await;
        if let Err(err) = session.close().await {
            warn!(identifier = %identifier, error = %err, "failed to close rendering session");
        }
        captured.map(String::into_bytes)
    }
}

/// Launches one headless Chromium per session over the DevTools protocol.
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    options: LaunchOptions,
}

impl ChromeLauncher {
    pub fn new(options: LaunchOptions) -> Self {
        Self { options }
    }

    /// Command-line flags passed to the browser on top of chromiumoxide's
    /// defaults.
    pub fn browser_args(&self) -> Vec<String> {
        let Viewport { width, height } = self.options.viewport;
        let mut args = vec![
            format!("--window-size={width},{height}"),
            "--disable-gpu".to_string(),
        ];
        args.extend(self.options.args.iter().cloned());
        args
    }

    fn browser_config(&self) -> Result<BrowserConfig, TransportError> {
        let mut builder = BrowserConfig::builder()
            .viewport(None)
            .args(self.browser_args());
        if !self.options.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &self.options.executable {
            builder = builder.chrome_executable(executable);
        }
        builder.build().map_err(TransportError::Session)
    }
}

#[async_trait]
impl SessionLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn RenderSession>, TransportError> {
        let (browser, mut handler) = Browser::launch(self.browser_config()?)
            .await
            .map_err(cdp_error)?;
        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });
        let mut session = ChromeSession {
            browser: Some(browser),
            page: None,
            events,
        };
        let opened = match session.browser.as_ref() {
            Some(browser) => browser.new_page("about:blank").await.map_err(cdp_error),
            None => Err(closed_session()),
        };
        match opened {
            Ok(page) => {
                session.page = Some(page);
                Ok(Box::new(session))
            }
            Err(err) => {
                if let Err(close_err) = session.close().await {
                    warn!(error = %close_err, "failed to close browser after setup error");
                }
                Err(err)
            }
        }
    }
}

/// Owns the browser process and its page. Dropping an unclosed session
/// kills the browser.
struct ChromeSession {
    browser: Option<Browser>,
    page: Option<Page>,
    events: JoinHandle<()>,
}

impl ChromeSession {
    fn page(&self) -> Result<&Page, TransportError> {
        self.page.as_ref().ok_or_else(closed_session)
    }
}

#[async_trait]
impl RenderSession for ChromeSession {
    async fn navigate(&mut self, url: &str) -> Result<(), TransportError> {
        self.page()?.goto(url).await.map_err(cdp_error)?;
        Ok(())
    }

    async fn marker_present(&mut self, selector: &str) -> Result<bool, TransportError> {
        let literal = serde_json::to_string(selector)
            .map_err(|err| TransportError::Decode(err.to_string()))?;
        let result = self
            .page()?
            .evaluate(format!("document.querySelector({literal}) !== null"))
            .await
            .map_err(cdp_error)?;
        result
            .into_value::<bool>()
            .map_err(|err| TransportError::Decode(err.to_string()))
    }

    async fn page_source(&mut self) -> Result<String, TransportError> {
        self.page()?.content().await.map_err(cdp_error)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let mut outcome = Ok(());
        if let Some(page) = self.page.take() {
            outcome = page.close().await.map_err(cdp_error);
        }
        if let Some(mut browser) = self.browser.take() {
            if let Err(err) = browser.close().await {
                warn!(error = %err, "browser did not close cleanly, killing it");
                browser.kill().await;
                outcome = outcome.and(Err(cdp_error(err)));
            }
            if let Err(err) = browser.wait().await {
                warn!(error = %err, "failed to reap browser process");
            }
        }
        self.events.abort();
        outcome
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        self.events.abort();
    }
}

fn closed_session() -> TransportError {
    TransportError::Session("rendering session already closed".to_string())
}

fn cdp_error(err: CdpError) -> TransportError {
    TransportError::Session(err.to_string())
}
