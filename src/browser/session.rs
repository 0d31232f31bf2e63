use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::browser::Locator;
use crate::error::{Result, ScrapeError};

/// Default timeout applied to every remote browser action.
pub const ACTION_TIMEOUT: Duration = Duration::from_secs(30);
/// Short settle delay after in-page interactions that re-render client-side.
pub const SETTLE_SHORT: Duration = Duration::from_secs(1);
/// Settle delay after pagination clicks.
pub const SETTLE_MEDIUM: Duration = Duration::from_secs(2);
/// Longer settle delay after navigations.
pub const SETTLE_LONG: Duration = Duration::from_secs(3);

const VIEWPORT_WIDTH: i64 = 1280;
const VIEWPORT_HEIGHT: i64 = 1024;
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// One remote browser session and the single page driven through it.
///
/// The page is a shared mutable resource on the remote end; exactly one
/// logical task drives it, and the session is owned end-to-end by one
/// execution. Callers must invoke `close` on every exit path.
pub struct BrowserSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

impl BrowserSession {
    /// Connect to an already-provisioned remote session via its CDP
    /// websocket handle and open one page with a fixed viewport.
    pub async fn connect(connect_url: &str) -> Result<Self> {
        info!("Connecting to remote browser session");

        let (browser, mut handler) = Browser::connect(connect_url)
            .await
            .map_err(|e| ScrapeError::Connection(format!("Failed to connect to remote session: {}", e)))?;

        let handler_task = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if let Err(e) = h {
                    // filter out common websocket deserialization errors
                    let error_msg = e.to_string();
                    if error_msg.contains("data did not match any variant")
                        || error_msg.contains("untagged enum Message")
                    {
                        debug!("Ignoring WebSocket deserialization error: {}", e);
                    } else {
                        warn!("Browser handler error: {}", e);
                    }
                }
            }
            debug!("Browser handler task ended");
        });

        let page = match tokio::time::timeout(Duration::from_secs(10), browser.new_page("about:blank")).await {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => {
                handler_task.abort();
                return Err(ScrapeError::Connection(format!("Failed to open page: {}", e)).into());
            }
            Err(_) => {
                handler_task.abort();
                return Err(ScrapeError::Connection("Timeout opening page on remote session".to_string()).into());
            }
        };

        let session = Self {
            browser,
            page,
            handler_task,
        };
        session.set_viewport().await?;

        info!("Remote session connected, page ready");
        Ok(session)
    }

    async fn set_viewport(&self) -> Result<()> {
        let device_metrics = SetDeviceMetricsOverrideParams::builder()
            .width(VIEWPORT_WIDTH)
            .height(VIEWPORT_HEIGHT)
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(|e| ScrapeError::Connection(format!("Failed to build device metrics: {}", e)))?;

        self.page
            .execute(device_metrics)
            .await
            .map_err(|e| ScrapeError::Connection(format!("Failed to set viewport: {}", e)))?;
        Ok(())
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub async fn goto(&self, url: &str) -> Result<()> {
        debug!("Navigating to {}", url);
        tokio::time::timeout(ACTION_TIMEOUT, self.page.goto(url))
            .await
            .map_err(|_| ScrapeError::Browser(format!("Navigation to {} timed out", url)))?
            .map_err(|e| ScrapeError::Browser(format!("Failed to navigate to {}: {}", url, e)))?;
        self.settle(SETTLE_LONG).await;
        Ok(())
    }

    /// Click the first matching candidate of the locator.
    pub async fn click(&self, locator: &Locator) -> Result<()> {
        let element = locator.resolve(&self.page).await?;
        element
            .click()
            .await
            .map_err(|e| ScrapeError::Browser(format!("Click on '{}' failed: {}", locator.name(), e)))?;
        Ok(())
    }

    /// Clear the first matching field and type into it.
    pub async fn type_into(&self, locator: &Locator, text: &str) -> Result<()> {
        let element = locator.resolve(&self.page).await?;
        element
            .click()
            .await
            .map_err(|e| ScrapeError::Browser(format!("Focus on '{}' failed: {}", locator.name(), e)))?;
        element
            .call_js_fn("function() { this.value = ''; }", false)
            .await
            .map_err(|e| ScrapeError::Browser(format!("Clearing '{}' failed: {}", locator.name(), e)))?;
        element
            .type_str(text)
            .await
            .map_err(|e| ScrapeError::Browser(format!("Typing into '{}' failed: {}", locator.name(), e)))?;
        Ok(())
    }

    /// Full HTML of the current page.
    pub async fn content(&self) -> Result<String> {
        let html = tokio::time::timeout(ACTION_TIMEOUT, self.page.content())
            .await
            .map_err(|_| ScrapeError::Browser("Timed out fetching page content".to_string()))?
            .map_err(|e| ScrapeError::Browser(format!("Failed to get page content: {}", e)))?;
        Ok(html)
    }

    /// Visible text of the current page body.
    pub async fn body_text(&self) -> Result<String> {
        self.evaluate_value("document.body ? document.body.innerText : ''").await
    }

    pub async fn evaluate_value<T: DeserializeOwned>(&self, script: &str) -> Result<T> {
        let result = tokio::time::timeout(ACTION_TIMEOUT, self.page.evaluate(script))
            .await
            .map_err(|_| ScrapeError::Browser("Script evaluation timed out".to_string()))?
            .map_err(|e| ScrapeError::Browser(format!("Script evaluation failed: {}", e)))?;
        let value = result
            .into_value()
            .map_err(|e| ScrapeError::Parse(format!("Failed to convert evaluation result: {}", e)))?;
        Ok(value)
    }

    /// Capture a full-page PNG screenshot, base64-encoded.
    pub async fn screenshot_base64(&self) -> Result<String> {
        let bytes = tokio::time::timeout(
            ACTION_TIMEOUT,
            self.page.screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(true)
                    .build(),
            ),
        )
        .await
        .map_err(|_| ScrapeError::Browser("Screenshot timed out".to_string()))?
        .map_err(|e| ScrapeError::Browser(format!("Screenshot failed: {}", e)))?;

        Ok(BASE64.encode(&bytes))
    }

    /// Wait until any of the given selectors is present, polling until the
    /// timeout elapses.
    pub async fn wait_for_any(&self, selectors: &[&str], timeout: Duration) -> Result<()> {
        let started = Instant::now();
        loop {
            for selector in selectors {
                if self.page.find_element(*selector).await.is_ok() {
                    debug!("Selector '{}' appeared after {:?}", selector, started.elapsed());
                    return Ok(());
                }
            }
            if started.elapsed() >= timeout {
                return Err(ScrapeError::Browser(format!(
                    "Timed out waiting for any of {:?}",
                    selectors
                ))
                .into());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    pub async fn wait_for_navigation(&self, timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, self.page.wait_for_navigation())
            .await
            .map_err(|_| ScrapeError::Browser("Timed out waiting for navigation".to_string()))?
            .map_err(|e| ScrapeError::Browser(format!("Navigation wait failed: {}", e)))?;
        Ok(())
    }

    /// Wait for either a full navigation or the appearance of one of the
    /// given markers, whichever resolves first. Some target layouts navigate
    /// on submit, others re-render in place; this covers both with one
    /// mechanism.
    pub async fn wait_for_navigation_or_any(&self, selectors: &[&str], timeout: Duration) -> Result<()> {
        race_navigation_or_marker(
            self.wait_for_navigation(timeout),
            self.wait_for_any(selectors, timeout),
        )
        .await
    }

    pub async fn settle(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }

    /// Release the session. Closes our page and disconnects from the remote
    /// browser without tearing the provisioned session down server-side.
    pub async fn close(self) {
        if let Err(e) = self.page.close().await {
            warn!("Failed to close page: {}", e);
        }
        self.handler_task.abort();
        drop(self.browser);
        info!("Remote session released");
    }
}

/// Race the navigation wait against the marker wait. A navigation-branch
/// error is not final: in-place re-render layouts can fail the navigation
/// wait immediately while the result marker still appears, so on a
/// navigation error we keep waiting on the marker branch.
async fn race_navigation_or_marker<N, M>(nav: N, marker: M) -> Result<()>
where
    N: std::future::Future<Output = Result<()>>,
    M: std::future::Future<Output = Result<()>>,
{
    tokio::pin!(marker);
    tokio::select! {
        nav_result = nav => match nav_result {
            Ok(()) => Ok(()),
            Err(e) => {
                debug!("Navigation wait failed, falling back to marker wait: {}", e);
                marker.await
            }
        },
        marker_result = &mut marker => marker_result,
    }
}
