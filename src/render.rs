use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{Headers, SetExtraHttpHeadersParams, SetUserAgentOverrideParams};
use chromiumoxide::cdp::browser_protocol::page::{AddScriptToEvaluateOnNewDocumentParams, NavigateParams};
use chromiumoxide::Page;
use futures::StreamExt;
use log::{debug, info, warn};
use rand::Rng;
use serde_json::json;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::RenderConfig;
use crate::error::{classify_navigation_failure, ParseError};
use crate::identity::{BrowserIdentity, IdentityRotator};

/// Fully-rendered page content.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub html: String,
    /// Post-redirect URL, used to absolutize relative image sources.
    pub final_url: String,
}

/// The rendering capability the pipeline consumes. Tests substitute a stub;
/// production uses [`RenderingEngine`].
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<RenderedPage, ParseError>;

    /// Bring the underlying engine up (or report why it cannot start).
    async fn ensure_ready(&self) -> Result<(), ParseError> {
        Ok(())
    }

    async fn shutdown(&self) {}
}

/// Fingerprint patches installed before any page script runs. Best-effort:
/// anti-bot vendors iterate, this list chases them.
const STEALTH_SCRIPT: &str = r#"
    Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
    Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
    Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
    window.chrome = window.chrome || { runtime: {} };
"#;

/// Long-lived headless Chromium shared by all parse requests. The process
/// is launched lazily behind a mutex (no double-launch under concurrent
/// first use); each fetch gets its own page, closed on every exit path.
pub struct RenderingEngine {
    browser: Mutex<Option<Arc<Browser>>>,
    rotator: IdentityRotator,
    config: RenderConfig,
}

impl RenderingEngine {
    pub fn new(config: RenderConfig) -> Self {
        RenderingEngine {
            browser: Mutex::new(None),
            rotator: IdentityRotator::new(),
            config,
        }
    }

    async fn ensure_started(&self) -> Result<Arc<Browser>, ParseError> {
        let mut guard = self.browser.lock().await;
        if let Some(ref browser) = *guard {
            return Ok(Arc::clone(browser));
        }

        info!("launching rendering engine (headless={})", self.config.headless);
        let mut builder = BrowserConfig::builder()
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--disable-sync")
            .arg("--no-sandbox")
            .arg("--disable-gpu");
        if !self.config.headless {
            builder = builder.with_head();
        }
        if let Some(ref path) = self.config.chrome_binary {
            builder = builder.chrome_executable(path);
        }
        let browser_config = builder.build().map_err(ParseError::EngineUnavailable)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ParseError::EngineUnavailable(e.to_string()))?;
        tokio::spawn(async move { while handler.next().await.is_some() {} });

        let shared = Arc::new(browser);
        *guard = Some(Arc::clone(&shared));
        Ok(shared)
    }

    /// Navigate and wait for the page to settle. Runs inside the caller's
    /// navigation timeout.
    async fn navigate(&self, page: &Page, url: &str) -> Result<(), ParseError> {
        let nav = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(ParseError::Navigation)?;
        page.execute(nav)
            .await
            .map_err(|e| classify_navigation_failure(&e.to_string(), self.config.navigation_timeout_secs))?;
        // Network-idle wait; some pages never fire it, treat as settled.
        if let Err(e) = page.wait_for_navigation().await {
            debug!("navigation idle wait ended early: {e}");
        }
        Ok(())
    }

    async fn prepare_page(&self, page: &Page, identity: BrowserIdentity) -> Result<(), ParseError> {
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
            .await
            .map_err(protocol_error)?;

        page.execute(SetUserAgentOverrideParams::new(identity.user_agent))
            .await
            .map_err(protocol_error)?;

        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(identity.viewport_width as i64)
            .height(identity.viewport_height as i64)
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(ParseError::BrowserProtocol)?;
        page.execute(metrics).await.map_err(protocol_error)?;

        let headers = Headers::new(json!({
            "Accept": "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            "Accept-Language": "en-US,en;q=0.9",
            "Accept-Encoding": "gzip, deflate, br",
            "DNT": "1",
            "Connection": "keep-alive",
            "Upgrade-Insecure-Requests": "1",
        }));
        page.execute(SetExtraHttpHeadersParams::new(headers))
            .await
            .map_err(protocol_error)?;

        Ok(())
    }

    /// Scroll a little like a person would. Some sites gate lazy content
    /// and bot verdicts on scroll behavior. Failures here never fail the
    /// fetch.
    async fn humanlike_scroll(&self, page: &Page) {
        let (distance, pause_ms) = {
            let mut rng = rand::thread_rng();
            (rng.gen_range(200..=700u32), rng.gen_range(1000..=3000u64))
        };
        if let Err(e) = page.evaluate(format!("window.scrollBy(0, {distance})")).await {
            debug!("scroll simulation skipped: {e}");
            return;
        }
        tokio::time::sleep(Duration::from_millis(pause_ms)).await;
        if let Err(e) = page.evaluate("window.scrollTo(0, 0)".to_string()).await {
            debug!("scroll-back skipped: {e}");
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    async fn render_inner(&self, page: &Page, url: &str) -> Result<RenderedPage, ParseError> {
        let identity = self.rotator.next();
        debug!(
            "rendering {url} as {}x{}",
            identity.viewport_width, identity.viewport_height
        );
        self.prepare_page(page, identity).await?;

        let timeout = Duration::from_secs(self.config.navigation_timeout_secs);
        tokio::time::timeout(timeout, self.navigate(page, url))
            .await
            .map_err(|_| ParseError::NavigationTimeout(self.config.navigation_timeout_secs))??;

        self.humanlike_scroll(page).await;

        let final_url = page
            .url()
            .await
            .map_err(protocol_error)?
            .map(|u| u.to_string())
            .unwrap_or_else(|| url.to_string());
        let html = page.content().await.map_err(protocol_error)?;

        Ok(RenderedPage { html, final_url })
    }
}

#[async_trait]
impl PageRenderer for RenderingEngine {
    async fn render(&self, url: &str) -> Result<RenderedPage, ParseError> {
        let browser = self.ensure_started().await?;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| ParseError::BrowserProtocol(format!("failed to open page: {e}")))?;

        // Inner function so the page is closed on every exit path.
        let result = self.render_inner(&page, url).await;
        if let Err(e) = page.close().await {
            debug!("page close error for {url}: {e}");
        }
        result
    }

    async fn ensure_ready(&self) -> Result<(), ParseError> {
        self.ensure_started().await.map(|_| ())
    }

    async fn shutdown(&self) {
        let mut guard = self.browser.lock().await;
        if let Some(browser) = guard.take() {
            match Arc::try_unwrap(browser) {
                Ok(mut browser) => {
                    if let Err(e) = browser.close().await {
                        warn!("browser close error: {e}");
                    }
                }
                Err(still_shared) => {
                    // Fetches in flight; put it back rather than kill it
                    // under them.
                    warn!("shutdown requested with fetches in flight, deferring");
                    *guard = Some(still_shared);
                }
            }
        }
    }
}

fn protocol_error(e: impl Display) -> ParseError {
    ParseError::BrowserProtocol(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stealth_script_patches_the_automation_tells() {
        assert!(STEALTH_SCRIPT.contains("webdriver"));
        assert!(STEALTH_SCRIPT.contains("plugins"));
        assert!(STEALTH_SCRIPT.contains("languages"));
    }

    #[tokio::test]
    async fn test_trait_defaults_are_noops() {
        struct Fixed;
        #[async_trait]
        impl PageRenderer for Fixed {
            async fn render(&self, url: &str) -> Result<RenderedPage, ParseError> {
                Ok(RenderedPage {
                    html: "<html></html>".to_string(),
                    final_url: url.to_string(),
                })
            }
        }
        let renderer = Fixed;
        assert!(renderer.ensure_ready().await.is_ok());
        renderer.shutdown().await;
        let page = renderer.render("https://example.com").await.unwrap();
        assert_eq!(page.final_url, "https://example.com");
    }
}
