//! Chromium-backed portal sessions.
//!
//! Each lookup gets its own browser process with a throwaway profile; all
//! page access goes through DOM selectors fixed to the portal's current
//! layout.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::Page;
use futures::StreamExt;
use tempfile::TempDir;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::config::ScraperConfig;
use crate::error::ScraperError;
use crate::tracuunnt::types::{QueryKind, RawRow};
use crate::traits::{PortalBrowser, PortalSession};

/// Lookup form field for tax code (MST) queries.
const MST_INPUT_SELECTOR: &str =
    "#module3Content form > table > tbody > tr:nth-child(2) > td:nth-child(2) > input";
/// Lookup form field for citizen ID (CCCD) queries.
const CCCD_INPUT_SELECTOR: &str =
    "#module3Content > div > form > table > tbody > tr:nth-child(5) > td:nth-child(2) > input";
const CAPTCHA_INPUT_SELECTOR: &str = "#captcha";
const SUBMIT_BUTTON_SELECTOR: &str =
    "#module3Content > div > form > table > tbody > tr:nth-child(7) > td:nth-child(2) > div > input:first-of-type";
const CAPTCHA_IMG_SELECTOR: &str =
    "#module3Content > div > form > table > tbody > tr:nth-child(6) > td:nth-child(2) > table > tbody > tr > td:nth-child(2) > div > img";
const ERROR_BANNER_SELECTOR: &str = "#module3Content > div > p";
const RESULT_MESSAGE_SELECTOR: &str =
    "#module3Content > div > table > tbody > tr:nth-child(2) > td";
const RESULT_TABLE_SELECTOR: &str = ".ta_border";

const CDP_REQUEST_TIMEOUT_SECS: u64 = 60;
/// The form does a full page post; the portal needs a moment to land.
const POST_SUBMIT_WAIT_SECS: u64 = 3;

/// Embeds a Rust string into a JS snippet as a quoted literal.
fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| String::from("\"\""))
}

/// Launches one Chromium process per portal session.
pub struct ChromeBrowser {
    config: ScraperConfig,
}

impl ChromeBrowser {
    pub fn new(config: ScraperConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PortalBrowser for ChromeBrowser {
    async fn open(&self) -> Result<Box<dyn PortalSession>, ScraperError> {
        info!("Launching browser for portal session...");

        std::fs::create_dir_all(&self.config.captcha_dir)?;

        // Throwaway profile so concurrent sessions never share state;
        // removed when the session closes
        let profile_dir = tempfile::Builder::new().prefix("tracuunnt-").tempdir()?;

        let chrome_path = std::env::var("CHROME_PATH")
            .or_else(|_| std::env::var("CHROMIUM_PATH"))
            .unwrap_or_else(|_| "chromium".to_string());

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .user_data_dir(profile_dir.path())
            .window_size(1280, 800);

        if !self.config.headless {
            builder = builder.with_head();
        }

        let browser_config = builder
            .no_sandbox()
            .request_timeout(Duration::from_secs(CDP_REQUEST_TIMEOUT_SECS))
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .build()
            .map_err(|e| ScraperError::BrowserInit(e.to_string()))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScraperError::BrowserInit(e.to_string()))?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                debug!("Browser event: {:?}", event);
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| ScraperError::BrowserInit(e.to_string()))?;

        page.goto(self.config.portal_url.as_str())
            .await
            .map_err(|e| ScraperError::Navigation(e.to_string()))?;
        page.wait_for_navigation()
            .await
            .map_err(|e| ScraperError::Navigation(e.to_string()))?;
        debug!("Portal form loaded: {}", self.config.portal_url);

        Ok(Box::new(ChromeSession {
            browser: Some(browser),
            page: Some(page),
            profile_dir: Some(profile_dir),
            captcha_dir: self.config.captcha_dir.clone(),
        }))
    }
}

/// One live Chromium session on the lookup form.
pub struct ChromeSession {
    browser: Option<Browser>,
    page: Option<Page>,
    profile_dir: Option<TempDir>,
    captcha_dir: PathBuf,
}

impl ChromeSession {
    fn page(&self) -> Result<&Page, ScraperError> {
        self.page
            .as_ref()
            .ok_or_else(|| ScraperError::BrowserInit("Browser session already closed".to_string()))
    }

    /// Sets an input's value through the DOM, replacing whatever the
    /// previous attempt left in it.
    async fn fill_field(&self, selector: &str, value: &str) -> Result<(), ScraperError> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.value = {val};
                return true;
            }})()"#,
            sel = js_string(selector),
            val = js_string(value),
        );

        let result = self
            .page()?
            .evaluate(script.as_str())
            .await
            .map_err(|e| ScraperError::JavaScript(e.to_string()))?;

        if !result.into_value::<bool>().unwrap_or(false) {
            return Err(ScraperError::ElementNotFound(selector.to_string()));
        }
        Ok(())
    }

    /// Text content of the first element matching `selector`, or `None`
    /// when the page has no such element.
    async fn text_of(&self, selector: &str) -> Result<Option<String>, ScraperError> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                return el ? el.textContent : null;
            }})()"#,
            sel = js_string(selector),
        );

        let result = self
            .page()?
            .evaluate(script.as_str())
            .await
            .map_err(|e| ScraperError::JavaScript(e.to_string()))?;

        Ok(result.into_value::<Option<String>>().unwrap_or(None))
    }
}

#[async_trait]
impl PortalSession for ChromeSession {
    async fn captcha_image(&self) -> Result<Vec<u8>, ScraperError> {
        let element = self
            .page()?
            .find_element(CAPTCHA_IMG_SELECTOR)
            .await
            .map_err(|e| ScraperError::ElementNotFound(format!("captcha image: {}", e)))?;

        let image = element
            .screenshot(CaptureScreenshotFormat::Png)
            .await
            .map_err(|e| ScraperError::Captcha(format!("captcha screenshot: {}", e)))?;

        // Spool through a uniquely named file; it is removed when the
        // guard drops at the end of this call.
        let mut spool = tempfile::Builder::new()
            .prefix("captcha-")
            .suffix(".png")
            .tempfile_in(&self.captcha_dir)?;
        spool.write_all(&image)?;
        spool.flush()?;
        let bytes = std::fs::read(spool.path())?;

        debug!(
            "Captured captcha image ({} bytes) via {:?}",
            bytes.len(),
            spool.path()
        );
        Ok(bytes)
    }

    async fn submit_query(
        &self,
        kind: QueryKind,
        value: &str,
        captcha: &str,
    ) -> Result<(), ScraperError> {
        let input_selector = match kind {
            QueryKind::Cccd => CCCD_INPUT_SELECTOR,
            QueryKind::Mst => MST_INPUT_SELECTOR,
        };

        self.fill_field(input_selector, value).await?;
        self.fill_field(CAPTCHA_INPUT_SELECTOR, captcha).await?;

        self.page()?
            .find_element(SUBMIT_BUTTON_SELECTOR)
            .await
            .map_err(|e| ScraperError::ElementNotFound(format!("submit button: {}", e)))?
            .click()
            .await
            .map_err(|e| ScraperError::Navigation(format!("submit click: {}", e)))?;

        self.page()?
            .wait_for_navigation()
            .await
            .map_err(|e| ScraperError::Navigation(format!("submit navigation: {}", e)))?;
        sleep(Duration::from_secs(POST_SUBMIT_WAIT_SECS)).await;
        Ok(())
    }

    async fn error_banner(&self) -> Result<Option<String>, ScraperError> {
        self.text_of(ERROR_BANNER_SELECTOR).await
    }

    async fn result_message(&self) -> Result<Option<String>, ScraperError> {
        self.text_of(RESULT_MESSAGE_SELECTOR).await
    }

    async fn result_rows(&self) -> Result<Vec<RawRow>, ScraperError> {
        let script = format!(
            r#"(() => {{
                const table = document.querySelector({sel});
                if (!table) return null;
                const rows = [];
                for (const tr of table.querySelectorAll("tr")) {{
                    const cells = [];
                    for (const td of tr.querySelectorAll("td")) {{
                        cells.push(td.textContent || "");
                    }}
                    rows.push({{ style: tr.getAttribute("style") || "", cells: cells }});
                }}
                return JSON.stringify(rows);
            }})()"#,
            sel = js_string(RESULT_TABLE_SELECTOR),
        );

        let result = self
            .page()?
            .evaluate(script.as_str())
            .await
            .map_err(|e| ScraperError::JavaScript(e.to_string()))?;

        let json = result
            .into_value::<Option<String>>()
            .unwrap_or(None)
            .ok_or_else(|| ScraperError::Extraction("result table not found".to_string()))?;

        serde_json::from_str(&json).map_err(|e| ScraperError::Json(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), ScraperError> {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!("Failed to close page: {}", e);
            }
        }

        // Dropping the handle ends the Chromium process
        if let Some(browser) = self.browser.take() {
            drop(browser);
            debug!("Browser session released");
        }

        if let Some(profile_dir) = self.profile_dir.take() {
            if let Err(e) = profile_dir.close() {
                debug!("Failed to remove profile dir: {}", e);
            }
        }
        Ok(())
    }
}
