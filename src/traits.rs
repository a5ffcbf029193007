use async_trait::async_trait;

use crate::error::ScraperError;
use crate::tracuunnt::types::{QueryKind, RawRow};

/// Opens fresh, isolated browser sessions on the portal lookup form.
#[async_trait]
pub trait PortalBrowser: Send + Sync {
    /// Launch a browser and land it on the lookup form.
    async fn open(&self) -> Result<Box<dyn PortalSession>, ScraperError>;
}

/// One live browser session on the lookup form.
#[async_trait]
pub trait PortalSession: Send + Sync {
    /// PNG bytes of the current captcha challenge image.
    async fn captcha_image(&self) -> Result<Vec<u8>, ScraperError>;

    /// Fill the form field selected by `kind` plus the captcha field,
    /// then submit and let the page settle.
    async fn submit_query(
        &self,
        kind: QueryKind,
        value: &str,
        captcha: &str,
    ) -> Result<(), ScraperError>;

    /// Text of the validation banner, if one is shown.
    async fn error_banner(&self) -> Result<Option<String>, ScraperError>;

    /// Text of the result status cell, if present.
    async fn result_message(&self) -> Result<Option<String>, ScraperError>;

    /// Every row of the result table, header included.
    async fn result_rows(&self) -> Result<Vec<RawRow>, ScraperError>;

    /// Release the browser.
    async fn close(&mut self) -> Result<(), ScraperError>;
}

/// Turns a captcha image into its text.
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    async fn solve(&self, image: &[u8]) -> Result<String, ScraperError>;
}
