use std::path::PathBuf;

/// URL of the taxpayer lookup form.
const DEFAULT_PORTAL_URL: &str = "https://tracuunnt.gdt.gov.vn/tcnnt/mstcn.jsp";
/// OCR endpoint that decodes the portal captcha images.
const DEFAULT_OCR_URL: &str = "http://117.2.155.191:7010/ocr_tracuunnt";
const DEFAULT_OCR_MODEL: &str = "1";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_MAX_CONCURRENT_LOOKUPS: usize = 3;

#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub portal_url: String,
    pub ocr_url: String,
    pub ocr_model: String,
    /// Directory the captcha screenshots are spooled to before OCR upload.
    pub captcha_dir: PathBuf,
    pub headless: bool,
    /// Upper bound on in-flight lookups within one batch.
    pub max_concurrent_lookups: usize,
    pub bind_addr: String,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            portal_url: DEFAULT_PORTAL_URL.to_string(),
            ocr_url: DEFAULT_OCR_URL.to_string(),
            ocr_model: DEFAULT_OCR_MODEL.to_string(),
            captcha_dir: std::env::temp_dir(),
            headless: true,
            max_concurrent_lookups: DEFAULT_MAX_CONCURRENT_LOOKUPS,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }
}

impl ScraperConfig {
    /// Builds a config from environment variables, falling back to the
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            portal_url: std::env::var("TRACUUNNT_URL").unwrap_or(default.portal_url),
            ocr_url: std::env::var("OCR_URL").unwrap_or(default.ocr_url),
            ocr_model: std::env::var("OCR_MODEL").unwrap_or(default.ocr_model),
            captcha_dir: std::env::var("CAPTCHA_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.captcha_dir),
            headless: std::env::var("HEADLESS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.headless),
            max_concurrent_lookups: std::env::var("MAX_CONCURRENT_LOOKUPS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_concurrent_lookups),
            bind_addr: std::env::var("BIND_ADDR").unwrap_or(default.bind_addr),
        }
    }

    pub fn with_portal_url(mut self, url: impl Into<String>) -> Self {
        self.portal_url = url.into();
        self
    }

    pub fn with_ocr_url(mut self, url: impl Into<String>) -> Self {
        self.ocr_url = url.into();
        self
    }

    pub fn with_ocr_model(mut self, model: impl Into<String>) -> Self {
        self.ocr_model = model.into();
        self
    }

    pub fn with_captcha_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.captcha_dir = dir.into();
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_max_concurrent_lookups(mut self, max: usize) -> Self {
        self.max_concurrent_lookups = max;
        self
    }

    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ScraperConfig::default();
        assert_eq!(config.portal_url, DEFAULT_PORTAL_URL);
        assert_eq!(config.ocr_model, "1");
        assert_eq!(config.max_concurrent_lookups, 3);
        assert!(config.headless);
    }

    #[test]
    fn test_config_builder() {
        let config = ScraperConfig::default()
            .with_portal_url("http://localhost:9999/form")
            .with_ocr_url("http://localhost:7010/ocr")
            .with_ocr_model("2")
            .with_captcha_dir("/tmp/captcha")
            .with_headless(false)
            .with_max_concurrent_lookups(5)
            .with_bind_addr("127.0.0.1:9000");

        assert_eq!(config.portal_url, "http://localhost:9999/form");
        assert_eq!(config.ocr_url, "http://localhost:7010/ocr");
        assert_eq!(config.ocr_model, "2");
        assert_eq!(config.captcha_dir, PathBuf::from("/tmp/captcha"));
        assert!(!config.headless);
        assert_eq!(config.max_concurrent_lookups, 5);
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
    }
}
