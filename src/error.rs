use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("Browser init error: {0}")]
    BrowserInit(String),

    #[error("Navigation error: {0}")]
    Navigation(String),

    #[error("JavaScript error: {0}")]
    JavaScript(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Captcha error: {0}")]
    Captcha(String),

    #[error("OCR error: {0}")]
    Ocr(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("File IO error: {0}")]
    FileIO(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
