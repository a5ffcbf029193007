//! Captcha OCR client.
//!
//! The portal captcha is decoded by an external OCR service: one POST with
//! the base64 image, the raw response body is the recognized text. There
//! is no structured error channel; whatever comes back is used as the
//! attempted answer.

use async_trait::async_trait;
use base64::Engine;
use serde::Serialize;
use tracing::debug;

use crate::error::ScraperError;
use crate::traits::CaptchaSolver;

#[derive(Debug, Serialize)]
struct OcrRequest<'a> {
    imgfile: &'a str,
    model: &'a str,
}

/// HTTP client for the captcha OCR endpoint.
pub struct OcrClient {
    url: String,
    model: String,
    client: reqwest::Client,
}

impl OcrClient {
    pub fn new(url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl CaptchaSolver for OcrClient {
    async fn solve(&self, image: &[u8]) -> Result<String, ScraperError> {
        let imgfile = base64::engine::general_purpose::STANDARD.encode(image);
        let payload = OcrRequest {
            imgfile: &imgfile,
            model: &self.model,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ScraperError::Ocr(e.to_string()))?;

        let text = response
            .text()
            .await
            .map_err(|e| ScraperError::Ocr(e.to_string()))?;

        debug!("OCR answered {:?} for {} image bytes", text, image.len());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ocr_request_payload_shape() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"png-bytes");
        let payload = OcrRequest {
            imgfile: &encoded,
            model: "1",
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "imgfile": "cG5nLWJ5dGVz", "model": "1" })
        );
    }
}
