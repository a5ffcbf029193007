//! Bulk taxpayer lookup service for the tracuunnt.gdt.gov.vn portal.
//!
//! - Looks up tax codes (MST) and personal IDs (CCCD) through the portal's
//!   search form in headless Chrome
//! - Solves the form captcha with an external OCR service, retrying a
//!   bounded number of times
//! - Serves bulk lookups over HTTP with a per-batch concurrency cap
//!
//! # Single lookup
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use tokio::sync::Semaphore;
//! use tracuunnt_service::{
//!     ChromeBrowser, OcrClient, QueryKind, ScraperConfig, TracuunntScraper,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ScraperConfig::default();
//!     let scraper = TracuunntScraper::new(
//!         Arc::new(ChromeBrowser::new(config.clone())),
//!         Arc::new(OcrClient::new(config.ocr_url, config.ocr_model)),
//!     );
//!
//!     let result = scraper
//!         .lookup(Arc::new(Semaphore::new(1)), QueryKind::Mst, "8387301332")
//!         .await;
//!     println!("{}", serde_json::to_string_pretty(&result).unwrap());
//! }
//! ```
//!
//! # HTTP service
//!
//! ```rust,ignore
//! use tracuunnt_service::{server, ScraperConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ScraperConfig::from_env();
//!     server::serve(config).await.unwrap();
//! }
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod ocr;
pub mod server;
pub mod tracuunnt;
pub mod traits;

// Re-export the main types.
pub use batch::BatchDispatcher;
pub use config::ScraperConfig;
pub use error::ScraperError;
pub use ocr::OcrClient;
pub use traits::{CaptchaSolver, PortalBrowser, PortalSession};

// Portal lookup types.
pub use tracuunnt::{ChromeBrowser, LookupResult, QueryKind, TaxpayerRecord, TracuunntScraper};
