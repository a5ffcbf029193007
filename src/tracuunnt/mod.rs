//! Scraper for the tracuunnt.gdt.gov.vn taxpayer lookup portal.
//!
//! [`ChromeBrowser`] owns Chrome process lifecycle and page access,
//! [`TracuunntScraper`] drives the lookup form through it, and
//! [`types`] carries the wire shapes the portal and the HTTP API share.

pub mod browser;
pub mod scraper;
pub mod types;

pub use browser::ChromeBrowser;
pub use scraper::TracuunntScraper;
pub use types::{LookupResult, QueryKind, TaxpayerRecord};
