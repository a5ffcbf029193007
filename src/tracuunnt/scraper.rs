//! Taxpayer lookup orchestration.
//!
//! Resolves one identifier per call: fresh browser session, bounded
//! captcha/submit/classify cycle, then result extraction. Every failure
//! is contained here as an error outcome so one bad lookup can never
//! abort its batch.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::error::ScraperError;
use crate::traits::{CaptchaSolver, PortalBrowser, PortalSession};

use super::types::{
    LookupResult, QueryKind, RawRow, TaxpayerRecord, CAPTCHA_EXHAUSTED_MESSAGE,
    CAPTCHA_REJECTED_BANNER, NOT_FOUND_MESSAGE,
};

/// Total captcha submissions per lookup (initial try plus 3 retries).
const MAX_CAPTCHA_ATTEMPTS: u32 = 4;
/// Inline style fragment marking template rows the portal keeps hidden.
const HIDDEN_ROW_STYLE: &str = "background:none";
/// Cell count of a well-formed result row.
const RECORD_CELL_COUNT: usize = 7;

/// Drives portal sessions through the lookup form.
pub struct TracuunntScraper {
    browser: Arc<dyn PortalBrowser>,
    solver: Arc<dyn CaptchaSolver>,
}

impl TracuunntScraper {
    pub fn new(browser: Arc<dyn PortalBrowser>, solver: Arc<dyn CaptchaSolver>) -> Self {
        Self { browser, solver }
    }

    /// Resolves one identifier to its portal outcome.
    ///
    /// Takes a slot from `limiter` before any browser work and holds it
    /// until the session is gone. Failures come back as
    /// `LookupResult::Error`; this never returns an Err to the caller.
    pub async fn lookup(
        &self,
        limiter: Arc<Semaphore>,
        kind: QueryKind,
        value: &str,
    ) -> LookupResult {
        match self.lookup_inner(limiter, kind, value).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Lookup for {:?} value {:?} failed: {}", kind, value, e);
                LookupResult::error(e.to_string())
            }
        }
    }

    async fn lookup_inner(
        &self,
        limiter: Arc<Semaphore>,
        kind: QueryKind,
        value: &str,
    ) -> Result<LookupResult, ScraperError> {
        let _permit = limiter
            .acquire_owned()
            .await
            .map_err(|e| ScraperError::Internal(e.to_string()))?;
        debug!("Acquired lookup slot for {:?} value {:?}", kind, value);

        let mut session = self.browser.open().await?;
        let outcome = self.drive(session.as_ref(), kind, value).await;
        if let Err(e) = session.close().await {
            debug!("Failed to close browser session: {}", e);
        }
        outcome
    }

    /// The captcha retry cycle, then extraction of whatever the portal
    /// answered with.
    async fn drive(
        &self,
        session: &dyn PortalSession,
        kind: QueryKind,
        value: &str,
    ) -> Result<LookupResult, ScraperError> {
        for attempt in 1..=MAX_CAPTCHA_ATTEMPTS {
            let image = session.captcha_image().await?;
            let captcha = self.solver.solve(&image).await?;
            session.submit_query(kind, value, &captcha).await?;

            match session.error_banner().await? {
                Some(text) if text.contains(CAPTCHA_REJECTED_BANNER) => {
                    info!(
                        "Captcha rejected on attempt {}/{}",
                        attempt, MAX_CAPTCHA_ATTEMPTS
                    );
                    if attempt == MAX_CAPTCHA_ATTEMPTS {
                        return Ok(LookupResult::error(CAPTCHA_EXHAUSTED_MESSAGE));
                    }
                }
                Some(text) => {
                    // Any other banner counts as resolved; extraction
                    // decides what the page actually holds.
                    debug!("Unclassified banner after submit: {}", text.trim());
                    break;
                }
                None => break,
            }
        }

        self.extract(session).await
    }

    async fn extract(&self, session: &dyn PortalSession) -> Result<LookupResult, ScraperError> {
        let message = session
            .result_message()
            .await?
            .ok_or_else(|| ScraperError::Extraction("result status cell not found".to_string()))?;

        if message.contains(NOT_FOUND_MESSAGE) {
            info!("Portal reported no matching taxpayer");
            return Ok(LookupResult::not_found());
        }

        let rows = session.result_rows().await?;
        let records = collect_records(&rows);
        info!("Extracted {} taxpayer records", records.len());
        Ok(LookupResult::records(records))
    }
}

/// Applies the row inclusion predicate and cleans every kept cell.
///
/// The first row is the column header; rows styled `background:none` are
/// the portal's hidden templates; anything without exactly 7 cells is not
/// a record.
fn collect_records(rows: &[RawRow]) -> Vec<TaxpayerRecord> {
    rows.iter()
        .skip(1)
        .filter(|row| !row.style.contains(HIDDEN_ROW_STYLE))
        .filter(|row| row.cells.len() == RECORD_CELL_COUNT)
        .map(|row| TaxpayerRecord {
            ordinal: clean_cell(&row.cells[0]),
            tax_code: clean_cell(&row.cells[1]),
            taxpayer_name: clean_cell(&row.cells[2]),
            tax_authority: clean_cell(&row.cells[3]),
            id_number: clean_cell(&row.cells[4]),
            last_updated: clean_cell(&row.cells[5]),
            note: clean_cell(&row.cells[6]),
        })
        .collect()
}

/// Removes embedded newlines and tabs, then surrounding whitespace.
fn clean_cell(raw: &str) -> String {
    raw.replace('\n', "").replace('\t', "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    struct MockSolver;

    #[async_trait]
    impl CaptchaSolver for MockSolver {
        async fn solve(&self, _image: &[u8]) -> Result<String, ScraperError> {
            Ok("AB12C".to_string())
        }
    }

    struct FailingSolver;

    #[async_trait]
    impl CaptchaSolver for FailingSolver {
        async fn solve(&self, _image: &[u8]) -> Result<String, ScraperError> {
            Err(ScraperError::Ocr("connection refused".to_string()))
        }
    }

    /// Portal double with one scripted banner per submit; the list is
    /// exhausted from the front, missing entries mean "no banner".
    struct MockSession {
        banners: Vec<Option<&'static str>>,
        message: Option<&'static str>,
        rows: Result<Vec<RawRow>, &'static str>,
        submits: Arc<AtomicUsize>,
        captcha_fetches: Arc<AtomicUsize>,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PortalSession for MockSession {
        async fn captcha_image(&self) -> Result<Vec<u8>, ScraperError> {
            self.captcha_fetches.fetch_add(1, Ordering::SeqCst);
            Ok(vec![0x89, 0x50, 0x4e, 0x47])
        }

        async fn submit_query(
            &self,
            _kind: QueryKind,
            _value: &str,
            _captcha: &str,
        ) -> Result<(), ScraperError> {
            self.submits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn error_banner(&self) -> Result<Option<String>, ScraperError> {
            let idx = self.submits.load(Ordering::SeqCst).saturating_sub(1);
            Ok(self
                .banners
                .get(idx)
                .copied()
                .flatten()
                .map(str::to_string))
        }

        async fn result_message(&self) -> Result<Option<String>, ScraperError> {
            Ok(self.message.map(str::to_string))
        }

        async fn result_rows(&self) -> Result<Vec<RawRow>, ScraperError> {
            match &self.rows {
                Ok(rows) => Ok(rows.clone()),
                Err(msg) => Err(ScraperError::Extraction(msg.to_string())),
            }
        }

        async fn close(&mut self) -> Result<(), ScraperError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Hands out a single prepared session, then refuses further opens.
    struct MockBrowser {
        session: Mutex<Option<MockSession>>,
    }

    #[async_trait]
    impl PortalBrowser for MockBrowser {
        async fn open(&self) -> Result<Box<dyn PortalSession>, ScraperError> {
            let session = self
                .session
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| ScraperError::BrowserInit("no session scripted".to_string()))?;
            Ok(Box::new(session))
        }
    }

    struct MockStats {
        submits: Arc<AtomicUsize>,
        captcha_fetches: Arc<AtomicUsize>,
        closed: Arc<AtomicUsize>,
    }

    async fn run_with(
        solver: Arc<dyn CaptchaSolver>,
        banners: Vec<Option<&'static str>>,
        message: Option<&'static str>,
        rows: Result<Vec<RawRow>, &'static str>,
    ) -> (LookupResult, MockStats) {
        let stats = MockStats {
            submits: Arc::new(AtomicUsize::new(0)),
            captcha_fetches: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
        };
        let session = MockSession {
            banners,
            message,
            rows,
            submits: stats.submits.clone(),
            captcha_fetches: stats.captcha_fetches.clone(),
            closed: stats.closed.clone(),
        };
        let browser = MockBrowser {
            session: Mutex::new(Some(session)),
        };
        let scraper = TracuunntScraper::new(Arc::new(browser), solver);
        let result = scraper
            .lookup(Arc::new(Semaphore::new(1)), QueryKind::Cccd, "012345678901")
            .await;
        (result, stats)
    }

    async fn run_scripted(
        banners: Vec<Option<&'static str>>,
        message: Option<&'static str>,
        rows: Result<Vec<RawRow>, &'static str>,
    ) -> (LookupResult, MockStats) {
        run_with(Arc::new(MockSolver), banners, message, rows).await
    }

    fn row(cells: &[&str]) -> RawRow {
        RawRow {
            style: String::new(),
            cells: cells.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn styled_row(style: &str, cells: &[&str]) -> RawRow {
        RawRow {
            style: style.to_string(),
            cells: cells.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn header_row() -> RawRow {
        row(&[
            "STT",
            "Mã số thuế",
            "Tên người nộp thuế",
            "Cơ quan thuế",
            "CMT/Thẻ căn cước",
            "Ngày thay đổi thông tin gần nhất",
            "Ghi chú",
        ])
    }

    fn single_record_rows() -> Result<Vec<RawRow>, &'static str> {
        Ok(vec![
            header_row(),
            row(&[
                "1",
                "8387301332",
                "Nguyễn Văn A",
                "CCT Q1",
                "012345678901",
                "20/05/2023",
                "",
            ]),
        ])
    }

    fn expect_error(result: LookupResult) -> String {
        match result {
            LookupResult::Error { status, message } => {
                assert_eq!(status, "error");
                message
            }
            other => panic!("expected error outcome, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_exhausted_after_four_rejected_captchas() {
        let (result, stats) = run_scripted(
            vec![Some(CAPTCHA_REJECTED_BANNER); 4],
            Some("unused"),
            Ok(Vec::new()),
        )
        .await;

        let message = expect_error(result);
        assert_eq!(message, CAPTCHA_EXHAUSTED_MESSAGE);
        assert_eq!(stats.submits.load(Ordering::SeqCst), 4);
        assert_eq!(stats.captcha_fetches.load(Ordering::SeqCst), 4);
        assert_eq!(stats.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_retry_on_unclassified_banner() {
        let (result, stats) = run_scripted(
            vec![Some("Vui lòng nhập thông tin tra cứu!")],
            Some("Danh sách kết quả"),
            single_record_rows(),
        )
        .await;

        assert_eq!(stats.submits.load(Ordering::SeqCst), 1);
        match result {
            LookupResult::Records { data } => assert_eq!(data.len(), 1),
            other => panic!("expected records, got {:?}", other),
        }
        assert_eq!(stats.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_retry_without_banner() {
        let (result, stats) = run_scripted(
            vec![None],
            Some("Danh sách kết quả"),
            single_record_rows(),
        )
        .await;

        assert_eq!(stats.submits.load(Ordering::SeqCst), 1);
        assert!(matches!(result, LookupResult::Records { .. }));
    }

    #[tokio::test]
    async fn test_retry_then_success_on_second_attempt() {
        let (result, stats) = run_scripted(
            vec![Some(CAPTCHA_REJECTED_BANNER), None],
            Some("Danh sách kết quả"),
            single_record_rows(),
        )
        .await;

        assert_eq!(stats.submits.load(Ordering::SeqCst), 2);
        assert_eq!(stats.captcha_fetches.load(Ordering::SeqCst), 2);
        assert!(matches!(result, LookupResult::Records { .. }));
    }

    #[tokio::test]
    async fn test_not_found_even_when_table_is_absent() {
        let (result, stats) = run_scripted(
            vec![None],
            Some("\n  Không tìm thấy kết quả.  "),
            Err("result table not found"),
        )
        .await;

        match result {
            LookupResult::NotFound { data } => assert_eq!(data, NOT_FOUND_MESSAGE),
            other => panic!("expected not-found, got {:?}", other),
        }
        assert_eq!(stats.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_table_becomes_error_outcome() {
        let (result, stats) = run_scripted(
            vec![None],
            Some("Danh sách kết quả"),
            Err("result table not found"),
        )
        .await;

        let message = expect_error(result);
        assert!(!message.is_empty());
        assert!(message.contains("result table not found"));
        assert_eq!(stats.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_status_cell_becomes_error_outcome() {
        let (result, stats) = run_scripted(vec![None], None, Ok(Vec::new())).await;

        let message = expect_error(result);
        assert!(message.contains("result status cell"));
        assert_eq!(stats.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_solver_failure_is_contained_and_session_closed() {
        let (result, stats) = run_with(
            Arc::new(FailingSolver),
            vec![None],
            Some("unused"),
            Ok(Vec::new()),
        )
        .await;

        let message = expect_error(result);
        assert!(message.contains("connection refused"));
        assert_eq!(stats.submits.load(Ordering::SeqCst), 0);
        assert_eq!(stats.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_browser_open_failure_is_contained() {
        let browser = MockBrowser {
            session: Mutex::new(None),
        };
        let scraper = TracuunntScraper::new(Arc::new(browser), Arc::new(MockSolver));
        let result = scraper
            .lookup(Arc::new(Semaphore::new(1)), QueryKind::Mst, "8387301332")
            .await;

        let message = expect_error(result);
        assert!(message.contains("no session scripted"));
    }

    #[tokio::test]
    async fn test_row_filtering_and_cell_cleaning() {
        let (result, _stats) = run_scripted(
            vec![None],
            Some("Danh sách kết quả"),
            Ok(vec![
                header_row(),
                styled_row("background:none", &["x", "x", "x", "x", "x", "x", "x"]),
                row(&[
                    "1",
                    "\n8387301332\t",
                    "  Nguyễn Văn A \n",
                    "Cục Thuế TP Hà Nội",
                    "\t012345678901",
                    "20/05/2023",
                    "",
                ]),
                row(&["2", "too", "few", "cells", "here", "now"]),
                row(&[
                    "3",
                    "0312345678",
                    "Trần Thị B",
                    "CCT Q3",
                    "079123456789",
                    "01/02/2024",
                    "NNT đang hoạt động",
                ]),
            ]),
        )
        .await;

        match result {
            LookupResult::Records { data } => {
                assert_eq!(data.len(), 2);
                assert_eq!(data[0].ordinal, "1");
                assert_eq!(data[0].tax_code, "8387301332");
                assert_eq!(data[0].taxpayer_name, "Nguyễn Văn A");
                assert_eq!(data[0].id_number, "012345678901");
                assert_eq!(data[0].note, "");
                assert_eq!(data[1].taxpayer_name, "Trần Thị B");
            }
            other => panic!("expected records, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_all_rows_filtered_yields_empty_data() {
        let (result, _stats) = run_scripted(
            vec![None],
            Some("Danh sách kết quả"),
            Ok(vec![header_row()]),
        )
        .await;

        match result {
            LookupResult::Records { data } => assert!(data.is_empty()),
            other => panic!("expected records, got {:?}", other),
        }
    }

    #[test]
    fn test_clean_cell() {
        assert_eq!(clean_cell("  a\tb\nc "), "abc");
        assert_eq!(clean_cell("plain"), "plain");
        assert_eq!(clean_cell("\n\t"), "");
    }

    #[test]
    fn test_collect_records_skips_header() {
        let rows = vec![
            header_row(),
            row(&["1", "a", "b", "c", "d", "e", "f"]),
        ];
        let records = collect_records(&rows);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].ordinal, "1");
    }

    #[tokio::test]
    #[ignore] // live portal test: cargo test test_live_lookup -- --ignored --nocapture
    async fn test_live_lookup() {
        use crate::config::ScraperConfig;
        use crate::ocr::OcrClient;
        use crate::tracuunnt::browser::ChromeBrowser;

        tracing_subscriber::fmt()
            .with_env_filter("info,tracuunnt_service=debug")
            .init();

        let mst = std::env::var("TEST_MST").expect("TEST_MST not set");

        let config = ScraperConfig::default();
        let scraper = TracuunntScraper::new(
            Arc::new(ChromeBrowser::new(config.clone())),
            Arc::new(OcrClient::new(config.ocr_url, config.ocr_model)),
        );

        let result = scraper
            .lookup(Arc::new(Semaphore::new(1)), QueryKind::Mst, &mst)
            .await;

        println!("\n=== Lookup Result ===");
        println!("{}", serde_json::to_string_pretty(&result).unwrap());
    }
}
