//! Types for the tracuunnt portal lookup.

use serde::{Deserialize, Serialize};

/// Banner text the portal shows when the captcha answer is rejected.
pub const CAPTCHA_REJECTED_BANNER: &str = "Vui lòng nhập đúng mã xác nhận!";

/// Status text the portal shows when no taxpayer matches the query.
pub const NOT_FOUND_MESSAGE: &str = "Không tìm thấy kết quả.";

/// Error message reported after every captcha attempt was rejected.
pub const CAPTCHA_EXHAUSTED_MESSAGE: &str = "Sai mã xác nhận quá nhiều lần";

/// Which form field a lookup value goes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// Citizen ID number (CCCD / old CMT).
    Cccd,
    /// Tax code (MST).
    Mst,
}

/// One taxpayer registration record, keyed by the portal's column names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxpayerRecord {
    #[serde(rename = "STT")]
    pub ordinal: String,
    #[serde(rename = "Mã số thuế")]
    pub tax_code: String,
    #[serde(rename = "Tên người nộp thuế")]
    pub taxpayer_name: String,
    #[serde(rename = "Cơ quan thuế")]
    pub tax_authority: String,
    #[serde(rename = "CMT/Thẻ căn cước")]
    pub id_number: String,
    #[serde(rename = "Ngày thay đổi thông tin gần nhất")]
    pub last_updated: String,
    #[serde(rename = "Ghi chú")]
    pub note: String,
}

/// Outcome of a single lookup.
///
/// Serialized untagged so the three variants keep the portal service's
/// wire shapes: `{"data": [...]}`, `{"data": "Không tìm thấy kết quả."}`
/// and `{"status": "error", "message": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LookupResult {
    Records { data: Vec<TaxpayerRecord> },
    NotFound { data: String },
    Error { status: String, message: String },
}

impl LookupResult {
    pub fn records(data: Vec<TaxpayerRecord>) -> Self {
        Self::Records { data }
    }

    pub fn not_found() -> Self {
        Self::NotFound {
            data: NOT_FOUND_MESSAGE.to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            status: "error".to_string(),
            message: message.into(),
        }
    }
}

/// One raw `<tr>` of the result table, in document order.
///
/// Header and hidden rows are included; filtering is the caller's job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRow {
    /// Inline `style` attribute, empty when the row has none.
    #[serde(default)]
    pub style: String,
    /// Text content of each `<td>` cell.
    #[serde(default)]
    pub cells: Vec<String>,
}
