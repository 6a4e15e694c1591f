//! Response envelope of the historical-rates endpoint.
//!
//! ```json
//! {
//!   "meta": { "last_updated_at": "2024-03-08T23:59:59Z" },
//!   "data": { "USD": { "code": "USD", "value": 1.0856 } }
//! }
//! ```

use std::collections::HashMap;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(crate) struct HistoricalResponse {
    #[serde(default)]
    pub data: HashMap<String, CurrencyValue>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CurrencyValue {
    /// A JSON number, occasionally a numeric string, or `null` when the
    /// provider has no quote.
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

impl CurrencyValue {
    pub(crate) fn as_text(&self) -> Option<String> {
        match self.value.as_ref()? {
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::String(s) => Some(s.trim().to_owned()),
            _ => None,
        }
    }
}
