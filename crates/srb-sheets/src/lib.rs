//! Google Sheets adapter (record store port).
//!
//! Talks to the Sheets v4 REST values API with a bearer token supplied by
//! config; acquiring that token is the deployment's problem, not this
//! crate's. The sheet is shared with external editors, so every read fetches
//! the full value range and every write is a plain append.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;

use srb_core::{
    errors::Error,
    records::{SubmissionRecord, HEADERS},
    store::RecordStore,
    Result,
};

const API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

pub struct SheetsClient {
    http: reqwest::Client,
    token: String,
    sheet_id: String,
    sheet_name: String,
    /// Header row is re-synchronized lazily, once per process, before the
    /// first write.
    headers_synced: Mutex<bool>,
}

#[derive(Serialize)]
struct ValueRange {
    values: Vec<Vec<String>>,
}

impl SheetsClient {
    pub fn new(
        token: impl Into<String>,
        sheet_id: impl Into<String>,
        sheet_name: impl Into<String>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("reqwest client build");
        Self {
            http,
            token: token.into(),
            sheet_id: sheet_id.into(),
            sheet_name: sheet_name.into(),
            headers_synced: Mutex::new(false),
        }
    }

    fn values_url(&self, range: &str) -> String {
        // Spaces are the only characters we expect in sheet names.
        let range = range.replace(' ', "%20");
        format!("{API_BASE}/{}/values/{}", self.sheet_id, range)
    }

    async fn fetch_range(&self, range: &str) -> Result<Vec<Vec<String>>> {
        let resp = self
            .http
            .get(self.values_url(range))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| Error::StoreRead(format!("sheets request error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::StoreRead(format!(
                "sheets read failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let v: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::StoreRead(format!("sheets json error: {e}")))?;
        Ok(parse_values(&v))
    }

    async fn ensure_headers(&self) -> Result<()> {
        let mut synced = self.headers_synced.lock().await;
        if *synced {
            return Ok(());
        }

        let first_row = self
            .fetch_range(&format!("{}!1:1", self.sheet_name))
            .await
            .map_err(|e| Error::StoreWrite(format!("header check failed: {e}")))?
            .into_iter()
            .next()
            .unwrap_or_default();

        if first_row != HEADERS {
            let body = ValueRange {
                values: vec![HEADERS.iter().map(|h| h.to_string()).collect()],
            };
            let url = format!(
                "{}?valueInputOption=RAW",
                self.values_url(&format!("{}!A1", self.sheet_name))
            );
            let resp = self
                .http
                .put(url)
                .bearer_auth(&self.token)
                .json(&body)
                .send()
                .await
                .map_err(|e| Error::StoreWrite(format!("header sync error: {e}")))?;
            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(Error::StoreWrite(format!(
                    "header sync failed: {status} {}",
                    body.chars().take(200).collect::<String>()
                )));
            }
        }

        *synced = true;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for SheetsClient {
    async fn append(&self, record: &SubmissionRecord) -> Result<()> {
        self.ensure_headers().await?;

        let body = ValueRange {
            values: vec![record.to_row()],
        };
        let url = format!(
            "{}:append?valueInputOption=USER_ENTERED",
            self.values_url(&self.sheet_name)
        );
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::StoreWrite(format!("sheets append error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::StoreWrite(format!(
                "sheets append failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<SubmissionRecord>> {
        let rows = self.fetch_range(&self.sheet_name).await?;
        Ok(records_from_rows(rows))
    }
}

/// Extract the `values` grid from a values-API response. Numeric and boolean
/// cells are rendered as their display strings, matching how the bot treats
/// every field as text.
fn parse_values(v: &serde_json::Value) -> Vec<Vec<String>> {
    let Some(rows) = v.get("values").and_then(|x| x.as_array()) else {
        return Vec::new();
    };
    rows.iter()
        .map(|row| {
            row.as_array()
                .map(|cells| cells.iter().map(cell_to_string).collect())
                .unwrap_or_default()
        })
        .collect()
}

fn cell_to_string(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// First row is the header; remaining rows map to records by header name.
fn records_from_rows(rows: Vec<Vec<String>>) -> Vec<SubmissionRecord> {
    let mut rows = rows.into_iter();
    let Some(header) = rows.next() else {
        return Vec::new();
    };
    rows.map(|row| SubmissionRecord::from_row(&header, &row))
        .collect()
}
