//! Google Sheets backend: whole-sheet reads and writes via the v4 values API.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::google::{TokenSource, failure_reason};
use crate::store::traits::{SheetBackend, Table};

const SHEETS_BASE_URL: &str = "https://sheets.googleapis.com";

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

/// Google Sheets backend. One worksheet per table, first row is the header.
pub struct GoogleSheetsBackend {
    spreadsheet_id: String,
    tokens: Arc<dyn TokenSource>,
    client: reqwest::Client,
    base_url: String,
}

impl GoogleSheetsBackend {
    pub fn new(
        spreadsheet_id: impl Into<String>,
        tokens: Arc<dyn TokenSource>,
        client: reqwest::Client,
    ) -> Self {
        let spreadsheet_id = spreadsheet_id.into();
        info!(spreadsheet = %spreadsheet_id, "Using Google Sheets backend");
        Self {
            spreadsheet_id,
            tokens,
            client,
            base_url: SHEETS_BASE_URL.to_string(),
        }
    }

    /// Point the client at a different host (used against a local fake).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn values_url(&self, sheet: &str, range_suffix: &str) -> Result<Url, DatabaseError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| DatabaseError::Remote {
            sheet: sheet.to_string(),
            reason: format!("bad base url: {e}"),
        })?;
        url.path_segments_mut()
            .map_err(|_| DatabaseError::Remote {
                sheet: sheet.to_string(),
                reason: "base url cannot have path segments".into(),
            })?
            .extend([
                "v4",
                "spreadsheets",
                self.spreadsheet_id.as_str(),
                "values",
                &format!("'{sheet}'{range_suffix}"),
            ]);
        Ok(url)
    }

    fn remote_err(sheet: &str, reason: impl Into<String>) -> DatabaseError {
        DatabaseError::Remote {
            sheet: sheet.to_string(),
            reason: reason.into(),
        }
    }

    async fn bearer(&self) -> Result<String, DatabaseError> {
        let token = self.tokens.access_token().await?;
        Ok(format!("Bearer {}", token.expose_secret()))
    }
}

/// Sheets returns formatted strings by default, but be tolerant of numbers/bools.
fn cell_to_string(v: serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// A values update only overwrites the cells it covers, so rows left over from
/// a longer table would survive. Every write clears the sheet first.
#[async_trait]
impl SheetBackend for GoogleSheetsBackend {
    fn name(&self) -> &str {
        "google-sheets"
    }

    async fn read_table(&self, sheet: &str) -> Result<Table, DatabaseError> {
        let url = self.values_url(sheet, "")?;
        let resp = self
            .client
            .get(url)
            .header(reqwest::header::AUTHORIZATION, self.bearer().await?)
            .send()
            .await
            .map_err(|e| Self::remote_err(sheet, e.to_string()))?;

        if !resp.status().is_success() {
            return Err(Self::remote_err(sheet, failure_reason(resp).await));
        }

        let range: ValueRange = resp
            .json()
            .await
            .map_err(|e| Self::remote_err(sheet, format!("bad values payload: {e}")))?;

        let values = range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect();
        let table = Table::from_values(values);
        debug!(sheet, rows = table.len(), "Sheet fetched");
        Ok(table)
    }

    async fn write_table(&self, sheet: &str, table: &Table) -> Result<(), DatabaseError> {
        let auth = self.bearer().await?;

        let clear_url = self.values_url(sheet, ":clear")?;
        let resp = self
            .client
            .post(clear_url)
            .header(reqwest::header::AUTHORIZATION, &auth)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| Self::remote_err(sheet, e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Self::remote_err(sheet, failure_reason(resp).await));
        }

        let mut update_url = self.values_url(sheet, "!A1")?;
        update_url
            .query_pairs_mut()
            .append_pair("valueInputOption", "RAW");
        let body = serde_json::json!({
            "range": format!("'{sheet}'!A1"),
            "majorDimension": "ROWS",
            "values": table.to_values(),
        });
        let resp = self
            .client
            .put(update_url)
            .header(reqwest::header::AUTHORIZATION, &auth)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::remote_err(sheet, e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Self::remote_err(sheet, failure_reason(resp).await));
        }

        debug!(sheet, rows = table.len(), "Sheet pushed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use axum::extract::{Path, State};
    use axum::routing::get;
    use axum::{Json, Router};
    use secrecy::SecretString;

    use super::*;
    use crate::google::StaticToken;

    type Sheets = Arc<Mutex<HashMap<String, Vec<Vec<serde_json::Value>>>>>;

    /// Strip `'name'` quoting and any `!A1` / `:clear` suffix from a range segment.
    fn sheet_of(range: &str) -> String {
        let range = range.split(':').next().unwrap_or(range);
        let range = range.split('!').next().unwrap_or(range);
        range.trim_matches('\'').to_string()
    }

    async fn get_values(
        State(sheets): State<Sheets>,
        Path((_id, range)): Path<(String, String)>,
    ) -> Json<serde_json::Value> {
        let sheets = sheets.lock().unwrap();
        match sheets.get(&sheet_of(&range)) {
            Some(values) => Json(serde_json::json!({ "values": values })),
            None => Json(serde_json::json!({})),
        }
    }

    async fn clear_or_update(
        State(sheets): State<Sheets>,
        Path((_id, range)): Path<(String, String)>,
        Json(body): Json<serde_json::Value>,
    ) -> Json<serde_json::Value> {
        let mut sheets = sheets.lock().unwrap();
        let name = sheet_of(&range);
        if range.ends_with(":clear") {
            sheets.remove(&name);
        } else {
            let values = body["values"]
                .as_array()
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|r| r.as_array().cloned().unwrap_or_default())
                .collect();
            sheets.insert(name, values);
        }
        Json(serde_json::json!({}))
    }

    async fn fake_sheets(seed: Sheets) -> String {
        let app = Router::new()
            .route(
                "/v4/spreadsheets/{id}/values/{range}",
                get(get_values).put(clear_or_update).post(clear_or_update),
            )
            .with_state(seed);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        format!("http://127.0.0.1:{port}")
    }

    fn backend(base: String) -> GoogleSheetsBackend {
        let tokens: Arc<dyn TokenSource> = Arc::new(StaticToken::new(SecretString::from("t")));
        GoogleSheetsBackend::new("sheet-id", tokens, reqwest::Client::new()).with_base_url(base)
    }

    #[tokio::test]
    async fn read_pads_ragged_rows_and_stringifies() {
        let sheets: Sheets = Arc::default();
        sheets.lock().unwrap().insert(
            "notes".into(),
            vec![
                vec!["날짜".into(), "내용".into(), "완료".into()],
                vec!["2026-01-04".into(), serde_json::json!(42)],
            ],
        );
        let db = backend(fake_sheets(sheets).await);

        let t = db.read_table("notes").await.unwrap();
        assert_eq!(t.rows[0], vec!["2026-01-04", "42", ""]);
    }

    #[tokio::test]
    async fn empty_sheet_reads_uninitialized() {
        let db = backend(fake_sheets(Arc::default()).await);
        assert!(db.read_table("chats").await.unwrap().is_uninitialized());
    }

    #[tokio::test]
    async fn write_clears_then_replaces() {
        let sheets: Sheets = Arc::default();
        let db = backend(fake_sheets(Arc::clone(&sheets)).await);

        let mut t = Table::new(["메뉴명", "업무설명"]);
        t.push_record(&[("메뉴명", "A".into()), ("업무설명", "desc".into())]);
        db.write_table("config", &t).await.unwrap();

        let back = db.read_table("config").await.unwrap();
        assert_eq!(back, t);
        assert_eq!(sheets.lock().unwrap()["config"].len(), 2);
    }

    #[test]
    fn values_url_quotes_sheet_name() {
        let db = backend("https://sheets.example".into());
        let url = db.values_url("notes", ":clear").unwrap();
        assert!(url.as_str().starts_with("https://sheets.example/v4/spreadsheets/sheet-id/values/"));
        assert!(url.as_str().ends_with(":clear"));
        assert!(url.as_str().contains("notes"));
    }
}
