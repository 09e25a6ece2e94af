//! Google Sheets v4 backend.
//!
//! Every operation is a single REST call (or a lookup plus one call) made
//! with a bearer token. Structural edits go through `:batchUpdate`; values
//! go through the `values` endpoints. Status codes map to [`StoreError`]
//! variants and nothing is retried.

use std::collections::BTreeSet;

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::OnceCell;

use crate::{
    CellColor, DEFAULT_WORKSHEET, FIRST_DATA_ROW, StoreError, ValueInput, Worksheet, a1,
    validate_data_rows,
};

/// Default API base URL.
pub const DEFAULT_API_BASE: &str = "https://sheets.googleapis.com";

/// Row count of newly created worksheets.
const NEW_SHEET_ROWS: u32 = 1000;

/// Column count of newly created worksheets.
const NEW_SHEET_COLUMNS: u32 = 20;

/// Range searched for the data table when appending. Spanning whole
/// columns keeps the append below the last used row even when the sheet
/// has interior blank rows.
const APPEND_RANGE: &str = "A:ZZ";

/// Maximum characters of an error body kept in error messages.
const BODY_PREVIEW_LEN: usize = 500;

/// Connection settings for a spreadsheet worksheet.
#[derive(Debug, Clone)]
pub struct SheetsConfig {
    /// Spreadsheet ID.
    pub spreadsheet_id: String,
    /// Worksheet title.
    pub worksheet: String,
    /// OAuth bearer token.
    pub access_token: String,
    /// API base URL.
    pub api_base: String,
}

impl SheetsConfig {
    /// Reads the settings from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MissingEnv`] if `SURVEY_SHEET_ID` or
    /// `GOOGLE_SHEETS_ACCESS_TOKEN` is not set.
    pub fn from_env() -> Result<Self, StoreError> {
        Ok(Self {
            spreadsheet_id: require_env("SURVEY_SHEET_ID")?,
            access_token: require_env("GOOGLE_SHEETS_ACCESS_TOKEN")?,
            worksheet: std::env::var("SURVEY_WORKSHEET")
                .unwrap_or_else(|_| DEFAULT_WORKSHEET.to_string()),
            api_base: std::env::var("GOOGLE_SHEETS_API_BASE")
                .unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
        })
    }
}

fn require_env(name: &str) -> Result<String, StoreError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| StoreError::MissingEnv {
            name: name.to_string(),
        })
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendResponse {
    updates: AppendUpdates,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendUpdates {
    updated_range: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchUpdateResponse {
    #[serde(default)]
    replies: Vec<Value>,
}

/// Which form of cell values a read returns.
#[derive(Debug, Clone, Copy)]
enum Render {
    Formatted,
    Formula,
}

impl Render {
    const fn as_api_str(self) -> &'static str {
        match self {
            Self::Formatted => "FORMATTED_VALUE",
            Self::Formula => "FORMULA",
        }
    }
}

/// A worksheet inside a Google spreadsheet.
#[derive(Debug)]
pub struct GoogleSheetsWorksheet {
    client: reqwest::Client,
    config: SheetsConfig,
    sheet_id: OnceCell<i64>,
}

impl GoogleSheetsWorksheet {
    /// Creates a client for the configured worksheet. No request is made
    /// until the first operation.
    #[must_use]
    pub fn new(config: SheetsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            sheet_id: OnceCell::new(),
        }
    }

    /// Builds `{base}/v4/spreadsheets/{id}{suffix}`, or
    /// `{base}/v4/spreadsheets/{id}/values/{range}{suffix}` when a range is
    /// given. Without a range, `/` in the suffix separates path segments.
    /// Segments are percent-escaped.
    fn url(&self, suffix: &str, values_range: Option<&str>) -> Result<Url, StoreError> {
        let mut url = Url::parse(&self.config.api_base).map_err(|e| StoreError::Config {
            message: format!("invalid API base '{}': {e}", self.config.api_base),
        })?;
        {
            let mut segments = url.path_segments_mut().map_err(|()| StoreError::Config {
                message: format!("API base cannot hold a path: {}", self.config.api_base),
            })?;
            segments.pop_if_empty();
            segments.extend(["v4", "spreadsheets"]);
            match values_range {
                Some(range) => {
                    segments.push(&self.config.spreadsheet_id);
                    segments.push("values");
                    segments.push(&format!("{range}{suffix}"));
                }
                None => {
                    let mut parts = suffix.split('/');
                    let head = parts.next().unwrap_or_default();
                    segments.push(&format!("{}{head}", self.config.spreadsheet_id));
                    segments.extend(parts);
                }
            }
        }
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value, StoreError> {
        log::debug!("{method} {url}");

        let mut req = self
            .client
            .request(method, url)
            .bearer_auth(&self.config.access_token)
            .query(query);
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(status_error(status, &text, &self.config));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn batch_update(&self, requests: Vec<Value>) -> Result<BatchUpdateResponse, StoreError> {
        let url = self.url(":batchUpdate", None)?;
        let body = json!({ "requests": requests });
        let value = self.send(Method::POST, url, &[], Some(&body)).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn lookup_sheet_id(&self) -> Result<Option<i64>, StoreError> {
        let url = self.url("", None)?;
        let value = self
            .send(
                Method::GET,
                url,
                &[("fields", "sheets.properties(sheetId,title)")],
                None,
            )
            .await?;
        let meta: SpreadsheetMeta = serde_json::from_value(value)?;
        Ok(meta
            .sheets
            .into_iter()
            .find(|s| s.properties.title == self.config.worksheet)
            .map(|s| s.properties.sheet_id))
    }

    async fn sheet_id(&self) -> Result<i64, StoreError> {
        self.sheet_id
            .get_or_try_init(|| async {
                self.lookup_sheet_id()
                    .await?
                    .ok_or_else(|| StoreError::NotFound {
                        what: format!("worksheet '{}'", self.config.worksheet),
                    })
            })
            .await
            .copied()
    }

    async fn read_values(
        &self,
        cells: &str,
        render: Render,
    ) -> Result<Vec<Vec<String>>, StoreError> {
        let range = a1::range(&self.config.worksheet, cells);
        let url = self.url("", Some(&range))?;
        let value = self
            .send(
                Method::GET,
                url,
                &[
                    ("valueRenderOption", render.as_api_str()),
                    ("majorDimension", "ROWS"),
                ],
                None,
            )
            .await?;
        let range: ValueRange = serde_json::from_value(value)?;
        Ok(range
            .values
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect())
    }

    async fn write_values(&self, cells: &str, values: Vec<Vec<String>>) -> Result<(), StoreError> {
        let range = a1::range(&self.config.worksheet, cells);
        let url = self.url("", Some(&range))?;
        let body = json!({ "range": range, "majorDimension": "ROWS", "values": values });
        self.send(
            Method::PUT,
            url,
            &[("valueInputOption", ValueInput::Raw.as_api_str())],
            Some(&body),
        )
        .await?;
        Ok(())
    }

    async fn data_rows(&self, render: Render) -> Result<Vec<Vec<String>>, StoreError> {
        self.read_values(&format!("A{FIRST_DATA_ROW}:ZZ"), render).await
    }

    fn dimension_range(sheet_id: i64, dimension: &str, start: u32, end: u32) -> Value {
        json!({
            "sheetId": sheet_id,
            "dimension": dimension,
            "startIndex": start,
            "endIndex": end,
        })
    }
}

/// Converts a returned cell to text. Formula reads may return numbers and
/// booleans as JSON scalars.
fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    }
}

fn status_error(status: StatusCode, body: &str, config: &SheetsConfig) -> StoreError {
    let message: String = body.chars().take(BODY_PREVIEW_LEN).collect();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Auth { message },
        StatusCode::NOT_FOUND => StoreError::NotFound {
            what: format!(
                "spreadsheet '{}' worksheet '{}'",
                config.spreadsheet_id, config.worksheet
            ),
        },
        StatusCode::TOO_MANY_REQUESTS => StoreError::Quota,
        other => StoreError::Http {
            status: other.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl Worksheet for GoogleSheetsWorksheet {
    async fn ensure_worksheet(&self) -> Result<(), StoreError> {
        if self.sheet_id.get().is_some() {
            return Ok(());
        }
        if let Some(id) = self.lookup_sheet_id().await? {
            let _ = self.sheet_id.set(id);
            return Ok(());
        }

        log::info!(
            "Creating worksheet '{}' in spreadsheet {}",
            self.config.worksheet,
            self.config.spreadsheet_id
        );
        let resp = self
            .batch_update(vec![json!({
                "addSheet": {
                    "properties": {
                        "title": self.config.worksheet,
                        "gridProperties": {
                            "rowCount": NEW_SHEET_ROWS,
                            "columnCount": NEW_SHEET_COLUMNS,
                        },
                    },
                },
            })])
            .await?;

        let id = resp
            .replies
            .first()
            .and_then(|r| r.pointer("/addSheet/properties/sheetId"))
            .and_then(Value::as_i64)
            .ok_or_else(|| StoreError::UnexpectedResponse {
                message: "addSheet reply without sheetId".to_string(),
            })?;
        let _ = self.sheet_id.set(id);
        Ok(())
    }

    async fn header(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .read_values("1:1", Render::Formatted)
            .await?
            .into_iter()
            .next()
            .unwrap_or_default())
    }

    async fn write_header(&self, columns: &[String]) -> Result<(), StoreError> {
        let width = u32::try_from(columns.len()).unwrap_or(u32::MAX).max(1);
        let cells = format!("A1:{}1", a1::column_letters(width));
        self.write_values(&cells, vec![columns.to_vec()]).await
    }

    async fn append(&self, values: &[String], input: ValueInput) -> Result<u32, StoreError> {
        let range = a1::range(&self.config.worksheet, APPEND_RANGE);
        let url = self.url(":append", Some(&range))?;
        let body = json!({ "majorDimension": "ROWS", "values": [values] });
        let value = self
            .send(
                Method::POST,
                url,
                &[
                    ("valueInputOption", input.as_api_str()),
                    ("insertDataOption", "INSERT_ROWS"),
                ],
                Some(&body),
            )
            .await?;
        let resp: AppendResponse = serde_json::from_value(value)?;
        a1::first_row_of_range(&resp.updates.updated_range).ok_or_else(|| {
            StoreError::UnexpectedResponse {
                message: format!("unparseable updated range '{}'", resp.updates.updated_range),
            }
        })
    }

    async fn fetch_all_rendered(&self) -> Result<Vec<Vec<String>>, StoreError> {
        self.data_rows(Render::Formatted).await
    }

    async fn fetch_all_raw(&self) -> Result<Vec<Vec<String>>, StoreError> {
        self.data_rows(Render::Formula).await
    }

    async fn format_cell(
        &self,
        row: u32,
        column: u32,
        color: CellColor,
    ) -> Result<(), StoreError> {
        if row == 0 {
            return Err(StoreError::InvalidRow { row });
        }
        if column == 0 {
            return Err(StoreError::InvalidColumn { column });
        }
        let sheet_id = self.sheet_id().await?;
        let (red, green, blue) = color.fractions();
        self.batch_update(vec![json!({
            "repeatCell": {
                "range": {
                    "sheetId": sheet_id,
                    "startRowIndex": row - 1,
                    "endRowIndex": row,
                    "startColumnIndex": column - 1,
                    "endColumnIndex": column,
                },
                "cell": {
                    "userEnteredFormat": {
                        "backgroundColor": { "red": red, "green": green, "blue": blue },
                    },
                },
                "fields": "userEnteredFormat.backgroundColor",
            },
        })])
        .await?;
        Ok(())
    }

    async fn write_cells(&self, column: u32, cells: &[(u32, String)]) -> Result<(), StoreError> {
        if column == 0 {
            return Err(StoreError::InvalidColumn { column });
        }
        if let Some((row, _)) = cells.iter().find(|(row, _)| *row < FIRST_DATA_ROW) {
            return Err(StoreError::InvalidRow { row: *row });
        }
        if cells.is_empty() {
            return Ok(());
        }

        let letters = a1::column_letters(column);
        let data: Vec<Value> = cells
            .iter()
            .map(|(row, value)| {
                json!({
                    "range": a1::range(&self.config.worksheet, &format!("{letters}{row}")),
                    "majorDimension": "ROWS",
                    "values": [[value]],
                })
            })
            .collect();
        let url = self.url("/values:batchUpdate", None)?;
        let body = json!({
            "valueInputOption": ValueInput::Raw.as_api_str(),
            "data": data,
        });
        self.send(Method::POST, url, &[], Some(&body)).await?;
        Ok(())
    }

    async fn insert_column(&self, name: &str) -> Result<(), StoreError> {
        let sheet_id = self.sheet_id().await?;
        let width = u32::try_from(self.header().await?.len()).unwrap_or(u32::MAX - 1);
        self.batch_update(vec![json!({
            "appendDimension": {
                "sheetId": sheet_id,
                "dimension": "COLUMNS",
                "length": 1,
            },
        })])
        .await?;
        let cell = format!("{}1", a1::column_letters(width + 1));
        self.write_values(&cell, vec![vec![name.to_string()]]).await
    }

    async fn delete_column(&self, column: u32) -> Result<(), StoreError> {
        if column == 0 {
            return Err(StoreError::InvalidColumn { column });
        }
        let sheet_id = self.sheet_id().await?;
        self.batch_update(vec![json!({
            "deleteDimension": {
                "range": Self::dimension_range(sheet_id, "COLUMNS", column - 1, column),
            },
        })])
        .await?;
        Ok(())
    }

    async fn delete_rows(&self, rows: &BTreeSet<u32>) -> Result<(), StoreError> {
        validate_data_rows(rows)?;
        if rows.is_empty() {
            return Ok(());
        }
        let sheet_id = self.sheet_id().await?;
        let requests = rows
            .iter()
            .rev()
            .map(|row| {
                json!({
                    "deleteDimension": {
                        "range": Self::dimension_range(sheet_id, "ROWS", row - 1, *row),
                    },
                })
            })
            .collect();
        self.batch_update(requests).await?;
        Ok(())
    }

    async fn clear_all_data_rows(&self) -> Result<(), StoreError> {
        let data = self.data_rows(Render::Formatted).await?;
        if data.is_empty() {
            return Ok(());
        }
        let sheet_id = self.sheet_id().await?;
        let last = u32::try_from(data.len()).unwrap_or(u32::MAX - FIRST_DATA_ROW) + 1;
        self.batch_update(vec![json!({
            "deleteDimension": {
                "range": Self::dimension_range(sheet_id, "ROWS", FIRST_DATA_ROW - 1, last),
            },
        })])
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SheetsConfig {
        SheetsConfig {
            spreadsheet_id: "abc123".to_string(),
            worksheet: "Hoja de respuestas".to_string(),
            access_token: "token".to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    #[test]
    fn builds_batch_update_url() {
        let ws = GoogleSheetsWorksheet::new(config());
        let url = ws.url(":batchUpdate", None).unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc123:batchUpdate"
        );
    }

    #[test]
    fn escapes_worksheet_title_in_values_url() {
        let ws = GoogleSheetsWorksheet::new(config());
        let range = a1::range(&ws.config.worksheet, APPEND_RANGE);
        let url = ws.url(":append", Some(&range)).unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc123/values/'Hoja%20de%20respuestas'!A:ZZ:append"
        );
    }

    #[test]
    fn builds_values_batch_update_url() {
        let ws = GoogleSheetsWorksheet::new(config());
        let url = ws.url("/values:batchUpdate", None).unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc123/values:batchUpdate"
        );
    }

    #[test]
    fn maps_status_codes() {
        let c = config();
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "nope", &c),
            StoreError::Auth { .. }
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, "nope", &c),
            StoreError::Auth { .. }
        ));
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, "", &c),
            StoreError::NotFound { .. }
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, "", &c),
            StoreError::Quota
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, "upstream", &c),
            StoreError::Http { status: 502, .. }
        ));
    }

    #[test]
    fn truncates_error_bodies() {
        let body = "x".repeat(BODY_PREVIEW_LEN * 2);
        match status_error(StatusCode::INTERNAL_SERVER_ERROR, &body, &config()) {
            StoreError::Http { message, .. } => assert_eq!(message.len(), BODY_PREVIEW_LEN),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn converts_scalar_cells() {
        assert_eq!(cell_text(&json!("a")), "a");
        assert_eq!(cell_text(&json!(9.948)), "9.948");
        assert_eq!(cell_text(&json!(true)), "TRUE");
        assert_eq!(cell_text(&Value::Null), "");
    }

    #[test]
    fn parses_value_ranges_without_values() {
        let range: ValueRange = serde_json::from_value(json!({ "range": "A2:ZZ" })).unwrap();
        assert!(range.values.is_empty());
    }

    #[test]
    fn parses_append_response() {
        let resp: AppendResponse = serde_json::from_value(json!({
            "spreadsheetId": "abc123",
            "updates": { "updatedRange": "'Respuestas'!A7:H7", "updatedRows": 1 }
        }))
        .unwrap();
        assert_eq!(a1::first_row_of_range(&resp.updates.updated_range), Some(7));
    }
}
