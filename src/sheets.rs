//! Spreadsheet binding over the Sheets v4 and Drive v3 REST APIs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::GoogleEndpoints;
use crate::credentials::TokenSource;
use crate::error::SheetsError;
use crate::models::{PredictionRecord, HEADER};
use crate::store::RowStore;

pub const HEADER_RANGE: &str = "A1:L1";
pub const DATA_RANGE: &str = "A2:L2";

const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";
const REQUEST_TIMEOUT_SECS: u64 = 30;

pub fn http_client() -> Result<reqwest::Client, SheetsError> {
    reqwest::Client::builder()
        .user_agent(concat!("revenue-estimator/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .map_err(|err| SheetsError::Network(err.to_string()))
}

#[derive(Clone)]
pub struct SheetsClient {
    http: reqwest::Client,
    tokens: Arc<TokenSource>,
    endpoints: GoogleEndpoints,
}

impl SheetsClient {
    pub fn new(http: reqwest::Client, tokens: Arc<TokenSource>, endpoints: GoogleEndpoints) -> Self {
        Self {
            http,
            tokens,
            endpoints,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, SheetsError> {
        let token = self.tokens.access_token().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| SheetsError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SheetsError::Http(status.as_u16(), body));
        }

        response
            .json()
            .await
            .map_err(|err| SheetsError::Parse(err.to_string()))
    }

    /// Id of the first non-trashed spreadsheet with this exact name.
    pub async fn find_spreadsheet(&self, name: &str) -> Result<Option<String>, SheetsError> {
        let url = format!("{}/drive/v3/files", self.endpoints.drive_api);
        let query = format!(
            "name = '{}' and mimeType = '{}' and trashed = false",
            escape_query(name),
            SPREADSHEET_MIME
        );
        let body = self
            .send(
                self.http
                    .get(&url)
                    .query(&[("q", query.as_str()), ("fields", "files(id,name)"), ("spaces", "drive")]),
            )
            .await?;

        let files = body["files"]
            .as_array()
            .ok_or_else(|| SheetsError::Parse("missing files list".to_string()))?;
        Ok(files
            .iter()
            .find_map(|file| file["id"].as_str().map(str::to_string)))
    }

    pub async fn create_spreadsheet(&self, name: &str) -> Result<String, SheetsError> {
        let url = format!("{}/v4/spreadsheets", self.endpoints.sheets_api);
        let body = self
            .send(
                self.http
                    .post(&url)
                    .json(&json!({ "properties": { "title": name } })),
            )
            .await?;

        body["spreadsheetId"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| SheetsError::Parse("missing spreadsheetId".to_string()))
    }

    /// Grants read access to anyone holding the link.
    pub async fn share_public(&self, spreadsheet_id: &str) -> Result<(), SheetsError> {
        let url = format!(
            "{}/drive/v3/files/{}/permissions",
            self.endpoints.drive_api, spreadsheet_id
        );
        self.send(
            self.http
                .post(&url)
                .json(&json!({ "type": "anyone", "role": "reader" })),
        )
        .await?;
        Ok(())
    }

    pub async fn update_range(
        &self,
        spreadsheet_id: &str,
        range: &str,
        row: Vec<Value>,
    ) -> Result<(), SheetsError> {
        let url = self.values_url(spreadsheet_id, range);
        self.send(
            self.http
                .put(&url)
                .query(&[("valueInputOption", "RAW")])
                .json(&json!({
                    "range": range,
                    "majorDimension": "ROWS",
                    "values": [row],
                })),
        )
        .await?;
        debug!(spreadsheet_id, range, "range updated");
        Ok(())
    }

    /// First row of `range`; empty when the range holds no values.
    pub async fn get_row(&self, spreadsheet_id: &str, range: &str) -> Result<Vec<String>, SheetsError> {
        let url = self.values_url(spreadsheet_id, range);
        let body = self
            .send(self.http.get(&url).query(&[("majorDimension", "ROWS")]))
            .await?;

        let Some(rows) = body["values"].as_array() else {
            return Ok(Vec::new());
        };
        Ok(rows
            .first()
            .and_then(Value::as_array)
            .map(|cells| cells.iter().map(cell_text).collect())
            .unwrap_or_default())
    }

    fn values_url(&self, spreadsheet_id: &str, range: &str) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.endpoints.sheets_api, spreadsheet_id, range
        )
    }
}

fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn cell_text(cell: &Value) -> String {
    match cell {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// The bound spreadsheet: row 2 of its first worksheet.
pub struct BoundSheet {
    client: SheetsClient,
    spreadsheet_id: String,
    url: String,
}

impl BoundSheet {
    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }
}

/// Opens the named spreadsheet, creating, initializing and sharing it when it
/// does not exist yet.
pub async fn bind(client: SheetsClient, name: &str) -> Result<BoundSheet, SheetsError> {
    let spreadsheet_id = match client.find_spreadsheet(name).await? {
        Some(id) => {
            info!(spreadsheet = name, %id, "connected to existing spreadsheet");
            id
        }
        None => {
            let id = client.create_spreadsheet(name).await?;
            let header = HEADER.iter().map(|title| Value::from(*title)).collect();
            client.update_range(&id, HEADER_RANGE, header).await?;
            client
                .update_range(&id, DATA_RANGE, PredictionRecord::blank().to_cells())
                .await?;
            client.share_public(&id).await?;
            info!(spreadsheet = name, %id, "created spreadsheet");
            id
        }
    };

    let url = format!(
        "{}/spreadsheets/d/{}",
        client.endpoints.docs_base, spreadsheet_id
    );
    info!(%url, "spreadsheet link");
    Ok(BoundSheet {
        client,
        spreadsheet_id,
        url,
    })
}

#[async_trait]
impl RowStore for BoundSheet {
    async fn write_row(&self, record: &PredictionRecord) -> Result<(), SheetsError> {
        self.client
            .update_range(&self.spreadsheet_id, DATA_RANGE, record.to_cells())
            .await
    }

    async fn read_row(&self) -> Result<Vec<String>, SheetsError> {
        self.client.get_row(&self.spreadsheet_id, DATA_RANGE).await
    }

    fn share_url(&self) -> &str {
        &self.url
    }
}
