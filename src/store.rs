use async_trait::async_trait;

use crate::error::SheetsError;
use crate::models::PredictionRecord;

/// The single persisted data row.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Overwrites the row with the record's twelve cells.
    async fn write_row(&self, record: &PredictionRecord) -> Result<(), SheetsError>;

    /// Reads the row back as display strings, trailing empty cells trimmed.
    async fn read_row(&self) -> Result<Vec<String>, SheetsError>;

    /// Public read-only link to the backing spreadsheet.
    fn share_url(&self) -> &str;
}
