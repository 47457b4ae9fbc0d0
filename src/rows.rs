use std::fmt::Write;

use tracing::info;

use crate::app::AppContext;
use crate::error::RowError;
use crate::models::{self, PredictionRecord, RowSnapshot};

pub const CLEARED_MESSAGE: &str = "Data cleared in the spreadsheet";
pub const NO_DATA_MESSAGE: &str = "No data in the spreadsheet yet";

/// Result of reading the persisted row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowView {
    Empty,
    Current(RowSnapshot),
}

/// Resets the row to a fresh timestamp, ten zeros and an empty estimate.
pub async fn clear(ctx: &AppContext) -> Result<PredictionRecord, RowError> {
    let store = ctx.sheet.get().ok_or(RowError::NotConfigured)?;
    let record = PredictionRecord::cleared(models::timestamp_now());
    store.write_row(&record).await.map_err(RowError::Write)?;
    info!(timestamp = %record.timestamp, "prediction row cleared");
    Ok(record)
}

pub async fn show(ctx: &AppContext) -> Result<RowView, RowError> {
    let store = ctx.sheet.get().ok_or(RowError::NotConfigured)?;
    let cells = store.read_row().await.map_err(RowError::Read)?;
    Ok(match RowSnapshot::from_cells(cells) {
        Some(snapshot) => RowView::Current(snapshot),
        None => RowView::Empty,
    })
}

pub fn render_row(view: &RowView, sheet_url: &str) -> String {
    let snapshot = match view {
        RowView::Empty => return NO_DATA_MESSAGE.to_string(),
        RowView::Current(snapshot) => snapshot,
    };

    let mut output = String::new();
    let _ = writeln!(output, "## Current data in the spreadsheet");
    let _ = writeln!(output);
    let _ = writeln!(output, "- Last update: {}", snapshot.timestamp());
    let _ = writeln!(output, "- Interactions: {}", snapshot.feature(0));
    let _ = writeln!(output, "- Advisors: {}", snapshot.feature(1));
    let _ = writeln!(output, "- Average interactions: {}", snapshot.feature(2));
    let _ = writeln!(output, "- Goal completion: {}%", snapshot.feature(3));
    let _ = writeln!(output, "- Participation: {}%", snapshot.feature(4));
    let _ = writeln!(output, "- Average enrollments: {}", snapshot.feature(5));
    let _ = writeln!(output, "- Monthly growth: {}%", snapshot.feature(6));
    let _ = writeln!(output, "- Annual growth: {}%", snapshot.feature(7));
    let _ = writeln!(output, "- Interactions per advisor: {}", snapshot.feature(8));
    let _ = writeln!(output, "- Enrollments per advisor: {}", snapshot.feature(9));
    let _ = writeln!(output);
    let _ = writeln!(output, "**Current result: {}**", snapshot.estimate());
    let _ = writeln!(output);
    let _ = writeln!(output, "[Open spreadsheet]({sheet_url})");
    output
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::app::tests::context;
    use crate::store::memory::MemoryRowStore;
    use crate::store::RowStore;

    #[tokio::test]
    async fn clear_then_show_yields_zeros_and_empty_estimate() {
        let mut existing = vec!["2026-01-01 08:00:00".to_string()];
        existing.extend(["1000", "5", "200", "85", "75", "50", "10", "15", "200", "10", "48,413"].map(String::from));
        let store = Arc::new(MemoryRowStore::with_row(existing));
        let ctx = context(true, Some(store.clone()));

        let record = clear(&ctx).await.unwrap();
        assert_eq!(store.writes(), 1);

        let RowView::Current(snapshot) = show(&ctx).await.unwrap() else {
            panic!("cleared row should still be initialized");
        };
        assert_eq!(snapshot.timestamp(), record.timestamp);
        assert!((0..10).all(|index| snapshot.feature(index) == "0"));
        assert_eq!(snapshot.estimate(), "");

        let rendered = render_row(&RowView::Current(snapshot), ctx.sheet_url());
        assert!(rendered.contains("- Interactions: 0"));
        assert!(rendered.contains("**Current result: **"));
    }

    #[tokio::test]
    async fn show_on_uninitialized_row_reports_no_data() {
        let ctx = context(true, Some(Arc::new(MemoryRowStore::new())));
        let view = show(&ctx).await.unwrap();
        assert_eq!(view, RowView::Empty);
        assert_eq!(render_row(&view, ctx.sheet_url()), NO_DATA_MESSAGE);

        let short = Arc::new(MemoryRowStore::with_row(vec!["".to_string(), "0".to_string()]));
        let ctx = context(true, Some(short));
        assert_eq!(show(&ctx).await.unwrap(), RowView::Empty);
    }

    #[tokio::test]
    async fn freshly_created_row_reports_no_data() {
        let store = Arc::new(MemoryRowStore::new());
        store.write_row(&PredictionRecord::blank()).await.unwrap();
        assert_eq!(store.row().len(), 11);

        let ctx = context(true, Some(store));
        let view = show(&ctx).await.unwrap();
        assert_eq!(view, RowView::Empty);
        assert_eq!(render_row(&view, ctx.sheet_url()), NO_DATA_MESSAGE);
    }

    #[tokio::test]
    async fn disabled_spreadsheet_is_not_configured() {
        let ctx = context(true, None);
        assert!(matches!(clear(&ctx).await, Err(RowError::NotConfigured)));
        let err = show(&ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "Spreadsheet not configured");
    }

    #[tokio::test]
    async fn remote_failures_are_reported_not_thrown() {
        let ctx = context(true, Some(Arc::new(MemoryRowStore::failing())));
        let err = clear(&ctx).await.unwrap_err();
        assert!(err.to_string().starts_with("Error clearing data"), "{err}");
        let err = show(&ctx).await.unwrap_err();
        assert!(err.to_string().starts_with("Error reading data"), "{err}");
    }

    #[test]
    fn full_row_renders_every_cell() {
        let mut cells = vec!["2026-03-01 09:30:00".to_string()];
        cells.extend(["1000", "5", "200", "85", "75", "50", "10", "15", "200", "10", "48,413"].map(String::from));
        let view = RowView::Current(RowSnapshot::from_cells(cells).unwrap());
        let rendered = render_row(&view, "https://docs.example.com/spreadsheets/d/x");
        assert!(rendered.contains("- Last update: 2026-03-01 09:30:00"));
        assert!(rendered.contains("- Goal completion: 85%"));
        assert!(rendered.contains("**Current result: 48,413**"));
        assert!(rendered.contains("[Open spreadsheet](https://docs.example.com/spreadsheets/d/x)"));
    }
}
