use std::fmt::Write;
use std::io::Read;

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::app::AppContext;
use crate::error::PredictError;
use crate::model::ModelArtifacts;
use crate::models::{self, format_number, group_thousands, FeatureVector, PredictionRecord};

/// What happened to the persisted row during a prediction.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveStatus {
    Saved,
    NotConfigured,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionReport {
    pub estimate: f64,
    pub record: PredictionRecord,
    pub save_status: SaveStatus,
    pub sheet_url: String,
}

/// Revenue estimate: `expm1` of the model output on the scaled features.
pub fn estimate_revenue(
    artifacts: &ModelArtifacts,
    features: &FeatureVector,
) -> Result<f64, PredictError> {
    let log_estimate = artifacts.predict_log(features);
    let estimate = log_estimate.exp_m1();
    if !estimate.is_finite() {
        return Err(PredictError::NonFinite(log_estimate));
    }
    Ok(estimate)
}

/// Whole currency units with `,` thousands separators.
pub fn format_currency(value: f64) -> String {
    group_thousands(&format!("{value:.0}"))
}

pub fn validate(features: &FeatureVector) -> Result<(), PredictError> {
    if features.is_all_zero() {
        return Err(PredictError::EmptyInput);
    }
    if let Some((field, reason)) = features.first_invalid() {
        return Err(PredictError::InvalidField {
            field: field.label,
            reason,
        });
    }
    Ok(())
}

/// Runs one prediction and overwrites the persisted row with it. A failed
/// row write is reported in the result, it never fails the prediction.
pub async fn predict_and_save(
    ctx: &AppContext,
    features: FeatureVector,
) -> Result<PredictionReport, PredictError> {
    let artifacts = ctx.models.get().ok_or(PredictError::ModelsUnavailable)?;
    validate(&features)?;

    let estimate = estimate_revenue(artifacts, &features)?;
    let record = PredictionRecord {
        timestamp: models::timestamp_now(),
        features,
        estimate: Some(format_currency(estimate)),
    };
    info!(estimate, "prediction computed");

    let save_status = match ctx.sheet.get() {
        Some(store) => match store.write_row(&record).await {
            Ok(()) => SaveStatus::Saved,
            Err(err) => {
                warn!(error = %err, "failed to persist prediction row");
                SaveStatus::Failed(err.to_string())
            }
        },
        None => SaveStatus::NotConfigured,
    };

    Ok(PredictionReport {
        estimate,
        record,
        save_status,
        sheet_url: ctx.sheet_url().to_string(),
    })
}

/// One scored line of a batch file; `row` is 1-based and excludes the header.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEstimate {
    pub row: usize,
    pub features: FeatureVector,
    pub outcome: Result<f64, PredictError>,
}

/// Scores a CSV of feature rows, headed by the field keys in any order.
/// Rows that fail validation are kept with their error; unparseable rows
/// abort the batch.
pub fn score_records<R: Read>(
    artifacts: &ModelArtifacts,
    reader: R,
) -> anyhow::Result<Vec<BatchEstimate>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut estimates = Vec::new();
    for (index, record) in reader.deserialize::<FeatureVector>().enumerate() {
        let row = index + 1;
        let features = record.with_context(|| format!("invalid CSV row {row}"))?;
        let outcome = validate(&features).and_then(|()| estimate_revenue(artifacts, &features));
        if let Err(err) = &outcome {
            debug!(row, error = %err, "batch row skipped");
        }
        estimates.push(BatchEstimate {
            row,
            features,
            outcome,
        });
    }
    Ok(estimates)
}

impl PredictionReport {
    pub fn to_markdown(&self) -> String {
        let features = &self.record.features;
        let mut output = String::new();

        let _ = writeln!(output, "## Prediction complete");
        let _ = writeln!(output);
        let _ = writeln!(output, "**Estimated revenue: ${}**", format_currency(self.estimate));
        let _ = writeln!(output);
        let _ = writeln!(output, "**Inputs used:**");
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "- Interactions: {}",
            group_thousands(&format_number(features.interactions))
        );
        let _ = writeln!(output, "- Advisors: {}", format_number(features.advisors));
        let _ = writeln!(
            output,
            "- Average interactions: {}",
            format_number(features.avg_interactions)
        );
        let _ = writeln!(
            output,
            "- Goal completion: {}%",
            format_number(features.goal_completion_pct)
        );
        let _ = writeln!(
            output,
            "- Participation: {}%",
            format_number(features.participation_pct)
        );
        let _ = writeln!(
            output,
            "- Average enrollments: {}",
            format_number(features.avg_enrollments)
        );
        let _ = writeln!(
            output,
            "- Monthly growth: {}%",
            format_number(features.monthly_growth_pct)
        );
        let _ = writeln!(
            output,
            "- Annual growth: {}%",
            format_number(features.annual_growth_pct)
        );
        let _ = writeln!(
            output,
            "- Interactions per advisor: {}",
            format_number(features.interactions_per_advisor)
        );
        let _ = writeln!(
            output,
            "- Enrollments per advisor: {}",
            format_number(features.enrollments_per_advisor)
        );
        let _ = writeln!(output);

        match &self.save_status {
            SaveStatus::Saved => {
                let _ = writeln!(output, "**Data saved to the spreadsheet**");
            }
            SaveStatus::NotConfigured => {
                let _ = writeln!(output, "Warning: spreadsheet not configured");
            }
            SaveStatus::Failed(reason) => {
                let _ = writeln!(output, "Warning: error saving to the spreadsheet: {reason}");
            }
        }
        let _ = writeln!(output);
        let _ = writeln!(output, "Timestamp: {}", self.record.timestamp);
        let _ = writeln!(output);
        let _ = writeln!(output, "[Open spreadsheet]({})", self.sheet_url);

        output
    }
}
