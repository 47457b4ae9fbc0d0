use chrono::Local;
use serde::Deserialize;
use serde_json::Value;

pub const FEATURE_COUNT: usize = 10;
pub const ROW_WIDTH: usize = FEATURE_COUNT + 2;
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const HEADER: [&str; ROW_WIDTH] = [
    "Timestamp",
    "Interactions",
    "Advisor_Count",
    "Average_Interactions",
    "Goal_Completion_Pct",
    "Participation_Pct",
    "Average_Enrollments",
    "Monthly_Growth_Pct",
    "Annual_Growth_Pct",
    "Interactions_Per_Advisor",
    "Enrollments_Per_Advisor",
    "Estimated_Revenue",
];

/// Input metadata for one metric. `key` doubles as the form field name, the
/// CSV column name and the scaler's fitted feature name.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub key: &'static str,
    pub label: &'static str,
    pub help: &'static str,
    pub default: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl FieldSpec {
    const fn new(
        key: &'static str,
        label: &'static str,
        help: &'static str,
        default: f64,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Self {
        Self {
            key,
            label,
            help,
            default,
            min,
            max,
        }
    }

    pub fn check(&self, value: f64) -> Result<(), String> {
        if !value.is_finite() {
            return Err("must be a finite number".to_string());
        }
        if let Some(min) = self.min {
            if value < min {
                return Err(format!("must be at least {}", format_number(min)));
            }
        }
        if let Some(max) = self.max {
            if value > max {
                return Err(format!("must be at most {}", format_number(max)));
            }
        }
        Ok(())
    }
}

/// Fields in the order the scaler was fitted on.
pub static FIELDS: [FieldSpec; FEATURE_COUNT] = [
    FieldSpec::new("interactions", "Interactions", "Total number of interactions", 1000.0, Some(0.0), None),
    FieldSpec::new("advisors", "Advisor count", "Number of available advisors", 5.0, Some(1.0), None),
    FieldSpec::new("avg_interactions", "Average interactions", "Average interactions per period", 200.0, Some(0.0), None),
    FieldSpec::new("goal_completion_pct", "Goal completion %", "Percentage of goals met", 85.0, Some(0.0), Some(100.0)),
    FieldSpec::new("participation_pct", "Participation %", "Participation percentage", 75.0, Some(0.0), Some(100.0)),
    FieldSpec::new("avg_enrollments", "Average enrollments", "Average enrollments per period", 50.0, Some(0.0), None),
    FieldSpec::new("monthly_growth_pct", "Monthly growth %", "Month-over-month growth percentage", 10.0, None, None),
    FieldSpec::new("annual_growth_pct", "Annual growth %", "Year-over-year growth percentage", 15.0, None, None),
    FieldSpec::new("interactions_per_advisor", "Interactions per advisor", "Average interactions per advisor", 200.0, Some(0.0), None),
    FieldSpec::new("enrollments_per_advisor", "Enrollments per advisor", "Average enrollments per advisor", 10.0, Some(0.0), None),
];

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct FeatureVector {
    pub interactions: f64,
    pub advisors: f64,
    pub avg_interactions: f64,
    pub goal_completion_pct: f64,
    pub participation_pct: f64,
    pub avg_enrollments: f64,
    pub monthly_growth_pct: f64,
    pub annual_growth_pct: f64,
    pub interactions_per_advisor: f64,
    pub enrollments_per_advisor: f64,
}

impl FeatureVector {
    pub fn from_array(values: [f64; FEATURE_COUNT]) -> Self {
        let [
            interactions,
            advisors,
            avg_interactions,
            goal_completion_pct,
            participation_pct,
            avg_enrollments,
            monthly_growth_pct,
            annual_growth_pct,
            interactions_per_advisor,
            enrollments_per_advisor,
        ] = values;
        Self {
            interactions,
            advisors,
            avg_interactions,
            goal_completion_pct,
            participation_pct,
            avg_enrollments,
            monthly_growth_pct,
            annual_growth_pct,
            interactions_per_advisor,
            enrollments_per_advisor,
        }
    }

    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.interactions,
            self.advisors,
            self.avg_interactions,
            self.goal_completion_pct,
            self.participation_pct,
            self.avg_enrollments,
            self.monthly_growth_pct,
            self.annual_growth_pct,
            self.interactions_per_advisor,
            self.enrollments_per_advisor,
        ]
    }

    pub fn defaults() -> Self {
        Self::from_array(FIELDS.map(|field| field.default))
    }

    pub fn zeroed() -> Self {
        Self::from_array([0.0; FEATURE_COUNT])
    }

    pub fn is_all_zero(&self) -> bool {
        self.to_array().iter().all(|value| *value == 0.0)
    }

    /// First field that is non-finite or outside its bounds.
    pub fn first_invalid(&self) -> Option<(&'static FieldSpec, String)> {
        FIELDS
            .iter()
            .zip(self.to_array())
            .find_map(|(field, value)| field.check(value).err().map(|reason| (field, reason)))
    }
}

/// The twelve cells persisted in the data row.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRecord {
    pub timestamp: String,
    pub features: FeatureVector,
    pub estimate: Option<String>,
}

impl PredictionRecord {
    /// Row written when a spreadsheet is first created.
    pub fn blank() -> Self {
        Self {
            timestamp: String::new(),
            features: FeatureVector::zeroed(),
            estimate: None,
        }
    }

    pub fn cleared(timestamp: String) -> Self {
        Self {
            timestamp,
            ..Self::blank()
        }
    }

    pub fn to_cells(&self) -> Vec<Value> {
        let mut cells = Vec::with_capacity(ROW_WIDTH);
        cells.push(Value::from(self.timestamp.clone()));
        cells.extend(self.features.to_array().into_iter().map(number_cell));
        cells.push(Value::from(self.estimate.clone().unwrap_or_default()));
        cells
    }
}

fn number_cell(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}

/// A data row as read back from the spreadsheet, always twelve cells wide.
#[derive(Debug, Clone, PartialEq)]
pub struct RowSnapshot {
    cells: Vec<String>,
}

impl RowSnapshot {
    /// The remote side trims trailing empty cells, so a row carrying the
    /// timestamp and all ten features is padded back out to twelve.
    pub fn from_cells(mut cells: Vec<String>) -> Option<Self> {
        // the row written at creation has no timestamp; only a prediction or a
        // clear stamps it
        if cells.len() < ROW_WIDTH - 1 || cells[0].is_empty() {
            return None;
        }
        cells.resize(ROW_WIDTH, String::new());
        Some(Self { cells })
    }

    pub fn timestamp(&self) -> &str {
        &self.cells[0]
    }

    pub fn feature(&self, index: usize) -> &str {
        &self.cells[index + 1]
    }

    pub fn estimate(&self) -> &str {
        &self.cells[ROW_WIDTH - 1]
    }
}

pub fn timestamp_now() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Plain rendering of an input number: integers lose the trailing `.0`.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Inserts `,` thousands separators into the integer part of a decimal string.
pub fn group_thousands(text: &str) -> String {
    let (sign, unsigned) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text),
    };
    let (integer, fraction) = match unsigned.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (unsigned, None),
    };

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (index, digit) in integer.chars().enumerate() {
        if index > 0 && (integer.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    match fraction {
        Some(fraction) => format!("{sign}{grouped}.{fraction}"),
        None => format!("{sign}{grouped}"),
    }
}
