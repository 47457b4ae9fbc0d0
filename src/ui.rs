//! The single HTML page: ten inputs, three actions, a results panel and a
//! status panel. Result messages are markdown rendered with `pulldown-cmark`.

use std::fmt::Write;

use pulldown_cmark::{html, Event, Options, Parser};

use crate::app::SystemStatus;
use crate::error::{PredictError, RowError};
use crate::models::{format_number, FeatureVector, FEATURE_COUNT, FIELDS};
use crate::predictor::{PredictionReport, SaveStatus};
use crate::rows::{self, RowView};

pub const WELCOME_MESSAGE: &str = "Enter the parameters and click **Predict revenue**";

/// Raw submitted values, kept as text so the form redisplays what was typed.
#[derive(Debug, Clone, PartialEq)]
pub struct FormState {
    values: [String; FEATURE_COUNT],
}

impl Default for FormState {
    fn default() -> Self {
        Self {
            values: FeatureVector::defaults().to_array().map(format_number),
        }
    }
}

impl FormState {
    /// Reads an `application/x-www-form-urlencoded` body. Unknown keys are
    /// ignored and absent keys keep their defaults.
    pub fn from_urlencoded(body: &[u8]) -> Self {
        let mut state = Self::default();
        for (key, value) in url::form_urlencoded::parse(body) {
            if let Some(index) = FIELDS.iter().position(|field| field.key == key) {
                state.values[index] = value.trim().to_string();
            }
        }
        state
    }

    pub fn value(&self, index: usize) -> &str {
        &self.values[index]
    }

    /// Blank fields take their defaults; anything else must parse as a number.
    pub fn features(&self) -> Result<FeatureVector, PredictError> {
        let mut parsed = [0.0; FEATURE_COUNT];
        for (index, field) in FIELDS.iter().enumerate() {
            let raw = self.values[index].as_str();
            parsed[index] = if raw.is_empty() {
                field.default
            } else {
                raw.parse::<f64>().map_err(|_| PredictError::InvalidField {
                    field: field.label,
                    reason: format!("'{raw}' is not a number"),
                })?
            };
        }
        Ok(FeatureVector::from_array(parsed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Info,
    Success,
    Warning,
    Error,
}

impl Tone {
    fn css_class(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// Markdown message for the results panel.
#[derive(Debug, Clone, PartialEq)]
pub struct Feedback {
    pub tone: Tone,
    pub markdown: String,
}

impl Feedback {
    pub fn new(tone: Tone, markdown: impl Into<String>) -> Self {
        Self {
            tone,
            markdown: markdown.into(),
        }
    }

    pub fn welcome() -> Self {
        Self::new(Tone::Info, WELCOME_MESSAGE)
    }

    pub fn from_prediction(result: &Result<PredictionReport, PredictError>) -> Self {
        match result {
            Ok(report) => {
                let tone = match report.save_status {
                    SaveStatus::Saved => Tone::Success,
                    SaveStatus::NotConfigured | SaveStatus::Failed(_) => Tone::Warning,
                };
                Self::new(tone, report.to_markdown())
            }
            Err(err @ PredictError::ModelsUnavailable) | Err(err @ PredictError::NonFinite(_)) => {
                Self::new(Tone::Error, err.to_string())
            }
            Err(err) => Self::new(Tone::Warning, err.to_string()),
        }
    }

    pub fn from_clear(result: &Result<impl Sized, RowError>) -> Self {
        match result {
            Ok(_) => Self::new(Tone::Success, rows::CLEARED_MESSAGE),
            Err(err) => Self::from_row_error(err),
        }
    }

    pub fn from_show(result: &Result<RowView, RowError>, sheet_url: &str) -> Self {
        match result {
            Ok(view @ RowView::Empty) => Self::new(Tone::Warning, rows::render_row(view, sheet_url)),
            Ok(view) => Self::new(Tone::Info, rows::render_row(view, sheet_url)),
            Err(err) => Self::from_row_error(err),
        }
    }

    fn from_row_error(err: &RowError) -> Self {
        match err {
            RowError::NotConfigured => Self::new(Tone::Warning, err.to_string()),
            RowError::Write(_) | RowError::Read(_) => Self::new(Tone::Error, err.to_string()),
        }
    }
}

/// Markdown to HTML with any embedded raw HTML demoted to text.
pub fn markdown_to_html(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, Options::empty()).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });
    let mut rendered = String::new();
    html::push_html(&mut rendered, parser);
    rendered
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    // writing into a String cannot fail
    let _ = pulldown_cmark_escape::escape_html(&mut escaped, text);
    escaped
}

const STYLE: &str = "body{font-family:system-ui,sans-serif;margin:0;background:#f6f7fb;color:#1f2430}\
main{max-width:1200px;margin:0 auto;padding:24px}\
.layout{display:flex;gap:24px;flex-wrap:wrap}\
.inputs{flex:2;min-width:320px}.controls{flex:1;min-width:240px}\
.grid{display:grid;grid-template-columns:1fr 1fr;gap:12px}\
label{display:block;font-weight:600}small{color:#667}\
input{width:100%;padding:6px;box-sizing:border-box}\
button{display:block;width:100%;margin-bottom:10px;padding:10px;border:none;color:#fff;font-size:1em;cursor:pointer}\
.primary{background:linear-gradient(45deg,#4285f4,#34a853)}\
.secondary{background:linear-gradient(45deg,#ea4335,#fbbc04)}\
.result{background:#fff;border-left:6px solid #889;padding:12px 20px;margin-top:12px}\
.result.success{border-color:#34a853}.result.warning{border-color:#fbbc04}.result.error{border-color:#ea4335}";

pub fn render_page(form: &FormState, feedback: &Feedback, status: &SystemStatus) -> String {
    let mut page = String::new();
    let _ = writeln!(page, "<!DOCTYPE html>");
    let _ = writeln!(page, "<html lang=\"en\"><head><meta charset=\"utf-8\">");
    let _ = writeln!(page, "<title>Revenue Predictor</title><style>{STYLE}</style></head>");
    let _ = writeln!(page, "<body><main>");
    let _ = writeln!(page, "<h1>Revenue Predictor</h1>");
    let _ = writeln!(
        page,
        "<p>Enter the parameters to predict revenue; each prediction is saved to the shared spreadsheet.</p>"
    );

    let _ = writeln!(page, "<form method=\"post\" action=\"/predict\" class=\"layout\">");
    let _ = writeln!(page, "<section class=\"inputs\"><h3>Input parameters</h3><div class=\"grid\">");
    for (index, field) in FIELDS.iter().enumerate() {
        let mut bounds = String::new();
        if let Some(min) = field.min {
            let _ = write!(bounds, " min=\"{}\"", format_number(min));
        }
        if let Some(max) = field.max {
            let _ = write!(bounds, " max=\"{}\"", format_number(max));
        }
        let _ = writeln!(
            page,
            "<div><label for=\"{key}\">{label}</label>\
             <input type=\"number\" step=\"any\" id=\"{key}\" name=\"{key}\" value=\"{value}\"{bounds}>\
             <small>{help}</small></div>",
            key = field.key,
            label = escape_html(field.label),
            value = escape_html(form.value(index)),
            help = escape_html(field.help),
        );
    }
    let _ = writeln!(page, "</div></section>");

    let _ = writeln!(page, "<section class=\"controls\"><h3>Controls</h3>");
    let _ = writeln!(page, "<button type=\"submit\" class=\"primary\" formaction=\"/predict\">Predict revenue</button>");
    let _ = writeln!(page, "<button type=\"submit\" class=\"secondary\" formaction=\"/clear\">Clear data</button>");
    let _ = writeln!(page, "<button type=\"submit\" class=\"secondary\" formaction=\"/show\">Show current data</button>");
    let _ = writeln!(page, "<h3>Spreadsheet</h3>");
    if status.spreadsheet.enabled {
        let _ = writeln!(
            page,
            "<p><a href=\"{url}\" target=\"_blank\" rel=\"noopener\">Open spreadsheet</a></p>",
            url = escape_html(&status.spreadsheet_url)
        );
    } else {
        let _ = writeln!(page, "<p>{}</p>", escape_html(&status.spreadsheet_url));
    }
    let _ = writeln!(page, "<h3>System status</h3><ul>");
    let _ = writeln!(
        page,
        "<li>ML models: {}</li>",
        if status.models.enabled { "loaded" } else { "not available" }
    );
    let _ = writeln!(
        page,
        "<li>Spreadsheet: {}</li>",
        if status.spreadsheet.enabled { "connected" } else { "not configured" }
    );
    let _ = writeln!(page, "</ul></section>");
    let _ = writeln!(page, "</form>");

    let _ = writeln!(page, "<h3>Results</h3>");
    let _ = writeln!(
        page,
        "<div class=\"result {}\" id=\"result\">{}</div>",
        feedback.tone.css_class(),
        markdown_to_html(&feedback.markdown)
    );
    let _ = writeln!(page, "</main></body></html>");
    page
}
