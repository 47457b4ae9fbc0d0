use std::fmt;
use std::path::PathBuf;

use clap::Args;

use crate::logging::LogFormat;

pub const DEFAULT_SPREADSHEET_NAME: &str = "Predicciones_Ingresos_ML";
pub const DEFAULT_SHEETS_API: &str = "https://sheets.googleapis.com";
pub const DEFAULT_DRIVE_API: &str = "https://www.googleapis.com";
pub const DEFAULT_DOCS_BASE: &str = "https://docs.google.com";

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Fitted regressor exported as JSON
    #[arg(long, env = "MODEL_PATH", default_value = "model.json", global = true)]
    pub model_path: PathBuf,

    /// Fitted standard scaler exported as JSON
    #[arg(long, env = "SCALER_PATH", default_value = "scaler.json", global = true)]
    pub scaler_path: PathBuf,

    /// Name of the spreadsheet that holds the prediction row
    #[arg(long, env = "SPREADSHEET_NAME", default_value = DEFAULT_SPREADSHEET_NAME, global = true)]
    pub spreadsheet_name: String,

    /// Service-account credential JSON
    #[arg(long, env = "GOOGLE_SHEETS_CREDENTIALS", hide_env_values = true, global = true)]
    pub credentials: Option<String>,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty, global = true)]
    pub log_format: LogFormat,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(long, hide = true, default_value = DEFAULT_SHEETS_API, global = true)]
    pub sheets_api: String,

    #[arg(long, hide = true, default_value = DEFAULT_DRIVE_API, global = true)]
    pub drive_api: String,
}

impl GlobalArgs {
    pub fn settings(&self) -> Settings {
        Settings {
            model_path: self.model_path.clone(),
            scaler_path: self.scaler_path.clone(),
            spreadsheet_name: self.spreadsheet_name.clone(),
            credentials: self.credentials.clone().filter(|raw| !raw.trim().is_empty()),
            endpoints: GoogleEndpoints {
                sheets_api: self.sheets_api.trim_end_matches('/').to_string(),
                drive_api: self.drive_api.trim_end_matches('/').to_string(),
                docs_base: DEFAULT_DOCS_BASE.to_string(),
            },
        }
    }
}

/// Remote API roots; overridden in tests to point at a mock server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleEndpoints {
    pub sheets_api: String,
    pub drive_api: String,
    pub docs_base: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            sheets_api: DEFAULT_SHEETS_API.to_string(),
            drive_api: DEFAULT_DRIVE_API.to_string(),
            docs_base: DEFAULT_DOCS_BASE.to_string(),
        }
    }
}

/// Resolved startup configuration.
#[derive(Clone)]
pub struct Settings {
    pub model_path: PathBuf,
    pub scaler_path: PathBuf,
    pub spreadsheet_name: String,
    pub credentials: Option<String>,
    pub endpoints: GoogleEndpoints,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("model_path", &self.model_path)
            .field("scaler_path", &self.scaler_path)
            .field("spreadsheet_name", &self.spreadsheet_name)
            .field("credentials", &self.credentials.as_ref().map(|_| "<redacted>"))
            .field("endpoints", &self.endpoints)
            .finish()
    }
}
