use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::credentials;
use crate::error::SheetSetupError;
use crate::model::ModelArtifacts;
use crate::sheets::{self, SheetsClient};
use crate::store::RowStore;

pub const SHEET_NOT_CONFIGURED_URL: &str = "Not configured";

/// Whether a subsystem came up at startup. A disabled subsystem stays
/// disabled for the lifetime of the process.
#[derive(Debug, Clone)]
pub enum Availability<T> {
    Enabled(T),
    Disabled { reason: String },
}

impl<T> Availability<T> {
    pub fn disabled(reason: impl Into<String>) -> Self {
        Self::Disabled {
            reason: reason.into(),
        }
    }

    pub fn enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            Self::Enabled(value) => Some(value),
            Self::Disabled { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Enabled(_) => None,
            Self::Disabled { reason } => Some(reason),
        }
    }
}

/// Everything a request handler needs, built once at startup.
pub struct AppContext {
    pub models: Availability<ModelArtifacts>,
    pub sheet: Availability<Arc<dyn RowStore>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SubsystemStatus {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SystemStatus {
    pub models: SubsystemStatus,
    pub spreadsheet: SubsystemStatus,
    pub spreadsheet_url: String,
}

impl AppContext {
    pub async fn initialize(settings: &Settings) -> anyhow::Result<Self> {
        let models = load_models(settings)?;
        let sheet = match bind_sheet(settings).await {
            Ok(store) => Availability::Enabled(store),
            Err(err) => {
                warn!(error = %err, "spreadsheet features disabled");
                Availability::disabled(err.to_string())
            }
        };
        Ok(Self { models, sheet })
    }

    pub fn sheet_url(&self) -> &str {
        self.sheet
            .get()
            .map(|store| store.share_url())
            .unwrap_or(SHEET_NOT_CONFIGURED_URL)
    }

    pub fn status(&self) -> SystemStatus {
        SystemStatus {
            models: SubsystemStatus {
                enabled: self.models.enabled(),
                reason: self.models.reason().map(str::to_string),
            },
            spreadsheet: SubsystemStatus {
                enabled: self.sheet.enabled(),
                reason: self.sheet.reason().map(str::to_string),
            },
            spreadsheet_url: self.sheet_url().to_string(),
        }
    }
}

/// Missing artifacts disable prediction; unreadable or malformed ones abort
/// startup.
pub fn load_models(settings: &Settings) -> anyhow::Result<Availability<ModelArtifacts>> {
    info!(
        model = %settings.model_path.display(),
        scaler = %settings.scaler_path.display(),
        "loading model artifacts"
    );
    match ModelArtifacts::load(&settings.model_path, &settings.scaler_path) {
        Ok(artifacts) => {
            info!("model artifacts loaded");
            Ok(Availability::Enabled(artifacts))
        }
        Err(err) if err.is_missing() => {
            warn!(error = %err, "prediction disabled");
            Ok(Availability::disabled(err.to_string()))
        }
        Err(err) => Err(err).context("failed to load model artifacts"),
    }
}

async fn bind_sheet(settings: &Settings) -> Result<Arc<dyn RowStore>, SheetSetupError> {
    let http = sheets::http_client()?;
    let tokens = credentials::authorize(http.clone(), settings.credentials.as_deref()).await?;
    let client = SheetsClient::new(http, tokens, settings.endpoints.clone());
    let bound = sheets::bind(client, &settings.spreadsheet_name).await?;
    debug!(spreadsheet_id = bound.spreadsheet_id(), "spreadsheet bound");
    Ok(Arc::new(bound))
}
