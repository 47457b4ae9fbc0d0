use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::app::AppContext;
use crate::config::GlobalArgs;
use crate::logging::LogConfig;
use crate::models::FeatureVector;

mod app;
mod config;
mod credentials;
mod error;
mod logging;
mod model;
mod models;
mod predictor;
mod rows;
mod server;
mod sheets;
mod store;
mod ui;

#[derive(Parser)]
#[command(name = "revenue-estimator")]
#[command(about = "Revenue estimation from engagement metrics, with a shared spreadsheet row", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the web form
    Serve {
        #[arg(long, env = "BIND_ADDR", default_value = server::DEFAULT_BIND_ADDR)]
        bind: SocketAddr,
    },
    /// Estimate revenue once and overwrite the spreadsheet row
    Predict {
        #[command(flatten)]
        inputs: PredictArgs,
    },
    /// Reset the spreadsheet row to zeros
    Clear,
    /// Print the spreadsheet row
    Show,
    /// Estimate every row of a CSV file without touching the spreadsheet
    Score {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Print which subsystems are available
    Status,
}

#[derive(clap::Args)]
struct PredictArgs {
    #[arg(long, default_value_t = 1000.0)]
    interactions: f64,
    #[arg(long, default_value_t = 5.0)]
    advisors: f64,
    #[arg(long, default_value_t = 200.0)]
    avg_interactions: f64,
    #[arg(long, default_value_t = 85.0)]
    goal_completion_pct: f64,
    #[arg(long, default_value_t = 75.0)]
    participation_pct: f64,
    #[arg(long, default_value_t = 50.0)]
    avg_enrollments: f64,
    #[arg(long, default_value_t = 10.0, allow_negative_numbers = true)]
    monthly_growth_pct: f64,
    #[arg(long, default_value_t = 15.0, allow_negative_numbers = true)]
    annual_growth_pct: f64,
    #[arg(long, default_value_t = 200.0)]
    interactions_per_advisor: f64,
    #[arg(long, default_value_t = 10.0)]
    enrollments_per_advisor: f64,
}

impl From<PredictArgs> for FeatureVector {
    fn from(args: PredictArgs) -> Self {
        FeatureVector {
            interactions: args.interactions,
            advisors: args.advisors,
            avg_interactions: args.avg_interactions,
            goal_completion_pct: args.goal_completion_pct,
            participation_pct: args.participation_pct,
            avg_enrollments: args.avg_enrollments,
            monthly_growth_pct: args.monthly_growth_pct,
            annual_growth_pct: args.annual_growth_pct,
            interactions_per_advisor: args.interactions_per_advisor,
            enrollments_per_advisor: args.enrollments_per_advisor,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(&LogConfig::from_verbosity(
        cli.global.verbose,
        cli.global.log_format,
    ))?;

    let settings = cli.global.settings();
    info!(?settings, "configuration resolved");

    match cli.command {
        Commands::Serve { bind } => {
            let ctx = Arc::new(AppContext::initialize(&settings).await?);
            let listener = server::bind(bind).await?;
            server::serve(ctx, listener).await?;
        }
        Commands::Predict { inputs } => {
            let ctx = AppContext::initialize(&settings).await?;
            let report = predictor::predict_and_save(&ctx, inputs.into()).await?;
            println!("{}", report.to_markdown());
        }
        Commands::Clear => {
            let ctx = AppContext::initialize(&settings).await?;
            let record = rows::clear(&ctx).await?;
            println!("{} ({}).", rows::CLEARED_MESSAGE, record.timestamp);
        }
        Commands::Show => {
            let ctx = AppContext::initialize(&settings).await?;
            let view = rows::show(&ctx).await?;
            println!("{}", rows::render_row(&view, ctx.sheet_url()));
        }
        Commands::Score { csv } => {
            let models = app::load_models(&settings)?;
            let artifacts = models.get().ok_or_else(|| {
                anyhow!(
                    "prediction disabled: {}",
                    models.reason().unwrap_or("models not loaded")
                )
            })?;
            let file = std::fs::File::open(&csv)
                .with_context(|| format!("failed to open {}", csv.display()))?;
            let estimates = predictor::score_records(artifacts, file)
                .with_context(|| format!("failed to score {}", csv.display()))?;

            if estimates.is_empty() {
                println!("No rows found in {}.", csv.display());
                return Ok(());
            }

            println!("Estimated revenue per row:");
            for estimate in &estimates {
                match &estimate.outcome {
                    Ok(value) => println!(
                        "- row {}: ${}",
                        estimate.row,
                        predictor::format_currency(*value)
                    ),
                    Err(err) => println!("- row {}: skipped ({err})", estimate.row),
                }
            }
        }
        Commands::Status => {
            let ctx = AppContext::initialize(&settings).await?;
            println!("{}", serde_json::to_string_pretty(&ctx.status())?);
        }
    }

    Ok(())
}
