use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use iaml_cli::answers::Answers;
use iaml_cli::app::{self, CodeRequest, QuoteRequest};
use iaml_cli::config::{CliConfig, DEFAULT_CONFIG_FILE, Overrides};
use iaml_cli::logging;
use iaml_core::ProgramCatalog;
use iaml_core::calculations::CouponValidator;
use iaml_data::CatalogLoader;
use tracing::{debug, info};

// ─── CLI definition ──────────────────────────────────────────────────────────

/// IAML program registration from the command line.
///
/// Plans wizard steps, quotes prices, builds registration codes, and runs
/// scripted registrations against the live site or an offline backend.
#[derive(Debug, Parser)]
#[command(name = "iaml-register", version)]
struct Cli {
    /// Config file. Defaults to `iaml.toml` in the working directory.
    #[arg(long, global = true, env = "IAML_CONFIG")]
    config: Option<PathBuf>,

    /// Gateway backend (`http` or `memory`).
    #[arg(long, global = true)]
    backend: Option<String>,

    /// Site origin for `http`, or a sessions CSV for `memory`.
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Stripe publishable key used to confirm card payments.
    #[arg(long, global = true, env = "STRIPE_PUBLISHABLE_KEY")]
    stripe_key: Option<String>,

    /// Program catalog CSV replacing the built-in catalog.
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Log level or filter directive.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Also append log lines to this file.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the wizard steps left after applying a landing-page query.
    Plan {
        #[arg(long, default_value = "")]
        query: String,
    },
    /// Price a program, block selection and coupon.
    Quote(QuoteArgs),
    /// Print the registration code for a selection.
    Code(CodeArgs),
    /// Run a full registration from an answers file.
    Register {
        #[arg(long)]
        answers: PathBuf,
    },
}

#[derive(Debug, Args)]
struct QuoteArgs {
    #[arg(long)]
    program: String,
    /// Comma-separated block numbers; omit for the full program.
    #[arg(long, default_value = "")]
    blocks: String,
    #[arg(long)]
    coupon: Option<String>,
    #[arg(long, requires = "session_end")]
    session_start: Option<NaiveDate>,
    #[arg(long)]
    session_end: Option<NaiveDate>,
    /// Date to validate coupons against; defaults to the local date.
    #[arg(long)]
    today: Option<NaiveDate>,
}

#[derive(Debug, Args)]
struct CodeArgs {
    #[arg(long)]
    format: String,
    #[arg(long)]
    program: String,
    #[arg(long, default_value = "")]
    blocks: String,
    #[arg(long)]
    city: Option<String>,
    /// Session start date.
    #[arg(long)]
    start: Option<NaiveDate>,
    #[arg(long)]
    today: Option<NaiveDate>,
}

// ─── helpers ─────────────────────────────────────────────────────────────────

fn load_config(cli: &Cli) -> Result<CliConfig> {
    let (path, required) = match &cli.config {
        Some(path) => (path.clone(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };
    let file = CliConfig::load(&path, required)?;
    Ok(file.with_overrides(Overrides {
        backend: cli.backend.clone(),
        endpoint: cli.endpoint.clone(),
        stripe_publishable_key: cli.stripe_key.clone(),
        log_level: cli.log_level.clone(),
        log_file: cli.log_file.clone(),
    }))
}

fn load_catalog(cli: &Cli) -> Result<ProgramCatalog> {
    match &cli.catalog {
        Some(path) => CatalogLoader::from_path(path)
            .with_context(|| format!("Failed to load catalog '{}'", path.display())),
        None => Ok(ProgramCatalog::standard()),
    }
}

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

// ─── entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    logging::init("info")?;

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    if let Some(level) = &config.log_level {
        logging::set_level(level)?;
    }
    if let Some(path) = &config.log_file {
        logging::log_to_file(path)?;
    }

    let catalog = load_catalog(&cli)?;
    debug!(programs = catalog.programs().len(), "catalog loaded");

    let result = run(cli.command, &config, catalog).await;
    logging::close_log_file();
    result
}

async fn run(
    command: Command,
    config: &CliConfig,
    catalog: ProgramCatalog,
) -> Result<()> {
    match command {
        Command::Plan { query } => {
            let steps = app::plan(&query, &catalog);
            let names: Vec<&str> = steps.iter().map(|s| s.as_str()).collect();
            println!("{}", names.join(" -> "));
        }
        Command::Quote(args) => {
            let gateway = app::connect(&config.gateway_config()).await?;
            let request = QuoteRequest {
                program: args.program,
                attendance: app::parse_blocks(&args.blocks)?,
                coupon: args.coupon,
                session_start: args.session_start,
                session_end: args.session_end,
            };
            let today = args.today.unwrap_or_else(local_today);
            let report = app::quote(
                &request,
                &catalog,
                &CouponValidator::standard(),
                &*gateway,
                today,
            )
            .await?;
            println!("{report}");
        }
        Command::Code(args) => {
            let request = CodeRequest {
                format: args.format,
                program: args.program,
                attendance: app::parse_blocks(&args.blocks)?,
                city: args.city,
                start: args.start,
            };
            let code = app::code(&request, &catalog, args.today.unwrap_or_else(local_today))?;
            println!("{code}");
        }
        Command::Register { answers } => {
            let answers = Answers::from_path(&answers)?;
            let gateway = app::connect(&config.gateway_config()).await?;
            let today = answers.today.unwrap_or_else(local_today);

            let report = app::register(&answers, catalog, &*gateway, today).await?;
            info!(code = %report.confirmation.registration_code, "registration complete");
            println!("{report}");
        }
    }
    Ok(())
}
