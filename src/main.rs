use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use caresight::cli::{self, OutputFormat, UploadOptions};
use caresight::payload::Demographics;

#[derive(Debug, Parser)]
#[command(name = "caresight")]
#[command(about = "Patient risk predictions and recommendations from CSV uploads")]
#[command(version)]
struct App {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, clap::Args)]
struct UploadFlags {
    /// Output format: table (default), json
    #[arg(long, default_value = "table")]
    format: String,
    /// Skip the generated narrative
    #[arg(long)]
    no_recommend: bool,
}

impl UploadFlags {
    fn options(&self, save: bool) -> UploadOptions {
        UploadOptions {
            format: OutputFormat::from_str_opt(Some(&self.format)),
            recommend: !self.no_recommend,
            save,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Classify maternal vitals from a CSV file
    Maternal {
        file: PathBuf,
        /// Classify every row instead of only the first
        #[arg(long)]
        series: bool,
        #[command(flatten)]
        flags: UploadFlags,
    },
    /// Score a cardiovascular cohort from a CSV file
    Cardio {
        file: PathBuf,
        #[command(flatten)]
        flags: UploadFlags,
    },
    /// Forecast glucose and diabetes risk from a CSV file
    Diabetes {
        file: PathBuf,
        /// Patient name (also the patient's identity in the local store)
        #[arg(long)]
        name: String,
        #[arg(long)]
        age: u32,
        #[arg(long)]
        gender: String,
        /// Weight in kg
        #[arg(long)]
        weight: Option<f64>,
        /// Height in cm
        #[arg(long)]
        height: Option<f64>,
        /// Do not save the report to the patient store
        #[arg(long)]
        no_save: bool,
        #[command(flatten)]
        flags: UploadFlags,
    },
    /// Render a saved glucose API response (JSON file)
    Analyze {
        file: PathBuf,
        /// Horizon for the narrative, e.g. 30d
        #[arg(long)]
        horizon: Option<String>,
        /// Generate a narrative with the local model
        #[arg(long)]
        recommend: bool,
        /// Output format: table (default), json, csv
        #[arg(long, default_value = "table")]
        format: String,
    },
    /// Inspect and manage saved patients
    Patients {
        #[command(subcommand)]
        action: PatientsAction,
    },
    /// Show upload statistics
    Stats {
        /// Output format: table (default), json, csv
        #[arg(long, default_value = "table")]
        format: String,
        /// Only include the last N days of data
        #[arg(long)]
        days: Option<u32>,
    },
    /// Start the JSON API server
    Web {
        /// Listen address (default from config)
        #[arg(long)]
        addr: Option<String>,
    },
    /// Check configuration, endpoints and the local model
    Health,
    /// Show or edit configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
enum PatientsAction {
    /// List saved patients
    List {
        #[arg(long, default_value = "table")]
        format: String,
    },
    /// Show one patient and their reports
    Show {
        id: String,
        #[arg(long, default_value = "table")]
        format: String,
    },
    /// Delete a patient and all reports
    Delete { id: String },
    /// Delete one report
    DeleteReport { id: String, report_id: String },
    /// Store statistics
    Stats {
        #[arg(long, default_value = "table")]
        format: String,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write a default ~/.caresight/config.toml
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Set one key, e.g. `endpoints.glucose_url http://...`
    Set { key: String, value: String },
    /// Overwrite the global config with defaults
    Reset,
}

fn main() -> Result<()> {
    let app = App::parse();

    match app.command {
        Commands::Maternal { file, series, flags } => cli::run_maternal(&file, series, flags.options(false)),
        Commands::Cardio { file, flags } => cli::run_cardio(&file, flags.options(false)),
        Commands::Diabetes {
            file,
            name,
            age,
            gender,
            weight,
            height,
            no_save,
            flags,
        } => {
            let demographics = Demographics {
                name,
                age,
                gender,
                weight,
                height,
            };
            cli::run_diabetes(&file, &demographics, flags.options(!no_save))
        }
        Commands::Analyze {
            file,
            horizon,
            recommend,
            format,
        } => {
            let fmt = OutputFormat::from_str_opt(Some(&format));
            cli::run_analyze(&file, horizon.as_deref(), recommend, fmt)
        }
        Commands::Patients { action } => match action {
            PatientsAction::List { format } => cli::run_patients_list(OutputFormat::from_str_opt(Some(&format))),
            PatientsAction::Show { id, format } => {
                cli::run_patients_show(&id, OutputFormat::from_str_opt(Some(&format)))
            }
            PatientsAction::Delete { id } => cli::run_patients_delete(&id),
            PatientsAction::DeleteReport { id, report_id } => cli::run_patients_delete_report(&id, &report_id),
            PatientsAction::Stats { format } => cli::run_patients_stats(OutputFormat::from_str_opt(Some(&format))),
        },
        Commands::Stats { format, days } => {
            let fmt = OutputFormat::from_str_opt(Some(&format));
            cli::run_stats(fmt, days)
        }
        Commands::Web { addr } => cli::run_web(addr.as_deref()),
        Commands::Health => cli::run_health(),
        Commands::Config { action } => match action {
            ConfigAction::Show => cli::run_config_show(),
            ConfigAction::Init { force } => cli::run_config_init(force),
            ConfigAction::Set { key, value } => cli::run_config_set(&key, &value),
            ConfigAction::Reset => cli::run_config_reset(),
        },
    }
}
