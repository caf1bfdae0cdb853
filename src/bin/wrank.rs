//! wrank CLI - Command-line interface for Workout Rank
//!
//! Commands:
//! - ingest: Decode a FIT file and append its summary to the activity table
//! - partition: Split a mixed summary dataset into per-activity corpus tables
//! - train: Train one model per corpus table
//! - predict: Predict a percentile from feature values
//! - classify: Decode, record and rank a FIT file
//! - doctor: Diagnose configuration and stored models

use clap::{Parser, Subcommand};
use serde_json::json;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use workout_rank::corpus::partition_by_activity;
use workout_rank::decoder::{decode_file, DecoderDefaults};
use workout_rank::recommend::recommend_with_artifact;
use workout_rank::{
    train_corpora, ArtifactStore, ClassificationOutcome, FeatureInput, RankConfig, RankError,
    SummaryStore, TrainingInput, WorkoutClassifier, PRODUCER_NAME, RANK_VERSION,
};

/// wrank - Percentile ranking for workouts
#[derive(Parser)]
#[command(name = "wrank")]
#[command(version = RANK_VERSION)]
#[command(about = "Rank workouts against same-activity history", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a FIT file and append its summary to the activity table
    Ingest {
        /// FIT activity file
        #[arg(short, long)]
        input: PathBuf,

        /// Activity type, e.g. "Running"
        #[arg(short, long)]
        activity: String,

        /// Age in years (defaults to the configured default age)
        #[arg(long)]
        age: Option<f64>,
    },

    /// Split a mixed summary dataset into <type>_analysis.csv tables
    Partition {
        /// Mixed summary dataset (CSV)
        #[arg(short, long)]
        input: PathBuf,

        /// Directory for the per-activity tables
        #[arg(short, long)]
        output_dir: PathBuf,
    },

    /// Train one model per corpus table
    Train {
        /// Corpus tables; the activity type is the file name up to the first '_'
        #[arg(required = true)]
        corpora: Vec<PathBuf>,

        /// Override the activity type (single corpus only)
        #[arg(long)]
        activity: Option<String>,
    },

    /// Predict a percentile from feature values
    Predict {
        /// Activity type of the model to use
        #[arg(short, long)]
        activity: String,

        /// Keyed features as a JSON object, e.g. '{"HRmax":160,"HR%":75,...}'
        #[arg(long, conflicts_with = "values")]
        features: Option<String>,

        /// Feature values in model order, comma separated
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
        values: Option<Vec<f64>>,
    },

    /// Decode, record and rank a FIT file
    Classify {
        /// FIT activity file
        #[arg(short, long)]
        input: PathBuf,

        /// Activity type, e.g. "Running"
        #[arg(short, long)]
        activity: String,

        /// Age in years (defaults to the configured default age)
        #[arg(long)]
        age: Option<f64>,
    },

    /// Diagnose configuration and stored models
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), RankCliError> {
    let config = match &cli.config {
        Some(path) => RankConfig::from_toml_file(path)?,
        None => RankConfig::default(),
    };

    match cli.command {
        Commands::Ingest { input, activity, age } => cmd_ingest(&config, &input, &activity, age),
        Commands::Partition { input, output_dir } => cmd_partition(&input, &output_dir),
        Commands::Train { corpora, activity } => cmd_train(&config, &corpora, activity),
        Commands::Predict {
            activity,
            features,
            values,
        } => cmd_predict(&config, &activity, features.as_deref(), values),
        Commands::Classify { input, activity, age } => {
            cmd_classify(&config, &input, &activity, age)
        }
        Commands::Doctor { json } => cmd_doctor(&config, cli.config.as_deref(), json),
    }
}

fn print_json(value: &serde_json::Value) -> Result<(), RankCliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_ingest(
    config: &RankConfig,
    input: &Path,
    activity: &str,
    age: Option<f64>,
) -> Result<(), RankCliError> {
    let defaults = DecoderDefaults::new(activity, age.unwrap_or(config.default_age));
    let summary = decode_file(input, &defaults)?;

    let mut store = SummaryStore::new(&config.summaries_dir);
    let table = store.append(&summary)?;

    print_json(&json!({
        "table": table.display().to_string(),
        "summary": summary,
    }))
}

fn cmd_partition(input: &Path, output_dir: &Path) -> Result<(), RankCliError> {
    let counts = partition_by_activity(input, output_dir)?;
    print_json(&json!({ "rows_per_activity": counts }))
}

fn cmd_train(
    config: &RankConfig,
    corpora: &[PathBuf],
    activity: Option<String>,
) -> Result<(), RankCliError> {
    let inputs: Vec<TrainingInput> = match activity {
        Some(activity) => {
            if corpora.len() != 1 {
                return Err(RankCliError::InvalidArgs(
                    "--activity can only be used with a single corpus".to_string(),
                ));
            }
            vec![TrainingInput::new(activity, &corpora[0])]
        }
        None => corpora
            .iter()
            .map(|path| {
                TrainingInput::from_path(path).ok_or_else(|| {
                    RankCliError::InvalidArgs(format!(
                        "cannot infer an activity type from {}",
                        path.display()
                    ))
                })
            })
            .collect::<Result<_, _>>()?,
    };

    let store = ArtifactStore::new(&config.models_dir);
    let summary = train_corpora(&inputs, &store, &config.training);

    let trained: Vec<_> = summary
        .trained
        .iter()
        .map(|t| {
            json!({
                "activity_type": t.activity_type,
                "artifact_id": t.artifact_id.to_string(),
                "workouts": t.workouts,
                "self_check_percentile": t.self_check_percentile,
            })
        })
        .collect();
    let skipped: Vec<_> = summary
        .skipped
        .iter()
        .map(|s| json!({ "activity_type": s.activity_type, "reason": s.reason }))
        .collect();
    print_json(&json!({ "trained": trained, "skipped": skipped }))?;

    if summary.trained.is_empty() {
        Err(RankCliError::NothingTrained)
    } else {
        Ok(())
    }
}

fn cmd_predict(
    config: &RankConfig,
    activity: &str,
    features: Option<&str>,
    values: Option<Vec<f64>>,
) -> Result<(), RankCliError> {
    let input = match (features, values) {
        (Some(raw), _) => FeatureInput::Keyed(serde_json::from_str::<BTreeMap<String, f64>>(raw)?),
        (None, Some(values)) => FeatureInput::Ordered(values),
        (None, None) => {
            return Err(RankCliError::InvalidArgs(
                "one of --features or --values is required".to_string(),
            ))
        }
    };

    let artifact = ArtifactStore::new(&config.models_dir).load(activity)?;
    let vector = input.resolve(&artifact.features)?;
    let (percentile, recommendations) = recommend_with_artifact(&vector, &artifact)?;

    print_json(&json!({
        "activity_type": activity,
        "percentile": percentile,
        "recommendations": recommendations.to_map(),
    }))
}

fn cmd_classify(
    config: &RankConfig,
    input: &Path,
    activity: &str,
    age: Option<f64>,
) -> Result<(), RankCliError> {
    let mut classifier = WorkoutClassifier::new(config);

    match classifier.classify_file(input, activity, age)? {
        ClassificationOutcome::Ranked {
            percentile,
            recommendations,
            summary,
            features,
        } => print_json(&json!({
            "status": "ranked",
            "percentile": percentile,
            "recommendations": recommendations.to_map(),
            "features": features,
            "summary": summary,
        })),
        ClassificationOutcome::ModelUnavailable { activity_type } => {
            Err(RankCliError::ModelUnavailable(activity_type))
        }
        ClassificationOutcome::InvalidInput { reason } => Err(RankCliError::InvalidInput(reason)),
    }
}

fn cmd_doctor(
    config: &RankConfig,
    config_path: Option<&Path>,
    json: bool,
) -> Result<(), RankCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "config".to_string(),
        status: CheckStatus::Ok,
        message: match config_path {
            Some(path) => format!("Loaded {}", path.display()),
            None => "Using built-in defaults".to_string(),
        },
    });

    checks.push(if config.summaries_dir.is_dir() {
        DoctorCheck {
            name: "summaries_dir".to_string(),
            status: CheckStatus::Ok,
            message: format!("{} exists", config.summaries_dir.display()),
        }
    } else {
        DoctorCheck {
            name: "summaries_dir".to_string(),
            status: CheckStatus::Warning,
            message: format!(
                "{} does not exist yet; it is created on first ingest",
                config.summaries_dir.display()
            ),
        }
    });

    let store = ArtifactStore::new(&config.models_dir);
    match store.list() {
        Ok(activities) if activities.is_empty() => checks.push(DoctorCheck {
            name: "models".to_string(),
            status: CheckStatus::Warning,
            message: format!("No trained models in {}", config.models_dir.display()),
        }),
        Ok(activities) => {
            for activity in activities {
                let check = match store.load(&activity) {
                    Ok(artifact) => DoctorCheck {
                        name: format!("model:{activity}"),
                        status: CheckStatus::Ok,
                        message: format!(
                            "artifact {} trained {} on {} workouts",
                            artifact.artifact_id,
                            artifact.trained_at.to_rfc3339(),
                            artifact.report.train_size + artifact.report.validation_size
                        ),
                    },
                    Err(e) => DoctorCheck {
                        name: format!("model:{activity}"),
                        status: CheckStatus::Error,
                        message: e.to_string(),
                    },
                };
                checks.push(check);
            }
        }
        Err(e) => checks.push(DoctorCheck {
            name: "models".to_string(),
            status: CheckStatus::Error,
            message: format!("Cannot read {}: {}", config.models_dir.display(), e),
        }),
    }

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: RANK_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("wrank Doctor Report");
        println!("===================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(RankCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error handling

enum RankCliError {
    Rank(RankError),
    Json(serde_json::Error),
    InvalidArgs(String),
    ModelUnavailable(String),
    InvalidInput(String),
    NothingTrained,
    DoctorFailed,
}

impl From<RankError> for RankCliError {
    fn from(e: RankError) -> Self {
        RankCliError::Rank(e)
    }
}

impl From<serde_json::Error> for RankCliError {
    fn from(e: serde_json::Error) -> Self {
        RankCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(code: &str, message: String, hint: &str) -> Self {
        Self {
            code: code.to_string(),
            message,
            hint: Some(hint.to_string()),
        }
    }
}

impl From<RankCliError> for CliError {
    fn from(e: RankCliError) -> Self {
        match e {
            RankCliError::Rank(e) => {
                let message = e.to_string();
                match e {
                    RankError::Decode(_) => {
                        CliError::new("DECODE_ERROR", message, "Ensure the input is a FIT activity file")
                    }
                    RankError::MissingField(_) => {
                        CliError::new("MISSING_FIELD", message, "Check that the input carries the required data")
                    }
                    RankError::DivisionByZero(_) => {
                        CliError::new("INVALID_WORKOUT", message, "Workout duration and resting heart rate must be non-zero")
                    }
                    RankError::InsufficientData(_) => {
                        CliError::new("INSUFFICIENT_DATA", message, "Provide a corpus with at least one complete row")
                    }
                    RankError::Convergence(_) => {
                        CliError::new("TRAINING_FAILED", message, "Check the corpus for non-finite values")
                    }
                    RankError::UnknownFeature(_) => {
                        CliError::new("UNKNOWN_FEATURE", message, "Features are HRmax, HR%, TLI, MET and WEI")
                    }
                    RankError::InvalidActivityType(_) => {
                        CliError::new("INVALID_ACTIVITY", message, "Activity types cannot be empty or contain path separators")
                    }
                    RankError::ArtifactNotFound(_) => {
                        CliError::new("MODEL_NOT_FOUND", message, "Run 'wrank train' for this activity type")
                    }
                    RankError::ArtifactCorrupt(_) => {
                        CliError::new("MODEL_CORRUPT", message, "Retrain the activity to replace the artifact")
                    }
                    RankError::Config(_) => {
                        CliError::new("CONFIG_ERROR", message, "Check the TOML configuration file")
                    }
                    RankError::Io(_) => {
                        CliError::new("IO_ERROR", message, "Check file paths and permissions")
                    }
                    RankError::Json(_) => CliError::new("JSON_ERROR", message, "Check JSON syntax"),
                    RankError::Csv(_) => {
                        CliError::new("CSV_ERROR", message, "Check the table's header and delimiters")
                    }
                }
            }
            RankCliError::Json(e) => CliError::new("JSON_ERROR", e.to_string(), "Check JSON syntax"),
            RankCliError::InvalidArgs(msg) => {
                CliError::new("INVALID_ARGS", msg, "Run 'wrank help' for usage")
            }
            RankCliError::ModelUnavailable(activity) => CliError::new(
                "MODEL_UNAVAILABLE",
                format!("No trained model for activity type {activity}"),
                "Run 'wrank train' for this activity type",
            ),
            RankCliError::InvalidInput(reason) => CliError::new(
                "INVALID_INPUT",
                reason,
                "The workout's data cannot be ranked",
            ),
            RankCliError::NothingTrained => CliError::new(
                "NOTHING_TRAINED",
                "No corpus could be trained".to_string(),
                "Review the skipped activities above",
            ),
            RankCliError::DoctorFailed => CliError::new(
                "DOCTOR_FAILED",
                "One or more health checks failed".to_string(),
                "Review the doctor report for details",
            ),
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
