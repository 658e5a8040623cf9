//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chapterquiz_core::graph::StepObserver;
use chapterquiz_core::{Collaborators, GenerateRequest, QuizService, ValidateRequest};
use chapterquiz_llm::{OpenRouterClient, OpenRouterOptions};
use chapterquiz_shared::{
    AppConfig, PipelineSettings, UserAnswer, expand_path, init_config, load_config,
    validate_api_key,
};
use chapterquiz_source::{ChapterHeadingExtractor, HttpObjectStore, ObjectStoreOptions};
use chapterquiz_storage::Storage;
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// ChapterQuiz: generate chapter questions from a book and grade answers.
#[derive(Parser)]
#[command(
    name = "chapterquiz",
    version,
    about = "Generate per-chapter questions from a book and grade user answers.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Database path (overrides the config file).
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Generate questions for a book, or return the stored set.
    Generate(GenerateArgs),

    /// Grade answers against a stored question set.
    Validate {
        #[arg(long)]
        user_id: String,

        /// Row id returned by `generate`.
        #[arg(long)]
        row_id: String,

        /// JSON file holding `[{"question_id": .., "user_answer": ..}]`.
        #[arg(long)]
        answers: PathBuf,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args)]
pub(crate) struct GenerateArgs {
    #[arg(long)]
    pub book_id: String,

    #[arg(long)]
    pub user_id: String,

    /// Local book file (UTF-8 text with `CHAPTER <n>:- <title>` headings).
    #[arg(long, required_unless_present = "s3_url", conflicts_with = "s3_url")]
    pub file: Option<PathBuf>,

    /// Object locator, `s3://bucket/key`.
    #[arg(long)]
    pub s3_url: Option<String>,

    /// Return at most this many questions.
    #[arg(long)]
    pub total_questions: Option<usize>,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "chapterquiz=info",
        1 => "chapterquiz=debug",
        _ => "chapterquiz=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // logs go to stderr so stdout stays valid JSON
    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Generate(args) => cmd_generate(cli.db.as_deref(), args).await,
        Command::Validate {
            user_id,
            row_id,
            answers,
        } => cmd_validate(cli.db.as_deref(), user_id, row_id, &answers).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

/// Wire the production adapters into a [`QuizService`].
async fn build_service(config: &AppConfig, db_override: Option<&Path>) -> Result<QuizService> {
    let api_key = validate_api_key(config)?;

    let db_path = db_override
        .map(Path::to_path_buf)
        .unwrap_or_else(|| expand_path(&config.defaults.database_path));
    let storage = Arc::new(Storage::open(&db_path).await?);
    info!(path = %db_path.display(), "storage opened");

    let model = OpenRouterClient::new(OpenRouterOptions::from_config(config, api_key))?;
    let resolver = HttpObjectStore::new(&ObjectStoreOptions::from(config))?;

    let collaborators = Collaborators {
        resolver: Arc::new(resolver),
        index: storage.clone(),
        extractor: Arc::new(ChapterHeadingExtractor::new()),
        model: Arc::new(model),
        store: storage,
    };
    Ok(QuizService::new(collaborators, PipelineSettings::from(config))?)
}

async fn cmd_generate(db: Option<&Path>, args: GenerateArgs) -> Result<()> {
    let config = load_config()?;
    let service = build_service(&config, db).await?;

    let file_content = match &args.file {
        Some(path) => Some(
            tokio::fs::read(path)
                .await
                .wrap_err_with(|| format!("cannot read {}", path.display()))?,
        ),
        None => None,
    };

    info!(book_id = %args.book_id, user_id = %args.user_id, "generating questions");

    let request = GenerateRequest {
        book_id: args.book_id,
        user_id: args.user_id,
        file_content,
        s3_url: args.s3_url,
        total_questions: args.total_questions,
    };

    let progress = CliProgress::new()?;
    let result = service.generate_observed(request, &progress).await;
    progress.finish();

    let response = result.map_err(|e| eyre!("{e}"))?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

/// Accepts a bare answer list or `{"list": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum AnswersFile {
    List(Vec<UserAnswer>),
    Wrapped { list: Vec<UserAnswer> },
}

fn read_answers(path: &Path) -> Result<Vec<UserAnswer>> {
    let raw = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("cannot read {}", path.display()))?;
    let parsed: AnswersFile = serde_json::from_str(&raw)
        .wrap_err_with(|| format!("{} is not a valid answer list", path.display()))?;
    Ok(match parsed {
        AnswersFile::List(list) | AnswersFile::Wrapped { list } => list,
    })
}

async fn cmd_validate(db: Option<&Path>, user_id: String, row_id: String, answers: &Path) -> Result<()> {
    let list = read_answers(answers)?;
    let config = load_config()?;
    let service = build_service(&config, db).await?;

    info!(%row_id, answers = list.len(), "validating answers");

    let progress = CliProgress::new()?;
    let result = service
        .validate_observed(
            ValidateRequest {
                user_id,
                row_id,
                list,
            },
            &progress,
        )
        .await;
    progress.finish();

    let response = result.map_err(|e| eyre!("{e}"))?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Spinner showing the workflow step currently running.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Result<Self> {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")?
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Ok(Self { spinner })
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl StepObserver for CliProgress {
    fn step_started(&self, step: &str) {
        self.spinner.set_message(step.replace('_', " "));
    }

    fn step_finished(&self, step: &str, ok: bool) {
        if !ok {
            self.spinner.println(format!("  ✗ {step}"));
        }
    }
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
