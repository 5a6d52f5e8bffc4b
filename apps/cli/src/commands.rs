//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use lessonforge_core::{Pipeline, ProcessResult, ProgressReporter};
use lessonforge_shared::{AppConfig, init_config, load_config, load_config_from, validate_secrets};
use lessonforge_storage::ChapterStore;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// LessonForge: turn folders of scanned pages into structured courses.
#[derive(Parser)]
#[command(
    name = "lessonforge",
    version,
    about = "Turn folders of scanned study material into chapters and quizzes.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file to use instead of ~/.lessonforge/lessonforge.toml.
    #[arg(long, env = "LESSONFORGE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

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
    /// Serve `POST /process-images` over HTTP.
    Serve {
        /// Address to bind (overrides `server.bind_addr`).
        #[arg(long)]
        bind: Option<String>,

        /// Chapter database path (overrides `storage.db_path`).
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Process one folder and print the generated chapters as JSON.
    Process {
        /// Folder identifier.
        folder_id: String,

        /// Save the chapters under this course id.
        #[arg(long)]
        course_id: Option<String>,

        /// Chapter database path (overrides `storage.db_path`).
        #[arg(long)]
        db: Option<PathBuf>,

        /// Write the JSON to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the stored chapters of a course as JSON.
    Chapters {
        /// Course identifier.
        course_id: String,

        /// Chapter database path (overrides `storage.db_path`).
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

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

/// Initialize tracing based on CLI flags. `RUST_LOG` takes precedence.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(cli.verbose)));

    // Logs go to stderr so `process` can pipe JSON on stdout.
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

/// Filter used when `RUST_LOG` is unset. `tower_http` carries the server's
/// per-request spans.
fn default_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "lessonforge=info,tower_http=info",
        1 => "lessonforge=debug,tower_http=debug",
        _ => "lessonforge=trace,tower_http=trace",
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Serve { bind, db } => cmd_serve(config_path, bind, db).await,
        Command::Process {
            folder_id,
            course_id,
            db,
            output,
        } => {
            cmd_process(
                config_path,
                &folder_id,
                course_id.as_deref(),
                db,
                output.as_deref(),
            )
            .await
        }
        Command::Chapters { course_id, db } => cmd_chapters(config_path, &course_id, db).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

/// Apply a `--db` override and return the effective database path, if any.
fn db_path(config: &mut AppConfig, db: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(db) = db {
        config.storage.db_path = Some(db.to_string_lossy().into_owned());
    }
    config.storage.db_path.as_ref().map(PathBuf::from)
}

async fn open_store(path: Option<PathBuf>) -> Result<ChapterStore> {
    let path = path.ok_or_else(|| {
        eyre!("no chapter database configured: pass --db or set [storage] db_path")
    })?;
    let store = ChapterStore::open(&path)
        .await
        .wrap_err_with(|| format!("cannot open chapter database {}", path.display()))?;
    Ok(store)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_serve(config_path: Option<&Path>, bind: Option<String>, db: Option<PathBuf>) -> Result<()> {
    let mut config = resolve_config(config_path)?;
    validate_secrets(&config)?;
    if let Some(bind) = bind {
        config.server.bind_addr = bind;
    }
    db_path(&mut config, db);

    info!(bind_addr = %config.server.bind_addr, "starting server");
    lessonforge_server::serve(&config).await?;
    Ok(())
}

async fn cmd_process(
    config_path: Option<&Path>,
    folder_id: &str,
    course_id: Option<&str>,
    db: Option<PathBuf>,
    output: Option<&Path>,
) -> Result<()> {
    let mut config = resolve_config(config_path)?;
    validate_secrets(&config)?;
    let db = db_path(&mut config, db);

    // Open the store up front so a bad path fails before any remote work.
    let store = match course_id {
        Some(_) => Some(open_store(db).await?),
        None => None,
    };

    let pipeline = Pipeline::from_config(&config)?;
    let reporter = CliProgress::new();

    let cancel = async {
        // If the handler cannot be installed the run simply is not cancellable.
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let result = pipeline.run_until(folder_id, &reporter, cancel).await;
    reporter.clear();
    let result = result?;

    if let (Some(store), Some(course_id)) = (&store, course_id) {
        store.save_chapters(course_id, &result.chapters).await?;
        eprintln!("  Saved {} chapters to course {course_id}", result.chapters.len());
    }

    let json = serde_json::to_string_pretty(&result.chapters)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .wrap_err_with(|| format!("cannot write {}", path.display()))?;
            eprintln!("  Wrote {}", path.display());
        }
        None => println!("{json}"),
    }

    print_summary(&result);
    Ok(())
}

fn print_summary(result: &ProcessResult) {
    eprintln!();
    eprintln!("  Folder:   {}", result.folder_id);
    eprintln!(
        "  Images:   {} ({} without text)",
        result.file_count, result.empty_files
    );
    eprintln!("  Corpus:   {} chars", result.corpus_chars);
    eprintln!("  Chapters: {}", result.chapters.len());
    eprintln!("  Time:     {:.1}s", result.elapsed.as_secs_f64());
    eprintln!();
}

async fn cmd_chapters(config_path: Option<&Path>, course_id: &str, db: Option<PathBuf>) -> Result<()> {
    let mut config = resolve_config(config_path)?;
    let store = open_store(db_path(&mut config, db)).await?;

    let chapters = store.list_chapters(course_id).await?;
    if chapters.is_empty() {
        eprintln!("No chapters stored for course {course_id}");
    }
    println!("{}", serde_json::to_string_pretty(&chapters)?);
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .map(|s| s.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]))
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }

    fn clear(&self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn file_extracted(&self, name: &str, chars: usize, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Extracting [{current}/{total}] {name} ({chars} chars)"));
    }

    fn done(&self, _result: &ProcessResult) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_process_flags() {
        let cli = Cli::try_parse_from([
            "lessonforge",
            "-vv",
            "process",
            "FOLDER",
            "--course-id",
            "c1",
            "--db",
            "/tmp/x.db",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Process {
                folder_id,
                course_id,
                db,
                output,
            } => {
                assert_eq!(folder_id, "FOLDER");
                assert_eq!(course_id.as_deref(), Some("c1"));
                assert_eq!(db, Some(PathBuf::from("/tmp/x.db")));
                assert!(output.is_none());
            }
            _ => panic!("expected process command"),
        }
    }

    #[test]
    fn default_filter_includes_request_traces() {
        assert_eq!(default_filter(0), "lessonforge=info,tower_http=info");
        assert_eq!(default_filter(1), "lessonforge=debug,tower_http=debug");
        assert_eq!(default_filter(3), "lessonforge=trace,tower_http=trace");
        for verbose in 0..4 {
            assert!(tracing_subscriber::EnvFilter::try_new(default_filter(verbose)).is_ok());
        }
    }

    #[test]
    fn db_flag_overrides_config() {
        let mut config = AppConfig::default();
        config.storage.db_path = Some("from-config.db".into());

        assert_eq!(db_path(&mut config, None), Some(PathBuf::from("from-config.db")));
        assert_eq!(
            db_path(&mut config, Some(PathBuf::from("flag.db"))),
            Some(PathBuf::from("flag.db"))
        );
        assert_eq!(config.storage.db_path.as_deref(), Some("flag.db"));
    }
}
