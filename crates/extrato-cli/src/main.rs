use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use extrato_core::config_file::{self, ConfigFile};
use extrato_core::{DocumentStore, TokenSource};
use extrato_parsing::{
    ExtractionResult, ParseTrace, ParsingConfigBuilder, ParsingError, StatementExtractor,
};
use extrato_tokens::JsonTokenSource;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

mod output;
mod store;

use output::{ColorMode, FileReport};
use store::FileStore;

/// Pay-statement extractor - Rebuild work entries and totals from positioned text
#[derive(Parser, Debug)]
#[command(name = "extrato", version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract statements from token files (JSON token streams or pdf2json output)
    Parse {
        /// Token files to parse
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Path to output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Directory where each statement is upserted as JSON
        #[arg(long)]
        store: Option<PathBuf>,

        /// Per-file timeout in seconds (default: $EXTRATO_TIMEOUT or 30)
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Extra TOML config, layered over ./.extrato.toml and the platform config
        #[arg(long)]
        config: Option<PathBuf>,

        /// Include the per-record parse trace
        #[arg(long)]
        trace: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Print the assembled lines of a token file with their regions
    Lines {
        /// Token file to inspect
        file: PathBuf,

        /// Show lines before reconstruction and segmentation
        #[arg(long)]
        raw: bool,

        /// Extra TOML config
        #[arg(long)]
        config: Option<PathBuf>,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Extra TOML config to layer on top
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write the effective configuration to the platform config file
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Parse {
            files,
            format,
            output,
            store,
            timeout_secs,
            config,
            trace,
            no_color,
        } => {
            parse(
                files,
                format,
                output,
                store,
                timeout_secs,
                config,
                trace,
                no_color,
            )
            .await
        }
        Command::Lines {
            file,
            raw,
            config,
            no_color,
        } => lines(&file, raw, config.as_deref(), no_color),
        Command::Config { config, save } => show_config(config.as_deref(), save),
    }
}

/// Logs go to stderr so JSON on stdout stays clean. `RUST_LOG` wins over `-v`.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Cascade: platform config < ./.extrato.toml < `--config`.
fn load_file_config(explicit: Option<&Path>) -> anyhow::Result<ConfigFile> {
    let base = config_file::load_config();
    match explicit {
        None => Ok(base),
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            let overlay = config_file::load_from_path(path)
                .with_context(|| format!("Could not parse config file {}", path.display()))?;
            Ok(config_file::merge(base, overlay))
        }
    }
}

fn build_extractor(explicit: Option<&Path>) -> anyhow::Result<StatementExtractor> {
    let file_config = load_file_config(explicit)?;
    let config = ParsingConfigBuilder::from_config_file(&file_config)
        .build()
        .context("Invalid marker pattern in configuration")?;
    Ok(StatementExtractor::with_config(config))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

enum FileOutcome {
    Parsed(ExtractionResult, ParseTrace),
    Failed(String),
}

type ParseHandle = JoinHandle<Result<(ExtractionResult, ParseTrace), ParsingError>>;

/// Wait for one file's pipeline until `deadline` or cancellation.
async fn await_parse(
    handle: ParseHandle,
    deadline: Instant,
    cancel: &CancellationToken,
    timeout_secs: u64,
) -> FileOutcome {
    if cancel.is_cancelled() {
        return FileOutcome::Failed("cancelled".to_string());
    }
    tokio::select! {
        res = tokio::time::timeout_at(deadline, handle) => match res {
            Ok(Ok(Ok((result, t)))) => FileOutcome::Parsed(result, t),
            Ok(Ok(Err(e))) => FileOutcome::Failed(e.to_string()),
            Ok(Err(join_err)) => FileOutcome::Failed(format!("worker panicked: {}", join_err)),
            Err(_) => FileOutcome::Failed(format!("timed out after {}s", timeout_secs)),
        },
        _ = cancel.cancelled() => FileOutcome::Failed("cancelled".to_string()),
    }
}

#[allow(clippy::too_many_arguments)]
async fn parse(
    files: Vec<PathBuf>,
    format: OutputFormat,
    output: Option<PathBuf>,
    store_dir: Option<PathBuf>,
    timeout_secs: Option<u64>,
    config: Option<PathBuf>,
    trace: bool,
    no_color: bool,
) -> anyhow::Result<()> {
    // Resolve configuration: CLI flags > env vars > defaults
    let timeout_secs = timeout_secs
        .or_else(|| {
            std::env::var("EXTRATO_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
        })
        .unwrap_or(30);
    let timeout = Duration::from_secs(timeout_secs);

    let use_color = !no_color && output.is_none() && format == OutputFormat::Text;
    let color = ColorMode(use_color);

    let mut writer: Box<dyn Write> = if let Some(ref output_path) = output {
        Box::new(std::fs::File::create(output_path)?)
    } else {
        Box::new(std::io::stdout())
    };

    let extractor = Arc::new(build_extractor(config.as_deref())?);
    let source = Arc::new(JsonTokenSource::new());
    let mut store = store_dir.map(FileStore::open).transpose()?;

    // Ctrl+C stops waiting on the remaining files.
    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_on_signal.cancel();
        }
    });

    // One independent pipeline per file on the blocking pool. Every file's
    // deadline counts from its spawn, not from when the loop reaches it.
    let deadline = Instant::now() + timeout;
    let handles: Vec<_> = files
        .iter()
        .map(|path| {
            let extractor = Arc::clone(&extractor);
            let source = Arc::clone(&source);
            let path = path.clone();
            tokio::task::spawn_blocking(move || -> Result<_, ParsingError> {
                let tokens = source.load_tokens(&path)?;
                extractor.extract_traced(&tokens)
            })
        })
        .collect();

    let mut outcomes = Vec::with_capacity(files.len());
    for (path, handle) in files.iter().zip(handles) {
        let outcome = await_parse(handle, deadline, &cancel, timeout_secs).await;
        match &outcome {
            FileOutcome::Parsed(result, _) => tracing::info!(
                file = %path.display(),
                entries = result.document.entries.len(),
                "parsed"
            ),
            FileOutcome::Failed(err) => {
                tracing::warn!(file = %path.display(), error = %err, "failed")
            }
        }
        outcomes.push(outcome);
    }

    let failed = outcomes
        .iter()
        .filter(|o| matches!(o, FileOutcome::Failed(_)))
        .count();

    match format {
        OutputFormat::Json => {
            let reports: Vec<FileReport<'_>> = files
                .iter()
                .zip(&outcomes)
                .map(|(path, outcome)| match outcome {
                    FileOutcome::Parsed(result, t) => FileReport {
                        file: path.display().to_string(),
                        result: Some(result),
                        trace: trace.then_some(t),
                        error: None,
                    },
                    FileOutcome::Failed(err) => FileReport {
                        file: path.display().to_string(),
                        result: None,
                        trace: None,
                        error: Some(err.clone()),
                    },
                })
                .collect();
            output::write_json_reports(&mut writer, &reports)?;
        }
        OutputFormat::Text => {
            for (path, outcome) in files.iter().zip(&outcomes) {
                let name = display_name(path);
                match outcome {
                    FileOutcome::Parsed(result, t) => {
                        output::print_statement(&mut writer, &name, result, color)?;
                        output::print_warnings(&mut writer, &result.warnings, color)?;
                        output::print_stats(&mut writer, &result.stats, color)?;
                        if trace {
                            output::print_trace(&mut writer, t, color)?;
                        }
                    }
                    FileOutcome::Failed(err) => {
                        output::print_failure(&mut writer, &name, err, color)?;
                    }
                }
                writeln!(writer)?;
            }
        }
    }

    if let Some(store) = store.as_mut() {
        for outcome in &outcomes {
            if let FileOutcome::Parsed(result, _) = outcome {
                let key = result.document.key().to_string();
                let upserted = store
                    .upsert(&result.document)
                    .with_context(|| format!("Failed to store {}", key))?;
                if format == OutputFormat::Text {
                    output::print_stored(&mut writer, &key, upserted, color)?;
                }
            }
        }
    }

    writer.flush()?;

    if failed > 0 {
        anyhow::bail!("{} of {} file(s) failed", failed, files.len());
    }
    Ok(())
}

fn lines(file: &Path, raw: bool, config: Option<&Path>, no_color: bool) -> anyhow::Result<()> {
    if !file.exists() {
        anyhow::bail!("File not found: {}", file.display());
    }
    let extractor = build_extractor(config)?;
    let tokens = JsonTokenSource::new()
        .load_tokens(file)
        .with_context(|| format!("Could not read tokens from {}", file.display()))?;

    let color = ColorMode(!no_color);
    let mut writer = std::io::stdout();
    let assembled = extractor.assemble_lines(&tokens);
    if raw {
        output::print_lines(&mut writer, &assembled, None, &[], color)?;
    } else {
        let (reconstructed, merges) = extractor.reconstruct_lines(&assembled);
        let sections = extractor.segment(&reconstructed);
        output::print_lines(&mut writer, &reconstructed, Some(&sections), &merges, color)?;
    }
    Ok(())
}

fn show_config(config: Option<&Path>, save: bool) -> anyhow::Result<()> {
    let effective = load_file_config(config)?;
    // Validate patterns before printing or saving.
    ParsingConfigBuilder::from_config_file(&effective)
        .build()
        .context("Invalid marker pattern in configuration")?;

    if save {
        let path = config_file::save_config(&effective).map_err(|e| anyhow::anyhow!(e))?;
        println!("Saved configuration to {}", path.display());
    } else {
        print!("{}", toml::to_string_pretty(&effective)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slow_parse(delay: Duration) -> ParseHandle {
        tokio::task::spawn_blocking(move || {
            std::thread::sleep(delay);
            Err(ParsingError::UnrecoverableLayout("empty".to_string()))
        })
    }

    #[tokio::test]
    async fn test_deadline_counts_from_spawn() {
        let deadline = Instant::now() + Duration::from_millis(100);
        let handle = slow_parse(Duration::from_millis(200));
        // Time spent waiting on earlier files still counts against this one.
        tokio::time::sleep(Duration::from_millis(80)).await;
        let outcome = await_parse(handle, deadline, &CancellationToken::new(), 1).await;
        match outcome {
            FileOutcome::Failed(msg) => assert!(msg.contains("timed out"), "{}", msg),
            FileOutcome::Parsed(..) => panic!("expected a timeout"),
        }
    }

    #[tokio::test]
    async fn test_finished_parse_reports_its_error() {
        let deadline = Instant::now() + Duration::from_secs(5);
        let outcome = await_parse(
            slow_parse(Duration::ZERO),
            deadline,
            &CancellationToken::new(),
            5,
        )
        .await;
        match outcome {
            FileOutcome::Failed(msg) => assert!(msg.contains("unrecoverable layout"), "{}", msg),
            FileOutcome::Parsed(..) => panic!("expected a failure"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_wait() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let deadline = Instant::now() + Duration::from_secs(5);
        let outcome = await_parse(slow_parse(Duration::ZERO), deadline, &cancel, 5).await;
        assert!(matches!(outcome, FileOutcome::Failed(ref m) if m == "cancelled"));
    }
}
