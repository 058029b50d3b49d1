mod config;
mod engine;
mod export;
mod languages;
mod metrics;
mod session;
mod shell;
mod shortcut;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use crate::config::ClientConfig;
use crate::engine::{ExecutionController, ExecutionStatus, HttpTransport, RunState};
use crate::export::{export_solution, write_solution};
use crate::languages::Language;
use crate::metrics::{present_metrics, present_output};
use crate::session::{SessionPatch, SessionStore};
use crate::shell::{run_shell, ShellOptions};

#[derive(Debug, Parser)]
#[command(name = "runpad", version, about = "Run code on a remote execution backend")]
struct Cli {
    /// Backend run endpoint (overrides RUNPAD_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Directory for the persisted session (overrides RUNPAD_STATE_DIR)
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Seconds to wait for the backend (overrides RUNPAD_TIMEOUT_SECS)
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply edits, run the session once and print the result
    Run(RunArgs),
    /// Edit the persisted session without running it
    Set(SetArgs),
    /// Print the persisted session
    Show,
    /// Replace the code with the language boilerplate
    ResetCode,
    /// Write the code to Solution.<ext>
    Export {
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
    /// Interactive session with a run shortcut
    Shell {
        #[arg(long)]
        code_file: Option<PathBuf>,
        #[arg(long)]
        input_file: Option<PathBuf>,
        /// Where Ctrl+S exports the solution
        #[arg(long, default_value = ".")]
        export_dir: PathBuf,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(short, long, value_parser = parse_language)]
    language: Option<Language>,

    #[arg(short, long)]
    code_file: Option<PathBuf>,

    /// File whose contents are fed to the program's stdin
    #[arg(short, long, conflicts_with = "input")]
    input_file: Option<PathBuf>,

    /// Literal stdin for the program
    #[arg(long)]
    input: Option<String>,
}

#[derive(Debug, Args)]
struct SetArgs {
    #[arg(short, long, value_parser = parse_language)]
    language: Option<Language>,

    #[arg(short, long)]
    code_file: Option<PathBuf>,

    #[arg(long)]
    font_size: Option<i64>,
}

fn parse_language(raw: &str) -> Result<Language, String> {
    raw.parse::<Language>().map_err(|e| e.to_string())
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Process exit code for a settled run
fn exit_code(status: ExecutionStatus) -> u8 {
    match status {
        ExecutionStatus::Accepted => 0,
        ExecutionStatus::Error => 1,
        ExecutionStatus::ConnectionError => 2,
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();

    // Aliases like "py" are resolved while parsing arguments
    languages::init_languages()?;

    let cli = Cli::parse();

    let default_directive = match cli.command {
        Command::Shell { .. } => "runpad=warn",
        _ => "runpad=info",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(default_directive.parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ClientConfig::from_env()
        .with_api_url(cli.api_url)
        .with_state_dir(cli.state_dir)
        .with_timeout_secs(cli.timeout);

    let mut store = SessionStore::open(&config.state_dir).with_context(|| {
        format!("Failed to open session in {}", config.state_dir.display())
    })?;
    info!("Loaded session from {}", config.state_dir.display());

    match cli.command {
        Command::Run(args) => {
            let mut patch = SessionPatch::new();
            if let Some(language) = args.language {
                patch = patch.with_language(language);
            }
            if let Some(path) = &args.code_file {
                patch = patch.with_code(read_file(path)?);
            }
            if let Some(path) = &args.input_file {
                patch = patch.with_input(read_file(path)?);
            }
            if let Some(input) = args.input {
                patch = patch.with_input(input);
            }
            let session = store.save(patch)?;

            let transport = HttpTransport::new(&config.api_url)?;
            let controller =
                ExecutionController::new(Arc::new(transport)).with_timeout(config.run_timeout);

            let Some(result) = controller.run(&session).await else {
                anyhow::bail!("A run is already in progress");
            };

            let state = RunState::Settled(result.clone());
            println!("{}", present_output(&state));
            if let Some(metrics) = present_metrics(&state) {
                eprintln!(
                    "status: {}  time: {}  memory: {}",
                    metrics.status, metrics.elapsed, metrics.memory
                );
            }

            Ok(ExitCode::from(exit_code(result.status)))
        }
        Command::Set(args) => {
            let mut patch = SessionPatch::new();
            if let Some(language) = args.language {
                patch = patch.with_language(language);
            }
            if let Some(path) = &args.code_file {
                patch = patch.with_code(read_file(path)?);
            }
            if let Some(size) = args.font_size {
                patch = patch.with_font_size(size);
            }
            let session = store.save(patch)?;
            println!(
                "language: {}  font size: {}  code: {} bytes",
                session.language,
                session.font_size,
                session.code.len()
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::Show => {
            let session = store.load();
            println!("language: {} ({})", session.language, session.language.label());
            println!("font size: {}", session.font_size);
            println!("---");
            println!("{}", session.code);
            Ok(ExitCode::SUCCESS)
        }
        Command::ResetCode => {
            let session = store.reset_code()?;
            println!("Code reset to {} boilerplate", session.language.label());
            Ok(ExitCode::SUCCESS)
        }
        Command::Export { dir } => {
            let session = store.load();
            let file = export_solution(session.language, &session.code);
            let path = write_solution(&dir, &file)?;
            println!("{}", path.display());
            Ok(ExitCode::SUCCESS)
        }
        Command::Shell {
            code_file,
            input_file,
            export_dir,
        } => {
            let options = ShellOptions {
                code_file,
                input_file,
                export_dir,
            };
            run_shell(&config, store, options).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_args() {
        languages::init_languages().unwrap();
        let cli = Cli::try_parse_from([
            "runpad",
            "--api-url",
            "http://localhost:9000/api/run",
            "run",
            "-l",
            "py",
            "--input",
            "1 2",
        ])
        .unwrap();

        assert_eq!(cli.api_url.as_deref(), Some("http://localhost:9000/api/run"));
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.language, Some(Language::Python));
                assert_eq!(args.input.as_deref(), Some("1 2"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_input_sources_conflict() {
        assert!(Cli::try_parse_from([
            "runpad",
            "run",
            "--input",
            "1",
            "--input-file",
            "in.txt"
        ])
        .is_err());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(ExecutionStatus::Accepted), 0);
        assert_eq!(exit_code(ExecutionStatus::Error), 1);
        assert_eq!(exit_code(ExecutionStatus::ConnectionError), 2);
    }
}
