//! simwatch - CLI entry point
//!
//! Submits simulation runs, follows their live telemetry, and inspects or
//! purges what the backend has persisted.

use std::io::{self, Write};
use std::path::PathBuf;
use std::pin::pin;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::stream::{self, Stream, StreamExt};
use simwatch::backend::HttpBackend;
use simwatch::config::loader::ConfigLoader;
use simwatch::config::schema::{Config, ServerConfig};
use simwatch::config::{default, xdg};
use simwatch::logging;
use simwatch::render::{OutputFormat, Renderer};
use simwatch::session::{SessionController, SessionEvent, SlotOutcome};
use simwatch::RunConfig;
use sim_api::SimClient;
use tokio::sync::broadcast::{self, error::RecvError};

/// Exit code after a second Ctrl-C, matching shell convention for SIGINT.
const INTERRUPTED: u8 = 130;

/// Monitoring client for cluster scheduler simulations
#[derive(Parser)]
#[command(name = "simwatch")]
#[command(version, about = "Monitoring client for cluster scheduler simulations")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands for the simwatch CLI
#[derive(Subcommand)]
enum Commands {
    /// Start a run and follow its telemetry until results arrive
    Run {
        /// Backend base address (overrides SIMWATCH_URL and the config file)
        #[arg(long)]
        url: Option<String>,
        /// Run configuration file (TOML) to submit instead of the [run] section
        #[arg(long = "run", value_name = "FILE")]
        run_file: Option<PathBuf>,
        /// Print one JSON object per line instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print persisted telemetry and results without starting a run
    Recover {
        /// Backend base address (overrides SIMWATCH_URL and the config file)
        #[arg(long)]
        url: Option<String>,
        /// Print one JSON object per line instead of text
        #[arg(long)]
        json: bool,
    },

    /// Ask the backend to halt the active run
    Stop {
        /// Backend base address (overrides SIMWATCH_URL and the config file)
        #[arg(long)]
        url: Option<String>,
    },

    /// Purge persisted telemetry history and results
    Clear {
        /// Backend base address (overrides SIMWATCH_URL and the config file)
        #[arg(long)]
        url: Option<String>,
    },

    /// Manage configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Actions for the `config` subcommand.
#[derive(Subcommand)]
enum ConfigAction {
    /// Create default configuration file
    Init {
        /// Overwrite existing configuration (creates backup)
        #[arg(long)]
        force: bool,
    },
    /// Show configuration file path
    Path,
    /// Validate configuration file
    Validate,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let command = match cli.command {
        Commands::Config { action } => return run_config_command(action),
        command => command,
    };

    let config = match ConfigLoader::load_default() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Config error: {e}");
            return ExitCode::FAILURE;
        }
    };
    logging::init(config.logging.log_level);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    rt.block_on(async move {
        match command {
            Commands::Run {
                url,
                run_file,
                json,
            } => run_command(config, url.as_deref(), run_file, output_format(json)).await,
            Commands::Recover { url, json } => {
                recover_command(&config.server, url.as_deref(), output_format(json)).await
            }
            Commands::Stop { url } => stop_command(&config.server, url.as_deref()).await,
            Commands::Clear { url } => clear_command(&config.server, url.as_deref()).await,
            Commands::Config { .. } => ExitCode::SUCCESS,
        }
    })
}

fn output_format(json: bool) -> OutputFormat {
    if json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    }
}

fn run_config_command(action: ConfigAction) -> ExitCode {
    let result = match action {
        ConfigAction::Init { force } => default::create_default_config(force).map(|path| {
            println!("Created configuration at {}", path.display());
        }),
        ConfigAction::Path => {
            println!("{}", xdg::config_path().display());
            Ok(())
        }
        ConfigAction::Validate => ConfigLoader::load_default().and_then(|config| {
            ConfigLoader::validate(&config, &xdg::config_path())?;
            println!("Configuration is valid");
            println!("{config:#?}");
            Ok(())
        }),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Config error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Builds the HTTP client for the resolved backend address.
fn build_client(server: &ServerConfig, url: Option<&str>) -> Result<SimClient, String> {
    let timeout = server
        .request_timeout()
        .map_err(|e| format!("invalid server.request_timeout: {e}"))?;
    let base_url = server.effective_base_url(url);
    SimClient::new(&base_url, timeout).map_err(|e| e.to_string())
}

fn build_controller(server: &ServerConfig, url: Option<&str>) -> Result<SessionController, String> {
    let client = build_client(server, url)?;
    tracing::debug!(base_url = %client.base_url(), "using backend");
    Ok(SessionController::new(Arc::new(HttpBackend::new(client))))
}

/// Recovers persisted state, starts a run, and renders events until the
/// final results have been fetched.
///
/// The first Ctrl-C halts the run and keeps following it; a second one exits.
async fn run_command(
    config: Config,
    url: Option<&str>,
    run_file: Option<PathBuf>,
    format: OutputFormat,
) -> ExitCode {
    let run = match load_run(&config, run_file) {
        Ok(run) => run,
        Err(e) => {
            eprintln!("Config error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let controller = match build_controller(&config.server, url) {
        Ok(controller) => controller,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let interrupts = match interrupts() {
        Ok(interrupts) => interrupts,
        Err(e) => {
            eprintln!("Error: cannot listen for Ctrl-C: {e}");
            return ExitCode::FAILURE;
        }
    };
    let mut renderer = Renderer::new(io::stdout(), format);

    let report = controller.recover().await;
    if report.history.is_loaded() || report.results.is_loaded() {
        let snapshot = controller.snapshot().await;
        if output_closed(renderer.snapshot(&snapshot)) {
            return ExitCode::FAILURE;
        }
    }

    let mut events = controller.subscribe();
    if let Err(e) = controller.start(run).await {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }

    follow(&controller, &mut events, &mut renderer, interrupts).await
}

/// Renders session events until the final results arrive.
///
/// The first item from `interrupts` halts the run; the second exits with
/// [`INTERRUPTED`].
async fn follow<W, I>(
    controller: &SessionController,
    events: &mut broadcast::Receiver<SessionEvent>,
    renderer: &mut Renderer<W>,
    interrupts: I,
) -> ExitCode
where
    W: Write,
    I: Stream<Item = ()>,
{
    let mut interrupts = pin!(interrupts);
    let mut stopping = false;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if output_closed(renderer.event(&event)) {
                        return ExitCode::FAILURE;
                    }
                    if matches!(event, SessionEvent::ResultsUpdated(_)) {
                        return ExitCode::SUCCESS;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "renderer fell behind, events skipped");
                }
                Err(RecvError::Closed) => return ExitCode::FAILURE,
            },
            Some(()) = interrupts.next() => {
                if stopping {
                    eprintln!("Interrupted, results not fetched");
                    return ExitCode::from(INTERRUPTED);
                }
                stopping = true;
                eprintln!("Stopping run (press Ctrl-C again to exit)...");
                if let Err(e) = controller.stop().await {
                    eprintln!("Error: {e}");
                }
            }
        }
    }
}

/// Ctrl-C presses, registered once so none are missed between polls.
#[cfg(unix)]
fn interrupts() -> io::Result<impl Stream<Item = ()>> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigint = signal(SignalKind::interrupt())?;
    Ok(stream::poll_fn(move |cx| sigint.poll_recv(cx)))
}

#[cfg(windows)]
fn interrupts() -> io::Result<impl Stream<Item = ()>> {
    let mut ctrl_c = tokio::signal::windows::ctrl_c()?;
    Ok(stream::poll_fn(move |cx| ctrl_c.poll_recv(cx)))
}

#[cfg(not(any(unix, windows)))]
fn interrupts() -> io::Result<impl Stream<Item = ()>> {
    Ok(stream::pending())
}

/// Returns `true` if rendering failed, which means stdout is gone.
fn output_closed(result: io::Result<()>) -> bool {
    match result {
        Ok(()) => false,
        Err(e) => {
            tracing::debug!(error = %e, "stdout closed, stopping output");
            true
        }
    }
}

fn load_run(config: &Config, run_file: Option<PathBuf>) -> Result<RunConfig, String> {
    match run_file {
        Some(path) => ConfigLoader::load_run_file(&path).map_err(|e| e.to_string()),
        None => {
            config.run.validate().map_err(|e| format!("[run] {e}"))?;
            Ok(config.run.clone())
        }
    }
}

/// Prints whatever the backend has persisted.
///
/// Fails only when neither history nor results could be fetched.
async fn recover_command(server: &ServerConfig, url: Option<&str>, format: OutputFormat) -> ExitCode {
    let controller = match build_controller(server, url) {
        Ok(controller) => controller,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let report = controller.recover().await;
    for (slot, outcome) in [("history", &report.history), ("results", &report.results)] {
        if let SlotOutcome::Failed(reason) = outcome {
            eprintln!("Warning: {slot} unavailable: {reason}");
        }
    }

    let mut renderer = Renderer::new(io::stdout(), format);
    if let Err(e) = renderer.snapshot(&controller.snapshot().await) {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }

    let both_failed = matches!(report.history, SlotOutcome::Failed(_))
        && matches!(report.results, SlotOutcome::Failed(_));
    if both_failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

async fn stop_command(server: &ServerConfig, url: Option<&str>) -> ExitCode {
    let client = match build_client(server, url) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    match client.halt().await {
        Ok(()) => {
            println!("Stop requested.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn clear_command(server: &ServerConfig, url: Option<&str>) -> ExitCode {
    let controller = match build_controller(server, url) {
        Ok(controller) => controller,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    match controller.clear().await {
        Ok(()) => {
            println!("History and results cleared.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
