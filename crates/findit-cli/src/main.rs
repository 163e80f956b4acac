//! Find It Fast CLI
//!
//! Serves the game over HTTP and WebSocket, or plays it in the terminal with
//! `--play`.

use std::future::Future;
use std::io::BufRead;
use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use findit_game::{
    create_router, AppState, Command, Config, GameController, GameEvent, HttpSceneGenerator,
    SessionView,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tracing_subscriber::EnvFilter;

/// Default port for the HTTP API server.
const DEFAULT_PORT: u16 = 3000;

/// Ticks at or below this many seconds are always shown in terminal mode.
const COUNTDOWN_WARNING_SECONDS: u32 = 5;

/// Lines buffered between the stdin reader thread and the command loop.
const INPUT_BUFFER: usize = 16;

/// Find It Fast - a timed counting game
///
/// Pick an object, count how many are hidden in a generated scene, and beat
/// the clock. Every level gives you less time.
#[derive(Parser, Debug)]
#[command(name = "findit")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: findit.json in current directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long)]
    verbose: bool,

    /// Port for the HTTP API server
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Play in the terminal instead of serving the HTTP API
    #[arg(long)]
    play: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Find It Fast starting");
    tracing::debug!(config = ?args.config, "Config file");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    print_config(&config);

    let generator = HttpSceneGenerator::new(config.generator.clone())
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    let controller = GameController::new(&config, Arc::new(generator));

    if args.play {
        play_in_terminal(controller).await
    } else {
        serve(controller, args.port).await
    }
}

/// Serves the HTTP API until Ctrl+C.
async fn serve(controller: GameController, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = ([127, 0, 0, 1], port).into();
    let router = create_router(AppState::with_controller(controller));

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    println!();
    println!("HTTP API server running on http://{addr}");
    println!("Event stream on ws://{addr}/ws");
    println!("Press Ctrl+C to stop");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, shutting down");
            }
        })
        .await?;

    Ok(())
}

/// Reads commands from stdin and prints game events until `quit`, EOF or
/// Ctrl+C.
async fn play_in_terminal(controller: GameController) -> anyhow::Result<()> {
    let printer = tokio::spawn(print_events(controller.subscribe()));

    println!();
    print_help();
    print_view(&controller.snapshot().await);

    let lines = spawn_stdin_reader();
    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C, shutting down");
        }
    };
    run_commands(&controller, lines, shutdown).await;

    printer.abort();
    Ok(())
}

/// Reads stdin on a plain OS thread and forwards each line.
///
/// The thread is detached. A blocking read left on it cannot hold up runtime
/// shutdown the way `tokio::io::stdin` does.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(INPUT_BUFFER);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else {
                tracing::warn!("Failed to read from stdin");
                break;
            };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Dispatches input lines until `quit`, the end of input, or `shutdown`.
async fn run_commands(
    controller: &GameController,
    mut lines: mpsc::Receiver<String>,
    shutdown: impl Future<Output = ()>,
) {
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            () = &mut shutdown => break,
            line = lines.recv() => {
                let Some(line) = line else {
                    break;
                };
                if !handle_line(controller, &line).await {
                    break;
                }
            }
        }
    }
}

/// Runs one line of input. Returns `false` when the player asked to leave.
async fn handle_line(controller: &GameController, line: &str) -> bool {
    let input = line.trim();
    match input.to_ascii_lowercase().as_str() {
        "" => {}
        "quit" | "exit" => return false,
        "help" => print_help(),
        "status" => print_view(&controller.snapshot().await),
        _ => match input.parse::<Command>() {
            Ok(command) => {
                tracing::debug!(%command, "Dispatching command");
                if let Err(e) = controller.dispatch(command).await {
                    println!("  {e}");
                }
            }
            Err(e) => println!("  {e}"),
        },
    }
    true
}

/// Prints game events as they arrive.
async fn print_events(mut events: broadcast::Receiver<GameEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if let Some(line) = describe_event(&event) {
                    println!("{line}");
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "Terminal fell behind on game events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Renders an event for the terminal. Routine ticks are skipped.
fn describe_event(event: &GameEvent) -> Option<String> {
    let line = match event {
        GameEvent::Connected(_) => return None,
        GameEvent::ObjectSelected(p) => format!("  Looking for: {}", p.object_type),
        GameEvent::SceneRequested(p) => format!("  Generating scene for level {}...", p.level),
        GameEvent::SceneReady(p) => format!(
            "  Level {}: scene ready at {} ({}s on the clock)",
            p.level, p.scene_ref, p.remaining_seconds
        ),
        GameEvent::ControlsRevealed(_) => {
            "  How many can you find? Type: guess <0-10>".to_string()
        }
        GameEvent::Tick(p) => {
            if p.remaining_seconds > COUNTDOWN_WARNING_SECONDS && p.remaining_seconds % 5 != 0 {
                return None;
            }
            format!("  {}s left", p.remaining_seconds)
        }
        GameEvent::LevelCleared(p) => {
            format!("  Correct! Level {} cleared. Type: next", p.level)
        }
        GameEvent::GameOver(p) => format!("  {} Type: retry", p.reason),
        GameEvent::Reset(_) => "  New game. Type: select <object>, then start".to_string(),
        GameEvent::Error(p) => format!("  {}", p.message),
    };
    Some(line)
}

/// Loads configuration from the specified path or default location.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

fn print_config(config: &Config) {
    println!("Configuration loaded:");
    println!(
        "  Difficulty: {}s, -{}s per level, floor {}s",
        config.difficulty.base_seconds, config.difficulty.step_seconds, config.difficulty.min_seconds
    );
    println!("  Reveal delay: {}ms", config.reveal_delay_ms);
    println!("  Scene gateway: {}", config.generator.gateway_url);
    println!("  Model: {}", config.generator.model_id);
}

fn print_help() {
    println!("Commands:");
    println!("  select <monster|llama|penguin>   choose what to look for");
    println!("  start                            start the current level");
    println!("  guess <0-10>                     submit your count");
    println!("  next                             go to the next level");
    println!("  retry                            start over after a game over");
    println!("  status                           show the current game");
    println!("  quit                             leave the game");
}

fn print_view(view: &SessionView) {
    let object = view
        .object_type
        .map_or_else(|| "none".to_string(), |o| o.to_string());
    println!(
        "  Phase: {} | Level: {} | Time: {}s | Object: {}",
        view.phase, view.level, view.remaining_seconds, object
    );
    if let Some(reason) = &view.failure_reason {
        println!("  {reason}");
    }
    if let Some(error) = &view.error {
        println!("  {error}");
    }
}
