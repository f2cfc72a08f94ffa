pub mod models {
    pub mod farm;
}

pub mod client;
pub mod config;
pub mod utils;
pub mod services {
    pub mod alerts;
    pub mod backend;
    pub mod commands;
    pub mod console;
    pub mod geo;
    pub mod manager;
    pub mod series;
    pub mod state;
}

use crate::client::FarmClient;
use crate::config::Config;
use crate::services::backend::HttpBackend;
use crate::services::commands::CommandDispatcher;
use crate::services::console::{self, ConsoleExit};
use crate::services::manager::DashboardStateManager;
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tokio::task::LocalSet;

async fn serve(cfg: Config) -> Result<(), String> {
    let client = FarmClient::new(cfg.api_url.clone(), cfg.request_timeout);
    info!("Using farm API at {}", client.base_url());
    let backend = Rc::new(HttpBackend::new(client));

    let (manager, handle) = DashboardStateManager::new(Rc::clone(&backend), cfg.poll_settings());
    let dispatcher = CommandDispatcher::new(Rc::clone(&backend), handle.clone());

    if cfg.simulate_on_start {
        // Polling has not started yet, so the follow-up refresh request just queues.
        if let Err(e) = dispatcher.simulate_data().await {
            warn!("Initial data simulation failed: {}", e);
        }
    }

    let watcher = tokio::task::spawn_local(console::log_view_changes(handle.subscribe()));
    let manager_task = tokio::task::spawn_local(manager.run());

    match console::run(&handle, &dispatcher, &cfg).await {
        ConsoleExit::Quit => {
            info!("Quit requested");
            handle.shutdown();
        }
        ConsoleExit::InputClosed => {
            info!("stdin closed; polling continues until the process is stopped");
        }
    }

    manager_task
        .await
        .map_err(|e| format!("dashboard manager task failed: {}", e))?;
    watcher
        .await
        .map_err(|e| format!("view watcher task failed: {}", e))?;
    Ok(())
}

pub fn run() -> Result<(), String> {
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (api={}, snapshot_interval={}s, historical_interval={}, historical_hours={}, positions_interval={}, display_window={}, failure_threshold={}, timeout={}s, simulate_on_start={})",
        cfg.api_url,
        cfg.snapshot_interval.as_secs(),
        cfg.historical_interval
            .map(|d| format!("{}s", d.as_secs()))
            .unwrap_or_else(|| "off".to_string()),
        cfg.historical_hours,
        cfg.positions_interval
            .map(|d| format!("{}s", d.as_secs()))
            .unwrap_or_else(|| "off".to_string()),
        cfg.display_window,
        cfg.failure_threshold,
        cfg.request_timeout.as_secs(),
        cfg.simulate_on_start
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|e| format!("failed to start async runtime: {}", e))?;
    let local = LocalSet::new();
    runtime.block_on(local.run_until(serve(cfg)))
}

/// Loads `--env-file <path>` if given, else `./.env` if present. Returns the
/// loaded path and whether it was explicit.
fn configure_env_from_cli() -> Result<Option<(PathBuf, bool)>, String> {
    let mut args = std::env::args().skip(1);
    let mut env_file: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        let path = if arg == "--env-file" {
            args.next()
                .ok_or_else(|| "`--env-file` requires a path argument".to_string())?
        } else if let Some(path) = arg.strip_prefix("--env-file=") {
            path.to_string()
        } else {
            return Err(format!("unrecognised argument: {}", arg));
        };
        if path.is_empty() {
            return Err("`--env-file` requires a path argument".to_string());
        }
        if env_file.replace(PathBuf::from(path)).is_some() {
            return Err("`--env-file` provided more than once".to_string());
        }
    }

    match env_file {
        Some(path) if !path.is_file() => Err(format!("env file not found: {}", path.display())),
        Some(path) => load_env_file(&path).map(|_| Some((path, true))),
        None => {
            let path = Path::new(".env");
            if path.is_file() {
                load_env_file(path).map(|_| Some((path.to_path_buf(), false)))
            } else {
                Ok(None)
            }
        }
    }
}

fn load_env_file(path: &Path) -> Result<(), String> {
    let text = std::fs::read_to_string(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    for (index, line) in text.lines().enumerate() {
        let Some((key, value)) =
            parse_env_line(line).map_err(|e| format!("{}:{}: {}", path.display(), index + 1, e))?
        else {
            continue;
        };
        // Variables already set in the process environment win.
        if std::env::var_os(key).is_none() {
            // SAFETY: called from `main` before the runtime or any other thread starts.
            unsafe {
                std::env::set_var(key, value);
            }
        }
    }
    Ok(())
}

/// `KEY=value`, optionally prefixed by `export` and optionally quoted.
/// Blank lines and `#` comments yield `None`.
fn parse_env_line(line: &str) -> Result<Option<(&str, String)>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);
    let (key, raw) = line.split_once('=').ok_or_else(|| "missing '=' in assignment".to_string())?;
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return Err(format!("invalid variable name: {:?}", key));
    }

    let raw = raw.trim();
    let value = match raw.chars().next() {
        Some(quote @ ('"' | '\'')) => {
            let inner = &raw[1..];
            let end = inner
                .find(quote)
                .ok_or_else(|| format!("unterminated {} quoted value", quote))?;
            let rest = inner[end + 1..].trim();
            if !(rest.is_empty() || rest.starts_with('#')) {
                return Err("unexpected characters after closing quote".to_string());
            }
            inner[..end].to_string()
        }
        _ => raw.split('#').next().unwrap_or_default().trim_end().to_string(),
    };
    Ok(Some((key, value)))
}

fn main() {
    let loaded_env = match configure_env_from_cli() {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after the env file so RUST_LOG from .env applies.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    if let Some((path, explicit)) = loaded_env {
        let origin = if explicit { "CLI-specified" } else { "default" };
        info!("Environment loaded from {} .env file: {}", origin, path.display());
    }

    info!(
        "farm-dashboard {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run() {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
