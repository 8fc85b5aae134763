//! Command line front-end for the FMU settings API.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fmu_settings_client::config::Config;
use fmu_settings_client::errors::ClientError;
use fmu_settings_client::history::format::{
    format_field_path, format_inline_value, list_item_key, scalar_diff_kind,
};
use fmu_settings_client::history::DiffView;
use fmu_settings_client::lock::LockState;
use fmu_settings_client::models::{CacheResource, FieldDiff, FmuDirPath};
use fmu_settings_client::notify::{self, TracingNotifier, WRITE_ERROR_PREFIX};
use fmu_settings_client::AppState;

#[derive(Parser)]
#[command(name = "fmu-settings")]
#[command(version)]
#[command(about = "Inspect an FMU project, its lock and snapshot history")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show API health, session and project lock state
    Status,

    /// Open the `.fmu` directory at a path
    Open { path: String },

    /// Create a `.fmu` directory at a path
    Init { path: String },

    /// Close the open `.fmu` directory
    Close,

    /// List snapshots of a resource, newest first
    Snapshots {
        /// config.json or mappings.json
        #[arg(value_parser = parse_resource)]
        resource: CacheResource,
    },

    /// Show the differences between current state and a snapshot
    Diff {
        #[arg(value_parser = parse_resource)]
        resource: CacheResource,
        revision: String,
    },

    /// Restore a snapshot of a resource
    Restore {
        #[arg(value_parser = parse_resource)]
        resource: CacheResource,
        revision: String,
    },

    /// Extend the project lock
    RenewLock,

    /// Follow the lock status until interrupted
    Watch,
}

fn parse_resource(s: &str) -> Result<CacheResource, String> {
    CacheResource::from_str(s).ok_or_else(|| {
        let known: Vec<_> = CacheResource::ALL.iter().map(|r| r.as_str()).collect();
        format!("unknown resource '{}', expected one of {}", s, known.join(", "))
    })
}

fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if config.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = Config::from_env();
    init_logging(&config);

    tracing::debug!("API URL: {}", config.api_url);

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, config: Config) -> Result<(), ClientError> {
    let state = AppState::from_config(config, Arc::new(TracingNotifier))?;

    if let Commands::Status = command {
        return cmd_status(&state).await;
    }

    state.session.ensure_ready()?;
    state.session.create_session().await?;

    match command {
        Commands::Status => Ok(()),
        Commands::Open { path } => cmd_open(&state, &path, false).await,
        Commands::Init { path } => cmd_open(&state, &path, true).await,
        Commands::Close => {
            let message = state
                .api
                .delete_fmu_directory()
                .await
                .inspect_err(|e| report_write_error(&state, e))?;
            println!("{}", message.message);
            Ok(())
        }
        Commands::Snapshots { resource } => cmd_snapshots(&state, resource).await,
        Commands::Diff { resource, revision } => cmd_diff(&state, resource, &revision).await,
        Commands::Restore { resource, revision } => cmd_restore(&state, resource, &revision).await,
        Commands::RenewLock => cmd_renew_lock(&state).await,
        Commands::Watch => cmd_watch(&state).await,
    }
}

async fn cmd_status(state: &AppState) -> Result<(), ClientError> {
    let health = state.api.health_v1().await?;
    println!("API health: {}", health.get("status").map(String::as_str).unwrap_or("unknown"));
    println!("Token: {:?}", state.session.token_status());

    if state.session.ensure_ready().is_err() {
        println!("No API token, launch with FMU_SETTINGS_LAUNCH_URL=...#token=<token>");
        return Ok(());
    }
    state.session.create_session().await?;

    let project = state.api.get_project().await?;
    println!("Project: {} ({})", project.project_dir_name, project.path);

    let snapshot = state.lock_monitor().poll_once().await?;
    println!("Lock: {}", describe_lock(snapshot.state, snapshot.seconds_left));
    Ok(())
}

fn report_write_error(state: &AppState, error: &ClientError) {
    notify::report_error(state.notifier.as_ref(), WRITE_ERROR_PREFIX, error);
}

async fn cmd_open(state: &AppState, path: &str, init: bool) -> Result<(), ClientError> {
    let path = FmuDirPath::new(path);
    let result = if init {
        state.api.init_fmu_directory(&path).await
    } else {
        state.api.open_fmu_directory(&path).await
    };
    let config = result.inspect_err(|e| report_write_error(state, e))?;
    println!("{} (version {}, created by {})", path.path, config.version, config.created_by);

    let project = state.api.get_cwd_fmu_directory().await?;
    println!("Project: {} ({})", project.project_dir_name, project.path);
    Ok(())
}

async fn cmd_snapshots(state: &AppState, resource: CacheResource) -> Result<(), ClientError> {
    let viewer = state.history_viewer();
    let entries = viewer.set_resource(resource).await?;

    println!("{}", resource.label());
    if entries.is_empty() {
        println!("  (no snapshots)");
    }
    for entry in entries {
        println!("  {:<24} {:<28} {}", entry.label, entry.date_time_label, entry.cache_id);
    }
    Ok(())
}

async fn cmd_diff(state: &AppState, resource: CacheResource, revision: &str) -> Result<(), ClientError> {
    let viewer = state.history_viewer();
    viewer.set_resource(resource).await?;

    match viewer.open_diff(revision).await? {
        DiffView::Differences(diffs) => {
            for diff in &diffs {
                print_diff(diff);
            }
        }
        view => {
            if let Some(message) = view.message() {
                println!("{}", message);
            }
        }
    }
    Ok(())
}

fn print_diff(diff: &FieldDiff) {
    println!("{}", format_field_path(diff.field_path()));
    match diff {
        FieldDiff::Scalar(diff) => {
            println!("  {}", scalar_diff_kind(diff).as_str());
            println!("    before restore: {}", format_inline_value(diff.before.as_ref()));
            println!("    after restore:  {}", format_inline_value(diff.after.as_ref()));
        }
        FieldDiff::List(diff) => {
            for (title, items) in [("added", &diff.added), ("removed", &diff.removed)] {
                if !items.is_empty() {
                    println!("  {} ({})", title, items.len());
                    for item in items {
                        println!("    {}", list_item_key(item));
                    }
                }
            }
            if !diff.updated.is_empty() {
                println!("  updated ({})", diff.updated.len());
                for entry in &diff.updated {
                    println!("    {}", format_inline_value(Some(&entry.key)));
                    println!("      before restore: {}", format_inline_value(Some(&entry.before)));
                    println!("      after restore:  {}", format_inline_value(Some(&entry.after)));
                }
            }
        }
    }
}

async fn cmd_restore(state: &AppState, resource: CacheResource, revision: &str) -> Result<(), ClientError> {
    let read_only = state.api.get_lock_status().await?.is_read_only();

    let viewer = state.history_viewer();
    viewer.set_resource(resource).await?;
    viewer.open_restore_dialog(revision);
    let message = viewer.restore_selected(read_only).await?;
    println!("{}", message.message);

    if let Some(entry) = viewer.entries().first() {
        println!("  {:<24} {}", entry.label, entry.date_time_label);
    }
    Ok(())
}

async fn cmd_renew_lock(state: &AppState) -> Result<(), ClientError> {
    let snapshot = state.lock_monitor().renew().await?;
    println!("Lock: {}", describe_lock(snapshot.state, snapshot.seconds_left));
    Ok(())
}

async fn cmd_watch(state: &AppState) -> Result<(), ClientError> {
    let monitor = state.lock_monitor();
    let mut rx = monitor.subscribe();
    let handle = monitor.start();

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = rx.borrow_and_update().clone();
                println!("Lock: {}", describe_lock(snapshot.state, snapshot.seconds_left));
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    handle.stop();
    Ok(())
}

fn describe_lock(state: LockState, seconds_left: Option<u64>) -> String {
    match (state, seconds_left) {
        (LockState::Unlocked, _) => "not held (read-only)".to_string(),
        (LockState::Locked { .. }, Some(secs)) => format!("held, expires in {}s", secs),
        (LockState::Locked { .. }, None) => "held".to_string(),
        (LockState::WarningVisible { .. }, secs) => {
            format!("expires in {}s, renew with `fmu-settings renew-lock`", secs.unwrap_or(0))
        }
        (LockState::Expired, _) => "expired".to_string(),
    }
}
