//! Run a command batch, or a single command, from the terminal.
//!
//! Run with:
//!   cargo run -p batch-runner -- run <batch.json>
//!   cargo run -p batch-runner -- exec <command...>
//!
//! Ctrl-C cancels. Timeouts come from the user settings file.

use std::{env, sync::Arc};

use anyhow::{Context, bail};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use twinshell_core::{
    BatchExecutionProgress, CommandBatch, JsonFileSettings, OutputCallback, OutputLine, Platform,
    SettingsProvider, StaticSettings,
};
use twinshell_executor::{BatchRunner, ProcessExecutor};
use twinshell_session::{
    AutoConfirm, ExecuteRequest, ExecutionSession, MemoryAuditLog, MemoryHistory, RunOutcome,
};

const USAGE: &str = "usage: batch-runner run <batch.json> | exec <command...>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let settings: Arc<dyn SettingsProvider> = match JsonFileSettings::default_location() {
        Some(file) => Arc::new(file),
        None => Arc::new(StaticSettings::default()),
    };

    let args: Vec<String> = env::args().skip(1).collect();
    match args.split_first() {
        Some((mode, rest)) if mode == "run" => {
            let path = rest.first().context(USAGE)?;
            run_batch(path, settings.as_ref()).await
        }
        Some((mode, rest)) if mode == "exec" && !rest.is_empty() => {
            exec_command(&rest.join(" "), settings).await
        }
        _ => bail!(USAGE),
    }
}

async fn run_batch(path: &str, settings: &dyn SettingsProvider) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {path}"))?;
    let batch = CommandBatch::import_json(&raw).with_context(|| format!("parsing {path}"))?;
    let timeout = settings.load_settings().await?.effective_timeout_seconds();

    let audit = Arc::new(MemoryAuditLog::new());
    let runner = BatchRunner::new(ProcessExecutor::new(), Arc::clone(&audit));

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let on_output: OutputCallback = Arc::new(|line| print_line(&line, "  "));

    let result = runner
        .execute_batch(batch, &cancel, timeout, Some(&print_progress), Some(on_output))
        .await;

    println!(
        "{}: {} executed, {} succeeded, {} failed, {} skipped in {:.2}s{}",
        result.batch.name,
        result.executed_count,
        result.success_count,
        result.failure_count,
        result.skipped_count,
        result.total_duration.as_secs_f64(),
        if result.was_cancelled { " (cancelled)" } else { "" }
    );
    tracing::debug!(entries = audit.entries()?.len(), "Audit log written");

    if let Some(message) = result.error_message {
        bail!(message);
    }
    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

fn print_progress(p: &BatchExecutionProgress<'_>) {
    if let Some(message) = &p.error_message {
        eprintln!("{message}");
    } else if let Some(command) = p.current_command.filter(|_| p.is_running) {
        println!(
            "[{}/{} {:>3.0}%] {}",
            p.current_command_index + 1,
            p.total_commands,
            p.progress_percentage(),
            command.action_title
        );
    }
}

fn print_line(line: &OutputLine, indent: &str) {
    if line.is_error {
        eprintln!("{indent}{}", line.text);
    } else {
        println!("{indent}{}", line.text);
    }
}

async fn exec_command(command: &str, settings: Arc<dyn SettingsProvider>) -> anyhow::Result<()> {
    let session = Arc::new(
        ExecutionSession::with_process_executor(Arc::new(MemoryHistory::new()), settings)
            .with_confirmation(Arc::new(AutoConfirm)),
    );

    tokio::spawn({
        let session = Arc::clone(&session);
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                session.cancel();
            }
        }
    });

    let platform = if cfg!(windows) {
        Platform::Windows
    } else {
        Platform::Linux
    };
    let outcome = session
        .execute(ExecuteRequest::new(command, platform))
        .await?;

    // The run is over, so the log holds every line it produced.
    for line in session.output().get_history() {
        print_line(&line, "");
    }
    tracing::info!(status = %session.snapshot().status_message, "Done");

    match outcome {
        RunOutcome::Finished(result) if result.success => Ok(()),
        RunOutcome::Finished(result) => std::process::exit(result.exit_code.max(1)),
        other => bail!("command did not run: {other:?}"),
    }
}
