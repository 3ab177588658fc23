#![doc = include_str!("../README.md")]

mod config;
mod input;
mod telemetry;

use anyhow::{Context, bail};
use clap::Parser;
use config::{CliArgs, RunConfig};
use intersector::{CancellationToken, Intersection, Intersector, RunStats, WorkerFailure};
use std::io::{self, Write};
use tokio::signal;

/// What is left of a run once its output has been written.
struct Outcome {
    stats: RunStats,
    failures: Vec<WorkerFailure>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = RunConfig::try_from(args)?;

    telemetry::init_tracing()?;
    tracing::debug!(?config, "starting intersection");

    let cancel = CancellationToken::new();
    let sources = input::open_all(&config.files)?;
    let run = Intersector::new(config.engine)
        .with_cancel_token(cancel.clone())
        .try_intersect(sources)?;

    // The engine blocks while it polls, so it gets a thread of its own.
    let mut output = tokio::task::spawn_blocking(move || write_output(run));

    let outcome = tokio::select! {
        joined = &mut output => joined??,
        received = signal::ctrl_c() => {
            received.context("failed to install Ctrl+C handler")?;
            tracing::info!("Received Ctrl+C signal, cancelling");
            cancel.cancel();
            output.await??
        }
    };

    if config.stats {
        eprintln!("{}", serde_json::to_string_pretty(&outcome.stats)?);
    }

    tracing::info!(
        state = ?outcome.stats.state,
        emitted = outcome.stats.emitted,
        "intersection finished"
    );

    if !outcome.failures.is_empty() {
        for failure in &outcome.failures {
            tracing::error!(%failure, "input failed");
        }
        bail!(
            "{} of {} inputs failed, output is incomplete",
            outcome.failures.len(),
            outcome.stats.inputs
        );
    }

    Ok(())
}

/// Drains `run` to stdout, one item per line.
///
/// A closed stdout (for example `| head`) cancels the run instead of failing.
fn write_output(mut run: Intersection<String>) -> anyhow::Result<Outcome> {
    let mut stdout = io::stdout().lock();

    while let Some(line) = run.next() {
        match writeln!(stdout, "{line}") {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
                tracing::debug!("stdout closed, cancelling");
                run.cancel();
                break;
            }
            Err(err) => return Err(err).context("failed to write output"),
        }
    }

    match stdout.flush() {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {}
        Err(err) => return Err(err).context("failed to write output"),
    }

    Ok(Outcome {
        stats: run.stats(),
        failures: run.failures().to_vec(),
    })
}
