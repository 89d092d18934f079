use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use nous::capability::CapabilityProjection;
use nous::projection::{CognitiveProjection, ExecutionProjection, SemanticProjection, names};
use nous::protocol::{canonicalize, deserialize, digest, event_types};
use nous::{EventStore, FileEventStore, ProjectionEngine, ReadQuery};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "nous-inspect")]
#[command(about = "Replay, list and verify nous JSON-Lines event logs")]
struct Cli {
    /// Path to the `events.jsonl` log.
    #[arg(long, default_value = ".nous/events.jsonl")]
    log: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fold the log through the built-in projections and print their state.
    Replay {
        /// Print only this projection.
        #[arg(long)]
        projection: Option<String>,
    },
    /// List `kernel.checkpoint.created` records.
    Checkpoints {
        #[arg(long, default_value_t = 0)]
        from: u64,
    },
    /// Check that every line is in canonical form and print its digest.
    Verify {
        /// Print a digest per record.
        #[arg(long)]
        digests: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .compact()
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Replay { projection } => replay(&cli.log, projection.as_deref()).await,
        Command::Checkpoints { from } => checkpoints(&cli.log, from).await,
        Command::Verify { digests } => verify(&cli.log, digests).await,
    }
}

async fn replay(log: &Path, only: Option<&str>) -> Result<()> {
    let store = Arc::new(FileEventStore::new(log));
    let engine = ProjectionEngine::new(store.clone());
    engine.register(names::EXECUTION, ExecutionProjection).await;
    engine.register(names::COGNITIVE, CognitiveProjection).await;
    engine.register(names::SEMANTIC, SemanticProjection).await;
    engine.register(names::CAPABILITY, CapabilityProjection).await;

    let head = engine.catch_up().await?;
    info!(log = %log.display(), records = head, "log replayed");

    let rendered = match only {
        Some(name) => serde_json::to_string_pretty(&engine.get_state_json(name).await?)?,
        None => serde_json::to_string_pretty(&engine.snapshot_json().await?)?,
    };
    println!("{rendered}");
    Ok(())
}

async fn checkpoints(log: &Path, from: u64) -> Result<()> {
    let store = FileEventStore::new(log);
    let records = store
        .read(ReadQuery::from_offset(from).event_type(event_types::CHECKPOINT_CREATED))
        .await?;
    for envelope in &records {
        println!(
            "{}\t{}\t{}\t{}",
            envelope.timestamp.to_rfc3339(),
            envelope.payload.get("checkpoint_id").and_then(|v| v.as_str()).unwrap_or("-"),
            envelope.payload.get("node_id").and_then(|v| v.as_str()).unwrap_or("-"),
            envelope.producer.agent_id,
        );
    }
    info!(count = records.len(), "checkpoints listed");
    Ok(())
}

async fn verify(log: &Path, print_digests: bool) -> Result<()> {
    let text = tokio::fs::read_to_string(log)
        .await
        .with_context(|| format!("failed reading log {}", log.display()))?;
    let report = verify_lines(&text);
    if print_digests {
        for (offset, hash) in &report.digests {
            println!("{offset}\t{hash}");
        }
    }
    for problem in &report.problems {
        warn!(%problem, "record failed verification");
    }
    info!(
        records = report.digests.len(),
        problems = report.problems.len(),
        "log verified"
    );
    if !report.problems.is_empty() {
        bail!("{} record(s) failed verification", report.problems.len());
    }
    Ok(())
}

#[derive(Debug, Default)]
struct VerifyReport {
    digests: Vec<(u64, String)>,
    problems: Vec<String>,
}

/// Offsets count non-blank lines, matching the store.
fn verify_lines(text: &str) -> VerifyReport {
    let mut report = VerifyReport::default();
    let lines = text.lines().filter(|line| !line.trim().is_empty());
    for (offset, line) in (0u64..).zip(lines.map(str::trim_end)) {
        let envelope = match deserialize(line) {
            Ok(envelope) => envelope,
            Err(err) => {
                report.problems.push(format!("offset {offset}: {err}"));
                continue;
            }
        };
        match canonicalize(&envelope).and_then(|canonical| {
            digest(&envelope).map(|hash| (canonical, hash))
        }) {
            Ok((canonical, hash)) => {
                if canonical != line {
                    report
                        .problems
                        .push(format!("offset {offset}: record is not in canonical form"));
                }
                report.digests.push((offset, hash));
            }
            Err(err) => report.problems.push(format!("offset {offset}: {err}")),
        }
    }
    report
}
