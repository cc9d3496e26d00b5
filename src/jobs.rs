use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use tokio::sync::oneshot;

use crate::types::JobRecord;

/// Arguments producing unformatted `<jobid> <account> <user>` rows, one job
/// per line, no header.
const SQUEUE_ARGS: [&str; 3] = ["-ah", "-o", "%A %a %u"];

/// Result of one snapshot attempt, delivered over the one-shot channel.
#[derive(Debug)]
pub struct SnapshotOutcome {
    pub jobs: Vec<JobRecord>,
    pub elapsed: Duration,
    pub error: Option<anyhow::Error>,
}

/// Locate `command` on $PATH. Called once at startup; a host without the
/// queue-manager client cannot serve scrapes at all.
pub fn resolve_command(command: &str) -> Result<PathBuf> {
    let candidate = PathBuf::from(command);
    if candidate.components().count() > 1 {
        if candidate.is_file() {
            return Ok(candidate);
        }
        return Err(anyhow!("Command not found: {}", command));
    }

    let path = std::env::var_os("PATH")
        .ok_or_else(|| anyhow!("PATH is not set, cannot resolve command {}", command))?;
    for dir in std::env::split_paths(&path) {
        let full = dir.join(command);
        if full.is_file() {
            return Ok(full);
        }
    }
    Err(anyhow!("Command not found on PATH: {}", command))
}

/// Spawn the snapshot subprocess as a one-shot background task bounded by
/// `timeout`. The caller suspends exactly once on the returned receiver.
pub fn spawn_snapshot(command: String, timeout: Duration) -> oneshot::Receiver<SnapshotOutcome> {
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let outcome = fetch_running_jobs(&command, timeout).await;
        // Receiver dropped means the cycle was abandoned; nothing to do.
        let _ = tx.send(outcome);
    });
    rx
}

/// Run squeue once and parse its output into the cycle's job snapshot.
///
/// A subprocess failure or deadline expiry yields an empty job set plus the
/// error; malformed rows are skipped individually and never fail the fetch.
pub async fn fetch_running_jobs(command: &str, timeout: Duration) -> SnapshotOutcome {
    let start = Instant::now();

    let result = tokio::time::timeout(timeout, run_squeue(command)).await;

    let (jobs, error) = match result {
        Ok(Ok(stdout)) => (parse_rows(&stdout), None),
        Ok(Err(e)) => (Vec::new(), Some(e)),
        Err(_) => (
            Vec::new(),
            Some(anyhow!(
                "{} did not finish within {}s",
                command,
                timeout.as_secs()
            )),
        ),
    };

    SnapshotOutcome { jobs, elapsed: start.elapsed(), error }
}

async fn run_squeue(command: &str) -> Result<String> {
    let output = tokio::process::Command::new(command)
        .args(SQUEUE_ARGS)
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("Failed to run {}", command))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!(
            "{} exited with {}: {}",
            command,
            output.status,
            stderr.trim()
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Tokenize squeue rows into job records. Each row must have exactly three
/// fields; anything else is logged and skipped so one truncated row cannot
/// take down the whole snapshot.
fn parse_rows(content: &str) -> Vec<JobRecord> {
    let mut jobs = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 3 {
            tracing::warn!(row = line, "Skipping malformed squeue row");
            continue;
        }
        jobs.push(JobRecord {
            job_id: fields[0].to_string(),
            account: fields[1].to_string(),
            user: fields[2].to_string(),
        });
    }

    jobs
}
