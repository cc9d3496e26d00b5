use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use prometheus::{Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};

use crate::aggregate;
use crate::config::Config;
use crate::jobs;
use crate::throughput;
use crate::types::{Direction, JobRecord, ThroughputSample};

const NAMESPACE: &str = "lustre";
const NAMESPACE_INTERNALS: &str = "lustre_exporter";

pub const STAGE_FETCH_JOBS: &str = "fetch-jobs";
pub const STAGE_BUILD_READ: &str = "build-read";
pub const STAGE_BUILD_WRITE: &str = "build-write";

/// Outcome of one collection cycle.
///
/// `overall_ok` latches false on the first stage error and stays false for
/// the rest of the cycle; stages after a failed one still run.
#[derive(Debug)]
pub struct ScrapeResult {
    pub stage_durations: HashMap<&'static str, f64>,
    pub overall_ok: bool,
    pub errors: Vec<anyhow::Error>,
}

/// Explicitly constructed collector: owns its registry, gauges and
/// configuration. No ambient global metric state anywhere.
pub struct Exporter {
    squeue_command: String,
    squeue_timeout: Duration,
    read_url: String,
    write_url: String,
    request_timeout: Duration,
    client: reqwest::Client,
    registry: Registry,
    scrape_ok: Gauge,
    stage_execution: GaugeVec,
    job_read_throughput: GaugeVec,
    job_write_throughput: GaugeVec,
    proc_read_throughput: GaugeVec,
    proc_write_throughput: GaugeVec,
}

fn throughput_gauge(name: &str, help: &str, labels: &[&str]) -> Result<GaugeVec> {
    GaugeVec::new(Opts::new(name, help).namespace(NAMESPACE), labels)
        .with_context(|| format!("Failed to create metric {}", name))
}

impl Exporter {
    pub fn new(config: &Config) -> Result<Self> {
        let scrape_ok = Gauge::with_opts(
            Opts::new(
                "scrape_ok",
                "Indicates if the scrape of the exporter was successful or not.",
            )
            .namespace(NAMESPACE_INTERNALS),
        )?;

        let stage_execution = GaugeVec::new(
            Opts::new(
                "stage_execution_seconds",
                "Execution duration in seconds spent in a specific exporter stage.",
            )
            .namespace(NAMESPACE_INTERNALS),
            &["stage"],
        )?;

        let job_read_throughput = throughput_gauge(
            "job_read_throughput_bytes",
            "Total IO read throughput of all jobs on the cluster per account in bytes per second.",
            &["account", "user"],
        )?;
        let job_write_throughput = throughput_gauge(
            "job_write_throughput_bytes",
            "Total IO write throughput of all jobs on the cluster per account in bytes per second.",
            &["account", "user"],
        )?;
        let proc_read_throughput = throughput_gauge(
            "proc_read_throughput_bytes",
            "Total IO read throughput of process names on the cluster per uid in bytes per second.",
            &["proc_name", "uid"],
        )?;
        let proc_write_throughput = throughput_gauge(
            "proc_write_throughput_bytes",
            "Total IO write throughput of process names on the cluster per uid in bytes per second.",
            &["proc_name", "uid"],
        )?;

        let registry = Registry::new();
        registry.register(Box::new(scrape_ok.clone()))?;
        registry.register(Box::new(stage_execution.clone()))?;
        registry.register(Box::new(job_read_throughput.clone()))?;
        registry.register(Box::new(job_write_throughput.clone()))?;
        registry.register(Box::new(proc_read_throughput.clone()))?;
        registry.register(Box::new(proc_write_throughput.clone()))?;

        Ok(Self {
            squeue_command: config.slurm.squeue_command.clone(),
            squeue_timeout: Duration::from_secs(config.slurm.timeout_secs),
            read_url: config.lustre.read_url.clone(),
            write_url: config.lustre.write_url.clone(),
            request_timeout: Duration::from_secs(config.lustre.request_timeout_secs),
            client: reqwest::Client::new(),
            registry,
            scrape_ok,
            stage_execution,
            job_read_throughput,
            job_write_throughput,
            proc_read_throughput,
            proc_write_throughput,
        })
    }

    /// Run one collection cycle: snapshot the running jobs, then build the
    /// read and write throughput metrics from that snapshot.
    ///
    /// A stage failure marks the cycle as failed but never skips the stages
    /// after it; partial results beat empty results.
    pub async fn collect(&self) -> ScrapeResult {
        self.reset();

        let mut result = ScrapeResult {
            stage_durations: HashMap::new(),
            overall_ok: true,
            errors: Vec::new(),
        };

        // One-shot background task, one suspension point for the cycle.
        let rx = jobs::spawn_snapshot(self.squeue_command.clone(), self.squeue_timeout);
        let outcome = match rx.await {
            Ok(outcome) => outcome,
            Err(_) => jobs::SnapshotOutcome {
                jobs: Vec::new(),
                elapsed: Duration::ZERO,
                error: Some(anyhow!("Snapshot task terminated without a result")),
            },
        };

        self.record_stage(&mut result, STAGE_FETCH_JOBS, outcome.elapsed.as_secs_f64());
        if let Some(e) = outcome.error {
            result.overall_ok = false;
            result.errors.push(e);
        }
        let running_jobs = outcome.jobs;
        tracing::debug!(count = running_jobs.len(), "Job snapshot complete");

        // The builds share only the immutable snapshot and write disjoint
        // gauge families, so they run concurrently.
        let (read, write) = tokio::join!(
            self.build_throughput_metrics(&running_jobs, Direction::Read),
            self.build_throughput_metrics(&running_jobs, Direction::Write),
        );

        for (stage, (elapsed, outcome)) in
            [(STAGE_BUILD_READ, read), (STAGE_BUILD_WRITE, write)]
        {
            self.record_stage(&mut result, stage, elapsed);
            if let Err(e) = outcome {
                result.overall_ok = false;
                result.errors.push(e);
            }
        }

        self.scrape_ok.set(if result.overall_ok { 1.0 } else { 0.0 });

        result
    }

    /// Encode the registry in the Prometheus text format.
    pub fn encode(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .context("Failed to encode metrics")?;
        String::from_utf8(buffer).context("Encoded metrics are not valid UTF-8")
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Drop all bucket sets from the previous cycle. Label combinations for
    /// jobs and processes no longer present vanish here instead of
    /// accumulating over the exporter's lifetime.
    fn reset(&self) {
        self.stage_execution.reset();
        self.job_read_throughput.reset();
        self.job_write_throughput.reset();
        self.proc_read_throughput.reset();
        self.proc_write_throughput.reset();
    }

    fn record_stage(&self, result: &mut ScrapeResult, stage: &'static str, elapsed: f64) {
        self.stage_execution.with_label_values(&[stage]).set(elapsed);
        result.stage_durations.insert(stage, elapsed);
    }

    async fn build_throughput_metrics(
        &self,
        running_jobs: &[JobRecord],
        direction: Direction,
    ) -> (f64, Result<()>) {
        let start = Instant::now();
        let outcome = self.fetch_and_populate(running_jobs, direction).await;
        (start.elapsed().as_secs_f64(), outcome)
    }

    async fn fetch_and_populate(
        &self,
        running_jobs: &[JobRecord],
        direction: Direction,
    ) -> Result<()> {
        let url = match direction {
            Direction::Read => &self.read_url,
            Direction::Write => &self.write_url,
        };

        let samples = throughput::fetch_samples(&self.client, url, self.request_timeout)
            .await
            .with_context(|| format!("Fetching {} throughput failed", direction))?;
        tracing::debug!(direction = %direction, count = samples.len(), "Jobstats samples fetched");

        self.populate(&samples, running_jobs, direction);
        Ok(())
    }

    /// Correlate one direction's samples with the job snapshot and set the
    /// direction's gauges from the resulting buckets.
    pub fn populate(
        &self,
        samples: &[ThroughputSample],
        running_jobs: &[JobRecord],
        direction: Direction,
    ) {
        let buckets = aggregate::aggregate(samples, running_jobs);

        let (job_metric, proc_metric) = match direction {
            Direction::Read => (&self.job_read_throughput, &self.proc_read_throughput),
            Direction::Write => (&self.job_write_throughput, &self.proc_write_throughput),
        };

        for ((account, user), value) in &buckets.jobs {
            job_metric.with_label_values(&[account, user]).set(*value);
        }
        for ((name, uid), value) in &buckets.procs {
            proc_metric.with_label_values(&[name, uid]).set(*value);
        }
    }
}
