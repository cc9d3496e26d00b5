use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde_json::Value;

use crate::types::ThroughputSample;

/// Issue one deadline-bounded GET against a Prometheus query endpoint and
/// parse the instant-vector response into raw throughput samples.
pub async fn fetch_samples(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<Vec<ThroughputSample>> {
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .with_context(|| format!("Request to {} failed", url))?
        .error_for_status()
        .with_context(|| format!("Request to {} failed", url))?;

    let body = response
        .bytes()
        .await
        .with_context(|| format!("Reading response body from {} failed", url))?;

    tracing::trace!(url, bytes = body.len(), "Query response received");

    parse_query_response(&body)
}

/// Parse a Prometheus query-API response body.
///
/// An entry without a `metric.jobid` label is a known lossy artifact of the
/// jobstats producer: it is skipped with a diagnostic. A missing or
/// non-numeric `value` entry means the payload is structurally broken and
/// fails the whole fetch.
pub fn parse_query_response(body: &[u8]) -> Result<Vec<ThroughputSample>> {
    let root: Value = serde_json::from_slice(body).context("Response is not valid JSON")?;

    let status = root
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("Response has no status field"))?;
    if status != "success" {
        return Err(anyhow!("Query returned status {:?}", status));
    }

    let results = root
        .pointer("/data/result")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("Response has no data.result array"))?;

    let mut samples = Vec::with_capacity(results.len());

    for entry in results {
        let jobid = match entry.pointer("/metric/jobid").and_then(Value::as_str) {
            Some(jobid) => jobid,
            None => {
                tracing::warn!(entry = %entry, "Key jobid not found in metric entry");
                continue;
            }
        };

        let value = entry
            .get("value")
            .and_then(Value::as_array)
            .filter(|v| v.len() == 2)
            .ok_or_else(|| anyhow!("Entry for {} has no [timestamp, value] pair", jobid))?;

        let throughput = value[1]
            .as_str()
            .ok_or_else(|| anyhow!("Value for {} is not a string", jobid))?
            .parse::<f64>()
            .with_context(|| format!("Value for {} is not numeric", jobid))?;

        samples.push(ThroughputSample {
            identifier: jobid.to_string(),
            value: throughput,
        });
    }

    Ok(samples)
}
