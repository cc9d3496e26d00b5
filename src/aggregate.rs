use std::collections::HashMap;

use crate::resolve::{self, ResolvedIdentifier};
use crate::types::{JobRecord, ThroughputSample};

/// Per-cycle aggregate totals for one I/O direction.
///
/// Job totals are keyed by `(account, user)`, process totals by
/// `(proc_name, uid)`. Buckets are built fresh every cycle; values only grow
/// within a cycle.
#[derive(Debug, Default)]
pub struct Buckets {
    pub jobs: HashMap<(String, String), f64>,
    pub procs: HashMap<(String, String), f64>,
}

/// Correlate raw samples with the cycle's job snapshot.
///
/// Job-id samples with no matching record are silently dropped: the job
/// usually just finished between the snapshot and the jobstats scrape, which
/// is expected steady-state behavior and not an error. Unresolvable
/// identifiers are skipped with a diagnostic.
pub fn aggregate(samples: &[ThroughputSample], jobs: &[JobRecord]) -> Buckets {
    let by_job_id: HashMap<&str, &JobRecord> =
        jobs.iter().map(|j| (j.job_id.as_str(), j)).collect();

    let mut buckets = Buckets::default();

    for sample in samples {
        match resolve::resolve(&sample.identifier) {
            Ok(ResolvedIdentifier::JobId(id)) => {
                if let Some(job) = by_job_id.get(id.as_str()) {
                    *buckets
                        .jobs
                        .entry((job.account.clone(), job.user.clone()))
                        .or_insert(0.0) += sample.value;
                }
            }
            Ok(ResolvedIdentifier::ProcessUid { name, uid }) => {
                *buckets.procs.entry((name, uid)).or_insert(0.0) += sample.value;
            }
            Err(e) => {
                tracing::warn!(identifier = %sample.identifier, error = %e, "Skipping sample");
            }
        }
    }

    buckets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str, account: &str, user: &str) -> JobRecord {
        JobRecord {
            job_id: id.into(),
            account: account.into(),
            user: user.into(),
        }
    }

    fn sample(identifier: &str, value: f64) -> ThroughputSample {
        ThroughputSample { identifier: identifier.into(), value }
    }

    #[test]
    fn matched_job_sample_lands_in_its_account_bucket() {
        let jobs = vec![job("123456", "acctA", "userX")];
        let buckets = aggregate(&[sample("123456", 100.0)], &jobs);

        assert_eq!(buckets.jobs[&("acctA".into(), "userX".into())], 100.0);
        assert!(buckets.procs.is_empty());
    }

    #[test]
    fn samples_for_one_job_sum_within_the_cycle() {
        // One sample per storage target is the common case.
        let jobs = vec![job("123456", "acctA", "userX")];
        let samples = [
            sample("123456", 100.0),
            sample("123456", 50.0),
            sample("123456", 25.0),
        ];
        let buckets = aggregate(&samples, &jobs);
        assert_eq!(buckets.jobs[&("acctA".into(), "userX".into())], 175.0);
    }

    #[test]
    fn jobs_sharing_an_account_share_a_bucket() {
        let jobs = vec![
            job("1", "acctA", "userX"),
            job("2", "acctA", "userX"),
            job("3", "acctB", "userY"),
        ];
        let samples = [sample("1", 10.0), sample("2", 20.0), sample("3", 5.0)];
        let buckets = aggregate(&samples, &jobs);

        assert_eq!(buckets.jobs[&("acctA".into(), "userX".into())], 30.0);
        assert_eq!(buckets.jobs[&("acctB".into(), "userY".into())], 5.0);
    }

    #[test]
    fn unmatched_job_id_is_dropped_silently() {
        let jobs = vec![job("123456", "acctA", "userX")];
        let buckets = aggregate(&[sample("999999", 100.0)], &jobs);
        assert!(buckets.jobs.is_empty());
        assert!(buckets.procs.is_empty());
    }

    #[test]
    fn proc_samples_need_no_snapshot() {
        let buckets = aggregate(
            &[
                sample("kworker.0", 1.0),
                sample("lustre.read.ost3.1001", 2.0),
                sample("lustre.read.ost3.1001", 3.0),
            ],
            &[],
        );

        assert_eq!(buckets.procs[&("kworker".into(), "0".into())], 1.0);
        assert_eq!(
            buckets.procs[&("lustre.read.ost3".into(), "1001".into())],
            5.0
        );
    }

    #[test]
    fn malformed_identifier_is_skipped() {
        let jobs = vec![job("123456", "acctA", "userX")];
        let samples = [sample("notanid", 100.0), sample("123456", 1.0)];
        let buckets = aggregate(&samples, &jobs);
        assert_eq!(buckets.jobs.len(), 1);
        assert_eq!(buckets.jobs[&("acctA".into(), "userX".into())], 1.0);
    }

    #[test]
    fn matched_totals_are_conserved() {
        // Sum over job buckets equals the sum of all matched samples.
        let jobs = vec![
            job("1", "acctA", "userX"),
            job("2", "acctB", "userY"),
        ];
        let samples = [
            sample("1", 10.0),
            sample("1", 15.0),
            sample("2", 30.0),
            sample("7", 999.0),        // finished job, dropped
            sample("convd.55", 40.0),  // proc, separate bucket set
        ];
        let buckets = aggregate(&samples, &jobs);

        let job_total: f64 = buckets.jobs.values().sum();
        assert_eq!(job_total, 55.0);
        let proc_total: f64 = buckets.procs.values().sum();
        assert_eq!(proc_total, 40.0);
    }
}
