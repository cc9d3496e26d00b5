use anyhow::{anyhow, Result};

/// A sample identifier classified into what it names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedIdentifier {
    /// A decimal Slurm job id.
    JobId(String),
    /// A `<proc_name>.<uid>` composite; the name may itself contain dots.
    ProcessUid { name: String, uid: String },
}

/// Classify a raw jobstats identifier.
///
/// Purely numeric identifiers are job ids. Anything else must carry at least
/// one `.`: the last segment is the uid and everything before it is the
/// process name, so names like `lustre.read.ost3` survive intact. Only the
/// uid position is guaranteed free of internal delimiters, hence the
/// right-anchored split.
pub fn resolve(identifier: &str) -> Result<ResolvedIdentifier> {
    if is_job_id(identifier) {
        return Ok(ResolvedIdentifier::JobId(identifier.to_string()));
    }

    match identifier.rsplit_once('.') {
        Some((name, uid)) => Ok(ResolvedIdentifier::ProcessUid {
            name: name.to_string(),
            uid: uid.to_string(),
        }),
        None => Err(anyhow!(
            "Identifier {:?} is neither a job id nor <proc_name>.<uid>",
            identifier
        )),
    }
}

fn is_job_id(identifier: &str) -> bool {
    !identifier.is_empty() && identifier.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_identifier_is_a_job_id() {
        assert_eq!(
            resolve("123456").unwrap(),
            ResolvedIdentifier::JobId("123456".into())
        );
    }

    #[test]
    fn two_segment_identifier_splits_into_name_and_uid() {
        assert_eq!(
            resolve("foo.1001").unwrap(),
            ResolvedIdentifier::ProcessUid { name: "foo".into(), uid: "1001".into() }
        );
    }

    #[test]
    fn dotted_process_name_survives_the_split() {
        assert_eq!(
            resolve("lustre.read.ost3.1001").unwrap(),
            ResolvedIdentifier::ProcessUid {
                name: "lustre.read.ost3".into(),
                uid: "1001".into(),
            }
        );
    }

    #[test]
    fn bare_word_is_malformed() {
        assert!(resolve("lustre").is_err());
    }

    #[test]
    fn empty_identifier_is_malformed() {
        assert!(resolve("").is_err());
    }

    #[test]
    fn mixed_segment_is_not_a_job_id() {
        // 123456a is not fully numeric, so it resolves as a composite.
        assert!(resolve("123456a").is_err());
        assert_eq!(
            resolve("123456a.1001").unwrap(),
            ResolvedIdentifier::ProcessUid { name: "123456a".into(), uid: "1001".into() }
        );
    }
}
