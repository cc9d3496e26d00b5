pub mod aggregate;
pub mod config;
pub mod exporter;
pub mod jobs;
pub mod resolve;
pub mod server;
pub mod throughput;

/// Common types used across modules
pub mod types {
    /// One currently running Slurm job with its accounting identity.
    ///
    /// Snapshots are rebuilt from scratch every collection cycle and never
    /// persist across cycles.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct JobRecord {
        pub job_id: String,
        pub account: String,
        pub user: String,
    }

    /// One raw (identifier, bytes/sec) observation from the Lustre jobstats
    /// query backend. The identifier is either a decimal Slurm job id or a
    /// `<proc_name>.<uid>` composite.
    #[derive(Debug, Clone, PartialEq)]
    pub struct ThroughputSample {
        pub identifier: String,
        pub value: f64,
    }

    /// I/O direction; read and write are sourced and built independently.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Direction {
        Read,
        Write,
    }

    impl Direction {
        pub fn as_str(&self) -> &'static str {
            match self {
                Direction::Read => "read",
                Direction::Write => "write",
            }
        }
    }

    impl std::fmt::Display for Direction {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.as_str())
        }
    }
}
