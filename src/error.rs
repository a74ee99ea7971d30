use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading the jobs file. All of them are fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid jobs file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Job {name:?} has an empty command")]
    EmptyCommand { name: String },

    #[error("Invalid worker settings: {0}")]
    InvalidWorker(String),
}

/// Per-job failures. Returned to the worker runtime, which reports the job as
/// failed to the broker.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Failed to serialize arguments for {job_type}#{jid}: {source}")]
    Serialization {
        job_type: String,
        jid: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unknown job type {job_type} for job {jid}")]
    UnknownJobType { job_type: String, jid: String },

    #[error("Job type {job_type} has an empty command (job {jid})")]
    EmptyCommand { job_type: String, jid: String },

    #[error("Failed to start command for {job_type}#{jid}: {source}")]
    Spawn {
        job_type: String,
        jid: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command for {job_type}#{jid} failed (exit code: {code:?}): {stderr}")]
    Exit {
        job_type: String,
        jid: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Failures of the worker manager itself.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Worker slot panicked or was aborted: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
